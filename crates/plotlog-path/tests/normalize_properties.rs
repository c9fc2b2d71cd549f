use plotlog_path::{normalize_path, split_segments};
use proptest::prelude::*;

proptest! {
    #[test]
    fn normalize_is_a_fixed_point(path in "[a-z]{1,4}(\\.[a-z0-9]{1,4}|\\[[0-9]{1,3}\\]){0,6}") {
        let once = normalize_path(&path);
        prop_assert_eq!(normalize_path(&once), once);
    }

    #[test]
    fn normalized_paths_contain_no_brackets(path in "[a-z]{1,4}(\\.[a-z0-9]{1,4}|\\[[0-9]{1,3}\\]){0,6}") {
        let norm = normalize_path(&path);
        prop_assert!(!norm.contains('['));
        prop_assert!(!norm.contains(']'));
    }

    #[test]
    fn segments_roundtrip_through_join(path in "[a-z]{1,4}(\\.[a-z0-9]{1,4}|\\[[0-9]{1,3}\\]){0,6}") {
        let segs = split_segments(&path);
        let joined = segs.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(".");
        prop_assert_eq!(split_segments(&joined), segs);
    }
}
