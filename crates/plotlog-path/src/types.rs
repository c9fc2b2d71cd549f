//! Core path types.

use std::fmt;

/// One step of a parsed path: an object key or an array index.
///
/// Segments are produced by [`split_segments`](crate::split_segments); an
/// all-digit component becomes [`Segment::Index`], everything else becomes
/// [`Segment::Key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl Segment {
    /// Returns the index if this segment is numeric.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Segment::Index(i) => Some(*i),
            Segment::Key(_) => None,
        }
    }

    /// The segment as an object key (indices render as their digits).
    pub fn as_key(&self) -> String {
        match self {
            Segment::Key(k) => k.clone(),
            Segment::Index(i) => i.to_string(),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(k) => f.write_str(k),
            Segment::Index(i) => write!(f, "{i}"),
        }
    }
}

/// A parsed path: a sequence of segments below some root.
pub type Path = Vec<Segment>;

/// A resolved assignment target: the parent container plus the final segment.
///
/// Produced by [`ensure_container`](crate::ensure_container);
/// `parent[last]` is guaranteed to be a valid assignment slot.
#[derive(Debug)]
pub struct Slot<'a> {
    pub parent: &'a mut serde_json::Value,
    pub last: Segment,
}
