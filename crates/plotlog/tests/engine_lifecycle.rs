//! End-to-end lifecycle tests: events in, guarded variable state out.

use plotlog::host::MemoryHost;
use plotlog::session::{Event, GenerationKind, Session};
use plotlog::VariableStore;
use serde_json::json;

fn send_user(session: &mut Session<MemoryHost>, text: &str) -> usize {
    let id = session.host_mut().push_message(text, true);
    session.handle_event(Event::MessageSent);
    session.handle_event(Event::UserMessageRendered { message_id: Some(id) });
    id
}

fn receive_char(session: &mut Session<MemoryHost>, text: &str) -> usize {
    let id = session.host_mut().push_message(text, false);
    session.handle_event(Event::MessageReceived { message_id: Some(id) });
    session.handle_event(Event::CharacterMessageRendered { message_id: Some(id) });
    id
}

#[test]
fn applying_the_same_message_twice_is_a_noop() {
    let mut session = Session::new(MemoryHost::new());
    let id = send_user(&mut session, "<plot-log>set:\n  hp: 10\n</plot-log>");

    assert_eq!(session.host().get("hp").as_deref(), Some("10"));

    let again = session.apply_message(id);
    assert!(again.skipped_unchanged);
    assert!(!again.applied);
    assert_eq!(session.host().get("hp").as_deref(), Some("10"));
}

#[test]
fn prose_without_blocks_touches_nothing() {
    let mut session = Session::new(MemoryHost::new());
    send_user(&mut session, "just talking, no directives here");
    assert!(session.host().vars.is_empty());
}

#[test]
fn edit_rolls_back_to_the_previous_floor_then_reapplies() {
    let mut session = Session::new(MemoryHost::new());
    send_user(&mut session, "<plot-log>set:\n  gold: 10\n</plot-log>");
    let m1 = receive_char(&mut session, "<plot-log>bump:\n  gold: 5\n</plot-log>");
    assert_eq!(session.host().get("gold").as_deref(), Some("15"));

    // Host edits the message; the engine restores the previous floor first.
    session
        .host_mut()
        .edit_message(m1, "<plot-log>bump:\n  gold: 7\n</plot-log>");
    session.handle_event(Event::MessageEdited { message_id: Some(m1) });
    assert_eq!(session.host().get("gold").as_deref(), Some("10"));

    // After the host's re-render settles, the edited directives re-apply.
    session.run_deferred();
    assert_eq!(session.host().get("gold").as_deref(), Some("17"));
}

#[test]
fn editing_without_changing_content_still_reapplies() {
    let mut session = Session::new(MemoryHost::new());
    send_user(&mut session, "<plot-log>set:\n  gold: 10\n</plot-log>");
    let m1 = receive_char(&mut session, "<plot-log>bump:\n  gold: 5\n</plot-log>");

    session.handle_event(Event::MessageEdited { message_id: Some(m1) });
    assert_eq!(session.host().get("gold").as_deref(), Some("10"));
    session.run_deferred();
    assert_eq!(session.host().get("gold").as_deref(), Some("15"));
}

#[test]
fn swipe_reapplication_is_cancelled_by_a_new_generation() {
    let mut session = Session::new(MemoryHost::new());
    send_user(&mut session, "<plot-log>set:\n  gold: 10\n</plot-log>");
    let m1 = receive_char(&mut session, "<plot-log>bump:\n  gold: 5\n</plot-log>");

    session.handle_event(Event::MessageSwiped { message_id: Some(m1) });
    assert_eq!(session.host().get("gold").as_deref(), Some("10"));

    // A new generation for the swiped message supersedes the deferred step.
    session.handle_event(Event::GenerationStarted {
        kind: GenerationKind::Swipe,
    });
    session.run_deferred();
    assert_eq!(session.host().get("gold").as_deref(), Some("10"));
}

#[test]
fn swipe_without_generation_reapplies_after_the_render_settles() {
    let mut session = Session::new(MemoryHost::new());
    send_user(&mut session, "<plot-log>set:\n  gold: 10\n</plot-log>");
    let m1 = receive_char(&mut session, "<plot-log>bump:\n  gold: 5\n</plot-log>");

    session.handle_event(Event::MessageSwiped { message_id: Some(m1) });
    assert_eq!(session.host().get("gold").as_deref(), Some("10"));
    session.run_deferred();
    assert_eq!(session.host().get("gold").as_deref(), Some("15"));
}

#[test]
fn delete_restores_the_surviving_floor_and_purges_later_state() {
    let mut session = Session::new(MemoryHost::new());
    send_user(&mut session, "<plot-log>set:\n  gold: 10\n</plot-log>");
    receive_char(&mut session, "<plot-log>bump:\n  gold: 5\n</plot-log>");
    receive_char(&mut session, "<plot-log>bump:\n  gold: 1\n</plot-log>");
    assert_eq!(session.host().get("gold").as_deref(), Some("16"));

    // Host removes messages 1 and 2; the engine rolls back to floor 0.
    session.host_mut().truncate_chat(1);
    session.handle_event(Event::MessageDeleted { message_id: Some(1) });

    assert_eq!(session.host().get("gold").as_deref(), Some("10"));
    assert!(plotlog::snapshot::get_snapshot(session.host(), 0).is_some());
    assert!(plotlog::snapshot::get_snapshot(session.host(), 1).is_none());
    assert!(plotlog::snapshot::get_snapshot(session.host(), 2).is_none());
}

#[test]
fn deleting_the_whole_chat_clears_variables_and_rules() {
    let mut session = Session::new(MemoryHost::new());
    send_user(&mut session, "<plot-log>set:\n  $ro gold: 10\n</plot-log>");
    assert_eq!(session.host().get("gold").as_deref(), Some("10"));

    session.host_mut().truncate_chat(0);
    session.handle_event(Event::MessageDeleted { message_id: Some(0) });
    assert!(session.host().get("gold").is_none());
    assert!(session.guardian().table.node("gold").is_none());
}

#[test]
fn delete_without_an_index_is_ignored() {
    let mut session = Session::new(MemoryHost::new());
    send_user(&mut session, "<plot-log>set:\n  gold: 10\n</plot-log>");
    session.handle_event(Event::MessageDeleted { message_id: None });
    assert_eq!(session.host().get("gold").as_deref(), Some("10"));
}

#[test]
fn guard_directive_locks_a_path_read_only() {
    let mut session = Session::new(MemoryHost::new());
    // Floor 0 creates the structure; floor 1 declares the rule alongside a
    // matching set; floor 2 tries to overwrite and is denied.
    send_user(
        &mut session,
        "<plot-log>set:\n  stats: |\n    {\"hp\": 10}\n</plot-log>",
    );
    assert_eq!(session.value_at("stats.hp"), Some(json!(10)));

    receive_char(
        &mut session,
        "<plot-log>set:\n  stats:\n    $ro hp: 10\n</plot-log>",
    );
    assert!(session.guardian().table.node("stats.hp").unwrap().ro);

    let id = session
        .host_mut()
        .push_message("<plot-log>set:\n  stats:\n    hp: 20\n</plot-log>", false);
    let outcome = session.apply_message(id);
    assert_eq!(outcome.guard_denied, 1);
    assert_eq!(session.value_at("stats.hp"), Some(json!(10)));
}

#[test]
fn one_del_operation_removes_indices_without_shift_corruption() {
    let mut session = Session::new(MemoryHost::new());
    send_user(
        &mut session,
        "<plot-log>set:\n  $shrink inv: |\n    [\"a\", \"b\", \"c\", \"d\"]\n</plot-log>",
    );
    assert_eq!(session.value_at("inv"), Some(json!(["a", "b", "c", "d"])));

    receive_char(
        &mut session,
        "<plot-log>del:\n  inv:\n    - 1\n    - 3\n</plot-log>",
    );
    assert_eq!(session.value_at("inv"), Some(json!(["a", "c"])));
}

#[test]
fn growth_policy_gates_new_nested_paths() {
    let mut session = Session::new(MemoryHost::new());
    send_user(
        &mut session,
        "<plot-log>set:\n  world: |\n    {}\n</plot-log>",
    );

    // Without a policy the new leaf is rejected.
    let id = session
        .host_mut()
        .push_message("<plot-log>set:\n  world:\n    day: 1\n</plot-log>", false);
    let outcome = session.apply_message(id);
    assert_eq!(outcome.guard_denied, 1);
    assert_eq!(session.value_at("world"), Some(json!({})));

    // Declare `$ext` (guard tokens run before the next message's sets), then
    // the same set succeeds.
    receive_char(
        &mut session,
        "<plot-log>set:\n  $ext world:\n</plot-log>",
    );
    receive_char(
        &mut session,
        "<plot-log>set:\n  world:\n    day: 1\n</plot-log>",
    );
    assert_eq!(session.value_at("world.day"), Some(json!(1)));
}

#[test]
fn chat_change_reloads_rules_and_clears_fingerprints() {
    let mut session = Session::new(MemoryHost::new());
    let id = send_user(&mut session, "<plot-log>set:\n  hp: 10\n</plot-log>");
    assert!(plotlog::apply::applied_signature(session.host(), id).is_some());

    session.handle_event(Event::ChatChanged);
    assert!(plotlog::apply::applied_signature(session.host(), id).is_none());
    // The type lock written on floor 0 was mirrored and survives the reload.
    assert!(session.guardian().table.node("hp").is_some());
}

#[test]
fn the_guarded_store_routes_host_writes_through_validation() {
    let mut session = Session::new(MemoryHost::new());
    session.guardian_mut().table.ensure("hp").ro = true;

    let mut store = session.guarded_store();
    store.set("hp", "20");
    assert!(session.host().get("hp").is_none());

    session.reset();
    assert!(session.guardian().table.is_empty());
    let mut store = session.guarded_store();
    store.set("hp", "20");
    assert_eq!(session.host().get("hp").as_deref(), Some("20"));
}

#[test]
fn rebuild_recomputes_everything_from_floor_zero() {
    let mut session = Session::new(MemoryHost::new());
    send_user(&mut session, "<plot-log>set:\n  gold: 10\n</plot-log>");
    receive_char(&mut session, "<plot-log>bump:\n  gold: 5\n</plot-log>");

    // Corrupt the live value, then rebuild.
    session.host_mut().set("gold", "999");
    session.rebuild();
    assert_eq!(session.host().get("gold").as_deref(), Some("15"));
}

#[test]
fn numeric_clamp_applies_across_floors() {
    let mut session = Session::new(MemoryHost::new());
    send_user(
        &mut session,
        "<plot-log>set:\n  $min=0 $max=100 hp: 50\n</plot-log>",
    );
    // Constraints land after floor 0's set; the bump below hits them.
    receive_char(&mut session, "<plot-log>bump:\n  hp: 1000\n</plot-log>");
    assert_eq!(session.host().get("hp").as_deref(), Some("100"));
}

#[test]
fn step_limits_a_set_to_a_window_around_current() {
    let mut session = Session::new(MemoryHost::new());
    send_user(
        &mut session,
        "<plot-log>set:\n  $step=5 hp: 10\n</plot-log>",
    );
    receive_char(&mut session, "<plot-log>set:\n  hp: 100\n</plot-log>");
    assert_eq!(session.host().get("hp").as_deref(), Some("15"));
}
