mod support;

use std::sync::Arc;

use chat_provider_mock::MockProvider;
use chatline::app::App;
use chatline::runtime::TurnController;
use chatline::session::{Role, GREETING_MESSAGE};

use support::{last_content, run_turn, RecordingSink, ScriptedProvider};

#[test]
fn scripted_turn_accumulates_deltas_in_order() {
    let provider = Arc::new(ScriptedProvider::new(&["Hel", "lo", " world"]));
    let (controller, receiver) = TurnController::new(provider);
    let mut app = App::new();
    let mut sink = RecordingSink::default();

    run_turn(&mut app, &controller, &receiver, &mut sink, "greet me");

    assert_eq!(last_content(&app), "Hello world");
    assert!(!app.is_streaming());

    // Transcript order: greeting, user prompt, assistant reply.
    let roles: Vec<Role> = app.log().messages().iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::Assistant, Role::User, Role::Assistant]);

    // Snapshots: user push, turn start, one per delta, finalization.
    assert_eq!(sink.snapshots.len(), 6);
    let in_flight: Vec<String> = sink.snapshots[2..5]
        .iter()
        .map(|snapshot| snapshot.in_flight().map(|m| m.content.clone()).unwrap())
        .collect();
    assert_eq!(in_flight, vec!["Hel", "Hello", "Hello world"]);
}

#[test]
fn empty_turn_finalizes_with_empty_content() {
    let provider = Arc::new(ScriptedProvider::new(&[]));
    let (controller, receiver) = TurnController::new(provider);
    let mut app = App::new();
    let mut sink = RecordingSink::default();

    run_turn(&mut app, &controller, &receiver, &mut sink, "anything there?");

    assert_eq!(last_content(&app), "");
    // user push + turn start + finalization, no delta snapshots.
    assert_eq!(sink.snapshots.len(), 3);
}

#[test]
fn mock_provider_turn_streams_to_completion() {
    let provider = Arc::new(MockProvider::new(vec!["token stream done\n".to_string()]));
    let (controller, receiver) = TurnController::new(provider);
    let mut app = App::new();
    let mut sink = RecordingSink::default();

    run_turn(&mut app, &controller, &receiver, &mut sink, "hello mock");

    assert_eq!(last_content(&app), "token stream done\n");
    assert!(!app.is_streaming());
}

#[test]
fn consecutive_turns_use_fresh_sessions() {
    let provider = Arc::new(ScriptedProvider::new(&["again"]));
    let (controller, receiver) = TurnController::new(provider);
    let mut app = App::new();
    let mut sink = RecordingSink::default();

    run_turn(&mut app, &controller, &receiver, &mut sink, "first");
    run_turn(&mut app, &controller, &receiver, &mut sink, "second");

    let assistant_replies: Vec<&str> = app
        .log()
        .messages()
        .iter()
        .skip(1)
        .filter(|message| message.role == Role::Assistant)
        .map(|message| message.content.as_str())
        .collect();
    assert_eq!(assistant_replies, vec!["again", "again"]);
}

#[test]
fn greeting_survives_clear_command() {
    let provider = Arc::new(ScriptedProvider::new(&["reply"]));
    let (controller, receiver) = TurnController::new(provider);
    let mut app = App::new();
    let mut sink = RecordingSink::default();

    run_turn(&mut app, &controller, &receiver, &mut sink, "hello");
    run_turn(&mut app, &controller, &receiver, &mut sink, "/clear");

    assert_eq!(app.log().messages().len(), 1);
    assert_eq!(last_content(&app), GREETING_MESSAGE);
}
