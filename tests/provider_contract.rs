mod support;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chat_provider::{TurnEvent, TurnProvider, TurnRequest};
use chat_provider_mock::MockProvider;

use support::ScriptedProvider;

fn collect_events(provider: &dyn TurnProvider, cancelled: bool) -> Vec<TurnEvent> {
    let mut events = Vec::new();
    provider
        .run(
            TurnRequest {
                turn_id: 11,
                prompt: "contract".to_string(),
            },
            Arc::new(AtomicBool::new(cancelled)),
            &mut |event| events.push(event),
        )
        .expect("providers should not fail at the contract level");
    events
}

fn assert_lifecycle_shape(events: &[TurnEvent]) {
    assert!(
        matches!(events.first(), Some(TurnEvent::Started { turn_id: 11 })),
        "providers must emit Started first"
    );
    assert!(
        events.last().is_some_and(TurnEvent::is_terminal),
        "providers must emit a terminal event last"
    );
    let terminal_count = events.iter().filter(|event| event.is_terminal()).count();
    assert_eq!(terminal_count, 1, "exactly one terminal event per turn");
    assert!(events.iter().all(|event| event.turn_id() == 11));
}

#[test]
fn mock_provider_honors_lifecycle_contract() {
    let provider = MockProvider::new(vec!["one two three".to_string()]);
    assert_lifecycle_shape(&collect_events(&provider, false));
}

#[test]
fn mock_provider_honors_lifecycle_contract_when_cancelled() {
    let provider = MockProvider::new(vec!["one two three".to_string()]);
    let events = collect_events(&provider, true);
    assert_lifecycle_shape(&events);
    assert!(matches!(events.last(), Some(TurnEvent::Cancelled { .. })));
}

#[test]
fn scripted_provider_honors_lifecycle_contract() {
    let provider = ScriptedProvider::new(&["a", "b"]);
    let events = collect_events(&provider, false);
    assert_lifecycle_shape(&events);

    let deltas: Vec<&str> = events
        .iter()
        .filter_map(|event| match event {
            TurnEvent::Delta { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(deltas, vec!["a", "b"]);
}
