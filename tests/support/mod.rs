use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chat_provider::{CancelSignal, ProviderProfile, TurnEvent, TurnProvider, TurnRequest};
use chatline::app::App;
use chatline::render::SnapshotSink;
use chatline::runtime::TurnController;
use chatline::session::Snapshot;

/// Sink that records every emitted snapshot for later assertions.
#[derive(Default)]
pub struct RecordingSink {
    pub snapshots: Vec<Snapshot>,
}

impl SnapshotSink for RecordingSink {
    fn on_snapshot(&mut self, snapshot: &Snapshot) {
        self.snapshots.push(snapshot.clone());
    }
}

/// Provider that streams the given deltas with an optional per-delta delay,
/// honoring cancellation between deltas.
pub struct ScriptedProvider {
    pub deltas: Vec<String>,
    pub delta_delay: Duration,
}

impl ScriptedProvider {
    pub fn new(deltas: &[&str]) -> Self {
        Self {
            deltas: deltas.iter().map(ToString::to_string).collect(),
            delta_delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delta_delay = delay;
        self
    }
}

impl TurnProvider for ScriptedProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: "scripted".to_string(),
            model_id: "scripted".to_string(),
        }
    }

    fn run(
        &self,
        req: TurnRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(TurnEvent),
    ) -> Result<(), String> {
        let turn_id = req.turn_id;
        emit(TurnEvent::Started { turn_id });

        for text in &self.deltas {
            if !self.delta_delay.is_zero() {
                thread::sleep(self.delta_delay);
            }
            if cancel.load(std::sync::atomic::Ordering::SeqCst) {
                emit(TurnEvent::Cancelled { turn_id });
                return Ok(());
            }
            emit(TurnEvent::Delta {
                turn_id,
                text: text.clone(),
            });
        }

        if cancel.load(std::sync::atomic::Ordering::SeqCst) {
            emit(TurnEvent::Cancelled { turn_id });
        } else {
            emit(TurnEvent::Finished { turn_id });
        }
        Ok(())
    }
}

/// Submit a prompt and apply provider events until the turn terminates.
pub fn run_turn(
    app: &mut App,
    controller: &Arc<TurnController>,
    receiver: &Receiver<TurnEvent>,
    sink: &mut RecordingSink,
    prompt: &str,
) {
    let mut host = Arc::clone(controller);
    app.on_input_replace(prompt.to_string());
    app.on_submit(&mut host, sink);

    drain_turn(app, controller, receiver, sink);
}

/// Apply queued events in arrival order until a terminal event lands.
pub fn drain_turn(
    app: &mut App,
    controller: &Arc<TurnController>,
    receiver: &Receiver<TurnEvent>,
    sink: &mut RecordingSink,
) {
    while app.is_streaming() {
        let event = receiver
            .recv_timeout(Duration::from_secs(5))
            .expect("turn should keep emitting events");
        let terminal = event.is_terminal();
        let turn_id = event.turn_id();
        app.apply_turn_event(event, sink);
        if terminal {
            controller.finish_turn(turn_id);
        }
    }
}

pub fn last_content(app: &App) -> String {
    app.log()
        .messages()
        .last()
        .map(|message| message.content.clone())
        .unwrap_or_default()
}
