//! Turn execution runtime.
//!
//! Each chat turn runs the provider on its own worker thread and forwards
//! lifecycle events over an mpsc channel to the driving loop, which applies
//! them to [`App`](crate::app::App) in arrival order. The provider is fenced
//! with `catch_unwind`, and a provider that exits without a terminal event has
//! a `Failed` event synthesized so the app never waits forever.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use chat_provider::{TurnEvent, TurnId, TurnProvider, TurnRequest};

use crate::app::HostOps;

struct ActiveTurn {
    turn_id: TurnId,
    cancel: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
}

pub struct TurnController {
    events: Sender<TurnEvent>,
    next_turn_id: AtomicU64,
    active_turn: Mutex<Option<ActiveTurn>>,
    provider: Arc<dyn TurnProvider>,
}

impl TurnController {
    /// Creates a controller and the receiving end of its event channel. The
    /// driving loop owns the receiver and must apply events in order.
    pub fn new(provider: Arc<dyn TurnProvider>) -> (Arc<Self>, Receiver<TurnEvent>) {
        let (events, receiver) = channel();
        let controller = Arc::new(Self {
            events,
            next_turn_id: AtomicU64::new(1),
            active_turn: Mutex::new(None),
            provider,
        });
        (controller, receiver)
    }

    fn start_turn_internal(self: &Arc<Self>, prompt: String) -> Result<TurnId, String> {
        let mut active_turn = self.lock_active_turn();
        if active_turn.is_some() {
            return Err("Turn already active".to_string());
        }

        let turn_id = self.next_turn_id.fetch_add(1, Ordering::SeqCst);
        let cancel = Arc::new(AtomicBool::new(false));
        let request = TurnRequest { turn_id, prompt };
        let join_handle = self.spawn_worker(request, Arc::clone(&cancel))?;

        *active_turn = Some(ActiveTurn {
            turn_id,
            cancel,
            join_handle: Some(join_handle),
        });

        Ok(turn_id)
    }

    fn spawn_worker(
        self: &Arc<Self>,
        request: TurnRequest,
        cancel: Arc<AtomicBool>,
    ) -> Result<JoinHandle<()>, String> {
        let turn_id = request.turn_id;
        let controller = Arc::clone(self);
        thread::Builder::new()
            .name(format!("chat-turn-{turn_id}"))
            .spawn(move || controller.run_worker(request, cancel))
            .map_err(|error| format!("Failed to spawn turn worker: {error}"))
    }

    fn run_worker(self: Arc<Self>, request: TurnRequest, cancel: Arc<AtomicBool>) {
        let turn_id = request.turn_id;
        let terminal_emitted = Arc::new(AtomicBool::new(false));

        let events = self.events.clone();
        let terminal_tracker = Arc::clone(&terminal_emitted);
        let mut emit = move |event: TurnEvent| {
            if event.is_terminal() {
                terminal_tracker.store(true, Ordering::SeqCst);
            }
            let _ = events.send(event);
        };

        let provider = Arc::clone(&self.provider);
        let run_outcome = catch_unwind(AssertUnwindSafe(|| {
            provider.run(request, Arc::clone(&cancel), &mut emit)
        }));

        match run_outcome {
            Ok(Ok(())) => {}
            Ok(Err(error)) => emit(TurnEvent::Failed { turn_id, error }),
            Err(_) => emit(TurnEvent::Failed {
                turn_id,
                error: "Turn provider panicked".to_string(),
            }),
        }

        if !terminal_emitted.load(Ordering::SeqCst) {
            emit(TurnEvent::Failed {
                turn_id,
                error: "Turn provider exited without terminal event".to_string(),
            });
        }
    }

    /// Release the worker after its terminal event was applied. Joins the
    /// finished thread so no turn leaks its handle.
    pub fn finish_turn(&self, turn_id: TurnId) {
        let mut active_turn = self.lock_active_turn();
        let matches = active_turn.as_ref().map(|active| active.turn_id) == Some(turn_id);
        if !matches {
            return;
        }

        let mut completed = match active_turn.take() {
            Some(completed) => completed,
            None => return,
        };
        drop(active_turn);

        if let Some(join_handle) = completed.join_handle.take() {
            if join_handle.thread().id() != thread::current().id() {
                let _ = join_handle.join();
            }
        }
    }

    fn cancel_turn_internal(&self, turn_id: TurnId) {
        let active_turn = self.lock_active_turn();
        if let Some(active_turn) = active_turn.as_ref() {
            if active_turn.turn_id == turn_id {
                active_turn.cancel.store(true, Ordering::SeqCst);
            }
        }
    }

    pub fn has_active_turn(&self) -> bool {
        self.lock_active_turn().is_some()
    }

    fn lock_active_turn(&self) -> MutexGuard<'_, Option<ActiveTurn>> {
        lock_unpoisoned(&self.active_turn)
    }
}

impl HostOps for Arc<TurnController> {
    fn start_turn(&mut self, prompt: String) -> Result<TurnId, String> {
        self.start_turn_internal(prompt)
    }

    fn cancel_turn(&mut self, turn_id: TurnId) {
        self.cancel_turn_internal(turn_id);
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
