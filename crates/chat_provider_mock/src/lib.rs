//! Deterministic mock implementation of the shared `chat_provider` contract.
//!
//! This crate contains no transport/protocol logic and is intended for local
//! development and contract-level integration testing.

use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chat_provider::{CancelSignal, ProviderProfile, TurnEvent, TurnProvider, TurnRequest};

/// Stable provider identifier used for explicit startup selection.
pub const MOCK_PROVIDER_ID: &str = "mock";

/// Deterministic mock provider used by `chatline` tests and local runs.
#[derive(Debug)]
pub struct MockProvider {
    chunks: Vec<String>,
    model_ids: Vec<String>,
    selection: Mutex<usize>,
}

impl MockProvider {
    /// Creates a mock provider with caller-provided chunks and default models.
    #[must_use]
    pub fn new(chunks: Vec<String>) -> Self {
        Self::with_models(chunks, vec!["mock".to_string(), "mock-alt".to_string()])
    }

    /// Creates a mock provider with explicit model cycling options.
    #[must_use]
    pub fn with_models(chunks: Vec<String>, model_ids: Vec<String>) -> Self {
        Self {
            chunks,
            model_ids: sanitize_model_ids(model_ids),
            selection: Mutex::new(0),
        }
    }

    fn profile_for_index(&self, index: usize) -> ProviderProfile {
        ProviderProfile {
            provider_id: MOCK_PROVIDER_ID.to_string(),
            model_id: self.model_ids[index].clone(),
        }
    }

    const TURN_DELAY_MS: u64 = 200;
    const TOKEN_DELAY_MS: u64 = 40;
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new(vec![
            "Hello! This reply is streamed token by token from the mock provider, ".to_string(),
            "so the interface can be exercised without a running model server.\n".to_string(),
            "Multi-byte text like caf\u{e9}, na\u{ef}ve and \u{1F600} flows through ".to_string(),
            "the same pipeline as plain ASCII.\n".to_string(),
            "Ask anything, or /help for the available commands.\n".to_string(),
        ])
    }
}

impl TurnProvider for MockProvider {
    fn profile(&self) -> ProviderProfile {
        let selection = lock_unpoisoned(&self.selection);
        self.profile_for_index(*selection)
    }

    fn cycle_model(&self) -> Result<ProviderProfile, String> {
        let mut selection = lock_unpoisoned(&self.selection);
        *selection = (*selection + 1) % self.model_ids.len();
        Ok(self.profile_for_index(*selection))
    }

    fn run(
        &self,
        req: TurnRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(TurnEvent),
    ) -> Result<(), String> {
        let turn_id = req.turn_id;
        let _ = req.prompt;

        emit(TurnEvent::Started { turn_id });
        thread::sleep(Duration::from_millis(Self::TURN_DELAY_MS));

        if cancel.load(Ordering::SeqCst) {
            emit(TurnEvent::Cancelled { turn_id });
            return Ok(());
        }

        for chunk in &self.chunks {
            if cancel.load(Ordering::SeqCst) {
                emit(TurnEvent::Cancelled { turn_id });
                return Ok(());
            }

            let mut pending_token = String::new();
            for ch in chunk.chars() {
                pending_token.push(ch);

                if matches!(ch, ' ' | '\n') {
                    emit(TurnEvent::Delta {
                        turn_id,
                        text: std::mem::take(&mut pending_token),
                    });
                    thread::sleep(Duration::from_millis(Self::TOKEN_DELAY_MS));
                }
            }

            if !pending_token.is_empty() {
                if cancel.load(Ordering::SeqCst) {
                    emit(TurnEvent::Cancelled { turn_id });
                    return Ok(());
                }

                emit(TurnEvent::Delta {
                    turn_id,
                    text: pending_token,
                });
                thread::sleep(Duration::from_millis(Self::TOKEN_DELAY_MS));
            }
        }

        if cancel.load(Ordering::SeqCst) {
            emit(TurnEvent::Cancelled { turn_id });
        } else {
            emit(TurnEvent::Finished { turn_id });
        }

        Ok(())
    }
}

fn sanitize_model_ids(model_ids: Vec<String>) -> Vec<String> {
    let mut sanitized: Vec<String> = model_ids
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect();

    if sanitized.is_empty() {
        sanitized.push("mock".to_string());
    }

    sanitized
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
