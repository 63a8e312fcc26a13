//! Ollama-backed implementation of the shared `chat_provider` contract.
//!
//! This adapter translates `ollama_api` stream semantics into deterministic
//! `TurnEvent` lifecycle events expected by `chatline`. The transport reports
//! completion by clean end-of-stream, so the terminal mapping is EOF to
//! `Finished`, cancellation to `Cancelled`, and any other transport error to
//! `Failed`.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chat_provider::{
    CancelSignal, ProviderInitError, ProviderProfile, TurnEvent, TurnProvider, TurnRequest,
};
use ollama_api::{ChatApiClient, ChatApiConfig, ChatApiError, ChatRequest, StreamOutcome};

/// Stable provider identifier used by `chatline` startup selection.
pub const OLLAMA_PROVIDER_ID: &str = "ollama";

/// Runtime configuration for the Ollama provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OllamaProviderConfig {
    pub base_url: Option<String>,
    pub model_ids: Vec<String>,
    pub timeout: Option<Duration>,
}

impl OllamaProviderConfig {
    #[must_use]
    pub fn new(model_ids: Vec<String>) -> Self {
        Self {
            base_url: None,
            model_ids,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn into_chat_api_config(self) -> ChatApiConfig {
        let mut config = match self.base_url {
            Some(base_url) => ChatApiConfig::new(base_url),
            None => ChatApiConfig::default(),
        };

        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }

        config
    }
}

trait StreamClient: Send + Sync {
    fn stream(
        &self,
        request: &ChatRequest,
        cancel: &CancelSignal,
    ) -> Result<StreamOutcome, ChatApiError>;
}

#[derive(Debug)]
struct DefaultStreamClient {
    client: ChatApiClient,
}

impl StreamClient for DefaultStreamClient {
    fn stream(
        &self,
        request: &ChatRequest,
        cancel: &CancelSignal,
    ) -> Result<StreamOutcome, ChatApiError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| {
                ChatApiError::Unknown(format!("failed to initialize tokio runtime: {error}"))
            })?;

        runtime.block_on(self.client.stream(request, Some(cancel)))
    }
}

/// `TurnProvider` adapter backed by `ollama_api` transport primitives.
pub struct OllamaProvider {
    model_ids: Vec<String>,
    selection: Mutex<usize>,
    stream_client: Arc<dyn StreamClient>,
}

impl OllamaProvider {
    /// Creates a provider using real chat API transport.
    pub fn new(config: OllamaProviderConfig) -> Result<Self, ProviderInitError> {
        let model_ids = sanitize_model_ids(config.model_ids.clone());
        let stream_client = Arc::new(DefaultStreamClient {
            client: ChatApiClient::new(config.into_chat_api_config()).map_err(map_init_error)?,
        });

        Ok(Self {
            model_ids,
            selection: Mutex::new(0),
            stream_client,
        })
    }

    fn selected_model(&self) -> String {
        let selection = lock_unpoisoned(&self.selection);
        self.model_ids[*selection].clone()
    }

    fn emit_deltas(&self, turn_id: u64, deltas: Vec<String>, emit: &mut dyn FnMut(TurnEvent)) {
        // One event per extracted delta, in order; empty deltas included so the
        // emitted sequence matches the parser's output exactly.
        for text in deltas {
            emit(TurnEvent::Delta { turn_id, text });
        }
    }

    #[cfg(test)]
    fn with_stream_client_for_tests(
        model_ids: Vec<String>,
        stream_client: Arc<dyn StreamClient>,
    ) -> Self {
        Self {
            model_ids: sanitize_model_ids(model_ids),
            selection: Mutex::new(0),
            stream_client,
        }
    }
}

impl TurnProvider for OllamaProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: OLLAMA_PROVIDER_ID.to_string(),
            model_id: self.selected_model(),
        }
    }

    fn cycle_model(&self) -> Result<ProviderProfile, String> {
        let mut selection = lock_unpoisoned(&self.selection);
        *selection = (*selection + 1) % self.model_ids.len();
        drop(selection);

        Ok(self.profile())
    }

    fn run(
        &self,
        req: TurnRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(TurnEvent),
    ) -> Result<(), String> {
        let turn_id = req.turn_id;

        emit(TurnEvent::Started { turn_id });

        if cancel.load(Ordering::Acquire) {
            emit(TurnEvent::Cancelled { turn_id });
            return Ok(());
        }

        let request = ChatRequest::user_turn(self.selected_model(), req.prompt);
        match self.stream_client.stream(&request, &cancel) {
            Ok(outcome) => {
                self.emit_deltas(turn_id, outcome.deltas, emit);
                emit(TurnEvent::Finished { turn_id });
            }
            Err(ChatApiError::Cancelled) => emit(TurnEvent::Cancelled { turn_id }),
            Err(error) => emit(TurnEvent::Failed {
                turn_id,
                error: format!("Chat request failed: {error}"),
            }),
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
        sanitized.push("llama3".to_string());
    }

    sanitized
}

fn map_init_error(error: ChatApiError) -> ProviderInitError {
    ProviderInitError::new(format!("Failed to initialize ollama provider: {error}"))
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
