//! Minimal provider-agnostic contract for executing a single chat turn.
//!
//! This crate intentionally defines only the shared turn lifecycle. It excludes
//! provider transport details, protocol payloads, and conversation state.

use std::fmt;
use std::sync::{atomic::AtomicBool, Arc};

/// Identifier for one chat turn.
pub type TurnId = u64;

/// Shared cancellation flag for a turn.
pub type CancelSignal = Arc<AtomicBool>;

/// Error returned while constructing/configuring a provider before any turn starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInitError {
    message: String,
}

impl ProviderInitError {
    /// Creates a new provider initialization error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the underlying error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ProviderInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ProviderInitError {}

impl From<String> for ProviderInitError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ProviderInitError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Input required to start a turn: one user-turn content string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    pub turn_id: TurnId,
    pub prompt: String,
}

/// Provider-emitted lifecycle event for a turn.
///
/// `Delta` carries one incremental fragment of assistant text, in extraction
/// order. Providers emit `Started` first and exactly one terminal event last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    Started { turn_id: TurnId },
    Delta { turn_id: TurnId, text: String },
    Finished { turn_id: TurnId },
    Failed { turn_id: TurnId, error: String },
    Cancelled { turn_id: TurnId },
}

impl TurnEvent {
    /// Returns the turn identifier associated with this event.
    #[must_use]
    pub fn turn_id(&self) -> TurnId {
        match self {
            Self::Started { turn_id }
            | Self::Delta { turn_id, .. }
            | Self::Finished { turn_id }
            | Self::Failed { turn_id, .. }
            | Self::Cancelled { turn_id } => *turn_id,
        }
    }

    /// Returns true when this event terminates the turn lifecycle.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished { .. } | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }
}

/// Immutable metadata describing a turn provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider_id: String,
    pub model_id: String,
}

/// Provider interface for executing one turn request.
pub trait TurnProvider: Send + Sync + 'static {
    /// Returns provider/model identity metadata.
    fn profile(&self) -> ProviderProfile;

    /// Cycles to the next model selection for future turns.
    ///
    /// Providers may return an error when model cycling is unsupported.
    fn cycle_model(&self) -> Result<ProviderProfile, String> {
        Err("Model cycling is not supported by this provider".to_string())
    }

    /// Executes a turn request and emits lifecycle events in provider order.
    ///
    /// The callback is deterministic and serial from the caller perspective.
    fn run(
        &self,
        req: TurnRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(TurnEvent),
    ) -> Result<(), String>;
}
