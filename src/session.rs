//! Conversation log, message accumulator, and the per-turn stream session.
//!
//! The message currently receiving deltas is tracked through an explicit
//! single-slot reference (`TurnSlot`) rather than "the last element of the
//! vector", so the at-most-one-in-flight invariant is structural instead of
//! positional.

use chrono::Local;

/// Fixed user-facing content installed when a turn fails or is aborted.
/// Partial content is overwritten wholesale, never preserved.
pub const STREAM_ERROR_MESSAGE: &str = "Sorry, I encountered an error. Please try again.";

/// Assistant message seeding a fresh conversation.
pub const GREETING_MESSAGE: &str = "Hello! How can I assist you today?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: timestamp.into(),
        }
    }

    pub fn assistant(content: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: timestamp.into(),
        }
    }
}

/// Wall-clock timestamp in the display format carried by [`ChatMessage`].
pub fn timestamp_now() -> String {
    Local::now().format("%H:%M").to_string()
}

/// Explicit single-slot reference to the message receiving deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum TurnSlot {
    #[default]
    Idle,
    InFlight(usize),
    Done,
}

/// Immutable copy of the conversation at one point in time.
///
/// Snapshots drive rendering; the in-flight index lets a renderer distinguish
/// a still-growing message from finalized ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    messages: Vec<ChatMessage>,
    in_flight: Option<usize>,
}

impl Snapshot {
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn in_flight_index(&self) -> Option<usize> {
        self.in_flight
    }

    pub fn in_flight(&self) -> Option<&ChatMessage> {
        self.in_flight.and_then(|index| self.messages.get(index))
    }
}

/// Ordered conversation transcript. Insertion order is chronological.
///
/// At most one message is in-flight at any time, and while in-flight it is
/// always the last element.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConversationLog {
    messages: Vec<ChatMessage>,
    slot: TurnSlot,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log seeded with the standing assistant greeting.
    pub fn with_greeting(timestamp: impl Into<String>) -> Self {
        let mut log = Self::new();
        log.push_assistant_final(GREETING_MESSAGE, timestamp);
        log
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn has_in_flight(&self) -> bool {
        matches!(self.slot, TurnSlot::InFlight(_))
    }

    pub fn in_flight_content(&self) -> Option<&str> {
        match self.slot {
            TurnSlot::InFlight(index) => self.messages.get(index).map(|m| m.content.as_str()),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let in_flight = match self.slot {
            TurnSlot::InFlight(index) => Some(index),
            _ => None,
        };
        Snapshot {
            messages: self.messages.clone(),
            in_flight,
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>, timestamp: impl Into<String>) {
        self.messages.push(ChatMessage::user(content, timestamp));
    }

    /// Append an already-final assistant message (greeting, notices).
    pub fn push_assistant_final(
        &mut self,
        content: impl Into<String>,
        timestamp: impl Into<String>,
    ) {
        self.messages.push(ChatMessage::assistant(content, timestamp));
    }

    /// Append an empty in-flight assistant message. Returns false without
    /// mutating when a message is already in-flight.
    pub fn begin_assistant(&mut self, timestamp: impl Into<String>) -> bool {
        if self.has_in_flight() {
            return false;
        }

        self.messages.push(ChatMessage::assistant("", timestamp));
        self.slot = TurnSlot::InFlight(self.messages.len() - 1);
        true
    }

    /// Replace the in-flight message's content by value. Returns false when no
    /// message is in-flight.
    pub fn replace_in_flight_content(&mut self, content: String) -> bool {
        match self.slot {
            TurnSlot::InFlight(index) => {
                self.messages[index].content = content;
                true
            }
            _ => false,
        }
    }

    /// Seal the in-flight message; no further mutation is permitted.
    pub fn finalize_in_flight(&mut self) -> bool {
        match self.slot {
            TurnSlot::InFlight(_) => {
                self.slot = TurnSlot::Done;
                true
            }
            _ => false,
        }
    }
}

/// Folds the turn's deltas into one growing string.
#[derive(Debug, Default)]
pub struct MessageAccumulator {
    current: String,
}

impl MessageAccumulator {
    pub fn reset(&mut self) {
        self.current.clear();
    }

    /// Commit a delta and return the full accumulated content.
    pub fn append(&mut self, delta: &str) -> &str {
        self.current.push_str(delta);
        &self.current
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    /// Hand off the accumulated text at turn completion.
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.current)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Open,
    Closed,
    Failed,
}

/// Per-turn state machine: `Idle -> Open -> Closed`, with terminal `Failed`
/// reachable from `Open`.
///
/// Every mutation returns the snapshot to hand to the render callback, or
/// `None` when the call is rejected in the current phase. A new turn always
/// uses a fresh session.
#[derive(Debug, Default)]
pub struct StreamSession {
    phase: SessionPhase,
    accumulator: MessageAccumulator,
}

impl StreamSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_open(&self) -> bool {
        self.phase == SessionPhase::Open
    }

    /// `Idle -> Open`: append the in-flight assistant message and produce the
    /// turn-start snapshot.
    pub fn open(
        &mut self,
        log: &mut ConversationLog,
        timestamp: impl Into<String>,
    ) -> Option<Snapshot> {
        if self.phase != SessionPhase::Idle {
            tracing::debug!(phase = ?self.phase, "ignoring open on a used session");
            return None;
        }
        if !log.begin_assistant(timestamp) {
            tracing::debug!("ignoring open while another message is in-flight");
            return None;
        }

        self.accumulator.reset();
        self.phase = SessionPhase::Open;
        Some(log.snapshot())
    }

    /// Fold one delta into the in-flight message: exactly one snapshot per
    /// delta, in arrival order. Rejected unless the session is `Open`.
    pub fn append_delta(&mut self, log: &mut ConversationLog, delta: &str) -> Option<Snapshot> {
        if self.phase != SessionPhase::Open {
            tracing::debug!(phase = ?self.phase, "dropping delta outside an open session");
            return None;
        }

        let content = self.accumulator.append(delta).to_owned();
        if !log.replace_in_flight_content(content) {
            return None;
        }
        Some(log.snapshot())
    }

    /// `Open -> Closed`: clean end-of-stream. The accumulated text stays as the
    /// final message content.
    pub fn close(&mut self, log: &mut ConversationLog) -> Option<Snapshot> {
        if self.phase != SessionPhase::Open {
            return None;
        }

        self.phase = SessionPhase::Closed;
        self.accumulator.take();
        log.finalize_in_flight();
        Some(log.snapshot())
    }

    /// `Open -> Failed`: transport failure or abort. The in-flight content is
    /// replaced wholesale with [`STREAM_ERROR_MESSAGE`].
    pub fn fail(&mut self, log: &mut ConversationLog) -> Option<Snapshot> {
        if self.phase != SessionPhase::Open {
            return None;
        }

        self.phase = SessionPhase::Failed;
        self.accumulator.take();
        log.replace_in_flight_content(STREAM_ERROR_MESSAGE.to_string());
        log.finalize_in_flight();
        Some(log.snapshot())
    }
}
