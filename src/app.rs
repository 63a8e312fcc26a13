use chat_provider::{TurnEvent, TurnId};

use crate::commands::{parse_slash_command, SlashCommand, HELP_TEXT};
use crate::render::SnapshotSink;
use crate::session::{timestamp_now, ConversationLog, StreamSession};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Streaming { turn_id: TurnId },
    Exiting,
}

/// Host operations the app drives but does not own.
pub trait HostOps {
    fn start_turn(&mut self, prompt: String) -> Result<TurnId, String>;
    fn cancel_turn(&mut self, turn_id: TurnId);
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct InputHistory {
    entries: Vec<String>,
    cursor: Option<usize>,
    draft: Option<String>,
}

impl InputHistory {
    fn record_entry(&mut self, text: String) {
        self.entries.push(text);
        self.cursor = None;
        self.draft = None;
    }

    fn previous(&mut self, current_input: &str) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }

        if self.cursor.is_some_and(|index| index >= self.entries.len()) {
            self.cursor = None;
        }

        if self.cursor.is_none() {
            self.draft = Some(current_input.to_string());
        }

        let new_cursor = match self.cursor {
            Some(index) if index > 0 => index - 1,
            Some(index) => index,
            None => self.entries.len() - 1,
        };

        self.cursor = Some(new_cursor);
        Some(self.entries[new_cursor].clone())
    }

    fn next(&mut self) -> Option<String> {
        let current = self.cursor?;

        if current + 1 >= self.entries.len() {
            self.cursor = None;
            return Some(self.draft.take().unwrap_or_default());
        }

        let next = current + 1;
        self.cursor = Some(next);
        Some(self.entries[next].clone())
    }
}

/// Application state: conversation transcript, input line, and the lifecycle
/// of the single turn that may be streaming at any time.
#[derive(Debug)]
pub struct App {
    pub mode: Mode,
    pub input: String,
    log: ConversationLog,
    session: StreamSession,
    history: InputHistory,
    pub should_exit: bool,
    cancelling_turn: Option<TurnId>,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    pub fn new() -> Self {
        Self {
            mode: Mode::Idle,
            input: String::new(),
            log: ConversationLog::with_greeting(timestamp_now()),
            session: StreamSession::new(),
            history: InputHistory::default(),
            should_exit: false,
            cancelling_turn: None,
        }
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.mode, Mode::Streaming { .. })
    }

    fn is_active_turn(&self, turn_id: TurnId) -> bool {
        matches!(self.mode, Mode::Streaming { turn_id: current } if current == turn_id)
    }

    pub fn on_input_replace(&mut self, text: String) {
        self.input = text;
        self.history.cursor = None;
        self.history.draft = None;
    }

    pub fn on_history_previous(&mut self) {
        if let Some(entry) = self.history.previous(&self.input) {
            self.input = entry;
        }
    }

    pub fn on_history_next(&mut self) {
        if let Some(entry) = self.history.next() {
            self.input = entry;
        }
    }

    /// Submit the current input line: slash commands are handled locally,
    /// anything else starts a chat turn. Blank input and input submitted while
    /// a turn is already streaming are ignored.
    pub fn on_submit(&mut self, host: &mut dyn HostOps, sink: &mut dyn SnapshotSink) {
        let text = std::mem::take(&mut self.input);
        let prompt = text.trim().to_string();
        if prompt.is_empty() {
            return;
        }

        if let Some(command) = parse_slash_command(&prompt) {
            self.apply_command(command, host, sink);
            return;
        }

        if self.is_streaming() {
            tracing::debug!("ignoring submit while a turn is streaming");
            self.input = text;
            return;
        }

        self.history.record_entry(prompt.clone());
        self.log.push_user(prompt.clone(), timestamp_now());
        sink.on_snapshot(&self.log.snapshot());

        match host.start_turn(prompt) {
            Ok(turn_id) => {
                self.mode = Mode::Streaming { turn_id };
            }
            Err(error) => {
                tracing::warn!(%error, "failed to start turn");
                self.fail_without_provider(sink);
            }
        }
    }

    fn apply_command(
        &mut self,
        command: SlashCommand,
        host: &mut dyn HostOps,
        sink: &mut dyn SnapshotSink,
    ) {
        match command {
            SlashCommand::Help => {
                self.log.push_assistant_final(HELP_TEXT, timestamp_now());
                sink.on_snapshot(&self.log.snapshot());
            }
            SlashCommand::Clear => {
                if self.is_streaming() {
                    tracing::debug!("ignoring /clear while a turn is streaming");
                    return;
                }
                self.log = ConversationLog::with_greeting(timestamp_now());
                self.session = StreamSession::new();
                sink.on_snapshot(&self.log.snapshot());
            }
            SlashCommand::Cancel => {
                if let Mode::Streaming { turn_id } = self.mode {
                    self.cancelling_turn = Some(turn_id);
                    host.cancel_turn(turn_id);
                }
            }
            SlashCommand::Quit => {
                self.mode = Mode::Exiting;
                self.should_exit = true;
            }
            SlashCommand::Unknown(command) => {
                self.log.push_assistant_final(
                    format!("Unknown command {command}. {HELP_TEXT}"),
                    timestamp_now(),
                );
                sink.on_snapshot(&self.log.snapshot());
            }
        }
    }

    /// A turn that never reached the provider still surfaces the fixed error
    /// message as a finalized assistant reply.
    fn fail_without_provider(&mut self, sink: &mut dyn SnapshotSink) {
        let mut session = StreamSession::new();
        if let Some(snapshot) = session.open(&mut self.log, timestamp_now()) {
            sink.on_snapshot(&snapshot);
        }
        if let Some(snapshot) = session.fail(&mut self.log) {
            sink.on_snapshot(&snapshot);
        }
        self.mode = Mode::Idle;
    }

    /// Apply one provider lifecycle event in arrival order.
    pub fn apply_turn_event(&mut self, event: TurnEvent, sink: &mut dyn SnapshotSink) {
        match event {
            TurnEvent::Started { turn_id } => self.on_turn_started(turn_id, sink),
            TurnEvent::Delta { turn_id, text } => self.on_turn_delta(turn_id, &text, sink),
            TurnEvent::Finished { turn_id } => self.on_turn_finished(turn_id, sink),
            TurnEvent::Failed { turn_id, error } => self.on_turn_failed(turn_id, &error, sink),
            TurnEvent::Cancelled { turn_id } => self.on_turn_cancelled(turn_id, sink),
        }
    }

    pub fn on_turn_started(&mut self, turn_id: TurnId, sink: &mut dyn SnapshotSink) {
        if !self.is_active_turn(turn_id) {
            return;
        }

        self.session = StreamSession::new();
        if let Some(snapshot) = self.session.open(&mut self.log, timestamp_now()) {
            sink.on_snapshot(&snapshot);
        }
    }

    pub fn on_turn_delta(&mut self, turn_id: TurnId, text: &str, sink: &mut dyn SnapshotSink) {
        if !self.is_active_turn(turn_id) {
            tracing::debug!(turn_id, "dropping delta for stale turn");
            return;
        }

        if let Some(snapshot) = self.session.append_delta(&mut self.log, text) {
            sink.on_snapshot(&snapshot);
        }
    }

    pub fn on_turn_finished(&mut self, turn_id: TurnId, sink: &mut dyn SnapshotSink) {
        if !self.is_active_turn(turn_id) {
            return;
        }

        if let Some(snapshot) = self.session.close(&mut self.log) {
            sink.on_snapshot(&snapshot);
        }
        self.finish_turn(turn_id);
    }

    pub fn on_turn_failed(&mut self, turn_id: TurnId, error: &str, sink: &mut dyn SnapshotSink) {
        if !self.is_active_turn(turn_id) {
            return;
        }

        tracing::warn!(turn_id, %error, "turn failed");
        if let Some(snapshot) = self.session.fail(&mut self.log) {
            sink.on_snapshot(&snapshot);
        }
        self.finish_turn(turn_id);
    }

    /// Cancellation is handled identically to a transport failure: the partial
    /// content is overwritten with the fixed error message.
    pub fn on_turn_cancelled(&mut self, turn_id: TurnId, sink: &mut dyn SnapshotSink) {
        if !self.is_active_turn(turn_id) {
            return;
        }

        if let Some(snapshot) = self.session.fail(&mut self.log) {
            sink.on_snapshot(&snapshot);
        }
        self.finish_turn(turn_id);
    }

    fn finish_turn(&mut self, turn_id: TurnId) {
        if self.cancelling_turn == Some(turn_id) {
            self.cancelling_turn = None;
        }
        if self.is_active_turn(turn_id) {
            self.mode = Mode::Idle;
        }
    }
}
