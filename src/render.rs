//! Line-oriented snapshot renderer.
//!
//! The conversation core hands every state change to a [`SnapshotSink`]; this
//! module's stdout implementation prints finalized messages whole and streams
//! the in-flight message by printing only its newly-grown suffix, so deltas
//! appear incrementally on one line.

use std::io::Write;

use crate::session::Snapshot;

/// Render callback observing immutable conversation snapshots.
///
/// Invoked after turn start, after each delta, and after finalization.
pub trait SnapshotSink {
    fn on_snapshot(&mut self, snapshot: &Snapshot);
}

#[derive(Debug)]
pub struct StdoutRenderer<W: Write> {
    out: W,
    finalized: usize,
    /// Text of the in-flight message already printed to the current line.
    streamed: String,
    header_printed: bool,
}

impl<W: Write> StdoutRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            finalized: 0,
            streamed: String::new(),
            header_printed: false,
        }
    }

    /// Forget rendered state, e.g. after `/clear` rebuilt the log.
    pub fn reset(&mut self) {
        self.finalized = 0;
        self.streamed.clear();
        self.header_printed = false;
    }

    fn write_header(&mut self, role: &str, timestamp: &str) {
        let _ = write!(self.out, "[{timestamp}] {role}: ");
    }

    fn stream_in_flight(&mut self, role: &str, timestamp: &str, content: &str) {
        if !self.header_printed {
            self.write_header(role, timestamp);
            self.header_printed = true;
        }

        if let Some(suffix) = content.strip_prefix(self.streamed.as_str()) {
            let _ = write!(self.out, "{suffix}");
        } else {
            // Content no longer extends what went out; restart the line.
            let _ = writeln!(self.out);
            self.write_header(role, timestamp);
            let _ = write!(self.out, "{content}");
        }
        self.streamed = content.to_owned();
    }

    fn flush_final(&mut self, role: &str, timestamp: &str, content: &str) {
        if self.header_printed {
            if let Some(suffix) = content.strip_prefix(self.streamed.as_str()) {
                let _ = write!(self.out, "{suffix}");
            } else {
                // Failure overwrote the partial content; restart the line.
                let _ = writeln!(self.out);
                self.write_header(role, timestamp);
                let _ = write!(self.out, "{content}");
            }
        } else {
            self.write_header(role, timestamp);
            let _ = write!(self.out, "{content}");
        }

        let _ = writeln!(self.out);
        self.header_printed = false;
        self.streamed.clear();
    }
}

impl<W: Write> SnapshotSink for StdoutRenderer<W> {
    fn on_snapshot(&mut self, snapshot: &Snapshot) {
        let messages = snapshot.messages();
        if messages.len() < self.finalized {
            // The log shrank (cleared); start over.
            self.reset();
        }

        for index in self.finalized..messages.len() {
            let message = &messages[index];
            if snapshot.in_flight_index() == Some(index) {
                self.stream_in_flight(
                    message.role.as_str(),
                    &message.timestamp,
                    &message.content,
                );
            } else {
                self.flush_final(message.role.as_str(), &message.timestamp, &message.content);
                self.finalized = index + 1;
            }
        }

        let _ = self.out.flush();
    }
}
