/// Incremental UTF-8 decoder for byte streams.
///
/// Chunk boundaries may fall inside a multi-byte character. An incomplete
/// trailing sequence is held back until more bytes arrive or [`finish`] is
/// called; invalid sequences decode to U+FFFD instead of failing.
///
/// [`finish`]: Utf8StreamDecoder::finish
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    /// Feed arbitrary bytes and drain the longest decodable prefix as text.
    pub fn feed(&mut self, bytes: &[u8]) -> String {
        let mut data = std::mem::take(&mut self.pending);
        data.extend_from_slice(bytes);

        let keep = incomplete_suffix_len(&data);
        self.pending = data.split_off(data.len() - keep);

        match String::from_utf8(data) {
            Ok(text) => text,
            Err(error) => String::from_utf8_lossy(error.as_bytes()).into_owned(),
        }
    }

    /// Flush a held partial sequence. The tail can no longer complete, so it
    /// decodes to replacement output (empty when nothing was held).
    pub fn finish(&mut self) -> String {
        let tail = std::mem::take(&mut self.pending);
        if tail.is_empty() {
            String::new()
        } else {
            String::from_utf8_lossy(&tail).into_owned()
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Length of a trailing byte run that is a prefix of a multi-byte character.
///
/// Scans back at most three bytes (the longest incomplete prefix of a four-byte
/// sequence). Complete or outright invalid tails return zero and are left for
/// lossy decoding.
fn incomplete_suffix_len(data: &[u8]) -> usize {
    let scan = data.len().min(3);
    for back in 1..=scan {
        let byte = data[data.len() - back];
        if byte < 0x80 {
            return 0;
        }
        if byte >= 0xC0 {
            let needed = if byte >= 0xF0 {
                4
            } else if byte >= 0xE0 {
                3
            } else {
                2
            };
            return if needed > back { back } else { 0 };
        }
        // Continuation byte: keep scanning for the lead byte.
    }
    0
}

/// Splits decoded text into complete newline-terminated lines.
///
/// The last split part stays behind as `carry` until a future newline arrives,
/// even when it is empty. This is the canonical partial-line technique; keeping
/// it an explicit field makes mid-line chunk boundaries testable on their own.
#[derive(Debug, Default)]
pub struct LineAssembler {
    carry: String,
}

impl LineAssembler {
    /// Append a text chunk and drain complete lines in arrival order.
    ///
    /// Line terminators are stripped; a `\r` preceding the `\n` goes with
    /// them. Blank lines are valid emissions and are passed through.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.carry.push_str(chunk);

        let mut lines = Vec::new();
        while let Some(split) = self.carry.find('\n') {
            let mut line: String = self.carry.drain(..=split).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }

        lines
    }

    /// Emit a non-empty carry as the final line once the stream has closed.
    ///
    /// Must be called exactly once after end-of-stream, otherwise a response
    /// body without a trailing newline silently drops its last record.
    pub fn finish(&mut self) -> Option<String> {
        if self.carry.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.carry))
        }
    }

    pub fn has_partial(&self) -> bool {
        !self.carry.is_empty()
    }
}

/// Byte chunks in, complete NDJSON lines out.
#[derive(Debug, Default)]
pub struct NdjsonStreamDecoder {
    decoder: Utf8StreamDecoder,
    lines: LineAssembler,
}

impl NdjsonStreamDecoder {
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.lines.push(&self.decoder.feed(bytes))
    }

    /// Flush both stages at end-of-stream: decoder tail first, then any
    /// unterminated final line.
    pub fn finish(&mut self) -> Vec<String> {
        let tail = self.decoder.finish();
        let mut lines = self.lines.push(&tail);
        if let Some(last) = self.lines.finish() {
            lines.push(last);
        }
        lines
    }

    pub fn is_drained(&self) -> bool {
        !self.decoder.has_pending() && !self.lines.has_partial()
    }
}
