use serde_json::Value;

/// Typed outcome of parsing one NDJSON line.
///
/// Failures below this layer are values, never control flow: a malformed line
/// must not corrupt or terminate an otherwise-healthy stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedRecord {
    /// No usable delta: a blank line, or valid JSON without `message.content`
    /// (the protocol's `done` markers land here).
    Skip,
    /// Incremental assistant text extracted from `message.content`. An empty
    /// string is a valid delta.
    Delta(String),
    /// Not a well-formed record; the raw line is preserved for diagnostics.
    Malformed { raw: String },
}

impl ParsedRecord {
    pub fn is_delta(&self) -> bool {
        matches!(self, Self::Delta(_))
    }
}

/// Parse one complete line from the chat stream.
///
/// The only field this layer understands is the nested `message.content`
/// string; a `content` that is present but not a string is malformed rather
/// than silently concatenated.
pub fn parse_line(line: &str) -> ParsedRecord {
    if line.trim().is_empty() {
        return ParsedRecord::Skip;
    }

    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(_) => {
            return ParsedRecord::Malformed {
                raw: line.to_owned(),
            }
        }
    };

    match value.get("message").and_then(|message| message.get("content")) {
        Some(Value::String(content)) => ParsedRecord::Delta(content.clone()),
        Some(_) => ParsedRecord::Malformed {
            raw: line.to_owned(),
        },
        None => ParsedRecord::Skip,
    }
}
