//! Transport-only Ollama chat API client primitives.
//!
//! This crate owns request building and incremental response decoding for the
//! newline-delimited JSON (`/api/chat`) streaming endpoint only. It intentionally
//! contains no conversation state and no runtime UI coupling.
//!
//! The decode pipeline is exposed as composable pieces so the chunk-boundary
//! behavior stays testable in isolation: [`Utf8StreamDecoder`] (bytes to text,
//! never splitting a multi-byte character), [`LineAssembler`] (partial-line carry
//! across chunks), and [`parse_line`] (one typed [`ParsedRecord`] per line).
//! Malformed lines are values, not errors; only transport-level failures
//! terminate a stream.

pub mod client;
pub mod config;
pub mod decode;
pub mod error;
pub mod headers;
pub mod payload;
pub mod record;
pub mod url;

pub use client::ChatApiClient;
pub use client::{StreamOutcome, StreamStats};
pub use config::ChatApiConfig;
pub use decode::{LineAssembler, NdjsonStreamDecoder, Utf8StreamDecoder};
pub use error::ChatApiError;
pub use payload::{ChatRequest, TurnMessage, TurnRole};
pub use record::{parse_line, ParsedRecord};
pub use url::normalize_chat_url;
