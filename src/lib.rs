//! Terminal chat frontend runtime.
//!
//! ## Provider bootstrap
//!
//! `chatline` selects its turn provider at startup:
//!
//! - `CHATLINE_PROVIDER=mock` (default) for deterministic local runs
//! - `CHATLINE_PROVIDER=ollama` for a real Ollama-style chat endpoint
//!
//! When `CHATLINE_PROVIDER=ollama`, set `CHATLINE_OLLAMA_CONFIG_PATH` to a
//! readable UTF-8 JSON file with this shape:
//!
//! ```json
//! {
//!   "base_url": "http://127.0.0.1:11434",
//!   "models": ["llama3"],
//!   "timeout_sec": 120
//! }
//! ```
//!
//! Contract notes:
//! - `models` is required and must include at least one non-empty model ID.
//! - `base_url` is optional and defaults to the local Ollama endpoint.
//! - `timeout_sec` is optional and must be > 0 when provided.
//! - Unknown JSON fields are rejected.
//!
//! ## Streaming contract
//!
//! One turn streams at a time. Provider lifecycle events arrive strictly in
//! order and are folded into the conversation through a per-turn
//! [`session::StreamSession`], which emits an immutable [`session::Snapshot`]
//! to the render sink after turn start, after every delta, and at
//! finalization. A transport failure or cancellation replaces the in-flight
//! reply wholesale with a fixed error message; partial content is never kept.

pub mod app;
pub mod commands;
pub mod providers;
pub mod render;
pub mod runtime;
pub mod session;
