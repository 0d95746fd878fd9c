//! engine-protocol
//!
//! Line-level encoding/decoding for the matching engine.
//!
//! This crate turns text lines into logical requests
//! ([`Request`]) and responses ([`Response`]) into text, and back.
//!
//! - [`json_codec`] : one JSON object per line (for programs)
//! - [`csv_codec`]  : compact comma-separated lines (for `nc` sessions and
//!   scripted scenarios)

pub mod wire_types;
pub mod json_codec;
pub mod csv_codec;

pub use wire_types::{ErrorKind, ProtocolError, Request, Response};
