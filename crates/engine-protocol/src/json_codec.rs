//! JSON line codec: one request or response object per line.

use crate::wire_types::{ProtocolError, Request, Response};

/// Parse a single JSON request line.
///
/// Returns `Ok(None)` for blank lines.
pub fn parse_request_line(line: &str) -> Result<Option<Request>, ProtocolError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(trimmed)?))
}

/// Encode a response as a single line (no trailing newline).
pub fn format_response(resp: &Response) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(resp)?)
}

/// Encode a request as a single line (no trailing newline).
pub fn format_request(req: &Request) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(req)?)
}

/// Parse a single JSON response line.
pub fn parse_response_line(line: &str) -> Result<Response, ProtocolError> {
    Ok(serde_json::from_str(line.trim())?)
}
