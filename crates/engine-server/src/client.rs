//! Per-connection request loop.
//!
//! A connection sends one request per line and gets the response lines
//! back in the same order. The first non-blank line fixes the connection's
//! format (JSON or CSV) for the rest of the session. Lines that do not
//! decode get a `bad_request` error in that format; the connection stays
//! open.

use std::sync::Arc;

use anyhow::Result;
use engine_protocol::{csv_codec, json_codec, ErrorKind, ProtocolError, Request, Response};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::exchange::Exchange;
use crate::types::{ClientId, ClientRegistry, WireFormat};

/// Run the client I/O loop for a single connection.
pub async fn run_client(
    client_id: ClientId,
    stream: TcpStream,
    exchange: Arc<Exchange>,
    clients: ClientRegistry,
) -> Result<()> {
    let result = serve_lines(client_id, stream, &exchange).await;
    clients.remove(&client_id);
    result
}

async fn serve_lines(client_id: ClientId, stream: TcpStream, exchange: &Exchange) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let mut format: Option<WireFormat> = None;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let wire = *format.get_or_insert_with(|| {
            let detected = WireFormat::detect(&line);
            info!(client = client_id.0, format = ?detected, "client protocol detected");
            detected
        });

        let response = match decode(wire, &line) {
            Ok(Some(request)) => exchange.handle(request).await,
            Ok(None) => continue,
            Err(err) => {
                warn!(client = client_id.0, %err, "undecodable line");
                Response::error(ErrorKind::BadRequest, err.to_string())
            }
        };

        let encoded = encode(wire, &response)?;
        debug!(client = client_id.0, lines = encoded.len(), "response");
        for out in encoded {
            write_half.write_all(out.as_bytes()).await?;
            write_half.write_all(b"\n").await?;
        }
        write_half.flush().await?;
    }

    Ok(())
}

fn decode(format: WireFormat, line: &str) -> Result<Option<Request>, ProtocolError> {
    match format {
        WireFormat::Json => json_codec::parse_request_line(line),
        WireFormat::Csv => csv_codec::parse_input_line(line),
    }
}

fn encode(format: WireFormat, response: &Response) -> Result<Vec<String>, ProtocolError> {
    match format {
        WireFormat::Json => Ok(vec![json_codec::format_response(response)?]),
        WireFormat::Csv => Ok(csv_codec::format_response(response)),
    }
}
