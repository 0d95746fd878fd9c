//! Interactive client: type CSV requests, they go over the wire as JSON,
//! and responses are printed back as CSV.

use std::env;
use std::io::{self, Write};

use anyhow::{bail, Result};
use engine_protocol::csv_codec::{format_response, parse_input_line};
use engine_protocol::json_codec::{format_request, parse_response_line};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[tokio::main]
async fn main() -> Result<()> {
    let addr = env::var("ENGINE_CLIENT_ADDR").unwrap_or_else(|_| "127.0.0.1:9000".to_string());

    println!("Connecting to {}...", addr);
    let stream = TcpStream::connect(&addr).await?;
    let (read_half, mut write_half) = stream.into_split();
    let mut responses = BufReader::new(read_half).lines();
    println!("Connected.");
    println!("Type CSV commands like:");
    println!("  N, AAPL, B, L, 100, 10");
    println!("  N, AAPL, S, M, -, 5");
    println!("  C, 1");
    println!("  B, AAPL   (order book)");
    println!("  T, AAPL   (trades)");
    println!("  S, 1      (order status)");
    println!("Type 'quit' or 'exit' to leave.\n");

    let stdin = io::stdin();

    loop {
        print!(">> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            println!("\nEOF on stdin, exiting client.");
            break;
        }

        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case("quit") || trimmed.eq_ignore_ascii_case("exit") {
            println!("Exiting client.");
            break;
        }

        let request = match parse_input_line(trimmed) {
            Ok(Some(request)) => request,
            Ok(None) => continue,
            Err(err) => {
                eprintln!("{}", err);
                continue;
            }
        };

        let mut payload = format_request(&request)?;
        payload.push('\n');
        write_half.write_all(payload.as_bytes()).await?;

        let Some(reply) = responses.next_line().await? else {
            bail!("server closed the connection");
        };
        for out in format_response(&parse_response_line(&reply)?) {
            println!("<< {}", out);
        }
    }

    Ok(())
}
