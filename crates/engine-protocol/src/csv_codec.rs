//! CSV line codec.
//!
//! Input format (lines → [`Request`]):
//!
//! - Submit:
//!   `N, symbol, side(B or S), type(L or M), price(int or -), qty(int)`
//!
//! - Cancel:
//!   `C, orderId`
//!
//! - Order book:
//!   `B, symbol`
//!
//! - Trade history:
//!   `T, symbol`
//!
//! - Order status:
//!   `S, orderId`
//!
//! Output format ([`Response`] → one or more lines):
//!
//! - Order (submit result / status):
//!   `O, id, symbol, side, type, price|-, quantity, remaining, status`
//!   followed, for a submit, by one `T` line per trade.
//!
//! - Canceled:
//!   `X, id, symbol, remaining`
//!
//! - Order book:
//!   `B, symbol, side(B/S), id, price, remaining` per resting order,
//!   bids first; `B, symbol, -` when empty.
//!
//! - Trade:
//!   `T, id, symbol, buyOrderId, sellOrderId, price, quantity`;
//!   `T, symbol, -` when there are none.
//!
//! - Error:
//!   `E, kind, message`

use std::num::ParseIntError;

use engine_core::{NewOrder, Order, OrderType, Side, Trade};

use crate::wire_types::{ProtocolError, Request, Response};

/// Parse a single CSV line into a [`Request`].
///
/// Returns `Ok(None)` for blank lines or comments (starting with `#`).
pub fn parse_input_line(line: &str) -> Result<Option<Request>, ProtocolError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let tokens = split_and_trim(trimmed, ',');
    let request = match single_char(&tokens[0]) {
        Some('N') => parse_new_order(trimmed, &tokens)?,
        Some('C') => Request::Cancel {
            id: parse_id(trimmed, &tokens)?,
        },
        Some('B') => Request::OrderBook {
            symbol: parse_symbol(trimmed, &tokens)?,
        },
        Some('T') => Request::Trades {
            symbol: parse_symbol(trimmed, &tokens)?,
        },
        Some('S') => Request::OrderStatus {
            id: parse_id(trimmed, &tokens)?,
        },
        _ => return Err(ProtocolError::csv(trimmed, "unknown message type")),
    };
    Ok(Some(request))
}

fn parse_new_order(line: &str, tokens: &[String]) -> Result<Request, ProtocolError> {
    // N, symbol, side, type, price, qty
    if tokens.len() != 6 {
        return Err(ProtocolError::csv(line, "expected 6 fields"));
    }

    let symbol = tokens[1].clone();
    let side = single_char(&tokens[2])
        .and_then(Side::from_char)
        .ok_or_else(|| ProtocolError::csv(line, "side must be B or S"))?;
    let order_type = single_char(&tokens[3])
        .and_then(OrderType::from_char)
        .ok_or_else(|| ProtocolError::csv(line, "type must be L or M"))?;
    let price = match tokens[4].as_str() {
        "-" | "" => None,
        raw => Some(parse_i64(raw).map_err(|e| ProtocolError::csv(line, e.to_string()))?),
    };
    let quantity = parse_i64(&tokens[5]).map_err(|e| ProtocolError::csv(line, e.to_string()))?;

    Ok(Request::Submit(NewOrder {
        symbol,
        side,
        order_type,
        price,
        quantity,
    }))
}

fn parse_id(line: &str, tokens: &[String]) -> Result<u64, ProtocolError> {
    if tokens.len() != 2 {
        return Err(ProtocolError::csv(line, "expected 2 fields"));
    }
    tokens[1]
        .parse::<u64>()
        .map_err(|e| ProtocolError::csv(line, e.to_string()))
}

fn parse_symbol(line: &str, tokens: &[String]) -> Result<String, ProtocolError> {
    if tokens.len() != 2 || tokens[1].is_empty() {
        return Err(ProtocolError::csv(line, "expected a symbol"));
    }
    Ok(tokens[1].clone())
}

/// Format a [`Response`] as CSV lines.
pub fn format_response(resp: &Response) -> Vec<String> {
    match resp {
        Response::Order { order, trades } => std::iter::once(format_order(order))
            .chain(trades.iter().map(format_trade))
            .collect(),
        Response::OrderStatus { order } => vec![format_order(order)],
        Response::Canceled { order } => vec![format!(
            "X, {}, {}, {}",
            order.id, order.symbol, order.remaining_qty
        )],
        Response::OrderBook { symbol, buy, sell } => {
            if buy.is_empty() && sell.is_empty() {
                return vec![format!("B, {}, -", symbol)];
            }
            buy.iter()
                .chain(sell.iter())
                .map(|o| {
                    format!(
                        "B, {}, {}, {}, {}, {}",
                        symbol,
                        o.side.as_char(),
                        o.id,
                        format_price(o.price),
                        o.remaining_qty
                    )
                })
                .collect()
        }
        Response::Trades { symbol, trades } => {
            if trades.is_empty() {
                return vec![format!("T, {}, -", symbol)];
            }
            trades.iter().map(format_trade).collect()
        }
        Response::Error { kind, message } => vec![format!("E, {}, {}", kind.as_str(), message)],
    }
}

pub fn format_order(o: &Order) -> String {
    format!(
        "O, {}, {}, {}, {}, {}, {}, {}, {}",
        o.id,
        o.symbol,
        o.side.as_char(),
        o.order_type.as_char(),
        format_price(o.price),
        o.quantity,
        o.remaining_qty,
        o.status.as_str()
    )
}

pub fn format_trade(t: &Trade) -> String {
    format!(
        "T, {}, {}, {}, {}, {}, {}",
        t.id, t.symbol, t.buy_order_id, t.sell_order_id, t.price, t.quantity
    )
}

// -----------------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------------

fn format_price(price: Option<u64>) -> String {
    price.map_or_else(|| "-".to_string(), |p| p.to_string())
}

fn split_and_trim(s: &str, delimiter: char) -> Vec<String> {
    s.split(delimiter)
        .map(|tok| tok.trim().to_string())
        .collect()
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

fn parse_i64(s: &str) -> Result<i64, ParseIntError> {
    s.parse::<i64>()
}
