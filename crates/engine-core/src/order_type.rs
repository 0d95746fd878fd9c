//! Order type (Market vs Limit).
//!
//! Market orders are immediate-or-cancel: they never rest in the book and
//! any unmatched remainder is canceled at the end of the matching pass.

use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn as_char(self) -> char {
        match self {
            OrderType::Market => 'M',
            OrderType::Limit => 'L',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'M' => Some(OrderType::Market),
            'L' => Some(OrderType::Limit),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
        }
    }
}
