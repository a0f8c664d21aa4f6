// src/models.rs
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub type UserId = i64;

/// Cash a freshly registered user starts with.
pub const STARTING_CASH_CENTS: i64 = 1_000_000;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub hash: String,
}

/// A user's current position in one symbol. `price` is the last trade price,
/// kept for display only.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Holding {
    pub symbol: String,
    pub shares: i64,
    pub price: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct TransactionRecord {
    pub symbol: String,
    pub shares: i64,
    pub price: i64,
    pub transacted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub name: String,
    pub price: Decimal,
}

#[derive(Debug, Serialize)]
pub struct PortfolioRow {
    pub symbol: String,
    pub name: String,
    pub shares: i64,
    pub price: Decimal,
    pub last_trade_price: Decimal,
    pub total_value: Decimal,
}

#[derive(Debug, Serialize)]
pub struct Portfolio {
    pub rows: Vec<PortfolioRow>,
    pub cash: Decimal,
    pub net_worth: Decimal,
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub symbol: String,
    pub shares: i64,
    pub price: Decimal,
    pub transacted_at: DateTime<Utc>,
}

impl From<TransactionRecord> for HistoryEntry {
    fn from(record: TransactionRecord) -> Self {
        HistoryEntry {
            symbol: record.symbol,
            shares: record.shares,
            price: from_cents(record.price),
            transacted_at: record.transacted_at,
        }
    }
}

/// Result of a committed buy or sell.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeReceipt {
    pub symbol: String,
    pub shares: i64,
    pub price: Decimal,
    pub amount: Decimal,
    pub cash: Decimal,
}

pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn to_cents(amount: Decimal) -> Option<i64> {
    round_money(amount)
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|cents| cents.to_i64())
}

pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Formats an amount as US dollars, e.g. `$1,234.56`.
pub fn usd(amount: Decimal) -> String {
    let rounded = round_money(amount);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = format!("{:.2}", rounded.abs());
    let (whole, fraction) = text.split_once('.').unwrap_or((&text, "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    format!("{}${}.{}", if negative { "-" } else { "" }, grouped, fraction)
}
