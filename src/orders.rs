// src/orders.rs
use crate::db;
use crate::error::AppError;
use crate::models::{from_cents, to_cents, usd, TradeReceipt, UserId};
use crate::quote::{normalize_symbol, QuoteProvider};
use chrono::Utc;
use log::warn;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;
use sqlx::SqlitePool;

/// Raw buy/sell form as submitted.
#[derive(Debug, Default, Deserialize)]
pub struct OrderForm {
    pub symbol: Option<String>,
    pub shares: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub symbol: String,
    pub shares: i64,
}

impl OrderForm {
    pub fn validate(self) -> Result<OrderRequest, AppError> {
        let symbol = self
            .symbol
            .as_deref()
            .and_then(normalize_symbol)
            .ok_or(AppError::MissingField("symbol"))?;
        let shares = self
            .shares
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(AppError::MissingField("shares"))?;
        let shares: i64 = shares.parse().map_err(|_| AppError::InvalidShares)?;
        if shares <= 0 {
            return Err(AppError::InvalidShares);
        }
        Ok(OrderRequest { symbol, shares })
    }
}

/// Settles `shares × price` to whole cents. Buys round up and sells round
/// down, so sub-cent prices never favour the trader.
fn trade_amount(
    price: Decimal,
    shares: i64,
    strategy: RoundingStrategy,
) -> Option<(Decimal, i64)> {
    let amount = price
        .checked_mul(Decimal::from(shares))?
        .round_dp_with_strategy(2, strategy);
    Some((amount, to_cents(amount)?))
}

/// Buys at the live price. The cash debit, holding update and history entry
/// commit together or not at all.
pub async fn buy(
    pool: &SqlitePool,
    quotes: &dyn QuoteProvider,
    user_id: UserId,
    order: &OrderRequest,
) -> Result<TradeReceipt, AppError> {
    let quote = quotes
        .lookup(&order.symbol)
        .await
        .ok_or_else(|| AppError::InvalidSymbol(order.symbol.clone()))?;
    let price_cents = to_cents(quote.price).ok_or(AppError::InsufficientCash)?;
    let (cost, cost_cents) =
        trade_amount(quote.price, order.shares, RoundingStrategy::AwayFromZero)
            .ok_or(AppError::InsufficientCash)?;

    let mut tx = pool.begin().await?;

    let cash = db::fetch_cash(&mut *tx, user_id).await?;
    if cash < cost_cents || !db::debit_cash(&mut *tx, user_id, cost_cents).await? {
        warn!(
            "User {} cannot afford {} {} for {}",
            user_id,
            order.shares,
            order.symbol,
            usd(cost)
        );
        return Err(AppError::InsufficientCash);
    }
    db::add_to_holding(&mut *tx, user_id, &order.symbol, order.shares, price_cents).await?;
    db::record_transaction(
        &mut *tx,
        user_id,
        &order.symbol,
        order.shares,
        price_cents,
        Utc::now(),
    )
    .await?;

    tx.commit().await?;

    Ok(TradeReceipt {
        symbol: order.symbol.clone(),
        shares: order.shares,
        price: quote.price,
        amount: cost,
        cash: from_cents(cash - cost_cents),
    })
}

/// Sells at the live price. Only the holding for the requested symbol is
/// checked; it is removed once its share count reaches zero.
pub async fn sell(
    pool: &SqlitePool,
    quotes: &dyn QuoteProvider,
    user_id: UserId,
    order: &OrderRequest,
) -> Result<TradeReceipt, AppError> {
    let quote = quotes
        .lookup(&order.symbol)
        .await
        .ok_or_else(|| AppError::InvalidSymbol(order.symbol.clone()))?;
    let price_cents =
        to_cents(quote.price).ok_or_else(|| AppError::InvalidSymbol(order.symbol.clone()))?;
    let (proceeds, proceeds_cents) =
        trade_amount(quote.price, order.shares, RoundingStrategy::ToZero)
            .ok_or(AppError::InsufficientShares)?;

    let mut tx = pool.begin().await?;

    let held = db::fetch_holding(&mut *tx, user_id, &order.symbol)
        .await?
        .map(|holding| holding.shares)
        .unwrap_or(0);
    if order.shares > held {
        warn!(
            "User {} tried to sell {} {} but holds {}",
            user_id, order.shares, order.symbol, held
        );
        return Err(AppError::InsufficientShares);
    }

    let updated = if order.shares == held {
        db::close_holding(&mut *tx, user_id, &order.symbol, held).await?
    } else {
        db::reduce_holding(&mut *tx, user_id, &order.symbol, order.shares, price_cents).await?
    };
    if !updated {
        return Err(AppError::InsufficientShares);
    }
    db::credit_cash(&mut *tx, user_id, proceeds_cents).await?;
    db::record_transaction(
        &mut *tx,
        user_id,
        &order.symbol,
        -order.shares,
        price_cents,
        Utc::now(),
    )
    .await?;
    let cash = db::fetch_cash(&mut *tx, user_id).await?;

    tx.commit().await?;

    Ok(TradeReceipt {
        symbol: order.symbol.clone(),
        shares: order.shares,
        price: quote.price,
        amount: proceeds,
        cash: from_cents(cash),
    })
}

/// Distinct symbols the user can currently sell.
pub async fn sellable_symbols(pool: &SqlitePool, user_id: UserId) -> Result<Vec<String>, AppError> {
    let holdings = db::fetch_holdings(pool, user_id).await?;
    Ok(holdings.into_iter().map(|holding| holding.symbol).collect())
}
