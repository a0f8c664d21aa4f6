// src/portfolio.rs
use crate::db;
use crate::error::AppError;
use crate::models::{from_cents, round_money, Portfolio, PortfolioRow, UserId};
use crate::quote::QuoteProvider;
use log::warn;
use rust_decimal::Decimal;
use sqlx::SqlitePool;

/// Values every holding at the current market price. Quotes are fetched fresh
/// for each row; one failed lookup fails the whole valuation.
pub async fn valuate(
    pool: &SqlitePool,
    quotes: &dyn QuoteProvider,
    user_id: UserId,
) -> Result<Portfolio, AppError> {
    let holdings = db::fetch_holdings(pool, user_id).await?;
    let cash = from_cents(db::fetch_cash(pool, user_id).await?);

    let mut rows = Vec::with_capacity(holdings.len());
    let mut holdings_value = Decimal::ZERO;
    for holding in holdings {
        let quote = match quotes.lookup(&holding.symbol).await {
            Some(quote) => quote,
            None => {
                warn!("No quote for held symbol {}", holding.symbol);
                return Err(AppError::InvalidSymbol(holding.symbol));
            }
        };
        let total_value = round_money(quote.price * Decimal::from(holding.shares));
        holdings_value += total_value;
        rows.push(PortfolioRow {
            symbol: holding.symbol,
            name: quote.name,
            shares: holding.shares,
            price: quote.price,
            last_trade_price: from_cents(holding.price),
            total_value,
        });
    }

    Ok(Portfolio {
        rows,
        cash,
        net_worth: cash + holdings_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quote::FixedQuotes;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn net_worth_is_cash_plus_market_value() {
        let pool = db::test_pool().await;
        let quotes = FixedQuotes::new();
        quotes.set("AAPL", "Apple Inc.", dec!(150.50));
        quotes.set("MSFT", "Microsoft Corporation", dec!(300));

        let id = db::insert_user(&pool, "alice", "hash").await.unwrap();
        db::debit_cash(&pool, id, 300_000).await.unwrap();
        db::add_to_holding(&pool, id, "AAPL", 10, 10_000).await.unwrap();
        db::add_to_holding(&pool, id, "MSFT", 2, 25_000).await.unwrap();

        let portfolio = valuate(&pool, &quotes, id).await.unwrap();
        assert_eq!(portfolio.cash, dec!(7000));
        assert_eq!(portfolio.rows.len(), 2);
        assert_eq!(portfolio.rows[0].symbol, "AAPL");
        assert_eq!(portfolio.rows[0].name, "Apple Inc.");
        assert_eq!(portfolio.rows[0].last_trade_price, dec!(100));
        assert_eq!(portfolio.rows[0].total_value, dec!(1505));
        assert_eq!(portfolio.rows[1].total_value, dec!(600));
        assert_eq!(portfolio.net_worth, dec!(9105));
    }

    #[tokio::test]
    async fn revalues_on_every_call() {
        let pool = db::test_pool().await;
        let quotes = FixedQuotes::new();
        quotes.set("AAPL", "Apple Inc.", dec!(100));

        let id = db::insert_user(&pool, "alice", "hash").await.unwrap();
        db::add_to_holding(&pool, id, "AAPL", 10, 10_000).await.unwrap();

        let before = valuate(&pool, &quotes, id).await.unwrap();
        quotes.set("AAPL", "Apple Inc.", dec!(90));
        let after = valuate(&pool, &quotes, id).await.unwrap();

        assert_eq!(before.net_worth, dec!(11000));
        assert_eq!(after.net_worth, dec!(10900));
    }

    #[tokio::test]
    async fn missing_quote_aborts_valuation() {
        let pool = db::test_pool().await;
        let quotes = FixedQuotes::new();
        quotes.set("AAPL", "Apple Inc.", dec!(100));

        let id = db::insert_user(&pool, "alice", "hash").await.unwrap();
        db::add_to_holding(&pool, id, "AAPL", 1, 10_000).await.unwrap();
        db::add_to_holding(&pool, id, "GONE", 1, 10_000).await.unwrap();

        let err = valuate(&pool, &quotes, id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidSymbol(symbol) if symbol == "GONE"));
    }

    #[tokio::test]
    async fn empty_portfolio_is_just_cash() {
        let pool = db::test_pool().await;
        let id = db::insert_user(&pool, "alice", "hash").await.unwrap();

        let portfolio = valuate(&pool, &FixedQuotes::new(), id).await.unwrap();
        assert!(portfolio.rows.is_empty());
        assert_eq!(portfolio.net_worth, dec!(10000));
    }
}
