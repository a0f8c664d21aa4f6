// src/db.rs
use crate::models::{Holding, TransactionRecord, User, UserId, STARTING_CASH_CENTS};
use chrono::{DateTime, Utc};
use log::info;
use sqlx::sqlite::{Sqlite, SqlitePool, SqlitePoolOptions};
use sqlx::Executor;

pub async fn init(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    create_tables(&pool).await?;

    info!("Successfully connected to {}.", database_url);
    Ok(pool)
}

async fn create_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            hash TEXT NOT NULL,
            cash INTEGER NOT NULL DEFAULT {} CHECK (cash >= 0)
        )",
        STARTING_CASH_CENTS
    ))
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS holdings (
            user_id INTEGER NOT NULL REFERENCES users(id),
            symbol TEXT NOT NULL,
            shares INTEGER NOT NULL CHECK (shares > 0),
            price INTEGER NOT NULL,
            PRIMARY KEY (user_id, symbol)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id),
            symbol TEXT NOT NULL,
            shares INTEGER NOT NULL,
            price INTEGER NOT NULL,
            transacted_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions(user_id)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn insert_user<'e, E>(
    executor: E,
    username: &str,
    hash: &str,
) -> Result<UserId, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("INSERT INTO users (username, hash) VALUES (?, ?)")
        .bind(username)
        .bind(hash)
        .execute(executor)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn find_user_by_username<'e, E>(
    executor: E,
    username: &str,
) -> Result<Option<User>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, User>("SELECT id, username, hash FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(executor)
        .await
}

pub async fn fetch_cash<'e, E>(executor: E, user_id: UserId) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar("SELECT cash FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_one(executor)
        .await
}

/// Debits `cents` only if the balance covers it. Returns whether a row changed.
pub async fn debit_cash<'e, E>(
    executor: E,
    user_id: UserId,
    cents: i64,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE users SET cash = cash - ? WHERE id = ? AND cash >= ?")
        .bind(cents)
        .bind(user_id)
        .bind(cents)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn credit_cash<'e, E>(executor: E, user_id: UserId, cents: i64) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE users SET cash = cash + ? WHERE id = ?")
        .bind(cents)
        .bind(user_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn fetch_holdings<'e, E>(
    executor: E,
    user_id: UserId,
) -> Result<Vec<Holding>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Holding>(
        "SELECT symbol, shares, price FROM holdings WHERE user_id = ? ORDER BY symbol",
    )
    .bind(user_id)
    .fetch_all(executor)
    .await
}

pub async fn fetch_holding<'e, E>(
    executor: E,
    user_id: UserId,
    symbol: &str,
) -> Result<Option<Holding>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Holding>(
        "SELECT symbol, shares, price FROM holdings WHERE user_id = ? AND symbol = ?",
    )
    .bind(user_id)
    .bind(symbol)
    .fetch_optional(executor)
    .await
}

pub async fn add_to_holding<'e, E>(
    executor: E,
    user_id: UserId,
    symbol: &str,
    shares: i64,
    price: i64,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO holdings (user_id, symbol, shares, price) VALUES (?, ?, ?, ?)
         ON CONFLICT(user_id, symbol) DO UPDATE SET
            shares = shares + excluded.shares,
            price = excluded.price",
    )
    .bind(user_id)
    .bind(symbol)
    .bind(shares)
    .bind(price)
    .execute(executor)
    .await?;
    Ok(())
}

/// Removes `shares` from a holding that keeps a positive balance afterwards.
pub async fn reduce_holding<'e, E>(
    executor: E,
    user_id: UserId,
    symbol: &str,
    shares: i64,
    price: i64,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE holdings SET shares = shares - ?, price = ?
         WHERE user_id = ? AND symbol = ? AND shares > ?",
    )
    .bind(shares)
    .bind(price)
    .bind(user_id)
    .bind(symbol)
    .bind(shares)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Deletes a holding whose entire balance of `shares` is being sold.
pub async fn close_holding<'e, E>(
    executor: E,
    user_id: UserId,
    symbol: &str,
    shares: i64,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result =
        sqlx::query("DELETE FROM holdings WHERE user_id = ? AND symbol = ? AND shares = ?")
            .bind(user_id)
            .bind(symbol)
            .bind(shares)
            .execute(executor)
            .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn record_transaction<'e, E>(
    executor: E,
    user_id: UserId,
    symbol: &str,
    shares: i64,
    price: i64,
    transacted_at: DateTime<Utc>,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO transactions (user_id, symbol, shares, price, transacted_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(symbol)
    .bind(shares)
    .bind(price)
    .bind(transacted_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn fetch_history<'e, E>(
    executor: E,
    user_id: UserId,
) -> Result<Vec<TransactionRecord>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, TransactionRecord>(
        "SELECT symbol, shares, price, transacted_at FROM transactions
         WHERE user_id = ? ORDER BY id",
    )
    .bind(user_id)
    .fetch_all(executor)
    .await
}

/// Single-connection in-memory database; every connection to `:memory:` is a
/// separate database, so the pool must never open a second one.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    create_tables(&pool).await.unwrap();
    pool
}
