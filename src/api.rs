// src/api.rs
use crate::auth::{self, LoginForm, RegisterForm, SessionKeys, SESSION_COOKIE};
use crate::db;
use crate::error::{handle_rejection, AppError};
use crate::models::{usd, HistoryEntry, UserId};
use crate::orders::{self, OrderForm};
use crate::portfolio;
use crate::quote::{normalize_symbol, QuoteProvider};
use crate::views;
use log::info;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::header::{HeaderMap, HeaderValue, CACHE_CONTROL, EXPIRES, PRAGMA};
use warp::http::Uri;
use warp::{Filter, Rejection, Reply};

const MAX_FORM_BYTES: u64 = 16 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub quotes: Arc<dyn QuoteProvider>,
    pub sessions: SessionKeys,
}

#[derive(Debug, Default, Deserialize)]
pub struct QuoteForm {
    pub symbol: Option<String>,
}

#[derive(Serialize)]
struct QuoteView {
    symbol: String,
    name: String,
    price: Decimal,
    formatted: String,
}

pub fn routes(state: AppState) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let index = warp::path::end()
        .and(warp::get())
        .and(with_user(state.sessions.clone()))
        .and(with_state(state.clone()))
        .and_then(index_handler);

    let buy_page = warp::path!("buy")
        .and(warp::get())
        .and(with_user(state.sessions.clone()))
        .map(|_: UserId| warp::reply::html(views::buy_form()));

    let buy = warp::path!("buy")
        .and(warp::post())
        .and(with_user(state.sessions.clone()))
        .and(with_state(state.clone()))
        .and(form_body::<OrderForm>())
        .and_then(buy_handler);

    let history = warp::path!("history")
        .and(warp::get())
        .and(with_user(state.sessions.clone()))
        .and(with_state(state.clone()))
        .and_then(history_handler);

    let login_page = warp::path!("login")
        .and(warp::get())
        .and(with_state(state.clone()))
        .map(|state: AppState| {
            warp::reply::with_header(
                warp::reply::html(views::login_form()),
                "set-cookie",
                state.sessions.clear_cookie(),
            )
        });

    let login = warp::path!("login")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(form_body::<LoginForm>())
        .and_then(login_handler);

    let logout = warp::path!("logout")
        .and(warp::get())
        .and(with_state(state.clone()))
        .map(|state: AppState| {
            warp::reply::with_header(
                warp::redirect::see_other(Uri::from_static("/login")),
                "set-cookie",
                state.sessions.clear_cookie(),
            )
        });

    let quote_page = warp::path!("quote")
        .and(warp::get())
        .and(with_user(state.sessions.clone()))
        .map(|_: UserId| warp::reply::html(views::quote_form()));

    let quote = warp::path!("quote")
        .and(warp::post())
        .and(with_user(state.sessions.clone()))
        .and(with_state(state.clone()))
        .and(form_body::<QuoteForm>())
        .and_then(quote_handler);

    let register_page = warp::path!("register")
        .and(warp::get())
        .map(|| warp::reply::html(views::register_form()));

    let register = warp::path!("register")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(form_body::<RegisterForm>())
        .and_then(register_handler);

    let sell_page = warp::path!("sell")
        .and(warp::get())
        .and(with_user(state.sessions.clone()))
        .and(with_state(state.clone()))
        .and_then(sell_page_handler);

    let sell = warp::path!("sell")
        .and(warp::post())
        .and(with_user(state.sessions.clone()))
        .and(with_state(state.clone()))
        .and(form_body::<OrderForm>())
        .and_then(sell_handler);

    let check = warp::path!("check")
        .and(warp::get())
        .and(with_state(state))
        .and(warp::query::<HashMap<String, String>>())
        .and_then(check_handler);

    index
        .or(buy_page)
        .or(buy)
        .or(history)
        .or(login_page)
        .or(login)
        .or(logout)
        .or(quote_page)
        .or(quote)
        .or(register_page)
        .or(register)
        .or(sell_page)
        .or(sell)
        .or(check)
        .recover(handle_rejection)
        .with(warp::reply::with::headers(no_cache_headers()))
        .with(warp::log("stock_trader"))
}

fn with_state(
    state: AppState,
) -> impl Filter<Extract = (AppState,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Resolves the session cookie to a user id, or rejects with `LoginRequired`.
fn with_user(
    sessions: SessionKeys,
) -> impl Filter<Extract = (UserId,), Error = Rejection> + Clone {
    warp::cookie::optional::<String>(SESSION_COOKIE).and_then(move |token: Option<String>| {
        let user = token.and_then(|token| sessions.verify_token(&token));
        async move { user.ok_or_else(|| warp::reject::custom(AppError::LoginRequired)) }
    })
}

fn form_body<T>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
where
    T: serde::de::DeserializeOwned + Send + 'static,
{
    warp::body::content_length_limit(MAX_FORM_BYTES).and(warp::body::form())
}

fn no_cache_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(EXPIRES, HeaderValue::from_static("0"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers
}

fn redirect_home() -> impl Reply {
    warp::redirect::see_other(Uri::from_static("/"))
}

fn login_redirect(state: &AppState, user_id: UserId) -> Result<impl Reply, Rejection> {
    let token = state.sessions.create_token(user_id)?;
    Ok(warp::reply::with_header(
        redirect_home(),
        "set-cookie",
        state.sessions.session_cookie(&token),
    ))
}

async fn index_handler(user_id: UserId, state: AppState) -> Result<impl Reply, Rejection> {
    let portfolio = portfolio::valuate(&state.pool, state.quotes.as_ref(), user_id).await?;
    Ok(warp::reply::json(&portfolio))
}

async fn buy_handler(
    user_id: UserId,
    state: AppState,
    form: OrderForm,
) -> Result<impl Reply, Rejection> {
    let order = form.validate()?;
    let receipt = orders::buy(&state.pool, state.quotes.as_ref(), user_id, &order).await?;
    info!(
        "User {} bought {} {} at {} for {}, cash left {}",
        user_id,
        receipt.shares,
        receipt.symbol,
        usd(receipt.price),
        usd(receipt.amount),
        usd(receipt.cash)
    );
    Ok(redirect_home())
}

async fn sell_page_handler(user_id: UserId, state: AppState) -> Result<impl Reply, Rejection> {
    let symbols = orders::sellable_symbols(&state.pool, user_id).await?;
    Ok(warp::reply::html(views::sell_form(&symbols)))
}

async fn sell_handler(
    user_id: UserId,
    state: AppState,
    form: OrderForm,
) -> Result<impl Reply, Rejection> {
    let order = form.validate()?;
    let receipt = orders::sell(&state.pool, state.quotes.as_ref(), user_id, &order).await?;
    info!(
        "User {} sold {} {} at {} for {}, cash now {}",
        user_id,
        receipt.shares,
        receipt.symbol,
        usd(receipt.price),
        usd(receipt.amount),
        usd(receipt.cash)
    );
    Ok(redirect_home())
}

async fn history_handler(user_id: UserId, state: AppState) -> Result<impl Reply, Rejection> {
    let history: Vec<HistoryEntry> = db::fetch_history(&state.pool, user_id)
        .await
        .map_err(AppError::from)?
        .into_iter()
        .map(HistoryEntry::from)
        .collect();
    Ok(warp::reply::json(&history))
}

async fn quote_handler(
    _user_id: UserId,
    state: AppState,
    form: QuoteForm,
) -> Result<impl Reply, Rejection> {
    let symbol = form
        .symbol
        .as_deref()
        .and_then(normalize_symbol)
        .ok_or(AppError::MissingField("symbol"))?;
    let quote = state
        .quotes
        .lookup(&symbol)
        .await
        .ok_or_else(|| AppError::InvalidSymbol(symbol.clone()))?;
    Ok(warp::reply::json(&QuoteView {
        formatted: format!(
            "A share of {} ({}) costs {}.",
            quote.name,
            quote.symbol,
            usd(quote.price)
        ),
        symbol: quote.symbol,
        name: quote.name,
        price: quote.price,
    }))
}

async fn login_handler(state: AppState, form: LoginForm) -> Result<impl Reply, Rejection> {
    let credentials = form.validate()?;
    let user_id = auth::authenticate(&state.pool, credentials).await?;
    login_redirect(&state, user_id)
}

async fn register_handler(state: AppState, form: RegisterForm) -> Result<impl Reply, Rejection> {
    let credentials = form.validate()?;
    let user_id = auth::register(&state.pool, credentials).await?;
    info!("New user {} signed in after registering", user_id);
    login_redirect(&state, user_id)
}

async fn check_handler(
    state: AppState,
    params: HashMap<String, String>,
) -> Result<impl Reply, Rejection> {
    let username = params.get("username").map(String::as_str).unwrap_or("");
    let available = auth::username_available(&state.pool, username).await?;
    Ok(warp::reply::json(&available))
}
