// src/quote.rs
use crate::models::Quote;
use async_trait::async_trait;
use log::warn;
use reqwest::{Client, Url};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Source of live prices. A lookup never fails loudly: any problem reaching
/// or reading the upstream service is reported as `None`.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn lookup(&self, symbol: &str) -> Option<Quote>;
}

#[derive(Deserialize)]
struct IexQuoteResponse {
    symbol: String,
    #[serde(rename = "companyName")]
    company_name: String,
    #[serde(rename = "latestPrice")]
    latest_price: Option<f64>,
}

pub struct IexClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl IexClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        IexClient {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn quote_url(&self, symbol: &str) -> Option<Url> {
        let mut url = Url::parse(&self.base_url).ok()?;
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .extend(&["stock", symbol, "quote"]);
        url.query_pairs_mut().append_pair("token", &self.api_key);
        Some(url)
    }
}

#[async_trait]
impl QuoteProvider for IexClient {
    async fn lookup(&self, symbol: &str) -> Option<Quote> {
        let symbol = normalize_symbol(symbol)?;
        let url = self.quote_url(&symbol)?;

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Quote request for {} failed: {}", symbol, e);
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(
                "Quote provider returned HTTP {} for {}",
                response.status(),
                symbol
            );
            return None;
        }

        let body = match response.json::<IexQuoteResponse>().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to parse quote for {}: {}", symbol, e);
                return None;
            }
        };

        let price = body
            .latest_price
            .and_then(|p| Decimal::try_from(p).ok())
            .filter(|p| p.is_sign_positive() && !p.is_zero());
        match price {
            Some(price) => Some(Quote {
                symbol: body.symbol.to_uppercase(),
                name: body.company_name,
                price,
            }),
            None => {
                warn!("Quote for {} has no usable price", symbol);
                None
            }
        }
    }
}

/// Trims and upper-cases a ticker; blank input is not a symbol.
pub fn normalize_symbol(symbol: &str) -> Option<String> {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        None
    } else {
        Some(symbol.to_uppercase())
    }
}

/// In-process quote table used by tests in place of the HTTP service.
#[cfg(test)]
pub struct FixedQuotes {
    quotes: std::sync::RwLock<std::collections::HashMap<String, Quote>>,
}

#[cfg(test)]
impl FixedQuotes {
    pub fn new() -> Self {
        FixedQuotes {
            quotes: std::sync::RwLock::new(std::collections::HashMap::new()),
        }
    }

    pub fn set(&self, symbol: &str, name: &str, price: Decimal) {
        self.quotes.write().unwrap().insert(
            symbol.to_string(),
            Quote {
                symbol: symbol.to_string(),
                name: name.to_string(),
                price,
            },
        );
    }
}

#[cfg(test)]
#[async_trait]
impl QuoteProvider for FixedQuotes {
    async fn lookup(&self, symbol: &str) -> Option<Quote> {
        let symbol = normalize_symbol(symbol)?;
        self.quotes.read().unwrap().get(&symbol).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::net::SocketAddr;
    use warp::Filter;

    /// Serves a fake quote API on an ephemeral port.
    fn spawn_quote_server() -> SocketAddr {
        let route = warp::path!("stock" / String / "quote")
            .and(warp::query::<std::collections::HashMap<String, String>>())
            .map(|symbol: String, params: std::collections::HashMap<String, String>| {
                if params.get("token").map(String::as_str) != Some("pk_test") {
                    return warp::reply::with_status(
                        warp::reply::json(&"Unauthorized"),
                        warp::http::StatusCode::UNAUTHORIZED,
                    );
                }
                let body = match symbol.as_str() {
                    "NFLX" => serde_json::json!({
                        "symbol": "NFLX",
                        "companyName": "Netflix Inc.",
                        "latestPrice": 512.25
                    }),
                    "HALT" => serde_json::json!({
                        "symbol": "HALT",
                        "companyName": "Halted Corp",
                        "latestPrice": null
                    }),
                    "JUNK" => serde_json::json!({ "unexpected": true }),
                    _ => {
                        return warp::reply::with_status(
                            warp::reply::json(&"Unknown symbol"),
                            warp::http::StatusCode::NOT_FOUND,
                        )
                    }
                };
                warp::reply::with_status(warp::reply::json(&body), warp::http::StatusCode::OK)
            });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        addr
    }

    #[tokio::test]
    async fn looks_up_quote_over_http() {
        let addr = spawn_quote_server();
        let client = IexClient::new(&format!("http://{}/", addr), "pk_test");

        let quote = client.lookup(" nflx ").await.unwrap();
        assert_eq!(quote.symbol, "NFLX");
        assert_eq!(quote.name, "Netflix Inc.");
        assert_eq!(quote.price, dec!(512.25));
    }

    #[tokio::test]
    async fn upstream_failures_become_none() {
        let addr = spawn_quote_server();
        let client = IexClient::new(&format!("http://{}", addr), "pk_test");

        assert!(client.lookup("ZZZZ").await.is_none());
        assert!(client.lookup("HALT").await.is_none());
        assert!(client.lookup("JUNK").await.is_none());
        assert!(client.lookup("   ").await.is_none());

        let wrong_key = IexClient::new(&format!("http://{}", addr), "nope");
        assert!(wrong_key.lookup("NFLX").await.is_none());

        let unreachable = IexClient::new("http://127.0.0.1:9", "pk_test");
        assert!(unreachable.lookup("NFLX").await.is_none());
    }
}
