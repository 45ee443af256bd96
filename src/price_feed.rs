// 12.0: market data sources. the engine is agnostic to where prices come from;
// anything that can answer a batch quote request implements MarketDataSource.
// partial results are fine: a coin the source cannot quote is simply absent
// from the returned table and positions keep their last known mark.

use crate::portfolio::PriceTable;
use crate::types::{CoinId, Price};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PriceFeedError {
    #[error("price request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed price response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Batch quote in USD. Coins the source cannot quote are left out.
    async fn get_prices(&self, coins: &HashSet<CoinId>) -> Result<PriceTable, PriceFeedError>;
}

// 12.1: CoinGecko simple-price client.
pub struct CoinGeckoSource {
    client: reqwest::Client,
    base_url: String,
}

impl CoinGeckoSource {
    pub fn new() -> Self {
        Self::with_base_url("https://api.coingecko.com/api/v3")
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl Default for CoinGeckoSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataSource for CoinGeckoSource {
    async fn get_prices(&self, coins: &HashSet<CoinId>) -> Result<PriceTable, PriceFeedError> {
        if coins.is_empty() {
            return Ok(PriceTable::new());
        }

        let ids: Vec<&str> = coins.iter().map(|c| c.as_str()).collect();
        let url = format!("{}/simple/price", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("ids", ids.join(",")), ("vs_currencies", "usd".to_string())])
            .send()
            .await?
            .error_for_status()?;

        let body: HashMap<String, HashMap<String, Decimal>> = response.json().await?;

        let mut table = PriceTable::new();
        for (id, quotes) in body {
            let Some(usd) = quotes.get("usd") else {
                continue;
            };
            match Price::new(*usd) {
                Some(price) => {
                    table.insert(CoinId::new(id), price);
                }
                None => {
                    return Err(PriceFeedError::Malformed(format!(
                        "non-positive usd quote {usd} for {id}"
                    )))
                }
            }
        }
        Ok(table)
    }
}

// 12.2: fixed prices for simulations and tests.
#[derive(Debug, Default)]
pub struct StaticPriceSource {
    prices: RwLock<PriceTable>,
}

impl StaticPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prices(pairs: &[(&str, Decimal)]) -> Self {
        let source = Self::new();
        for (coin, value) in pairs {
            source.set_price(CoinId::new(*coin), Price::new_unchecked(*value));
        }
        source
    }

    pub fn set_price(&self, coin: CoinId, price: Price) {
        if let Ok(mut table) = self.prices.write() {
            table.insert(coin, price);
        }
    }

    pub fn remove_price(&self, coin: &CoinId) {
        if let Ok(mut table) = self.prices.write() {
            table.remove(coin);
        }
    }
}

#[async_trait]
impl MarketDataSource for StaticPriceSource {
    async fn get_prices(&self, coins: &HashSet<CoinId>) -> Result<PriceTable, PriceFeedError> {
        let table = self
            .prices
            .read()
            .map_err(|_| PriceFeedError::Malformed("price table poisoned".to_string()))?;
        Ok(table
            .iter()
            .filter(|(coin, _)| coins.contains(*coin))
            .map(|(coin, price)| (coin.clone(), *price))
            .collect())
    }
}
