//! Live trade stream from the Binance websocket
//!
//! Each trade becomes a [`PriceTick`] sent over an mpsc channel. The
//! connection is re-established after a fixed delay whenever it drops, until
//! the receiving side goes away.

use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use futures_util::StreamExt;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

pub const DEFAULT_STREAM_URL: &str = "wss://stream.binance.com:9443/ws";
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// One observed trade price, time in Unix seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub price: Decimal,
    pub observed_at: i64,
}

/// `<symbol>@trade` payload
#[derive(Debug, Deserialize)]
struct TradeEvent {
    #[serde(rename = "e")]
    event: String,
    #[serde(rename = "p")]
    price: String,
    /// Trade time in milliseconds
    #[serde(rename = "T")]
    trade_time: i64,
}

/// Parse a trade event; anything else yields `None`
pub fn parse_trade_message(text: &str) -> Option<PriceTick> {
    let event: TradeEvent = serde_json::from_str(text).ok()?;
    if event.event != "trade" {
        return None;
    }
    Some(PriceTick {
        price: Decimal::from_str(&event.price).ok()?,
        observed_at: event.trade_time / 1000,
    })
}

#[derive(Debug, Clone)]
pub struct PriceStream {
    url: String,
    reconnect_delay: Duration,
}

impl PriceStream {
    pub fn new(symbol: &str) -> Self {
        Self::with_base_url(DEFAULT_STREAM_URL, symbol)
    }

    pub fn with_base_url(base_url: &str, symbol: &str) -> Self {
        Self {
            url: format!(
                "{}/{}@trade",
                base_url.trim_end_matches('/'),
                symbol.to_lowercase()
            ),
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Run the stream on a background task and hand back the receiving end
    pub fn spawn(self, capacity: usize) -> mpsc::Receiver<PriceTick> {
        let (tx, rx) = mpsc::channel(capacity);
        tokio::spawn(self.run(tx));
        rx
    }

    /// Forward ticks into `tx`, reconnecting until the receiver is dropped
    pub async fn run(self, tx: mpsc::Sender<PriceTick>) {
        loop {
            match self.forward_until_closed(&tx).await {
                Ok(()) => warn!(url = %self.url, "Trade stream closed"),
                Err(e) => warn!(url = %self.url, error = %e, "Trade stream failed"),
            }

            if tx.is_closed() {
                info!("Tick receiver dropped, stopping trade stream");
                return;
            }

            warn!(delay_secs = self.reconnect_delay.as_secs(), "Reconnecting trade stream");
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    async fn forward_until_closed(&self, tx: &mpsc::Sender<PriceTick>) -> Result<()> {
        let (mut ws_stream, _) = connect_async(self.url.as_str()).await?;
        info!(url = %self.url, "Connected to trade stream");

        while let Some(msg) = ws_stream.next().await {
            match msg? {
                Message::Text(text) => match parse_trade_message(&text) {
                    Some(tick) => {
                        if tx.send(tick).await.is_err() {
                            return Ok(());
                        }
                    }
                    None => warn!(message = %text, "Skipped unparseable stream message"),
                },
                Message::Close(frame) => {
                    debug!(?frame, "Close frame received");
                    break;
                }
                _ => {}
            }
        }

        Ok(())
    }
}
