//! Venue wire types.
//!
//! The discovery API is loose with types: numeric fields frequently arrive
//! as strings, and arrays of token ids arrive as JSON-encoded strings inside
//! the larger JSON object. Deserializers here tolerate both shapes and yield
//! `None` (never zero) for anything unparsable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::{Book, PriceLevel, TokenId};
use crate::venue::traits::MarketDescriptor;

/// Accept a number, a numeric string, or null.
fn de_f64_opt<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !s.is_empty() => s.parse::<f64>().ok(),
        _ => None,
    })
}

/// Accept a JSON array of strings, or the same array JSON-encoded as a
/// string (e.g. `"[\"Yes\",\"No\"]"`).
fn de_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(match v {
        Value::Array(arr) => arr
            .into_iter()
            .filter_map(|x| match x {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Value::String(s) => serde_json::from_str::<Vec<String>>(&s).unwrap_or_default(),
        _ => Vec::new(),
    })
}

/// Market row from the discovery (Gamma-style) API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GammaMarket {
    #[serde(rename = "conditionId")]
    pub condition_id: String,
    pub slug: String,
    pub question: Option<String>,
    pub category: Option<String>,
    #[serde(rename = "endDateIso", alias = "endDate")]
    pub end_date: Option<String>,
    pub active: Option<bool>,
    pub closed: Option<bool>,
    #[serde(rename = "enableOrderBook")]
    pub enable_order_book: Option<bool>,
    #[serde(deserialize_with = "de_string_list")]
    pub outcomes: Vec<String>,
    #[serde(rename = "outcomePrices", deserialize_with = "de_string_list")]
    pub outcome_prices: Vec<String>,
    #[serde(rename = "clobTokenIds", deserialize_with = "de_string_list")]
    pub clob_token_ids: Vec<String>,
    #[serde(rename = "volumeNum", alias = "volume", deserialize_with = "de_f64_opt")]
    pub volume_total: Option<f64>,
    #[serde(rename = "volume24hr", deserialize_with = "de_f64_opt")]
    pub volume_24h: Option<f64>,
    #[serde(rename = "volume1wk", deserialize_with = "de_f64_opt")]
    pub volume_1w: Option<f64>,
    #[serde(
        rename = "liquidityNum",
        alias = "liquidity",
        deserialize_with = "de_f64_opt"
    )]
    pub liquidity: Option<f64>,
    #[serde(rename = "bestBid", deserialize_with = "de_f64_opt")]
    pub best_bid: Option<f64>,
    #[serde(rename = "bestAsk", deserialize_with = "de_f64_opt")]
    pub best_ask: Option<f64>,
    #[serde(rename = "lastTradePrice", deserialize_with = "de_f64_opt")]
    pub last_trade_price: Option<f64>,
    #[serde(rename = "oneDayPriceChange", deserialize_with = "de_f64_opt")]
    pub price_change_1d: Option<f64>,
    #[serde(rename = "oneWeekPriceChange", deserialize_with = "de_f64_opt")]
    pub price_change_1w: Option<f64>,
    #[serde(rename = "oneMonthPriceChange", deserialize_with = "de_f64_opt")]
    pub price_change_1m: Option<f64>,
    #[serde(rename = "umaResolutionStatus")]
    pub resolution_status: Option<String>,
}

impl GammaMarket {
    /// Index of the YES / NO outcome in the venue's parallel arrays.
    fn outcome_index(&self, label: &str) -> Option<usize> {
        self.outcomes
            .iter()
            .position(|o| o.eq_ignore_ascii_case(label))
    }

    fn outcome_price(&self, index: usize) -> Option<f64> {
        self.outcome_prices.get(index)?.parse::<f64>().ok()
    }
}

impl From<GammaMarket> for MarketDescriptor {
    fn from(m: GammaMarket) -> Self {
        let yes_idx = m.outcome_index("Yes");
        let no_idx = m.outcome_index("No");
        let yes_token = yes_idx.and_then(|i| m.clob_token_ids.get(i).cloned());
        let no_token = no_idx.and_then(|i| m.clob_token_ids.get(i).cloned());
        let yes_price = yes_idx.and_then(|i| m.outcome_price(i));
        let no_price = no_idx.and_then(|i| m.outcome_price(i));
        let end_date = m
            .end_date
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Self {
            condition_id: m.condition_id,
            slug: m.slug,
            question: m.question.unwrap_or_default(),
            yes_token_id: yes_token,
            no_token_id: no_token,
            end_date,
            category: m.category,
            price: yes_price,
            best_bid: m.best_bid,
            best_ask: m.best_ask,
            last_trade_price: m.last_trade_price,
            price_change_1d: m.price_change_1d,
            price_change_1w: m.price_change_1w,
            price_change_1m: m.price_change_1m,
            volume_total: m.volume_total,
            volume_24h: m.volume_24h,
            volume_1w: m.volume_1w,
            liquidity: m.liquidity,
            active: m.active.unwrap_or(false),
            closed: m.closed.unwrap_or(false),
            enable_order_book: m.enable_order_book.unwrap_or(false),
            outcome_prices: yes_price.zip(no_price),
            resolution_status: m.resolution_status,
        }
    }
}

/// Raw price level from the CLOB REST book endpoint (strings, not numbers).
#[derive(Debug, Clone, Deserialize)]
pub struct RawLevel {
    pub price: String,
    pub size: String,
}

/// Order book response from the CLOB REST API.
#[derive(Debug, Clone, Deserialize)]
pub struct ClobBook {
    pub asset_id: String,
    #[serde(default)]
    pub bids: Vec<RawLevel>,
    #[serde(default)]
    pub asks: Vec<RawLevel>,
}

impl ClobBook {
    /// Convert to a domain [`Book`], silently dropping unparsable levels.
    #[must_use]
    pub fn to_book(&self) -> Book {
        Book::new(
            TokenId::from(self.asset_id.clone()),
            parse_levels(&self.bids),
            parse_levels(&self.asks),
        )
    }
}

fn parse_levels(levels: &[RawLevel]) -> Vec<PriceLevel> {
    levels
        .iter()
        .filter_map(|l| Some(PriceLevel::new(l.price.parse().ok()?, l.size.parse().ok()?)))
        .collect()
}

/// Midpoint response from the CLOB REST API.
#[derive(Debug, Clone, Deserialize)]
pub struct MidpointResponse {
    #[serde(deserialize_with = "de_f64_opt")]
    pub mid: Option<f64>,
}

/// Spread response from the CLOB REST API.
#[derive(Debug, Clone, Deserialize)]
pub struct SpreadResponse {
    #[serde(deserialize_with = "de_f64_opt")]
    pub spread: Option<f64>,
}

// ---------------------------------------------------------------------------
// WebSocket messages
// ---------------------------------------------------------------------------

/// Subscription request for the market channel.
#[derive(Debug, Serialize)]
pub struct SubscribeMessage {
    pub assets_ids: Vec<String>,
    #[serde(rename = "type")]
    pub msg_type: String,
}

impl SubscribeMessage {
    #[must_use]
    pub fn market(asset_ids: Vec<String>) -> Self {
        Self {
            assets_ids: asset_ids,
            msg_type: "market".into(),
        }
    }
}

/// Inbound feed event, tagged by `event_type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum WsEventMessage {
    LastTradePrice(WsTradeMessage),
    Book(WsBookMessage),
    PriceChange(WsPriceChangeMessage),
}

/// Execution event from the feed.
#[derive(Debug, Clone, Deserialize)]
pub struct WsTradeMessage {
    pub asset_id: String,
    #[serde(deserialize_with = "de_f64_opt")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "de_f64_opt")]
    pub size: Option<f64>,
    pub side: Option<String>,
    /// Epoch milliseconds, as a string.
    pub timestamp: Option<String>,
}

/// Full book event from the feed; only the top of book is consumed here.
#[derive(Debug, Clone, Deserialize)]
pub struct WsBookMessage {
    pub asset_id: String,
    #[serde(default)]
    pub bids: Vec<RawLevel>,
    #[serde(default)]
    pub asks: Vec<RawLevel>,
    pub timestamp: Option<String>,
}

/// Quote move without a trade.
#[derive(Debug, Clone, Deserialize)]
pub struct WsPriceChangeMessage {
    pub asset_id: String,
    #[serde(default, deserialize_with = "de_f64_opt")]
    pub price: Option<f64>,
    pub timestamp: Option<String>,
}

/// Parse an epoch-milliseconds string into a UTC timestamp.
#[must_use]
pub fn parse_epoch_millis(s: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(s?.parse::<i64>().ok()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gamma_market_parses_stringly_numbers() {
        let json = r#"{
            "conditionId": "0xm1",
            "slug": "will-it-rain",
            "question": "Will it rain?",
            "endDateIso": "2025-06-02T12:00:00Z",
            "active": true,
            "closed": false,
            "enableOrderBook": true,
            "outcomes": "[\"Yes\", \"No\"]",
            "outcomePrices": "[\"0.42\", \"0.58\"]",
            "clobTokenIds": "[\"111\", \"222\"]",
            "volume24hr": "15342.5",
            "liquidityNum": 9000.1,
            "bestBid": "0.41",
            "bestAsk": "0.43"
        }"#;
        let market: GammaMarket = serde_json::from_str(json).unwrap();
        assert_eq!(market.clob_token_ids, vec!["111", "222"]);
        assert_eq!(market.volume_24h, Some(15342.5));
        assert_eq!(market.liquidity, Some(9000.1));

        let descriptor = MarketDescriptor::from(market);
        assert_eq!(descriptor.yes_token_id.as_deref(), Some("111"));
        assert_eq!(descriptor.no_token_id.as_deref(), Some("222"));
        assert_eq!(descriptor.price, Some(0.42));
        assert_eq!(descriptor.best_bid, Some(0.41));
        assert!(descriptor.enable_order_book);
        assert!(descriptor.end_date.is_some());
    }

    #[test]
    fn unparsable_numbers_become_none_not_zero() {
        let json = r#"{
            "conditionId": "0xm2",
            "slug": "s",
            "volume24hr": "not-a-number",
            "liquidityNum": null
        }"#;
        let market: GammaMarket = serde_json::from_str(json).unwrap();
        assert_eq!(market.volume_24h, None);
        assert_eq!(market.liquidity, None);
    }

    #[test]
    fn clob_book_drops_bad_levels() {
        let book = ClobBook {
            asset_id: "111".into(),
            bids: vec![
                RawLevel {
                    price: "0.45".into(),
                    size: "100".into(),
                },
                RawLevel {
                    price: "oops".into(),
                    size: "5".into(),
                },
            ],
            asks: vec![],
        };
        let book = book.to_book();
        assert_eq!(book.bids().len(), 1);
        assert_eq!(book.best_bid().unwrap().price, 0.45);
    }

    #[test]
    fn ws_events_tag_by_event_type() {
        let trade = r#"{"event_type":"last_trade_price","asset_id":"111","price":"0.55","size":"250","side":"BUY","timestamp":"1717243200000"}"#;
        let parsed: WsEventMessage = serde_json::from_str(trade).unwrap();
        match parsed {
            WsEventMessage::LastTradePrice(t) => {
                assert_eq!(t.price, Some(0.55));
                assert_eq!(t.side.as_deref(), Some("BUY"));
            }
            _ => panic!("expected trade"),
        }

        let book = r#"{"event_type":"book","asset_id":"111","bids":[{"price":"0.5","size":"10"}],"asks":[],"timestamp":"1717243200000"}"#;
        assert!(matches!(
            serde_json::from_str::<WsEventMessage>(book).unwrap(),
            WsEventMessage::Book(_)
        ));
    }

    #[test]
    fn subscribe_message_wire_shape() {
        let msg = SubscribeMessage::market(vec!["111".into(), "222".into()]);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "market");
        assert_eq!(json["assets_ids"][1], "222");
    }

    #[test]
    fn epoch_millis_parse() {
        let ts = parse_epoch_millis(Some("1717243200000")).unwrap();
        assert_eq!(ts.timestamp(), 1_717_243_200);
        assert_eq!(parse_epoch_millis(Some("bogus")), None);
        assert_eq!(parse_epoch_millis(None), None);
    }
}
