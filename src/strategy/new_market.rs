//! New-market strategy: buys NO on freshly-listed long-dated markets.
//!
//! Newly-created contracts skew toward eventual NO resolution; this
//! instance takes a small statistical-prior position before the crowd
//! prices it in.

use chrono::{DateTime, Utc};

use crate::config::strategy::NewMarketParams;
use crate::domain::signal::OrderType;
use crate::domain::{Side, Signal};
use crate::engine::scanner::MarketView;

use super::{dec, ResolvedInstance, Strategy};

const VERSION: &str = "new-market/1.0";

pub struct NewMarket {
    params: NewMarketParams,
    instance: ResolvedInstance,
}

impl NewMarket {
    #[must_use]
    pub fn new(params: NewMarketParams, instance: ResolvedInstance) -> Self {
        Self { params, instance }
    }
}

impl Strategy for NewMarket {
    fn name(&self) -> &str {
        &self.instance.name
    }

    fn version(&self) -> &str {
        VERSION
    }

    fn order_type(&self) -> Option<OrderType> {
        self.instance.order_type
    }

    fn filter(&self, view: &MarketView) -> bool {
        view.no_token.is_some() && view.hours_to_close >= self.params.min_hours_to_close
    }

    fn scan(&self, views: &[MarketView], now: DateTime<Utc>) -> Vec<Signal> {
        views
            .iter()
            .filter_map(|view| {
                let tracked_hours =
                    (now - view.tracked_since).num_milliseconds() as f64 / 3_600_000.0;
                if tracked_hours > self.params.max_tracked_hours {
                    return None;
                }
                let no_token = view.no_token.clone()?;
                let no_price = 1.0 - view.price;
                let edge = self.params.no_prior - no_price;
                if edge <= 0.0 || no_price <= 0.0 {
                    return None;
                }
                let mut signal = Signal::new(
                    self.name(),
                    VERSION,
                    view.market_id.clone(),
                    no_token,
                    Side::Buy,
                    format!(
                        "new market tracked {tracked_hours:.1}h, NO at {no_price:.2} under prior {:.2}",
                        self.params.no_prior
                    ),
                    edge,
                    self.params.no_prior,
                    dec(no_price),
                    now,
                );
                signal.suggested_size = self.instance.size_usd;
                Some(signal)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::strategy::StrategiesConfig;
    use crate::domain::Tier;
    use crate::testkit::domain as fixtures;

    fn strategy() -> NewMarket {
        let config = StrategiesConfig::parse_toml(
            "[[new_market]]\nname = \"nm\"\nmax_tracked_hours = 24.0\nmin_hours_to_close = 168.0\nno_prior = 0.60\n",
        )
        .unwrap();
        NewMarket::new(
            config.new_market[0].clone(),
            ResolvedInstance {
                name: "nm".into(),
                size_usd: None,
                order_type: None,
            },
        )
    }

    fn view(price: f64, tracked_hours_ago: i64, hours_to_close: f64) -> crate::engine::scanner::MarketView {
        let snapshot = fixtures::snapshot("0xa", price, Tier::T0);
        crate::engine::scanner::MarketView {
            market_id: snapshot.market_id.clone(),
            question: "q?".into(),
            category: None,
            yes_token: Some(crate::domain::TokenId::from("0xa-yes")),
            no_token: Some(crate::domain::TokenId::from("0xa-no")),
            tier: Tier::T0,
            price,
            best_bid: None,
            best_ask: None,
            spread: None,
            volume_24h: None,
            liquidity: None,
            hours_to_close,
            end_date: fixtures::clock(),
            tracked_since: fixtures::clock() - chrono::Duration::hours(tracked_hours_ago),
            flow_1h: None,
            whale_1h: None,
            price_history: None,
            snapshot,
        }
    }

    #[test]
    fn buys_no_on_fresh_long_dated_markets() {
        let s = strategy();
        let v = view(0.55, 2, 400.0); // NO at 0.45 < prior 0.60
        assert!(s.filter(&v));
        let signals = s.scan(&[v], fixtures::clock());
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].token_id.as_str(), "0xa-no");
    }

    #[test]
    fn old_markets_are_skipped() {
        let s = strategy();
        let v = view(0.55, 100, 400.0);
        assert!(s.scan(&[v], fixtures::clock()).is_empty());
    }

    #[test]
    fn short_dated_markets_fail_the_filter() {
        let s = strategy();
        assert!(!s.filter(&view(0.55, 2, 24.0)));
    }

    #[test]
    fn rich_no_price_has_no_edge() {
        let s = strategy();
        let v = view(0.20, 2, 400.0); // NO at 0.80 > prior
        assert!(s.scan(&[v], fixtures::clock()).is_empty());
    }
}
