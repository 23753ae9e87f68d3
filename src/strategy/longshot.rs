//! Longshot strategy: buys the heavily favored side near resolution.
//!
//! Prediction markets systematically underprice near-certain outcomes in
//! the final hours (the favorite-longshot bias); this instance buys the
//! favored token once its implied probability clears a high threshold.

use chrono::{DateTime, Utc};

use crate::config::strategy::LongshotParams;
use crate::domain::signal::OrderType;
use crate::domain::{Side, Signal};
use crate::engine::scanner::MarketView;

use super::{dec, ResolvedInstance, Strategy};

const VERSION: &str = "longshot/1.0";

pub struct Longshot {
    params: LongshotParams,
    instance: ResolvedInstance,
}

impl Longshot {
    #[must_use]
    pub fn new(params: LongshotParams, instance: ResolvedInstance) -> Self {
        Self { params, instance }
    }
}

impl Strategy for Longshot {
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
        view.hours_to_close > 0.0
            && view.hours_to_close <= self.params.max_hours_to_close
            && view.liquidity.unwrap_or(0.0) >= self.params.min_liquidity
    }

    fn scan(&self, views: &[MarketView], now: DateTime<Utc>) -> Vec<Signal> {
        views
            .iter()
            .filter_map(|view| {
                let yes_favored = view.price >= 0.5;
                let (token, favored_price) = if yes_favored {
                    (view.yes_token.clone()?, view.price)
                } else {
                    (view.no_token.clone()?, 1.0 - view.price)
                };
                if favored_price < self.params.min_probability || favored_price >= 1.0 {
                    return None;
                }
                let mut signal = Signal::new(
                    self.name(),
                    VERSION,
                    view.market_id.clone(),
                    token,
                    Side::Buy,
                    format!(
                        "favored side implied at {:.3} with {:.1}h to close",
                        favored_price, view.hours_to_close
                    ),
                    1.0 - favored_price,
                    favored_price,
                    dec(favored_price),
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

    fn strategy(min_probability: f64) -> Longshot {
        let config = StrategiesConfig::parse_toml(&format!(
            "[[longshot]]\nname = \"ls\"\nmin_probability = {min_probability}\nmax_hours_to_close = 48.0\nmin_liquidity = 0.0\n"
        ))
        .unwrap();
        Longshot::new(
            config.longshot[0].clone(),
            ResolvedInstance {
                name: "ls".into(),
                size_usd: None,
                order_type: None,
            },
        )
    }

    fn view(price: f64, hours: f64) -> crate::engine::scanner::MarketView {
        let snapshot = fixtures::snapshot("0xa", price, Tier::T3);
        crate::engine::scanner::MarketView {
            market_id: snapshot.market_id.clone(),
            question: "q?".into(),
            category: None,
            yes_token: Some(crate::domain::TokenId::from("0xa-yes")),
            no_token: Some(crate::domain::TokenId::from("0xa-no")),
            tier: Tier::T3,
            price,
            best_bid: None,
            best_ask: None,
            spread: None,
            volume_24h: None,
            liquidity: Some(5_000.0),
            hours_to_close: hours,
            end_date: fixtures::clock(),
            tracked_since: fixtures::clock(),
            flow_1h: None,
            whale_1h: None,
            price_history: None,
            snapshot,
        }
    }

    #[test]
    fn buys_favored_yes_above_threshold() {
        let s = strategy(0.92);
        let signals = s.scan(&[view(0.95, 3.0)], fixtures::clock());
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].token_id.as_str(), "0xa-yes");
        assert!((signals[0].confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn buys_favored_no_side_symmetrically() {
        let s = strategy(0.92);
        let signals = s.scan(&[view(0.04, 3.0)], fixtures::clock());
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].token_id.as_str(), "0xa-no");
    }

    #[test]
    fn ignores_toss_ups_and_stale_horizons() {
        let s = strategy(0.92);
        assert!(s.scan(&[view(0.60, 3.0)], fixtures::clock()).is_empty());
        assert!(!s.filter(&view(0.95, 100.0)));
    }
}
