//! Mean-reversion strategy: fades price moves that stray too many standard
//! deviations from the rolling snapshot mean. Requires price history.

use chrono::{DateTime, Utc};

use crate::config::strategy::MeanReversionParams;
use crate::domain::signal::OrderType;
use crate::domain::{Position, Side, Signal};
use crate::engine::scanner::MarketView;

use super::{dec, ResolvedInstance, Strategy};

const VERSION: &str = "mean-reversion/1.1";

pub struct MeanReversion {
    params: MeanReversionParams,
    instance: ResolvedInstance,
}

/// Rolling mean and population standard deviation over a window.
fn mean_stdev(window: &[f64]) -> (f64, f64) {
    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    let variance = window.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

impl MeanReversion {
    #[must_use]
    pub fn new(params: MeanReversionParams, instance: ResolvedInstance) -> Self {
        Self { params, instance }
    }

    /// Z-score of the current price against the trailing window, when
    /// enough history exists and the window has any variance.
    fn zscore(&self, view: &MarketView) -> Option<f64> {
        let history = view.price_history.as_ref()?;
        if history.len() < self.params.min_history {
            return None;
        }
        let start = history.len().saturating_sub(self.params.window);
        let (mean, stdev) = mean_stdev(&history[start..]);
        if stdev <= f64::EPSILON {
            return None;
        }
        Some((view.price - mean) / stdev)
    }
}

impl Strategy for MeanReversion {
    fn name(&self) -> &str {
        &self.instance.name
    }

    fn version(&self) -> &str {
        VERSION
    }

    fn wants_price_history(&self) -> bool {
        true
    }

    fn order_type(&self) -> Option<OrderType> {
        self.instance.order_type
    }

    fn filter(&self, view: &MarketView) -> bool {
        view.hours_to_close > 0.0 && view.yes_token.is_some() && view.no_token.is_some()
    }

    fn scan(&self, views: &[MarketView], now: DateTime<Utc>) -> Vec<Signal> {
        views
            .iter()
            .filter_map(|view| {
                let z = self.zscore(view)?;
                if z.abs() < self.params.zscore_threshold {
                    return None;
                }
                // Price stretched high: fade with NO. Stretched low: buy YES.
                let (token, reference_price) = if z > 0.0 {
                    (view.no_token.clone()?, 1.0 - view.price)
                } else {
                    (view.yes_token.clone()?, view.price)
                };
                let mut signal = Signal::new(
                    self.name(),
                    VERSION,
                    view.market_id.clone(),
                    token,
                    Side::Buy,
                    format!("price {:.3} is {z:.2} stdevs from rolling mean", view.price),
                    (z.abs() - self.params.zscore_threshold).min(1.0) * 0.1,
                    (0.5 + z.abs() * 0.1).min(0.9),
                    dec(reference_price),
                    now,
                );
                signal.suggested_size = self.instance.size_usd;
                Some(signal)
            })
            .collect()
    }

    fn should_exit(
        &self,
        position: &Position,
        view: &MarketView,
        now: DateTime<Utc>,
    ) -> Option<Signal> {
        let z = self.zscore(view)?;
        // Exit once the stretch has reverted most of the way back.
        if z.abs() > 0.5 {
            return None;
        }
        Some(Signal::new(
            self.name(),
            VERSION,
            position.market_id.clone(),
            position.token_id.clone(),
            Side::Sell,
            format!("reverted to mean (z = {z:.2})"),
            0.0,
            0.5,
            dec(view.price),
            now,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::strategy::StrategiesConfig;
    use crate::domain::Tier;
    use crate::testkit::domain as fixtures;

    fn strategy() -> MeanReversion {
        let config = StrategiesConfig::parse_toml(
            "[[mean_reversion]]\nname = \"mr\"\nwindow = 10\nzscore_threshold = 2.0\nmin_history = 5\n",
        )
        .unwrap();
        MeanReversion::new(
            config.mean_reversion[0].clone(),
            ResolvedInstance {
                name: "mr".into(),
                size_usd: None,
                order_type: None,
            },
        )
    }

    fn view_with_history(price: f64, history: Vec<f64>) -> crate::engine::scanner::MarketView {
        let snapshot = fixtures::snapshot("0xa", price, Tier::T2);
        crate::engine::scanner::MarketView {
            market_id: snapshot.market_id.clone(),
            question: "q?".into(),
            category: None,
            yes_token: Some(crate::domain::TokenId::from("0xa-yes")),
            no_token: Some(crate::domain::TokenId::from("0xa-no")),
            tier: Tier::T2,
            price,
            best_bid: None,
            best_ask: None,
            spread: None,
            volume_24h: None,
            liquidity: None,
            hours_to_close: 10.0,
            end_date: fixtures::clock(),
            tracked_since: fixtures::clock(),
            flow_1h: None,
            whale_1h: None,
            price_history: Some(history),
            snapshot,
        }
    }

    #[test]
    fn requires_history() {
        let s = strategy();
        assert!(s.wants_price_history());
        let mut v = view_with_history(0.9, vec![0.5; 10]);
        v.price_history = None;
        assert!(s.scan(&[v], fixtures::clock()).is_empty());
    }

    #[test]
    fn fades_upward_stretch_with_no() {
        let s = strategy();
        // Window mean 0.5, tiny variance, current price far above.
        let history = vec![0.5, 0.51, 0.49, 0.5, 0.5, 0.51, 0.49, 0.5, 0.5, 0.5];
        let v = view_with_history(0.70, history);
        let signals = s.scan(&[v], fixtures::clock());
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].token_id.as_str(), "0xa-no");
    }

    #[test]
    fn buys_yes_on_downward_stretch() {
        let s = strategy();
        let history = vec![0.5, 0.51, 0.49, 0.5, 0.5, 0.51, 0.49, 0.5, 0.5, 0.5];
        let v = view_with_history(0.30, history);
        let signals = s.scan(&[v], fixtures::clock());
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].token_id.as_str(), "0xa-yes");
    }

    #[test]
    fn flat_window_never_signals() {
        let s = strategy();
        let v = view_with_history(0.9, vec![0.5; 10]);
        assert!(s.scan(&[v], fixtures::clock()).is_empty());
    }

    #[test]
    fn exits_once_reverted() {
        let s = strategy();
        let history = vec![0.5, 0.51, 0.49, 0.5, 0.5, 0.51, 0.49, 0.5, 0.5, 0.5];
        let position = crate::domain::Position::open(
            "mr",
            crate::domain::MarketId::from("0xa"),
            crate::domain::TokenId::from("0xa-no"),
            Side::Buy,
            rust_decimal_macros::dec!(0.30),
            rust_decimal_macros::dec!(50),
            rust_decimal::Decimal::ZERO,
            fixtures::clock(),
            true,
        );
        // Still stretched: hold.
        let stretched = view_with_history(0.70, history.clone());
        assert!(s.should_exit(&position, &stretched, fixtures::clock()).is_none());
        // Reverted: exit.
        let reverted = view_with_history(0.502, history);
        assert!(s.should_exit(&position, &reverted, fixtures::clock()).is_some());
    }
}
