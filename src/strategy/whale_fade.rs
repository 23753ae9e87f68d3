//! Whale-fade strategy: takes the other side of the most recent large
//! trade on markets with meaningful whale activity.

use chrono::{DateTime, Utc};

use crate::config::strategy::WhaleFadeParams;
use crate::domain::signal::OrderType;
use crate::domain::{Side, Signal};
use crate::engine::scanner::MarketView;

use super::{dec, ResolvedInstance, Strategy};

const VERSION: &str = "whale-fade/1.0";

pub struct WhaleFade {
    params: WhaleFadeParams,
    instance: ResolvedInstance,
}

impl WhaleFade {
    #[must_use]
    pub fn new(params: WhaleFadeParams, instance: ResolvedInstance) -> Self {
        Self { params, instance }
    }
}

impl Strategy for WhaleFade {
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
        view.whale_1h.map_or(false, |w| w.whale_count > 0)
            && view.yes_token.is_some()
            && view.no_token.is_some()
    }

    fn scan(&self, views: &[MarketView], now: DateTime<Utc>) -> Vec<Signal> {
        views
            .iter()
            .filter_map(|view| {
                let whale = view.whale_1h?;
                let age = whale.time_since_whale_secs?;
                let last_side = whale.last_whale_side?;
                if age > self.params.max_whale_age_secs
                    || whale.whale_volume < self.params.min_whale_volume
                {
                    return None;
                }
                // Whale bought YES: fade by buying NO, and vice versa.
                let (token, reference_price) = match last_side {
                    Side::Buy => (view.no_token.clone()?, 1.0 - view.price),
                    Side::Sell => (view.yes_token.clone()?, view.price),
                };
                let mut signal = Signal::new(
                    self.name(),
                    VERSION,
                    view.market_id.clone(),
                    token,
                    Side::Buy,
                    format!(
                        "fading {} whale of {:.0} volume {age}s ago",
                        last_side.as_str(),
                        whale.whale_volume
                    ),
                    (whale.pct_volume_from_whales * 0.1).min(0.1),
                    0.55 + (whale.pct_volume_from_whales * 0.1).min(0.1),
                    dec(reference_price),
                    now,
                )
                .with_meta("whale_side", last_side.as_str());
                signal.suggested_size = self.instance.size_usd;
                Some(signal)
            })
            .collect()
    }
}
