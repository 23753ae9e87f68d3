//! Flow-fade strategy: fades extreme one-sided order flow over the
//! trailing hour.

use chrono::{DateTime, Utc};

use crate::config::strategy::FlowFadeParams;
use crate::domain::signal::OrderType;
use crate::domain::{Side, Signal};
use crate::engine::scanner::MarketView;

use super::{dec, ResolvedInstance, Strategy};

const VERSION: &str = "flow-fade/1.0";

pub struct FlowFade {
    params: FlowFadeParams,
    instance: ResolvedInstance,
}

impl FlowFade {
    #[must_use]
    pub fn new(params: FlowFadeParams, instance: ResolvedInstance) -> Self {
        Self { params, instance }
    }
}

impl Strategy for FlowFade {
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
        view.flow_1h
            .map_or(false, |f| f.trade_count >= self.params.min_trades)
            && view.yes_token.is_some()
            && view.no_token.is_some()
    }

    fn scan(&self, views: &[MarketView], now: DateTime<Utc>) -> Vec<Signal> {
        views
            .iter()
            .filter_map(|view| {
                let flow = view.flow_1h?;
                if flow.volume <= 0.0 {
                    return None;
                }
                let buy_share = flow.buy_volume / flow.volume;
                // One-sided buying pressure: fade with NO; selling: fade
                // with YES.
                let (token, reference_price, faded) =
                    if buy_share >= self.params.imbalance_threshold {
                        (view.no_token.clone()?, 1.0 - view.price, "buy")
                    } else if buy_share <= 1.0 - self.params.imbalance_threshold {
                        (view.yes_token.clone()?, view.price, "sell")
                    } else {
                        return None;
                    };
                let imbalance = (buy_share - 0.5).abs() * 2.0;
                let mut signal = Signal::new(
                    self.name(),
                    VERSION,
                    view.market_id.clone(),
                    token,
                    Side::Buy,
                    format!(
                        "fading {faded} imbalance: {:.0}% of {:.0} volume in 1h",
                        buy_share * 100.0,
                        flow.volume
                    ),
                    imbalance * 0.05,
                    0.5 + imbalance * 0.15,
                    dec(reference_price),
                    now,
                );
                signal.suggested_size = self.instance.size_usd;
                Some(signal)
            })
            .collect()
    }
}
