//! NO-bias strategy: buys the NO side in categories whose contracts
//! resolve NO at an empirically high base rate.

use chrono::{DateTime, Utc};

use crate::config::strategy::NoBiasParams;
use crate::domain::signal::OrderType;
use crate::domain::{Side, Signal};
use crate::engine::scanner::MarketView;

use super::{dec, ResolvedInstance, Strategy};

const VERSION: &str = "no-bias/1.2";

pub struct NoBias {
    params: NoBiasParams,
    instance: ResolvedInstance,
}

impl NoBias {
    #[must_use]
    pub fn new(params: NoBiasParams, instance: ResolvedInstance) -> Self {
        Self { params, instance }
    }

    fn category_matches(&self, view: &MarketView) -> bool {
        let Some(category) = &view.category else {
            return false;
        };
        self.params
            .categories
            .iter()
            .any(|c| c.eq_ignore_ascii_case(category))
    }
}

impl Strategy for NoBias {
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
        self.category_matches(view)
            && view.no_token.is_some()
            && view.liquidity.unwrap_or(0.0) >= self.params.min_liquidity
            && view.hours_to_close >= self.params.min_hours_to_close
            && view.hours_to_close <= self.params.max_hours_to_close
    }

    fn scan(&self, views: &[MarketView], now: DateTime<Utc>) -> Vec<Signal> {
        views
            .iter()
            .filter_map(|view| {
                let no_token = view.no_token.clone()?;
                let no_price = 1.0 - view.price;
                if no_price > self.params.max_no_price || no_price <= 0.0 {
                    return None;
                }
                // Edge is the base-rate payoff estimate over the NO price.
                let edge = self.params.no_base_rate - no_price;
                if edge <= 0.0 {
                    return None;
                }
                let mut signal = Signal::new(
                    self.name(),
                    VERSION,
                    view.market_id.clone(),
                    no_token,
                    Side::Buy,
                    format!(
                        "category {} resolves NO at base rate {:.2}, NO costs {:.2}",
                        view.category.as_deref().unwrap_or("?"),
                        self.params.no_base_rate,
                        no_price
                    ),
                    edge,
                    self.params.no_base_rate,
                    dec(no_price),
                    now,
                );
                signal.suggested_size = self.instance.size_usd;
                Some(signal)
            })
            .collect()
    }
}
