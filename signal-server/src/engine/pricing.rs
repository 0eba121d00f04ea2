//! Entry pricing policy: decide between a market order and a resting
//! limit from the extracted entry levels and the live quote.

use rust_decimal::Decimal;

use crate::broker::Quote;
use crate::models::{EntryRange, Preferences, Side};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderPlan {
    Market,
    Limit { price: Decimal },
}

/// Pick the order type for one execution.
///
/// With an entry range, a buy goes to market while the ask is at or
/// inside the band and rests at the band's high otherwise; a sell
/// mirrors this at the band's low. Without a range, a configured limit
/// preference converts entries further than max_slippage pips from the
/// current price into resting limits. Everything else is a market
/// order at the prevailing price.
pub fn plan_entry(
    side: Side,
    entry: Option<Decimal>,
    entry_range: Option<EntryRange>,
    quote: Option<&Quote>,
    prefs: &Preferences,
) -> OrderPlan {
    let Some(quote) = quote else {
        return OrderPlan::Market;
    };

    let current = match side {
        Side::Buy => quote.ask,
        Side::Sell => quote.bid,
    };

    if let Some(range) = entry_range {
        return match side {
            Side::Buy if current <= range.high => OrderPlan::Market,
            Side::Buy => OrderPlan::Limit { price: range.high },
            Side::Sell if current >= range.low => OrderPlan::Market,
            Side::Sell => OrderPlan::Limit { price: range.low },
        };
    }

    if prefs.use_limit_orders {
        if let Some(entry) = entry {
            let distance = (current - entry).abs();
            if distance > prefs.max_slippage_pips * quote.pip() {
                return OrderPlan::Limit { price: entry };
            }
        }
    }

    OrderPlan::Market
}
