use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-user trading preferences. Defaults are materialized on first read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    pub user_id: Uuid,
    /// Require explicit confirmation before any broker interaction
    pub manual_approval: bool,
    /// Total lot volume per signal, split across the TP fan-out
    pub risk_per_trade: Decimal,
    /// Maximum acceptable price deviation in pips before a limit order
    /// is preferred over market
    pub max_slippage_pips: Decimal,
    pub use_limit_orders: bool,
    pub default_sl_pips: i64,
    pub max_open_positions: i64,
}

impl Preferences {
    pub fn defaults_for(user_id: Uuid) -> Self {
        Self {
            user_id,
            manual_approval: true,
            risk_per_trade: Decimal::ONE,
            max_slippage_pips: Decimal::from(5),
            use_limit_orders: true,
            default_sl_pips: 20,
            max_open_positions: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let prefs = Preferences::defaults_for(Uuid::new_v4());
        assert!(prefs.manual_approval);
        assert_eq!(prefs.risk_per_trade, Decimal::ONE);
        assert_eq!(prefs.max_slippage_pips, Decimal::from(5));
        assert!(prefs.use_limit_orders);
        assert_eq!(prefs.default_sl_pips, 20);
        assert_eq!(prefs.max_open_positions, 5);
    }
}
