//! Signal model: one structured trade intent derived from a raw chat message.
//!
//! The raw message text is immutable once recorded; only `status` and
//! `processed_at` change afterwards.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message classification categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageCategory {
    ActionableSignal,
    Modification,
    Commentary,
}

impl MessageCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageCategory::ActionableSignal => "actionable_signal",
            MessageCategory::Modification => "modification",
            MessageCategory::Commentary => "commentary",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "actionable_signal" => Some(MessageCategory::ActionableSignal),
            "modification" => Some(MessageCategory::Modification),
            "commentary" => Some(MessageCategory::Commentary),
            _ => None,
        }
    }
}

/// Sub-kinds of signal modifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationType {
    BreakevenMove,
    Cancellation,
    PartialClose,
    StopAdjustment,
    TargetAdjustment,
}

impl ModificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModificationType::BreakevenMove => "breakeven_move",
            ModificationType::Cancellation => "cancellation",
            ModificationType::PartialClose => "partial_close",
            ModificationType::StopAdjustment => "stop_adjustment",
            ModificationType::TargetAdjustment => "target_adjustment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "breakeven_move" => Some(ModificationType::BreakevenMove),
            "cancellation" => Some(ModificationType::Cancellation),
            "partial_close" => Some(ModificationType::PartialClose),
            "stop_adjustment" => Some(ModificationType::StopAdjustment),
            "target_adjustment" => Some(ModificationType::TargetAdjustment),
            _ => None,
        }
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "buy" => Some(Side::Buy),
            "sell" => Some(Side::Sell),
            _ => None,
        }
    }
}

/// Signal lifecycle status. Monotone: pending -> processed | rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    Pending,
    Processed,
    Rejected,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::Pending => "pending",
            SignalStatus::Processed => "processed",
            SignalStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SignalStatus::Pending),
            "processed" => Some(SignalStatus::Processed),
            "rejected" => Some(SignalStatus::Rejected),
            _ => None,
        }
    }
}

/// How an extraction was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Heuristic,
    Llm,
}

/// Inclusive entry price band `[low, high]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntryRange {
    pub low: Decimal,
    pub high: Decimal,
}

/// Classifier output for one message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extraction {
    pub category: MessageCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modification_type: Option<ModificationType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_range: Option<EntryRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<Decimal>,
    #[serde(default)]
    pub take_profits: Vec<Decimal>,
    pub confidence: f64,
    pub method: ExtractionMethod,
}

impl Extraction {
    pub fn is_actionable(&self) -> bool {
        self.category == MessageCategory::ActionableSignal
    }

    /// TP fan-out list: explicit multi-TP list, else the single TP, else
    /// one slot with no target.
    pub fn fan_out_targets(&self) -> Vec<Option<Decimal>> {
        if !self.take_profits.is_empty() {
            self.take_profits.iter().copied().map(Some).collect()
        } else if let Some(tp) = self.take_profit {
            vec![Some(tp)]
        } else {
            vec![None]
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub channel_id: Uuid,
    pub raw_text: String,
    pub extracted: Extraction,
    pub category: MessageCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modification_type: Option<ModificationType>,
    pub actionable: bool,
    pub status: SignalStatus,
    pub received_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_category_serialization() {
        let json = serde_json::to_string(&MessageCategory::ActionableSignal).unwrap();
        assert_eq!(json, "\"actionable_signal\"");

        let cat: MessageCategory = serde_json::from_str("\"commentary\"").unwrap();
        assert_eq!(cat, MessageCategory::Commentary);
    }

    #[test]
    fn test_unknown_category_rejected() {
        let result: Result<MessageCategory, _> = serde_json::from_str("\"forecast\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_modification_type_serialization() {
        let json = serde_json::to_string(&ModificationType::BreakevenMove).unwrap();
        assert_eq!(json, "\"breakeven_move\"");
    }

    #[test]
    fn test_fan_out_targets_multi_tp() {
        let extraction = Extraction {
            category: MessageCategory::ActionableSignal,
            modification_type: None,
            side: Some(Side::Sell),
            symbol: Some("XAUUSD".to_string()),
            entry: Some(Decimal::from_str("4601.5").unwrap()),
            entry_range: None,
            stop_loss: Some(Decimal::from_str("4609.5").unwrap()),
            take_profit: Some(Decimal::from_str("4600").unwrap()),
            take_profits: vec![
                Decimal::from_str("4600").unwrap(),
                Decimal::from_str("4598").unwrap(),
                Decimal::from_str("4596").unwrap(),
            ],
            confidence: 1.0,
            method: ExtractionMethod::Heuristic,
        };

        assert_eq!(extraction.fan_out_targets().len(), 3);
    }

    #[test]
    fn test_fan_out_targets_no_tp() {
        let extraction = Extraction {
            category: MessageCategory::ActionableSignal,
            modification_type: None,
            side: Some(Side::Buy),
            symbol: Some("EURUSD".to_string()),
            entry: Some(Decimal::from_str("1.1000").unwrap()),
            entry_range: None,
            stop_loss: Some(Decimal::from_str("1.0950").unwrap()),
            take_profit: None,
            take_profits: vec![],
            confidence: 0.9,
            method: ExtractionMethod::Heuristic,
        };

        assert_eq!(extraction.fan_out_targets(), vec![None]);
    }
}
