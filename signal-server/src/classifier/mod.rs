//! Message classifier and trade-intent extractor.
//!
//! Classification and heuristic extraction are pure functions of the
//! input text and perform no I/O. An optional LLM path may refine the
//! extracted fields; its output passes through the same validation
//! pipeline and the category decision is always heuristic.

mod llm;
mod prices;
mod symbols;

pub use llm::LlmExtractor;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{Extraction, ExtractionMethod, MessageCategory, ModificationType, Side};
use prices::ExtractedPrices;

/// Commentary patterns, checked before anything else to avoid false
/// positives on TP-hit notifications and news chatter.
static COMMENTARY_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"tp\d+\s*(hit|✅|reached)",
        r"\d+\+?\s*pips",
        r"(nfp|cpi|fomc|news)\s*(in|alert)",
        r"my analysis",
        r"i (hope|wish|expect)",
        r"patience is key",
        r"you guys know",
        r"(worst|best)\s*positions",
        r"signal\s*(get ready|coming)",
        r"this is not financial advice",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("commentary regex"))
    .collect()
});

/// Modification sub-kinds with their keyword sets, first match wins.
static MODIFICATION_RES: Lazy<Vec<(ModificationType, Vec<Regex>)>> = Lazy::new(|| {
    let compile = |patterns: &[&str]| {
        patterns
            .iter()
            .map(|p| Regex::new(p).expect("modification regex"))
            .collect::<Vec<_>>()
    };

    vec![
        (
            ModificationType::BreakevenMove,
            compile(&[
                r"\b(be|breakeven|break\s*even)\b",
                r"moving\s*(stops|sl|stop\s*loss).*\b(to\s*)?(be|breakeven)",
                r"stops?\s*(from|to)\s*(top\s*)?be",
                r"positions?\s*at\s*be",
            ]),
        ),
        (
            ModificationType::Cancellation,
            compile(&[
                r"cancel(l)?ing",
                r"cancel\s*(sell|buy)\s*(limit|stop)",
                r"delete\s*(order|pending)",
            ]),
        ),
        (
            ModificationType::PartialClose,
            compile(&[
                r"partial(ly)?\s*(close|exit)",
                r"close\s*half",
                r"(some|few)\s*positions?\s*closed",
                r"filled\s*the\s*zone",
            ]),
        ),
        (
            ModificationType::StopAdjustment,
            compile(&[r"(adjust|move|moving|trail)\s*(stop|sl)", r"new\s*stop"]),
        ),
        (
            ModificationType::TargetAdjustment,
            compile(&[
                r"(adjust|move|moving|raise|lower)\s*(tp|target|take\s*profit)",
                r"new\s*(tp|target)",
            ]),
        ),
    ]
});

const BUY_KEYWORDS: &[&str] = &["buy", "long", "go long", "bullish", "upside"];
const SELL_KEYWORDS: &[&str] = &["sell", "short", "bearish", "downside"];

fn detect_side(normalized: &str) -> Option<Side> {
    if BUY_KEYWORDS.iter().any(|kw| normalized.contains(kw)) {
        return Some(Side::Buy);
    }
    if SELL_KEYWORDS.iter().any(|kw| normalized.contains(kw)) {
        return Some(Side::Sell);
    }
    None
}

/// Category decision, evaluated in order: commentary patterns,
/// modification sub-kinds, then actionable when both a symbol and a
/// valid price structure (entry or range, plus SL or a target) resolve.
fn classify(
    normalized: &str,
    has_symbol: bool,
    prices: &ExtractedPrices,
) -> (MessageCategory, Option<ModificationType>) {
    for re in COMMENTARY_RES.iter() {
        if re.is_match(normalized) {
            return (MessageCategory::Commentary, None);
        }
    }

    for (kind, patterns) in MODIFICATION_RES.iter() {
        for re in patterns {
            if re.is_match(normalized) {
                return (MessageCategory::Modification, Some(*kind));
            }
        }
    }

    let has_entry = prices.entry.is_some() || prices.entry_range.is_some();
    let has_exit = prices.stop_loss.is_some() || !prices.take_profits.is_empty();
    if has_symbol && has_entry && has_exit {
        return (MessageCategory::ActionableSignal, None);
    }

    (MessageCategory::Commentary, None)
}

fn confidence(
    side: Option<Side>,
    symbol: Option<&str>,
    prices: &ExtractedPrices,
    text: &str,
) -> f64 {
    let mut confidence: f64 = 0.5;

    if side.is_some() {
        confidence += 0.15;
    }
    if symbol.is_some() {
        confidence += 0.15;
    }
    if prices.entry.is_some() {
        confidence += 0.10;
    }
    if prices.stop_loss.is_some() {
        confidence += 0.10;
    }
    if prices.take_profit.is_some() {
        confidence += 0.10;
    }

    if text.len() > 50 {
        confidence += 0.05;
    }
    if text.len() < 10 {
        confidence -= 0.05;
    }

    if symbol.is_none() || side.is_none() {
        confidence *= 0.7;
    }

    confidence.clamp(0.0, 1.0)
}

/// Heuristic extraction: a pure function of the message text.
pub fn extract(text: &str) -> Extraction {
    let normalized = text.to_lowercase();

    let symbol = symbols::resolve(text);
    let side = detect_side(&normalized);
    let prices = prices::extract(text, &normalized);
    let (category, modification_type) = classify(&normalized, symbol.is_some(), &prices);
    let confidence = confidence(side, symbol.as_deref(), &prices, text);

    Extraction {
        category,
        modification_type,
        side,
        symbol,
        entry: prices.entry,
        entry_range: prices.entry_range,
        stop_loss: prices.stop_loss,
        take_profit: prices.take_profit,
        take_profits: prices.take_profits,
        confidence,
        method: ExtractionMethod::Heuristic,
    }
}

/// Classifier with an optional LLM refinement stage.
pub struct Classifier {
    llm: Option<LlmExtractor>,
}

impl Classifier {
    pub fn new(llm: Option<LlmExtractor>) -> Self {
        Self { llm }
    }

    pub fn heuristic_only() -> Self {
        Self { llm: None }
    }

    /// Classify and extract. The category always comes from the
    /// heuristic decision; extracted fields may come from the LLM when
    /// configured and its response is well-formed. Any LLM failure
    /// falls back to the heuristic extraction.
    pub async fn parse(&self, text: &str) -> Extraction {
        let heuristic = extract(text);

        if let Some(llm) = &self.llm {
            match llm.extract(text).await {
                Ok(refined) => {
                    return Extraction {
                        category: heuristic.category,
                        modification_type: heuristic.modification_type,
                        method: ExtractionMethod::Llm,
                        ..refined
                    };
                }
                Err(e) => {
                    tracing::warn!("LLM extraction failed: {}, using heuristics", e);
                }
            }
        }

        heuristic
    }
}
