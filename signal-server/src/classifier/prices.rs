//! Price level extraction: entry (single or range), stop loss, and
//! multi-target take profits, with a fallback scan that assigns leftover
//! significant numbers to missing fields.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::models::EntryRange;

/// Price token: 1-7 integer digits, up to 5 decimals.
const PRICE: &str = r"\b\d{1,7}(?:\.\d{1,5})?\b";

static PRICE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(PRICE).expect("price regex"));

static RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?:entry|enter|open|@|at|price|buy|sell)?[:\s]*({p})\s*(?:-|–|—|to|/)\s*({p})",
        p = PRICE
    ))
    .expect("range regex")
});

static ENTRY_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(&format!(
            r"(?:entry|enter|open|initial|@|at|price)[:\s]*({p})",
            p = PRICE
        ))
        .expect("entry regex"),
        Regex::new(&format!(
            r"(?:buy|sell)\s+(?:gold|silver|oil|us30|nas100|[\w/]+)?\s*({p})",
            p = PRICE
        ))
        .expect("entry-after-side regex"),
    ]
});

static SL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?:sl|stop\s*loss|stoploss|stop|risk)[:\s]*({p})",
        p = PRICE
    ))
    .expect("stop loss regex")
});

static TP_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?:tp|take\s*profit|target)\s*(?:\d+)?\s*(?:open|at|target)?[:\s]*({p})",
        p = PRICE
    ))
    .expect("tp label regex")
});

static TP_LIST_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // TP label followed by a slash/pipe separated list
        Regex::new(&format!(
            r"(?:tp|take\s*profit|target)s?[:\s]*({p}(?:\s*[/|]\s*{p})*)",
            p = PRICE
        ))
        .expect("tp list regex"),
        // Parenthesized price list, typically following a TP label
        Regex::new(&format!(r"\(\s*({p}(?:\s*[/|]\s*{p})*)\s*\)", p = PRICE))
            .expect("parenthesized list regex"),
    ]
});

static SINGLE_TP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?:tp|take\s*profit|target)[:\s]*({p})", p = PRICE))
        .expect("single tp regex")
});

#[derive(Debug, Clone, Default)]
pub struct ExtractedPrices {
    pub entry: Option<Decimal>,
    pub entry_range: Option<EntryRange>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub take_profits: Vec<Decimal>,
}

fn parse_price(token: &str) -> Option<Decimal> {
    Decimal::from_str(token).ok()
}

fn push_unique(values: &mut Vec<Decimal>, value: Decimal) {
    if !values.contains(&value) {
        values.push(value);
    }
}

/// Extract price levels. `text` is the raw message, `normalized` its
/// lowercase form.
pub fn extract(text: &str, normalized: &str) -> ExtractedPrices {
    let mut prices = ExtractedPrices::default();

    // 1. Entry range: two nearby prices joined by a dash, "to", or slash.
    //    Accept only when the two ends are within a factor of two.
    if let Some(captures) = RANGE_RE.captures(normalized) {
        if let (Some(p1), Some(p2)) = (parse_price(&captures[1]), parse_price(&captures[2])) {
            if !p2.is_zero() {
                let ratio = p1 / p2;
                if ratio > Decimal::new(5, 1) && ratio < Decimal::TWO {
                    let (low, high) = if p1 <= p2 { (p1, p2) } else { (p2, p1) };
                    prices.entry_range = Some(EntryRange { low, high });
                    prices.entry = Some(low);
                }
            }
        }
    }

    // Single entry price
    if prices.entry.is_none() {
        for re in ENTRY_RES.iter() {
            if let Some(captures) = re.captures(normalized) {
                prices.entry = parse_price(&captures[1]);
                break;
            }
        }
    }

    // 2. Stop loss
    if let Some(captures) = SL_RE.captures(normalized) {
        prices.stop_loss = parse_price(&captures[1]);
    }

    // 3. Take profits: every price following a TP label, then slash- and
    //    parenthesis-separated lists, deduplicated preserving order.
    for captures in TP_LABEL_RE.captures_iter(normalized) {
        if let Some(value) = parse_price(&captures[1]) {
            push_unique(&mut prices.take_profits, value);
        }
    }

    for re in TP_LIST_RES.iter() {
        if let Some(captures) = re.captures(normalized) {
            for token in PRICE_RE.find_iter(&captures[1]) {
                if let Some(value) = parse_price(token.as_str()) {
                    push_unique(&mut prices.take_profits, value);
                }
            }
        }
    }

    if let Some(first) = prices.take_profits.first() {
        prices.take_profit = Some(*first);
    }

    if prices.take_profit.is_none() {
        if let Some(captures) = SINGLE_TP_RE.captures(normalized) {
            if let Some(value) = parse_price(&captures[1]) {
                prices.take_profit = Some(value);
                push_unique(&mut prices.take_profits, value);
            }
        }
    }

    // 4. Fallback scan: remaining significant numbers fill missing
    //    fields in order entry -> SL -> additional TPs. Significant
    //    means > 10 or within [0.5x, 2x] of the entry, which filters
    //    out TP ordinals and similar labels.
    let all_numbers: Vec<Decimal> = PRICE_RE
        .find_iter(text)
        .filter_map(|token| parse_price(token.as_str()))
        .collect();

    let significant: Vec<Decimal> = all_numbers
        .into_iter()
        .filter(|n| {
            if *n > Decimal::TEN {
                return true;
            }
            if let Some(entry) = prices.entry {
                if !entry.is_zero() {
                    let ratio = *n / entry;
                    return ratio > Decimal::new(5, 1) && ratio < Decimal::TWO;
                }
            }
            false
        })
        .collect();

    let mut found: Vec<Decimal> = Vec::new();
    found.extend(prices.entry);
    found.extend(prices.stop_loss);
    if let Some(range) = prices.entry_range {
        found.push(range.low);
        found.push(range.high);
    }
    found.extend(prices.take_profits.iter().copied());

    let mut remaining: Vec<Decimal> = significant
        .iter()
        .copied()
        .filter(|n| !found.contains(n))
        .collect();

    if prices.entry.is_none() {
        if let Some(first) = significant.first() {
            prices.entry = Some(*first);
            remaining.retain(|n| n != first);
        }
    }

    if prices.stop_loss.is_none() && !remaining.is_empty() {
        prices.stop_loss = Some(remaining.remove(0));
    }

    for n in remaining {
        push_unique(&mut prices.take_profits, n);
    }

    if prices.take_profit.is_none() {
        prices.take_profit = prices.take_profits.first().copied();
    }

    prices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn extract_lower(text: &str) -> ExtractedPrices {
        extract(text, &text.to_lowercase())
    }

    #[test]
    fn test_entry_range_with_dash() {
        let prices = extract_lower("Sell Gold 4605.5 – 4601.5\nStop Loss 4609.5");
        let range = prices.entry_range.expect("range");
        assert_eq!(range.low, dec("4601.5"));
        assert_eq!(range.high, dec("4605.5"));
        assert_eq!(prices.entry, Some(dec("4601.5")));
        assert_eq!(prices.stop_loss, Some(dec("4609.5")));
    }

    #[test]
    fn test_range_rejected_when_ends_too_far_apart() {
        // 100 / 4000 fails the 0.5..2.0 ratio check, so no range forms
        let prices = extract_lower("buy eurusd 100 - 4000 sl 90");
        assert!(prices.entry_range.is_none());
    }

    #[test]
    fn test_single_entry_after_keyword() {
        let prices = extract_lower("EURUSD entry: 1.1000 SL 1.0950 TP 1.1100");
        assert_eq!(prices.entry, Some(dec("1.1000")));
        assert_eq!(prices.stop_loss, Some(dec("1.0950")));
        assert_eq!(prices.take_profit, Some(dec("1.1100")));
    }

    #[test]
    fn test_entry_after_side_and_symbol() {
        let prices = extract_lower("Buy gold 2030.5 SL 2025 TP 2040");
        assert_eq!(prices.entry, Some(dec("2030.5")));
    }

    #[test]
    fn test_multi_tp_labels() {
        let prices = extract_lower("sell gbpjpy 188.5 sl 189.2 tp1 188.0 tp2 187.5 tp3 187.0");
        assert_eq!(
            prices.take_profits,
            vec![dec("188.0"), dec("187.5"), dec("187.0")]
        );
        assert_eq!(prices.take_profit, Some(dec("188.0")));
    }

    #[test]
    fn test_parenthesized_tp_list() {
        let prices = extract_lower("Sell Gold 4605.5 – 4601.5\nStop Loss 4609.5\nTP4 Open (4594 / 4592 / 4588 / 4583)");
        assert!(prices.take_profits.contains(&dec("4594")));
        assert!(prices.take_profits.contains(&dec("4592")));
        assert!(prices.take_profits.contains(&dec("4588")));
        assert!(prices.take_profits.contains(&dec("4583")));
    }

    #[test]
    fn test_gold_multi_tp_full_message() {
        let text = "Sell Gold 4605.5 – 4601.5\nStop Loss 4609.5\nTP1 4600\nTP2 4598\nTP3 4596\nTP4 Open (4594 / 4592 / 4588 / 4583)";
        let prices = extract_lower(text);

        let range = prices.entry_range.expect("range");
        assert_eq!(range.low, dec("4601.5"));
        assert_eq!(range.high, dec("4605.5"));
        assert_eq!(prices.stop_loss, Some(dec("4609.5")));
        assert_eq!(
            prices.take_profits,
            vec![
                dec("4600"),
                dec("4598"),
                dec("4596"),
                dec("4594"),
                dec("4592"),
                dec("4588"),
                dec("4583"),
            ]
        );
    }

    #[test]
    fn test_tp_deduplication() {
        let prices = extract_lower("buy us30 44100 sl 44000 tp 44200 take profit 44200");
        assert_eq!(prices.take_profits, vec![dec("44200")]);
    }

    #[test]
    fn test_fallback_assigns_unlabelled_numbers() {
        // No SL/TP labels at all: first significant number is the entry,
        // the second becomes the stop, the rest become targets.
        let prices = extract_lower("us30 44100 44000 44200");
        assert_eq!(prices.entry, Some(dec("44100")));
        assert_eq!(prices.stop_loss, Some(dec("44000")));
        assert_eq!(prices.take_profits, vec![dec("44200")]);
    }

    #[test]
    fn test_sub_ten_numbers_without_entry_are_ignored() {
        // Small bare numbers are indistinguishable from TP ordinals and
        // never promoted by the fallback scan
        let prices = extract_lower("eurusd looking good, 3 setups ready");
        assert_eq!(prices.entry, None);
        assert_eq!(prices.stop_loss, None);
        assert!(prices.take_profits.is_empty());
    }

    #[test]
    fn test_extraction_is_pure() {
        let text = "Sell Gold 4605.5 – 4601.5\nStop Loss 4609.5\nTP1 4600";
        let a = extract_lower(text);
        let b = extract_lower(text);
        assert_eq!(a.entry, b.entry);
        assert_eq!(a.stop_loss, b.stop_loss);
        assert_eq!(a.take_profits, b.take_profits);
    }
}
