//! Optional LLM extraction path.
//!
//! When a model is configured, the extractor requests a JSON extraction
//! from the chat-completions endpoint. Any transport error, non-200
//! response, or malformed JSON falls back to the heuristic path at the
//! call site. The output shape is identical to the heuristic extraction.

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use crate::config::LlmConfig;
use crate::models::{Extraction, ExtractionMethod, MessageCategory, Side};

static JSON_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("json block regex"));

pub struct LlmExtractor {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct LlmExtraction {
    signal_type: Option<String>,
    symbol: Option<String>,
    entry_price: Option<Decimal>,
    stop_loss: Option<Decimal>,
    take_profit: Option<Decimal>,
    #[serde(default)]
    take_profits: Vec<Decimal>,
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl LlmExtractor {
    pub fn new(config: &LlmConfig, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    pub async fn extract(&self, text: &str) -> Result<Extraction> {
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": build_prompt(text)}],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("LLM request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("LLM API returned {}", response.status()));
        }

        let chat: ChatResponse = response.json().await.context("malformed LLM response")?;
        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| anyhow!("LLM response has no choices"))?;

        parse_response(content)
    }
}

fn build_prompt(text: &str) -> String {
    format!(
        "Analyze this trading signal message and extract: signal type \
         (buy or sell), trading symbol, entry price, stop loss, take \
         profit targets, and a confidence score between 0 and 1.\n\n\
         Message:\n{}\n\n\
         Respond with JSON only:\n\
         {{\"signal_type\": \"...\", \"symbol\": \"...\", \
         \"entry_price\": null, \"stop_loss\": null, \
         \"take_profit\": null, \"take_profits\": [], \
         \"confidence\": 0.0}}",
        text
    )
}

/// Parse the model output. The JSON object is located anywhere in the
/// response text; unknown side or symbol values yield a rejected field,
/// not an error, so the result still passes the standard validation.
fn parse_response(content: &str) -> Result<Extraction> {
    let block = JSON_BLOCK_RE
        .find(content)
        .ok_or_else(|| anyhow!("no JSON object in LLM response"))?;

    let parsed: LlmExtraction =
        serde_json::from_str(block.as_str()).context("invalid JSON in LLM response")?;

    let side = parsed.signal_type.as_deref().and_then(Side::parse);
    let take_profit = parsed
        .take_profit
        .or_else(|| parsed.take_profits.first().copied());
    let mut take_profits = parsed.take_profits;
    if take_profits.is_empty() {
        take_profits.extend(take_profit);
    }

    Ok(Extraction {
        // Category is decided heuristically by the caller
        category: MessageCategory::Commentary,
        modification_type: None,
        side,
        symbol: parsed.symbol.filter(|s| !s.is_empty()),
        entry: parsed.entry_price,
        entry_range: None,
        stop_loss: parsed.stop_loss,
        take_profit,
        take_profits,
        confidence: parsed.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
        method: ExtractionMethod::Llm,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_parse_plain_json_response() {
        let content = r#"{"signal_type": "buy", "symbol": "EURUSD", "entry_price": 1.1000, "stop_loss": 1.0950, "take_profit": 1.1100, "take_profits": [1.1100, 1.1150], "confidence": 0.85}"#;
        let extraction = parse_response(content).unwrap();

        assert_eq!(extraction.side, Some(Side::Buy));
        assert_eq!(extraction.symbol.as_deref(), Some("EURUSD"));
        assert_eq!(extraction.take_profits.len(), 2);
        assert_eq!(extraction.confidence, 0.85);
    }

    #[test]
    fn test_parse_json_embedded_in_prose() {
        let content = "Here is the extraction:\n{\"signal_type\": \"sell\", \"symbol\": \"XAUUSD\", \"entry_price\": 2030.5, \"stop_loss\": 2035, \"take_profit\": 2020, \"confidence\": 0.9}\nLet me know if you need more.";
        let extraction = parse_response(content).unwrap();

        assert_eq!(extraction.side, Some(Side::Sell));
        assert_eq!(
            extraction.entry,
            Some(Decimal::from_str("2030.5").unwrap())
        );
    }

    #[test]
    fn test_unknown_signal_type_rejected_at_boundary() {
        let content = r#"{"signal_type": "hold", "symbol": "EURUSD", "confidence": 0.8}"#;
        let extraction = parse_response(content).unwrap();
        assert_eq!(extraction.side, None);
    }

    #[test]
    fn test_no_json_is_an_error() {
        assert!(parse_response("I could not parse this message.").is_err());
    }

    #[test]
    fn test_single_tp_fills_list() {
        let content = r#"{"signal_type": "buy", "symbol": "EURUSD", "take_profit": 1.2, "confidence": 0.8}"#;
        let extraction = parse_response(content).unwrap();
        assert_eq!(extraction.take_profits.len(), 1);
    }
}
