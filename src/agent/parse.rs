//! Lenient extraction of a `Recommendation` from free-form backend output.
//!
//! This is the only place text is parsed. Order of attempts:
//! 1. a JSON object (fenced or raw) with action/confidence fields
//! 2. labelled lines such as `Action: BUY` / `Confidence: 72%`
//! 3. degrade to HOLD/0.5 flagged `parse_failed`

use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use tracing::warn;

use super::protocol::truncate;
use crate::domain::{Action, Recommendation};

const MAX_RATIONALE_CHARS: usize = 1200;

/// Turn raw backend text into a recommendation. Never fails.
pub fn parse_recommendation(agent: &str, raw: &str) -> Recommendation {
    let text = raw.trim();
    if text.is_empty() {
        warn!(agent, "backend returned empty output");
        return Recommendation::parse_failed(agent, "backend returned empty output");
    }

    if let Some(rec) = parse_json(agent, extract_json(text)) {
        return rec;
    }

    if let Some(rec) = parse_labelled(agent, text) {
        return rec;
    }

    warn!(agent, excerpt = %truncate(text, 120), "could not extract recommendation");
    Recommendation::parse_failed(
        agent,
        &format!("unparseable output: {}", truncate(text, 200)),
    )
}

/// Extract JSON from a response that may contain markdown code blocks
pub fn extract_json(text: &str) -> &str {
    // Try to find JSON in code blocks first
    if let Some(start) = text.find("```json") {
        if let Some(end) = text[start + 7..].find("```") {
            return text[start + 7..start + 7 + end].trim();
        }
    }

    // Try generic code blocks
    if let Some(start) = text.find("```") {
        if let Some(end) = text[start + 3..].find("```") {
            let content = text[start + 3..start + 3 + end].trim();
            // Skip language identifier if present
            if !content.starts_with('{') {
                if let Some(newline) = content.find('\n') {
                    return content[newline + 1..].trim();
                }
            }
            return content;
        }
    }

    // Try to find raw JSON object
    if let Some(start) = text.find('{') {
        if let Some(end) = text.rfind('}') {
            if end > start {
                return &text[start..=end];
            }
        }
    }

    text.trim()
}

fn parse_json(agent: &str, json_str: &str) -> Option<Recommendation> {
    let value: Value = serde_json::from_str(json_str).ok()?;
    let obj = value.as_object()?;

    let action = ["action", "recommendation", "decision", "verdict"]
        .iter()
        .filter_map(|k| obj.get(*k))
        .find_map(|v| v.as_str().and_then(Action::parse_loose))?;

    let confidence = obj.get("confidence").and_then(|v| match v {
        Value::Number(n) => n.as_f64().and_then(normalize_confidence),
        Value::String(s) => parse_confidence(s),
        _ => None,
    })?;

    let rationale = ["rationale", "reasoning", "summary", "analysis"]
        .iter()
        .filter_map(|k| obj.get(*k))
        .find_map(|v| v.as_str())
        .unwrap_or("")
        .trim()
        .to_string();

    let target = ["target_price", "price_target", "target"]
        .iter()
        .filter_map(|k| obj.get(*k))
        .find_map(json_price);
    let stop = ["stop_loss", "stop"]
        .iter()
        .filter_map(|k| obj.get(*k))
        .find_map(json_price);

    Some(build(agent, action, confidence, rationale, target, stop))
}

fn parse_labelled(agent: &str, text: &str) -> Option<Recommendation> {
    let action = labelled_value(text, &["action", "recommendation", "decision", "verdict"])
        .and_then(|v| leading_action(&v))?;
    let confidence = labelled_value(text, &["confidence"]).and_then(|v| parse_confidence(&v))?;
    let target = labelled_value(text, &["target price", "price target", "target"])
        .and_then(|v| parse_price(&v));
    let stop = labelled_value(text, &["stop loss", "stop-loss", "stop"]).and_then(|v| parse_price(&v));

    let rationale = labelled_value(text, &["rationale", "reasoning"])
        .unwrap_or_else(|| text.to_string());

    Some(build(agent, action, confidence, rationale, target, stop))
}

fn build(
    agent: &str,
    action: Action,
    confidence: f64,
    rationale: String,
    target: Option<Decimal>,
    stop: Option<Decimal>,
) -> Recommendation {
    let mut rec = Recommendation::new(agent, action, confidence, truncate(&rationale, MAX_RATIONALE_CHARS));
    rec.target_price = target;
    rec.stop_loss = stop;
    rec
}

/// Value after `label:` on the first line whose label matches (case-insensitive)
fn labelled_value(text: &str, labels: &[&str]) -> Option<String> {
    for line in text.lines() {
        let trimmed = line
            .trim()
            .trim_start_matches(|c: char| c == '-' || c == '*' || c == '#' || c.is_whitespace());
        let Some((key, value)) = trimmed.split_once(':') else {
            continue;
        };
        let key = key.trim().trim_matches('*').trim().to_lowercase();
        if labels.iter().any(|l| key == *l) {
            let value = value.trim().trim_matches('*').trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Longest action phrase at the start of a value ("strong buy - because ...")
fn leading_action(value: &str) -> Option<Action> {
    let words: Vec<&str> = value
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .collect();
    if words.len() >= 2 {
        if let Some(action) = Action::parse_loose(&format!("{} {}", words[0], words[1])) {
            return Some(action);
        }
    }
    words.first().and_then(|w| Action::parse_loose(w))
}

/// "0.72", "72%", "72" all mean 0.72
pub fn parse_confidence(s: &str) -> Option<f64> {
    let s = s.trim();
    let (number, percent) = match s.find('%') {
        Some(idx) => (&s[..idx], true),
        None => (s.split_whitespace().next().unwrap_or(""), false),
    };
    let v: f64 = number.trim().parse().ok()?;
    if percent {
        normalize_confidence(v / 100.0)
    } else {
        normalize_confidence(v)
    }
}

fn normalize_confidence(v: f64) -> Option<f64> {
    if !v.is_finite() || v < 0.0 {
        return None;
    }
    let v = if v > 1.0 && v <= 100.0 { v / 100.0 } else { v };
    (v <= 1.0).then_some(v)
}

/// "$1,234.50" -> 1234.50; non-positive or unparseable -> None
pub fn parse_price(s: &str) -> Option<Decimal> {
    let cleaned: String = s
        .trim()
        .split_whitespace()
        .next()?
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    let price = Decimal::from_str(&cleaned).ok()?;
    (price > Decimal::ZERO).then_some(price)
}

fn json_price(v: &Value) -> Option<Decimal> {
    match v {
        Value::Number(n) => n
            .as_f64()
            .filter(|f| f.is_finite())
            .and_then(|f| Decimal::from_str(&f.to_string()).ok())
            .filter(|d| *d > Decimal::ZERO),
        Value::String(s) => parse_price(s),
        _ => None,
    }
}
