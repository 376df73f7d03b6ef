//! Company-name → ticker normalisation for Understand output.
//!
//! A small static table of widely traded names. Matching is case-insensitive
//! and tolerates common corporate suffixes; anything unmatched stays a
//! `company` entity and flows through unchanged.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::state::{EntityKind, Understanding};

static TICKERS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("apple", "AAPL"),
        ("microsoft", "MSFT"),
        ("alphabet", "GOOGL"),
        ("google", "GOOGL"),
        ("amazon", "AMZN"),
        ("meta", "META"),
        ("facebook", "META"),
        ("nvidia", "NVDA"),
        ("tesla", "TSLA"),
        ("netflix", "NFLX"),
        ("berkshire hathaway", "BRK.B"),
        ("jpmorgan", "JPM"),
        ("jpmorgan chase", "JPM"),
        ("goldman sachs", "GS"),
        ("morgan stanley", "MS"),
        ("bank of america", "BAC"),
        ("exxon", "XOM"),
        ("exxon mobil", "XOM"),
        ("chevron", "CVX"),
        ("visa", "V"),
        ("mastercard", "MA"),
        ("intel", "INTC"),
        ("amd", "AMD"),
        ("advanced micro devices", "AMD"),
        ("broadcom", "AVGO"),
        ("salesforce", "CRM"),
        ("oracle", "ORCL"),
        ("ibm", "IBM"),
        ("walmart", "WMT"),
        ("disney", "DIS"),
        ("walt disney", "DIS"),
        ("coca-cola", "KO"),
        ("coca cola", "KO"),
        ("pepsico", "PEP"),
        ("boeing", "BA"),
        ("johnson & johnson", "JNJ"),
        ("pfizer", "PFE"),
    ])
});

const SUFFIXES: [&str; 6] = [" inc.", " inc", " corp.", " corp", " corporation", " co."];

/// Ticker for a company name, when the table knows it.
pub fn ticker_for(name: &str) -> Option<&'static str> {
    let mut key = name.trim().trim_end_matches(',').to_lowercase();
    for suffix in SUFFIXES {
        if let Some(stripped) = key.strip_suffix(suffix) {
            key = stripped.trim_end().trim_end_matches(',').to_string();
            break;
        }
    }
    TICKERS.get(key.as_str()).copied()
}

/// Rewrites `company` entities with known names into `ticker` entities.
pub fn apply(understanding: &mut Understanding) {
    for entity in &mut understanding.entities {
        if entity.kind == EntityKind::Company {
            if let Some(ticker) = ticker_for(&entity.value) {
                entity.kind = EntityKind::Ticker;
                entity.value = ticker.to_string();
            }
        }
    }
}
