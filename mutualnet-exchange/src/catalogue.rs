//! Mutual-fund catalogue (§6 "Fund catalogue file").
//!
//! A static JSON mapping `fund_name -> { exchange_name -> { stock_symbol
//! -> integer_qty } }`, loaded once at startup. An absent or malformed
//! catalogue is a fatal startup error (§7).

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

/// Per-share stock quantities for one exchange leg of a fund.
pub type Legs = HashMap<String, HashMap<String, u32>>;

#[derive(Debug, Clone, Deserialize)]
pub struct FundCatalogue(HashMap<String, Legs>);

impl FundCatalogue {
    pub fn load(path: impl AsRef<Path>) -> mutualnet_core::error::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let catalogue: Self = serde_json::from_str(&text)?;
        if catalogue.0.is_empty() {
            return Err(mutualnet_core::error::MutualNetError::protocol(
                "fund catalogue is empty",
            ));
        }
        Ok(catalogue)
    }

    /// Expand `fund`'s per-share legs into the absolute stock quantities
    /// needed to buy `qty` shares. `None` if the fund is unknown (§4.F
    /// step 1: "unknown fund, return failure ... without creating an
    /// order").
    #[must_use]
    pub fn expand(&self, fund: &str, qty: u32) -> Option<Legs> {
        let per_share = self.0.get(fund)?;
        Some(
            per_share
                .iter()
                .map(|(exchange, stocks)| {
                    let scaled = stocks
                        .iter()
                        .map(|(symbol, per_share_qty)| (symbol.clone(), per_share_qty * qty))
                        .collect();
                    (exchange.clone(), scaled)
                })
                .collect(),
        )
    }

    #[must_use]
    pub fn contains(&self, fund: &str) -> bool {
        self.0.contains_key(fund)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FundCatalogue {
        let json = r#"{
            "FUND1": {"ExA": {"AAPL": 10, "MSFT": 10}},
            "FUND2": {"ExA": {"AAPL": 10}, "ExB": {"SAP": 20}}
        }"#;
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn expand_scales_by_requested_qty() {
        let cat = sample();
        let legs = cat.expand("FUND1", 2).unwrap();
        assert_eq!(legs["ExA"]["AAPL"], 20);
        assert_eq!(legs["ExA"]["MSFT"], 20);
    }

    #[test]
    fn expand_unknown_fund_is_none() {
        let cat = sample();
        assert!(cat.expand("NOPE", 1).is_none());
    }

    #[test]
    fn expand_spans_multiple_exchanges() {
        let cat = sample();
        let legs = cat.expand("FUND2", 1).unwrap();
        assert_eq!(legs.len(), 2);
        assert!(legs.contains_key("ExA"));
        assert!(legs.contains_key("ExB"));
    }
}
