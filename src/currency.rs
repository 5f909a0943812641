use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LedgerError;

/// Supported account currencies
///
/// Stored as TEXT in `accounts.currency`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    INR,
    USD,
    EUR,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::INR, Currency::USD, Currency::EUR];

    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::INR => "INR",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "INR" => Ok(Currency::INR),
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            _ => Err(LedgerError::UnsupportedCurrency(s.to_string())),
        }
    }
}

impl TryFrom<String> for Currency {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_currency() {
        assert_eq!("INR".parse::<Currency>().unwrap(), Currency::INR);
        assert_eq!("usd".parse::<Currency>().unwrap(), Currency::USD);
        assert_eq!(" EUR ".parse::<Currency>().unwrap(), Currency::EUR);
    }

    #[test]
    fn test_unsupported_currency() {
        let err = "GBP".parse::<Currency>().unwrap_err();
        assert!(matches!(err, LedgerError::UnsupportedCurrency(ref c) if c == "GBP"));
        assert_eq!(err.code(), "UNSUPPORTED_CURRENCY");
    }

    #[test]
    fn test_display_roundtrips_through_try_from() {
        for c in Currency::ALL {
            assert_eq!(Currency::try_from(c.to_string()).unwrap(), c);
        }
    }

    #[test]
    fn test_serde_uppercase() {
        assert_eq!(serde_json::to_string(&Currency::EUR).unwrap(), "\"EUR\"");
        let c: Currency = serde_json::from_str("\"USD\"").unwrap();
        assert_eq!(c, Currency::USD);
    }
}
