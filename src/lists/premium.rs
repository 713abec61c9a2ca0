use crate::core::time::serde_instant;
use crate::core::{MigrationError, Result};
use crate::dao::{DualStoreEntity, ReportStyle, RevisionedEntity, ShardedEntity};
use crate::sharded::{ShardedMap, record_prefix};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// An amount in hundredths of a currency unit, e.g. `USD 1250.00`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    currency: String,
    minor_units: i64,
}

impl Money {
    pub fn new(currency: &str, minor_units: i64) -> Result<Self> {
        if minor_units < 0 {
            return Err(MigrationError::InvalidArgument(format!(
                "Price cannot be negative: {} {}",
                currency, minor_units
            )));
        }
        Ok(Self {
            currency: parse_currency(currency)?,
            minor_units,
        })
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn minor_units(&self) -> i64 {
        self.minor_units
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{:02}", self.currency, self.minor_units / 100, self.minor_units % 100)
    }
}

impl FromStr for Money {
    type Err = MigrationError;

    /// `USD 100`, `USD 99.5` and `usd 1250.00` are all accepted.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            MigrationError::InvalidArgument(format!(
                "'{}' is not a price like 'USD 100.00'",
                s.trim()
            ))
        };
        let (currency, amount) = s.trim().split_once(char::is_whitespace).ok_or_else(invalid)?;
        let amount = amount.trim();
        let (whole, fraction) = amount.split_once('.').unwrap_or((amount, ""));
        if whole.is_empty()
            || fraction.len() > 2
            || !whole.bytes().all(|b| b.is_ascii_digit())
            || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let whole: i64 = whole.parse().map_err(|_| invalid())?;
        let fraction: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().map_err(|_| invalid())? * 10,
            _ => fraction.parse().map_err(|_| invalid())?,
        };
        let minor_units = whole
            .checked_mul(100)
            .and_then(|units| units.checked_add(fraction))
            .ok_or_else(invalid)?;
        Money::new(currency, minor_units)
    }
}

fn parse_currency(code: &str) -> Result<String> {
    let code = code.trim().to_ascii_uppercase();
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(MigrationError::InvalidArgument(format!(
            "'{}' is not a three-letter currency code",
            code
        )));
    }
    Ok(code)
}

/// A named price list for premium labels. Every price is in the list currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PremiumList {
    name: String,
    revision_id: Option<u64>,
    #[serde(with = "serde_instant")]
    creation_time: DateTime<Utc>,
    currency: String,
    prices: BTreeMap<String, Money>,
}

impl PremiumList {
    pub fn new(
        name: &str,
        creation_time: DateTime<Utc>,
        currency: &str,
        prices: impl IntoIterator<Item = (String, Money)>,
    ) -> Result<Self> {
        record_prefix(name)?;
        let currency = parse_currency(currency)?;
        let mut by_label = BTreeMap::new();
        for (label, price) in prices {
            let label = label.trim().to_ascii_lowercase();
            if label.is_empty() || label.contains(char::is_whitespace) {
                return Err(MigrationError::InvalidArgument(format!(
                    "'{}' is not a valid premium label",
                    label
                )));
            }
            if price.currency != currency {
                return Err(MigrationError::InvalidArgument(format!(
                    "List '{}' is priced in {}, but '{}' costs {}",
                    name, currency, label, price
                )));
            }
            if by_label.contains_key(&label) {
                return Err(MigrationError::InvalidArgument(format!(
                    "List '{}' cannot contain duplicate label '{}'",
                    name, label
                )));
            }
            by_label.insert(label, price);
        }
        Ok(Self {
            name: name.to_string(),
            revision_id: None,
            creation_time,
            currency,
            prices: by_label,
        })
    }

    /// Parse `label,CUR amount` lines; `#` starts a comment.
    pub fn parse(
        name: &str,
        creation_time: DateTime<Utc>,
        currency: &str,
        text: &str,
    ) -> Result<Self> {
        let mut prices = Vec::new();
        for (number, raw) in text.lines().enumerate() {
            let body = raw.split('#').next().unwrap_or_default().trim();
            if body.is_empty() {
                continue;
            }
            let (label, price) = body.split_once(',').ok_or_else(|| {
                MigrationError::InvalidArgument(format!(
                    "Line {} of list '{}' must be 'label,CUR amount': {}",
                    number + 1,
                    name,
                    raw
                ))
            })?;
            prices.push((label.to_string(), price.parse()?));
        }
        Self::new(name, creation_time, currency, prices)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn revision_id(&self) -> Option<u64> {
        self.revision_id
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Prices in label order
    pub fn iter_prices(&self) -> impl Iterator<Item = (&String, &Money)> {
        self.prices.iter()
    }

    pub fn price(&self, label: &str) -> Option<&Money> {
        self.prices.get(&label.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremiumListMetadata {
    pub currency: String,
    pub revision_id: Option<u64>,
}

impl DualStoreEntity for PremiumList {
    type Id = String;
    type Key = String;
    type Value = Money;
    const KIND: &'static str = "PremiumList";
    const REPORT_STYLE: ReportStyle = ReportStyle::Named;

    fn id(&self) -> String {
        self.name.clone()
    }

    fn entries(&self) -> &BTreeMap<String, Money> {
        &self.prices
    }
}

impl ShardedEntity for PremiumList {
    type Metadata = PremiumListMetadata;

    fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    fn metadata(&self) -> PremiumListMetadata {
        PremiumListMetadata {
            currency: self.currency.clone(),
            revision_id: self.revision_id,
        }
    }

    fn assemble(id: String, map: ShardedMap<PremiumListMetadata, String, Money>) -> Result<Self> {
        Ok(Self {
            name: id,
            revision_id: map.metadata.revision_id,
            creation_time: map.group.creation_time,
            currency: map.metadata.currency,
            prices: map.entries,
        })
    }
}

impl RevisionedEntity for PremiumList {
    fn revision_id(&self) -> Option<u64> {
        self.revision_id
    }

    fn with_revision_id(mut self, revision_id: u64) -> Self {
        self.revision_id = Some(revision_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::START_OF_TIME;

    #[test]
    fn test_money_parsing() {
        assert_eq!("USD 100".parse::<Money>().unwrap().minor_units(), 10_000);
        assert_eq!("usd 99.5".parse::<Money>().unwrap().to_string(), "USD 99.50");
        assert_eq!("JPY 0.07".parse::<Money>().unwrap().to_string(), "JPY 0.07");
        assert!("USD".parse::<Money>().is_err());
        assert!("USD -5".parse::<Money>().is_err());
        assert!("USD 1.005".parse::<Money>().is_err());
        assert!("DOLLARS 5".parse::<Money>().is_err());
        assert!("USD 99999999999999999999".parse::<Money>().is_err());
    }

    #[test]
    fn test_parse_list_text() {
        let text = "# premium labels\nrich,USD 1250.00\n\nGold , USD 80 # seasonal\n";
        let list = PremiumList::parse("tld-premium", START_OF_TIME, "USD", text).unwrap();

        assert_eq!(list.len(), 2);
        assert_eq!(list.currency(), "USD");
        assert_eq!(list.price("GOLD").unwrap().to_string(), "USD 80.00");
        assert_eq!(list.price("rich").unwrap().minor_units(), 125_000);
    }

    #[test]
    fn test_parse_rejects_bad_lines() {
        assert!(PremiumList::parse("l", START_OF_TIME, "USD", "rich").is_err());
        assert!(PremiumList::parse("l", START_OF_TIME, "USD", "rich,EUR 5").is_err());
        assert!(PremiumList::parse("l", START_OF_TIME, "USD", "rich,USD 5\nrich,USD 6").is_err());
        assert!(PremiumList::parse("l", START_OF_TIME, "US", "").is_err());
        assert!(PremiumList::parse("a/b", START_OF_TIME, "USD", "").is_err());
    }
}
