use super::{MigrationError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The backing store that is authoritative for a subsystem at a given time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrimaryStore {
    StoreA,
    StoreB,
}

impl PrimaryStore {
    /// The store that shadows this one.
    pub fn other(self) -> Self {
        match self {
            PrimaryStore::StoreA => PrimaryStore::StoreB,
            PrimaryStore::StoreB => PrimaryStore::StoreA,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PrimaryStore::StoreA => "STORE_A",
            PrimaryStore::StoreB => "STORE_B",
        }
    }
}

impl fmt::Display for PrimaryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrimaryStore {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().replace('_', "").as_str() {
            "STOREA" => Ok(PrimaryStore::StoreA),
            "STOREB" => Ok(PrimaryStore::StoreB),
            _ => Err(MigrationError::InvalidArgument(format!(
                "Unrecognized primary store '{}', expected STORE_A or STORE_B",
                s.trim()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_other_is_an_involution() {
        assert_eq!(PrimaryStore::StoreA.other(), PrimaryStore::StoreB);
        assert_eq!(PrimaryStore::StoreB.other().other(), PrimaryStore::StoreB);
    }

    #[test]
    fn test_parse_accepts_common_spellings() {
        assert_eq!("STORE_A".parse::<PrimaryStore>().unwrap(), PrimaryStore::StoreA);
        assert_eq!("StoreB".parse::<PrimaryStore>().unwrap(), PrimaryStore::StoreB);
        assert_eq!(" store_b ".parse::<PrimaryStore>().unwrap(), PrimaryStore::StoreB);
        assert!("CLOUD_SQL".parse::<PrimaryStore>().is_err());
    }
}
