use crate::core::{MigrationError, PrimaryStore, Result};
use crate::property::TimeVersionedProperty;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Subsystems that migrate between stores on their own schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TransitionId {
    DomainLabelLists,
    SignedMarkRevocationList,
}

impl TransitionId {
    pub const ALL: [TransitionId; 2] =
        [TransitionId::DomainLabelLists, TransitionId::SignedMarkRevocationList];

    pub fn as_str(self) -> &'static str {
        match self {
            TransitionId::DomainLabelLists => "DOMAIN_LABEL_LISTS",
            TransitionId::SignedMarkRevocationList => "SIGNED_MARK_REVOCATION_LIST",
        }
    }
}

impl fmt::Display for TransitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransitionId {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        TransitionId::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                MigrationError::InvalidArgument(format!("Unknown transition id '{}'", wanted))
            })
    }
}

/// Which store is primary for one subsystem, over time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionSchedule {
    id: TransitionId,
    transitions: TimeVersionedProperty<PrimaryStore>,
}

impl TransitionSchedule {
    pub fn create(
        id: TransitionId,
        transitions: TimeVersionedProperty<PrimaryStore>,
    ) -> Result<Self> {
        transitions.check_validity()?;
        Ok(Self { id, transitions })
    }

    pub fn id(&self) -> TransitionId {
        self.id
    }

    pub fn primary_store_at(&self, instant: DateTime<Utc>) -> PrimaryStore {
        *self.transitions.value_at(instant)
    }

    pub fn transitions(&self) -> &TimeVersionedProperty<PrimaryStore> {
        &self.transitions
    }
}

impl fmt::Display for TransitionSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransitionSchedule {}: {}", self.id, self.transitions)
    }
}
