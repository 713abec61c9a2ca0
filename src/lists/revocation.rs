use crate::core::time::serde_instant;
use crate::core::{MigrationError, Result};
use crate::dao::{DualStoreEntity, RevisionedEntity, ShardedEntity};
use crate::sharded::ShardedMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The revocation list is a singleton; this is its only id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RevocationListId;

impl RevocationListId {
    pub const NAME: &'static str = "SIGNED_MARK_REVOCATION_LIST";
}

impl fmt::Display for RevocationListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(Self::NAME)
    }
}

impl FromStr for RevocationListId {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self> {
        if s == Self::NAME {
            Ok(RevocationListId)
        } else {
            Err(MigrationError::InvalidArgument(format!("Unknown revocation list '{}'", s)))
        }
    }
}

/// Signed mark data (SMD) ids mapped to the instant they were revoked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedMarkRevocationList {
    revision_id: Option<u64>,
    #[serde(with = "serde_instant")]
    creation_time: DateTime<Utc>,
    revokes: BTreeMap<String, DateTime<Utc>>,
}

impl SignedMarkRevocationList {
    pub fn new(creation_time: DateTime<Utc>, revokes: BTreeMap<String, DateTime<Utc>>) -> Self {
        Self {
            revision_id: None,
            creation_time,
            revokes,
        }
    }

    pub fn empty() -> Self {
        Self::new(crate::core::START_OF_TIME, BTreeMap::new())
    }

    pub fn revision_id(&self) -> Option<u64> {
        self.revision_id
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    pub fn revokes(&self) -> &BTreeMap<String, DateTime<Utc>> {
        &self.revokes
    }

    /// True if `smd_id` was revoked strictly before `now`.
    pub fn is_smd_revoked(&self, smd_id: &str, now: DateTime<Utc>) -> bool {
        self.revokes.get(smd_id).is_some_and(|revoked| *revoked < now)
    }

    pub fn len(&self) -> usize {
        self.revokes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revokes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationListMetadata {
    pub revision_id: Option<u64>,
}

impl DualStoreEntity for SignedMarkRevocationList {
    type Id = RevocationListId;
    type Key = String;
    type Value = DateTime<Utc>;
    const KIND: &'static str = "SignedMarkRevocationList";

    fn id(&self) -> RevocationListId {
        RevocationListId
    }

    fn entries(&self) -> &BTreeMap<String, DateTime<Utc>> {
        &self.revokes
    }
}

impl ShardedEntity for SignedMarkRevocationList {
    type Metadata = RevocationListMetadata;

    fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    fn metadata(&self) -> RevocationListMetadata {
        RevocationListMetadata {
            revision_id: self.revision_id,
        }
    }

    fn assemble(
        _id: RevocationListId,
        map: ShardedMap<RevocationListMetadata, String, DateTime<Utc>>,
    ) -> Result<Self> {
        Ok(Self {
            revision_id: map.metadata.revision_id,
            creation_time: map.group.creation_time,
            revokes: map.entries,
        })
    }
}

impl RevisionedEntity for SignedMarkRevocationList {
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
    use chrono::Duration;

    #[test]
    fn test_revocation_is_strictly_before_now() {
        let now = Utc::now();
        let list = SignedMarkRevocationList::new(
            now,
            BTreeMap::from([
                ("smd-1".to_string(), now - Duration::hours(1)),
                ("smd-2".to_string(), now),
            ]),
        );

        assert!(list.is_smd_revoked("smd-1", now));
        assert!(!list.is_smd_revoked("smd-2", now));
        assert!(list.is_smd_revoked("smd-2", now + Duration::milliseconds(1)));
        assert!(!list.is_smd_revoked("smd-3", now));
    }

    #[test]
    fn test_singleton_id() {
        assert_eq!(
            RevocationListId::NAME.parse::<RevocationListId>().unwrap(),
            RevocationListId
        );
        assert!("OTHER".parse::<RevocationListId>().is_err());
        assert!(SignedMarkRevocationList::empty().is_empty());
    }
}
