use crate::core::time::serde_instant;
use crate::core::{MigrationError, Result};
use crate::dao::{DualStoreEntity, RevisionedEntity, ShardedEntity};
use crate::sharded::{ShardedMap, record_prefix};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Why a label is reserved, from least to most restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReservationType {
    AllowedInSunrise,
    NameCollision,
    ReservedForSpecificUse,
    ReservedForAnchorTenant,
    FullyBlocked,
}

impl ReservationType {
    pub const ALL: [ReservationType; 5] = [
        ReservationType::AllowedInSunrise,
        ReservationType::NameCollision,
        ReservationType::ReservedForSpecificUse,
        ReservationType::ReservedForAnchorTenant,
        ReservationType::FullyBlocked,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReservationType::AllowedInSunrise => "ALLOWED_IN_SUNRISE",
            ReservationType::NameCollision => "NAME_COLLISION",
            ReservationType::ReservedForSpecificUse => "RESERVED_FOR_SPECIFIC_USE",
            ReservationType::ReservedForAnchorTenant => "RESERVED_FOR_ANCHOR_TENANT",
            ReservationType::FullyBlocked => "FULLY_BLOCKED",
        }
    }
}

impl fmt::Display for ReservationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationType {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        ReservationType::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                MigrationError::InvalidArgument(format!("Unknown reservation type '{}'", wanted))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedListEntry {
    pub label: String,
    pub reservation_type: ReservationType,
    pub comment: Option<String>,
}

impl ReservedListEntry {
    pub fn new(
        label: &str,
        reservation_type: ReservationType,
        comment: Option<&str>,
    ) -> Result<Self> {
        let label = label.trim().to_ascii_lowercase();
        if label.is_empty() || label.contains(char::is_whitespace) {
            return Err(MigrationError::InvalidArgument(format!(
                "'{}' is not a valid reserved label",
                label
            )));
        }
        Ok(Self {
            label,
            reservation_type,
            comment: comment.map(str::trim).filter(|c| !c.is_empty()).map(String::from),
        })
    }
}

impl fmt::Display for ReservedListEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.comment {
            Some(comment) => write!(f, "{} # {}", self.reservation_type, comment),
            None => write!(f, "{}", self.reservation_type),
        }
    }
}

/// A named set of reserved labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservedList {
    name: String,
    revision_id: Option<u64>,
    #[serde(with = "serde_instant")]
    creation_time: DateTime<Utc>,
    should_publish: bool,
    entries: BTreeMap<String, ReservedListEntry>,
}

impl ReservedList {
    pub fn new(
        name: &str,
        creation_time: DateTime<Utc>,
        should_publish: bool,
        entries: impl IntoIterator<Item = ReservedListEntry>,
    ) -> Result<Self> {
        record_prefix(name)?;
        let mut by_label = BTreeMap::new();
        for entry in entries {
            if by_label.contains_key(&entry.label) {
                return Err(MigrationError::InvalidArgument(format!(
                    "List '{}' cannot contain duplicate label '{}'",
                    name, entry.label
                )));
            }
            by_label.insert(entry.label.clone(), entry);
        }
        Ok(Self {
            name: name.to_string(),
            revision_id: None,
            creation_time,
            should_publish,
            entries: by_label,
        })
    }

    /// Parse the line format operators maintain reserved lists in:
    ///
    /// ```text
    /// # full-line comments are ignored
    /// food,RESERVED_FOR_SPECIFIC_USE
    /// music,FULLY_BLOCKED # comment kept on the entry
    /// ```
    pub fn parse(
        name: &str,
        creation_time: DateTime<Utc>,
        should_publish: bool,
        text: &str,
    ) -> Result<Self> {
        let mut entries = Vec::new();
        for (number, raw) in text.lines().enumerate() {
            let (body, comment) = match raw.split_once('#') {
                Some((body, comment)) => (body.trim(), Some(comment)),
                None => (raw.trim(), None),
            };
            if body.is_empty() {
                continue;
            }
            let (label, kind) = body.split_once(',').ok_or_else(|| {
                MigrationError::InvalidArgument(format!(
                    "Line {} of list '{}' must be 'label,RESERVATION_TYPE': {}",
                    number + 1,
                    name,
                    raw
                ))
            })?;
            entries.push(ReservedListEntry::new(label, kind.parse()?, comment)?);
        }
        Self::new(name, creation_time, should_publish, entries)
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

    pub fn should_publish(&self) -> bool {
        self.should_publish
    }

    /// Entries in label order
    pub fn iter_entries(&self) -> impl Iterator<Item = &ReservedListEntry> {
        self.entries.values()
    }

    pub fn get(&self, label: &str) -> Option<&ReservedListEntry> {
        self.entries.get(&label.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedListMetadata {
    pub should_publish: bool,
    pub revision_id: Option<u64>,
}

impl DualStoreEntity for ReservedList {
    type Id = String;
    type Key = String;
    type Value = ReservedListEntry;
    const KIND: &'static str = "ReservedList";

    fn id(&self) -> String {
        self.name.clone()
    }

    fn entries(&self) -> &BTreeMap<String, ReservedListEntry> {
        &self.entries
    }
}

impl ShardedEntity for ReservedList {
    type Metadata = ReservedListMetadata;

    fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    fn metadata(&self) -> ReservedListMetadata {
        ReservedListMetadata {
            should_publish: self.should_publish,
            revision_id: self.revision_id,
        }
    }

    fn assemble(
        id: String,
        map: ShardedMap<ReservedListMetadata, String, ReservedListEntry>,
    ) -> Result<Self> {
        Ok(Self {
            name: id,
            revision_id: map.metadata.revision_id,
            creation_time: map.group.creation_time,
            should_publish: map.metadata.should_publish,
            entries: map.entries,
        })
    }
}

impl RevisionedEntity for ReservedList {
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
    fn test_parse_list_text() {
        let text = "# reserved for the registry\n\
                    food,RESERVED_FOR_SPECIFIC_USE\n\
                    \n\
                    Music , fully_blocked # fully blocked\n";
        let list = ReservedList::parse("tld-reserved", START_OF_TIME, true, text).unwrap();

        assert_eq!(list.len(), 2);
        assert_eq!(
            list.get("food").unwrap().reservation_type,
            ReservationType::ReservedForSpecificUse
        );
        let music = list.get("MUSIC").unwrap();
        assert_eq!(music.comment.as_deref(), Some("fully blocked"));
        assert_eq!(music.to_string(), "FULLY_BLOCKED # fully blocked");
    }

    #[test]
    fn test_parse_rejects_bad_lines() {
        assert!(ReservedList::parse("l", START_OF_TIME, false, "food").is_err());
        assert!(ReservedList::parse("l", START_OF_TIME, false, "food,SORT_OF_BLOCKED").is_err());
        let duplicate = "food,FULLY_BLOCKED\nfood,NAME_COLLISION";
        assert!(ReservedList::parse("l", START_OF_TIME, false, duplicate).is_err());
        assert!(ReservedList::parse("a/b", START_OF_TIME, false, "").is_err());
    }

    #[test]
    fn test_reservation_type_order() {
        assert!(ReservationType::FullyBlocked > ReservationType::NameCollision);
        assert_eq!(
            "reserved_for_anchor_tenant".parse::<ReservationType>().unwrap(),
            ReservationType::ReservedForAnchorTenant
        );
    }
}
