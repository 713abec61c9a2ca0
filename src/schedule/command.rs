//! Operator surface for reading and rewriting transition schedules.
//!
//! Schedules are exchanged as comma-delimited `timestamp=store` pairs:
//!
//! ```text
//! START_OF_TIME=STORE_A,2020-12-02T00:00:00Z=STORE_B
//! ```

use super::cache::ScheduleCache;
use super::repository::{ScheduleChange, ScheduleRepository};
use super::transition::{TransitionId, TransitionSchedule};
use crate::core::{MigrationError, PrimaryStore, Result, format_instant, parse_instant};
use crate::property::TimeVersionedProperty;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Parse operator text into a validated property.
///
/// Pairs must appear in strictly increasing chronological order and the
/// first one must be `START_OF_TIME`.
pub fn parse_transitions(text: &str) -> Result<TimeVersionedProperty<PrimaryStore>> {
    let mut map = BTreeMap::new();
    let mut previous: Option<DateTime<Utc>> = None;

    for pair in text.split(',').map(str::trim).filter(|pair| !pair.is_empty()) {
        let (at, store) = pair.split_once('=').ok_or_else(|| {
            MigrationError::InvalidArgument(format!("Expected 'timestamp=store', got '{}'", pair))
        })?;
        let at = parse_instant(at)?;
        let store: PrimaryStore = store.parse()?;

        if let Some(previous) = previous
            && at <= previous
        {
            return Err(MigrationError::InvalidSchedule(format!(
                "The transitions are chronologically out of order: {} does not follow {}",
                format_instant(at),
                format_instant(previous)
            )));
        }
        previous = Some(at);
        map.insert(at, store);
    }

    TimeVersionedProperty::from_map(map)
}

pub fn format_transitions(transitions: &TimeVersionedProperty<PrimaryStore>) -> String {
    transitions.to_string()
}

/// Get/update commands backing the operator tool.
pub struct ScheduleCommands {
    repository: ScheduleRepository,
    cache: Option<Arc<ScheduleCache>>,
    default_store: PrimaryStore,
}

impl ScheduleCommands {
    pub fn new(repository: ScheduleRepository, default_store: PrimaryStore) -> Self {
        Self {
            repository,
            cache: None,
            default_store,
        }
    }

    /// Invalidate `cache` after every successful write.
    pub fn invalidating(mut self, cache: Arc<ScheduleCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Uncached read; a missing schedule is an error for operators.
    pub async fn get(&self, id: TransitionId) -> Result<TransitionSchedule> {
        self.repository.load(id).await?.ok_or_else(|| {
            MigrationError::InvalidArgument(format!(
                "A transition schedule for {} does not exist",
                id
            ))
        })
    }

    /// Replace the whole schedule with the transitions in `text`.
    pub async fn update(&self, id: TransitionId, text: &str) -> Result<ScheduleChange> {
        let schedule = TransitionSchedule::create(id, parse_transitions(text)?)?;
        let change = self.repository.save(&schedule).await?;
        self.after_write(id);
        Ok(change)
    }

    /// Add one transition after all existing ones.
    pub async fn append(
        &self,
        id: TransitionId,
        at: DateTime<Utc>,
        store: PrimaryStore,
    ) -> Result<ScheduleChange> {
        let change = self.repository.append(id, at, store, self.default_store).await?;
        self.after_write(id);
        Ok(change)
    }

    fn after_write(&self, id: TransitionId) {
        if let Some(cache) = &self.cache {
            cache.invalidate(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FakeClock, START_OF_TIME};
    use crate::schedule::ChangeKind;
    use crate::storage::InMemoryStore;
    use std::time::Duration;

    #[test]
    fn test_parse_valid_list() {
        let property =
            parse_transitions(" START_OF_TIME=STORE_A , 2020-12-02T00:00:00Z=STORE_B ").unwrap();
        assert_eq!(property.len(), 2);
        assert_eq!(*property.value_at(START_OF_TIME), PrimaryStore::StoreA);
        assert_eq!(
            *property.value_at(parse_instant("2020-12-03T00:00:00Z").unwrap()),
            PrimaryStore::StoreB
        );
        assert_eq!(
            format_transitions(&property),
            "START_OF_TIME=STORE_A,2020-12-02T00:00:00Z=STORE_B"
        );
    }

    #[test]
    fn test_parse_requires_start_of_time() {
        let err = parse_transitions("2020-12-02T00:00:00Z=STORE_B").unwrap_err();
        assert!(matches!(err, MigrationError::InvalidSchedule(_)));
        assert!(parse_transitions("").is_err());
    }

    #[test]
    fn test_parse_rejects_out_of_order_and_duplicates() {
        let out_of_order =
            "START_OF_TIME=STORE_A,2020-12-05T00:00:00Z=STORE_B,2020-12-02T00:00:00Z=STORE_A";
        assert!(parse_transitions(out_of_order).unwrap_err().to_string().contains("out of order"));

        let duplicate =
            "START_OF_TIME=STORE_A,2020-12-02T00:00:00Z=STORE_B,2020-12-02T00:00:00Z=STORE_A";
        assert!(parse_transitions(duplicate).is_err());
    }

    #[test]
    fn test_parse_rejects_malformed_pairs() {
        assert!(parse_transitions("START_OF_TIME").is_err());
        assert!(parse_transitions("START_OF_TIME=POSTGRES").is_err());
        assert!(parse_transitions("tomorrow=STORE_A").is_err());
    }

    #[tokio::test]
    async fn test_update_and_get() {
        let repository = ScheduleRepository::new(Arc::new(InMemoryStore::new("store_a")));
        let commands = ScheduleCommands::new(repository, PrimaryStore::StoreA);

        assert!(commands.get(TransitionId::DomainLabelLists).await.is_err());

        let change = commands
            .update(TransitionId::DomainLabelLists, "START_OF_TIME=STORE_A")
            .await
            .unwrap();
        assert_eq!(change.kind, ChangeKind::Created);

        let change = commands
            .update(
                TransitionId::DomainLabelLists,
                "START_OF_TIME=STORE_A,2021-01-05T00:00:00Z=STORE_B",
            )
            .await
            .unwrap();
        assert_eq!(change.kind, ChangeKind::Updated);

        let schedule = commands.get(TransitionId::DomainLabelLists).await.unwrap();
        assert_eq!(
            schedule.primary_store_at(parse_instant("2021-01-05T00:00:01Z").unwrap()),
            PrimaryStore::StoreB
        );
        assert_eq!(
            schedule.primary_store_at(parse_instant("2021-01-04T23:59:59Z").unwrap()),
            PrimaryStore::StoreA
        );
    }

    #[tokio::test]
    async fn test_writes_invalidate_attached_cache() {
        let store = Arc::new(InMemoryStore::new("store_a"));
        let clock = Arc::new(FakeClock::new(parse_instant("2021-01-10T00:00:00Z").unwrap()));
        let repository = ScheduleRepository::new(store);
        let cache = Arc::new(
            ScheduleCache::new(repository.clone(), clock, Duration::from_secs(3600), 4).unwrap(),
        );
        let commands =
            ScheduleCommands::new(repository, PrimaryStore::StoreA).invalidating(cache.clone());

        assert_eq!(
            cache.primary_store(TransitionId::DomainLabelLists, PrimaryStore::StoreA).await,
            PrimaryStore::StoreA
        );
        commands
            .append(
                TransitionId::DomainLabelLists,
                parse_instant("2021-01-01T00:00:00Z").unwrap(),
                PrimaryStore::StoreB,
            )
            .await
            .unwrap();
        assert_eq!(
            cache.primary_store(TransitionId::DomainLabelLists, PrimaryStore::StoreA).await,
            PrimaryStore::StoreB
        );
    }
}
