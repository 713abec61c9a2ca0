use super::transition::{TransitionId, TransitionSchedule};
use crate::core::time::serde_instant;
use crate::core::{PrimaryStore, Result};
use crate::property::TimeVersionedProperty;
use crate::storage::StorageEngine;
use crate::storage::codec::{get_typed, put_typed, read_once};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{Level, event};

pub const SCHEDULE_TABLE: &str = "transition_schedules";

#[derive(Debug, Serialize, Deserialize)]
struct StoredTransition {
    #[serde(with = "serde_instant")]
    at: DateTime<Utc>,
    store: PrimaryStore,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredSchedule {
    id: TransitionId,
    transitions: Vec<StoredTransition>,
}

impl StoredSchedule {
    fn from_schedule(schedule: &TransitionSchedule) -> Self {
        Self {
            id: schedule.id(),
            transitions: schedule
                .transitions()
                .transitions()
                .map(|(at, store)| StoredTransition { at, store: *store })
                .collect(),
        }
    }

    fn into_schedule(self) -> Result<TransitionSchedule> {
        let map: BTreeMap<_, _> = self
            .transitions
            .into_iter()
            .map(|transition| (transition.at, transition.store))
            .collect();
        TransitionSchedule::create(self.id, TimeVersionedProperty::from_map(map)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
}

/// Result of a schedule write, phrased the way operators review it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleChange {
    pub kind: ChangeKind,
    pub schedule: TransitionSchedule,
}

impl fmt::Display for ScheduleChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.kind {
            ChangeKind::Created => "Create",
            ChangeKind::Updated => "Update",
        };
        write!(f, "{} {}", verb, self.schedule)
    }
}

/// Persists schedules in one store, one record per subsystem.
#[derive(Clone)]
pub struct ScheduleRepository {
    engine: Arc<dyn StorageEngine>,
}

impl ScheduleRepository {
    pub fn new(engine: Arc<dyn StorageEngine>) -> Self {
        Self { engine }
    }

    pub fn store_name(&self) -> &str {
        self.engine.name()
    }

    pub async fn load(&self, id: TransitionId) -> Result<Option<TransitionSchedule>> {
        read_once::<StoredSchedule>(self.engine.as_ref(), SCHEDULE_TABLE, id.as_str())
            .await?
            .map(StoredSchedule::into_schedule)
            .transpose()
    }

    /// Replace the whole schedule in one transaction.
    pub async fn save(&self, schedule: &TransitionSchedule) -> Result<ScheduleChange> {
        let engine = self.engine.as_ref();
        let mut txn = engine.begin().await?;
        let existing =
            get_typed::<StoredSchedule>(engine, &mut txn, SCHEDULE_TABLE, schedule.id().as_str())
                .await?;
        put_typed(
            &mut txn,
            SCHEDULE_TABLE,
            schedule.id().as_str(),
            &StoredSchedule::from_schedule(schedule),
        )?;
        engine.commit(txn).await?;

        let kind = if existing.is_some() { ChangeKind::Updated } else { ChangeKind::Created };
        event!(
            Level::INFO,
            id = %schedule.id(),
            ?kind,
            transitions = %schedule.transitions(),
            "transition schedule saved"
        );
        Ok(ScheduleChange {
            kind,
            schedule: schedule.clone(),
        })
    }

    /// Read-modify-write: add one transition after every existing one.
    ///
    /// A subsystem without a schedule starts from `{START_OF_TIME: default_store}`.
    pub async fn append(
        &self,
        id: TransitionId,
        at: DateTime<Utc>,
        store: PrimaryStore,
        default_store: PrimaryStore,
    ) -> Result<ScheduleChange> {
        let engine = self.engine.as_ref();
        let mut txn = engine.begin().await?;

        let stored =
            get_typed::<StoredSchedule>(engine, &mut txn, SCHEDULE_TABLE, id.as_str()).await?;
        let (kind, current) = match stored {
            Some(stored) => (ChangeKind::Updated, stored.into_schedule()?),
            None => (
                ChangeKind::Created,
                TransitionSchedule::create(id, TimeVersionedProperty::constant(default_store))?,
            ),
        };

        let transitions = current.transitions().with_transition(at, store)?;
        let schedule = TransitionSchedule::create(id, transitions)?;
        put_typed(
            &mut txn,
            SCHEDULE_TABLE,
            id.as_str(),
            &StoredSchedule::from_schedule(&schedule),
        )?;
        engine.commit(txn).await?;

        event!(
            Level::INFO,
            id = %id,
            ?kind,
            transitions = %schedule.transitions(),
            "transition appended"
        );
        Ok(ScheduleChange { kind, schedule })
    }
}
