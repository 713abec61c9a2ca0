use crate::core::{MigrationError, Result, START_OF_TIME, format_instant};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// A value that changes at fixed instants.
///
/// Holds exactly one value at every instant: the value of the latest
/// transition at or before it. The first transition is always at
/// [`START_OF_TIME`], so [`value_at`](Self::value_at) is total.
///
/// The initial value is kept apart from the later transitions, which makes
/// a property without a start-of-time entry unrepresentable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeVersionedProperty<V> {
    initial: V,
    /// Transitions strictly after START_OF_TIME
    later: BTreeMap<DateTime<Utc>, V>,
}

impl<V: Clone> TimeVersionedProperty<V> {
    /// A property holding `value` for all time.
    pub fn constant(value: V) -> Self {
        Self {
            initial: value,
            later: BTreeMap::new(),
        }
    }

    /// Build from an ordered instant → value map.
    ///
    /// # Errors
    /// `InvalidSchedule` if the map is empty or does not start at START_OF_TIME.
    pub fn from_map(mut map: BTreeMap<DateTime<Utc>, V>) -> Result<Self> {
        let Some(initial) = map.remove(&START_OF_TIME) else {
            return Err(MigrationError::InvalidSchedule(if map.is_empty() {
                "Transition map cannot be empty".to_string()
            } else {
                "Must provide transition entry for the start of time".to_string()
            }));
        };
        Ok(Self { initial, later: map })
    }

    /// Value in effect at `instant`.
    pub fn value_at(&self, instant: DateTime<Utc>) -> &V {
        self.later
            .range(..=instant)
            .next_back()
            .map(|(_, value)| value)
            .unwrap_or(&self.initial)
    }

    /// Exact inverse of [`from_map`](Self::from_map).
    pub fn to_map(&self) -> BTreeMap<DateTime<Utc>, V> {
        let mut map = self.later.clone();
        map.insert(START_OF_TIME, self.initial.clone());
        map
    }

    /// Every transition in chronological order, starting at START_OF_TIME.
    pub fn transitions(&self) -> impl Iterator<Item = (DateTime<Utc>, &V)> {
        std::iter::once((START_OF_TIME, &self.initial))
            .chain(self.later.iter().map(|(at, value)| (*at, value)))
    }

    pub fn len(&self) -> usize {
        self.later.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Instant of the most recent transition.
    pub fn last_transition_time(&self) -> DateTime<Utc> {
        self.later.keys().next_back().copied().unwrap_or(START_OF_TIME)
    }

    /// A new property with `value` taking effect at `at`.
    ///
    /// # Errors
    /// `InvalidSchedule` unless `at` is strictly after every existing transition.
    pub fn with_transition(&self, at: DateTime<Utc>, value: V) -> Result<Self> {
        let last = self.last_transition_time();
        if at <= last {
            return Err(MigrationError::InvalidSchedule(format!(
                "New transition at {} must be after the last transition at {}",
                format_instant(at),
                format_instant(last)
            )));
        }
        let mut later = self.later.clone();
        later.insert(at, value);
        Ok(Self {
            initial: self.initial.clone(),
            later,
        })
    }

    /// Re-check the start-of-time invariant.
    pub fn check_validity(&self) -> Result<()> {
        match self.later.keys().next() {
            Some(first) if *first <= START_OF_TIME => Err(MigrationError::InvalidSchedule(
                "Later transitions must follow the start of time".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

impl<V: fmt::Display + Clone> fmt::Display for TimeVersionedProperty<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .transitions()
            .map(|(at, value)| format!("{}={}", format_instant(at), value))
            .collect();
        f.write_str(&rendered.join(","))
    }
}

/// Multi-step builder; entries may arrive in any order and are validated
/// once, at [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct TimeVersionedPropertyBuilder<V> {
    entries: BTreeMap<DateTime<Utc>, V>,
}

impl<V: Clone> TimeVersionedPropertyBuilder<V> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn set(mut self, at: DateTime<Utc>, value: V) -> Self {
        self.entries.insert(at, value);
        self
    }

    pub fn check_validity(&self) -> Result<()> {
        match self.entries.keys().next() {
            None => Err(MigrationError::InvalidSchedule(
                "Transition map cannot be empty".to_string(),
            )),
            Some(first) if *first != START_OF_TIME => Err(MigrationError::InvalidSchedule(
                "Must provide transition entry for the start of time".to_string(),
            )),
            Some(_) => Ok(()),
        }
    }

    pub fn build(self) -> Result<TimeVersionedProperty<V>> {
        self.check_validity()?;
        TimeVersionedProperty::from_map(self.entries)
    }
}

impl<V: Clone> Default for TimeVersionedPropertyBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}
