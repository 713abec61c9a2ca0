use std::collections::BTreeMap;
use std::fmt;

/// Entry-level difference between a primary and a secondary map.
#[derive(Debug, Clone, PartialEq)]
pub struct MapDifference<K: Ord, V> {
    pub only_in_primary: BTreeMap<K, V>,
    pub only_in_secondary: BTreeMap<K, V>,
    pub differing: BTreeMap<K, (V, V)>,
}

impl<K, V> MapDifference<K, V>
where
    K: Ord + Clone + fmt::Display,
    V: PartialEq + Clone + fmt::Display,
{
    pub fn between(primary: &BTreeMap<K, V>, secondary: &BTreeMap<K, V>) -> Self {
        let mut only_in_primary = BTreeMap::new();
        let mut differing = BTreeMap::new();

        for (key, value) in primary {
            match secondary.get(key) {
                None => {
                    only_in_primary.insert(key.clone(), value.clone());
                }
                Some(other) if other != value => {
                    differing.insert(key.clone(), (value.clone(), other.clone()));
                }
                Some(_) => {}
            }
        }

        let only_in_secondary = secondary
            .iter()
            .filter(|(key, _)| !primary.contains_key(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Self {
            only_in_primary,
            only_in_secondary,
            differing,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of keys that disagree in any way
    pub fn len(&self) -> usize {
        self.only_in_primary.len() + self.only_in_secondary.len() + self.differing.len()
    }

    /// Human-readable report, one line per key. More than `limit` differing
    /// keys collapse to a count.
    pub fn describe(&self, kind: &str, limit: usize) -> String {
        if self.len() > limit {
            return format!(
                "Unequal {} detected: the secondary store has {} entries that differ \
                 from the primary store.",
                kind,
                self.len()
            );
        }

        let mut message = format!("Unequal {} detected:", kind);
        for (key, (primary, secondary)) in &self.differing {
            message.push_str(&format!(
                "\n{} has value {} in primary and value {} in secondary.",
                key, primary, secondary
            ));
        }
        for (key, value) in &self.only_in_primary {
            message.push_str(&format!(
                "\n{} has value {} in primary and is absent in secondary.",
                key, value
            ));
        }
        for (key, value) in &self.only_in_secondary {
            message.push_str(&format!(
                "\n{} is absent in primary and has value {} in secondary.",
                key, value
            ));
        }
        message
    }
}
