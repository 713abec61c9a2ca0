// ============================================================================
// Transaction Change Tracking
// ============================================================================
//
// Writes are staged as Changes and only reach the store on commit, so an
// aborted transaction leaves nothing behind.
//
// ============================================================================

/// Address of one record inside a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub table: String,
    pub key: String,
}

impl RecordKey {
    pub fn new(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.table, self.key)
    }
}

/// A single staged write.
#[derive(Debug, Clone)]
pub enum Change {
    /// Insert or overwrite a record
    Put { record: RecordKey, data: Vec<u8> },

    /// Remove a record (no-op if absent at commit)
    Delete { record: RecordKey },
}

impl Change {
    pub fn record(&self) -> &RecordKey {
        match self {
            Change::Put { record, .. } => record,
            Change::Delete { record } => record,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.record().table
    }

    /// Data this change leaves behind; `None` for deletions.
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Change::Put { data, .. } => Some(data),
            Change::Delete { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_table_name() {
        let change = Change::Put {
            record: RecordKey::new("locks", "export/GLOBAL"),
            data: vec![1],
        };
        assert_eq!(change.table_name(), "locks");
        assert_eq!(change.data(), Some(&[1u8][..]));
    }

    #[test]
    fn test_delete_leaves_no_data() {
        let change = Change::Delete {
            record: RecordKey::new("locks", "export/GLOBAL"),
        };
        assert!(change.data().is_none());
        assert_eq!(change.record().to_string(), "locks/export/GLOBAL");
    }
}
