use super::diff::MapDifference;
use super::entity::{DualStoreEntity, ReportStyle, StoreDao};
use crate::core::{MigrationError, PrimaryStore, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// What to do when the shadow write to the secondary store fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMode {
    /// Return the secondary failure to the caller
    Strict,
    /// Log the failure and report it as [`ShadowWrite::Failed`]
    #[default]
    BestEffort,
}

impl FromStr for VerificationMode {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "strict" => Ok(VerificationMode::Strict),
            "best_effort" => Ok(VerificationMode::BestEffort),
            other => Err(MigrationError::InvalidArgument(format!(
                "Unknown verification mode '{}'",
                other
            ))),
        }
    }
}

/// Outcome of the secondary half of a dual save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShadowWrite {
    Written,
    Failed(String),
}

/// How far a loaded value was checked against the secondary store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Verified,
    /// Both stores agree that there is nothing to compare
    SecondaryEmpty,
    /// A problem was found and ignored because of the production override
    Suppressed(String),
}

#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub value: T,
    pub verification: Verification,
}

/// Writes go to the primary store and are shadowed to the secondary; reads
/// come from the primary and are checked against the secondary.
///
/// There is no cross-store transaction. Each half runs in its own store
/// transaction and divergence is reported, never repaired.
pub struct DualStoreDao<T: DualStoreEntity> {
    store_a: Arc<dyn StoreDao<T>>,
    store_b: Arc<dyn StoreDao<T>>,
    mode: VerificationMode,
    production_override: bool,
    diff_report_limit: usize,
}

impl<T: DualStoreEntity> DualStoreDao<T> {
    pub fn new(store_a: Arc<dyn StoreDao<T>>, store_b: Arc<dyn StoreDao<T>>) -> Self {
        Self {
            store_a,
            store_b,
            mode: VerificationMode::default(),
            production_override: false,
            diff_report_limit: 10,
        }
    }

    pub fn with_mode(mut self, mode: VerificationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_production_override(mut self, enabled: bool) -> Self {
        self.production_override = enabled;
        self
    }

    pub fn with_diff_report_limit(mut self, limit: usize) -> Self {
        self.diff_report_limit = limit;
        self
    }

    pub fn mode(&self) -> VerificationMode {
        self.mode
    }

    pub fn dao(&self, store: PrimaryStore) -> &dyn StoreDao<T> {
        match store {
            PrimaryStore::StoreA => self.store_a.as_ref(),
            PrimaryStore::StoreB => self.store_b.as_ref(),
        }
    }

    /// Save to `primary`, then shadow the save to the other store.
    pub async fn save(&self, primary: PrimaryStore, entity: &T) -> Result<ShadowWrite> {
        self.dao(primary).save(entity).await?;

        let secondary = primary.other();
        match self.dao(secondary).save(entity).await {
            Ok(()) => {
                debug!(kind = T::KIND, id = %entity.id(), %primary, "dual save complete");
                Ok(ShadowWrite::Written)
            }
            Err(err) => {
                error!(
                    kind = T::KIND,
                    id = %entity.id(),
                    %primary,
                    %secondary,
                    error = %err,
                    "shadow write to secondary store failed"
                );
                match self.mode {
                    VerificationMode::Strict => Err(err),
                    VerificationMode::BestEffort => Ok(ShadowWrite::Failed(err.to_string())),
                }
            }
        }
    }

    /// Load from `primary` and verify against the other store.
    pub async fn load(&self, primary: PrimaryStore, id: &T::Id) -> Result<Loaded<T>> {
        let value = self
            .dao(primary)
            .load(id)
            .await?
            .ok_or_else(|| MigrationError::NotFound {
                entity: T::KIND.to_string(),
                id: id.to_string(),
                store: primary,
            })?;

        match self.verify(primary, id, &value).await {
            Ok(verification) => Ok(Loaded { value, verification }),
            Err(problem) if self.production_override => {
                warn!(
                    kind = T::KIND,
                    id = %id,
                    %primary,
                    problem = %problem,
                    "secondary verification failed; returning primary value"
                );
                Ok(Loaded {
                    value,
                    verification: Verification::Suppressed(problem.to_string()),
                })
            }
            Err(problem) => Err(problem),
        }
    }

    /// Check `value` from `primary` against the other store. An error is the
    /// verification failure itself, not a failure to load `value`.
    async fn verify(&self, primary: PrimaryStore, id: &T::Id, value: &T) -> Result<Verification> {
        let secondary = primary.other();
        let unavailable = |reason: String| MigrationError::SecondaryUnavailable {
            entity: T::KIND.to_string(),
            store: secondary,
            reason,
        };
        match self.dao(secondary).load(id).await {
            Err(err) => Err(unavailable(err.to_string())),
            Ok(None) if value.entries().is_empty() => Ok(Verification::SecondaryEmpty),
            Ok(None) => Err(unavailable("no data present".to_string())),
            Ok(Some(shadow)) => {
                let diff = MapDifference::between(value.entries(), shadow.entries());
                if diff.is_empty() {
                    Ok(Verification::Verified)
                } else {
                    Err(MigrationError::ConsistencyViolation(
                        diff.describe(T::KIND, self.diff_report_limit),
                    ))
                }
            }
        }
    }

    /// Compare every id stored in either store.
    pub async fn compare_all(&self) -> Result<ComparisonReport> {
        let mut ids: BTreeSet<T::Id> = self.store_a.list_ids().await?.into_iter().collect();
        ids.extend(self.store_b.list_ids().await?);
        let ids: Vec<T::Id> = ids.into_iter().collect();
        self.compare(&ids).await
    }

    /// Compare the latest value of each id in StoreA and StoreB.
    pub async fn compare(&self, ids: &[T::Id]) -> Result<ComparisonReport> {
        let mut report = ComparisonReport::new(T::KIND, T::REPORT_STYLE);
        for id in ids {
            let (in_a, in_b) = futures::try_join!(self.store_a.load(id), self.store_b.load(id))?;
            report.compared += 1;

            match (in_a, in_b) {
                (Some(a), Some(b)) => {
                    let diff = MapDifference::between(a.entries(), b.entries());
                    if !diff.is_empty() {
                        report.findings.push(Finding::Differs {
                            id: id.to_string(),
                            differing_entries: diff.len(),
                        });
                    }
                }
                (Some(_), None) => report.findings.push(Finding::OnlyIn {
                    id: id.to_string(),
                    present: PrimaryStore::StoreA,
                }),
                (None, Some(_)) => report.findings.push(Finding::OnlyIn {
                    id: id.to_string(),
                    present: PrimaryStore::StoreB,
                }),
                (None, None) => {}
            }
        }
        Ok(report)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    OnlyIn { id: String, present: PrimaryStore },
    Differs { id: String, differing_entries: usize },
}

/// Cross-store comparison of one entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonReport {
    pub kind: &'static str,
    pub style: ReportStyle,
    pub compared: usize,
    pub findings: Vec<Finding>,
}

impl ComparisonReport {
    fn new(kind: &'static str, style: ReportStyle) -> Self {
        Self {
            kind,
            style,
            compared: 0,
            findings: Vec::new(),
        }
    }

    pub fn unequal_count(&self) -> usize {
        self.findings.len()
    }

    pub fn is_consistent(&self) -> bool {
        self.findings.is_empty()
    }

    fn subject(&self, id: &str) -> String {
        match self.style {
            ReportStyle::Quoted => format!("{} '{}'", self.kind, id),
            ReportStyle::Named => format!("{} with name {}", self.kind, id),
        }
    }
}

impl fmt::Display for ComparisonReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for finding in &self.findings {
            match finding {
                Finding::OnlyIn { id, present } => writeln!(
                    f,
                    "{} is present in {}, but not in {}.",
                    self.subject(id),
                    present,
                    present.other()
                )?,
                Finding::Differs { id, differing_entries } => match self.style {
                    ReportStyle::Quoted => writeln!(
                        f,
                        "{} has {} different entries in each store.",
                        self.subject(id),
                        differing_entries
                    )?,
                    ReportStyle::Named => {
                        writeln!(f, "{} has different entries in each database.", self.subject(id))?
                    }
                },
            }
        }
        let noun = match self.style {
            ReportStyle::Quoted => self.kind,
            ReportStyle::Named => "list",
        };
        write!(f, "Found {} unequal {}(s).", self.unequal_count(), noun)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    struct Tally {
        name: String,
        counts: BTreeMap<String, u32>,
    }

    impl DualStoreEntity for Tally {
        type Id = String;
        type Key = String;
        type Value = u32;
        const KIND: &'static str = "Tally";

        fn id(&self) -> String {
            self.name.clone()
        }

        fn entries(&self) -> &BTreeMap<String, u32> {
            &self.counts
        }
    }

    #[derive(Default)]
    struct MapDao {
        rows: Mutex<BTreeMap<String, Tally>>,
        down: AtomicBool,
    }

    impl MapDao {
        fn check(&self) -> Result<()> {
            if self.down.load(Ordering::SeqCst) {
                return Err(MigrationError::StoreUnavailable("map".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl StoreDao<Tally> for MapDao {
        fn store_name(&self) -> &str {
            "map"
        }

        async fn save(&self, entity: &Tally) -> Result<()> {
            self.check()?;
            self.rows.lock()?.insert(entity.name.clone(), entity.clone());
            Ok(())
        }

        async fn load(&self, id: &String) -> Result<Option<Tally>> {
            self.check()?;
            Ok(self.rows.lock()?.get(id).cloned())
        }

        async fn list_ids(&self) -> Result<Vec<String>> {
            self.check()?;
            Ok(self.rows.lock()?.keys().cloned().collect())
        }
    }

    fn tally(name: &str, pairs: &[(&str, u32)]) -> Tally {
        Tally {
            name: name.into(),
            counts: pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    fn setup() -> (Arc<MapDao>, Arc<MapDao>, DualStoreDao<Tally>) {
        let a = Arc::new(MapDao::default());
        let b = Arc::new(MapDao::default());
        let dao = DualStoreDao::new(a.clone(), b.clone());
        (a, b, dao)
    }

    #[tokio::test]
    async fn test_save_then_load_verifies() {
        let (_a, _b, dao) = setup();
        let value = tally("t", &[("x", 1), ("y", 2)]);
        assert_eq!(dao.save(PrimaryStore::StoreB, &value).await.unwrap(), ShadowWrite::Written);

        let loaded = dao.load(PrimaryStore::StoreB, &"t".to_string()).await.unwrap();
        assert_eq!(loaded.value, value);
        assert_eq!(loaded.verification, Verification::Verified);
    }

    #[tokio::test]
    async fn test_primary_failure_propagates_before_shadow_write() {
        let (a, b, dao) = setup();
        a.down.store(true, Ordering::SeqCst);
        assert!(dao.save(PrimaryStore::StoreA, &tally("t", &[])).await.is_err());
        assert!(b.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shadow_failure_depends_on_mode() {
        let (_a, b, dao) = setup();
        b.down.store(true, Ordering::SeqCst);
        let value = tally("t", &[("x", 1)]);
        assert!(matches!(
            dao.save(PrimaryStore::StoreA, &value).await.unwrap(),
            ShadowWrite::Failed(_)
        ));

        let strict = dao.with_mode(VerificationMode::Strict);
        assert!(strict.save(PrimaryStore::StoreA, &value).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_primary_without_secondary_is_fine() {
        let (a, _b, dao) = setup();
        a.rows.lock().unwrap().insert("t".into(), tally("t", &[]));
        let loaded = dao.load(PrimaryStore::StoreA, &"t".to_string()).await.unwrap();
        assert_eq!(loaded.verification, Verification::SecondaryEmpty);
    }

    #[tokio::test]
    async fn test_verify_yields_a_verification_or_an_error() {
        let (_a, b, dao) = setup();
        let value = tally("t", &[("x", 1)]);
        let id = "t".to_string();

        assert!(matches!(
            dao.verify(PrimaryStore::StoreA, &id, &value).await,
            Err(MigrationError::SecondaryUnavailable { .. })
        ));
        assert_eq!(
            dao.verify(PrimaryStore::StoreA, &id, &tally("t", &[])).await.unwrap(),
            Verification::SecondaryEmpty
        );

        b.rows.lock().unwrap().insert(id.clone(), tally("t", &[("x", 2)]));
        assert!(matches!(
            dao.verify(PrimaryStore::StoreA, &id, &value).await,
            Err(MigrationError::ConsistencyViolation(_))
        ));

        b.rows.lock().unwrap().insert(id.clone(), value.clone());
        assert_eq!(
            dao.verify(PrimaryStore::StoreA, &id, &value).await.unwrap(),
            Verification::Verified
        );

        b.down.store(true, Ordering::SeqCst);
        assert!(matches!(
            dao.verify(PrimaryStore::StoreA, &id, &value).await,
            Err(MigrationError::SecondaryUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_primary_is_not_found() {
        let (_a, _b, dao) = setup();
        let err = dao.load(PrimaryStore::StoreA, &"nope".to_string()).await.unwrap_err();
        assert!(matches!(err, MigrationError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_compare_reports_both_directions() {
        let (a, b, dao) = setup();
        a.rows.lock().unwrap().insert("only-a".into(), tally("only-a", &[]));
        b.rows.lock().unwrap().insert("only-b".into(), tally("only-b", &[]));
        a.rows.lock().unwrap().insert("same".into(), tally("same", &[("x", 1)]));
        b.rows.lock().unwrap().insert("same".into(), tally("same", &[("x", 1)]));
        a.rows.lock().unwrap().insert("diff".into(), tally("diff", &[("x", 1)]));
        b.rows.lock().unwrap().insert("diff".into(), tally("diff", &[("x", 2)]));

        let report = dao.compare_all().await.unwrap();
        assert_eq!(report.compared, 4);
        assert_eq!(report.unequal_count(), 3);
        let text = report.to_string();
        assert!(text.contains("Tally 'only-a' is present in STORE_A, but not in STORE_B."));
        assert!(text.contains("Tally 'only-b' is present in STORE_B, but not in STORE_A."));
        assert!(text.contains("Tally 'diff' has 1 different entries in each store."));
        assert!(text.ends_with("Found 3 unequal Tally(s)."));
    }
}
