//! Immutable point-in-time snapshots of one statistics family.
//!
//! A [`Snapshot`] is built once per collection pass and never mutated; the
//! next pass supersedes it. Rows keep source order and are indexed by their
//! identity hash. Two rows of the same snapshot sharing a hash keep only the
//! later one in the index (last write wins); the earlier row stays in
//! [`Snapshot::rows`] but can no longer be matched.

use std::collections::HashMap;

use crate::errors::{ExError, Result};
use crate::factory::CollectorFactory;
use crate::metric::{IdentityHash, PgMetric};
use crate::source::{Source, SourceRecord};

/// Snapshot version: wall-clock seconds at collection time
pub type Version = i64;

#[derive(Debug, Clone)]
pub struct Snapshot<M: PgMetric> {
    rows: Vec<M>,
    index: HashMap<IdentityHash, usize>,
    version: Version,
}

impl<M: PgMetric> Snapshot<M> {
    pub fn new(rows: Vec<M>, version: Version) -> Self {
        let mut index = HashMap::with_capacity(rows.len());
        for (position, row) in rows.iter().enumerate() {
            index.insert(row.identity(), position);
        }
        Self {
            rows,
            index,
            version,
        }
    }

    /// Build typed rows from materialized records.
    ///
    /// The first record that cannot be turned into a metric fails the whole
    /// snapshot.
    pub fn from_records<F>(factory: &F, records: &[SourceRecord], version: Version) -> Result<Self>
    where
        F: CollectorFactory<Metric = M>,
    {
        let rows = records
            .iter()
            .map(|record| factory.new_metric(record))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|err| ExError::from(err).with_collector(factory.name()))?;
        Ok(Self::new(rows, version))
    }

    pub fn rows(&self) -> &[M] {
        &self.rows
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row currently indexed under `hash`
    pub fn get(&self, hash: IdentityHash) -> Option<&M> {
        self.index.get(&hash).map(|&position| &self.rows[position])
    }

    /// Identity hash to row position
    pub fn index(&self) -> &HashMap<IdentityHash, usize> {
        &self.index
    }
}

/// Current wall-clock second
pub fn now_version() -> Version {
    chrono::Utc::now().timestamp()
}

/// Run the family's query against `source` and snapshot the result.
///
/// Nothing is returned unless every row was read and converted.
pub async fn collect<F, S>(factory: &F, source: &mut S) -> Result<Snapshot<F::Metric>>
where
    F: CollectorFactory,
    S: Source + ?Sized,
{
    let records = source
        .fetch(factory.collect_query())
        .await
        .map_err(|err| err.with_collector(factory.name()))?;
    Snapshot::from_records(factory, &records, now_version())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ExErrorKind;
    use crate::metric::{PgTableSize, PgTableSizeFactory};
    use crate::source::Cell;

    fn table(name: &str, size: f64) -> PgTableSize {
        PgTableSize {
            datname: "postgres".to_string(),
            schemaname: "public".to_string(),
            tablename: name.to_string(),
            size,
            ..Default::default()
        }
    }

    fn record(name: &str) -> SourceRecord {
        SourceRecord::new(vec![
            Cell::from("postgres"),
            Cell::from("public"),
            Cell::from(name),
            Cell::Float(1.0),
            Cell::Float(0.0),
            Cell::Float(8192.0),
            Cell::Float(0.0),
        ])
    }

    #[test]
    fn test_index_points_at_rows() {
        let snapshot = Snapshot::new(vec![table("a", 1.0), table("b", 2.0)], 100);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.version(), 100);
        assert_eq!(snapshot.get(table("b", 0.0).identity()), Some(&table("b", 2.0)));
        assert_eq!(snapshot.get(table("c", 0.0).identity()), None);
    }

    #[test]
    fn test_colliding_identity_last_write_wins() {
        let snapshot = Snapshot::new(vec![table("a", 1.0), table("a", 2.0)], 100);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.index().len(), 1);
        assert_eq!(snapshot.get(table("a", 0.0).identity()), Some(&table("a", 2.0)));
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot: Snapshot<PgTableSize> = Snapshot::new(Vec::new(), 5);
        assert!(snapshot.is_empty());
        assert!(snapshot.index().is_empty());
    }

    #[test]
    fn test_from_records_keeps_source_order() {
        let snapshot =
            Snapshot::from_records(&PgTableSizeFactory, &[record("b"), record("a")], 7).unwrap();
        let names: Vec<_> = snapshot.rows().iter().map(|r| r.tablename.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_from_records_fails_whole_snapshot() {
        let broken = SourceRecord::new(vec![Cell::from("postgres")]);
        let err = Snapshot::from_records(&PgTableSizeFactory, &[record("a"), broken], 7)
            .unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Collection);
        assert_eq!(err.collector(), Some("PgTableSize"));
    }
}
