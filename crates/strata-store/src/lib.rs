use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use serde_json::Value;
use strata_core::{
    Concept, ConceptEdge, DecisionTrace, DriftMetricRecord, GRAPH_VERSION_STATUS_ACTIVE,
    GraphVersionRecord, MetricStatus, NewRollbackEvent, RollbackEventRecord, StoredDriftMetric,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TraceQuery {
    pub graph_version: String,
    pub window_start: i64,
    pub window_end: i64,
    pub decision_types: Vec<String>,
    pub limit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EdgeStrengthStats {
    pub mean: f64,
    pub count: i64,
}

/// Read side used by the drift monitor. All time bounds are unix millis, half-open `[start, end)`.
pub trait DriftStore {
    fn latest_graph_version(&self, active_only: bool) -> Result<Option<String>, StoreError>;
    fn list_decision_traces(&self, query: &TraceQuery) -> Result<Vec<DecisionTrace>, StoreError>;
    fn count_global_concepts_updated(&self, start: i64, end: i64) -> Result<i64, StoreError>;
    fn count_global_remerged_concepts(&self, start: i64, end: i64) -> Result<i64, StoreError>;
    fn count_global_new_aliases(&self, start: i64, end: i64) -> Result<i64, StoreError>;
    fn edge_strength_stats(&self, start: i64, end: i64) -> Result<EdgeStrengthStats, StoreError>;
    fn count_rollback_events_since(
        &self,
        graph_version_from: &str,
        trigger: &str,
        cutoff: i64,
    ) -> Result<i64, StoreError>;
}

pub trait MetricsRepository {
    /// Writes every row or none of them.
    fn create_many(
        &self,
        rows: &[DriftMetricRecord],
    ) -> Result<Vec<StoredDriftMetric>, StoreError>;
}

pub trait RollbackEventRepository {
    fn create(&self, event: &NewRollbackEvent) -> Result<(), StoreError>;
}

pub struct SqliteStore {
    conn: Connection,
    sqlite_path: PathBuf,
}

const NOW_MILLIS_SQL: &str = "CAST((julianday('now') - 2440587.5) * 86400000.0 AS INTEGER)";

impl SqliteStore {
    pub fn open(sqlite_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let sqlite_path = sqlite_path.as_ref().to_path_buf();
        if let Some(parent) = sqlite_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&sqlite_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        run_migrations(&conn)?;

        Ok(Self { conn, sqlite_path })
    }

    pub fn sqlite_path(&self) -> &Path {
        &self.sqlite_path
    }

    pub fn upsert_graph_version(&self, record: &GraphVersionRecord) -> Result<(), StoreError> {
        self.conn.execute(
            r#"
            INSERT INTO graph_versions (graph_version, status, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(graph_version) DO UPDATE SET
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
            params![record.graph_version, record.status, record.updated_at],
        )?;
        Ok(())
    }

    pub fn insert_decision_trace(&self, trace: &DecisionTrace) -> Result<(), StoreError> {
        self.conn.execute(
            r#"
            INSERT INTO structural_decision_traces (
                id, occurred_at, graph_version, decision_type, candidates, chosen, thresholds
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                trace.id,
                trace.occurred_at,
                trace.graph_version,
                trace.decision_type,
                serde_json::to_string(&trace.candidates)?,
                serde_json::to_string(&trace.chosen)?,
                serde_json::to_string(&trace.thresholds)?,
            ],
        )?;
        Ok(())
    }

    pub fn upsert_concept(&self, concept: &Concept) -> Result<(), StoreError> {
        self.conn.execute(
            r#"
            INSERT INTO concepts (id, scope, canonical_concept_id, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                scope = excluded.scope,
                canonical_concept_id = excluded.canonical_concept_id,
                updated_at = excluded.updated_at
            "#,
            params![
                concept.id,
                concept.scope,
                concept.canonical_concept_id,
                concept.created_at,
                concept.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn insert_concept_edge(&self, edge: &ConceptEdge) -> Result<(), StoreError> {
        self.conn.execute(
            r#"
            INSERT INTO concept_edges (id, source_concept_id, target_concept_id, strength, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                edge.id,
                edge.source_concept_id,
                edge.target_concept_id,
                edge.strength,
                edge.created_at,
            ],
        )?;
        Ok(())
    }

    /// Seeds a rollback event with an explicit creation time instead of the column default.
    pub fn insert_rollback_event_at(
        &self,
        event: &NewRollbackEvent,
        created_at: i64,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            r#"
            INSERT INTO rollback_events (id, graph_version_from, "trigger", status, notes, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                event.id,
                event.graph_version_from,
                event.trigger,
                event.status,
                serde_json::to_string(&event.notes)?,
                created_at,
            ],
        )?;
        Ok(())
    }

    pub fn list_drift_metrics(
        &self,
        graph_version: &str,
        limit: u32,
    ) -> Result<Vec<StoredDriftMetric>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, created_at, graph_version, metric_name, window_start, window_end,
                   value, threshold, status, metadata
            FROM structural_drift_metrics
            WHERE graph_version = ?1
            ORDER BY id DESC
            LIMIT ?2
            "#,
        )?;
        let rows = stmt.query_map(params![graph_version, limit.max(1) as i64], stored_metric_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Newest row per metric name; readers de-duplicate overlapping runs this way.
    pub fn latest_drift_metrics(
        &self,
        graph_version: &str,
    ) -> Result<Vec<StoredDriftMetric>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT m.id, m.created_at, m.graph_version, m.metric_name, m.window_start, m.window_end,
                   m.value, m.threshold, m.status, m.metadata
            FROM structural_drift_metrics m
            WHERE m.graph_version = ?1
              AND m.id = (
                  SELECT MAX(latest.id)
                  FROM structural_drift_metrics latest
                  WHERE latest.graph_version = m.graph_version
                    AND latest.metric_name = m.metric_name
              )
            ORDER BY m.metric_name ASC
            "#,
        )?;
        let rows = stmt.query_map(params![graph_version], stored_metric_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn list_rollback_events(
        &self,
        graph_version_from: &str,
        limit: u32,
    ) -> Result<Vec<RollbackEventRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, graph_version_from, "trigger", status, notes, created_at
            FROM rollback_events
            WHERE graph_version_from = ?1
            ORDER BY created_at DESC, id ASC
            LIMIT ?2
            "#,
        )?;
        let rows = stmt.query_map(params![graph_version_from, limit.max(1) as i64], |row| {
            Ok(RollbackEventRecord {
                id: row.get(0)?,
                graph_version_from: row.get(1)?,
                trigger: row.get(2)?,
                status: row.get(3)?,
                notes: parse_json_column(row.get::<_, String>(4)?.as_str()),
                created_at: row.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

impl DriftStore for SqliteStore {
    fn latest_graph_version(&self, active_only: bool) -> Result<Option<String>, StoreError> {
        let version = if active_only {
            self.conn
                .query_row(
                    r#"
                    SELECT graph_version
                    FROM graph_versions
                    WHERE status = ?1
                    ORDER BY updated_at DESC, graph_version DESC
                    LIMIT 1
                    "#,
                    params![GRAPH_VERSION_STATUS_ACTIVE],
                    |row| row.get::<_, String>(0),
                )
                .optional()?
        } else {
            self.conn
                .query_row(
                    r#"
                    SELECT graph_version
                    FROM graph_versions
                    ORDER BY updated_at DESC, graph_version DESC
                    LIMIT 1
                    "#,
                    [],
                    |row| row.get::<_, String>(0),
                )
                .optional()?
        };
        Ok(version)
    }

    fn list_decision_traces(&self, query: &TraceQuery) -> Result<Vec<DecisionTrace>, StoreError> {
        let mut sql = String::from(
            r#"
            SELECT id, occurred_at, graph_version, decision_type, candidates, chosen, thresholds
            FROM structural_decision_traces
            WHERE graph_version = ?
              AND occurred_at >= ?
              AND occurred_at < ?
            "#,
        );
        let mut values = vec![
            SqlValue::Text(query.graph_version.clone()),
            SqlValue::Integer(query.window_start),
            SqlValue::Integer(query.window_end),
        ];
        if !query.decision_types.is_empty() {
            let placeholders = vec!["?"; query.decision_types.len()].join(", ");
            sql.push_str(format!("  AND decision_type IN ({placeholders})\n").as_str());
            values.extend(query.decision_types.iter().cloned().map(SqlValue::Text));
        }
        sql.push_str("ORDER BY occurred_at DESC, id DESC\nLIMIT ?");
        values.push(SqlValue::Integer(query.limit.max(1) as i64));

        let mut stmt = self.conn.prepare(sql.as_str())?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
            Ok(DecisionTrace {
                id: row.get(0)?,
                occurred_at: row.get(1)?,
                graph_version: row.get(2)?,
                decision_type: row.get(3)?,
                candidates: parse_json_column(row.get::<_, String>(4)?.as_str()),
                chosen: parse_json_column(row.get::<_, String>(5)?.as_str()),
                thresholds: parse_json_column(row.get::<_, String>(6)?.as_str()),
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn count_global_concepts_updated(&self, start: i64, end: i64) -> Result<i64, StoreError> {
        let count = self.conn.query_row(
            r#"
            SELECT COUNT(*)
            FROM concepts
            WHERE scope = 'global'
              AND updated_at >= ?1
              AND updated_at < ?2
            "#,
            params![start, end],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn count_global_remerged_concepts(&self, start: i64, end: i64) -> Result<i64, StoreError> {
        let count = self.conn.query_row(
            r#"
            SELECT COUNT(*)
            FROM concepts
            WHERE scope = 'global'
              AND updated_at >= ?1
              AND updated_at < ?2
              AND canonical_concept_id IS NOT NULL
              AND created_at < ?1
            "#,
            params![start, end],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn count_global_new_aliases(&self, start: i64, end: i64) -> Result<i64, StoreError> {
        let count = self.conn.query_row(
            r#"
            SELECT COUNT(*)
            FROM concepts
            WHERE scope = 'global'
              AND created_at >= ?1
              AND created_at < ?2
              AND canonical_concept_id IS NOT NULL
            "#,
            params![start, end],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn edge_strength_stats(&self, start: i64, end: i64) -> Result<EdgeStrengthStats, StoreError> {
        let stats = self.conn.query_row(
            r#"
            SELECT COALESCE(AVG(COALESCE(strength, 0.0)), 0.0), COUNT(*)
            FROM concept_edges
            WHERE created_at >= ?1
              AND created_at < ?2
            "#,
            params![start, end],
            |row| {
                Ok(EdgeStrengthStats {
                    mean: row.get(0)?,
                    count: row.get(1)?,
                })
            },
        )?;
        Ok(stats)
    }

    fn count_rollback_events_since(
        &self,
        graph_version_from: &str,
        trigger: &str,
        cutoff: i64,
    ) -> Result<i64, StoreError> {
        let count = self.conn.query_row(
            r#"
            SELECT COUNT(*)
            FROM rollback_events
            WHERE graph_version_from = ?1
              AND "trigger" = ?2
              AND created_at >= ?3
            "#,
            params![graph_version_from, trigger, cutoff],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

impl MetricsRepository for SqliteStore {
    fn create_many(
        &self,
        rows: &[DriftMetricRecord],
    ) -> Result<Vec<StoredDriftMetric>, StoreError> {
        for row in rows {
            if !row.value.is_finite() || !row.threshold.is_finite() {
                return Err(StoreError::InvalidRecord(format!(
                    "metric {} has non-finite value {} or threshold {}",
                    row.metric_name, row.value, row.threshold
                )));
            }
        }

        let tx = self.conn.unchecked_transaction()?;
        let mut stored = Vec::with_capacity(rows.len());
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO structural_drift_metrics (
                    graph_version, metric_name, window_start, window_end,
                    value, threshold, status, metadata
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                RETURNING id, created_at
                "#,
            )?;
            for row in rows {
                let (id, created_at) = stmt.query_row(
                    params![
                        row.graph_version,
                        row.metric_name,
                        row.window_start,
                        row.window_end,
                        row.value,
                        row.threshold,
                        row.status.as_str(),
                        serde_json::to_string(&row.metadata)?,
                    ],
                    |result| Ok((result.get::<_, i64>(0)?, result.get::<_, i64>(1)?)),
                )?;
                stored.push(StoredDriftMetric {
                    id,
                    created_at,
                    record: row.clone(),
                });
            }
        }
        tx.commit()?;

        tracing::debug!(rows = stored.len(), "persisted structural drift metrics");
        Ok(stored)
    }
}

impl RollbackEventRepository for SqliteStore {
    fn create(&self, event: &NewRollbackEvent) -> Result<(), StoreError> {
        self.conn.execute(
            r#"
            INSERT INTO rollback_events (id, graph_version_from, "trigger", status, notes)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                event.id,
                event.graph_version_from,
                event.trigger,
                event.status,
                serde_json::to_string(&event.notes)?,
            ],
        )?;
        Ok(())
    }
}

fn stored_metric_row(row: &Row<'_>) -> rusqlite::Result<StoredDriftMetric> {
    let status_text = row.get::<_, String>(8)?;
    let status = status_text.parse::<MetricStatus>().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            8,
            rusqlite::types::Type::Text,
            Box::new(StoreError::InvalidRecord(err)),
        )
    })?;
    Ok(StoredDriftMetric {
        id: row.get(0)?,
        created_at: row.get(1)?,
        record: DriftMetricRecord {
            graph_version: row.get(2)?,
            metric_name: row.get(3)?,
            window_start: row.get(4)?,
            window_end: row.get(5)?,
            value: row.get(6)?,
            threshold: row.get(7)?,
            status,
            metadata: parse_json_column(row.get::<_, String>(9)?.as_str()),
        },
    })
}

/// Upstream payloads are not schema-pinned; unparseable JSON degrades to null.
fn parse_json_column(raw: &str) -> Value {
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(error = %err, len = raw.len(), "malformed JSON column, reading as null");
            Value::Null
        }
    }
}

fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        format!(
            r#"
        CREATE TABLE IF NOT EXISTS graph_versions (
            graph_version TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS structural_decision_traces (
            id TEXT PRIMARY KEY,
            occurred_at INTEGER NOT NULL,
            graph_version TEXT NOT NULL,
            decision_type TEXT NOT NULL,
            candidates TEXT NOT NULL DEFAULT 'null',
            chosen TEXT NOT NULL DEFAULT 'null',
            thresholds TEXT NOT NULL DEFAULT 'null'
        );
        CREATE INDEX IF NOT EXISTS idx_decision_traces_version_time
            ON structural_decision_traces(graph_version, occurred_at);

        CREATE TABLE IF NOT EXISTS concepts (
            id TEXT PRIMARY KEY,
            scope TEXT NOT NULL,
            canonical_concept_id TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_concepts_scope_updated ON concepts(scope, updated_at);
        CREATE INDEX IF NOT EXISTS idx_concepts_scope_created ON concepts(scope, created_at);

        CREATE TABLE IF NOT EXISTS concept_edges (
            id TEXT PRIMARY KEY,
            source_concept_id TEXT NOT NULL,
            target_concept_id TEXT NOT NULL,
            strength REAL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_concept_edges_created ON concept_edges(created_at);

        CREATE TABLE IF NOT EXISTS structural_drift_metrics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            graph_version TEXT NOT NULL,
            metric_name TEXT NOT NULL,
            window_start INTEGER NOT NULL,
            window_end INTEGER NOT NULL,
            value REAL NOT NULL,
            threshold REAL NOT NULL,
            status TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{{}}',
            created_at INTEGER NOT NULL DEFAULT ({now})
        );
        CREATE INDEX IF NOT EXISTS idx_drift_metrics_version_name
            ON structural_drift_metrics(graph_version, metric_name, id);
        CREATE TRIGGER IF NOT EXISTS structural_drift_metrics_append_only
            BEFORE UPDATE ON structural_drift_metrics
        BEGIN
            SELECT RAISE(ABORT, 'structural drift metrics are append-only');
        END;

        CREATE TABLE IF NOT EXISTS rollback_events (
            id TEXT PRIMARY KEY,
            graph_version_from TEXT NOT NULL,
            "trigger" TEXT NOT NULL,
            status TEXT NOT NULL,
            notes TEXT NOT NULL DEFAULT '{{}}',
            created_at INTEGER NOT NULL DEFAULT ({now})
        );
        CREATE INDEX IF NOT EXISTS idx_rollback_events_cooldown
            ON rollback_events(graph_version_from, "trigger", created_at);
        "#,
            now = NOW_MILLIS_SQL
        )
        .as_str(),
    )?;

    Ok(())
}
