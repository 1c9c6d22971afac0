//! Ingestion Orchestrator - Drives one ingestion run
//!
//! A run moves through `Idle → Inferring → Mapped → Provisioned → Loading →
//! Finalized`. Any failure moves it to `Failed`. Both terminal states are
//! final; a new run starts from `Idle`.
//!
//! Planning (inference and mapping) touches only the source file, so callers
//! can plan before opening a database connection.

use crate::db::SqlStore;
use crate::error::{IngestError, Result};
use crate::ingestion::csv_connector::CsvSource;
use crate::ingestion::loader::BulkLoader;
use crate::ingestion::provisioner::TableProvisioner;
use crate::ingestion::schema_inference::{InferenceMode, Schema, SchemaInference};
use crate::ingestion::table_builder::{Mapping, TableBuilder};
use crate::ingestion::IngestionReport;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Inferring,
    Mapped,
    Provisioned,
    Loading,
    Finalized,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Finalized | RunState::Failed)
    }

    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Idle, Inferring)
            | (Inferring, Mapped)
            | (Mapped, Provisioned)
            | (Provisioned, Loading)
            | (Loading, Finalized) => true,
            _ => false,
        }
    }
}

/// Options controlling one ingestion run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestionOptions {
    pub inference_mode: InferenceMode,
    pub atomic_provisioning: bool,
    pub sync_tag: String,
    pub progress_interval: u64,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            inference_mode: InferenceMode::HeaderOnly,
            atomic_provisioning: true,
            sync_tag: "sync".to_string(),
            progress_interval: 10_000,
        }
    }
}

/// Transient state for one invocation.
#[derive(Debug)]
pub struct IngestionRun {
    run_id: String,
    source_name: String,
    state: RunState,
    schema: Option<Schema>,
    mapping: Option<Mapping>,
}

impl IngestionRun {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            source_name: source_name.into(),
            state: RunState::Idle,
            schema: None,
            mapping: None,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    pub fn mapping(&self) -> Option<&Mapping> {
        self.mapping.as_ref()
    }

    pub fn advance(&mut self, next: RunState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(IngestError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        info!("Run {}: {:?} -> {:?}", self.run_id, self.state, next);
        self.state = next;
        Ok(())
    }

    fn fail(&mut self, err: &IngestError) {
        if self.state.is_terminal() {
            return;
        }
        error!("Run {} failed while {:?}: {}", self.run_id, self.state, err);
        if self.state == RunState::Loading {
            if let Some(mapping) = &self.mapping {
                warn!(
                    "Leaving {} in place after partial load",
                    mapping.revision_table_name
                );
            }
        }
        self.state = RunState::Failed;
    }

    /// The mapping, provided the run is ready to provision.
    fn planned_mapping(&self) -> Result<Mapping> {
        match (&self.mapping, self.state) {
            (Some(mapping), RunState::Mapped) => Ok(mapping.clone()),
            _ => Err(IngestError::InvalidTransition {
                from: self.state,
                to: RunState::Provisioned,
            }),
        }
    }
}

/// Ingestion Orchestrator - Coordinates the entire ingestion process
pub struct IngestionOrchestrator {
    options: IngestionOptions,
    schema_inference: SchemaInference,
    table_builder: TableBuilder,
}

impl IngestionOrchestrator {
    pub fn new() -> Self {
        Self::with_options(IngestionOptions::default())
    }

    pub fn with_options(options: IngestionOptions) -> Self {
        Self {
            schema_inference: SchemaInference::with_mode(options.inference_mode),
            table_builder: TableBuilder::new(),
            options,
        }
    }

    /// Infer the schema and build the mapping: `Idle → Inferring → Mapped`.
    pub fn plan(&self, run: &mut IngestionRun, source: &CsvSource) -> Result<Mapping> {
        let result = self.plan_inner(run, source);
        if let Err(e) = &result {
            run.fail(e);
        }
        result
    }

    fn plan_inner(&self, run: &mut IngestionRun, source: &CsvSource) -> Result<Mapping> {
        run.advance(RunState::Inferring)?;
        let schema = self
            .schema_inference
            .infer_from_source(source, &run.source_name)?;

        let mapping = self.table_builder.to_mapping(&schema)?;
        debug!(
            "Mapping for {}: {}",
            mapping.table_name,
            serde_json::to_string(&mapping).unwrap_or_default()
        );
        run.schema = Some(schema);
        run.mapping = Some(mapping.clone());
        run.advance(RunState::Mapped)?;
        Ok(mapping)
    }

    /// Provision, load and finalize: `Mapped → Provisioned → Loading → Finalized`.
    pub async fn apply(
        &self,
        run: &mut IngestionRun,
        store: &mut dyn SqlStore,
        source: &CsvSource,
    ) -> Result<IngestionReport> {
        let result = self.apply_inner(run, store, source).await;
        if let Err(e) = &result {
            run.fail(e);
        }
        result
    }

    async fn apply_inner(
        &self,
        run: &mut IngestionRun,
        store: &mut dyn SqlStore,
        source: &CsvSource,
    ) -> Result<IngestionReport> {
        let mapping = run.planned_mapping()?;

        TableProvisioner::new(self.options.atomic_provisioning)
            .provision(store, &mapping)
            .await?;
        run.advance(RunState::Provisioned)?;

        run.advance(RunState::Loading)?;
        let rows = source.rows()?;
        let identity_tags = vec![run.source_name.clone()];
        let summary = BulkLoader::new(self.options.progress_interval)
            .load(store, rows, &mapping, &identity_tags, &self.options.sync_tag)
            .await?;

        store
            .execute(&self.table_builder.drop_table_sql(&mapping.revision_table_name))
            .await?;
        run.advance(RunState::Finalized)?;

        info!(
            "Loaded {} rows into {} ({} columns)",
            summary.rows_loaded,
            mapping.table_name,
            mapping.columns.len()
        );

        Ok(IngestionReport {
            run_id: run.run_id.clone(),
            source_name: run.source_name.clone(),
            table_name: mapping.table_name.clone(),
            columns: mapping.column_names().iter().map(|c| c.to_string()).collect(),
            rows_loaded: summary.rows_loaded,
        })
    }

    /// Plan and apply in one call.
    pub async fn run(
        &self,
        store: &mut dyn SqlStore,
        source: &CsvSource,
        source_name: &str,
    ) -> Result<IngestionReport> {
        let mut run = IngestionRun::new(source_name);
        self.plan(&mut run, source)?;
        self.apply(&mut run, store, source).await
    }
}

impl Default for IngestionOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_state_transitions() {
        use RunState::*;
        let path = [Idle, Inferring, Mapped, Provisioned, Loading, Finalized];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]));
        }
        for state in [Idle, Inferring, Mapped, Provisioned, Loading] {
            assert!(state.can_transition_to(Failed));
        }
        assert!(!Finalized.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Idle));
        assert!(!Failed.can_transition_to(Inferring));
        assert!(!Idle.can_transition_to(Loading));
        assert!(!Loading.can_transition_to(Provisioned));
    }

    #[test]
    fn test_advance_rejects_skips() {
        let mut run = IngestionRun::new("users");
        let err = run.advance(RunState::Loading).unwrap_err();
        assert!(matches!(
            err,
            IngestError::InvalidTransition { from: RunState::Idle, to: RunState::Loading }
        ));
        assert_eq!(run.state(), RunState::Idle);
    }

    #[tokio::test]
    async fn test_successful_run_finalizes() {
        let file = write_csv("id,name\n1,Ann\n2,Bob\n");
        let source = CsvSource::new(file.path());
        let mut store = SqliteStore::open_in_memory().unwrap();
        let orchestrator = IngestionOrchestrator::new();

        let mut run = IngestionRun::new("users");
        orchestrator.plan(&mut run, &source).unwrap();
        assert_eq!(run.state(), RunState::Mapped);
        assert!(run.schema().is_some());

        let report = orchestrator.apply(&mut run, &mut store, &source).await.unwrap();
        assert_eq!(run.state(), RunState::Finalized);
        assert_eq!(report.rows_loaded, 2);
        assert_eq!(report.columns, vec!["id", "name"]);
        assert_eq!(report.table_name, "users");
        assert!(!store.table_exists("users_revisions").await.unwrap());
    }

    #[tokio::test]
    async fn test_bad_source_name_fails_in_planning() {
        let file = write_csv("id\n1\n");
        let mut run = IngestionRun::new("drop table");
        let err = IngestionOrchestrator::new()
            .plan(&mut run, &CsvSource::new(file.path()))
            .unwrap_err();
        assert!(matches!(err, IngestError::InvalidIdentifier(_)));
        assert_eq!(run.state(), RunState::Failed);
    }

    #[tokio::test]
    async fn test_failed_load_keeps_revisions() {
        let file = write_csv("a,b\n1,2\n3,4\n5\n");
        let source = CsvSource::new(file.path());
        let mut store = SqliteStore::open_in_memory().unwrap();
        let orchestrator = IngestionOrchestrator::new();

        let mut run = IngestionRun::new("pairs");
        orchestrator.plan(&mut run, &source).unwrap();
        let err = orchestrator.apply(&mut run, &mut store, &source).await.unwrap_err();

        assert!(matches!(err, IngestError::Parse { record: 3, .. }));
        assert_eq!(run.state(), RunState::Failed);
        assert_eq!(store.count_rows("pairs").await.unwrap(), 2);
        assert!(store.table_exists("pairs_revisions").await.unwrap());

        // Failed is final.
        assert!(orchestrator.apply(&mut run, &mut store, &source).await.is_err());
        assert_eq!(run.state(), RunState::Failed);
    }

    #[tokio::test]
    async fn test_apply_without_plan_is_rejected() {
        let file = write_csv("a\n1\n");
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut run = IngestionRun::new("t");

        let err = IngestionOrchestrator::new()
            .apply(&mut run, &mut store, &CsvSource::new(file.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::InvalidTransition { .. }));
        assert!(!store.table_exists("t").await.unwrap());
    }

    #[tokio::test]
    async fn test_full_scan_run_creates_typed_columns() {
        let file = write_csv("id,price\n1,2.50\n2,3.75\n");
        let source = CsvSource::new(file.path());
        let mut store = SqliteStore::open_in_memory().unwrap();
        let orchestrator = IngestionOrchestrator::with_options(IngestionOptions {
            inference_mode: InferenceMode::FullScan,
            ..IngestionOptions::default()
        });

        orchestrator.run(&mut store, &source, "prices").await.unwrap();

        let total: f64 = store
            .connection()
            .query_row("SELECT SUM(price) FROM prices", [], |r| r.get(0))
            .unwrap();
        assert!((total - 6.25).abs() < 1e-9);
        let id_type: String = store
            .connection()
            .query_row("SELECT typeof(id) FROM prices LIMIT 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(id_type, "integer");
    }
}
