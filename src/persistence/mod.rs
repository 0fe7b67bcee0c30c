//! Persistence layer for provisioning run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

pub use crate::core::ExecutionStatus;
use crate::core::{PipelineResult, StepOutcome, StepRecord};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Summary of a provisioning run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Pipeline name
    pub pipeline_name: String,

    /// Execution status
    pub status: ExecutionStatus,

    /// Process exit code the run ended with
    pub exit_code: i32,

    /// When execution started
    pub started_at: DateTime<Utc>,

    /// When execution completed (if complete)
    pub completed_at: Option<DateTime<Utc>>,

    /// Number of steps applied
    pub applied_steps: usize,

    /// Number of steps already satisfied
    pub skipped_steps: usize,

    /// Total number of steps
    pub total_steps: usize,

    /// Name of the step that failed, if any
    pub failed_step: Option<String>,

    /// Per-step records
    pub records: Vec<StepRecord>,
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a run
    async fn save_run(&self, run: &RunSummary) -> Result<()>;

    /// Load a run by ID
    async fn load_run(&self, execution_id: Uuid) -> Result<Option<RunSummary>>;

    /// Most recent runs of a pipeline, newest first
    async fn list_runs(&self, pipeline_name: &str, limit: usize) -> Result<Vec<RunSummary>>;

    /// The most recent run of a pipeline
    async fn latest_run(&self, pipeline_name: &str) -> Result<Option<RunSummary>> {
        Ok(self.list_runs(pipeline_name, 1).await?.into_iter().next())
    }
}

/// In-memory persistence (for testing or ephemeral use)
pub struct InMemoryPersistence {
    runs: tokio::sync::RwLock<Vec<RunSummary>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            runs: tokio::sync::RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        let mut runs = self.runs.write().await;
        runs.retain(|r| r.execution_id != run.execution_id);
        runs.push(run.clone());
        Ok(())
    }

    async fn load_run(&self, execution_id: Uuid) -> Result<Option<RunSummary>> {
        let runs = self.runs.read().await;
        Ok(runs.iter().find(|r| r.execution_id == execution_id).cloned())
    }

    async fn list_runs(&self, pipeline_name: &str, limit: usize) -> Result<Vec<RunSummary>> {
        let runs = self.runs.read().await;
        let mut matching: Vec<RunSummary> = runs
            .iter()
            .filter(|r| r.pipeline_name == pipeline_name)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        matching.truncate(limit);
        Ok(matching)
    }
}

/// Create a summary from a finished run
pub fn create_summary(result: &PipelineResult) -> RunSummary {
    RunSummary {
        execution_id: result.execution_id(),
        pipeline_name: result.pipeline_name().to_string(),
        status: result.status(),
        exit_code: result.exit_code(),
        started_at: result.started_at(),
        completed_at: result.completed_at(),
        applied_steps: result.count(StepOutcome::Applied),
        skipped_steps: result.count(StepOutcome::Skipped),
        total_steps: result.total_steps(),
        failed_step: result.failed_step().map(|r| r.step_name.clone()),
        records: result.records().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn summary(name: &str, minutes_ago: i64) -> RunSummary {
        RunSummary {
            execution_id: Uuid::new_v4(),
            pipeline_name: name.to_string(),
            status: ExecutionStatus::Succeeded,
            exit_code: 0,
            started_at: Utc::now() - Duration::minutes(minutes_ago),
            completed_at: Some(Utc::now()),
            applied_steps: 0,
            skipped_steps: 8,
            total_steps: 8,
            failed_step: None,
            records: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_in_memory_lists_newest_first() {
        let store = InMemoryPersistence::new();
        let older = summary("yesdb", 10);
        let newer = summary("yesdb", 1);
        store.save_run(&older).await.unwrap();
        store.save_run(&newer).await.unwrap();
        store.save_run(&summary("other", 0)).await.unwrap();

        let runs = store.list_runs("yesdb", 10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].execution_id, newer.execution_id);

        let latest = store.latest_run("yesdb").await.unwrap().unwrap();
        assert_eq!(latest.execution_id, newer.execution_id);
        assert_eq!(
            store.load_run(older.execution_id).await.unwrap(),
            Some(older)
        );
    }
}
