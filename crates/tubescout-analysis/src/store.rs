//! Persistence capability for analyses.
//!
//! The pipeline never talks to storage directly, only through
//! [`AnalysisStore`], so the backing store (in-memory here, relational
//! elsewhere) is swappable without pipeline changes. Selection happens once
//! at startup, not via runtime feature detection.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use tubescout_core::{Analysis, AnalysisStatus, AnalysisSummary, OutlierResult};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("analysis {0} not found")]
    NotFound(Uuid),

    #[error("invalid status transition for analysis {id}: {from} -> {to}")]
    InvalidTransition {
        id: Uuid,
        from: AnalysisStatus,
        to: AnalysisStatus,
    },

    /// Backing storage is temporarily unreachable; retryable at the caller's
    /// discretion.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Narrow persistence interface consumed by the pipeline and workers.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn create(&self, analysis: Analysis) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Analysis>, StoreError>;

    /// Move to a non-terminal status (`Processing`); terminal transitions go
    /// through the dedicated methods below so results/errors land atomically
    /// with the status change.
    async fn update_status(&self, id: Uuid, status: AnalysisStatus) -> Result<(), StoreError>;

    async fn complete(
        &self,
        id: Uuid,
        results: Vec<OutlierResult>,
        summary: AnalysisSummary,
    ) -> Result<(), StoreError>;

    async fn fail(&self, id: Uuid, message: &str) -> Result<(), StoreError>;

    /// Mark cancelled. Succeeds from any non-terminal status; a no-op when
    /// already cancelled.
    async fn cancel(&self, id: Uuid) -> Result<(), StoreError>;

    async fn status(&self, id: Uuid) -> Result<Option<AnalysisStatus>, StoreError>;
}

/// Process-local store backed by a `RwLock<HashMap>`.
#[derive(Default)]
pub struct InMemoryAnalysisStore {
    analyses: RwLock<HashMap<Uuid, Analysis>>,
}

impl InMemoryAnalysisStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All analyses with a terminal status, for archiving sweeps.
    pub async fn terminal_ids(&self) -> Vec<Uuid> {
        self.analyses
            .read()
            .await
            .values()
            .filter(|a| a.status.is_terminal())
            .map(|a| a.id)
            .collect()
    }

    /// Drop a record entirely (archiving/cleanup).
    pub async fn remove(&self, id: Uuid) -> bool {
        self.analyses.write().await.remove(&id).is_some()
    }

    fn check_transition(
        analysis: &Analysis,
        to: AnalysisStatus,
    ) -> Result<(), StoreError> {
        let from = analysis.status;
        let allowed = match to {
            AnalysisStatus::Processing => from == AnalysisStatus::Pending,
            AnalysisStatus::Completed => from == AnalysisStatus::Processing,
            AnalysisStatus::Failed | AnalysisStatus::Cancelled => !from.is_terminal(),
            AnalysisStatus::Pending => false,
        };
        if allowed {
            Ok(())
        } else {
            Err(StoreError::InvalidTransition {
                id: analysis.id,
                from,
                to,
            })
        }
    }
}

#[async_trait]
impl AnalysisStore for InMemoryAnalysisStore {
    async fn create(&self, analysis: Analysis) -> Result<(), StoreError> {
        self.analyses.write().await.insert(analysis.id, analysis);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Analysis>, StoreError> {
        Ok(self.analyses.read().await.get(&id).cloned())
    }

    async fn update_status(&self, id: Uuid, status: AnalysisStatus) -> Result<(), StoreError> {
        let mut analyses = self.analyses.write().await;
        let analysis = analyses.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        Self::check_transition(analysis, status)?;
        analysis.status = status;
        if status == AnalysisStatus::Processing {
            analysis.started_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn complete(
        &self,
        id: Uuid,
        results: Vec<OutlierResult>,
        summary: AnalysisSummary,
    ) -> Result<(), StoreError> {
        let mut analyses = self.analyses.write().await;
        let analysis = analyses.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        Self::check_transition(analysis, AnalysisStatus::Completed)?;
        analysis.status = AnalysisStatus::Completed;
        analysis.completed_at = Some(Utc::now());
        analysis.results = results;
        analysis.summary = summary;
        Ok(())
    }

    async fn fail(&self, id: Uuid, message: &str) -> Result<(), StoreError> {
        let mut analyses = self.analyses.write().await;
        let analysis = analyses.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        Self::check_transition(analysis, AnalysisStatus::Failed)?;
        analysis.status = AnalysisStatus::Failed;
        analysis.completed_at = Some(Utc::now());
        analysis.error = Some(message.to_string());
        Ok(())
    }

    async fn cancel(&self, id: Uuid) -> Result<(), StoreError> {
        let mut analyses = self.analyses.write().await;
        let analysis = analyses.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if analysis.status == AnalysisStatus::Cancelled {
            return Ok(());
        }
        Self::check_transition(analysis, AnalysisStatus::Cancelled)?;
        analysis.status = AnalysisStatus::Cancelled;
        analysis.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn status(&self, id: Uuid) -> Result<Option<AnalysisStatus>, StoreError> {
        Ok(self.analyses.read().await.get(&id).map(|a| a.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tubescout_core::AnalysisConfig;

    fn new_analysis() -> Analysis {
        Analysis::new(AnalysisConfig {
            exclusion_channel_ids: vec![],
            search_queries: vec!["gaming".to_string()],
            min_subscribers: 10_000,
            max_subscribers: 500_000,
            min_videos: 10,
            require_family_safe: true,
            time_window_days: 30,
            outlier_threshold: 20.0,
            brand_fit_minimum: 6.0,
            max_results: 50,
            batch_size: 5,
        })
    }

    #[tokio::test]
    async fn lifecycle_pending_processing_completed() {
        let store = InMemoryAnalysisStore::new();
        let analysis = new_analysis();
        let id = analysis.id;
        store.create(analysis).await.unwrap();

        store
            .update_status(id, AnalysisStatus::Processing)
            .await
            .unwrap();
        store
            .complete(id, Vec::new(), AnalysisSummary::default())
            .await
            .unwrap();

        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status, AnalysisStatus::Completed);
        assert!(stored.started_at.is_some());
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn completion_requires_processing_first() {
        let store = InMemoryAnalysisStore::new();
        let analysis = new_analysis();
        let id = analysis.id;
        store.create(analysis).await.unwrap();

        let err = store
            .complete(id, Vec::new(), AnalysisSummary::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn fail_records_message_and_timestamp() {
        let store = InMemoryAnalysisStore::new();
        let analysis = new_analysis();
        let id = analysis.id;
        store.create(analysis).await.unwrap();
        store
            .update_status(id, AnalysisStatus::Processing)
            .await
            .unwrap();
        store.fail(id, "quota exhausted").await.unwrap();

        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status, AnalysisStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("quota exhausted"));
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn cancel_is_idempotent_but_completed_stays_completed() {
        let store = InMemoryAnalysisStore::new();
        let analysis = new_analysis();
        let id = analysis.id;
        store.create(analysis).await.unwrap();

        store.cancel(id).await.unwrap();
        store.cancel(id).await.unwrap();
        assert_eq!(
            store.status(id).await.unwrap(),
            Some(AnalysisStatus::Cancelled)
        );

        let completed = new_analysis();
        let cid = completed.id;
        store.create(completed).await.unwrap();
        store
            .update_status(cid, AnalysisStatus::Processing)
            .await
            .unwrap();
        store
            .complete(cid, Vec::new(), AnalysisSummary::default())
            .await
            .unwrap();
        let err = store.cancel(cid).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let store = InMemoryAnalysisStore::new();
        let err = store
            .update_status(Uuid::new_v4(), AnalysisStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(store.status(Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn terminal_ids_and_remove() {
        let store = InMemoryAnalysisStore::new();
        let running = new_analysis();
        let done = new_analysis();
        let done_id = done.id;
        store.create(running).await.unwrap();
        store.create(done).await.unwrap();
        store
            .update_status(done_id, AnalysisStatus::Processing)
            .await
            .unwrap();
        store.fail(done_id, "boom").await.unwrap();

        assert_eq!(store.terminal_ids().await, vec![done_id]);
        assert!(store.remove(done_id).await);
        assert!(!store.remove(done_id).await);
    }
}
