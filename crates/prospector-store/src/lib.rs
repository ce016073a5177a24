//! The Result Store: durable record of lead state, enrichment data,
//! generated content, and audit trail.
//!
//! This is the single shared mutable resource in the pipeline - all stage
//! components communicate through it. Per-lead updates are the unit of
//! atomicity; the one-lead-one-stage invariant (enforced by the
//! orchestrator) means two stages never write overlapping fields of the
//! same lead concurrently.
//!
//! Snapshots are pretty-printed JSON at `<root>/leads.json`, loaded before
//! a run so re-runs resume rather than restart.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use prospector_types::{Lead, LeadId, LeadStatus, Result, Stage, Tier};

const SNAPSHOT_FILE: &str = "leads.json";

// ---------------------------------------------------------------------------
// RunCounts
// ---------------------------------------------------------------------------

/// Counts per terminal status, reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub pending: usize,
    pub flagged: usize,
}

/// One failed lead surfaced for operator triage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedLead {
    pub id: LeadId,
    pub name: String,
    pub stage: Stage,
    pub kind: Option<prospector_types::ErrorKind>,
    pub message: String,
}

// ---------------------------------------------------------------------------
// LeadStore
// ---------------------------------------------------------------------------

/// Cloneable handle to the shared lead map. Cloning yields another handle
/// to the **same** inner state.
#[derive(Clone)]
pub struct LeadStore {
    inner: Arc<tokio::sync::RwLock<HashMap<LeadId, Lead>>>,
    root: PathBuf,
}

impl LeadStore {
    /// Create an empty store rooted at `root` (snapshot directory).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(tokio::sync::RwLock::new(HashMap::new())),
            root: root.into(),
        }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.root.join(SNAPSHOT_FILE)
    }

    /// Insert or overwrite a lead record.
    pub async fn upsert(&self, lead: Lead) {
        self.inner.write().await.insert(lead.id.clone(), lead);
    }

    /// Insert only if no record with this id exists yet. Returns whether
    /// the lead was inserted. This is how re-seeding stays idempotent:
    /// cleaned shells never clobber records carrying prior progress.
    pub async fn insert_new(&self, lead: Lead) -> bool {
        let mut guard = self.inner.write().await;
        if guard.contains_key(&lead.id) {
            false
        } else {
            guard.insert(lead.id.clone(), lead);
            true
        }
    }

    /// Point lookup (cloned).
    pub async fn get(&self, id: &str) -> Option<Lead> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// All lead ids, unordered.
    pub async fn ids(&self) -> Vec<LeadId> {
        self.inner.read().await.keys().cloned().collect()
    }

    /// Leads with the given status.
    pub async fn by_status(&self, status: LeadStatus) -> Vec<Lead> {
        self.inner
            .read()
            .await
            .values()
            .filter(|l| l.status == status)
            .cloned()
            .collect()
    }

    /// Leads assigned the given tier.
    pub async fn by_tier(&self, tier: Tier) -> Vec<Lead> {
        self.inner
            .read()
            .await
            .values()
            .filter(|l| l.segment.as_ref().is_some_and(|s| s.tier == tier))
            .cloned()
            .collect()
    }

    /// Non-terminal leads currently at the given stage.
    pub async fn at_stage(&self, stage: Stage) -> Vec<Lead> {
        self.inner
            .read()
            .await
            .values()
            .filter(|l| l.stage == stage && !l.status.is_terminal())
            .cloned()
            .collect()
    }

    /// Append a reviewer/merge annotation to a lead. Review-boundary writes
    /// come in as annotations, never as state transitions.
    pub async fn annotate(&self, id: &str, note: impl Into<String>) -> bool {
        let mut guard = self.inner.write().await;
        match guard.get_mut(id) {
            Some(lead) => {
                lead.notes.push(note.into());
                true
            }
            None => false,
        }
    }

    /// Counts per terminal status plus flagged drafts.
    pub async fn counts(&self) -> RunCounts {
        let guard = self.inner.read().await;
        let mut counts = RunCounts {
            total: guard.len(),
            ..Default::default()
        };
        for lead in guard.values() {
            match lead.status {
                LeadStatus::Succeeded => counts.succeeded += 1,
                LeadStatus::Failed => counts.failed += 1,
                LeadStatus::Skipped => counts.skipped += 1,
                LeadStatus::Pending | LeadStatus::InProgress => counts.pending += 1,
            }
            if matches!(lead.verdict, Some(prospector_types::Verdict::Flag(_))) {
                counts.flagged += 1;
            }
        }
        counts
    }

    /// Failed leads with their failing stage and last recorded error, for
    /// operator triage.
    pub async fn failed_leads(&self) -> Vec<FailedLead> {
        self.inner
            .read()
            .await
            .values()
            .filter(|l| l.status == LeadStatus::Failed)
            .map(|l| {
                let last = l.history.last();
                FailedLead {
                    id: l.id.clone(),
                    name: l.name.clone(),
                    stage: l.stage,
                    kind: last.map(|r| r.kind),
                    message: last.map(|r| r.message.clone()).unwrap_or_default(),
                }
            })
            .collect()
    }

    // -- persistence --------------------------------------------------------

    /// Write the current map to `<root>/leads.json`, creating the directory
    /// if needed.
    pub async fn save(&self) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.snapshot_path();
        let guard = self.inner.read().await;
        let records: Vec<&Lead> = guard.values().collect();
        let json = serde_json::to_string_pretty(&records)?;
        drop(guard);
        tokio::fs::write(&path, json).await?;
        tracing::debug!(path = %path.display(), "Lead snapshot saved");
        Ok(path)
    }

    /// Load a previously saved snapshot into an empty store. Returns the
    /// number of records loaded; `Ok(0)` when no snapshot file exists.
    pub async fn load(&self) -> Result<usize> {
        let path = self.snapshot_path();
        if !tokio::fs::try_exists(&path).await? {
            return Ok(0);
        }
        let json = tokio::fs::read_to_string(&path).await?;
        let records: Vec<Lead> = serde_json::from_str(&json)?;
        let count = records.len();
        let mut guard = self.inner.write().await;
        for lead in records {
            guard.insert(lead.id.clone(), lead);
        }
        tracing::info!(count, "Loaded lead snapshot");
        Ok(count)
    }

    /// Remove the snapshot file if present.
    pub async fn clear_snapshot(root: &Path) -> Result<()> {
        let path = root.join(SNAPSHOT_FILE);
        if tokio::fs::try_exists(&path).await? {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use prospector_types::{ProspectorError, RawCandidate, Segment, Verdict};

    fn lead(name: &str, domain: &str) -> Lead {
        Lead::new(RawCandidate {
            name: name.into(),
            domain: domain.into(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn upsert_and_get_round_trip() {
        let store = LeadStore::new("unused");
        let l = lead("Acme", "acme.com");
        let id = l.id.clone();
        store.upsert(l).await;
        assert_eq!(store.get(&id).await.unwrap().name, "acme");
        assert!(store.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn insert_new_never_clobbers() {
        let store = LeadStore::new("unused");
        let mut first = lead("Acme", "acme.com");
        first.status = LeadStatus::Succeeded;
        let id = first.id.clone();
        store.upsert(first).await;

        // A re-run re-seeds the same identity; prior progress must survive.
        assert!(!store.insert_new(lead("Acme", "acme.com")).await);
        assert_eq!(store.get(&id).await.unwrap().status, LeadStatus::Succeeded);

        assert!(store.insert_new(lead("Globex", "globex.io")).await);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn filters_by_status_stage_and_tier() {
        let store = LeadStore::new("unused");
        let mut a = lead("A", "a.com");
        a.status = LeadStatus::Failed;
        a.stage = Stage::Generate;
        let mut b = lead("B", "b.com");
        b.segment = Some(Segment {
            score: 80.0,
            tier: Tier::A,
        });
        let mut c = lead("C", "c.com");
        c.stage = Stage::Generate;
        store.upsert(a).await;
        store.upsert(b).await;
        store.upsert(c).await;

        assert_eq!(store.by_status(LeadStatus::Failed).await.len(), 1);
        assert_eq!(store.by_tier(Tier::A).await.len(), 1);
        // Failed lead at Generate is terminal, so only one is "at" the stage.
        assert_eq!(store.at_stage(Stage::Generate).await.len(), 1);
    }

    #[tokio::test]
    async fn counts_reflect_terminal_states_and_flags() {
        let store = LeadStore::new("unused");
        let mut a = lead("A", "a.com");
        a.status = LeadStatus::Succeeded;
        a.verdict = Some(Verdict::Flag("needs attention".into()));
        let mut b = lead("B", "b.com");
        b.status = LeadStatus::Skipped;
        let c = lead("C", "c.com");
        store.upsert(a).await;
        store.upsert(b).await;
        store.upsert(c).await;

        let counts = store.counts().await;
        assert_eq!(counts.total, 3);
        assert_eq!(counts.succeeded, 1);
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.flagged, 1);
    }

    #[tokio::test]
    async fn failed_leads_surface_stage_and_reason() {
        let store = LeadStore::new("unused");
        let mut l = lead("Acme", "acme.com");
        l.stage = Stage::Enrich;
        l.record_error(
            Stage::Enrich,
            &ProspectorError::RequestTimeout {
                service: "enrichment".into(),
                timeout_ms: 1000,
            },
        );
        l.fail();
        store.upsert(l).await;

        let failed = store.failed_leads().await;
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].stage, Stage::Enrich);
        assert_eq!(
            failed[0].kind,
            Some(prospector_types::ErrorKind::TransientServiceError)
        );
        assert!(failed[0].message.contains("timed out"));
    }

    #[tokio::test]
    async fn annotate_appends_note() {
        let store = LeadStore::new("unused");
        let l = lead("Acme", "acme.com");
        let id = l.id.clone();
        store.upsert(l).await;
        assert!(store.annotate(&id, "approved by reviewer").await);
        assert!(!store.annotate("missing", "x").await);
        assert_eq!(
            store.get(&id).await.unwrap().notes,
            vec!["approved by reviewer".to_string()]
        );
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LeadStore::new(dir.path());
        let mut l = lead("Acme", "acme.com");
        l.status = LeadStatus::Succeeded;
        let id = l.id.clone();
        store.upsert(l).await;
        store.upsert(lead("Globex", "globex.io")).await;

        let path = store.save().await.unwrap();
        assert!(path.exists());

        let restored = LeadStore::new(dir.path());
        assert_eq!(restored.load().await.unwrap(), 2);
        assert_eq!(restored.get(&id).await.unwrap().status, LeadStatus::Succeeded);
    }

    #[tokio::test]
    async fn load_from_missing_snapshot_returns_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = LeadStore::new(dir.path().join("nothing_here"));
        assert_eq!(store.load().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn clear_snapshot_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LeadStore::new(dir.path());
        store.upsert(lead("Acme", "acme.com")).await;
        store.save().await.unwrap();
        assert!(store.snapshot_path().exists());

        LeadStore::clear_snapshot(dir.path()).await.unwrap();
        assert!(!store.snapshot_path().exists());
    }

    #[tokio::test]
    async fn cloned_handle_shares_state() {
        let store = LeadStore::new("unused");
        let handle = store.clone();
        handle.upsert(lead("Acme", "acme.com")).await;
        assert_eq!(store.len().await, 1);
    }
}
