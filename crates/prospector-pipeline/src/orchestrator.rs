//! Pipeline orchestrator: drives every lead through the stage ladder with
//! per-stage retry, bounded concurrency, checkpointing, and cooperative
//! cancellation.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use prospector_services::{DynDiscovery, DynEnrichment, DynGeneration};
use prospector_store::{FailedLead, LeadStore, RunCounts};
use prospector_types::{
    Lead, LeadStatus, ProspectorError, RawCandidate, Result, Stage, Verdict,
};

use crate::cleaner::clean;
use crate::config::PipelineConfig;
use crate::enricher::Enricher;
use crate::events::{EventEmitter, PipelineEvent};
use crate::generator::Generator;
use crate::guardrail::Guardrail;
use crate::retry::StagePolicy;

/// Final accounting for one run.
#[derive(Debug)]
pub struct RunReport {
    pub counts: RunCounts,
    pub failed: Vec<FailedLead>,
    pub duration_ms: u64,
    pub cancelled: bool,
}

/// Handle for requesting cancellation from outside the run (signal handler,
/// UI). Cancellation is cooperative: in-flight service calls finish, and no
/// lead is left mid-mutation.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Shared per-run state handed to every lead task.
struct RunContext {
    enricher: Enricher,
    generator: Generator,
    guardrail: Guardrail,
    config: PipelineConfig,
    events: EventEmitter,
    enrich_permits: Semaphore,
    generate_permits: Semaphore,
    cancel: watch::Receiver<bool>,
}

impl RunContext {
    fn cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

pub struct Orchestrator {
    store: LeadStore,
    discovery: Arc<DynDiscovery>,
    ctx: Arc<RunContext>,
    cancel_tx: Arc<watch::Sender<bool>>,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        store: LeadStore,
        discovery: Arc<DynDiscovery>,
        enrichment: Arc<DynEnrichment>,
        generation: Arc<DynGeneration>,
    ) -> Result<Self> {
        config.validate()?;
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let ctx = RunContext {
            enricher: Enricher::new(enrichment),
            generator: Generator::new(generation, config.persona.clone()),
            guardrail: Guardrail::new()?,
            enrich_permits: Semaphore::new(config.enrich_concurrency),
            generate_permits: Semaphore::new(config.generate_concurrency),
            events: EventEmitter::default(),
            config,
            cancel: cancel_rx,
        };
        Ok(Self {
            store,
            discovery,
            ctx: Arc::new(ctx),
            cancel_tx: Arc::new(cancel_tx),
        })
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: self.cancel_tx.clone(),
        }
    }

    pub fn events(&self) -> &EventEmitter {
        &self.ctx.events
    }

    /// Run the pipeline to completion (or cancellation).
    ///
    /// Re-running against the same store is idempotent: finished leads are
    /// left alone, failed leads pick up at their failing stage with a fresh
    /// attempt budget (history intact), and re-discovered candidates never
    /// clobber records carrying progress.
    pub async fn run(&self) -> Result<RunReport> {
        let started = Instant::now();
        let config = &self.ctx.config;
        self.ctx.events.emit(PipelineEvent::RunStarted {
            topic: config.topic.clone(),
            target_count: config.target_count,
        });

        let resumed = self.store.load().await?;
        if resumed > 0 {
            tracing::info!(leads = resumed, "Resuming from snapshot");
        }

        self.seed().await?;
        self.store.save().await?;

        // One task per workable lead. Each task owns a clone and writes the
        // result back through the store when it finishes a lead. Failed
        // leads re-enter at their failing stage: the attempt counter for
        // that stage resets, the error history stays.
        let mut workable = self.store.by_status(LeadStatus::Pending).await;
        workable.extend(self.store.by_status(LeadStatus::InProgress).await);
        workable.extend(
            self.store
                .by_status(LeadStatus::Failed)
                .await
                .into_iter()
                .map(|mut lead| {
                    tracing::info!(lead = %lead.id, stage = %lead.stage, "Retrying failed lead");
                    lead.reset();
                    lead
                }),
        );

        let mut tasks: JoinSet<Lead> = JoinSet::new();
        for lead in workable {
            let ctx = self.ctx.clone();
            tasks.spawn(async move { process_lead(ctx, lead).await });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(lead) => {
                    self.store.upsert(lead).await;
                    // Checkpoint after every completed lead so an interrupt
                    // loses at most in-flight work.
                    self.store.save().await?;
                }
                Err(err) => {
                    tracing::error!(%err, "Lead task panicked");
                }
            }
        }

        self.store.save().await?;
        let cancelled = *self.cancel_tx.borrow();
        let counts = self.store.counts().await;
        let report = RunReport {
            failed: self.store.failed_leads().await,
            duration_ms: started.elapsed().as_millis() as u64,
            cancelled,
            counts,
        };
        if cancelled {
            self.ctx.events.emit(PipelineEvent::RunCancelled);
        } else {
            self.ctx.events.emit(PipelineEvent::RunCompleted {
                succeeded: report.counts.succeeded,
                failed: report.counts.failed,
                skipped: report.counts.skipped,
                duration_ms: report.duration_ms,
            });
        }
        Ok(report)
    }

    /// Discover candidates and fold them into the store. Existing records
    /// win over re-discovered shells.
    async fn seed(&self) -> Result<()> {
        if self.ctx.cancelled() {
            return Ok(());
        }
        let records = match self.discover_with_retry().await {
            Ok(records) => records,
            Err(err) if !self.store.is_empty().await => {
                // A resumed run can still make progress on stored leads.
                tracing::warn!(%err, "Discovery failed; continuing with stored leads");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        for lead in clean(records) {
            let skipped = lead.status == LeadStatus::Skipped;
            let id = lead.id.clone();
            let reason = lead.skip_reason.clone();
            if self.store.insert_new(lead).await && skipped {
                self.ctx.events.emit(PipelineEvent::LeadSkipped {
                    lead: id,
                    reason: reason.unwrap_or_default(),
                });
            }
        }
        Ok(())
    }

    async fn discover_with_retry(&self) -> Result<Vec<RawCandidate>> {
        let config = &self.ctx.config;
        let policy = config.retry.for_stage(Stage::Source);
        let mut attempt = 0u32;
        loop {
            match self
                .discovery
                .discover(&config.topic, config.target_count)
                .await
            {
                Ok(records) => return Ok(records),
                Err(err) => {
                    attempt += 1;
                    if !err.is_retryable() || attempt >= policy.max_attempts {
                        return Err(err);
                    }
                    let delay = retry_delay(policy, attempt, &err);
                    tracing::warn!(%err, attempt, ?delay, "Discovery failed; retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Rate-limited services tell us when to come back; honor that over the
/// configured backoff when it is longer.
fn retry_delay(
    policy: &StagePolicy,
    attempt: u32,
    err: &ProspectorError,
) -> std::time::Duration {
    let backoff = policy.backoff.delay_for_attempt(attempt.saturating_sub(1));
    match err {
        ProspectorError::RateLimited { retry_after_ms, .. } => {
            backoff.max(std::time::Duration::from_millis(*retry_after_ms))
        }
        _ => backoff,
    }
}

// ---------------------------------------------------------------------------
// Per-lead stage machine
// ---------------------------------------------------------------------------

/// Drive one lead through its remaining stages. Returns the lead in its
/// final (or pre-cancellation) state; the caller persists it.
async fn process_lead(ctx: Arc<RunContext>, mut lead: Lead) -> Lead {
    while !lead.status.is_terminal() {
        if ctx.cancelled() {
            // Leave the lead exactly as the last completed stage left it.
            return lead;
        }
        ctx.events.emit(PipelineEvent::StageStarted {
            lead: lead.id.clone(),
            stage: lead.stage,
        });
        lead.status = LeadStatus::InProgress;

        let stage = lead.stage;
        let done = match stage {
            // Sourcing and cleaning happen before leads exist; a snapshot
            // from an older layout just moves along.
            Stage::Source | Stage::Clean => {
                lead.advance();
                true
            }
            Stage::Enrich => enrich_stage(&ctx, &mut lead).await,
            Stage::Segment => segment_stage(&ctx, &mut lead),
            Stage::Generate => generate_stage(&ctx, &mut lead).await,
            Stage::Guard => guard_stage(&ctx, &mut lead).await,
            Stage::Finalize => {
                lead.advance();
                true
            }
        };

        if done {
            ctx.events.emit(PipelineEvent::StageCompleted {
                lead: lead.id.clone(),
                stage,
            });
        } else if lead.status == LeadStatus::Failed {
            let kind = lead.history.last().map(|r| r.kind);
            if let Some(kind) = kind {
                ctx.events.emit(PipelineEvent::LeadFailed {
                    lead: lead.id.clone(),
                    stage,
                    kind,
                });
            }
            return lead;
        } else {
            // Cancelled mid-stage without mutation.
            return lead;
        }
    }
    lead
}

async fn enrich_stage(ctx: &RunContext, lead: &mut Lead) -> bool {
    let policy = ctx.config.retry.for_stage(Stage::Enrich);
    loop {
        if ctx.cancelled() {
            return false;
        }
        // Permit covers only the service call; a lead waiting out a backoff
        // delay must not occupy a concurrency slot.
        let result = {
            let Ok(_permit) = ctx.enrich_permits.acquire().await else {
                return false;
            };
            ctx.enricher.enrich(lead).await
        };
        match result {
            Ok(outcome) => {
                tracing::debug!(
                    lead = %lead.id,
                    fields = outcome.fields_written,
                    partial_errors = outcome.partial_errors.len(),
                    "Enrichment complete"
                );
                lead.advance();
                return true;
            }
            Err(err) => {
                let attempt = lead.record_error(Stage::Enrich, &err);
                if err.is_retryable() && attempt < policy.max_attempts {
                    ctx.events.emit(PipelineEvent::StageRetrying {
                        lead: lead.id.clone(),
                        stage: Stage::Enrich,
                        attempt,
                    });
                    tokio::time::sleep(retry_delay(policy, attempt, &err)).await;
                    continue;
                }
                lead.fail();
                return false;
            }
        }
    }
}

fn segment_stage(ctx: &RunContext, lead: &mut Lead) -> bool {
    let segment = ctx.config.rubric.score(lead);
    tracing::debug!(lead = %lead.id, score = segment.score, tier = %segment.tier, "Segmented");
    lead.segment = Some(segment);
    lead.advance();
    true
}

async fn generate_stage(ctx: &RunContext, lead: &mut Lead) -> bool {
    match generate_with_retry(ctx, lead, None, 1).await {
        Some(draft) => {
            lead.draft = Some(draft);
            lead.advance();
            true
        }
        None => false,
    }
}

/// Retry wrapper shared by the first generation round and the post-reject
/// regeneration round.
async fn generate_with_retry(
    ctx: &RunContext,
    lead: &mut Lead,
    feedback: Option<String>,
    round: u32,
) -> Option<prospector_types::Draft> {
    let policy = ctx.config.retry.for_stage(Stage::Generate);
    loop {
        if ctx.cancelled() {
            return None;
        }
        // Same permit scoping as enrichment: hold it for the call, not the
        // backoff.
        let result = {
            let Ok(_permit) = ctx.generate_permits.acquire().await else {
                return None;
            };
            ctx.generator.generate(lead, feedback.clone(), round).await
        };
        match result {
            Ok(draft) => return Some(draft),
            Err(err) => {
                let attempt = lead.record_error(Stage::Generate, &err);
                if err.is_retryable() && attempt < policy.max_attempts {
                    ctx.events.emit(PipelineEvent::StageRetrying {
                        lead: lead.id.clone(),
                        stage: Stage::Generate,
                        attempt,
                    });
                    tokio::time::sleep(retry_delay(policy, attempt, &err)).await;
                    continue;
                }
                lead.fail();
                return None;
            }
        }
    }
}

/// Review the draft. A rejection earns exactly one regeneration round with
/// the rejection reason as feedback; a second rejection fails the lead.
async fn guard_stage(ctx: &RunContext, lead: &mut Lead) -> bool {
    loop {
        let Some(draft) = lead.draft.clone() else {
            let err = ProspectorError::Other("no draft to review".into());
            lead.record_error(Stage::Guard, &err);
            lead.fail();
            return false;
        };
        match ctx.guardrail.review(&draft, lead) {
            Verdict::Pass => {
                lead.verdict = Some(Verdict::Pass);
                lead.advance();
                return true;
            }
            Verdict::Flag(reason) => {
                ctx.events.emit(PipelineEvent::DraftFlagged {
                    lead: lead.id.clone(),
                    reason: reason.clone(),
                });
                lead.notes.push(format!("needs attention: {reason}"));
                lead.verdict = Some(Verdict::Flag(reason));
                lead.advance();
                return true;
            }
            Verdict::Reject(reason) => {
                tracing::warn!(lead = %lead.id, %reason, round = draft.attempt, "Draft rejected");
                if draft.attempt >= 2 {
                    lead.verdict = Some(Verdict::Reject(reason.clone()));
                    lead.record_error(
                        Stage::Guard,
                        &ProspectorError::GuardrailReject { reason },
                    );
                    lead.fail();
                    return false;
                }
                match generate_with_retry(ctx, lead, Some(reason), 2).await {
                    Some(draft) => {
                        lead.draft = Some(draft);
                        // Loop back and review the regenerated draft.
                    }
                    None => return false,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use prospector_services::{
        DiscoveryService, DraftReply, DraftRequest, EnrichmentService, FieldReading,
        GenerationService, LookupKind, Persona,
    };
    use prospector_types::{FieldKind, FieldValue};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn persona() -> Persona {
        Persona {
            sender_name: "Jordan".into(),
            org_name: "Prospector".into(),
            value_prop: "pipeline automation".into(),
        }
    }

    struct StaticDiscovery {
        names: Vec<(&'static str, &'static str)>,
    }

    #[async_trait]
    impl DiscoveryService for StaticDiscovery {
        async fn discover(&self, _topic: &str, count: usize) -> Result<Vec<RawCandidate>> {
            Ok(self
                .names
                .iter()
                .take(count)
                .map(|(name, domain)| RawCandidate {
                    name: (*name).into(),
                    domain: (*domain).into(),
                    ..Default::default()
                })
                .collect())
        }
        fn name(&self) -> &str {
            "static"
        }
    }

    struct GoodEnrichment;

    #[async_trait]
    impl EnrichmentService for GoodEnrichment {
        async fn lookup(
            &self,
            kind: LookupKind,
            _name: &str,
            _domain: &str,
        ) -> Result<Vec<FieldReading>> {
            Ok(match kind {
                LookupKind::Company => vec![
                    FieldReading {
                        field: FieldKind::Industry,
                        value: FieldValue::Text("signage".into()),
                        confidence: 0.9,
                    },
                    FieldReading {
                        field: FieldKind::EmployeeCount,
                        value: FieldValue::Integer(850),
                        confidence: 0.8,
                    },
                ],
                LookupKind::Contact => vec![FieldReading {
                    field: FieldKind::ContactName,
                    value: FieldValue::Text("Sam Doe".into()),
                    confidence: 0.7,
                }],
            })
        }
        fn name(&self) -> &str {
            "good"
        }
    }

    struct FailingEnrichment {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EnrichmentService for FailingEnrichment {
        async fn lookup(
            &self,
            _kind: LookupKind,
            _name: &str,
            _domain: &str,
        ) -> Result<Vec<FieldReading>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ProspectorError::RequestTimeout {
                service: "enrichment".into(),
                timeout_ms: 1000,
            })
        }
        fn name(&self) -> &str {
            "failing"
        }
    }

    struct CleanGenerator;

    #[async_trait]
    impl GenerationService for CleanGenerator {
        async fn draft(&self, request: &DraftRequest) -> Result<DraftReply> {
            Ok(DraftReply {
                subject: format!("Quick question for {}", request.company_name),
                body: "Hi there,\n\nI came across your team and was impressed by the \
                       work you are doing in your space. Would you be open to a quick \
                       chat next week?\n\n{{signature}}"
                    .into(),
                model: "mock".into(),
            })
        }
        fn name(&self) -> &str {
            "clean"
        }
    }

    /// Claims a founding year no enrichment backs, until feedback arrives.
    struct HallucinatingGenerator {
        calls: AtomicUsize,
        honest_after_feedback: bool,
    }

    #[async_trait]
    impl GenerationService for HallucinatingGenerator {
        async fn draft(&self, request: &DraftRequest) -> Result<DraftReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let body = if request.feedback.is_some() && self.honest_after_feedback {
                "Hi there,\n\nI came across your team and was impressed by the work \
                 you are doing. Would you be open to a quick chat next week?\n\n{{signature}}"
            } else {
                "Hi there,\n\nYour company, founded in 1987, has a remarkable history \
                 and a strong reputation. Would you be open to a quick chat next \
                 week?\n\n{{signature}}"
            };
            Ok(DraftReply {
                subject: "Quick question".into(),
                body: body.into(),
                model: "mock".into(),
            })
        }
        fn name(&self) -> &str {
            "hallucinating"
        }
    }

    fn orchestrator(
        store: &LeadStore,
        discovery: impl DiscoveryService + 'static,
        enrichment: impl EnrichmentService + 'static,
        generation: impl GenerationService + 'static,
    ) -> Orchestrator {
        let mut config = PipelineConfig::new("trade show exhibitors", 10, persona());
        config.retry = crate::retry::RetryConfig::immediate();
        Orchestrator::new(
            config,
            store.clone(),
            Arc::new(DynDiscovery::new(discovery)),
            Arc::new(DynEnrichment::new(enrichment)),
            Arc::new(DynGeneration::new(generation)),
        )
        .unwrap()
    }

    // 1. A clean end-to-end run succeeds every lead
    #[tokio::test]
    async fn happy_path_run_succeeds_all_leads() {
        let dir = tempfile::tempdir().unwrap();
        let store = LeadStore::new(dir.path());
        let orchestrator = orchestrator(
            &store,
            StaticDiscovery {
                names: vec![("Acme Corp", "acme.com"), ("Globex", "globex.io")],
            },
            GoodEnrichment,
            CleanGenerator,
        );
        let report = orchestrator.run().await.unwrap();
        assert_eq!(report.counts.total, 2);
        assert_eq!(report.counts.succeeded, 2);
        assert_eq!(report.counts.failed, 0);
        assert!(!report.cancelled);

        for lead in store.by_status(LeadStatus::Succeeded).await {
            assert_eq!(lead.stage, Stage::Finalize);
            assert!(lead.draft.is_some());
            assert!(lead.review_ready());
            assert!(lead.segment.is_some());
        }
    }

    // 2. Persistent enrichment timeouts fail the lead after max attempts
    #[tokio::test]
    async fn exhausted_enrichment_retries_fail_the_lead() {
        let dir = tempfile::tempdir().unwrap();
        let store = LeadStore::new(dir.path());
        let orchestrator = orchestrator(
            &store,
            StaticDiscovery {
                names: vec![("Acme Corp", "acme.com")],
            },
            FailingEnrichment {
                calls: AtomicUsize::new(0),
            },
            CleanGenerator,
        );
        let report = orchestrator.run().await.unwrap();
        assert_eq!(report.counts.failed, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].stage, Stage::Enrich);

        let lead = store.get(&report.failed[0].id).await.unwrap();
        assert_eq!(lead.attempts.get(&Stage::Enrich), Some(&3));
        assert_eq!(lead.history.len(), 3);
    }

    // 3. One rejection earns one regeneration; the honest retry passes
    #[tokio::test]
    async fn rejected_draft_gets_one_regeneration() {
        let dir = tempfile::tempdir().unwrap();
        let store = LeadStore::new(dir.path());
        let orchestrator = orchestrator(
            &store,
            StaticDiscovery {
                names: vec![("Acme Corp", "acme.com")],
            },
            GoodEnrichment,
            HallucinatingGenerator {
                calls: AtomicUsize::new(0),
                honest_after_feedback: true,
            },
        );
        let report = orchestrator.run().await.unwrap();
        assert_eq!(report.counts.succeeded, 1);
        let lead = &store.by_status(LeadStatus::Succeeded).await[0];
        assert_eq!(lead.draft.as_ref().map(|d| d.attempt), Some(2));
        assert_eq!(lead.verdict, Some(Verdict::Pass));
    }

    // 4. A second rejection fails the lead at the guard stage
    #[tokio::test]
    async fn second_rejection_fails_at_guard() {
        let dir = tempfile::tempdir().unwrap();
        let store = LeadStore::new(dir.path());
        let orchestrator = orchestrator(
            &store,
            StaticDiscovery {
                names: vec![("Acme Corp", "acme.com")],
            },
            GoodEnrichment,
            HallucinatingGenerator {
                calls: AtomicUsize::new(0),
                honest_after_feedback: false,
            },
        );
        let report = orchestrator.run().await.unwrap();
        assert_eq!(report.counts.failed, 1);
        assert_eq!(report.failed[0].stage, Stage::Guard);
        let lead = store.get(&report.failed[0].id).await.unwrap();
        assert!(matches!(lead.verdict, Some(Verdict::Reject(_))));
    }

    // 5. Re-running against the same store does not duplicate or regress
    #[tokio::test]
    async fn rerun_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();

        let run = || async {
            let store = LeadStore::new(dir.path());
            let orchestrator = orchestrator(
                &store,
                StaticDiscovery {
                    names: vec![("Acme Corp", "acme.com"), ("Globex", "globex.io")],
                },
                GoodEnrichment,
                CleanGenerator,
            );
            let report = orchestrator.run().await.unwrap();
            (report, store)
        };

        let (first, first_store) = run().await;
        let mut first_ids = first_store.ids().await;
        first_ids.sort();

        let (second, second_store) = run().await;
        let mut second_ids = second_store.ids().await;
        second_ids.sort();

        assert_eq!(first.counts.total, 2);
        assert_eq!(second.counts.total, 2);
        assert_eq!(first_ids, second_ids);
        assert_eq!(second.counts.succeeded, 2);
    }

    // 6. Cancelling before the run starts leaves nothing half-done
    #[tokio::test]
    async fn cancel_before_run_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let store = LeadStore::new(dir.path());
        let orchestrator = orchestrator(
            &store,
            StaticDiscovery {
                names: vec![("Acme Corp", "acme.com")],
            },
            GoodEnrichment,
            CleanGenerator,
        );
        orchestrator.cancel_handle().cancel();
        let report = orchestrator.run().await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.counts.succeeded, 0);
    }

    type CallLog = Arc<std::sync::Mutex<Vec<(String, u32)>>>;

    /// Fails every company's first draft call, succeeds after; records the
    /// order of (company, attempt) calls in a shared log.
    struct FlakyGenerator {
        seen: std::sync::Mutex<std::collections::HashMap<String, u32>>,
        log: CallLog,
    }

    impl FlakyGenerator {
        fn new(log: CallLog) -> Self {
            Self {
                seen: std::sync::Mutex::new(std::collections::HashMap::new()),
                log,
            }
        }
    }

    #[async_trait]
    impl GenerationService for FlakyGenerator {
        async fn draft(&self, request: &DraftRequest) -> Result<DraftReply> {
            let attempt = {
                let mut seen = self.seen.lock().unwrap();
                let entry = seen.entry(request.company_name.clone()).or_insert(0);
                *entry += 1;
                *entry
            };
            self.log
                .lock()
                .unwrap()
                .push((request.company_name.clone(), attempt));
            if attempt == 1 {
                return Err(ProspectorError::TransientService {
                    service: "generation".into(),
                    message: "warming up".into(),
                });
            }
            CleanGenerator.draft(request).await
        }
        fn name(&self) -> &str {
            "flaky"
        }
    }

    // 7. A lead sleeping out a backoff does not hold its concurrency slot
    #[tokio::test]
    async fn backoff_releases_the_stage_permit() {
        let dir = tempfile::tempdir().unwrap();
        let store = LeadStore::new(dir.path());
        let log: CallLog = Arc::new(std::sync::Mutex::new(Vec::new()));
        let generation = Arc::new(DynGeneration::new(FlakyGenerator::new(log.clone())));

        let mut config = PipelineConfig::new("trade show exhibitors", 10, persona());
        config.retry = crate::retry::RetryConfig::immediate();
        config.retry.generate.backoff =
            crate::retry::BackoffPolicy::Fixed(std::time::Duration::from_millis(150));
        config.generate_concurrency = 1;

        let orchestrator = Orchestrator::new(
            config,
            store.clone(),
            Arc::new(DynDiscovery::new(StaticDiscovery {
                names: vec![("Acme Corp", "acme.com"), ("Globex", "globex.io")],
            })),
            Arc::new(DynEnrichment::new(GoodEnrichment)),
            generation,
        )
        .unwrap();
        let report = orchestrator.run().await.unwrap();
        assert_eq!(report.counts.succeeded, 2);

        // With the permit scoped to the call, the second lead's first
        // attempt runs while the first lead sleeps out its backoff. Were
        // the permit held across the sleep, the first lead's retry would
        // come second.
        let log = log.lock().unwrap().clone();
        assert_eq!(log.len(), 4);
        assert_eq!(log[0].1, 1);
        assert_eq!(log[1].1, 1, "backoff held the generate permit: {log:?}");
        assert_ne!(log[0].0, log[1].0);
    }

    // 8. Invalid config is refused before any work happens
    #[tokio::test]
    async fn invalid_config_is_fatal() {
        let store = LeadStore::new("unused");
        let config = PipelineConfig::new("", 10, persona());
        let result = Orchestrator::new(
            config,
            store,
            Arc::new(DynDiscovery::new(StaticDiscovery { names: vec![] })),
            Arc::new(DynEnrichment::new(GoodEnrichment)),
            Arc::new(DynGeneration::new(CleanGenerator)),
        );
        assert!(matches!(
            result.err().map(|e| e.kind()),
            Some(prospector_types::ErrorKind::ConfigurationInvalid)
        ));
    }
}
