//! The reconciliation engine: the four synchronization operations.
//!
//! | Operation | Scans | Moves |
//! |-----------|-------|-------|
//! | [`ReconciliationEngine::detect_tracker_changes`] | `Mirrored` | → `TrackerChanged`, or self-heal |
//! | [`ReconciliationEngine::push_to_tracker`] | `CaseChanged` | → `Mirrored` |
//! | [`ReconciliationEngine::pull_from_tracker`] | `TrackerChanged` | → `Mirrored` |
//! | [`ReconciliationEngine::finalize_closed`] | every mapping with a tracker key | → deleted |
//!
//! Mappings are processed one at a time. A failure is logged with the
//! mapping's identity and only ends that mapping's turn; the next scheduled
//! pass retries it. Nothing is rolled back: a mapping whose sync failed part
//! way keeps whatever the remote systems already accepted.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, info_span, warn, Instrument, Span};

use crate::content::{
    attachment_file_name, creation_notice, format_mail, imported_comment, is_closed_status,
    issue_title, strip_html,
};
use crate::ports::{CaseSystemGateway, IssueTrackerGateway, MappingStore, NotificationGateway};
use crate::records::{CasePatch, InboundMail, IssuePatch, NamedFile, NewIssue, TrackerIssue};
use crate::{
    CaseKey, GatewayError, IncidentMapping, MappingStatus, SyncError, SyncSettings, TenantId,
    Timestamp, TrackerKey,
};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// What happened to one mapping during a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Unchanged,
    Transitioned,
    SelfHealed,
    Removed,
}

/// Tally of one phase over all the mappings it examined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseReport {
    /// Mappings the phase looked at.
    pub examined: usize,
    /// Mappings left as they were.
    pub unchanged: usize,
    /// Mappings moved to the phase's target status.
    pub transitioned: usize,
    /// Mappings reset because their tracker issue was missing.
    pub self_healed: usize,
    /// Mappings deleted (finalize only).
    pub removed: usize,
    /// Mappings whose sync failed; retried next pass.
    pub failed: usize,
}

impl PhaseReport {
    fn record(&mut self, outcome: Result<Outcome, SyncError>) {
        self.examined += 1;
        match outcome {
            Ok(Outcome::Unchanged) => self.unchanged += 1,
            Ok(Outcome::Transitioned) => self.transitioned += 1,
            Ok(Outcome::SelfHealed) => self.self_healed += 1,
            Ok(Outcome::Removed) => self.removed += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Result of the tracker-side refresh shared by push and pull.
enum Resync {
    Refreshed(TrackerKey),
    SelfHealed,
}

/// Everything copied from a case into its tracker issue.
struct CaseContent {
    title: String,
    problem_text: Option<String>,
    internal_notes: Option<String>,
    mails: Vec<InboundMail>,
    attachments: Vec<NamedFile>,
}

fn mapping_span(phase: &'static str, mapping: &IncidentMapping) -> Span {
    info_span!(
        "mapping",
        phase,
        mapping_id = %mapping.id,
        tenant_id = %mapping.tenant_id,
        case_key = %mapping.case_key,
        tracker_key = mapping.tracker_key.as_ref().map(|k| k.as_str()).unwrap_or("-"),
    )
}

fn case_not_found(case_key: &CaseKey) -> SyncError {
    SyncError::Gateway(GatewayError::NotFound {
        system: "case-system",
        resource: format!("case {case_key}"),
    })
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Runs the synchronization operations against the injected ports.
pub struct ReconciliationEngine {
    case_system: Arc<dyn CaseSystemGateway>,
    tracker: Arc<dyn IssueTrackerGateway>,
    notifier: Arc<dyn NotificationGateway>,
    store: Arc<dyn MappingStore>,
    settings: SyncSettings,
}

impl ReconciliationEngine {
    /// Wires the engine to its collaborators.
    pub fn new(
        case_system: Arc<dyn CaseSystemGateway>,
        tracker: Arc<dyn IssueTrackerGateway>,
        notifier: Arc<dyn NotificationGateway>,
        store: Arc<dyn MappingStore>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            case_system,
            tracker,
            notifier,
            store,
            settings,
        }
    }

    /// The settings the engine runs with.
    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Runs `step` for each mapping in turn, isolating failures.
    async fn for_each_mapping<'a, F, Fut>(
        &'a self,
        phase: &'static str,
        scan: Result<Vec<IncidentMapping>, crate::StoreError>,
        step: F,
    ) -> PhaseReport
    where
        F: Fn(IncidentMapping) -> Fut,
        Fut: Future<Output = Result<Outcome, SyncError>> + 'a,
    {
        let mut report = PhaseReport::default();
        let mappings = match scan {
            Ok(mappings) => mappings,
            Err(err) => {
                warn!(phase, error = %err, "could not load mappings; phase skipped");
                return report;
            }
        };

        for mapping in mappings {
            let span = mapping_span(phase, &mapping);
            let outcome = step(mapping).instrument(span.clone()).await;
            if let Err(err) = &outcome {
                span.in_scope(|| {
                    warn!(
                        error = %err,
                        retry_policy = ?err.retry_policy(),
                        "mapping sync failed; retrying on next pass"
                    )
                });
            }
            report.record(outcome);
        }

        info!(
            phase,
            examined = report.examined,
            transitioned = report.transitioned,
            self_healed = report.self_healed,
            removed = report.removed,
            failed = report.failed,
            "phase complete"
        );
        report
    }

    // -----------------------------------------------------------------------
    // Detect
    // -----------------------------------------------------------------------

    /// Flags `Mirrored` mappings whose tracker issue was edited since the last
    /// push, and self-heals those whose issue has disappeared.
    pub async fn detect_tracker_changes(&self) -> PhaseReport {
        let scan = self.store.find_by_status(MappingStatus::Mirrored).await;
        self.for_each_mapping("detect", scan, move |mapping| self.detect_one(mapping))
            .instrument(info_span!("detect"))
            .await
    }

    async fn detect_one(&self, mut mapping: IncidentMapping) -> Result<Outcome, SyncError> {
        let issue = match &mapping.tracker_key {
            Some(key) => self.tracker.get_issue(key).await?,
            None => None,
        };

        let Some(issue) = issue else {
            warn!("tracker issue missing; mapping reset for recreation");
            mapping.self_heal();
            self.store.upsert(mapping).await?;
            return Ok(Outcome::SelfHealed);
        };

        if mapping.tracker_edited_since_sync(issue.updated, self.settings.clock_skew_seconds) {
            debug!(updated = ?issue.updated, "tracker edited since last sync");
            mapping.mark_tracker_changed();
            self.store.upsert(mapping).await?;
            return Ok(Outcome::Transitioned);
        }
        Ok(Outcome::Unchanged)
    }

    // -----------------------------------------------------------------------
    // Push
    // -----------------------------------------------------------------------

    /// Creates or refreshes the tracker issue of every `CaseChanged` mapping.
    pub async fn push_to_tracker(&self) -> PhaseReport {
        let scan = self.store.find_by_status(MappingStatus::CaseChanged).await;
        self.for_each_mapping("push", scan, move |mapping| self.push_one(mapping))
            .instrument(info_span!("push"))
            .await
    }

    async fn push_one(&self, mut mapping: IncidentMapping) -> Result<Outcome, SyncError> {
        if mapping.tracker_key.is_none() {
            return self.create_tracker_issue(mapping).await;
        }

        let resuming = mapping.creation_pending();
        match self.resync_tracker(&mut mapping).await? {
            Resync::Refreshed(key) => {
                if resuming {
                    info!(tracker_key = %key, "completing interrupted creation");
                    self.apply_initial_transition(&key).await?;
                    self.send_creation_notice(&mapping.tenant_id, &key).await?;
                }
                mapping.mark_mirrored_to_tracker(key, Timestamp::now());
                self.store.upsert(mapping).await?;
                Ok(Outcome::Transitioned)
            }
            Resync::SelfHealed => {
                self.store.upsert(mapping).await?;
                Ok(Outcome::SelfHealed)
            }
        }
    }

    /// Create path. The new key is persisted straight after creation so a
    /// failure in a later step resumes through the update path instead of
    /// creating a second issue; `push_one` then owes the initial transition
    /// and the creation notice.
    async fn create_tracker_issue(
        &self,
        mut mapping: IncidentMapping,
    ) -> Result<Outcome, SyncError> {
        let content = self.load_case_content(&mapping.case_key).await?;

        let key = self
            .tracker
            .create_issue(NewIssue {
                issue_type: self.settings.issue_type.clone(),
                labels: self.settings.labels.clone(),
                summary: content.title.clone(),
                description: content.problem_text.clone(),
            })
            .await?;
        info!(tracker_key = %key, "tracker issue created");

        mapping.checkpoint_tracker_key(key.clone());
        let mut mapping = self.store.upsert(mapping).await?;

        self.apply_initial_transition(&key).await?;
        self.copy_case_content(&key, &content).await?;
        self.send_creation_notice(&mapping.tenant_id, &key).await?;

        mapping.mark_mirrored_to_tracker(key, Timestamp::now());
        self.store.upsert(mapping).await?;
        Ok(Outcome::Transitioned)
    }

    async fn send_creation_notice(
        &self,
        tenant: &TenantId,
        key: &TrackerKey,
    ) -> Result<(), SyncError> {
        let notice = creation_notice(self.tracker.browse_url(), key.as_str());
        self.notifier.notify(tenant, &notice).await?;
        Ok(())
    }

    async fn apply_initial_transition(&self, key: &TrackerKey) -> Result<(), SyncError> {
        let wanted = &self.settings.initial_transition;
        let transitions = self.tracker.get_transitions(key).await?;
        match transitions
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(wanted))
        {
            Some(transition) => {
                self.tracker.perform_transition(key, transition).await?;
                debug!(transition = %transition.name, "initial transition applied");
            }
            None => warn!(
                transition = %wanted,
                available = ?transitions.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
                "initial transition not available on new issue"
            ),
        }
        Ok(())
    }

    /// Update path: refresh title and description, then replace every comment
    /// and attachment with the set derived from the case.
    ///
    /// Mutates `mapping` (self-heal) without persisting it; the caller decides
    /// the final state and writes once.
    async fn resync_tracker(&self, mapping: &mut IncidentMapping) -> Result<Resync, SyncError> {
        let issue = match &mapping.tracker_key {
            Some(key) => self.tracker.get_issue(key).await?,
            None => None,
        };
        let Some(issue) = issue else {
            warn!("tracker issue missing; mapping reset for recreation");
            mapping.self_heal();
            return Ok(Resync::SelfHealed);
        };

        let content = self.load_case_content(&mapping.case_key).await?;
        self.tracker
            .update_issue(IssuePatch {
                key: issue.key.clone(),
                summary: content.title.clone(),
                description: content.problem_text.clone(),
            })
            .await?;

        self.clear_tracker_content(&issue).await?;
        self.copy_case_content(&issue.key, &content).await?;
        Ok(Resync::Refreshed(issue.key))
    }

    async fn clear_tracker_content(&self, issue: &TrackerIssue) -> Result<(), SyncError> {
        for comment in &issue.comments {
            self.tracker.delete_comment(&issue.key, &comment.id).await?;
        }
        for attachment in &issue.attachments {
            self.tracker.delete_attachment(&attachment.id).await?;
        }
        debug!(
            comments = issue.comments.len(),
            attachments = issue.attachments.len(),
            "tracker content cleared"
        );
        Ok(())
    }

    async fn load_case_content(&self, case_key: &CaseKey) -> Result<CaseContent, SyncError> {
        let case = self
            .case_system
            .get_case(case_key)
            .await?
            .ok_or_else(|| case_not_found(case_key))?;

        let problem_text = self
            .case_system
            .get_problem_text(case_key)
            .await?
            .map(|text| strip_html(&text));
        let internal_notes = self
            .case_system
            .get_internal_notes(case_key)
            .await?
            .map(|text| strip_html(&text))
            .filter(|text| !text.is_empty());
        let mails = self.case_system.get_inbound_mail(case_key).await?;

        let mut attachments = Vec::new();
        for attachment in self.case_system.get_attachments(case_key).await? {
            let content = self
                .case_system
                .get_attachment_content(case_key, &attachment.id)
                .await?;
            attachments.push(NamedFile {
                file_name: attachment_file_name(
                    &attachment.file_name,
                    content.content_type.as_deref(),
                ),
                content: content.bytes,
            });
        }

        Ok(CaseContent {
            title: issue_title(case_key, case.summary.as_deref()),
            problem_text,
            internal_notes,
            mails,
            attachments,
        })
    }

    /// Mail first, then case attachments, then the internal-notes comment.
    async fn copy_case_content(
        &self,
        key: &TrackerKey,
        content: &CaseContent,
    ) -> Result<(), SyncError> {
        for mail in &content.mails {
            self.tracker.add_comment(key, &format_mail(mail)).await?;
            for file in &mail.attachments {
                self.tracker.add_attachment(key, file).await?;
            }
        }
        for file in &content.attachments {
            self.tracker.add_attachment(key, file).await?;
        }
        if let Some(notes) = &content.internal_notes {
            self.tracker.add_comment(key, notes).await?;
        }
        debug!(
            mails = content.mails.len(),
            attachments = content.attachments.len(),
            "case content copied to tracker"
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Pull
    // -----------------------------------------------------------------------

    /// Copies tracker edits of every `TrackerChanged` mapping into the case,
    /// then refreshes the tracker from the updated case.
    pub async fn pull_from_tracker(&self) -> PhaseReport {
        let scan = self.store.find_by_status(MappingStatus::TrackerChanged).await;
        self.for_each_mapping("pull", scan, move |mapping| self.pull_one(mapping))
            .instrument(info_span!("pull"))
            .await
    }

    async fn pull_one(&self, mut mapping: IncidentMapping) -> Result<Outcome, SyncError> {
        let issue = match &mapping.tracker_key {
            Some(key) => self.tracker.get_issue(key).await?,
            None => None,
        };
        let Some(issue) = issue else {
            warn!("tracker issue missing; mapping reset for recreation");
            mapping.self_heal();
            self.store.upsert(mapping).await?;
            return Ok(Outcome::SelfHealed);
        };
        let case_key = mapping.case_key.clone();
        let case_attachments = self.case_system.get_attachments(&case_key).await?;

        self.import_comments(&mapping, &issue).await?;

        if let Some(description) = &issue.description {
            let current = self
                .case_system
                .get_problem_text(&case_key)
                .await?
                .map(|text| strip_html(&text));
            if current.as_deref() != Some(description.as_str()) {
                self.case_system
                    .update_case(CasePatch::ReplaceProblemText {
                        case_key: case_key.clone(),
                        text: description.clone(),
                    })
                    .await?;
                debug!("problem text replaced from tracker description");
            }
        }

        let known: HashSet<&str> = case_attachments
            .iter()
            .map(|attachment| attachment.file_name.as_str())
            .collect();
        for attachment in &issue.attachments {
            if known.contains(attachment.file_name.as_str()) {
                continue;
            }
            let content = self
                .tracker
                .get_attachment_content(&attachment.content_uri)
                .await?;
            self.case_system
                .create_attachment(
                    &case_key,
                    &NamedFile {
                        file_name: attachment.file_name.clone(),
                        content,
                    },
                )
                .await?;
            debug!(file_name = %attachment.file_name, "attachment copied to case");
        }

        // Exactly one re-push per pull.
        match self.resync_tracker(&mut mapping).await? {
            Resync::Refreshed(key) => {
                let now = Timestamp::now();
                mapping.mark_mirrored_to_tracker(key, now);
                mapping.mark_mirrored_to_case(now);
                self.store.upsert(mapping).await?;
                Ok(Outcome::Transitioned)
            }
            Resync::SelfHealed => {
                self.store.upsert(mapping).await?;
                Ok(Outcome::SelfHealed)
            }
        }
    }

    /// Appends tracker comments newer than the case watermark as internal
    /// notes. Comments by the engine's own identity are never imported.
    async fn import_comments(
        &self,
        mapping: &IncidentMapping,
        issue: &TrackerIssue,
    ) -> Result<(), SyncError> {
        let skew = self.settings.clock_skew_seconds;
        let identity = &self.settings.tracker_identity;
        let mut imported = 0usize;

        for comment in &issue.comments {
            let Some(author) = &comment.author else {
                continue;
            };
            if author.name.eq_ignore_ascii_case(identity)
                || !mapping.comment_is_new(comment.created, skew)
            {
                continue;
            }
            self.case_system
                .update_case(CasePatch::AppendInternalNote {
                    case_key: mapping.case_key.clone(),
                    text: imported_comment(&author.display_name, &comment.body),
                })
                .await?;
            imported += 1;
        }
        debug!(imported, "tracker comments imported");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Finalize
    // -----------------------------------------------------------------------

    /// Retires every mapping whose tracker issue reached a closed status: the
    /// case goes back to the intake group and the mapping is deleted.
    pub async fn finalize_closed(&self) -> PhaseReport {
        let scan = self.store.find_all_with_tracker_key().await;
        self.for_each_mapping("finalize", scan, move |mapping| self.finalize_one(mapping))
            .instrument(info_span!("finalize"))
            .await
    }

    async fn finalize_one(&self, mapping: IncidentMapping) -> Result<Outcome, SyncError> {
        let Some(key) = &mapping.tracker_key else {
            return Ok(Outcome::Unchanged);
        };
        // A missing issue is left to detect/push to self-heal.
        let Some(issue) = self.tracker.get_issue(key).await? else {
            return Ok(Outcome::Unchanged);
        };
        if !is_closed_status(&issue.status_name, &self.settings.closed_statuses) {
            return Ok(Outcome::Unchanged);
        }

        self.case_system
            .update_case(CasePatch::ReassignResponsibleGroup {
                case_key: mapping.case_key.clone(),
                group: self.settings.intake_group.clone(),
            })
            .await?;
        self.store.delete(mapping.id).await?;
        info!(status = %issue.status_name, "tracker issue closed; mapping retired");
        Ok(Outcome::Removed)
    }
}
