//! In-memory fakes of every port, shared by the engine tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reconciler::{
    AttachmentContent, CaseAttachment, CaseAttachmentId, CaseKey, CasePatch, CaseRecord,
    CaseSystemGateway, CommentAuthor, CommentId, GatewayError, InMemoryMappingStore,
    IncidentMapping, InboundMail, Ingestor, IssuePatch, IssueTrackerGateway, MappingStore,
    NamedFile, NewIssue, NotificationGateway, ReconciliationEngine, SyncSettings,
    SynchronizationOrchestrator, TenantId, Timestamp, TrackerAttachment, TrackerAttachmentId,
    TrackerComment, TrackerIssue, TrackerKey, Transition,
};

pub const TENANT: &str = "2281";
pub const ENGINE_IDENTITY: &str = "svc-sync";
pub const INTAKE_GROUP: &str = "First line";
pub const BROWSE_URL: &str = "https://tracker.example.com";

fn transient(system: &'static str) -> GatewayError {
    GatewayError::Transient {
        system,
        message: "injected failure".into(),
    }
}

// ---------------------------------------------------------------------------
// Case system
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct FakeCase {
    pub summary: Option<String>,
    pub problem_text: Option<String>,
    pub internal_notes: Option<String>,
    pub attachments: Vec<(CaseAttachment, AttachmentContent)>,
    pub mails: Vec<InboundMail>,
}

#[derive(Default)]
struct CaseState {
    cases: HashMap<CaseKey, FakeCase>,
    patches: Vec<CasePatch>,
    failing: HashSet<CaseKey>,
    next_attachment: u32,
}

#[derive(Default)]
pub struct FakeCaseSystem {
    state: Mutex<CaseState>,
}

impl FakeCaseSystem {
    pub fn add_case(&self, key: &str, case: FakeCase) {
        self.state
            .lock()
            .unwrap()
            .cases
            .insert(CaseKey::new(key).unwrap(), case);
    }

    pub fn add_attachment(&self, key: &str, file_name: &str, content_type: &str, bytes: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.next_attachment += 1;
        let id = CaseAttachmentId::new(format!("att-{}", state.next_attachment)).unwrap();
        let case = state.cases.get_mut(&CaseKey::new(key).unwrap()).unwrap();
        case.attachments.push((
            CaseAttachment {
                id,
                file_name: file_name.to_string(),
            },
            AttachmentContent {
                bytes: bytes.to_vec(),
                content_type: Some(content_type.to_string()),
            },
        ));
    }

    pub fn add_mail(&self, key: &str, mail: InboundMail) {
        let mut state = self.state.lock().unwrap();
        let case = state.cases.get_mut(&CaseKey::new(key).unwrap()).unwrap();
        case.mails.push(mail);
    }

    pub fn fail_case(&self, key: &str, failing: bool) {
        let key = CaseKey::new(key).unwrap();
        let mut state = self.state.lock().unwrap();
        if failing {
            state.failing.insert(key);
        } else {
            state.failing.remove(&key);
        }
    }

    pub fn has_case(&self, key: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .cases
            .contains_key(&CaseKey::new(key).unwrap())
    }

    pub fn case(&self, key: &str) -> FakeCase {
        self.state.lock().unwrap().cases[&CaseKey::new(key).unwrap()].clone()
    }

    pub fn patches(&self) -> Vec<CasePatch> {
        self.state.lock().unwrap().patches.clone()
    }

    pub fn attachment_names(&self, key: &str) -> Vec<String> {
        self.case(key)
            .attachments
            .iter()
            .map(|(attachment, _)| attachment.file_name.clone())
            .collect()
    }

    fn with_case<T>(
        &self,
        key: &CaseKey,
        read: impl FnOnce(&mut FakeCase) -> T,
    ) -> Result<Option<T>, GatewayError> {
        let mut state = self.state.lock().unwrap();
        if state.failing.contains(key) {
            return Err(transient("case-system"));
        }
        Ok(state.cases.get_mut(key).map(read))
    }
}

#[async_trait]
impl CaseSystemGateway for FakeCaseSystem {
    async fn get_case(&self, key: &CaseKey) -> Result<Option<CaseRecord>, GatewayError> {
        self.with_case(key, |case| CaseRecord {
            summary: case.summary.clone(),
        })
    }

    async fn get_problem_text(&self, key: &CaseKey) -> Result<Option<String>, GatewayError> {
        Ok(self.with_case(key, |case| case.problem_text.clone())?.flatten())
    }

    async fn get_internal_notes(&self, key: &CaseKey) -> Result<Option<String>, GatewayError> {
        Ok(self
            .with_case(key, |case| case.internal_notes.clone())?
            .flatten())
    }

    async fn get_attachments(&self, key: &CaseKey) -> Result<Vec<CaseAttachment>, GatewayError> {
        Ok(self
            .with_case(key, |case| {
                case.attachments.iter().map(|(a, _)| a.clone()).collect()
            })?
            .unwrap_or_default())
    }

    async fn get_attachment_content(
        &self,
        key: &CaseKey,
        attachment_id: &CaseAttachmentId,
    ) -> Result<AttachmentContent, GatewayError> {
        self.with_case(key, |case| {
            case.attachments
                .iter()
                .find(|(a, _)| &a.id == attachment_id)
                .map(|(_, content)| content.clone())
        })?
        .flatten()
        .ok_or_else(|| GatewayError::NotFound {
            system: "case-system",
            resource: format!("attachment {attachment_id}"),
        })
    }

    async fn get_inbound_mail(&self, key: &CaseKey) -> Result<Vec<InboundMail>, GatewayError> {
        Ok(self
            .with_case(key, |case| case.mails.clone())?
            .unwrap_or_default())
    }

    async fn update_case(&self, patch: CasePatch) -> Result<(), GatewayError> {
        let applied = self.with_case(patch.case_key(), |case| match &patch {
            CasePatch::AppendInternalNote { text, .. } => {
                let notes = case.internal_notes.get_or_insert_with(String::new);
                notes.push_str("<br>");
                notes.push_str(text);
            }
            CasePatch::ReplaceProblemText { text, .. } => case.problem_text = Some(text.clone()),
            CasePatch::ReassignResponsibleGroup { .. } => {}
        })?;
        if applied.is_none() {
            return Err(GatewayError::NotFound {
                system: "case-system",
                resource: format!("case {}", patch.case_key()),
            });
        }
        self.state.lock().unwrap().patches.push(patch);
        Ok(())
    }

    async fn create_attachment(&self, key: &CaseKey, file: &NamedFile) -> Result<(), GatewayError> {
        self.add_attachment(key.as_str(), &file.file_name, "application/octet-stream", &file.content);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TrackerState {
    issues: BTreeMap<String, TrackerIssue>,
    attachment_bytes: HashMap<String, Vec<u8>>,
    transitions_performed: Vec<(String, String)>,
    created: usize,
    next_issue: u32,
    next_id: u32,
    failing_reads: HashSet<String>,
    failing_transitions: bool,
}

pub struct FakeTracker {
    state: Mutex<TrackerState>,
}

impl Default for FakeTracker {
    fn default() -> Self {
        Self {
            state: Mutex::new(TrackerState {
                next_issue: 9,
                ..TrackerState::default()
            }),
        }
    }
}

/// Comment bodies and attachment files of an issue, ignoring identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueContent {
    pub comments: Vec<String>,
    pub attachments: Vec<(String, Vec<u8>)>,
}

impl FakeTracker {
    pub fn issue(&self, key: &str) -> Option<TrackerIssue> {
        self.state.lock().unwrap().issues.get(key).cloned()
    }

    pub fn content(&self, key: &str) -> IssueContent {
        let state = self.state.lock().unwrap();
        let issue = &state.issues[key];
        IssueContent {
            comments: issue.comments.iter().map(|c| c.body.clone()).collect(),
            attachments: issue
                .attachments
                .iter()
                .map(|a| (a.file_name.clone(), state.attachment_bytes[&a.content_uri].clone()))
                .collect(),
        }
    }

    pub fn created_count(&self) -> usize {
        self.state.lock().unwrap().created
    }

    pub fn transitions_performed(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().transitions_performed.clone()
    }

    pub fn delete_issue(&self, key: &str) {
        self.state.lock().unwrap().issues.remove(key);
    }

    pub fn set_updated(&self, key: &str, updated: Timestamp) {
        self.edit(key, |issue| issue.updated = Some(updated));
    }

    pub fn set_status(&self, key: &str, status: &str) {
        self.edit(key, |issue| issue.status_name = status.to_string());
    }

    pub fn set_description(&self, key: &str, description: &str) {
        self.edit(key, |issue| issue.description = Some(description.to_string()));
    }

    pub fn add_foreign_comment(&self, key: &str, author: &str, display_name: &str, body: &str, created: Timestamp) {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = CommentId::new(format!("c-{}", state.next_id)).unwrap();
        let issue = state.issues.get_mut(key).unwrap();
        issue.comments.push(TrackerComment {
            id,
            author: Some(CommentAuthor {
                name: author.to_string(),
                display_name: display_name.to_string(),
            }),
            body: body.to_string(),
            created,
        });
    }

    pub fn add_foreign_attachment(&self, key: &str, file_name: &str, bytes: &[u8]) {
        let mut state = self.state.lock().unwrap();
        Self::attach(&mut state, key, file_name, bytes);
    }

    pub fn fail_reads(&self, key: &str, failing: bool) {
        let mut state = self.state.lock().unwrap();
        if failing {
            state.failing_reads.insert(key.to_string());
        } else {
            state.failing_reads.remove(key);
        }
    }

    pub fn fail_transitions(&self, failing: bool) {
        self.state.lock().unwrap().failing_transitions = failing;
    }

    fn edit(&self, key: &str, apply: impl FnOnce(&mut TrackerIssue)) {
        let mut state = self.state.lock().unwrap();
        apply(state.issues.get_mut(key).unwrap());
    }

    fn attach(state: &mut TrackerState, key: &str, file_name: &str, bytes: &[u8]) {
        state.next_id += 1;
        let id = format!("a-{}", state.next_id);
        let uri = format!("fake://attachments/{id}");
        state.attachment_bytes.insert(uri.clone(), bytes.to_vec());
        let issue = state.issues.get_mut(key).unwrap();
        issue.attachments.push(TrackerAttachment {
            id: TrackerAttachmentId::new(id).unwrap(),
            file_name: file_name.to_string(),
            content_uri: uri,
        });
    }

    /// Runs a write against an existing issue and bumps its modification time.
    fn write<T>(
        &self,
        key: &TrackerKey,
        apply: impl FnOnce(&mut TrackerState) -> T,
    ) -> Result<T, GatewayError> {
        let mut state = self.state.lock().unwrap();
        if !state.issues.contains_key(key.as_str()) {
            return Err(GatewayError::NotFound {
                system: "tracker",
                resource: format!("issue {key}"),
            });
        }
        let result = apply(&mut state);
        if let Some(issue) = state.issues.get_mut(key.as_str()) {
            issue.updated = Some(Timestamp::now());
        }
        Ok(result)
    }
}

#[async_trait]
impl IssueTrackerGateway for FakeTracker {
    async fn get_issue(&self, key: &TrackerKey) -> Result<Option<TrackerIssue>, GatewayError> {
        let state = self.state.lock().unwrap();
        if state.failing_reads.contains(key.as_str()) {
            return Err(transient("tracker"));
        }
        Ok(state.issues.get(key.as_str()).cloned())
    }

    async fn create_issue(&self, issue: NewIssue) -> Result<TrackerKey, GatewayError> {
        let mut state = self.state.lock().unwrap();
        let key = TrackerKey::new(format!("JIR-{}", state.next_issue)).unwrap();
        state.next_issue += 1;
        state.created += 1;
        state.issues.insert(
            key.as_str().to_string(),
            TrackerIssue {
                key: key.clone(),
                summary: issue.summary,
                description: issue.description,
                status_name: "Open".into(),
                updated: Some(Timestamp::now()),
                comments: Vec::new(),
                attachments: Vec::new(),
            },
        );
        Ok(key)
    }

    async fn update_issue(&self, patch: IssuePatch) -> Result<(), GatewayError> {
        self.write(&patch.key, |state| {
            let issue = state.issues.get_mut(patch.key.as_str()).unwrap();
            issue.summary = patch.summary.clone();
            issue.description = patch.description.clone();
        })
    }

    async fn get_transitions(&self, _key: &TrackerKey) -> Result<Vec<Transition>, GatewayError> {
        if self.state.lock().unwrap().failing_transitions {
            return Err(transient("tracker"));
        }
        Ok(vec![
            Transition {
                id: "11".into(),
                name: "To Do".into(),
            },
            Transition {
                id: "31".into(),
                name: "Done".into(),
            },
        ])
    }

    async fn perform_transition(
        &self,
        key: &TrackerKey,
        transition: &Transition,
    ) -> Result<(), GatewayError> {
        self.write(key, |state| {
            state
                .transitions_performed
                .push((key.as_str().to_string(), transition.name.clone()));
            state.issues.get_mut(key.as_str()).unwrap().status_name = transition.name.clone();
        })
    }

    async fn add_comment(&self, key: &TrackerKey, body: &str) -> Result<(), GatewayError> {
        self.write(key, |state| {
            state.next_id += 1;
            let id = CommentId::new(format!("c-{}", state.next_id)).unwrap();
            state
                .issues
                .get_mut(key.as_str())
                .unwrap()
                .comments
                .push(TrackerComment {
                    id,
                    author: Some(CommentAuthor {
                        name: ENGINE_IDENTITY.into(),
                        display_name: "Support Sync".into(),
                    }),
                    body: body.to_string(),
                    created: Timestamp::now(),
                });
        })
    }

    async fn delete_comment(&self, key: &TrackerKey, comment_id: &CommentId) -> Result<(), GatewayError> {
        self.write(key, |state| {
            state
                .issues
                .get_mut(key.as_str())
                .unwrap()
                .comments
                .retain(|c| &c.id != comment_id);
        })
    }

    async fn add_attachment(&self, key: &TrackerKey, file: &NamedFile) -> Result<(), GatewayError> {
        self.write(key, |state| {
            Self::attach(state, key.as_str(), &file.file_name, &file.content)
        })
    }

    async fn delete_attachment(&self, attachment_id: &TrackerAttachmentId) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        for issue in state.issues.values_mut() {
            issue.attachments.retain(|a| &a.id != attachment_id);
        }
        Ok(())
    }

    async fn get_attachment_content(&self, content_uri: &str) -> Result<Vec<u8>, GatewayError> {
        self.state
            .lock()
            .unwrap()
            .attachment_bytes
            .get(content_uri)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound {
                system: "tracker",
                resource: content_uri.to_string(),
            })
    }

    fn browse_url(&self) -> &str {
        BROWSE_URL
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeNotifier {
    sent: Mutex<Vec<(TenantId, String)>>,
    failing: Mutex<bool>,
}

impl FakeNotifier {
    pub fn sent(&self) -> Vec<(TenantId, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }
}

#[async_trait]
impl NotificationGateway for FakeNotifier {
    async fn notify(&self, tenant_id: &TenantId, message: &str) -> Result<(), GatewayError> {
        if *self.failing.lock().unwrap() {
            return Err(transient("notifier"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((tenant_id.clone(), message.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub case_system: Arc<FakeCaseSystem>,
    pub tracker: Arc<FakeTracker>,
    pub notifier: Arc<FakeNotifier>,
    pub store: Arc<InMemoryMappingStore>,
    pub engine: Arc<ReconciliationEngine>,
    pub ingestor: Ingestor,
    pub orchestrator: SynchronizationOrchestrator,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(SyncSettings::new(INTAKE_GROUP, ENGINE_IDENTITY))
    }

    pub fn with_settings(settings: SyncSettings) -> Self {
        let case_system = Arc::new(FakeCaseSystem::default());
        let tracker = Arc::new(FakeTracker::default());
        let notifier = Arc::new(FakeNotifier::default());
        let store = Arc::new(InMemoryMappingStore::new());
        let engine = Arc::new(ReconciliationEngine::new(
            case_system.clone(),
            tracker.clone(),
            notifier.clone(),
            store.clone(),
            settings,
        ));
        Self {
            ingestor: Ingestor::new(store.clone()),
            orchestrator: SynchronizationOrchestrator::new(engine.clone()),
            case_system,
            tracker,
            notifier,
            store,
            engine,
        }
    }

    /// Registers a case with a summary, problem text and internal notes.
    pub fn seed_case(&self, case_key: &str) {
        self.case_system.add_case(
            case_key,
            FakeCase {
                summary: Some("Printer on fire".into()),
                problem_text: Some("<p>The printer is on fire</p>".into()),
                internal_notes: Some("<div>Called the customer</div>".into()),
                ..FakeCase::default()
            },
        );
    }

    pub async fn mapping(&self, case_key: &str) -> Option<IncidentMapping> {
        self.store
            .find_by_tenant_and_case_key(
                &TenantId::new(TENANT).unwrap(),
                &CaseKey::new(case_key).unwrap(),
            )
            .await
            .unwrap()
    }

    /// Ingests and pushes a case (seeding it if absent), returning its
    /// `Mirrored` mapping.
    pub async fn mirrored(&self, case_key: &str) -> IncidentMapping {
        if !self.case_system.has_case(case_key) {
            self.seed_case(case_key);
        }
        self.ingestor.ingest(TENANT, case_key).await.unwrap();
        self.engine.push_to_tracker().await;
        self.mapping(case_key).await.unwrap()
    }
}
