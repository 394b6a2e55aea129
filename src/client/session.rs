use async_trait::async_trait;
use tracing::{debug, warn};

use super::push::PushEvent;
use super::reconciler::{Effect, ReconcilerEvent, ReconcilerState};
use crate::dashboard::models::{Issue, IssueStatus, Priority, UpdateIssueRequest};
use crate::dashboard::ws::WsMessage;
use crate::errors::ClientError;

/// Where a session fetches and saves issues.
#[async_trait]
pub trait QuerySource: Send + Sync {
    async fn list_issues(&self) -> Result<Vec<Issue>, ClientError>;
    async fn get_issue(&self, id: &str) -> Result<Issue, ClientError>;
    async fn update_issue(&self, request: &UpdateIssueRequest) -> Result<Issue, ClientError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    Connected,
    #[default]
    Disconnected,
}

/// Local, unsaved values of the edit form.
#[derive(Debug, Clone, PartialEq)]
pub struct EditDraft {
    pub title: String,
    pub description: String,
    pub status: IssueStatus,
    pub priority: Priority,
    pub assignee: Option<String>,
    base: Issue,
}

impl EditDraft {
    pub fn from_issue(issue: &Issue) -> Self {
        Self {
            title: issue.title.clone(),
            description: issue.description.clone(),
            status: issue.status.clone(),
            priority: issue.priority,
            assignee: issue.assignee.clone(),
            base: issue.clone(),
        }
    }

    pub fn issue_id(&self) -> &str {
        &self.base.id
    }

    pub fn is_dirty(&self) -> bool {
        self.to_request() != UpdateIssueRequest {
            id: self.base.id.clone(),
            ..Default::default()
        }
    }

    /// Update request carrying only the fields that differ from the issue
    /// the draft was opened on.
    pub fn to_request(&self) -> UpdateIssueRequest {
        let base = &self.base;
        UpdateIssueRequest {
            id: base.id.clone(),
            title: (self.title != base.title).then(|| self.title.clone()),
            description: (self.description != base.description).then(|| self.description.clone()),
            status: (self.status != base.status).then(|| self.status.clone()),
            priority: (self.priority != base.priority).then_some(self.priority),
            assignee: if self.assignee != base.assignee {
                Some(self.assignee.clone().unwrap_or_default())
            } else {
                None
            },
        }
    }
}

/// One dashboard tab: cached query data, the edit form and the push
/// reconciler.
pub struct ClientSession<S> {
    source: S,
    state: ReconcilerState,
    issues: Vec<Issue>,
    selected: Option<Issue>,
    draft: Option<EditDraft>,
    connection: ConnectionStatus,
}

impl<S: QuerySource> ClientSession<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            state: ReconcilerState::Idle,
            issues: Vec::new(),
            selected: None,
            draft: None,
            connection: ConnectionStatus::Disconnected,
        }
    }

    pub fn state(&self) -> ReconcilerState {
        self.state
    }

    pub fn has_pending_update(&self) -> bool {
        self.state.has_pending_update()
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn selected(&self) -> Option<&Issue> {
        self.selected.as_ref()
    }

    pub fn draft(&self) -> Option<&EditDraft> {
        self.draft.as_ref()
    }

    pub fn draft_mut(&mut self) -> Option<&mut EditDraft> {
        self.draft.as_mut()
    }

    pub fn connection(&self) -> ConnectionStatus {
        self.connection
    }

    /// Load the issue list.
    pub async fn load(&mut self) -> Result<(), ClientError> {
        self.issues = self.source.list_issues().await?;
        Ok(())
    }

    /// Open the detail view for `id`.
    pub async fn select(&mut self, id: &str) -> Result<&Issue, ClientError> {
        let issue = self.source.get_issue(id).await?;
        Ok(&*self.selected.insert(issue))
    }

    pub async fn handle(&mut self, event: PushEvent) -> Result<(), ClientError> {
        match event {
            PushEvent::Opened => {
                self.connection = ConnectionStatus::Connected;
                Ok(())
            }
            PushEvent::Closed => {
                self.connection = ConnectionStatus::Disconnected;
                Ok(())
            }
            PushEvent::Frame(raw) => self.on_push(&raw).await,
        }
    }

    /// Feed one raw push frame. Frames that do not parse are logged and
    /// ignored.
    pub async fn on_push(&mut self, raw: &str) -> Result<(), ClientError> {
        match serde_json::from_str::<WsMessage>(raw) {
            Ok(msg) => {
                debug!(kind = msg.type_name(), "push received");
                self.apply(ReconcilerEvent::PushReceived).await?;
            }
            Err(e) => warn!(error = %e, "ignoring unrecognised push frame"),
        }
        Ok(())
    }

    /// Open the edit form on the selected issue. Returns false when nothing
    /// is selected or a form is already open.
    pub fn begin_edit(&mut self) -> bool {
        let Some(issue) = &self.selected else {
            return false;
        };
        if self.state != ReconcilerState::Idle {
            return false;
        }
        self.draft = Some(EditDraft::from_issue(issue));
        self.step(ReconcilerEvent::BeginEdit);
        true
    }

    /// Save the draft. On failure the form stays open with the draft intact.
    pub async fn save(&mut self) -> Result<Option<Issue>, ClientError> {
        let Some(draft) = &self.draft else {
            return Ok(None);
        };
        let updated = self.source.update_issue(&draft.to_request()).await?;

        if let Some(cached) = self.issues.iter_mut().find(|i| i.id == updated.id) {
            *cached = updated.clone();
        }
        self.selected = Some(updated.clone());
        self.draft = None;
        self.apply(ReconcilerEvent::Save).await?;
        Ok(Some(updated))
    }

    pub async fn cancel(&mut self) -> Result<(), ClientError> {
        self.draft = None;
        self.apply(ReconcilerEvent::Cancel).await?;
        Ok(())
    }

    /// Accept the deferred update, discarding the draft.
    pub async fn choose_reload(&mut self) -> Result<(), ClientError> {
        self.apply(ReconcilerEvent::ChooseReload).await?;
        Ok(())
    }

    /// Hide the update notice and keep editing. Nothing is refetched.
    pub fn dismiss(&mut self) {
        self.step(ReconcilerEvent::Dismiss);
    }

    fn step(&mut self, event: ReconcilerEvent) -> Effect {
        let (next, effect) = self.state.transition(event);
        debug!(from = ?self.state, to = ?next, ?event, ?effect, "reconciler transition");
        self.state = next;
        effect
    }

    async fn apply(&mut self, event: ReconcilerEvent) -> Result<Effect, ClientError> {
        let effect = self.step(event);
        match effect {
            Effect::None => {}
            Effect::Refetch => self.refetch().await?,
            Effect::DiscardDraftAndRefetch => {
                self.draft = None;
                self.refetch().await?;
            }
        }
        Ok(effect)
    }

    /// Replace the cached list and selected issue with fresh server data.
    async fn refetch(&mut self) -> Result<(), ClientError> {
        self.issues = self.source.list_issues().await?;
        if let Some(id) = self.selected.as_ref().map(|i| i.id.clone()) {
            self.selected = match self.source.get_issue(&id).await {
                Ok(issue) => Some(issue),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            };
        }
        Ok(())
    }
}
