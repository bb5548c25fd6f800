//! WorkflowEngine — drives one session through the onboarding graph.
//!
//! The engine is the single mutator of its [`EngineState`]. UI code renders
//! from [`WorkflowEngine::position`] / [`WorkflowEngine::subscribe`] and only
//! ever asks the engine to act.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::error::{GraphError, NetworkError, StoreError, WorkflowError};
use crate::store::ProfileStore;

use super::gateway::AuthGateway;
use super::graph::{NextStep, StepRecord, WorkflowGraph};
use super::model::{fields, AccountType, FieldValue, ProfileDraft};
use super::state::{EngineState, Position, StepId};
use super::validator::{RequiredFieldsValidator, StepValidator};

/// Collaborators injected into an engine, scoped to one session.
#[derive(Clone)]
pub struct EngineDeps {
    pub graph: Arc<WorkflowGraph>,
    pub validator: Arc<dyn StepValidator>,
    pub gateway: Arc<dyn AuthGateway>,
    pub store: Arc<dyn ProfileStore>,
}

impl EngineDeps {
    /// Standard marketplace graph with the built-in field validator.
    pub fn standard(gateway: Arc<dyn AuthGateway>, store: Arc<dyn ProfileStore>) -> Self {
        let graph = Arc::new(WorkflowGraph::standard());
        Self {
            validator: Arc::new(RequiredFieldsValidator::new(Arc::clone(&graph))),
            graph,
            gateway,
            store,
        }
    }
}

/// Result of a successful `advance` or `skip`.
#[derive(Debug)]
pub struct StepOutcome {
    pub from: StepId,
    pub to: Position,
    /// Set when the transition happened but could not be saved locally.
    /// The engine retries on the next save; only restart-resumability is at risk.
    pub persist_error: Option<StoreError>,
}

/// Snapshot for the UI shell.
#[derive(Debug, Clone, Serialize)]
pub struct OnboardingStatus {
    pub session_id: String,
    pub position: Position,
    pub completed_step_ids: Vec<StepId>,
    pub can_go_back: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_type: Option<AccountType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransitionKind {
    Advance,
    Skip,
}

struct Session {
    state: EngineState,
    finished: bool,
    /// In-memory changes not yet written to the store.
    dirty: bool,
}

/// Onboarding state machine for one signed-in session.
pub struct WorkflowEngine {
    session_id: String,
    deps: EngineDeps,
    session: Arc<Mutex<Session>>,
    position_tx: watch::Sender<Position>,
    closed: AtomicBool,
}

impl WorkflowEngine {
    /// Rehydrate the session from the store, or start fresh at the initial step.
    pub async fn resume(
        session_id: impl Into<String>,
        deps: EngineDeps,
    ) -> Result<Arc<Self>, WorkflowError> {
        let session_id = session_id.into();

        let state = match deps.store.load(&session_id).await? {
            Some(state) => {
                check_resumed_state(&session_id, &deps.graph, &state)?;
                info!(
                    session_id = %session_id,
                    step = %state.current_step_id,
                    completed = state.completed_step_ids.len(),
                    "Resumed onboarding"
                );
                state
            }
            None => {
                let initial = deps.graph.initial_step();
                info!(session_id = %session_id, step = %initial, "Starting onboarding");
                EngineState::new(initial)
            }
        };

        let (position_tx, _rx) = watch::channel(Position::Step(state.current_step_id));

        Ok(Arc::new(Self {
            session_id,
            deps,
            session: Arc::new(Mutex::new(Session {
                state,
                finished: false,
                dirty: false,
            })),
            position_tx,
            closed: AtomicBool::new(false),
        }))
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Current position; the UI renders the screen for this.
    pub fn position(&self) -> Position {
        *self.position_tx.borrow()
    }

    /// Receive every position change.
    pub fn subscribe(&self) -> watch::Receiver<Position> {
        self.position_tx.subscribe()
    }

    /// Copy of the engine state. Waits for an in-flight operation to finish.
    pub async fn snapshot(&self) -> EngineState {
        self.session.lock().await.state.clone()
    }

    pub async fn status(&self) -> OnboardingStatus {
        let session = self.session.lock().await;
        OnboardingStatus {
            session_id: self.session_id.clone(),
            position: self.position(),
            completed_step_ids: session.state.completed_step_ids.iter().copied().collect(),
            can_go_back: !session.finished && session.state.can_go_back(),
            account_type: session.state.draft.account_type(),
        }
    }

    /// Stage local edits for the current step. No validation, no remote call.
    pub fn enter_draft(&self, patch: ProfileDraft) -> Result<(), WorkflowError> {
        let mut session = self.begin()?;
        let step = session.state.current_step_id;
        let record = self.deps.graph.record(step)?;

        if let Some(field) = patch.field_names().find(|name| !record.owns(name)) {
            return Err(WorkflowError::ForeignField {
                field: field.to_string(),
                step,
            });
        }

        if let (true, Some(requested)) = (
            session.state.account_type_committed,
            patch.get(fields::ACCOUNT_TYPE),
        ) {
            match session.state.draft.account_type() {
                Some(committed) if *requested == FieldValue::AccountType(committed) => {}
                Some(committed) => {
                    return Err(WorkflowError::AccountTypeFrozen {
                        committed,
                        requested: requested.clone(),
                    });
                }
                None => {
                    return Err(WorkflowError::Internal(
                        "account type marked committed but missing from draft".to_string(),
                    ));
                }
            }
        }

        debug!(
            session_id = %self.session_id,
            step = %step,
            fields = patch.len(),
            "Draft updated"
        );
        session.state.draft.merge(patch);
        session.dirty = true;
        Ok(())
    }

    /// Validate, commit, and move to the next step.
    pub async fn advance(self: &Arc<Self>) -> Result<StepOutcome, WorkflowError> {
        self.spawn_transition(TransitionKind::Advance).await
    }

    /// Move on without validating. Present fields are committed best-effort,
    /// and the step is not marked completed.
    pub async fn skip(self: &Arc<Self>) -> Result<StepOutcome, WorkflowError> {
        self.spawn_transition(TransitionKind::Skip).await
    }

    /// Return to the previous step. Keeps draft fields and completed steps.
    pub fn go_back(&self) -> Result<StepId, WorkflowError> {
        let mut session = self.begin()?;
        let from = session.state.current_step_id;
        let to = session.state.step_back().ok_or(WorkflowError::NoHistory)?;
        session.dirty = true;
        self.publish(Position::Step(to));
        info!(session_id = %self.session_id, from = %from, to = %to, "Went back");
        Ok(to)
    }

    /// Write pending in-memory changes to the store.
    pub async fn flush(&self) -> Result<(), WorkflowError> {
        let mut session = self.begin()?;
        if !session.dirty {
            return Ok(());
        }
        self.deps
            .store
            .save(&self.session_id, &session.state)
            .await?;
        session.dirty = false;
        Ok(())
    }

    /// Drop all progress and start over at the initial step.
    ///
    /// This is the only way to pick a different account type once committed.
    pub async fn restart(&self) -> Result<(), WorkflowError> {
        let mut session = self.begin()?;
        self.deps.store.clear(&self.session_id).await?;

        let initial = self.deps.graph.initial_step();
        session.state = EngineState::new(initial);
        session.dirty = false;
        self.publish(Position::Step(initial));
        info!(session_id = %self.session_id, "Onboarding restarted");
        Ok(())
    }

    /// Tear the session down. Operations already running still finish and
    /// persist; new ones fail with `SessionClosed`.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(session_id = %self.session_id, "Onboarding session closed");
        }
    }

    // ── internals ───────────────────────────────────────────────────

    /// Take the session for one operation, refusing re-entry.
    fn begin(&self) -> Result<OwnedMutexGuard<Session>, WorkflowError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(WorkflowError::SessionClosed);
        }
        let session = Arc::clone(&self.session)
            .try_lock_owned()
            .map_err(|_| WorkflowError::OperationInProgress)?;
        if session.finished {
            return Err(WorkflowError::AlreadyCompleted);
        }
        Ok(session)
    }

    fn publish(&self, position: Position) {
        self.position_tx.send_replace(position);
    }

    async fn spawn_transition(
        self: &Arc<Self>,
        kind: TransitionKind,
    ) -> Result<StepOutcome, WorkflowError> {
        let session = self.begin()?;
        let engine = Arc::clone(self);
        // Detached so that dropping the caller's future cannot abort a commit.
        tokio::spawn(async move { engine.transition(session, kind).await })
            .await
            .map_err(|e| WorkflowError::Internal(format!("transition task failed: {e}")))?
    }

    async fn transition(
        &self,
        mut guard: OwnedMutexGuard<Session>,
        kind: TransitionKind,
    ) -> Result<StepOutcome, WorkflowError> {
        let session = &mut *guard;
        let from = session.state.current_step_id;

        if kind == TransitionKind::Advance {
            let result = self.deps.validator.validate(from, &session.state.draft);
            if !result.is_valid() {
                debug!(
                    session_id = %self.session_id,
                    step = %from,
                    missing = ?result.missing_fields,
                    invalid = ?result.invalid_fields,
                    "Advance blocked by validation"
                );
                self.persist_if_dirty(session).await;
                return Err(WorkflowError::ValidationBlocked {
                    missing_fields: result.missing_fields,
                    invalid_fields: result.invalid_fields,
                });
            }
        }

        let graph_defect = |e: &GraphError| {
            error!(session_id = %self.session_id, step = %from, "Workflow graph defect: {}", e);
        };
        let record = self.deps.graph.record(from).inspect_err(graph_defect)?;
        let next = self
            .deps
            .graph
            .resolve_next(from, &session.state.draft)
            .inspect_err(graph_defect)?;

        match (kind, self.commit_step(record, &mut session.state).await) {
            (_, Ok(())) => {}
            (TransitionKind::Advance, Err(cause)) => {
                warn!(session_id = %self.session_id, step = %from, "Commit failed: {}", cause);
                self.persist_if_dirty(session).await;
                return Err(WorkflowError::CommitFailed { step: from, cause });
            }
            (TransitionKind::Skip, Err(cause)) => {
                warn!(
                    session_id = %self.session_id,
                    step = %from,
                    "Best-effort commit on skip failed, continuing: {}",
                    cause
                );
            }
        }

        match next {
            NextStep::Step(to) => {
                if kind == TransitionKind::Advance {
                    session.state.completed_step_ids.insert(from);
                }
                session.state.move_to(to);
                session.dirty = true;
                let persist_error = self.persist(session).await;
                self.publish(Position::Step(to));
                info!(
                    session_id = %self.session_id,
                    from = %from,
                    to = %to,
                    skipped = kind == TransitionKind::Skip,
                    "Onboarding step transition"
                );
                Ok(StepOutcome {
                    from,
                    to: Position::Step(to),
                    persist_error,
                })
            }
            NextStep::Terminal => {
                if let Err(cause) = self.deps.gateway.complete_onboarding().await {
                    warn!(session_id = %self.session_id, "Completing onboarding failed: {}", cause);
                    self.persist_if_dirty(session).await;
                    return Err(WorkflowError::CommitFailed { step: from, cause });
                }
                if kind == TransitionKind::Advance {
                    session.state.completed_step_ids.insert(from);
                }
                session.finished = true;
                session.dirty = false;

                let persist_error = self.deps.store.clear(&self.session_id).await.err();
                if let Some(e) = &persist_error {
                    warn!(session_id = %self.session_id, "Failed to clear finished onboarding state: {}", e);
                }
                self.publish(Position::Complete);
                info!(session_id = %self.session_id, from = %from, "Onboarding complete");
                Ok(StepOutcome {
                    from,
                    to: Position::Complete,
                    persist_error,
                })
            }
        }
    }

    /// Send the fields owned by the step to the backend.
    ///
    /// A step owning `accountType` commits it through `set_account_type`;
    /// everything else goes through one `commit_fields` call.
    async fn commit_step(
        &self,
        record: &StepRecord,
        state: &mut EngineState,
    ) -> Result<(), NetworkError> {
        if record.owns(fields::ACCOUNT_TYPE) {
            if let Some(account_type) = state.draft.account_type() {
                self.deps.gateway.set_account_type(account_type).await?;
                state.account_type_committed = true;
            }
        }

        let owned = state.draft.subset(
            record
                .owned_fields()
                .filter(|name| *name != fields::ACCOUNT_TYPE),
        );
        if !owned.is_empty() {
            self.deps.gateway.commit_fields(&owned).await?;
        }
        Ok(())
    }

    async fn persist(&self, session: &mut Session) -> Option<StoreError> {
        match self.deps.store.save(&self.session_id, &session.state).await {
            Ok(()) => {
                session.dirty = false;
                None
            }
            Err(e) => {
                warn!(session_id = %self.session_id, "Failed to persist onboarding state: {}", e);
                Some(e)
            }
        }
    }

    /// Save staged edits on failure paths so a restart keeps what was typed.
    async fn persist_if_dirty(&self, session: &mut Session) {
        if session.dirty {
            let _ = self.persist(session).await;
        }
    }
}

/// Reject rehydrated state that does not fit the current graph.
fn check_resumed_state(
    session_id: &str,
    graph: &WorkflowGraph,
    state: &EngineState,
) -> Result<(), WorkflowError> {
    let referenced = std::iter::once(state.current_step_id)
        .chain(state.history.iter().copied())
        .chain(state.completed_step_ids.iter().copied());
    for step in referenced {
        if !graph.contains(step) {
            error!(session_id, step = %step, "Saved onboarding state names an undeclared step");
            return Err(GraphError::UnknownStep(step).into());
        }
    }

    if state.history.last() != Some(&state.current_step_id) {
        return Err(StoreError::Corrupt {
            session_id: session_id.to_string(),
            reason: "history does not end at the current step".to_string(),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onboarding::gateway::InMemoryAuthGateway;
    use crate::onboarding::graph::{StepRecord, Successor};
    use crate::store::MemoryProfileStore;

    async fn engine() -> (Arc<WorkflowEngine>, Arc<InMemoryAuthGateway>) {
        let gateway = Arc::new(InMemoryAuthGateway::new());
        let deps = EngineDeps::standard(gateway.clone(), Arc::new(MemoryProfileStore::new()));
        (WorkflowEngine::resume("sess-1", deps).await.unwrap(), gateway)
    }

    #[tokio::test]
    async fn fresh_engine_starts_at_account_type() {
        let (engine, _) = engine().await;
        assert_eq!(engine.position(), Position::Step(StepId::AccountType));
        let status = engine.status().await;
        assert!(!status.can_go_back);
        assert!(status.completed_step_ids.is_empty());
    }

    #[tokio::test]
    async fn enter_draft_rejects_fields_of_other_steps() {
        let (engine, _) = engine().await;
        let err = engine
            .enter_draft(ProfileDraft::new().with(fields::EMAIL, "a@b.com"))
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::ForeignField { ref field, step: StepId::AccountType } if field == "email"
        ));
        assert!(engine.snapshot().await.draft.is_empty());
    }

    #[tokio::test]
    async fn account_type_can_change_until_committed() {
        let (engine, _) = engine().await;
        engine
            .enter_draft(ProfileDraft::new().with(fields::ACCOUNT_TYPE, AccountType::Business))
            .unwrap();
        engine
            .enter_draft(ProfileDraft::new().with(fields::ACCOUNT_TYPE, AccountType::Individual))
            .unwrap();
        engine.advance().await.unwrap();

        engine.go_back().unwrap();
        let err = engine
            .enter_draft(ProfileDraft::new().with(fields::ACCOUNT_TYPE, AccountType::Business))
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::AccountTypeFrozen {
                committed: AccountType::Individual,
                requested: FieldValue::AccountType(AccountType::Business)
            }
        ));

        // Re-selecting the same value is harmless.
        engine
            .enter_draft(ProfileDraft::new().with(fields::ACCOUNT_TYPE, AccountType::Individual))
            .unwrap();
    }

    #[tokio::test]
    async fn committed_account_type_rejects_untyped_values() {
        let (engine, _) = engine().await;
        engine
            .enter_draft(ProfileDraft::new().with(fields::ACCOUNT_TYPE, AccountType::Individual))
            .unwrap();
        engine.advance().await.unwrap();
        engine.go_back().unwrap();

        for value in [FieldValue::from("Business"), FieldValue::from("")] {
            let err = engine
                .enter_draft(ProfileDraft::new().with(fields::ACCOUNT_TYPE, value.clone()))
                .unwrap_err();
            assert!(matches!(
                err,
                WorkflowError::AccountTypeFrozen {
                    committed: AccountType::Individual,
                    ref requested,
                } if *requested == value
            ));
        }

        let state = engine.snapshot().await;
        assert_eq!(state.draft.account_type(), Some(AccountType::Individual));
        let outcome = engine.advance().await.unwrap();
        assert_eq!(outcome.to, Position::Step(StepId::UserDetails));
    }

    #[tokio::test]
    async fn skip_at_unresolved_branch_is_a_graph_error() {
        let (engine, gateway) = engine().await;
        let err = engine.skip().await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Graph(crate::error::GraphError::UnresolvedBranch(StepId::AccountType))
        ));
        assert_eq!(engine.position(), Position::Step(StepId::AccountType));
        assert_eq!(gateway.calls().set_account_type, 0);
    }

    #[tokio::test]
    async fn closed_session_refuses_new_operations() {
        let (engine, _) = engine().await;
        engine.close();
        assert!(matches!(
            engine.enter_draft(ProfileDraft::new()),
            Err(WorkflowError::SessionClosed)
        ));
        assert!(matches!(engine.advance().await, Err(WorkflowError::SessionClosed)));
        assert!(matches!(engine.go_back(), Err(WorkflowError::SessionClosed)));
    }

    #[tokio::test]
    async fn resume_rejects_state_outside_graph() {
        let store = Arc::new(MemoryProfileStore::new());
        let mut state = EngineState::new(StepId::AccountType);
        state.move_to(StepId::Portfolio);
        store.save("sess-1", &state).await.unwrap();

        let graph = WorkflowGraph::new(
            StepId::AccountType,
            vec![StepRecord::new(
                StepId::AccountType,
                Successor::Fixed(NextStep::Terminal),
            )
            .required([fields::ACCOUNT_TYPE])],
        )
        .unwrap();
        let graph = Arc::new(graph);
        let deps = EngineDeps {
            validator: Arc::new(RequiredFieldsValidator::new(Arc::clone(&graph))),
            graph,
            gateway: Arc::new(InMemoryAuthGateway::new()),
            store,
        };

        let err = WorkflowEngine::resume("sess-1", deps).await.err().unwrap();
        assert!(matches!(
            err,
            WorkflowError::Graph(crate::error::GraphError::UnknownStep(StepId::Portfolio))
        ));
    }

    #[tokio::test]
    async fn transition_from_undeclared_step_commits_nothing() {
        let gateway = Arc::new(InMemoryAuthGateway::new());
        let graph = Arc::new(
            WorkflowGraph::new(
                StepId::AccountType,
                vec![StepRecord::new(
                    StepId::AccountType,
                    Successor::Fixed(NextStep::Terminal),
                )
                .required([fields::ACCOUNT_TYPE])],
            )
            .unwrap(),
        );
        let mut state = EngineState::new(StepId::AccountType);
        state.move_to(StepId::Portfolio);
        state.draft.set(fields::PORTFOLIO, "anything");

        let (position_tx, _rx) = watch::channel(Position::Step(StepId::Portfolio));
        let engine = Arc::new(WorkflowEngine {
            session_id: "sess-1".to_string(),
            deps: EngineDeps {
                validator: Arc::new(RequiredFieldsValidator::new(Arc::clone(&graph))),
                graph,
                gateway: gateway.clone(),
                store: Arc::new(MemoryProfileStore::new()),
            },
            session: Arc::new(Mutex::new(Session {
                state,
                finished: false,
                dirty: false,
            })),
            position_tx,
            closed: AtomicBool::new(false),
        });

        let err = engine.skip().await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Graph(GraphError::UnknownStep(StepId::Portfolio))
        ));
        assert_eq!(gateway.calls(), Default::default());
        assert_eq!(engine.position(), Position::Step(StepId::Portfolio));
    }

    #[tokio::test]
    async fn flush_writes_staged_edits() {
        let store = Arc::new(MemoryProfileStore::new());
        let deps = EngineDeps::standard(Arc::new(InMemoryAuthGateway::new()), store.clone());
        let engine = WorkflowEngine::resume("sess-1", deps).await.unwrap();

        engine
            .enter_draft(ProfileDraft::new().with(fields::ACCOUNT_TYPE, AccountType::Business))
            .unwrap();
        assert!(store.load("sess-1").await.unwrap().is_none());

        engine.flush().await.unwrap();
        let saved = store.load("sess-1").await.unwrap().unwrap();
        assert_eq!(saved.draft.account_type(), Some(AccountType::Business));
    }

    #[tokio::test]
    async fn restart_resets_to_initial_step() {
        let store = Arc::new(MemoryProfileStore::new());
        let deps = EngineDeps::standard(Arc::new(InMemoryAuthGateway::new()), store.clone());
        let engine = WorkflowEngine::resume("sess-1", deps).await.unwrap();

        engine
            .enter_draft(ProfileDraft::new().with(fields::ACCOUNT_TYPE, AccountType::Business))
            .unwrap();
        engine.advance().await.unwrap();
        assert!(store.load("sess-1").await.unwrap().is_some());

        engine.restart().await.unwrap();
        assert_eq!(engine.position(), Position::Step(StepId::AccountType));
        assert_eq!(engine.snapshot().await, EngineState::new(StepId::AccountType));
        assert!(store.load("sess-1").await.unwrap().is_none());

        // A fresh choice is allowed after restart.
        engine
            .enter_draft(ProfileDraft::new().with(fields::ACCOUNT_TYPE, AccountType::Individual))
            .unwrap();
    }
}
