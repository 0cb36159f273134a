//! Interview interpreter: drives one participant through the question graph.
//!
//! Every event works on a snapshot of the session taken from the store. The
//! answer and the step it leads to are claimed with a compare-and-set write
//! before any side effect runs, so two deliveries of the same message can
//! never both act.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::actions::{ActionExecutor, ActionReport};
use super::next_step::{self, Destination};
use super::scheduler::PurgeScheduler;
use super::session::{Answer, Session, SessionPhase};
use super::store::SessionStore;
use super::template;
use crate::config::TenantConfig;
use crate::error::InterviewError;
use crate::graph::{GraphCatalog, MessageKey, Question, QuestionGraph, Rejection, Validator};
use crate::platform::{ChannelRef, ParticipantId, Platform};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started { session_id: Uuid, channel: ChannelRef },
    /// The participant already has a session; nothing was done.
    AlreadyActive,
}

/// Why a message did not affect any session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NoSession,
    /// Sent outside the participant's private channel.
    WrongChannel,
    /// Same platform message id as the last accepted answer.
    Duplicate,
    /// The interview is already finished.
    NotInProgress,
    /// Another delivery claimed the session first.
    Stale,
}

impl IgnoreReason {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoSession => "no_session",
            Self::WrongChannel => "wrong_channel",
            Self::Duplicate => "duplicate",
            Self::NotInProgress => "not_in_progress",
            Self::Stale => "stale",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Ignored(IgnoreReason),
    /// The answer was rejected and the question asked again.
    Reprompted(Rejection),
    Advanced { question_id: String, report: ActionReport },
    Completed { report: ActionReport, completion: ActionReport },
    /// The interview was aborted while the answer's actions ran. Nothing
    /// after those actions happened.
    Interrupted { report: ActionReport },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortOutcome {
    Aborted { session_id: Uuid },
    NotFound,
}

/// The interview state machine for one tenant.
pub struct Interviewer {
    tenant: TenantConfig,
    catalog: Arc<GraphCatalog>,
    platform: Arc<dyn Platform>,
    store: Arc<dyn SessionStore>,
    scheduler: PurgeScheduler,
    executor: ActionExecutor,
    validator: Validator,
}

impl Interviewer {
    pub fn new(
        tenant: TenantConfig,
        catalog: Arc<GraphCatalog>,
        platform: Arc<dyn Platform>,
        store: Arc<dyn SessionStore>,
        grace: Duration,
    ) -> Self {
        Self {
            scheduler: PurgeScheduler::new(grace, Arc::clone(&store), Arc::clone(&platform)),
            executor: ActionExecutor::new(Arc::clone(&platform)),
            validator: Validator::default(),
            tenant,
            catalog,
            platform,
            store,
        }
    }

    /// Use a different answer validator (e.g. one that enforces patterns).
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    pub fn tenant(&self) -> &TenantConfig {
        &self.tenant
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    pub fn scheduler(&self) -> &PurgeScheduler {
        &self.scheduler
    }

    /// The graph new sessions start against.
    pub async fn graph(&self) -> Option<Arc<QuestionGraph>> {
        self.catalog.get(&self.tenant.tenant_id).await
    }

    /// Begin an interview. A participant with a session already (in progress
    /// or in its grace window) is left alone.
    pub async fn start(&self, participant: &ParticipantId) -> Result<StartOutcome, InterviewError> {
        if self.store.contains(participant).await {
            debug!(participant = %participant, "Interview already active");
            return Ok(StartOutcome::AlreadyActive);
        }

        let graph = self
            .graph()
            .await
            .filter(|g| g.first_question().is_some())
            .ok_or_else(|| InterviewError::ConfigurationMissing {
                tenant: self.tenant.tenant_id.clone(),
            })?;

        if let Some(role) = &self.tenant.registration_role {
            if let Err(e) = self.platform.grant_role(participant, role).await {
                warn!(participant = %participant, role = %role, error = %e, "Failed to grant registration role");
            }
        }

        let channel = self
            .platform
            .create_private_channel(participant)
            .await
            .map_err(InterviewError::ChannelUnavailable)?;

        let Some(session) = Session::start(participant.clone(), channel.clone(), graph) else {
            self.discard_channel(participant, &channel).await;
            return Err(InterviewError::ConfigurationMissing {
                tenant: self.tenant.tenant_id.clone(),
            });
        };
        let session_id = session.session_id;
        let prompt = session.current_question().map(Question::prompt);

        if !self.store.insert_if_absent(session).await {
            debug!(participant = %participant, "Lost start race, discarding extra channel");
            self.discard_channel(participant, &channel).await;
            return Ok(StartOutcome::AlreadyActive);
        }

        info!(
            participant = %participant,
            session_id = %session_id,
            channel = %channel,
            "Interview started"
        );

        if let Some(prompt) = prompt {
            self.send(&channel, &prompt).await;
        }

        Ok(StartOutcome::Started { session_id, channel })
    }

    /// Handle a message from a participant.
    pub async fn submit(
        &self,
        participant: &ParticipantId,
        channel: &ChannelRef,
        text: &str,
        message_id: Option<&str>,
    ) -> Result<SubmitOutcome, InterviewError> {
        let Some(mut session) = self.store.get(participant).await else {
            return Ok(SubmitOutcome::Ignored(IgnoreReason::NoSession));
        };
        if &session.channel != channel {
            return Ok(SubmitOutcome::Ignored(IgnoreReason::WrongChannel));
        }
        if session.phase != SessionPhase::InProgress {
            return Ok(SubmitOutcome::Ignored(IgnoreReason::NotInProgress));
        }
        if message_id.is_some() && session.last_message_id.as_deref() == message_id {
            debug!(participant = %participant, message_id = ?message_id, "Duplicate delivery dropped");
            return Ok(SubmitOutcome::Ignored(IgnoreReason::Duplicate));
        }

        let graph = Arc::clone(&session.graph);
        let Some(question) = graph.question(&session.current_question_id) else {
            let err = InterviewError::UnknownQuestion {
                question_id: session.current_question_id.clone(),
                target_id: session.current_question_id.clone(),
            };
            return Err(self.configuration_failure(&session, err).await);
        };

        let raw = text.trim();
        if let Err(rejection) = self.validator.check(question, raw) {
            debug!(
                participant = %participant,
                question = %question.id,
                rejection = ?rejection,
                "Answer rejected"
            );
            self.send(&session.channel, &rejection.message(&graph)).await;
            return Ok(SubmitOutcome::Reprompted(rejection));
        }

        let answer = Answer::for_question(question, raw);
        session.record(answer.clone());

        let destination = match next_step::next_question(question, &session) {
            Ok(Destination::Question(target)) if graph.question(&target).is_none() => {
                let err = InterviewError::UnknownQuestion {
                    question_id: question.id.clone(),
                    target_id: target,
                };
                return Err(self.configuration_failure(&session, err).await);
            }
            Ok(destination) => destination,
            Err(err) => return Err(self.configuration_failure(&session, err).await),
        };

        // Claim the answer and the step it leads to.
        session.last_message_id = message_id.map(String::from);
        match &destination {
            Destination::Question(target) => session.current_question_id = target.clone(),
            Destination::End => {
                if let Err(e) = session.transition_to(SessionPhase::Completed) {
                    warn!(participant = %participant, error = %e, "Unexpected phase at completion");
                }
            }
        }
        match self.store.replace(&session).await {
            Ok(revision) => session.revision = revision,
            Err(conflict) => {
                debug!(participant = %participant, error = %conflict, "Answer claimed by another delivery");
                return Ok(SubmitOutcome::Ignored(IgnoreReason::Stale));
            }
        }

        info!(
            participant = %participant,
            question = %question.id,
            answer = %answer.raw_value,
            "Answer recorded"
        );

        let before = session.data_store.clone();
        let report = self
            .executor
            .execute(participant, &question.actions, Some(&answer), &mut session)
            .await;

        if !self.is_current(&session).await {
            info!(participant = %participant, session_id = %session.session_id, "Interview aborted while its actions ran");
            return Ok(SubmitOutcome::Interrupted { report });
        }

        match destination {
            Destination::Question(target) => {
                self.persist_data(&session, &before).await;
                if let Some(next) = graph.question(&target) {
                    self.send(&session.channel, &next.prompt()).await;
                }
                Ok(SubmitOutcome::Advanced {
                    question_id: target,
                    report,
                })
            }
            Destination::End => match self.complete(&mut session).await {
                Some(completion) => {
                    self.persist_data(&session, &before).await;
                    Ok(SubmitOutcome::Completed { report, completion })
                }
                None => Ok(SubmitOutcome::Interrupted { report }),
            },
        }
    }

    /// Run the completion block, tell the participant, and schedule the purge.
    /// Returns `None` when the interview was aborted during the completion
    /// actions.
    async fn complete(&self, session: &mut Session) -> Option<ActionReport> {
        let participant = session.participant.clone();
        let graph = Arc::clone(&session.graph);

        let report = self
            .executor
            .execute_completion(&participant, &graph.completion.actions, session)
            .await;

        if !self.is_current(session).await {
            info!(participant = %participant, session_id = %session.session_id, "Interview aborted during completion");
            return None;
        }

        let message = if graph.completion.message.is_empty() {
            graph.message(MessageKey::Completed).to_string()
        } else {
            let resolved = template::resolve(&graph.completion.message, None, session);
            if !resolved.is_complete() {
                warn!(
                    participant = %participant,
                    unresolved = ?resolved.unresolved,
                    "Completion message left tokens unresolved"
                );
            }
            resolved.text
        };
        self.send(&session.channel, &message).await;

        if let Some(role) = &self.tenant.registration_role {
            if let Err(e) = self.platform.remove_role(&participant, role).await {
                warn!(participant = %participant, role = %role, error = %e, "Failed to remove registration role");
            }
        }

        info!(
            participant = %participant,
            session_id = %session.session_id,
            answers = session.answers.len(),
            "Interview completed"
        );

        self.scheduler
            .schedule(participant.clone(), session.session_id, session.channel.clone());
        // An abort that removed the session before the purge was registered
        // could not cancel it.
        if !self.is_current(session).await {
            self.scheduler.cancel_session(&participant, session.session_id);
        }
        Some(report)
    }

    /// Cancel a participant's interview and delete its channel. Safe to call
    /// repeatedly and at any point, including during the grace window.
    pub async fn abort(&self, participant: &ParticipantId) -> AbortOutcome {
        // Remove before cancelling: a completion that still sees the session
        // registers its purge before this cancel runs.
        let removed = self.store.remove(participant).await;
        self.scheduler.cancel(participant);

        let Some(mut session) = removed else {
            return AbortOutcome::NotFound;
        };
        if session.phase == SessionPhase::InProgress {
            if let Err(e) = session.transition_to(SessionPhase::Aborted) {
                warn!(participant = %participant, error = %e, "Unexpected phase at abort");
            }
        }

        if let Err(e) = self.platform.delete_channel(&session.channel).await {
            warn!(participant = %participant, channel = %session.channel, error = %e, "Failed to delete private channel");
        }

        info!(participant = %participant, session_id = %session.session_id, phase = %session.phase, "Interview aborted");
        AbortOutcome::Aborted {
            session_id: session.session_id,
        }
    }

    /// Whether the store still holds this session.
    async fn is_current(&self, session: &Session) -> bool {
        self.store
            .get(&session.participant)
            .await
            .is_some_and(|current| current.session_id == session.session_id)
    }

    async fn persist_data(&self, session: &Session, before: &BTreeMap<String, serde_json::Value>) {
        if &session.data_store == before {
            return;
        }
        if !self
            .store
            .merge_data(&session.participant, session.session_id, session.data_store.clone())
            .await
        {
            warn!(participant = %session.participant, "Session gone before saved answers could be stored");
        }
    }

    async fn configuration_failure(&self, session: &Session, err: InterviewError) -> InterviewError {
        error!(
            participant = %session.participant,
            question = %session.current_question_id,
            error = %err,
            "Interview graph is misconfigured"
        );
        self.send(&session.channel, session.graph.message(MessageKey::ConfigurationError))
            .await;
        err
    }

    async fn discard_channel(&self, participant: &ParticipantId, channel: &ChannelRef) {
        if let Err(e) = self.platform.delete_channel(channel).await {
            warn!(participant = %participant, channel = %channel, error = %e, "Failed to delete unused channel");
        }
    }

    async fn send(&self, channel: &ChannelRef, text: &str) {
        if let Err(e) = self.platform.send_message(channel, text).await {
            warn!(channel = %channel, error = %e, "Failed to send message");
        }
    }
}
