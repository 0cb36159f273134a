//! Action executor: runs a question's (or the completion block's) actions
//! against the platform as a best-effort batch.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::session::{Answer, Session};
use super::template::{self, Resolved};
use crate::error::CapabilityError;
use crate::graph::{Action, ActionKind, Storage};
use crate::platform::{ParticipantId, Platform};

/// What happened while running one batch of actions.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ActionReport {
    pub applied: usize,
    /// Actions that resolved to nothing to do.
    pub skipped: usize,
    pub failures: Vec<CapabilityError>,
    /// Template tokens that could not be filled, across the whole batch.
    pub unresolved: Vec<String>,
}

/// Executes declared actions through the platform capability interface.
pub struct ActionExecutor {
    platform: Arc<dyn Platform>,
}

impl ActionExecutor {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }

    /// Run `actions` in order for the answer just given.
    ///
    /// A failing capability call is logged and recorded, and the remaining
    /// actions still run. `save_answer` with session storage writes to a
    /// scratch map that only this batch can see.
    pub async fn execute(
        &self,
        participant: &ParticipantId,
        actions: &[Action],
        answer: Option<&Answer>,
        session: &mut Session,
    ) -> ActionReport {
        let mut report = ActionReport::default();
        let mut scratch: HashMap<String, String> = HashMap::new();

        for action in actions {
            match &action.kind {
                ActionKind::AssignRole { role_ref } => {
                    let resolved = resolve(role_ref, answer, session, &scratch, &mut report);
                    let role = resolved.text.trim();
                    if role.is_empty() || !resolved.is_complete() {
                        debug!(participant = %participant, template = %role_ref, "Nothing to grant");
                        report.skipped += 1;
                        continue;
                    }
                    match self.platform.grant_role(participant, role).await {
                        Ok(()) => {
                            info!(participant = %participant, role = %role, "Role assigned");
                            report.applied += 1;
                        }
                        Err(e) => self.record_failure(participant, action, e, &mut report),
                    }
                }
                ActionKind::SaveAnswer {
                    field,
                    storage,
                    value_template,
                } => {
                    let template = value_template.as_deref().unwrap_or("@input");
                    let value = resolve(template, answer, session, &scratch, &mut report).text;
                    let storage = storage.unwrap_or_default();
                    match storage {
                        Storage::Permanent => {
                            session
                                .data_store
                                .insert(field.clone(), serde_json::Value::String(value));
                        }
                        Storage::Session => {
                            scratch.insert(field.clone(), value);
                        }
                    }
                    debug!(participant = %participant, field = %field, storage = ?storage, "Answer saved");
                    report.applied += 1;
                }
                ActionKind::ChangeNickname { format_template } => {
                    let name = resolve(format_template, answer, session, &scratch, &mut report).text;
                    match self.platform.set_display_name(participant, &name).await {
                        Ok(()) => {
                            info!(participant = %participant, name = %name, "Display name changed");
                            report.applied += 1;
                        }
                        Err(e) => self.record_failure(participant, action, e, &mut report),
                    }
                }
            }
        }

        report
    }

    /// Run the completion actions. No answer is in scope, so `@selected.*`
    /// and `@input` tokens stay unresolved.
    pub async fn execute_completion(
        &self,
        participant: &ParticipantId,
        actions: &[Action],
        session: &mut Session,
    ) -> ActionReport {
        self.execute(participant, actions, None, session).await
    }

    fn record_failure(
        &self,
        participant: &ParticipantId,
        action: &Action,
        error: CapabilityError,
        report: &mut ActionReport,
    ) {
        warn!(
            participant = %participant,
            action = action.kind.label(),
            error = %error,
            "Action failed, continuing with the rest of the batch"
        );
        report.failures.push(error);
    }
}

/// Resolve a template with batch scratch values layered over the session's
/// data store.
fn resolve(
    template: &str,
    answer: Option<&Answer>,
    session: &Session,
    scratch: &HashMap<String, String>,
    report: &mut ActionReport,
) -> Resolved {
    let resolved = template::resolve_with(template, answer, |key| {
        scratch
            .get(key)
            .map(String::as_str)
            .or_else(|| session.data_str(key))
    });
    if !resolved.is_complete() {
        warn!(
            participant = %session.participant,
            template = %template,
            unresolved = ?resolved.unresolved,
            "Template left tokens unresolved"
        );
        report.unresolved.extend(resolved.unresolved.iter().cloned());
    }
    resolved
}
