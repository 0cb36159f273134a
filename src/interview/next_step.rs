//! Next-step resolver: picks the question that follows an answered one.

use tracing::{debug, warn};

use super::session::Session;
use crate::error::InterviewError;
use crate::graph::{NextStep, Question};

/// Where the interview goes after a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Question(String),
    End,
}

/// Resolve the next step for `question` given the session's answers.
///
/// Conditions are evaluated in declared order and the first match wins.
/// A conditional step with no match and no usable default is a
/// configuration defect and is returned as an error rather than treated as
/// the end of the interview.
pub fn next_question(question: &Question, session: &Session) -> Result<Destination, InterviewError> {
    match question.next_step() {
        NextStep::Static { target_id } => Ok(Destination::Question(target_id.clone())),
        NextStep::Conditional {
            conditions,
            default,
        } => {
            for condition in conditions {
                let answer = session
                    .answer(&condition.field)
                    .map(|a| a.raw_value.as_str())
                    .unwrap_or("");
                if condition.operator.apply(answer, &condition.value) {
                    debug!(
                        question = %question.id,
                        field = %condition.field,
                        target = %condition.target_id,
                        "Condition matched"
                    );
                    return Ok(Destination::Question(condition.target_id.clone()));
                }
            }

            match default.as_deref() {
                Some(target) if !target.is_empty() => Ok(Destination::Question(target.to_string())),
                _ => Err(InterviewError::UnreachableNextStep {
                    question_id: question.id.clone(),
                }),
            }
        }
        NextStep::End => Ok(Destination::End),
        NextStep::Unrecognized { kind, .. } => {
            warn!(question = %question.id, kind = %kind, "Unrecognized next step type, ending interview");
            Ok(Destination::End)
        }
    }
}
