//! Interview session state: one live session per participant.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::graph::{ChoiceOption, Question, QuestionGraph};
use crate::platform::{ChannelRef, ParticipantId};

/// Lifecycle of an interview.
///
/// NotStarted → InProgress → Completed → Purged, with Aborted reachable
/// directly from InProgress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Aborted,
    Purged,
}

impl SessionPhase {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, target),
            (NotStarted, InProgress)
                | (InProgress, Completed)
                | (InProgress, Aborted)
                | (Completed, Purged)
        )
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Purged => "purged",
        };
        write!(f, "{s}")
    }
}

/// A recorded answer to one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: String,
    pub raw_value: String,
    /// The matched option, for choice questions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_option: Option<ChoiceOption>,
}

impl Answer {
    /// Build the answer for a question, resolving the selected option for
    /// choice types.
    pub fn for_question(question: &Question, raw_value: &str) -> Self {
        let selected_option = question
            .kind
            .options()
            .iter()
            .find(|o| o.id == raw_value)
            .cloned();
        Self {
            question_id: question.id.clone(),
            raw_value: raw_value.to_string(),
            selected_option,
        }
    }
}

/// Live interview state for one participant.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: Uuid,
    pub participant: ParticipantId,
    pub channel: ChannelRef,
    /// The graph version this session started against.
    pub graph: Arc<QuestionGraph>,
    pub current_question_id: String,
    pub answers: HashMap<String, Answer>,
    /// Values written by `save_answer` actions with permanent storage.
    pub data_store: BTreeMap<String, serde_json::Value>,
    pub started_at: DateTime<Utc>,
    pub phase: SessionPhase,
    /// Bumped by the store on every successful replace.
    pub revision: u64,
    pub last_message_id: Option<String>,
}

impl Session {
    /// Create a session positioned at the graph's first question.
    /// Returns `None` for a graph without questions.
    pub fn start(
        participant: ParticipantId,
        channel: ChannelRef,
        graph: Arc<QuestionGraph>,
    ) -> Option<Self> {
        let first = graph.first_question()?.id.clone();
        Some(Self {
            session_id: Uuid::new_v4(),
            participant,
            channel,
            graph,
            current_question_id: first,
            answers: HashMap::new(),
            data_store: BTreeMap::new(),
            started_at: Utc::now(),
            phase: SessionPhase::InProgress,
            revision: 0,
            last_message_id: None,
        })
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.graph.question(&self.current_question_id)
    }

    pub fn answer(&self, question_id: &str) -> Option<&Answer> {
        self.answers.get(question_id)
    }

    pub fn record(&mut self, answer: Answer) {
        self.answers.insert(answer.question_id.clone(), answer);
    }

    /// Move to another phase. Returns an error for transitions the
    /// lifecycle does not allow.
    pub fn transition_to(&mut self, target: SessionPhase) -> Result<(), String> {
        if !self.phase.can_transition_to(target) {
            return Err(format!("Cannot transition from {} to {}", self.phase, target));
        }
        self.phase = target;
        Ok(())
    }

    /// String value stored under `key`, if the stored value is a string.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data_store.get(key).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> Arc<QuestionGraph> {
        Arc::new(
            QuestionGraph::from_json(
                r#"{ "version": 1, "questions": [
                    { "id": "second", "order": 2, "type": "text_input", "text": "B" },
                    { "id": "first", "order": 1, "type": "single_choice", "text": "A",
                      "options": [ { "id": "1", "text": "One", "role_ref": "r1" } ] }
                ] }"#,
            )
            .unwrap(),
        )
    }

    #[test]
    fn valid_transitions() {
        use SessionPhase::*;
        for (from, to) in [
            (NotStarted, InProgress),
            (InProgress, Completed),
            (InProgress, Aborted),
            (Completed, Purged),
        ] {
            assert!(from.can_transition_to(to), "{from} should transition to {to}");
        }
    }

    #[test]
    fn invalid_transitions() {
        use SessionPhase::*;
        assert!(!NotStarted.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(InProgress));
        assert!(!Completed.can_transition_to(Aborted));
        assert!(!Aborted.can_transition_to(InProgress));
        assert!(!Purged.can_transition_to(NotStarted));
        assert!(!InProgress.can_transition_to(InProgress));
    }

    #[test]
    fn display_matches_serde() {
        use SessionPhase::*;
        for phase in [NotStarted, InProgress, Completed, Aborted, Purged] {
            let json = serde_json::to_string(&phase).unwrap();
            assert_eq!(format!("\"{phase}\""), json);
        }
    }

    #[test]
    fn starts_at_lowest_order() {
        let session = Session::start("p1".into(), "c1".into(), graph()).unwrap();
        assert_eq!(session.current_question_id, "first");
        assert_eq!(session.phase, SessionPhase::InProgress);
        assert_eq!(session.revision, 0);
        assert!(session.answers.is_empty());
    }

    #[test]
    fn answer_resolves_selected_option() {
        let graph = graph();
        let question = graph.question("first").unwrap();
        let answer = Answer::for_question(question, "1");
        assert_eq!(
            answer.selected_option.as_ref().and_then(|o| o.role_ref.as_deref()),
            Some("r1")
        );

        let text = graph.question("second").unwrap();
        assert!(Answer::for_question(text, "1").selected_option.is_none());
    }

    #[test]
    fn transition_rejects_illegal_moves() {
        let mut session = Session::start("p1".into(), "c1".into(), graph()).unwrap();
        session.transition_to(SessionPhase::Completed).unwrap();
        assert!(session.transition_to(SessionPhase::Aborted).is_err());
        assert_eq!(session.phase, SessionPhase::Completed);
    }
}
