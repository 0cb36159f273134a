//! Question graph document: the declarative interview definition for one
//! tenant.
//!
//! The document is JSON. Discriminants are tagged enums on `"type"`.
//! Fields left out of the document stay `None`, and type or operator names
//! this build does not know are kept verbatim, so a loaded graph serializes
//! back to the same shape.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::GraphError;

/// A versioned set of questions plus the completion path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionGraph {
    pub version: u32,
    pub questions: Vec<Question>,
    #[serde(default, skip_serializing_if = "Completion::is_empty")]
    pub completion: Completion,
    /// Overrides for the user-facing re-prompt texts.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub messages: BTreeMap<MessageKey, String>,
}

/// One interview question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub order: i32,
    #[serde(flatten)]
    pub kind: QuestionKind,
    /// Not required when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
    /// Ends the interview when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<NextStep>,
}

static END_STEP: NextStep = NextStep::End;

/// Question type, carrying only the fields that type uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self", tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice {
        options: Vec<ChoiceOption>,
    },
    MultipleChoice {
        options: Vec<ChoiceOption>,
    },
    TextInput {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        validation: Option<TextValidation>,
    },
    NumberInput {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        validation: Option<NumberValidation>,
    },
    /// Any type this build does not know. Answers are accepted as-is.
    #[serde(skip)]
    Unrecognized {
        kind: String,
        fields: Map<String, Value>,
    },
}

const QUESTION_KINDS: &[&str] = &["single_choice", "multiple_choice", "text_input", "number_input"];

impl<'de> Deserialize<'de> for QuestionKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (kind, fields) = split_tag(deserializer)?;
        if QUESTION_KINDS.contains(&kind.as_str()) {
            QuestionKind::deserialize(join_tag(kind, fields)).map_err(D::Error::custom)
        } else {
            Ok(Self::Unrecognized { kind, fields })
        }
    }
}

impl Serialize for QuestionKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unrecognized { kind, fields } => serialize_tagged(kind, fields, serializer),
            known => QuestionKind::serialize(known, serializer),
        }
    }
}

impl QuestionKind {
    /// Options for choice questions, empty otherwise.
    pub fn options(&self) -> &[ChoiceOption] {
        match self {
            Self::SingleChoice { options } | Self::MultipleChoice { options } => options,
            _ => &[],
        }
    }
}

/// A selectable answer for a choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_ref: Option<String>,
}

/// Bounds for free-text answers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextValidation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Pattern the answer should match. Enforcement depends on the
    /// `PatternMatcher` the validator is built with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
}

/// Bounds for integer answers. A bound of zero is treated as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberValidation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<i64>,
}

/// A side effect attached to a question or to completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(flatten)]
    pub kind: ActionKind,
    /// Free-form adapter configuration, carried through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self { kind, config: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    AssignRole {
        role_ref: String,
    },
    SaveAnswer {
        field: String,
        /// Session storage when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        storage: Option<Storage>,
        /// Defaults to `@input` when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value_template: Option<String>,
    },
    ChangeNickname {
        format_template: String,
    },
}

impl ActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::AssignRole { .. } => "assign_role",
            Self::SaveAnswer { .. } => "save_answer",
            Self::ChangeNickname { .. } => "change_nickname",
        }
    }
}

/// Where a `save_answer` value lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Storage {
    /// Visible only to the remaining actions of the batch that wrote it.
    #[default]
    Session,
    /// Written to the session data store; visible to every later template.
    Permanent,
}

/// Transition rule evaluated after a question is answered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self", tag = "type", rename_all = "snake_case")]
pub enum NextStep {
    Static {
        target_id: String,
    },
    Conditional {
        #[serde(default)]
        conditions: Vec<Condition>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<String>,
    },
    #[default]
    End,
    #[serde(skip)]
    Unrecognized {
        kind: String,
        fields: Map<String, Value>,
    },
}

const NEXT_STEP_KINDS: &[&str] = &["static", "conditional", "end"];

impl<'de> Deserialize<'de> for NextStep {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (kind, fields) = split_tag(deserializer)?;
        if NEXT_STEP_KINDS.contains(&kind.as_str()) {
            NextStep::deserialize(join_tag(kind, fields)).map_err(D::Error::custom)
        } else {
            Ok(Self::Unrecognized { kind, fields })
        }
    }
}

impl Serialize for NextStep {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unrecognized { kind, fields } => serialize_tagged(kind, fields, serializer),
            known => NextStep::serialize(known, serializer),
        }
    }
}

/// Read a `"type"`-tagged object, returning the tag and the other fields.
fn split_tag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<(String, Map<String, Value>), D::Error> {
    let mut fields = Map::deserialize(deserializer)?;
    match fields.remove("type") {
        Some(Value::String(kind)) => Ok((kind, fields)),
        Some(other) => Err(D::Error::custom(format!("expected a string type tag, found {other}"))),
        None => Err(D::Error::missing_field("type")),
    }
}

fn join_tag(kind: String, mut fields: Map<String, Value>) -> Value {
    fields.insert("type".to_string(), Value::String(kind));
    Value::Object(fields)
}

fn serialize_tagged<S: Serializer>(
    kind: &str,
    fields: &Map<String, Value>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(fields.len() + 1))?;
    map.serialize_entry("type", kind)?;
    for (key, value) in fields {
        map.serialize_entry(key, value)?;
    }
    map.end()
}

/// One branch of a conditional next step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Id of the question whose answer is tested.
    pub field: String,
    pub operator: ConditionOperator,
    pub value: String,
    pub target_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    /// Any operator name this build does not know. Never matches.
    Unsupported(String),
}

impl From<String> for ConditionOperator {
    fn from(name: String) -> Self {
        match name.as_str() {
            "equals" => Self::Equals,
            "not_equals" => Self::NotEquals,
            "contains" => Self::Contains,
            _ => Self::Unsupported(name),
        }
    }
}

impl From<ConditionOperator> for String {
    fn from(operator: ConditionOperator) -> Self {
        match operator {
            ConditionOperator::Equals => "equals".to_string(),
            ConditionOperator::NotEquals => "not_equals".to_string(),
            ConditionOperator::Contains => "contains".to_string(),
            ConditionOperator::Unsupported(name) => name,
        }
    }
}

impl ConditionOperator {
    /// Apply the operator to a stored answer and the condition's value.
    pub fn apply(&self, answer: &str, expected: &str) -> bool {
        match self {
            Self::Equals => answer == expected,
            Self::NotEquals => answer != expected,
            Self::Contains => answer.contains(expected),
            Self::Unsupported(_) => false,
        }
    }
}

/// What happens when the interview reaches its end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    /// Template resolved against the session data store.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
}

impl Completion {
    pub fn is_empty(&self) -> bool {
        self.message.is_empty() && self.actions.is_empty()
    }
}

/// User-facing texts a graph may override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKey {
    InvalidChoice,
    Required,
    TooShort,
    TooLong,
    NotANumber,
    OutOfRange,
    PatternMismatch,
    ConfigurationError,
    Completed,
}

impl MessageKey {
    pub fn default_text(&self) -> &'static str {
        match self {
            Self::InvalidChoice => "Please choose one of the listed options:",
            Self::Required => "An answer is required.",
            Self::TooShort => "That answer is too short.",
            Self::TooLong => "That answer is too long.",
            Self::NotANumber => "Please answer with a whole number.",
            Self::OutOfRange => "That number is outside the allowed range.",
            Self::PatternMismatch => "That answer is not in the expected format.",
            Self::ConfigurationError => {
                "Something is wrong with this interview's setup. An administrator needs to fix it before you can continue."
            }
            Self::Completed => "Registration complete!",
        }
    }
}

impl QuestionGraph {
    /// Parse a graph document and run structural checks.
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        let graph: QuestionGraph = serde_json::from_str(json)?;
        graph.check()?;
        Ok(graph)
    }

    pub fn to_json_pretty(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read and check a graph document from disk.
    pub async fn load(path: &Path) -> Result<Self, GraphError> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| GraphError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json(&json)
    }

    pub async fn save(&self, path: &Path) -> Result<(), GraphError> {
        let json = self.to_json_pretty()?;
        tokio::fs::write(path, json)
            .await
            .map_err(|source| GraphError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Structural checks. Duplicate ids and empty graphs are fatal; dangling
    /// targets and conditionals without a default are only logged, since
    /// they may never be reached.
    pub fn check(&self) -> Result<(), GraphError> {
        if self.questions.is_empty() {
            return Err(GraphError::Empty {
                version: self.version,
            });
        }

        let mut seen = HashSet::new();
        for question in &self.questions {
            if !seen.insert(question.id.as_str()) {
                return Err(GraphError::DuplicateQuestionId(question.id.clone()));
            }
        }

        for question in &self.questions {
            match question.next_step() {
                NextStep::Static { target_id } if !seen.contains(target_id.as_str()) => {
                    warn!(question = %question.id, target = %target_id, "Static next step targets unknown question");
                }
                NextStep::Conditional {
                    conditions,
                    default,
                } => {
                    for condition in conditions {
                        if !seen.contains(condition.target_id.as_str()) {
                            warn!(question = %question.id, target = %condition.target_id, "Condition targets unknown question");
                        }
                    }
                    match default.as_deref() {
                        None | Some("") => {
                            warn!(question = %question.id, "Conditional next step has no default");
                        }
                        Some(target) if !seen.contains(target) => {
                            warn!(question = %question.id, target = %target, "Conditional default targets unknown question");
                        }
                        Some(_) => {}
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// The entry question: smallest `order`, first declared on ties.
    pub fn first_question(&self) -> Option<&Question> {
        self.questions.iter().min_by_key(|q| q.order)
    }

    pub fn question(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    /// Text for a user-facing message, honoring graph overrides.
    pub fn message(&self, key: MessageKey) -> &str {
        self.messages
            .get(&key)
            .map(String::as_str)
            .unwrap_or_else(|| key.default_text())
    }

    /// Every literal role reference the graph can grant: option roles plus
    /// untemplated `assign_role` actions.
    pub fn grantable_roles(&self) -> BTreeSet<String> {
        fn literal(role: &str) -> bool {
            !role.is_empty() && !role.contains('@') && !role.contains('{')
        }

        let mut roles = BTreeSet::new();

        let actions = self
            .questions
            .iter()
            .flat_map(|q| q.actions.iter())
            .chain(self.completion.actions.iter());
        for action in actions {
            if let ActionKind::AssignRole { role_ref } = &action.kind {
                if literal(role_ref.as_str()) {
                    roles.insert(role_ref.clone());
                }
            }
        }

        for question in &self.questions {
            for option in question.kind.options() {
                if let Some(role) = option.role_ref.as_deref().filter(|r| literal(r)) {
                    roles.insert(role.to_string());
                }
            }
        }

        roles
    }
}

impl Question {
    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(false)
    }

    pub fn next_step(&self) -> &NextStep {
        self.next.as_ref().unwrap_or(&END_STEP)
    }

    /// Prompt text sent to the participant: the question, plus an
    /// enumerated option list for choice types in declaration order.
    pub fn prompt(&self) -> String {
        let options = self.kind.options();
        if options.is_empty() {
            return self.text.clone();
        }

        let mut prompt = format!("{}\n\n**Options:**", self.text);
        for option in options {
            prompt.push_str(&format!("\n`{}` - {}", option.id, option.text));
        }
        prompt
    }
}
