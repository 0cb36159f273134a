//! Per-question-type answer acceptance rules.

use std::sync::Arc;

use regex::Regex;
use tracing::warn;

use super::model::{MessageKey, NumberValidation, Question, QuestionGraph, QuestionKind, TextValidation};

/// Why an answer was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Required,
    InvalidChoice { choices: Vec<String> },
    TooShort { min: usize },
    TooLong { max: usize },
    NotANumber,
    OutOfRange { min: Option<i64>, max: Option<i64> },
    PatternMismatch,
}

impl Rejection {
    fn key(&self) -> MessageKey {
        match self {
            Self::Required => MessageKey::Required,
            Self::InvalidChoice { .. } => MessageKey::InvalidChoice,
            Self::TooShort { .. } => MessageKey::TooShort,
            Self::TooLong { .. } => MessageKey::TooLong,
            Self::NotANumber => MessageKey::NotANumber,
            Self::OutOfRange { .. } => MessageKey::OutOfRange,
            Self::PatternMismatch => MessageKey::PatternMismatch,
        }
    }

    /// Re-prompt text, using the graph's override for the base sentence and
    /// appending the concrete bounds or choices.
    pub fn message(&self, graph: &QuestionGraph) -> String {
        let base = graph.message(self.key());
        match self {
            Self::InvalidChoice { choices } => {
                let listed: Vec<String> = choices.iter().map(|c| format!("`{c}`")).collect();
                format!("{base} {}", listed.join(", "))
            }
            Self::TooShort { min } => format!("{base} (minimum {min} characters)"),
            Self::TooLong { max } => format!("{base} (maximum {max} characters)"),
            Self::OutOfRange { min, max } => match (min, max) {
                (Some(min), Some(max)) => format!("{base} ({min}–{max})"),
                (Some(min), None) => format!("{base} (at least {min})"),
                (None, Some(max)) => format!("{base} (at most {max})"),
                (None, None) => base.to_string(),
            },
            _ => base.to_string(),
        }
    }
}

/// Decides whether an answer matches a `regex` declared in a text question.
///
/// The dialect is up to the implementation; the default does not enforce
/// patterns at all.
pub trait PatternMatcher: Send + Sync {
    fn matches(&self, pattern: &str, input: &str) -> bool;
}

/// Accepts every answer regardless of the declared pattern.
pub struct UnenforcedPattern;

impl PatternMatcher for UnenforcedPattern {
    fn matches(&self, _pattern: &str, _input: &str) -> bool {
        true
    }
}

/// Enforces patterns with the `regex` crate's syntax. Patterns that do not
/// compile are logged and accepted.
pub struct RegexPattern;

impl PatternMatcher for RegexPattern {
    fn matches(&self, pattern: &str, input: &str) -> bool {
        match Regex::new(pattern) {
            Ok(re) => re.is_match(input),
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Ignoring invalid answer pattern");
                true
            }
        }
    }
}

/// Answer validator.
#[derive(Clone)]
pub struct Validator {
    patterns: Arc<dyn PatternMatcher>,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            patterns: Arc::new(UnenforcedPattern),
        }
    }
}

impl Validator {
    pub fn new(patterns: Arc<dyn PatternMatcher>) -> Self {
        Self { patterns }
    }

    pub fn validate(&self, question: &Question, raw: &str) -> bool {
        self.check(question, raw).is_ok()
    }

    /// Check an answer against the question's rules.
    pub fn check(&self, question: &Question, raw: &str) -> Result<(), Rejection> {
        if question.is_required() && raw.is_empty() {
            return Err(Rejection::Required);
        }

        match &question.kind {
            QuestionKind::SingleChoice { options } | QuestionKind::MultipleChoice { options } => {
                if options.iter().any(|o| o.id == raw) {
                    Ok(())
                } else {
                    Err(Rejection::InvalidChoice {
                        choices: options.iter().map(|o| o.id.clone()).collect(),
                    })
                }
            }
            QuestionKind::TextInput { validation } => match validation {
                Some(rules) => self.check_text(rules, raw),
                None => Ok(()),
            },
            QuestionKind::NumberInput { validation } => {
                check_number(validation.as_ref(), raw)
            }
            QuestionKind::Unrecognized { .. } => Ok(()),
        }
    }

    fn check_text(&self, rules: &TextValidation, raw: &str) -> Result<(), Rejection> {
        let len = raw.chars().count();

        if let Some(min) = rules.min_length.filter(|&m| m > 0) {
            if len < min {
                return Err(Rejection::TooShort { min });
            }
        }
        if let Some(max) = rules.max_length.filter(|&m| m > 0) {
            if len > max {
                return Err(Rejection::TooLong { max });
            }
        }
        if let Some(pattern) = rules.regex.as_deref().filter(|p| !p.is_empty()) {
            if !self.patterns.matches(pattern, raw) {
                return Err(Rejection::PatternMismatch);
            }
        }
        Ok(())
    }
}

fn check_number(rules: Option<&NumberValidation>, raw: &str) -> Result<(), Rejection> {
    let value: i64 = raw.parse().map_err(|_| Rejection::NotANumber)?;

    let Some(rules) = rules else {
        return Ok(());
    };
    let min = rules.min_value.filter(|&v| v != 0);
    let max = rules.max_value.filter(|&v| v != 0);

    let below = min.is_some_and(|m| value < m);
    let above = max.is_some_and(|m| value > m);
    if below || above {
        return Err(Rejection::OutOfRange { min, max });
    }
    Ok(())
}

/// Validate with the default validator (patterns not enforced).
pub fn validate(question: &Question, raw: &str) -> bool {
    Validator::default().validate(question, raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::model::{ChoiceOption, NextStep};

    fn question(kind: QuestionKind, required: bool) -> Question {
        Question {
            id: "q".into(),
            order: 1,
            kind,
            required: Some(required),
            text: "?".into(),
            actions: vec![],
            next: Some(NextStep::End),
        }
    }

    fn choice(ids: &[&str]) -> QuestionKind {
        QuestionKind::SingleChoice {
            options: ids
                .iter()
                .map(|id| ChoiceOption {
                    id: id.to_string(),
                    text: format!("option {id}"),
                    role_ref: None,
                })
                .collect(),
        }
    }

    fn number(min: i64, max: i64) -> QuestionKind {
        QuestionKind::NumberInput {
            validation: Some(NumberValidation {
                min_value: Some(min),
                max_value: Some(max),
            }),
        }
    }

    fn text(min: Option<usize>, max: Option<usize>, regex: Option<&str>) -> QuestionKind {
        QuestionKind::TextInput {
            validation: Some(TextValidation {
                min_length: min,
                max_length: max,
                regex: regex.map(String::from),
            }),
        }
    }

    #[test]
    fn single_choice_accepts_only_option_ids() {
        let q = question(choice(&["1", "2"]), true);
        assert!(validate(&q, "1"));
        assert!(validate(&q, "2"));
        assert!(!validate(&q, "3"));
        assert!(!validate(&q, "option 1"));
        assert!(!validate(&q, ""));
    }

    #[test]
    fn multiple_choice_uses_same_rule() {
        let q = question(
            QuestionKind::MultipleChoice {
                options: vec![ChoiceOption {
                    id: "a".into(),
                    text: "A".into(),
                    role_ref: None,
                }],
            },
            false,
        );
        assert!(validate(&q, "a"));
        assert!(!validate(&q, "b"));
    }

    #[test]
    fn number_bounds() {
        let q = question(number(1, 5), true);
        assert!(!validate(&q, "0"));
        assert!(!validate(&q, "6"));
        assert!(validate(&q, "3"));
        assert!(!validate(&q, "abc"));
        assert!(validate(&q, "1"));
        assert!(validate(&q, "5"));
    }

    #[test]
    fn zero_number_bounds_are_unset() {
        let q = question(number(0, 0), true);
        assert!(validate(&q, "-500"));
        assert!(validate(&q, "99999"));
        assert!(!validate(&q, "1.5"));
    }

    #[test]
    fn number_without_validation_still_parses() {
        let q = question(QuestionKind::NumberInput { validation: None }, false);
        assert!(validate(&q, "42"));
        assert!(!validate(&q, "forty-two"));
    }

    #[test]
    fn required_rejects_empty() {
        let q = question(QuestionKind::TextInput { validation: None }, true);
        assert_eq!(Validator::default().check(&q, ""), Err(Rejection::Required));
        let optional = question(QuestionKind::TextInput { validation: None }, false);
        assert!(validate(&optional, ""));
    }

    #[test]
    fn text_length_bounds_count_characters() {
        let q = question(text(Some(2), Some(4), None), true);
        assert!(!validate(&q, "a"));
        assert!(validate(&q, "ab"));
        assert!(validate(&q, "абвг"));
        assert!(!validate(&q, "abcde"));
    }

    #[test]
    fn regex_is_not_enforced_by_default() {
        let q = question(text(None, None, Some(r"^\d+$")), true);
        assert!(validate(&q, "letters"));
    }

    #[test]
    fn regex_pattern_matcher_enforces() {
        let q = question(text(None, None, Some(r"^\d+$")), true);
        let validator = Validator::new(Arc::new(RegexPattern));
        assert!(validator.validate(&q, "123"));
        assert_eq!(validator.check(&q, "abc"), Err(Rejection::PatternMismatch));
    }

    #[test]
    fn invalid_regex_fails_open() {
        let q = question(text(None, None, Some("(unclosed")), true);
        let validator = Validator::new(Arc::new(RegexPattern));
        assert!(validator.validate(&q, "anything"));
    }

    #[test]
    fn unrecognized_type_accepts() {
        let q = question(
            QuestionKind::Unrecognized {
                kind: "date_picker".into(),
                fields: Default::default(),
            },
            false,
        );
        assert!(validate(&q, "whatever"));
    }

    #[test]
    fn rejection_messages() {
        let graph = QuestionGraph {
            version: 1,
            questions: vec![],
            completion: Default::default(),
            messages: Default::default(),
        };
        let msg = Rejection::InvalidChoice {
            choices: vec!["1".into(), "2".into()],
        }
        .message(&graph);
        assert_eq!(msg, "Please choose one of the listed options: `1`, `2`");

        let msg = Rejection::OutOfRange {
            min: Some(1),
            max: Some(5),
        }
        .message(&graph);
        assert!(msg.ends_with("(1–5)"));
    }
}
