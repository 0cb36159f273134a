//! Question graph: the declarative interview definition.
//!
//! A graph is loaded once per tenant and version, checked for structural
//! defects, and shared read-only by every session that starts against it.

pub mod catalog;
pub mod model;
pub mod validation;

pub use catalog::GraphCatalog;
pub use model::{
    Action, ActionKind, ChoiceOption, Completion, Condition, ConditionOperator, MessageKey,
    NextStep, NumberValidation, Question, QuestionGraph, QuestionKind, Storage, TextValidation,
};
pub use validation::{PatternMatcher, RegexPattern, Rejection, UnenforcedPattern, Validator};
