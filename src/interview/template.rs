//! Template resolver: literal token substitution for action parameters and
//! completion messages.
//!
//! Tokens:
//! - `@selected.id`, `@selected.role_id`, `@selected.text`: the chosen option
//! - `@input`: the raw answer
//! - `{key}`: a string value from the session data store
//!
//! Substitution is a single left-to-right pass, so substituted values are
//! never expanded again. Tokens that cannot be resolved stay in the output
//! verbatim and are reported in `Resolved::unresolved`.

use super::session::{Answer, Session};

const ANSWER_TOKENS: [&str; 4] = ["@selected.role_id", "@selected.id", "@selected.text", "@input"];

/// Output of a template resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub text: String,
    /// Tokens left verbatim because nothing could fill them.
    pub unresolved: Vec<String>,
}

impl Resolved {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Resolve a template against the current answer and the session's
/// permanent data store.
pub fn resolve(template: &str, answer: Option<&Answer>, session: &Session) -> Resolved {
    resolve_with(template, answer, |key| session.data_str(key))
}

/// Resolve a template with a custom `{key}` lookup.
pub fn resolve_with<'a, F>(template: &str, answer: Option<&Answer>, lookup: F) -> Resolved
where
    F: Fn(&str) -> Option<&'a str>,
{
    let mut text = String::with_capacity(template.len());
    let mut unresolved = Vec::new();
    let mut rest = template;

    while let Some(pos) = rest.find(['@', '{']) {
        text.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with('@') {
            match ANSWER_TOKENS.iter().find(|t| tail.starts_with(**t)) {
                Some(token) => {
                    match answer_value(token, answer) {
                        Some(value) => text.push_str(value),
                        None => {
                            text.push_str(token);
                            unresolved.push(token.to_string());
                        }
                    }
                    rest = &tail[token.len()..];
                }
                None => {
                    text.push('@');
                    rest = &tail[1..];
                }
            }
            continue;
        }

        // `{key}`: keys are non-empty and contain no braces or whitespace;
        // anything else is copied through as plain text.
        let Some(end) = tail[1..].find('}') else {
            text.push_str(tail);
            rest = "";
            break;
        };
        let key = &tail[1..=end];
        let is_key = !key.is_empty() && !key.contains('{') && !key.contains(char::is_whitespace);
        if !is_key {
            text.push('{');
            rest = &tail[1..];
            continue;
        }

        let token = &tail[..end + 2];
        match lookup(key) {
            Some(value) => text.push_str(value),
            None => {
                text.push_str(token);
                unresolved.push(token.to_string());
            }
        }
        rest = &tail[end + 2..];
    }
    text.push_str(rest);

    Resolved { text, unresolved }
}

fn answer_value<'a>(token: &str, answer: Option<&'a Answer>) -> Option<&'a str> {
    let answer = answer?;
    if token == "@input" {
        return Some(answer.raw_value.as_str());
    }

    let option = answer.selected_option.as_ref()?;
    match token {
        "@selected.id" => Some(option.id.as_str()),
        "@selected.text" => Some(option.text.as_str()),
        // An option without a role resolves to empty, which callers treat
        // as "nothing to grant".
        "@selected.role_id" => Some(option.role_ref.as_deref().unwrap_or("")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::*;
    use crate::graph::{ChoiceOption, QuestionGraph};

    fn session_with(data: &[(&str, serde_json::Value)]) -> Session {
        let graph = QuestionGraph::from_json(
            r#"{ "version": 1, "questions": [
                { "id": "q1", "order": 1, "type": "text_input", "text": "?" }
            ] }"#,
        )
        .unwrap();
        let mut session = Session::start("p1".into(), "c1".into(), Arc::new(graph)).unwrap();
        for (k, v) in data {
            session.data_store.insert(k.to_string(), v.clone());
        }
        session
    }

    fn choice_answer(role: Option<&str>) -> Answer {
        Answer {
            question_id: "q1".into(),
            raw_value: "2".into(),
            selected_option: Some(ChoiceOption {
                id: "2".into(),
                text: "Friend".into(),
                role_ref: role.map(String::from),
            }),
        }
    }

    #[test]
    fn data_store_substitution() {
        let session = session_with(&[("name", serde_json::json!("Ann"))]);
        let resolved = resolve("Welcome {name}", None, &session);
        assert_eq!(resolved.text, "Welcome Ann");
        assert!(resolved.is_complete());
    }

    #[test]
    fn selected_option_tokens() {
        let session = session_with(&[]);
        let answer = choice_answer(Some("role-friend"));
        let resolved = resolve(
            "@selected.id/@selected.text/@selected.role_id/@input",
            Some(&answer),
            &session,
        );
        assert_eq!(resolved.text, "2/Friend/role-friend/2");
    }

    #[test]
    fn missing_role_resolves_empty() {
        let session = session_with(&[]);
        let answer = choice_answer(None);
        assert_eq!(resolve("@selected.role_id", Some(&answer), &session).text, "");
    }

    #[test]
    fn selected_tokens_without_selection_stay_verbatim() {
        let session = session_with(&[]);
        let answer = Answer {
            question_id: "q1".into(),
            raw_value: "free text".into(),
            selected_option: None,
        };
        let resolved = resolve("@selected.text said @input", Some(&answer), &session);
        assert_eq!(resolved.text, "@selected.text said free text");
        assert_eq!(resolved.unresolved, vec!["@selected.text"]);
    }

    #[test]
    fn no_answer_leaves_answer_tokens() {
        let session = session_with(&[]);
        let resolved = resolve("@input and {missing}", None, &session);
        assert_eq!(resolved.text, "@input and {missing}");
        assert_eq!(resolved.unresolved, vec!["@input", "{missing}"]);
    }

    #[test]
    fn substitution_is_not_recursive() {
        let session = session_with(&[("name", serde_json::json!("{other}"))]);
        let answer = Answer {
            question_id: "q1".into(),
            raw_value: "{name} @input".into(),
            selected_option: None,
        };
        let resolved = resolve("[@input] [{name}]", Some(&answer), &session);
        assert_eq!(resolved.text, "[{name} @input] [{other}]");
        assert!(resolved.is_complete());
    }

    #[test]
    fn non_string_values_are_unresolved() {
        let session = session_with(&[("age", serde_json::json!(30))]);
        let resolved = resolve("Age {age}", None, &session);
        assert_eq!(resolved.text, "Age {age}");
        assert_eq!(resolved.unresolved, vec!["{age}"]);
    }

    #[test]
    fn plain_text_braces_and_at_signs_pass_through() {
        let session = session_with(&[]);
        let resolved = resolve("mail me @ home {not a key} {{x} {", None, &session);
        assert_eq!(resolved.text, "mail me @ home {not a key} {{x} {");
        assert_eq!(resolved.unresolved, vec!["{x}"]);
    }

    #[test]
    fn custom_lookup_overlays() {
        let scratch: HashMap<&str, &str> = HashMap::from([("tmp", "scratch")]);
        let resolved = resolve_with("{tmp}-{other}", None, |k| scratch.get(k).copied());
        assert_eq!(resolved.text, "scratch-{other}");
    }
}
