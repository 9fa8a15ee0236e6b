use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use crate::identity::PreviewKey;

/// Minimum Jaro-Winkler score to consider a template variable a close match.
const TEMPLATE_SUGGESTION_THRESHOLD: f64 = 0.8;

/// Names a manifest env template may reference.
pub const TEMPLATE_VARIABLES: &[&str] = &["project", "session", "service", "port"];

/// Compiled pattern matching `{{ name }}` template expressions.
static TEMPLATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([\w.]+)\s*\}\}").expect("template regex must compile"));

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TemplateError {
    #[error("unresolved variable '{{{{{{ {variable} }}}}}}' in {field}{}", suggestion.as_ref().map(|s| format!(" (did you mean `{}`?)", s)).unwrap_or_default())]
    UnresolvedVariable {
        field: String,
        variable: String,
        suggestion: Option<String>,
    },
}

/// Find the closest known template variable using Jaro-Winkler similarity.
fn find_closest_template_var<'a, I>(name: &str, known: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(&str, f64)> = None;
    for key in known {
        let score = strsim::jaro_winkler(name, key);
        if score >= TEMPLATE_SUGGESTION_THRESHOLD && best.is_none_or(|(_, s)| score > s) {
            best = Some((key, score));
        }
    }
    best.map(|(name, _)| name)
}

/// Report every `{{ var }}` in `input` that is not one of `known`.
pub fn check_template(input: &str, known: &[&str], field_context: &str) -> Vec<TemplateError> {
    TEMPLATE_RE
        .captures_iter(input)
        .filter_map(|cap| {
            let variable = cap[1].to_string();
            if known.contains(&variable.as_str()) {
                None
            } else {
                let suggestion =
                    find_closest_template_var(&variable, known.iter().copied()).map(String::from);
                Some(TemplateError::UnresolvedVariable {
                    field: field_context.to_string(),
                    variable,
                    suggestion,
                })
            }
        })
        .collect()
}

/// Resolve all `{{ var }}` expressions in `input` using `vars`.
///
/// Two-pass approach:
///   1. Validate that every referenced variable exists in `vars`.
///   2. Replace all references with their values.
pub fn resolve_template(
    input: &str,
    vars: &HashMap<String, String>,
    field_context: &str,
) -> Result<String, Vec<TemplateError>> {
    let known: Vec<&str> = vars.keys().map(String::as_str).collect();
    let errors = check_template(input, &known, field_context);
    if !errors.is_empty() {
        return Err(errors);
    }

    let resolved = TEMPLATE_RE
        .replace_all(input, |cap: &regex::Captures| {
            let key = &cap[1];
            vars.get(key).cloned().unwrap_or_default()
        })
        .into_owned();

    Ok(resolved)
}

/// Build the lookup table for one service's env templates.
pub fn build_template_vars(key: &PreviewKey, service: &str, port: u16) -> HashMap<String, String> {
    HashMap::from([
        ("project".to_string(), key.project_id.clone()),
        ("session".to_string(), key.session_id.clone()),
        ("service".to_string(), service.to_string()),
        ("port".to_string(), port.to_string()),
    ])
}

/// Resolve every value of a service's static env. All errors are collected.
pub fn resolve_env_templates(
    service: &str,
    env: &BTreeMap<String, String>,
    vars: &HashMap<String, String>,
) -> Result<BTreeMap<String, String>, Vec<TemplateError>> {
    let mut resolved = BTreeMap::new();
    let mut all_errors = Vec::new();
    for (name, value) in env {
        let field_context = format!("services.{service}.env.{name}");
        match resolve_template(value, vars, &field_context) {
            Ok(v) => {
                resolved.insert(name.clone(), v);
            }
            Err(mut errs) => all_errors.append(&mut errs),
        }
    }
    if all_errors.is_empty() {
        Ok(resolved)
    } else {
        Err(all_errors)
    }
}
