//! Literal `{{ key }}` template rendering against the environment model.
//!
//! Rendering is a pure function of the template and the model: the same
//! inputs always produce byte-identical output, which is what lets file
//! probes compare rendered content against what is on disk.
use std::collections::BTreeSet;

use crate::error::RenderError;
use crate::model::EnvironmentModel;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// A named template body with its set of required model keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    name: String,
    body: String,
    required_keys: BTreeSet<String>,
}

impl Template {
    /// Create a template.  Every placeholder in `body` is required in
    /// addition to the explicitly declared `extra_keys`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        body: impl Into<String>,
        extra_keys: impl IntoIterator<Item = String>,
    ) -> Self {
        let body = body.into();
        let mut required_keys: BTreeSet<String> = placeholders(&body).into_iter().collect();
        required_keys.extend(extra_keys);
        Self {
            name: name.into(),
            body,
            required_keys,
        }
    }

    /// Template name, used in error messages.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Keys that must be present in the model for rendering to succeed.
    #[must_use]
    pub const fn required_keys(&self) -> &BTreeSet<String> {
        &self.required_keys
    }

    /// Required keys absent from `model`, in sorted order.
    #[must_use]
    pub fn missing_keys(&self, model: &EnvironmentModel) -> Vec<String> {
        self.required_keys
            .iter()
            .filter(|k| !model.contains(k))
            .cloned()
            .collect()
    }
}

/// Extract placeholder keys from `body` in order of first appearance.
///
/// An opening `{{` without a matching `}}` is not a placeholder.
#[must_use]
pub fn placeholders(body: &str) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find(OPEN) {
        let after = &rest[start + OPEN.len()..];
        let Some(end) = after.find(CLOSE) else {
            break;
        };
        let key = after[..end].trim();
        if !key.is_empty() && !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
        }
        rest = &after[end + CLOSE.len()..];
    }
    keys
}

/// Render `template` by substituting each `{{ key }}` with its model value.
///
/// # Errors
///
/// Returns [`RenderError::MissingKey`] for the first (sorted) required key
/// absent from `model`.  Nothing is rendered in that case.
pub fn render(template: &Template, model: &EnvironmentModel) -> Result<String, RenderError> {
    if let Some(key) = template.missing_keys(model).into_iter().next() {
        return Err(RenderError::MissingKey {
            template: template.name.clone(),
            key,
        });
    }

    let mut out = String::with_capacity(template.body.len());
    let mut rest = template.body.as_str();
    while let Some(start) = rest.find(OPEN) {
        let after = &rest[start + OPEN.len()..];
        let Some(end) = after.find(CLOSE) else {
            break;
        };
        out.push_str(&rest[..start]);
        let key = after[..end].trim();
        match model.get(key) {
            Some(value) => out.push_str(value),
            // Empty `{{}}` is left as written.
            None => out.push_str(&rest[start..start + OPEN.len() + end + CLOSE.len()]),
        }
        rest = &after[end + CLOSE.len()..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn model() -> EnvironmentModel {
        let mut m = EnvironmentModel::new();
        m.set("identity.name", "Ada Lovelace");
        m.set("identity.email", "ada@example.com");
        m
    }

    #[test]
    fn placeholders_are_collected_once() {
        let keys = placeholders("{{ a }} {{b}} {{ a }}");
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn unterminated_open_is_not_a_placeholder() {
        assert!(placeholders("echo {{ oops").is_empty());
    }

    #[test]
    fn renders_literal_substitution() {
        let t = Template::new(
            "gitconfig",
            "[user]\n\tname = {{ identity.name }}\n\temail = {{identity.email}}\n",
            [],
        );
        let out = render(&t, &model()).unwrap();
        assert_eq!(
            out,
            "[user]\n\tname = Ada Lovelace\n\temail = ada@example.com\n"
        );
    }

    #[test]
    fn values_are_not_re_expanded() {
        let mut m = EnvironmentModel::new();
        m.set("x", "{{ y }}");
        m.set("y", "boom");
        let out = render(&Template::new("t", "{{ x }}", []), &m).unwrap();
        assert_eq!(out, "{{ y }}");
    }

    #[test]
    fn missing_placeholder_key_fails() {
        let t = Template::new("gitconfig", "{{ identity.signingkey }}", []);
        let err = render(&t, &model()).unwrap_err();
        assert_eq!(
            err,
            RenderError::MissingKey {
                template: "gitconfig".into(),
                key: "identity.signingkey".into()
            }
        );
    }

    #[test]
    fn declared_extra_key_is_required() {
        let t = Template::new("motd", "static body", ["host.name".to_string()]);
        assert!(render(&t, &model()).is_err());
        assert_eq!(t.missing_keys(&model()), vec!["host.name"]);
    }

    #[test]
    fn rendering_is_deterministic() {
        let t = Template::new("t", "{{ identity.email }}-{{ identity.name }}", []);
        let a = render(&t, &model()).unwrap();
        let b = render(&t, &model()).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn unterminated_tail_is_kept_verbatim() {
        let t = Template::new("t", "hi {{ identity.name }} {{ tail", []);
        assert_eq!(render(&t, &model()).unwrap(), "hi Ada Lovelace {{ tail");
    }
}
