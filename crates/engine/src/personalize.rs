//! Template personalization — literal `{{token}}` substitution over a
//! contact record and a campaign-level variable map.
//!
//! Resolution precedence: contact field, then variable map, then literal
//! passthrough. Missing data never blocks a send; callers wanting strict
//! behavior lint with [`unresolved_tokens`] first.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use outreach_core::types::Contact;

/// Case-sensitive, alphanumeric/underscore identifiers only.
fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{([A-Za-z0-9_]+)\}\}").expect("token regex is valid"))
}

/// Replaces every `{{token}}` occurrence in `text`. Unresolvable tokens are
/// left verbatim in the output.
pub fn personalize(
    text: &str,
    contact: &Contact,
    variables: &HashMap<String, String>,
) -> String {
    token_re()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            contact
                .field(name)
                .or_else(|| variables.get(name).cloned())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Tokens in `text` that neither the contact nor the variable map resolve.
/// Used for pre-send linting when strict templates are enabled.
pub fn unresolved_tokens(
    text: &str,
    contact: &Contact,
    variables: &HashMap<String, String>,
) -> Vec<String> {
    let mut unresolved = Vec::new();
    for caps in token_re().captures_iter(text) {
        let name = &caps[1];
        if contact.field(name).is_none()
            && !variables.contains_key(name)
            && !unresolved.iter().any(|t| t == name)
        {
            unresolved.push(name.to_string());
        }
    }
    unresolved
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ana() -> Contact {
        let mut contact = Contact::new("c-1", "ana@example.com");
        contact.first_name = Some("Ana".into());
        contact
    }

    #[test]
    fn test_precedence_and_passthrough() {
        let mut variables = HashMap::new();
        variables.insert("topic".to_string(), "pricing".to_string());

        let out = personalize("Hi {{firstName}}, re {{topic}}", &ana(), &variables);
        assert_eq!(out, "Hi Ana, re pricing");

        // Missing variable stays literal.
        let out = personalize("Hi {{firstName}}, re {{topic}}", &ana(), &HashMap::new());
        assert_eq!(out, "Hi Ana, re {{topic}}");
    }

    #[test]
    fn test_contact_field_shadows_variable() {
        let mut variables = HashMap::new();
        variables.insert("firstName".to_string(), "WRONG".to_string());

        let out = personalize("{{firstName}}", &ana(), &variables);
        assert_eq!(out, "Ana");
    }

    #[test]
    fn test_identifier_charset() {
        // Tokens with spaces or dashes are not tokens at all.
        let out = personalize("{{first name}} {{first-name}}", &ana(), &HashMap::new());
        assert_eq!(out, "{{first name}} {{first-name}}");
    }

    #[test]
    fn test_unresolved_tokens_dedup() {
        let unresolved = unresolved_tokens(
            "{{topic}} and {{topic}} and {{firstName}}",
            &ana(),
            &HashMap::new(),
        );
        assert_eq!(unresolved, vec!["topic".to_string()]);
    }
}
