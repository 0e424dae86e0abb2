//! Webhook payload construction: the contact's free-form properties spread
//! at the top level, plus the normalized aliases the runtime's workflows
//! reference.

use serde_json::{json, Map, Value};

use outreach_core::types::Contact;

/// One invocation body per contact. Alias keys win over same-named keys in
/// the contact's property bag.
pub fn webhook_payload(contact: &Contact) -> Value {
    let mut body = Map::new();

    for (key, value) in &contact.extra {
        body.insert(key.clone(), value.clone());
    }

    body.insert("contact_id".into(), json!(contact.id));
    if let Some(email) = &contact.email {
        body.insert("contact_email".into(), json!(email));
    }
    if let Some(first) = &contact.first_name {
        body.insert("firstName".into(), json!(first));
    }
    if let Some(last) = &contact.last_name {
        body.insert("lastName".into(), json!(last));
    }
    match (&contact.first_name, &contact.last_name) {
        (Some(first), Some(last)) => {
            body.insert("name".into(), json!(format!("{first} {last}")));
        }
        (Some(single), None) | (None, Some(single)) => {
            body.insert("name".into(), json!(single));
        }
        (None, None) => {}
    }
    if let Some(company) = &contact.company {
        body.insert("company".into(), json!(company));
    }
    if let Some(title) = &contact.title {
        body.insert("title".into(), json!(title));
    }
    if let Some(linkedin) = &contact.linkedin_url {
        body.insert("linkedin_url".into(), json!(linkedin));
    }
    if let Some(phone) = &contact.phone {
        body.insert("phone".into(), json!(phone));
    }
    if let Some(owner) = &contact.owner_id {
        body.insert("owner_id".into(), json!(owner));
    }

    Value::Object(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_and_spread() {
        let mut contact = Contact::new("c-7", "ana@example.com");
        contact.first_name = Some("Ana".into());
        contact.last_name = Some("Ruiz".into());
        contact.linkedin_url = Some("https://linkedin.com/in/ana".into());
        contact.owner_id = Some("u-1".into());
        contact
            .extra
            .insert("industry".into(), json!("saas"));

        let body = webhook_payload(&contact);
        assert_eq!(body["contact_id"], "c-7");
        assert_eq!(body["contact_email"], "ana@example.com");
        assert_eq!(body["firstName"], "Ana");
        assert_eq!(body["name"], "Ana Ruiz");
        assert_eq!(body["linkedin_url"], "https://linkedin.com/in/ana");
        assert_eq!(body["owner_id"], "u-1");
        assert_eq!(body["industry"], "saas");
        // Absent fields stay absent rather than null.
        assert!(body.get("phone").is_none());
    }

    #[test]
    fn test_alias_wins_over_property_bag() {
        let mut contact = Contact::new("c-8", "real@example.com");
        contact
            .extra
            .insert("contact_email".into(), json!("stale@example.com"));

        let body = webhook_payload(&contact);
        assert_eq!(body["contact_email"], "real@example.com");
    }
}
