//! Contact messages, newsletter sign-up and the form checks that run
//! before anything is sent.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;
use tracing::info;

use crate::error::{StoreError, ValidationErrors};
use crate::models::{ContactMessage, NewsletterEmail};
use crate::store::{RemoteStore, Table};

lazy_static! {
    static ref EMAIL_PATTERN: Regex =
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,4}$").unwrap();
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

/// Contact form as typed in; every field is required
#[derive(Debug, Clone, Default)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    pub employee_id: Option<i64>,
    pub message: String,
}

impl ContactForm {
    pub fn validate(&self) -> Result<ContactMessage, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        if self.name.trim().is_empty() {
            errors.add("name", "Navn er påkrævet");
        }
        if self.email.trim().is_empty() {
            errors.add("email", "Email er påkrævet");
        } else if !is_valid_email(self.email.trim()) {
            errors.add("email", "Indtast en gyldig email");
        }
        if self.employee_id.is_none() {
            errors.add("employee", "Medarbejder er påkrævet");
        }
        if self.message.trim().is_empty() {
            errors.add("message", "Besked er påkrævet");
        }

        match self.employee_id {
            Some(employee_id) if errors.is_empty() => Ok(ContactMessage {
                name: self.name.trim().to_string(),
                email: self.email.trim().to_string(),
                employee_id,
                message: self.message.clone(),
            }),
            _ => Err(errors),
        }
    }
}

/// Why a form submission did not go through
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("{0}")]
    Invalid(#[from] ValidationErrors),

    #[error("Der opstod en fejl: {0}")]
    Store(#[from] StoreError),
}

pub async fn submit_contact(store: &dyn RemoteStore, form: &ContactForm) -> Result<(), SubmitError> {
    let message = form.validate()?;
    store
        .insert(Table::ContactMessages, vec![json!(message)])
        .await?;
    info!("Contact message sent to employee {}", message.employee_id);
    Ok(())
}

pub async fn subscribe_newsletter(store: &dyn RemoteStore, email: &str) -> Result<(), SubmitError> {
    let email = email.trim();
    if email.is_empty() {
        let mut errors = ValidationErrors::default();
        errors.add("email", "Email er påkrævet");
        return Err(errors.into());
    }

    let row = NewsletterEmail {
        email: email.to_string(),
    };
    store.insert(Table::NewsletterEmails, vec![json!(row)]).await?;
    info!("Newsletter sign-up for {}", email);
    Ok(())
}

/// Login and registration only require both fields to be filled in
pub fn validate_credentials(email: &str, password: &str) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    if email.trim().is_empty() {
        errors.add("email", "Email er påkrævet");
    }
    if password.is_empty() {
        errors.add("password", "Adgangskode er påkrævet");
    }
    errors.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn filled() -> ContactForm {
        ContactForm {
            name: "Lars Nielsen".to_string(),
            email: "lars@example.dk".to_string(),
            employee_id: Some(2),
            message: "Jeg vil gerne se Strandvej 9.".to_string(),
        }
    }

    #[test]
    fn email_pattern() {
        assert!(is_valid_email("a.b+c@homelands.dk"));
        assert!(is_valid_email("info@homelands.info"));
        assert!(!is_valid_email("no-at-sign.dk"));
        assert!(!is_valid_email("x@y"));
        assert!(!is_valid_email("x@y.museum"));
    }

    #[test]
    fn reports_every_missing_field() {
        let errors = ContactForm::default().validate().unwrap_err();
        assert_eq!(errors.get("name"), Some("Navn er påkrævet"));
        assert_eq!(errors.get("email"), Some("Email er påkrævet"));
        assert_eq!(errors.get("employee"), Some("Medarbejder er påkrævet"));
        assert_eq!(errors.get("message"), Some("Besked er påkrævet"));
    }

    #[test]
    fn rejects_malformed_email() {
        let form = ContactForm {
            email: "lars(at)example.dk".to_string(),
            ..filled()
        };
        let errors = form.validate().unwrap_err();
        assert_eq!(errors.get("email"), Some("Indtast en gyldig email"));
        assert_eq!(errors.get("name"), None);
    }

    #[tokio::test]
    async fn valid_message_is_stored() {
        let store = MemoryStore::new();
        submit_contact(&store, &filled()).await.unwrap();

        let rows = store.rows(Table::ContactMessages).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["employee_id"], 2);
        assert_eq!(rows[0]["email"], "lars@example.dk");
    }

    #[tokio::test]
    async fn invalid_form_never_reaches_store() {
        let store = MemoryStore::new();
        let form = ContactForm {
            message: "  ".to_string(),
            ..filled()
        };

        let err = submit_contact(&store, &form).await.unwrap_err();
        assert!(matches!(err, SubmitError::Invalid(_)));
        assert_eq!(store.calls.load(std::sync::atomic::Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn store_failure_is_reported() {
        let store = MemoryStore::new();
        store.fail_next("insert failed").await;

        let err = submit_contact(&store, &filled()).await.unwrap_err();
        assert_eq!(err.to_string(), "Der opstod en fejl: insert failed (status 500)");
    }

    #[tokio::test]
    async fn newsletter_requires_email() {
        let store = MemoryStore::new();
        assert!(subscribe_newsletter(&store, " ").await.is_err());

        subscribe_newsletter(&store, "nyhed@example.dk").await.unwrap();
        let rows = store.rows(Table::NewsletterEmails).await;
        assert_eq!(rows[0]["email"], "nyhed@example.dk");
    }

    #[test]
    fn credentials_need_both_fields() {
        assert!(validate_credentials("a@b.dk", "hemmelig").is_ok());
        let errors = validate_credentials("", "").unwrap_err();
        assert!(errors.get("email").is_some());
        assert!(errors.get("password").is_some());
    }
}
