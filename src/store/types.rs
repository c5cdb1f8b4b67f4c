use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

use crate::error::StoreError;

/// Tables of the hosted schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Estates,
    Employees,
    Reviews,
    Cities,
    EnergyLabels,
    EstateTypes,
    EstateImageRel,
    Images,
    ContactMessages,
    NewsletterEmails,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Estates => "estates",
            Table::Employees => "employees",
            Table::Reviews => "reviews",
            Table::Cities => "cities",
            Table::EnergyLabels => "energy_labels",
            Table::EstateTypes => "estate_types",
            Table::EstateImageRel => "estate_image_rel",
            Table::Images => "images",
            Table::ContactMessages => "contact_messages",
            Table::NewsletterEmails => "newsletter_emails",
        }
    }
}

/// Nested select for estates joined with every relation the listings show
pub const ESTATE_COLUMNS: &str = "
    *,
    estate_image_rel (
        image_id,
        images ( image_url )
    ),
    energy_labels ( letter ),
    cities ( name, zipcode ),
    estate_types ( name ),
    employees ( * )
";

/// Strip the layout whitespace PostgREST does not accept inside `select`
pub fn compact_columns(columns: &str) -> String {
    columns.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Conjunction of `column = value` equalities used by update and delete
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Match {
    conditions: Vec<(String, Value)>,
}

impl Match {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(id: i64) -> Self {
        Self::new().eq("id", id)
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions.push((column.to_string(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Refuse to `verb` a whole table; the hosted backend rejects it too
    pub fn require_filter(&self, verb: &str) -> Result<(), StoreError> {
        if self.is_empty() {
            return Err(StoreError::Api {
                status: 400,
                message: format!("{} requires a WHERE clause", verb),
            });
        }
        Ok(())
    }

    /// Query-string form, e.g. `("id", "eq.5")`
    pub fn to_query(&self) -> Vec<(String, String)> {
        self.conditions
            .iter()
            .map(|(column, value)| {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (column.clone(), format!("eq.{}", text))
            })
            .collect()
    }

    pub fn matches(&self, row: &Value) -> bool {
        self.conditions
            .iter()
            .all(|(column, value)| row.get(column) == Some(value))
    }
}

/// Bearer token of the signed-in user, shared between the auth client and
/// the data client so writes run as that user.
#[derive(Debug, Clone, Default)]
pub struct AccessToken(Arc<RwLock<Option<String>>>);

impl AccessToken {
    pub fn get(&self) -> Option<String> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set(&self, token: Option<String>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = token;
    }
}
