//! Request validation: turns an untrusted [`NewsPayload`] into an
//! [`ArticleDraft`], reporting every violated rule at once.

use chrono::{DateTime, Utc};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::model::{ArticleDraft, NewsPayload};

/// Which rule a field broke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Empty,
    InvalidUrl,
    InvalidTimestamp,
}

/// A single failed field check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub rule: Rule,
    pub message: String,
}

impl FieldError {
    fn empty(field: &'static str) -> Self {
        let message = if field == "tags" {
            "tags are empty".to_string()
        } else {
            format!("{} is empty", field)
        };
        Self {
            field,
            rule: Rule::Empty,
            message,
        }
    }

    fn invalid_url(field: &'static str, value: &str, reason: url::ParseError) -> Self {
        Self {
            field,
            rule: Rule::InvalidUrl,
            message: format!("invalid {} url '{}': {}", field, value, reason),
        }
    }

    fn invalid_timestamp(field: &'static str, value: &str, reason: chrono::ParseError) -> Self {
        Self {
            field,
            rule: Rule::InvalidTimestamp,
            message: format!("invalid {} time '{}': {}", field, value, reason),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Every violation found in one payload. Never empty when returned as an error.
#[derive(Error, Debug, Clone, Default, PartialEq, Eq)]
#[error("{}", join_messages(.errors))]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

fn join_messages(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

impl ValidationErrors {
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Failures recorded against `field`
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a FieldError> + 'a {
        self.errors.iter().filter(move |e| e.field == field)
    }

    fn push(&mut self, error: FieldError) {
        self.errors.push(error);
    }
}

/// A path identifier that is not a UUID
#[derive(Error, Debug)]
#[error("unable to parse news id '{value}': {source}")]
pub struct InvalidId {
    pub value: String,
    #[source]
    pub source: uuid::Error,
}

fn require_text(errors: &mut ValidationErrors, field: &'static str, value: &str) {
    if value.is_empty() {
        errors.push(FieldError::empty(field));
    }
}

/// Validate a request payload.
///
/// All checks run independently; on any failure no draft is produced.
pub fn validate(payload: &NewsPayload) -> Result<ArticleDraft, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    require_text(&mut errors, "author", &payload.author);
    require_text(&mut errors, "title", &payload.title);
    require_text(&mut errors, "summary", &payload.summary);
    require_text(&mut errors, "content", &payload.content);

    // An empty source only reports as empty, not additionally as unparseable
    let source = if payload.source.is_empty() {
        errors.push(FieldError::empty("source"));
        None
    } else {
        match Url::parse(&payload.source) {
            Ok(url) => Some(url),
            Err(e) => {
                errors.push(FieldError::invalid_url("source", &payload.source, e));
                None
            }
        }
    };

    let created_at = match DateTime::parse_from_rfc3339(&payload.created_at) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            errors.push(FieldError::invalid_timestamp(
                "createdAt",
                &payload.created_at,
                e,
            ));
            None
        }
    };

    if payload.tags.is_empty() {
        errors.push(FieldError::empty("tags"));
    }

    match (source, created_at) {
        (Some(source), Some(created_at)) if errors.is_empty() => Ok(ArticleDraft {
            author: payload.author.clone(),
            title: payload.title.clone(),
            summary: payload.summary.clone(),
            content: payload.content.clone(),
            source: source.to_string(),
            tags: payload.tags.clone(),
            created_at: Some(created_at),
        }),
        _ => Err(errors),
    }
}

/// Parse a path-supplied news id
pub fn validate_id(raw: &str) -> Result<Uuid, InvalidId> {
    Uuid::parse_str(raw).map_err(|source| InvalidId {
        value: raw.to_string(),
        source,
    })
}
