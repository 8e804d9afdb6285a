use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A book as stored in the catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    /// Generated by the database on insert
    pub id: i64,
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    /// Serialized as `YYYY-MM-DD`
    pub published: Option<NaiveDate>,
    pub pages: Option<i32>,
}

/// Validated input for create and update. Every field is present.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub description: String,
    pub published: NaiveDate,
    pub pages: i32,
}

impl NewBook {
    /// The book this input becomes once stored under `id`.
    pub fn into_book(self, id: i64) -> Book {
        Book {
            id,
            title: self.title,
            author: self.author,
            description: Some(self.description),
            published: Some(self.published),
            pages: Some(self.pages),
        }
    }
}

/// Request body for `POST` and `PUT`, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookPayload {
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub published: Option<String>,
    pub pages: Option<i64>,
}

#[derive(Debug, Error, PartialEq)]
pub enum PayloadError {
    #[error("All fields are required.")]
    Missing(Vec<&'static str>),

    #[error("Invalid published date. Expected YYYY-MM-DD.")]
    InvalidDate(String),

    #[error("Page count is out of range.")]
    PagesOutOfRange(i64),
}

impl PayloadError {
    /// Per-field details for the error response.
    pub fn details(&self) -> Vec<Value> {
        match self {
            PayloadError::Missing(fields) => fields
                .iter()
                .map(|field| json!({ "field": field, "error": "required" }))
                .collect(),
            PayloadError::InvalidDate(value) => vec![json!({
                "field": "published",
                "error": "invalid_date",
                "value": value,
            })],
            PayloadError::PagesOutOfRange(value) => vec![json!({
                "field": "pages",
                "error": "out_of_range",
                "value": value,
            })],
        }
    }
}

impl BookPayload {
    /// Check that every field is present and well formed.
    ///
    /// Strings must be non-blank and `pages` positive; otherwise the field is
    /// reported as missing. Missing fields are reported before format errors.
    pub fn validate(self) -> Result<NewBook, PayloadError> {
        let title = non_blank(self.title);
        let author = non_blank(self.author);
        let description = non_blank(self.description);
        let published = non_blank(self.published);
        let pages = self.pages.filter(|pages| *pages > 0);

        let missing: Vec<&'static str> = [
            ("title", title.is_none()),
            ("author", author.is_none()),
            ("description", description.is_none()),
            ("published", published.is_none()),
            ("pages", pages.is_none()),
        ]
        .into_iter()
        .filter_map(|(field, missing)| missing.then_some(field))
        .collect();

        let (Some(title), Some(author), Some(description), Some(published), Some(pages)) =
            (title, author, description, published, pages)
        else {
            return Err(PayloadError::Missing(missing));
        };

        let published = NaiveDate::parse_from_str(published.trim(), DATE_FORMAT)
            .map_err(|_| PayloadError::InvalidDate(published.clone()))?;
        let pages = i32::try_from(pages).map_err(|_| PayloadError::PagesOutOfRange(pages))?;

        Ok(NewBook {
            title,
            author,
            description,
            published,
            pages,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Query parameters accepted by the list endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BookFilter {
    pub title: Option<String>,
    pub author: Option<String>,
}

impl BookFilter {
    /// Drop blank filters so they match everything.
    pub fn normalized(self) -> Self {
        Self {
            title: non_blank(self.title),
            author: non_blank(self.author),
        }
    }
}
