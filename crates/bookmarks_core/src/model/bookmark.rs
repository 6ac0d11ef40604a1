//! Bookmark entity and input value objects.
//!
//! # Responsibility
//! - Define the canonical bookmark record and the create/update input.
//! - Validate user-supplied fields and normalize tag names.
//!
//! # Invariants
//! - `url` is an absolute http(s) URL without whitespace.
//! - `title` is non-blank and at most `MAX_TITLE_CHARS` characters.
//! - Tags are lowercase, trimmed, deduplicated and sorted.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub const MAX_TITLE_CHARS: usize = 255;
pub const MAX_DESCRIPTION_CHARS: usize = 2000;
pub const MAX_URL_CHARS: usize = 2048;

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i)https?://[^\s/?#]+[^\s]*$").expect("valid url regex"));

/// Stable identifier for bookmarks.
pub type BookmarkId = Uuid;

/// Persisted bookmark record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub uuid: BookmarkId,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    /// Normalized tag names, sorted ascending.
    pub tags: Vec<String>,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds.
    pub updated_at: i64,
}

/// Input for creating or fully replacing a bookmark.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBookmark {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewBookmark {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            description: None,
            tags: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_tags<T: Into<String>>(mut self, tags: impl IntoIterator<Item = T>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Validates fields and returns a trimmed copy with normalized tags.
    pub fn normalized(&self) -> Result<Self, BookmarkValidationError> {
        let url = self.url.trim();
        validate_url(url)?;

        let title = self.title.trim();
        if title.is_empty() {
            return Err(BookmarkValidationError::EmptyTitle);
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(BookmarkValidationError::TitleTooLong);
        }

        let description = self
            .description
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty());
        if description.is_some_and(|value| value.chars().count() > MAX_DESCRIPTION_CHARS) {
            return Err(BookmarkValidationError::DescriptionTooLong);
        }

        for tag in &self.tags {
            if tag.trim().is_empty() {
                return Err(BookmarkValidationError::EmptyTag);
            }
        }

        Ok(Self {
            url: url.to_string(),
            title: title.to_string(),
            description: description.map(str::to_string),
            tags: normalize_tags(&self.tags),
        })
    }
}

/// Validation failures for bookmark input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookmarkValidationError {
    InvalidUrl(String),
    EmptyTitle,
    TitleTooLong,
    DescriptionTooLong,
    EmptyTag,
}

impl Display for BookmarkValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidUrl(url) => write!(f, "invalid bookmark url: `{url}`"),
            Self::EmptyTitle => write!(f, "bookmark title must not be blank"),
            Self::TitleTooLong => {
                write!(f, "bookmark title exceeds {MAX_TITLE_CHARS} characters")
            }
            Self::DescriptionTooLong => write!(
                f,
                "bookmark description exceeds {MAX_DESCRIPTION_CHARS} characters"
            ),
            Self::EmptyTag => write!(f, "tag names must not be blank"),
        }
    }
}

impl Error for BookmarkValidationError {}

fn validate_url(url: &str) -> Result<(), BookmarkValidationError> {
    if url.len() > MAX_URL_CHARS || !URL_RE.is_match(url) {
        return Err(BookmarkValidationError::InvalidUrl(url.to_string()));
    }
    Ok(())
}

/// Normalizes one tag value: trimmed and lowercase, `None` when blank.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let trimmed = tag.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Normalizes, deduplicates and sorts tag values.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .filter_map(|tag| normalize_tag(tag))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
