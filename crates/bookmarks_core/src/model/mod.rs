//! Bookmark domain model.
//!
//! # Invariants
//! - Every bookmark is identified by a stable `BookmarkId`.
//! - Writes validate URL, title and description before persistence.

pub mod bookmark;
