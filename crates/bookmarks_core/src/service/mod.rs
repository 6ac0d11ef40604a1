//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Run every write use case through the operation pipeline so logging and
//!   transaction scoping apply uniformly.

pub mod bookmark_service;
