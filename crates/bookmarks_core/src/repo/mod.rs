//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository writes validate input before persistence.
//! - Repositories never open transactions themselves; the service pipeline's
//!   transaction middleware owns the unit of work.

pub mod bookmark_repo;
