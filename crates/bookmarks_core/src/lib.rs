//! Core domain logic for the bookmark backend.
//! Business operations run through a composable middleware pipeline that
//! scopes them to one SQLite transaction and logs their lifecycle.

pub mod db;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod repo;
pub mod service;

pub use db::{open_db, open_db_in_memory, DbError, TransactionOp};
pub use logging::{default_log_level, init_logging, logging_status, LoggingInitError};
pub use model::bookmark::{Bookmark, BookmarkId, BookmarkValidationError, NewBookmark};
pub use pipeline::{
    middleware_fn, ContinuationGuard, LogFacade, LoggingMiddleware, Middleware, Next, NoPipeline,
    OperationLogger, OperationRunner, Pipeline, PipelineError, TransactionMiddleware,
    TransactionalStore,
};
pub use repo::bookmark_repo::{
    BookmarkListQuery, BookmarkRepository, RepoError, RepoResult, SqliteBookmarkRepository,
};
pub use service::bookmark_service::{
    BookmarkPage, BookmarkService, BookmarkServiceError, ServiceResult,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
