//! Bookmark use-case service.
//!
//! # Responsibility
//! - Provide create/update/delete/tag/import/list entry points.
//! - Wrap each use case in the pipeline that fits it: writes get logging and
//!   transaction scoping, listing gets logging, point reads run bare.
//!
//! # Invariants
//! - All write pipelines share one `TransactionMiddleware` instance, so a use
//!   case that calls another use case still issues one transaction.
//! - `import_bookmarks` is all-or-nothing.
//! - URLs are unique across bookmarks.

use crate::db::DbError;
use crate::model::bookmark::{
    normalize_tags, Bookmark, BookmarkId, BookmarkValidationError, NewBookmark,
};
use crate::pipeline::{
    LoggingMiddleware, NoPipeline, Pipeline, PipelineError, TransactionMiddleware,
    TransactionalStore,
};
use crate::repo::bookmark_repo::{
    normalize_list_limit, BookmarkListQuery, BookmarkRepository, RepoError,
    SqliteBookmarkRepository,
};
use log::Level;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;
use uuid::Uuid;

/// Service error for bookmark use cases.
#[derive(Debug)]
pub enum BookmarkServiceError {
    InvalidBookmark(BookmarkValidationError),
    BookmarkNotFound(BookmarkId),
    DuplicateUrl(String),
    /// The pipeline delivered no input payload to an operation that needs one.
    MissingInput,
    Repo(RepoError),
    /// Transaction control failure.
    Db(DbError),
    Pipeline(PipelineError),
    InconsistentState(&'static str),
}

impl Display for BookmarkServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidBookmark(err) => write!(f, "{err}"),
            Self::BookmarkNotFound(id) => write!(f, "bookmark not found: {id}"),
            Self::DuplicateUrl(url) => write!(f, "bookmark already exists for url: {url}"),
            Self::MissingInput => write!(f, "operation input is missing"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Pipeline(err) => write!(f, "{err}"),
            Self::InconsistentState(details) => {
                write!(f, "inconsistent bookmark state: {details}")
            }
        }
    }
}

impl Error for BookmarkServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidBookmark(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Pipeline(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for BookmarkServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::BookmarkNotFound(id),
            RepoError::DuplicateUrl(url) => Self::DuplicateUrl(url),
            RepoError::Validation(err) => Self::InvalidBookmark(err),
            other => Self::Repo(other),
        }
    }
}

impl From<BookmarkValidationError> for BookmarkServiceError {
    fn from(value: BookmarkValidationError) -> Self {
        Self::InvalidBookmark(value)
    }
}

impl From<DbError> for BookmarkServiceError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<PipelineError> for BookmarkServiceError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

pub type ServiceResult<T> = Result<T, BookmarkServiceError>;

/// One page of bookmarks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookmarkPage {
    /// Sorted by `updated_at DESC, uuid ASC`.
    pub items: Vec<Bookmark>,
    /// Effective normalized limit used by the query.
    pub applied_limit: u32,
}

/// Bookmark service over a repository and a shared transaction scope.
pub struct BookmarkService<R, S> {
    repo: R,
    transaction: Rc<TransactionMiddleware<S>>,
    log_level: Level,
}

impl BookmarkService<SqliteBookmarkRepository, Rc<Connection>> {
    /// Wires the SQLite repository and a transaction scope over one connection.
    pub fn sqlite(conn: Rc<Connection>) -> Self {
        let repo = SqliteBookmarkRepository::new(Rc::clone(&conn));
        Self::new(repo, Rc::new(TransactionMiddleware::new(conn)))
    }
}

impl<R, S> BookmarkService<R, S>
where
    R: BookmarkRepository,
    S: TransactionalStore + 'static,
    BookmarkServiceError: From<S::Error>,
{
    pub fn new(repo: R, transaction: Rc<TransactionMiddleware<S>>) -> Self {
        Self {
            repo,
            transaction,
            log_level: Level::Debug,
        }
    }

    /// Sets the level used by the operation logging middleware.
    #[must_use]
    pub fn with_log_level(mut self, level: Level) -> Self {
        self.log_level = level;
        self
    }

    pub fn transaction(&self) -> &Rc<TransactionMiddleware<S>> {
        &self.transaction
    }

    /// Creates one bookmark; the URL must not already be bookmarked.
    pub fn create_bookmark(&self, input: NewBookmark) -> ServiceResult<Bookmark> {
        let created = self.write_pipeline("create_bookmark").run(
            |input: Option<NewBookmark>| {
                let input = input.ok_or(BookmarkServiceError::MissingInput)?.normalized()?;
                if self.repo.find_by_url(&input.url)?.is_some() {
                    return Err(BookmarkServiceError::DuplicateUrl(input.url));
                }

                let id = self.repo.insert_bookmark(Uuid::new_v4(), &input)?;
                self.read_back(id, "created bookmark not found in read-back")
                    .map(Some)
            },
            Some(input),
        )?;
        created.ok_or(BookmarkServiceError::InconsistentState(
            "create pipeline returned no bookmark",
        ))
    }

    /// Fully replaces url, title, description and tags of one bookmark.
    pub fn update_bookmark(&self, id: BookmarkId, input: NewBookmark) -> ServiceResult<Bookmark> {
        let updated = self.write_pipeline("update_bookmark").run(
            |data: Option<(BookmarkId, NewBookmark)>| {
                let (id, input) = data.ok_or(BookmarkServiceError::MissingInput)?;
                let input = input.normalized()?;
                if let Some(existing) = self.repo.find_by_url(&input.url)? {
                    if existing.uuid != id {
                        return Err(BookmarkServiceError::DuplicateUrl(input.url));
                    }
                }

                self.repo.update_bookmark(id, &input)?;
                self.read_back(id, "updated bookmark not found in read-back")
                    .map(Some)
            },
            Some((id, input)),
        )?;
        updated.ok_or(BookmarkServiceError::InconsistentState(
            "update pipeline returned no bookmark",
        ))
    }

    /// Deletes one bookmark and its tag links.
    pub fn delete_bookmark(&self, id: BookmarkId) -> ServiceResult<()> {
        self.write_pipeline::<BookmarkId, Bookmark>("delete_bookmark")
            .run(
                |id: Option<BookmarkId>| {
                    let id = id.ok_or(BookmarkServiceError::MissingInput)?;
                    self.repo.delete_bookmark(id)?;
                    Ok(None)
                },
                Some(id),
            )
            .map(|_| ())
    }

    /// Replaces the full tag set of one bookmark.
    pub fn set_tags(&self, id: BookmarkId, tags: Vec<String>) -> ServiceResult<Bookmark> {
        let tagged = self.write_pipeline("set_tags").run(
            |data: Option<(BookmarkId, Vec<String>)>| {
                let (id, tags) = data.ok_or(BookmarkServiceError::MissingInput)?;
                if tags.iter().any(|tag| tag.trim().is_empty()) {
                    return Err(BookmarkValidationError::EmptyTag.into());
                }

                self.repo.replace_tags(id, &normalize_tags(&tags))?;
                self.read_back(id, "bookmark missing after tag replacement")
                    .map(Some)
            },
            Some((id, tags)),
        )?;
        tagged.ok_or(BookmarkServiceError::InconsistentState(
            "set_tags pipeline returned no bookmark",
        ))
    }

    /// Creates every bookmark in `inputs` in one transaction, or none of them.
    ///
    /// Each item goes through `create_bookmark` and its own pipeline; the
    /// shared transaction scope flattens those nested runs into the outer one.
    pub fn import_bookmarks(&self, inputs: Vec<NewBookmark>) -> ServiceResult<Vec<Bookmark>> {
        let imported = self.write_pipeline("import_bookmarks").run(
            |inputs: Option<Vec<NewBookmark>>| {
                let inputs = inputs.unwrap_or_default();
                let mut created = Vec::with_capacity(inputs.len());
                for input in inputs {
                    created.push(self.create_bookmark(input)?);
                }
                Ok(Some(created))
            },
            Some(inputs),
        )?;
        Ok(imported.unwrap_or_default())
    }

    pub fn get_bookmark(&self, id: BookmarkId) -> ServiceResult<Option<Bookmark>> {
        NoPipeline.run(
            |id: Option<BookmarkId>| -> ServiceResult<Option<Bookmark>> {
                match id {
                    Some(id) => Ok(self.repo.get_bookmark(id)?),
                    None => Ok(None),
                }
            },
            Some(id),
        )
    }

    /// Lists bookmarks with an optional single-tag filter and pagination.
    pub fn list_bookmarks(
        &self,
        tag: Option<String>,
        limit: Option<u32>,
        offset: u32,
    ) -> ServiceResult<BookmarkPage> {
        let applied_limit = normalize_list_limit(limit);
        let query = BookmarkListQuery {
            tag,
            limit: Some(applied_limit),
            offset,
        };
        let items = Pipeline::<_, _, BookmarkServiceError>::new()
            .with_middleware(Rc::new(self.logging("list_bookmarks")))
            .run(
                |query: Option<BookmarkListQuery>| {
                    let query = query.unwrap_or_default();
                    Ok(Some(self.repo.list_bookmarks(&query)?))
                },
                Some(query),
            )?;

        Ok(BookmarkPage {
            items: items.unwrap_or_default(),
            applied_limit,
        })
    }

    /// Lists normalized tags known by storage.
    pub fn list_tags(&self) -> ServiceResult<Vec<String>> {
        let tags = NoPipeline.run(
            |_: Option<()>| -> ServiceResult<Option<Vec<String>>> {
                Ok(Some(self.repo.list_tags()?))
            },
            None,
        )?;
        Ok(tags.unwrap_or_default())
    }

    fn write_pipeline<I, O>(&self, operation: &'static str) -> Pipeline<I, O, BookmarkServiceError> {
        Pipeline::new()
            .with_middleware(Rc::new(self.logging(operation)))
            .with_middleware(Rc::clone(&self.transaction))
    }

    fn logging(&self, operation: &'static str) -> LoggingMiddleware {
        LoggingMiddleware::new()
            .named(operation)
            .with_level(self.log_level)
    }

    fn read_back(&self, id: BookmarkId, missing: &'static str) -> ServiceResult<Bookmark> {
        self.repo
            .get_bookmark(id)?
            .ok_or(BookmarkServiceError::InconsistentState(missing))
    }
}
