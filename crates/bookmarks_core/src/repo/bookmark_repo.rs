//! Bookmark repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD APIs over `bookmarks` and the tag link tables.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Write paths call `NewBookmark::normalized()` before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Lists are ordered by `updated_at DESC, uuid ASC`.

use crate::db::DbError;
use crate::model::bookmark::{
    normalize_tag, normalize_tags, Bookmark, BookmarkId, BookmarkValidationError, NewBookmark,
};
use rusqlite::types::Value;
use rusqlite::{ffi, params, params_from_iter, Connection, ErrorCode, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;
use uuid::Uuid;

const BOOKMARK_SELECT_SQL: &str = "SELECT
    uuid,
    url,
    title,
    description,
    created_at,
    updated_at
FROM bookmarks";

const LIST_DEFAULT_LIMIT: u32 = 20;
const LIST_LIMIT_MAX: u32 = 100;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for bookmark persistence and queries.
#[derive(Debug)]
pub enum RepoError {
    Validation(BookmarkValidationError),
    Db(DbError),
    NotFound(BookmarkId),
    DuplicateUrl(String),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "bookmark not found: {id}"),
            Self::DuplicateUrl(url) => write!(f, "bookmark already exists for url: {url}"),
            Self::InvalidData(message) => {
                write!(f, "invalid persisted bookmark data: {message}")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) | Self::DuplicateUrl(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<BookmarkValidationError> for RepoError {
    fn from(value: BookmarkValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Query options for listing bookmarks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookmarkListQuery {
    /// Optional single-tag exact match filter.
    pub tag: Option<String>,
    /// Defaults to 20 and clamps to 100.
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Repository interface for bookmark CRUD operations.
pub trait BookmarkRepository {
    /// Inserts a bookmark with the given id and its tags.
    fn insert_bookmark(&self, id: BookmarkId, input: &NewBookmark) -> RepoResult<BookmarkId>;
    /// Replaces url/title/description and the full tag set.
    fn update_bookmark(&self, id: BookmarkId, input: &NewBookmark) -> RepoResult<()>;
    fn get_bookmark(&self, id: BookmarkId) -> RepoResult<Option<Bookmark>>;
    fn find_by_url(&self, url: &str) -> RepoResult<Option<Bookmark>>;
    fn list_bookmarks(&self, query: &BookmarkListQuery) -> RepoResult<Vec<Bookmark>>;
    fn delete_bookmark(&self, id: BookmarkId) -> RepoResult<()>;
    /// Replaces the full tag set of one bookmark.
    fn replace_tags(&self, id: BookmarkId, tags: &[String]) -> RepoResult<()>;
    /// Returns all known tags sorted by name.
    fn list_tags(&self) -> RepoResult<Vec<String>>;
}

/// SQLite-backed bookmark repository.
///
/// Shares its connection with the transaction middleware so that every
/// statement issued inside a pipeline run lands in the same transaction.
pub struct SqliteBookmarkRepository {
    conn: Rc<Connection>,
}

impl SqliteBookmarkRepository {
    pub fn new(conn: Rc<Connection>) -> Self {
        Self { conn }
    }

    fn write_tags(&self, id: &str, tags: &[String]) -> RepoResult<()> {
        self.conn
            .execute("DELETE FROM bookmark_tags WHERE bookmark_uuid = ?1;", [id])?;

        for tag in tags {
            self.conn
                .execute("INSERT OR IGNORE INTO tags (name) VALUES (?1);", [tag.as_str()])?;
            self.conn.execute(
                "INSERT OR IGNORE INTO bookmark_tags (bookmark_uuid, tag_id)
                 SELECT ?1, id
                 FROM tags
                 WHERE name = ?2 COLLATE NOCASE;",
                params![id, tag.as_str()],
            )?;
        }
        Ok(())
    }

    fn query_one(&self, clause: &str, value: &str) -> RepoResult<Option<Bookmark>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{BOOKMARK_SELECT_SQL} WHERE {clause} = ?1;"))?;
        let mut rows = stmt.query([value])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_bookmark_row(&self.conn, row)?));
        }
        Ok(None)
    }
}

impl BookmarkRepository for SqliteBookmarkRepository {
    fn insert_bookmark(&self, id: BookmarkId, input: &NewBookmark) -> RepoResult<BookmarkId> {
        let input = input.normalized()?;
        let id_text = id.to_string();

        self.conn
            .execute(
                "INSERT INTO bookmarks (uuid, url, title, description)
                 VALUES (?1, ?2, ?3, ?4);",
                params![
                    id_text.as_str(),
                    input.url.as_str(),
                    input.title.as_str(),
                    input.description.as_deref(),
                ],
            )
            .map_err(|err| map_unique_violation(err, &input.url))?;
        self.write_tags(&id_text, &input.tags)?;

        Ok(id)
    }

    fn update_bookmark(&self, id: BookmarkId, input: &NewBookmark) -> RepoResult<()> {
        let input = input.normalized()?;
        let id_text = id.to_string();

        let changed = self
            .conn
            .execute(
                "UPDATE bookmarks
                 SET
                    url = ?2,
                    title = ?3,
                    description = ?4,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE uuid = ?1;",
                params![
                    id_text.as_str(),
                    input.url.as_str(),
                    input.title.as_str(),
                    input.description.as_deref(),
                ],
            )
            .map_err(|err| map_unique_violation(err, &input.url))?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        self.write_tags(&id_text, &input.tags)
    }

    fn get_bookmark(&self, id: BookmarkId) -> RepoResult<Option<Bookmark>> {
        self.query_one("uuid", &id.to_string())
    }

    fn find_by_url(&self, url: &str) -> RepoResult<Option<Bookmark>> {
        self.query_one("url", url.trim())
    }

    fn list_bookmarks(&self, query: &BookmarkListQuery) -> RepoResult<Vec<Bookmark>> {
        let mut sql = format!("{BOOKMARK_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(tag) = query.tag.as_deref().and_then(normalize_tag) {
            sql.push_str(
                " AND EXISTS (
                    SELECT 1
                    FROM bookmark_tags bt
                    INNER JOIN tags t ON t.id = bt.tag_id
                    WHERE bt.bookmark_uuid = bookmarks.uuid
                      AND t.name = ? COLLATE NOCASE
                )",
            );
            bind_values.push(Value::Text(tag));
        }

        sql.push_str(" ORDER BY updated_at DESC, uuid ASC LIMIT ?");
        bind_values.push(Value::Integer(i64::from(normalize_list_limit(query.limit))));
        if query.offset > 0 {
            sql.push_str(" OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut bookmarks = Vec::new();
        while let Some(row) = rows.next()? {
            bookmarks.push(parse_bookmark_row(&self.conn, row)?);
        }

        Ok(bookmarks)
    }

    fn delete_bookmark(&self, id: BookmarkId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM bookmarks WHERE uuid = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    fn replace_tags(&self, id: BookmarkId, tags: &[String]) -> RepoResult<()> {
        let id_text = id.to_string();
        let changed = self.conn.execute(
            "UPDATE bookmarks
             SET updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1;",
            [id_text.as_str()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        self.write_tags(&id_text, &normalize_tags(tags))
    }

    fn list_tags(&self) -> RepoResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM tags ORDER BY name COLLATE NOCASE ASC;")?;
        let mut rows = stmt.query([])?;
        let mut tags = Vec::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get("name")?;
            tags.push(value.to_lowercase());
        }
        Ok(tags)
    }
}

/// Normalizes list limit according to the bookmarks list contract.
pub fn normalize_list_limit(limit: Option<u32>) -> u32 {
    match limit {
        None | Some(0) => LIST_DEFAULT_LIMIT,
        Some(value) => value.min(LIST_LIMIT_MAX),
    }
}

/// Maps a UNIQUE violation to `DuplicateUrl`; `url` is the only unique
/// column written by bookmark inserts and updates.
fn map_unique_violation(err: rusqlite::Error, url: &str) -> RepoError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err {
        if failure.code == ErrorCode::ConstraintViolation
            && failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
        {
            return RepoError::DuplicateUrl(url.to_string());
        }
    }
    err.into()
}

fn parse_bookmark_row(conn: &Connection, row: &Row<'_>) -> RepoResult<Bookmark> {
    let uuid_text: String = row.get("uuid")?;
    let uuid = Uuid::parse_str(&uuid_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{uuid_text}` in bookmarks.uuid"))
    })?;

    Ok(Bookmark {
        uuid,
        url: row.get("url")?,
        title: row.get("title")?,
        description: row.get("description")?,
        tags: load_tags_for_bookmark(conn, &uuid_text)?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn load_tags_for_bookmark(conn: &Connection, bookmark_uuid: &str) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT t.name
         FROM bookmark_tags bt
         INNER JOIN tags t ON t.id = bt.tag_id
         WHERE bt.bookmark_uuid = ?1
         ORDER BY t.name COLLATE NOCASE ASC;",
    )?;
    let mut rows = stmt.query([bookmark_uuid])?;
    let mut tags = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        tags.push(value.to_lowercase());
    }
    Ok(tags)
}
