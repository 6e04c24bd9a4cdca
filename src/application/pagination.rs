//! Cursor and offset pagination helpers.
//!
//! A listing is either windowed by `skip`/`limit` (page-number UIs, results
//! may shift under concurrent writes) or by an opaque cursor naming the last
//! row seen (stable under inserts at the head, no total count). Both produce
//! the same `{ data, pagination }` envelope.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, QueryBuilder};
use thiserror::Error;
use time::OffsetDateTime;

/// Position of the last row returned: its id, plus its ordering timestamp
/// when the listing is not ordered by id alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub id: i64,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub ts: Option<OffsetDateTime>,
}

impl Cursor {
    pub fn from_id(id: i64) -> Self {
        Self { id, ts: None }
    }

    pub fn with_time(id: i64, ts: OffsetDateTime) -> Self {
        Self { id, ts: Some(ts) }
    }

    pub fn encode(&self) -> String {
        let serialized =
            serde_json::to_vec(self).expect("serializing cursor payload should succeed");
        URL_SAFE_NO_PAD.encode(serialized)
    }

    pub fn decode(cursor: &str) -> Result<Self, PaginationError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(cursor.trim())
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|err| PaginationError::InvalidCursor(err.to_string()))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaginationError {
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
    #[error("cursor is missing the `{0}` sort key")]
    MissingSortKey(&'static str),
    #[error("invalid pagination query: {0}")]
    InvalidQuery(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn keyword(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    fn comparator(self) -> &'static str {
        match self {
            SortDirection::Asc => ">",
            SortDirection::Desc => "<",
        }
    }
}

/// Ordering for keyset pagination.
///
/// `sort_column` may be non-unique (a creation timestamp); `tie_break` must
/// be unique so that every row has a single position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeysetOrder {
    pub sort_column: &'static str,
    pub tie_break: &'static str,
    pub direction: SortDirection,
}

impl KeysetOrder {
    pub const fn newest_first(sort_column: &'static str, tie_break: &'static str) -> Self {
        Self {
            sort_column,
            tie_break,
            direction: SortDirection::Desc,
        }
    }

    fn orders_by_tie_break_only(&self) -> bool {
        self.sort_column == self.tie_break
    }

    /// Append ` AND <boundary>` restricting rows to those after `cursor`.
    pub fn push_boundary<'args>(
        &self,
        qb: &mut QueryBuilder<'args, Postgres>,
        cursor: &Cursor,
    ) -> Result<(), PaginationError> {
        let comparator = self.direction.comparator();

        if self.orders_by_tie_break_only() {
            qb.push(format_args!(" AND {} {} ", self.tie_break, comparator));
            qb.push_bind(cursor.id);
            return Ok(());
        }

        let ts = cursor
            .ts
            .ok_or(PaginationError::MissingSortKey(self.sort_column))?;
        qb.push(format_args!(
            " AND ({}, {}) {} (",
            self.sort_column, self.tie_break, comparator
        ));
        qb.push_bind(ts);
        qb.push(", ");
        qb.push_bind(cursor.id);
        qb.push(")");
        Ok(())
    }

    pub fn push_order_by<'args>(&self, qb: &mut QueryBuilder<'args, Postgres>) {
        let direction = self.direction.keyword();
        if self.orders_by_tie_break_only() {
            qb.push(format_args!(" ORDER BY {} {}", self.tie_break, direction));
        } else {
            qb.push(format_args!(
                " ORDER BY {} {}, {} {}",
                self.sort_column, direction, self.tie_break, direction
            ));
        }
    }

    fn cursor_for<R: KeysetRow>(&self, row: &R) -> Cursor {
        if self.orders_by_tie_break_only() {
            Cursor::from_id(row.keyset_id())
        } else {
            Cursor::with_time(row.keyset_id(), row.keyset_time())
        }
    }
}

/// Rows that can name their own keyset position.
pub trait KeysetRow {
    fn keyset_id(&self) -> i64;
    fn keyset_time(&self) -> OffsetDateTime;
}

/// Validated window over a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRequest {
    Cursor { cursor: Option<Cursor>, limit: u32 },
    Offset { skip: u64, limit: u32 },
}

impl PageRequest {
    pub fn first_page(limit: u32) -> Self {
        Self::Offset { skip: 0, limit }
    }

    pub fn limit(&self) -> u32 {
        match self {
            PageRequest::Cursor { limit, .. } | PageRequest::Offset { limit, .. } => *limit,
        }
    }

    pub fn is_offset(&self) -> bool {
        matches!(self, PageRequest::Offset { .. })
    }

    /// Canonical text form used in cache keys.
    pub fn cache_fragment(&self) -> String {
        match self {
            PageRequest::Cursor {
                cursor: Some(cursor),
                limit,
            } => format!("cursor={};limit={limit}", cursor.encode()),
            PageRequest::Cursor {
                cursor: None,
                limit,
            } => format!("cursor=;limit={limit}"),
            PageRequest::Offset { skip, limit } => format!("skip={skip};limit={limit}"),
        }
    }

    /// Append the cursor boundary (cursor mode), if any.
    pub fn push_boundary<'args>(
        &self,
        qb: &mut QueryBuilder<'args, Postgres>,
        order: &KeysetOrder,
    ) -> Result<(), PaginationError> {
        match self {
            PageRequest::Cursor {
                cursor: Some(cursor),
                ..
            } => order.push_boundary(qb, cursor),
            _ => Ok(()),
        }
    }

    /// Append `LIMIT` with one look-ahead row, plus `OFFSET` in offset mode.
    pub fn push_limit<'args>(&self, qb: &mut QueryBuilder<'args, Postgres>) {
        qb.push(" LIMIT ");
        qb.push_bind(i64::from(self.limit()) + 1);
        if let PageRequest::Offset { skip, .. } = self {
            qb.push(" OFFSET ");
            qb.push_bind(i64::try_from(*skip).unwrap_or(i64::MAX));
        }
    }

    /// Trim the look-ahead row and build the envelope.
    ///
    /// `rows` may hold up to `limit + 1` items; `total` is only known in offset mode.
    pub fn finish<T: KeysetRow>(
        &self,
        mut rows: Vec<T>,
        total: Option<u64>,
        order: &KeysetOrder,
    ) -> Paginated<T> {
        let limit = self.limit();
        let has_next = rows.len() > limit as usize;
        rows.truncate(limit as usize);

        let pagination = match self {
            PageRequest::Offset { skip, .. } => {
                let limit_u64 = u64::from(limit.max(1));
                PaginationMeta {
                    page: Some((skip / limit_u64).saturating_add(1)),
                    limit,
                    total,
                    total_pages: total.map(|total| total.div_ceil(limit_u64)),
                    has_next,
                    has_prev: *skip > 0,
                    skip: Some(*skip),
                    next_cursor: None,
                }
            }
            PageRequest::Cursor { cursor, .. } => PaginationMeta {
                page: None,
                limit,
                total: None,
                total_pages: None,
                has_next,
                has_prev: cursor.is_some(),
                skip: None,
                next_cursor: if has_next {
                    rows.last().map(|row| order.cursor_for(row).encode())
                } else {
                    None
                },
            },
        };

        Paginated {
            data: rows,
            pagination,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u64>,
    pub has_next: bool,
    pub has_prev: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// JSON envelope returned by listing endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Bounds applied to the `limit` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
        }
    }
}

const MAX_SKIP: u64 = i64::MAX as u64;

/// Raw pagination query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    pub cursor: Option<String>,
    pub skip: Option<u64>,
    pub page: Option<u64>,
    pub limit: Option<u32>,
}

impl ListQuery {
    /// Validate the parameters, clamping `limit` into `1..=max_limit`.
    /// Resolve the raw parameters into a window.
    ///
    /// `skip` is capped at the largest offset Postgres accepts.
    pub fn into_request(self, limits: PageLimits) -> Result<PageRequest, PaginationError> {
        let limit = self
            .limit
            .unwrap_or(limits.default_limit)
            .clamp(1, limits.max_limit.max(1));

        if self.cursor.is_some() && (self.skip.is_some() || self.page.is_some()) {
            return Err(PaginationError::InvalidQuery(
                "cursor cannot be combined with skip or page".to_string(),
            ));
        }
        if self.skip.is_some() && self.page.is_some() {
            return Err(PaginationError::InvalidQuery(
                "skip and page are mutually exclusive".to_string(),
            ));
        }

        if let Some(raw) = self.cursor {
            let cursor = if raw.trim().is_empty() {
                None
            } else {
                Some(Cursor::decode(&raw)?)
            };
            return Ok(PageRequest::Cursor { cursor, limit });
        }

        let skip = match self.page {
            Some(0) => {
                return Err(PaginationError::InvalidQuery(
                    "page numbers start at 1".to_string(),
                ));
            }
            Some(page) => (page - 1).saturating_mul(u64::from(limit)),
            None => self.skip.unwrap_or(0),
        }
        .min(MAX_SKIP);

        Ok(PageRequest::Offset { skip, limit })
    }
}
