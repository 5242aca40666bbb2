//! Keyset pagination for list endpoints.
//!
//! Cursors are the base64-encoded id of the last item on a page. Ids are v7
//! UUIDs, so ordering by id descending is newest-first and stable under
//! concurrent inserts.
//!
//! ```rust,ignore
//! let page = params.validate()?;
//! let rows = JobPosting::list_for_user(user_id, &filter, &page, pool).await?;
//! let body = Page::from_rows(rows, &page, |job| job.id.into_uuid());
//! ```

use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: i64 = 25;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Opaque cursor (base64-encoded UUID).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor(Uuid);

impl Cursor {
    pub fn new(id: Uuid) -> Self {
        Cursor(id)
    }

    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0.as_bytes())
    }

    pub fn decode(s: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s)
            .context("Invalid cursor: not valid base64")?;
        let uuid = Uuid::from_slice(&bytes).context("Invalid cursor: not a valid UUID")?;
        Ok(Cursor(uuid))
    }

    pub fn into_uuid(self) -> Uuid {
        self.0
    }
}

/// Query-string pagination arguments (`?first=20&after=<cursor>`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub first: Option<i64>,
    pub after: Option<String>,
}

/// Validated pagination arguments ready for a query.
#[derive(Debug, Clone, Copy)]
pub struct ValidatedPage {
    pub limit: i64,
    pub after: Option<Uuid>,
}

impl ValidatedPage {
    /// Rows to fetch: one extra to detect whether another page exists.
    pub fn fetch_limit(&self) -> i64 {
        self.limit + 1
    }
}

impl PageParams {
    pub fn validate(&self) -> Result<ValidatedPage> {
        let limit = self.first.unwrap_or(DEFAULT_PAGE_SIZE);
        if limit < 1 {
            anyhow::bail!("first must be at least 1");
        }
        let after = self
            .after
            .as_deref()
            .map(Cursor::decode)
            .transpose()?
            .map(Cursor::into_uuid);

        Ok(ValidatedPage {
            limit: limit.min(MAX_PAGE_SIZE),
            after,
        })
    }
}

/// One page of results.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    /// Trim the look-ahead row and compute the next cursor.
    pub fn from_rows(mut rows: Vec<T>, page: &ValidatedPage, id_of: impl Fn(&T) -> Uuid) -> Self {
        let has_more = rows.len() as i64 > page.limit;
        rows.truncate(page.limit as usize);
        let next_cursor = if has_more {
            rows.last().map(|row| Cursor::new(id_of(row)).encode())
        } else {
            None
        };
        Self {
            items: rows,
            has_more,
            next_cursor,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            has_more: self.has_more,
            next_cursor: self.next_cursor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_roundtrip() {
        let id = Uuid::now_v7();
        let decoded = Cursor::decode(&Cursor::new(id).encode()).unwrap();
        assert_eq!(decoded.into_uuid(), id);
    }

    #[test]
    fn test_invalid_cursor_rejected() {
        assert!(Cursor::decode("not a cursor!").is_err());
        assert!(Cursor::decode("YWJj").is_err());
    }

    #[test]
    fn test_limit_defaults_and_clamps() {
        let page = PageParams::default().validate().unwrap();
        assert_eq!(page.limit, DEFAULT_PAGE_SIZE);

        let page = PageParams {
            first: Some(10_000),
            after: None,
        }
        .validate()
        .unwrap();
        assert_eq!(page.limit, MAX_PAGE_SIZE);

        assert!(PageParams {
            first: Some(0),
            after: None
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_from_rows_detects_next_page() {
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::now_v7()).collect();
        let page = ValidatedPage {
            limit: 2,
            after: None,
        };

        let result = Page::from_rows(ids.clone(), &page, |id| *id);
        assert!(result.has_more);
        assert_eq!(result.items.len(), 2);
        assert_eq!(
            result.next_cursor,
            Some(Cursor::new(ids[1]).encode())
        );

        let last = Page::from_rows(ids[..2].to_vec(), &page, |id| *id);
        assert!(!last.has_more);
        assert!(last.next_cursor.is_none());
    }
}
