//! Cursor pagination and lazy enumeration of live users.

use std::sync::Arc;

use futures::stream::{self, Stream, TryStreamExt};
use serde::Serialize;

use common::{AppError, AppResult};
use domain::{UserId, UserRecord, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

use super::UserStore;

/// Keyset pagination request: records with id strictly after `cursor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub cursor: Option<UserId>,
    pub limit: u64,
}

impl PageRequest {
    /// First page
    pub fn first(limit: u64) -> Self {
        Self {
            cursor: None,
            limit,
        }
    }

    /// Page following `cursor`
    pub fn after(cursor: UserId, limit: u64) -> Self {
        Self {
            cursor: Some(cursor),
            limit,
        }
    }

    /// Get limit clamped to `1..=MAX_PAGE_SIZE`
    pub fn limit(&self) -> u64 {
        self.limit.clamp(1, MAX_PAGE_SIZE)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first(DEFAULT_PAGE_SIZE)
    }
}

/// One page of records in ascending id order.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cursor for the next page; `None` once the sequence is exhausted
    pub next_cursor: Option<UserId>,
}

impl Page<UserRecord> {
    /// Build a page from a batch fetched with `limit`.
    ///
    /// A short batch means nothing follows it.
    pub fn from_batch(items: Vec<UserRecord>, limit: u64) -> Self {
        let next_cursor = if items.len() as u64 >= limit {
            items.last().map(|record| record.id)
        } else {
            None
        };
        Self { items, next_cursor }
    }
}

enum Position {
    Start(Option<UserId>),
    After(UserId),
    Done,
}

/// Lazily walk every live user, one page at a time.
///
/// Nothing is fetched until the stream is polled. Passing the id of the last
/// record seen as `start` resumes the walk from there.
pub fn stream_users(
    store: Arc<dyn UserStore>,
    start: Option<UserId>,
    page_size: u64,
) -> impl Stream<Item = AppResult<UserRecord>> + Send {
    stream::try_unfold(
        (store, Position::Start(start)),
        move |(store, position)| async move {
            let request = match position {
                Position::Done => return Ok::<_, AppError>(None),
                Position::Start(cursor) => PageRequest {
                    cursor,
                    limit: page_size,
                },
                Position::After(cursor) => PageRequest::after(cursor, page_size),
            };

            let page = store.list(request).await?;
            let next = match page.next_cursor {
                Some(cursor) => Position::After(cursor),
                None => Position::Done,
            };

            let batch = stream::iter(page.items.into_iter().map(Ok::<_, AppError>));
            Ok::<_, AppError>(Some((batch, (store, next))))
        },
    )
    .try_flatten()
}
