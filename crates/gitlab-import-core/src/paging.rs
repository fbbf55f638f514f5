use thiserror::Error;
use tracing::{debug, error};

/// Page index passed to listing calls to request the provider's first page.
pub const FIRST_PAGE: i64 = 0;

/// Returned by [`PagingCursor::next`] once the collection is exhausted.
pub const END_OF_COLLECTION: i64 = -1;

/// Paging metadata of one listing response.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PagingCursor {
    pub total_items: i64,
    pub total_pages: i64,
    pub items_per_page: i64,
    pub current_page: i64,
    pub next_page: i64,
    pub previous_page: i64,
}

impl PagingCursor {
    /// Cursor for a response that holds the whole collection.
    pub fn single_page(total_items: i64) -> Self {
        Self {
            total_items,
            total_pages: 1,
            items_per_page: total_items.max(1),
            current_page: 1,
            next_page: 0,
            previous_page: 0,
        }
    }

    /// Page to request next, or [`END_OF_COLLECTION`].
    ///
    /// The provider's own `next_page` is trusted as-is while pages remain.
    pub fn next(&self) -> i64 {
        if self.current_page >= self.total_pages {
            debug!(page = self.total_pages, "found end of collection");
            return END_OF_COLLECTION;
        }
        debug!(
            current_page = self.current_page,
            next_page = self.next_page,
            total_pages = self.total_pages,
            "fetching next page"
        );
        self.next_page
    }
}

/// A listing response whose next page does not move past the current one.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
#[error("paging stalled: page {current_page} points to next page {next_page}")]
pub struct StalledPaging {
    pub current_page: i64,
    pub next_page: i64,
}

#[derive(Clone, Debug, Default)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub paging: PagingCursor,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, paging: PagingCursor) -> Self {
        Self { items, paging }
    }
}

/// Walks a paged listing from the first page until the cursor reports the end.
///
/// A fetch error stops the walk immediately. `consume` only sees non-empty pages.
/// A cursor whose next page does not move past the current one fails the walk.
pub fn walk_pages<T, E>(
    mut fetch: impl FnMut(i64) -> Result<Page<T>, E>,
    mut consume: impl FnMut(Vec<T>) -> Result<(), E>,
) -> Result<(), E>
where
    E: From<StalledPaging>,
{
    let mut page = FIRST_PAGE;
    while page >= 0 {
        let listed = fetch(page)?;
        if !listed.items.is_empty() {
            consume(listed.items)?;
        }
        let next = listed.paging.next();
        if next != END_OF_COLLECTION && next <= listed.paging.current_page {
            let stalled = StalledPaging {
                current_page: listed.paging.current_page,
                next_page: next,
            };
            error!(
                current_page = stalled.current_page,
                next_page = stalled.next_page,
                "paging cursor does not advance"
            );
            return Err(stalled.into());
        }
        page = next;
    }
    Ok(())
}
