use gitlab_import_core::paging::PagingCursor;
use reqwest::header::HeaderMap;

/// Reads GitLab's offset pagination headers into a cursor. Missing or empty
/// headers count as zero.
///
/// GitLab drops `x-total` and `x-total-pages` on large collections; the page
/// count then extends to whatever `x-next-page` announces.
pub(crate) fn paging_from_headers(headers: &HeaderMap) -> PagingCursor {
    let current_page = int_header(headers, "x-page");
    let next_page = int_header(headers, "x-next-page");
    let mut total_pages = int_header(headers, "x-total-pages");
    if headers.get("x-total-pages").is_none() {
        total_pages = current_page.max(next_page);
    }
    PagingCursor {
        total_items: int_header(headers, "x-total"),
        total_pages,
        items_per_page: int_header(headers, "x-per-page"),
        current_page,
        next_page,
        previous_page: int_header(headers, "x-prev-page"),
    }
}

fn int_header(headers: &HeaderMap, name: &str) -> i64 {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<i64>().ok())
        .unwrap_or(0)
}
