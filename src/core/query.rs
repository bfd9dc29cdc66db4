//! Pagination state and response headers

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;

/// Current page number header
pub const PAGE_HEADER: &str = "x-adapt-page";
/// Page size header
pub const PAGE_SIZE_HEADER: &str = "x-adapt-pagesize";
/// Total page count header
pub const PAGE_TOTAL_HEADER: &str = "x-adapt-pagetotal";

/// Pagination state computed for one listing request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageState {
    /// Current page number (starts at 1)
    pub page: usize,

    /// Number of items per page
    pub page_size: usize,

    /// Total number of pages (at least 1)
    pub page_total: usize,

    /// Offset of the first item of the page
    pub skip: usize,
}

impl PageState {
    /// Compute pagination for `count` matching documents
    ///
    /// The page size is the requested limit, else `default_size`, clamped to
    /// `[1, max_size]`. The page is clamped to `[1, page_total]`. An explicit
    /// `skip` takes precedence over the page-derived offset.
    pub fn new(
        limit: Option<usize>,
        page: Option<i64>,
        skip: Option<usize>,
        count: usize,
        default_size: usize,
        max_size: usize,
    ) -> Self {
        let page_size = limit.unwrap_or(default_size).min(max_size).max(1);
        let page_total = count.div_ceil(page_size).max(1);
        let page = match page {
            Some(p) if p >= 1 => (p as usize).min(page_total),
            _ => 1,
        };
        let skip = skip.unwrap_or((page - 1) * page_size);

        Self {
            page,
            page_size,
            page_total,
            skip,
        }
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.page_total
    }

    /// Build an RFC 5988 `Link` value, or `None` when there is a single page
    ///
    /// `uri` is the request path and query as received. `page` and `limit`
    /// are dropped from the query and replaced by the target values.
    pub fn link_header(&self, uri: &str) -> Option<String> {
        if self.page_total <= 1 {
            return None;
        }
        let (base, query) = uri.split_once('?').unwrap_or((uri, ""));
        let kept = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter(|pair| {
                let key = pair.split_once('=').map_or(*pair, |(k, _)| k);
                key != "page" && key != "limit"
            })
            .map(str::to_string)
            .chain(std::iter::once(format!("limit={}", self.page_size)))
            .collect::<Vec<_>>()
            .join("&");

        let link = |page: usize, rel: &str| format!("<{}?{}&page={}>; rel=\"{}\"", base, kept, page, rel);

        let mut links = Vec::new();
        if self.has_prev() {
            links.push(link(1, "first"));
            links.push(link(self.page - 1, "prev"));
        }
        if self.has_next() {
            links.push(link(self.page + 1, "next"));
            links.push(link(self.page_total, "last"));
        }
        Some(links.join(", "))
    }

    /// Write the pagination headers onto a response
    pub fn apply_headers(&self, headers: &mut HeaderMap, uri: &str) {
        headers.insert(PAGE_HEADER, HeaderValue::from(self.page));
        headers.insert(PAGE_SIZE_HEADER, HeaderValue::from(self.page_size));
        headers.insert(PAGE_TOTAL_HEADER, HeaderValue::from(self.page_total));

        if let Some(link) = self.link_header(uri) {
            match HeaderValue::from_str(&link) {
                Ok(value) => {
                    headers.insert(HeaderName::from_static("link"), value);
                }
                Err(e) => tracing::warn!("failed to set Link header: {}", e),
            }
        }
    }
}
