//! Offset pagination helpers.

use serde::Serialize;

pub const DEFAULT_PAGE: u64 = 0;
pub const DEFAULT_LIMIT: u64 = 10;

/// Zero-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub limit: u64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PageRequest {
    pub fn new(page: Option<u64>, limit: Option<u64>) -> Self {
        Self {
            page: page.unwrap_or(DEFAULT_PAGE),
            limit: limit.unwrap_or(DEFAULT_LIMIT),
        }
    }

    /// Number of items preceding this page, saturating on overflow.
    pub fn offset(&self) -> u64 {
        self.page.saturating_mul(self.limit)
    }
}

/// One page of results with totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub count: u64,
    pub page: u64,
    pub limit: u64,
    pub pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, count: u64, request: PageRequest) -> Self {
        Self {
            items,
            count,
            page: request.page,
            limit: request.limit,
            pages: page_count(count, request.limit),
        }
    }
}

/// Pages needed to show `count` items, `limit` at a time.
pub fn page_count(count: u64, limit: u64) -> u64 {
    if limit == 0 {
        return 0;
    }
    count.div_ceil(limit)
}
