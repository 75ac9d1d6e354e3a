//! # Pagination
//!
//! Page arithmetic shared by the album and photo listings. A page number
//! below 1 (or one that does not parse) becomes 1; a page past the end is
//! clamped to the last page.

use std::num::IntErrorKind;

use serde::{Deserialize, Serialize};

/// Pagination query parameters
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<String>,
}

impl PageQuery {
    /// Returns the requested page number, falling back to 1 for missing or
    /// malformed input. Numbers too large for `u32` saturate, so they still
    /// clamp to the last page.
    pub fn requested(&self) -> u32 {
        let Some(raw) = self.page.as_deref() else {
            return 1;
        };
        match raw.trim().parse::<u32>() {
            Ok(page) if page >= 1 => page,
            Err(e) if *e.kind() == IntErrorKind::PosOverflow => u32::MAX,
            _ => 1,
        }
    }
}

/// Paginated response wrapper
#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub pagination: PaginationInfo,
}

/// Pagination metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaginationInfo {
    pub page: u32,
    pub limit: u32,
    pub total: u32,
    pub total_pages: u32,
}

impl PaginationInfo {
    /// Computes the effective page for `requested` given `total` items.
    pub fn new(requested: u32, limit: u32, total: i64) -> Self {
        let total = u32::try_from(total.max(0)).unwrap_or(u32::MAX);
        let total_pages = total.div_ceil(limit);
        let page = if total_pages > 0 {
            requested.clamp(1, total_pages)
        } else {
            1
        };

        Self {
            page,
            limit,
            total,
            total_pages,
        }
    }

    pub fn offset(&self) -> u32 {
        (self.page - 1) * self.limit
    }
}
