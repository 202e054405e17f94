//! Pagination utilities for list endpoints

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Pagination query parameters
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PaginationParams {
    /// Page number (1-indexed)
    pub page: Option<u32>,

    /// Items per page
    pub per_page: Option<u32>,
}

impl PaginationParams {
    pub const DEFAULT_PER_PAGE: u32 = 20;
    pub const MAX_PER_PAGE: u32 = 100;

    /// Clamped page size
    pub fn per_page(&self) -> u32 {
        self.per_page
            .unwrap_or(Self::DEFAULT_PER_PAGE)
            .clamp(1, Self::MAX_PER_PAGE)
    }

    /// Page number, minimum 1
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    /// SQL OFFSET, ready to bind
    pub fn offset(&self) -> i64 {
        (self.page() as i64 - 1) * self.per_page() as i64
    }

    /// SQL LIMIT, ready to bind
    pub fn limit(&self) -> i64 {
        self.per_page() as i64
    }
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PaginationMeta {
    pub fn new(params: &PaginationParams, total_items: u64) -> Self {
        let per_page = params.per_page();
        let page = params.page();
        let total_pages = total_items.div_ceil(per_page as u64) as u32;

        Self {
            page,
            per_page,
            total_items,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

/// Paginated response wrapper
#[derive(Debug, Serialize)]
pub struct Paginated<T: Serialize> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T: Serialize> Paginated<T> {
    pub fn new(data: Vec<T>, params: &PaginationParams, total_items: i64) -> Self {
        Self {
            data,
            pagination: PaginationMeta::new(params, total_items.max(0) as u64),
        }
    }
}

impl<T: Serialize> IntoResponse for Paginated<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(page: Option<u32>, per_page: Option<u32>) -> PaginationParams {
        PaginationParams { page, per_page }
    }

    #[test]
    fn defaults_and_clamping() {
        let p = params(None, None);
        assert_eq!(p.page(), 1);
        assert_eq!(p.per_page(), 20);
        assert_eq!(p.offset(), 0);

        let p = params(Some(0), Some(500));
        assert_eq!(p.page(), 1);
        assert_eq!(p.per_page(), 100);

        let p = params(Some(3), Some(0));
        assert_eq!(p.per_page(), 1);
        assert_eq!(p.offset(), 2);
    }

    #[test]
    fn offset_uses_page_size() {
        let p = params(Some(4), Some(25));
        assert_eq!(p.offset(), 75);
        assert_eq!(p.limit(), 25);
    }

    #[test]
    fn meta_page_counts() {
        let meta = PaginationMeta::new(&params(Some(2), Some(10)), 25);
        assert_eq!(meta.total_pages, 3);
        assert!(meta.has_next);
        assert!(meta.has_prev);

        let meta = PaginationMeta::new(&params(Some(1), Some(10)), 0);
        assert_eq!(meta.total_pages, 0);
        assert!(!meta.has_next);
        assert!(!meta.has_prev);

        let meta = PaginationMeta::new(&params(Some(3), Some(10)), 30);
        assert!(!meta.has_next);
    }
}
