//! Pagination primitives for catalog listings.

use serde::{Deserialize, Serialize};

/// Pagination parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

impl Pagination {
    /// Maximum items per page.
    const MAX_PER_PAGE: usize = 100;

    /// Default items per page.
    const DEFAULT_PER_PAGE: usize = 25;

    pub fn limit(&self) -> usize {
        self.per_page
            .unwrap_or(Self::DEFAULT_PER_PAGE)
            .clamp(1, Self::MAX_PER_PAGE)
    }

    pub fn offset(&self) -> usize {
        (self.current_page() - 1).saturating_mul(self.limit())
    }

    pub fn current_page(&self) -> usize {
        self.page.unwrap_or(1).max(1)
    }

    /// Slice one page out of an already filtered list.
    pub fn apply<T: Clone + Serialize>(&self, items: &[T]) -> PagedResult<T> {
        let page: Vec<T> = items
            .iter()
            .skip(self.offset())
            .take(self.limit())
            .cloned()
            .collect();
        PagedResult::new(page, items.len(), self)
    }
}

/// Paged result envelope.
#[derive(Debug, Clone, Serialize)]
pub struct PagedResult<T: Serialize> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
}

impl<T: Serialize> PagedResult<T> {
    pub fn new(items: Vec<T>, total: usize, pagination: &Pagination) -> Self {
        let per_page = pagination.limit();
        let total_pages = total.div_ceil(per_page);
        Self {
            items,
            total,
            page: pagination.current_page(),
            per_page,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults() {
        let p = Pagination::default();
        assert_eq!(p.limit(), 25);
        assert_eq!(p.offset(), 0);
        assert_eq!(p.current_page(), 1);
    }

    #[test]
    fn pagination_clamps_per_page() {
        let p = Pagination {
            page: Some(1),
            per_page: Some(500),
        };
        assert_eq!(p.limit(), 100);
    }

    #[test]
    fn pagination_offset_calculation() {
        let p = Pagination {
            page: Some(3),
            per_page: Some(10),
        };
        assert_eq!(p.offset(), 20);
    }

    #[test]
    fn apply_slices_the_requested_page() {
        let items: Vec<u32> = (1..=25).collect();
        let p = Pagination {
            page: Some(3),
            per_page: Some(10),
        };
        let result = p.apply(&items);
        assert_eq!(result.items, vec![21, 22, 23, 24, 25]);
        assert_eq!(result.total_pages, 3);
        assert_eq!(result.total, 25);
        assert_eq!(result.page, 3);
    }

    #[test]
    fn page_past_the_end_returns_no_items() {
        let p = Pagination {
            page: Some(usize::MAX),
            per_page: Some(50),
        };
        assert_eq!(p.offset(), usize::MAX);
        let result = p.apply(&[1, 2, 3]);
        assert!(result.items.is_empty());
        assert_eq!(result.total, 3);
    }
}
