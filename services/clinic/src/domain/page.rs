use serde::{Deserialize, Serialize};

/// Requested slice of a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRequest {
    /// Zero-based page number
    pub page: usize,
    /// Page size, at least 1
    pub size: usize,
}

impl PageRequest {
    /// Create a page request. A zero size is raised to 1.
    #[must_use]
    pub fn new(page: usize, size: usize) -> Self {
        Self {
            page,
            size: size.max(1),
        }
    }

    /// Index of the first element of the page.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.page.saturating_mul(self.size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, 5)
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Elements of this page
    pub content: Vec<T>,
    /// The request this page answers
    pub request: PageRequest,
    /// Total number of matching elements
    pub total_elements: usize,
}

impl<T> Page<T> {
    /// Cut the page described by `request` out of `all`.
    #[must_use]
    pub fn of(all: Vec<T>, request: PageRequest) -> Self {
        let total_elements = all.len();
        let content = all
            .into_iter()
            .skip(request.offset())
            .take(request.size)
            .collect();
        Self {
            content,
            request,
            total_elements,
        }
    }

    /// Number of pages needed for every element.
    #[must_use]
    pub const fn total_pages(&self) -> usize {
        self.total_elements.div_ceil(self.request.size)
    }
}
