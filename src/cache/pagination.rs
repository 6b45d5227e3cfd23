//! Page-number pagination and the index windows it maps to.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaginationError {
    #[error("page is zero; pagination begins with page = 1")]
    ZeroPage,
    #[error("page size must be greater than zero")]
    ZeroSize,
    #[error("pagination `{field}` must be a positive integer, got `{value}`")]
    NotNumeric { field: &'static str, value: String },
    #[error("pagination window for page {page} of size {size} overflows")]
    Overflow { page: u64, size: u64 },
}

/// Requested page, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pagination {
    page: u64,
    size: u64,
    range: Range,
}

/// Half-open index window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: u64,
    pub end: u64,
}

impl Pagination {
    pub fn new(page: u64, size: u64) -> Result<Self, PaginationError> {
        if page == 0 {
            return Err(PaginationError::ZeroPage);
        }
        if size == 0 {
            return Err(PaginationError::ZeroSize);
        }

        let overflow = || PaginationError::Overflow { page, size };
        let start = (page - 1).checked_mul(size).ok_or_else(overflow)?;
        let end = page.checked_mul(size).ok_or_else(overflow)?;

        Ok(Self {
            page,
            size,
            range: Range { start, end },
        })
    }

    /// Build from loosely-typed inputs: JSON numbers or numeric strings.
    pub fn from_json(
        page: &serde_json::Value,
        size: &serde_json::Value,
    ) -> Result<Self, PaginationError> {
        Self::new(parse_count("page", page)?, parse_count("size", size)?)
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn range(&self) -> Range {
        self.range
    }
}

impl Range {
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when `other` lies entirely inside this window.
    pub fn contains(&self, other: &Range) -> bool {
        self.start <= other.start && self.end >= other.end
    }
}

fn parse_count(field: &'static str, value: &serde_json::Value) -> Result<u64, PaginationError> {
    let not_numeric = || PaginationError::NotNumeric {
        field,
        value: value.to_string(),
    };

    match value {
        serde_json::Value::Number(number) => number.as_u64().ok_or_else(not_numeric),
        serde_json::Value::String(text) => text.trim().parse::<u64>().map_err(|_| not_numeric()),
        _ => Err(not_numeric()),
    }
}
