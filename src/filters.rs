// src/filters.rs
//! Listing filters: sort resolution against a safelist and page arithmetic.
//!
//! Caller-supplied sort strings never reach SQL directly. They are checked
//! against the safelist, then mapped onto [`SortField`], whose column names are
//! a fixed table.
use serde::Serialize;

use crate::error::{StoreError, StoreResult};

/// Sort expressions accepted by the public listing.
pub const POLL_SORT_SAFELIST: &[&str] = &[
    "created_at",
    "question",
    "updated_at",
    "expires_at",
    "-created_at",
    "-question",
    "-updated_at",
    "-expires_at",
];

const DESCENDING_MARKER: char = '-';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    Question,
    UpdatedAt,
    ExpiresAt,
}

impl SortField {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "created_at" => Some(SortField::CreatedAt),
            "question" => Some(SortField::Question),
            "updated_at" => Some(SortField::UpdatedAt),
            "expires_at" => Some(SortField::ExpiresAt),
            _ => None,
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::Question => "question",
            SortField::UpdatedAt => "updated_at",
            SortField::ExpiresAt => "expires_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn keyword(self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    pub sort: String,
    pub sort_safelist: Vec<String>,
}

impl Filters {
    pub fn new(page: i64, page_size: i64, sort: impl Into<String>) -> Self {
        Self {
            page,
            page_size,
            sort: sort.into(),
            sort_safelist: POLL_SORT_SAFELIST.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn resolve_sort(&self) -> StoreResult<(SortField, SortDirection)> {
        resolve_sort(&self.sort, &self.sort_safelist)
    }

    pub fn limit(&self) -> i64 {
        limit(self.page_size)
    }

    pub fn offset(&self) -> i64 {
        offset(self.page, self.page_size)
    }
}

/// Resolves `requested` against `safelist`. A leading `-` selects descending order.
pub fn resolve_sort<S: AsRef<str>>(
    requested: &str,
    safelist: &[S],
) -> StoreResult<(SortField, SortDirection)> {
    let (name, direction) = match requested.strip_prefix(DESCENDING_MARKER) {
        Some(name) => (name, SortDirection::Descending),
        None => (requested, SortDirection::Ascending),
    };

    let permitted = safelist
        .iter()
        .map(|entry| entry.as_ref())
        .any(|entry| entry.trim_start_matches(DESCENDING_MARKER) == name);

    match SortField::from_name(name) {
        Some(field) if permitted && !name.is_empty() => Ok((field, direction)),
        _ => Err(StoreError::InvalidSortField(requested.to_string())),
    }
}

pub fn limit(page_size: i64) -> i64 {
    page_size
}

pub fn offset(page: i64, page_size: i64) -> i64 {
    (page - 1) * page_size
}

/// Pagination summary returned alongside a listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    pub current_page: i64,
    pub page_size: i64,
    pub first_page: i64,
    pub last_page: i64,
    pub total_records: i64,
}

pub fn build_metadata(total: i64, page: i64, page_size: i64) -> Metadata {
    if total == 0 {
        return Metadata::default();
    }

    Metadata {
        current_page: page,
        page_size,
        first_page: 1,
        last_page: (total + page_size - 1) / page_size,
        total_records: total,
    }
}
