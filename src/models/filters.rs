use serde::Serialize;

use crate::validator::{permitted_value, Validator};

/// Sort keys accepted by the movie listing
pub const MOVIE_SORT_SAFELIST: &[&str] = &[
    "id", "title", "year", "runtime", "-id", "-title", "-year", "-runtime",
];

/// Columns a listing may be ordered by
///
/// Query text only ever contains these fixed column names, never the raw
/// `sort` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Id,
    Title,
    Year,
    Runtime,
}

impl SortColumn {
    pub fn column(&self) -> &'static str {
        match self {
            SortColumn::Id => "id",
            SortColumn::Title => "title",
            SortColumn::Year => "year",
            SortColumn::Runtime => "runtime",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "id" => Some(SortColumn::Id),
            "title" => Some(SortColumn::Title),
            "year" => Some(SortColumn::Year),
            "runtime" => Some(SortColumn::Runtime),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

/// A validated sort key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    pub column: SortColumn,
    pub direction: SortDirection,
}

/// Paging and ordering requested for a listing
#[derive(Debug, Clone)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    pub sort: String,
    pub sort_safelist: &'static [&'static str],
}

impl Filters {
    /// Resolve `sort` against the safelist
    ///
    /// Returns `None` for anything outside it.
    pub fn sort_order(&self) -> Option<SortOrder> {
        if !permitted_value(&self.sort.as_str(), self.sort_safelist) {
            return None;
        }
        let (name, direction) = match self.sort.strip_prefix('-') {
            Some(name) => (name, SortDirection::Descending),
            None => (self.sort.as_str(), SortDirection::Ascending),
        };
        SortColumn::parse(name).map(|column| SortOrder { column, direction })
    }

    /// Whether paging values can address any rows at all
    pub fn is_pageable(&self) -> bool {
        self.page >= 1 && self.page_size >= 1
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

pub fn validate_filters(v: &mut Validator, filters: &Filters) {
    v.check(filters.page > 0, "page", "must be greater than zero");
    v.check(filters.page <= 10_000_000, "page", "must be a maximum of 10 million");
    v.check(filters.page_size > 0, "page_size", "must be greater than zero");
    v.check(filters.page_size <= 100, "page_size", "must be a maximum of 100");
    v.check(filters.sort_order().is_some(), "sort", "invalid sort value");
}

/// Pagination details returned alongside a listing
///
/// All fields are omitted when no records matched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "is_zero")]
    pub current_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub page_size: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub first_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub last_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub total_records: i64,
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

impl Metadata {
    pub fn calculate(total_records: i64, page: i64, page_size: i64) -> Self {
        if total_records == 0 || page_size < 1 {
            return Self::default();
        }
        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: (total_records + page_size - 1) / page_size,
            total_records,
        }
    }
}
