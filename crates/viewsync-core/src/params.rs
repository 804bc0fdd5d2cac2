use crate::{Result, StatusFilter, SyncError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameters a paginated view was opened with; the cache key of that view.
///
/// Filters live in an ordered map, so two params built with the same filters in
/// a different order compare and hash identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "ViewParamsRepr")]
pub struct ViewParams {
    status: StatusFilter,
    page: u32,
    limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    search: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    filters: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct ViewParamsRepr {
    #[serde(default)]
    status: StatusFilter,
    #[serde(default = "default_page")]
    page: u32,
    limit: u32,
    #[serde(default)]
    search: Option<String>,
    #[serde(default)]
    filters: BTreeMap<String, String>,
}

fn default_page() -> u32 {
    1
}

impl TryFrom<ViewParamsRepr> for ViewParams {
    type Error = SyncError;

    fn try_from(repr: ViewParamsRepr) -> Result<Self> {
        let mut params = ViewParams::new(repr.status, repr.page, repr.limit)?;
        params.search = repr.search;
        params.filters = repr.filters;
        Ok(params)
    }
}

impl ViewParams {
    pub fn new(status: StatusFilter, page: u32, limit: u32) -> Result<Self> {
        if page == 0 {
            return Err(SyncError::InvalidParams("page must be >= 1".into()));
        }
        if limit == 0 {
            return Err(SyncError::InvalidParams("limit must be > 0".into()));
        }
        Ok(Self {
            status,
            page,
            limit,
            search: None,
            filters: BTreeMap::new(),
        })
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    /// Same view family on another page.
    pub fn with_page(&self, page: u32) -> Result<Self> {
        if page == 0 {
            return Err(SyncError::InvalidParams("page must be >= 1".into()));
        }
        Ok(Self {
            page,
            ..self.clone()
        })
    }

    pub fn status(&self) -> StatusFilter {
        self.status
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn filters(&self) -> &BTreeMap<String, String> {
        &self.filters
    }

    pub fn is_first_page(&self) -> bool {
        self.page == 1
    }

    /// True when both params select the same rows and differ at most in `page`.
    pub fn same_family(&self, other: &ViewParams) -> bool {
        self.status == other.status
            && self.limit == other.limit
            && self.search == other.search
            && self.filters == other.filters
    }
}
