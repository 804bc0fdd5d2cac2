use crate::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coarse lifecycle tag of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Deleted,
    Inactive,
}

/// Status slice a view was opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    Active,
    Deleted,
    All,
}

impl StatusFilter {
    /// Whether a row currently tagged `row_status` belongs in a view opened with `self`.
    pub fn includes(self, row_status: Status) -> bool {
        should_include_in_status(self, row_status)
    }
}

/// `All` admits every row; otherwise the view status must equal the row status.
pub fn should_include_in_status(view_status: StatusFilter, row_status: Status) -> bool {
    match view_status {
        StatusFilter::All => true,
        StatusFilter::Active => row_status == Status::Active,
        StatusFilter::Deleted => row_status == Status::Deleted,
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Active => "active",
            Status::Deleted => "deleted",
            Status::Inactive => "inactive",
        })
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StatusFilter::Active => "active",
            StatusFilter::Deleted => "deleted",
            StatusFilter::All => "all",
        })
    }
}

impl FromStr for Status {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Status::Active),
            "deleted" => Ok(Status::Deleted),
            "inactive" => Ok(Status::Inactive),
            other => Err(SyncError::malformed(format!("unknown status '{}'", other))),
        }
    }
}

impl FromStr for StatusFilter {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(StatusFilter::Active),
            "deleted" => Ok(StatusFilter::Deleted),
            "all" => Ok(StatusFilter::All),
            other => Err(SyncError::InvalidParams(format!(
                "unknown view status '{}'",
                other
            ))),
        }
    }
}
