#[cfg(feature = "sea-orm")]
use sea_orm::prelude::StringLen;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a generation job.
///
/// A job enters `Processing` when it is created and leaves it exactly once,
/// into one of the two terminal states.
///
/// When the `sea-orm` feature is enabled, this enum can be used directly in SeaORM entities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "PascalCase")]
pub enum GenerationStatus {
    /// The worker has been scheduled or is running.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "Processing"))]
    Processing,
    /// The worker stored a result image.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "Completed"))]
    Completed,
    /// The worker gave up; no result image exists.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "Failed"))]
    Failed,
}

/// Rejected status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid status transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: GenerationStatus,
    pub to: GenerationStatus,
}

impl GenerationStatus {
    /// All possible status values.
    pub const ALL: &'static [GenerationStatus] = &[Self::Processing, Self::Completed, Self::Failed];

    /// Returns true once the job can no longer change status.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }

    /// States reachable from this one in a single step.
    pub fn allowed_transitions(&self) -> &'static [GenerationStatus] {
        match self {
            Self::Processing => &[Self::Completed, Self::Failed],
            Self::Completed | Self::Failed => &[],
        }
    }

    pub fn can_transition_to(&self, next: GenerationStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Validate a status change.
    ///
    /// Re-asserting the current status is accepted as a no-op so partial
    /// patches can carry the status field unchanged.
    pub fn transition_to(self, next: GenerationStatus) -> Result<GenerationStatus, TransitionError> {
        if self == next || self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }

    /// Returns the string representation (PascalCase).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "Processing",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for GenerationStatus {
    fn default() -> Self {
        Self::Processing
    }
}

/// Error when parsing an invalid status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatusError {
    invalid: String,
}

impl fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid status '{}'. Valid values: {}",
            self.invalid,
            GenerationStatus::ALL
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl std::error::Error for ParseStatusError {}

impl FromStr for GenerationStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Processing" => Ok(Self::Processing),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            _ => Err(ParseStatusError {
                invalid: s.to_string(),
            }),
        }
    }
}
