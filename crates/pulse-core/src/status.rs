//! Status lattice shared by records and reports.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Health status of a single heartbeat or an aggregate report.
///
/// Variants are declared in severity order so the derived `Ord` gives
/// `Ok < Degraded < Failed`; `max` over statuses is the severity join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Nothing abnormal observed.
    #[default]
    Ok,
    /// Soft problem: the system works but something needs attention.
    Degraded,
    /// Hard problem.
    Failed,
}

impl Status {
    /// All variants in severity order.
    pub const ALL: [Self; 3] = [Self::Ok, Self::Degraded, Self::Failed];

    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
        }
    }

    /// An incident is any non-`ok` status.
    #[must_use]
    pub const fn is_incident(self) -> bool {
        !matches!(self, Self::Ok)
    }

    /// Coarse risk summary used for higher-tier digests.
    #[must_use]
    pub const fn risk_level(self) -> RiskLevel {
        match self {
            Self::Ok => RiskLevel::Green,
            Self::Degraded => RiskLevel::Amber,
            Self::Failed => RiskLevel::Red,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not one of `ok | degraded | failed`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(Self::Ok),
            "degraded" => Ok(Self::Degraded),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Three-value risk summary of a report's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Status `ok`.
    Green,
    /// Status `degraded`.
    Amber,
    /// Status `failed`.
    Red,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Green => "green",
            Self::Amber => "amber",
            Self::Red => "red",
        })
    }
}
