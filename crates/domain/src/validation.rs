//! Validation issues attached to parse results

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a validation issue
///
/// `Error` issues abort the affected feature; `Warning` and `Info` are
/// informational and reported to the caller alongside the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Machine-readable issue codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    InvalidElement,
    InvalidElementType,
    InvalidId,
    InvalidCoordinates,
    InsufficientNodes,
    MissingNode,
    MissingWay,
    InsufficientCoordinates,
    NoOuterRing,
    UnclosedRing,
    MissingAdminLevel,
    InvalidAdminLevel,
    MissingName,
    MissingGreekName,
    InvalidPopulation,
    InvalidArea,
    OverpassRemark,
}

impl IssueCode {
    /// Wire representation, e.g. `INSUFFICIENT_COORDINATES`
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidElement => "INVALID_ELEMENT",
            Self::InvalidElementType => "INVALID_ELEMENT_TYPE",
            Self::InvalidId => "INVALID_ID",
            Self::InvalidCoordinates => "INVALID_COORDINATES",
            Self::InsufficientNodes => "INSUFFICIENT_NODES",
            Self::MissingNode => "MISSING_NODE",
            Self::MissingWay => "MISSING_WAY",
            Self::InsufficientCoordinates => "INSUFFICIENT_COORDINATES",
            Self::NoOuterRing => "NO_OUTER_RING",
            Self::UnclosedRing => "UNCLOSED_RING",
            Self::MissingAdminLevel => "MISSING_ADMIN_LEVEL",
            Self::InvalidAdminLevel => "INVALID_ADMIN_LEVEL",
            Self::MissingName => "MISSING_NAME",
            Self::MissingGreekName => "MISSING_GREEK_NAME",
            Self::InvalidPopulation => "INVALID_POPULATION",
            Self::InvalidArea => "INVALID_AREA",
            Self::OverpassRemark => "OVERPASS_REMARK",
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single structural or semantic problem found while parsing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub code: IssueCode,
    pub message: String,
    /// OSM id of the element the issue refers to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<i64>,
}

impl ValidationIssue {
    #[must_use]
    pub fn new(
        severity: Severity,
        code: IssueCode,
        message: impl Into<String>,
        element_id: Option<i64>,
    ) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            element_id,
        }
    }

    #[must_use]
    pub fn error(code: IssueCode, message: impl Into<String>, element_id: Option<i64>) -> Self {
        Self::new(Severity::Error, code, message, element_id)
    }

    #[must_use]
    pub fn warning(code: IssueCode, message: impl Into<String>, element_id: Option<i64>) -> Self {
        Self::new(Severity::Warning, code, message, element_id)
    }

    #[must_use]
    pub fn info(code: IssueCode, message: impl Into<String>, element_id: Option<i64>) -> Self {
        Self::new(Severity::Info, code, message, element_id)
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.element_id {
            Some(id) => write!(f, "[{}] {} (#{id}): {}", self.severity, self.code, self.message),
            None => write!(f, "[{}] {}: {}", self.severity, self.code, self.message),
        }
    }
}

/// Whether any issue in the slice has error severity
#[must_use]
pub fn has_errors(issues: &[ValidationIssue]) -> bool {
    issues.iter().any(ValidationIssue::is_error)
}
