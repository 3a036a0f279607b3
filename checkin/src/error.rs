//! Error types for the check-in scanner.
//!
//! Each concern gets its own enum so the session can tell camera failures
//! (which park the session in `Error` until the operator retries) apart from
//! scan failures (which end the scan with a failure result).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Camera acquisition failures.
///
/// Platform camera APIs report errors by name; [`CameraError::classify`] maps
/// those names onto this taxonomy.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraError {
    /// The operator (or the platform) refused camera access.
    #[error("Camera permission denied")]
    PermissionDenied,

    /// No camera matches the requested constraints.
    #[error("No camera device found")]
    DeviceNotFound,

    /// The camera exists but another process holds it.
    #[error("Camera is busy or could not be read")]
    DeviceBusy,

    /// Camera access requires a secure context.
    #[error("Camera access requires a secure context")]
    InsecureContext,

    /// Anything the platform reports that has no better category.
    #[error("Camera failed: {0}")]
    Unknown(String),
}

impl CameraError {
    /// Map a platform error name onto the camera error taxonomy.
    ///
    /// ```
    /// use turnstile_checkin::CameraError;
    ///
    /// assert_eq!(CameraError::classify("NotAllowedError", ""), CameraError::PermissionDenied);
    /// assert_eq!(CameraError::classify("OverconstrainedError", ""), CameraError::DeviceNotFound);
    /// ```
    #[must_use]
    pub fn classify(kind: &str, message: &str) -> Self {
        match kind {
            "NotAllowedError" | "PermissionDeniedError" => Self::PermissionDenied,
            "NotFoundError" | "DevicesNotFoundError" | "OverconstrainedError" => {
                Self::DeviceNotFound
            },
            "NotReadableError" | "TrackStartError" | "AbortError" => Self::DeviceBusy,
            "SecurityError" => Self::InsecureContext,
            _ if message.is_empty() => Self::Unknown(kind.to_string()),
            _ => Self::Unknown(format!("{kind}: {message}")),
        }
    }
}

/// Decoded text that matches none of the accepted QR formats.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The text could not be read as a check-in payload.
    #[error("Malformed QR payload: {reason}")]
    MalformedPayload {
        /// What was wrong with the text
        reason: String,
    },
}

impl ParseError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            reason: reason.into(),
        }
    }
}

/// Which identifier a payload was missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingField {
    /// `eventAttendanceId`
    EventAttendanceId,
    /// `checkingInAccountId`
    CheckingInAccountId,
    /// Neither identifier was present
    Both,
}

impl std::fmt::Display for MissingField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EventAttendanceId => f.write_str("event attendance id"),
            Self::CheckingInAccountId => f.write_str("checking-in account id"),
            Self::Both => f.write_str("event attendance id and checking-in account id"),
        }
    }
}

/// A parsed payload that cannot be confirmed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PayloadError {
    /// One or both identifiers are missing; the backend is never called.
    #[error("QR payload is missing the {missing}")]
    IncompletePayload {
        /// The missing identifier(s)
        missing: MissingField,
    },
}

/// Failures of the attendance confirmation call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfirmationError {
    /// The request never produced an HTTP response.
    #[error("Network error: {0}")]
    Network(String),

    /// The backend answered with a non-success status.
    #[error("Confirmation rejected ({status}): {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body, if any
        message: String,
    },

    /// Another confirmation is already in flight.
    #[error("A confirmation is already in progress")]
    Busy,
}

/// Every way a single scan can fail after the camera delivered text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// The text was not a check-in payload
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The payload was incomplete
    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// The backend did not confirm attendance
    #[error(transparent)]
    Confirmation(#[from] ConfirmationError),
}

impl ScanError {
    /// Short label used for metrics and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Parse(_) => "malformed",
            Self::Payload(_) => "incomplete",
            Self::Confirmation(ConfirmationError::Network(_)) => "network",
            Self::Confirmation(ConfirmationError::Rejected { .. }) => "rejected",
            Self::Confirmation(ConfirmationError::Busy) => "busy",
        }
    }
}
