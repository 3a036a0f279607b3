//! Actions for the scan session.

use crate::camera::AcquiredCamera;
use crate::confirmation::ConfirmationResult;
use crate::dimensions::CameraDimensions;
use crate::error::CameraError;
use crate::session::types::TicketId;
use serde::{Deserialize, Serialize};

/// Everything that can happen to a scan session.
///
/// Operator commands and surface events come from the UI; the rest are fed
/// back by effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScanAction {
    // Operator commands
    /// Start scanning from `Idle`.
    Start,

    /// Try acquiring the camera again after a failure.
    Retry,

    /// Stop scanning and release the camera. Valid in every state.
    Stop,

    /// Operator typed a code instead of scanning it.
    ManualEntrySubmitted(String),

    // Camera lifecycle
    /// Acquisition `attempt` succeeded.
    CameraAcquired {
        /// Attempt that produced the camera
        attempt: u64,
        /// The camera
        camera: AcquiredCamera,
    },

    /// Acquisition `attempt` failed.
    CameraAcquireFailed {
        /// Attempt that failed
        attempt: u64,
        /// Classified failure
        error: CameraError,
    },

    /// The decoder read a QR code.
    FrameDecoded(String),

    // Confirmation
    /// The backend answered for `ticket`.
    ConfirmationCompleted {
        /// Scan the answer belongs to
        ticket: TicketId,
        /// Outcome
        result: ConfirmationResult,
    },

    /// A scan failed before reaching the backend.
    ///
    /// Emitted so observers see local rejections; the session already holds
    /// the result when this arrives.
    ScanRejected {
        /// The failure shown to the operator
        result: ConfirmationResult,
    },

    /// Auto-resume timer for `ticket` fired.
    ResumeScanning {
        /// Scan that was confirmed
        ticket: TicketId,
    },

    // Layout
    /// The scan surface was mounted.
    SurfaceMounted,

    /// The window was resized.
    WindowResized,

    /// The device orientation changed.
    OrientationChanged,

    /// The settle delay after an orientation change elapsed.
    LayoutSettled,

    /// A size sample measured by the caller.
    DimensionsSampled(CameraDimensions),

    /// No significant size change for the whole debounce window.
    RestartDebounceElapsed,
}
