//! Core types for the scan session.

use crate::camera::{AcquiredCamera, CameraHandle, ScanBoxSize};
use crate::confirmation::ConfirmationResult;
use crate::dimensions::DimensionWatcher;
use crate::error::CameraError;
use crate::parser::DecodedPayload;
use crate::router::DecodeEventRouter;
use serde::{Deserialize, Serialize};
use turnstile_core::effect::EffectId;

/// The camera's decode stream.
pub const DECODE_STREAM: EffectId = EffectId::new("scanner.decode_stream");
/// Timer that resumes scanning after a confirmed check-in.
pub const AUTO_RESUME: EffectId = EffectId::new("scanner.auto_resume");
/// Debounce timer for layout-triggered restarts.
pub const RESTART_DEBOUNCE: EffectId = EffectId::new("scanner.restart_debounce");
/// Timer for the re-sample after an orientation change.
pub const ORIENTATION_SETTLE: EffectId = EffectId::new("scanner.orientation_settle");

/// Identifies one accepted scan, so late confirmations can be recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TicketId(pub u64);

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ticket-{}", self.0)
    }
}

/// Lifecycle state of the scan session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanState {
    /// No camera held; waiting for the operator.
    #[default]
    Idle,
    /// Camera acquisition `attempt` is running.
    Starting {
        /// Acquisition attempt, to tell late completions apart
        attempt: u64,
    },
    /// Camera running, decode stream live.
    Scanning {
        /// The camera in use
        camera: AcquiredCamera,
    },
    /// A payload was accepted and is being confirmed; decoding is paused.
    Resolving {
        /// Scan being confirmed
        ticket: TicketId,
        /// The accepted payload
        payload: DecodedPayload,
        /// Paused camera, absent for manual entries made without one
        camera: Option<AcquiredCamera>,
        /// Camera failure a manual entry was made from, restored once the
        /// scan ends
        camera_error: Option<CameraError>,
        /// Backend confirmed; waiting for the auto-resume timer
        confirmed: bool,
    },
    /// Camera acquisition failed; waiting for an explicit retry.
    Error(CameraError),
}

/// Coarse status for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanStatus {
    /// See [`ScanState::Idle`]
    Idle,
    /// See [`ScanState::Starting`]
    Starting,
    /// See [`ScanState::Scanning`]
    Scanning,
    /// See [`ScanState::Resolving`]
    Resolving,
    /// See [`ScanState::Error`]
    Error,
}

impl ScanState {
    /// Coarse status
    #[must_use]
    pub const fn status(&self) -> ScanStatus {
        match self {
            Self::Idle => ScanStatus::Idle,
            Self::Starting { .. } => ScanStatus::Starting,
            Self::Scanning { .. } => ScanStatus::Scanning,
            Self::Resolving { .. } => ScanStatus::Resolving,
            Self::Error(_) => ScanStatus::Error,
        }
    }

    /// The camera held in this state, running or paused.
    #[must_use]
    pub const fn camera(&self) -> Option<&AcquiredCamera> {
        match self {
            Self::Scanning { camera }
            | Self::Resolving {
                camera: Some(camera),
                ..
            } => Some(camera),
            _ => None,
        }
    }
}

/// The scan session.
///
/// Owned by the session store and only changed by the reducer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSession {
    /// Lifecycle state; holds the camera handle while one is acquired
    pub state: ScanState,
    /// Duplicate filter for decode events
    #[serde(skip)]
    pub router: DecodeEventRouter,
    /// Scan box of the current camera
    pub qr_box: Option<ScanBoxSize>,
    /// Result shown to the operator, cleared on the next scan or on resume
    pub last_result: Option<ConfirmationResult>,
    /// Surface size tracking
    #[serde(skip)]
    pub watcher: DimensionWatcher,
    attempts: u64,
    tickets: u64,
    epoch: u64,
}

impl Default for ScanSession {
    fn default() -> Self {
        Self::new(DimensionWatcher::default())
    }
}

impl ScanSession {
    /// Create an idle session.
    #[must_use]
    pub const fn new(watcher: DimensionWatcher) -> Self {
        Self {
            state: ScanState::Idle,
            router: DecodeEventRouter::new(),
            qr_box: None,
            last_result: None,
            watcher,
            attempts: 0,
            tickets: 0,
            epoch: 0,
        }
    }

    /// Coarse status
    #[must_use]
    pub const fn status(&self) -> ScanStatus {
        self.state.status()
    }

    /// Last decoded text that was acted on.
    #[must_use]
    pub fn last_scanned_payload(&self) -> Option<&str> {
        self.router.last_scanned()
    }

    /// Handle of the held camera.
    #[must_use]
    pub fn camera_handle(&self) -> Option<&CameraHandle> {
        self.state.camera().map(|camera| &camera.handle)
    }

    /// Advanced on every stop. Confirmations are single-flight within one
    /// epoch only, so a call abandoned by a stop never blocks the next one.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) const fn end_epoch(&mut self) {
        self.epoch += 1;
    }

    pub(crate) const fn next_attempt(&mut self) -> u64 {
        self.attempts += 1;
        self.attempts
    }

    pub(crate) const fn next_ticket(&mut self) -> TicketId {
        self.tickets += 1;
        TicketId(self.tickets)
    }
}
