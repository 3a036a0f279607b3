//! # Turnstile Check-in
//!
//! QR attendance check-in scanner built on the Turnstile reducer
//! architecture.
//!
//! A gate operator points a camera at an attendee's QR code. The scanner
//! decodes it, extracts the attendance identifiers, asks the backend to
//! confirm the check-in and shows the outcome before scanning again.
//!
//! ## Components
//!
//! - [`parser`]: Decoded text to [`DecodedPayload`] (JSON, `attendance:account`, bare id)
//! - [`router`]: Duplicate suppression for decode events
//! - [`camera`]: Camera acquisition, release and scan box sizing
//! - [`dimensions`]: Layout change detection
//! - [`confirmation`]: Single-flight backend confirmation
//! - [`session`]: The scan session state machine tying it all together
//! - [`config`]: Environment-driven configuration
//!
//! ## Example
//!
//! ```ignore
//! use turnstile_checkin::{ScanEnvironment, ScanSessionStore, ScannerConfig, HttpAttendanceApi};
//!
//! let config = ScannerConfig::from_env();
//! let api = HttpAttendanceApi::new(&config.api.base_url, config.api.token.clone());
//! let env = ScanEnvironment::new(Arc::new(SystemClock), camera, surface, api, config);
//!
//! let session = ScanSessionStore::new(env);
//! session.start().await?;
//! ```

pub mod camera;
pub mod config;
pub mod confirmation;
pub mod dimensions;
pub mod error;
pub mod parser;
pub mod router;
pub mod session;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

pub use camera::{
    AcquiredCamera, CameraHandle, CameraResourceManager, CameraSource, ScanBoxSize, ScanSurface,
    SurfaceRect,
};
pub use config::ScannerConfig;
pub use confirmation::{
    AttendanceApi, AttendanceConfirmationCoordinator, ConfirmationResult, HttpAttendanceApi,
};
pub use dimensions::{CameraDimensions, DimensionWatcher};
pub use error::{CameraError, ConfirmationError, ParseError, PayloadError, ScanError};
pub use parser::{CheckInTicket, DecodedPayload};
pub use router::DecodeEventRouter;
pub use session::{ScanAction, ScanEnvironment, ScanSession, ScanSessionStore, ScanState, ScanStatus};
