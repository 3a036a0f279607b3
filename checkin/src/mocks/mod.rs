//! Mock implementations for testing.
//!
//! In-memory stand-ins for the camera backend, the scan surface and the
//! attendance backend, for use in unit and integration tests.

pub mod attendance;
pub mod camera;

pub use attendance::MockAttendanceApi;
pub use camera::{MockCameraSource, MockSurface};
