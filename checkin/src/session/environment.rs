//! Environment for the scan session reducer.

use crate::camera::{CameraResourceManager, CameraSource, ScanSurface};
use crate::config::ScannerConfig;
use crate::confirmation::{AttendanceApi, AttendanceConfirmationCoordinator};
use crate::dimensions::CameraDimensions;
use std::sync::Arc;
use turnstile_core::environment::Clock;

/// Scan session environment.
///
/// Contains all external dependencies needed by the session reducer.
///
/// # Type Parameters
///
/// - `C`: Camera backend
/// - `S`: Scan surface
/// - `A`: Attendance backend
pub struct ScanEnvironment<C, S, A> {
    /// Clock for result timestamps and size samples.
    pub clock: Arc<dyn Clock>,

    /// Camera ownership.
    pub cameras: Arc<CameraResourceManager<C>>,

    /// Element the preview renders into.
    pub surface: S,

    /// Single-flight confirmation.
    pub coordinator: Arc<AttendanceConfirmationCoordinator<A>>,

    /// Timing and threshold configuration.
    pub config: ScannerConfig,
}

impl<C, S, A> ScanEnvironment<C, S, A>
where
    C: CameraSource,
    S: ScanSurface,
    A: AttendanceApi,
{
    /// Create an environment.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, camera: C, surface: S, api: A, config: ScannerConfig) -> Self {
        Self {
            cameras: Arc::new(CameraResourceManager::new(camera, config.fps)),
            coordinator: Arc::new(AttendanceConfirmationCoordinator::new(
                api,
                Arc::clone(&clock),
            )),
            clock,
            surface,
            config,
        }
    }

    /// Measure the surface now.
    #[must_use]
    pub fn sample_dimensions(&self) -> CameraDimensions {
        CameraDimensions::from_rect(self.surface.bounding_rect(), self.clock.now())
    }
}

impl<C, S: Clone, A> Clone for ScanEnvironment<C, S, A> {
    fn clone(&self) -> Self {
        Self {
            clock: Arc::clone(&self.clock),
            cameras: Arc::clone(&self.cameras),
            surface: self.surface.clone(),
            coordinator: Arc::clone(&self.coordinator),
            config: self.config.clone(),
        }
    }
}
