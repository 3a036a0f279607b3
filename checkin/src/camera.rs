//! Camera ownership and scan-box geometry.
//!
//! The platform camera sits behind [`CameraSource`] and the element the
//! preview renders into sits behind [`ScanSurface`]. [`CameraResourceManager`]
//! owns the single active handle and serializes every acquire, release and
//! restart through one async mutex, so at most one camera is ever held.

use crate::error::CameraError;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::sync::Mutex;

/// Smallest scan box, in pixels, regardless of surface size.
pub const MIN_SCAN_BOX: f64 = 200.0;
/// Largest scan box on non-mobile surfaces.
pub const DESKTOP_MAX_SCAN_BOX: f64 = 350.0;
/// Share of the short side used for the scan box on mobile surfaces.
pub const MOBILE_SCAN_SHARE: f64 = 0.85;
/// Share of the short side used for the scan box elsewhere.
pub const DESKTOP_SCAN_SHARE: f64 = 0.70;
/// Cap on mobile scan boxes, as a share of the short side.
pub const MOBILE_MAX_SHARE: f64 = 0.9;

const REAR_CAMERA_HINTS: [&str; 3] = ["back", "rear", "environment"];

/// On-screen size of the scan surface, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceRect {
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
}

impl SurfaceRect {
    /// Create a rect
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Side lengths of the square region the decoder scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanBoxSize {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

/// Compute the scan box for a surface.
///
/// The side is the surface's short side scaled by 85% on mobile and 70%
/// elsewhere, capped at 90% of the short side on mobile and 350px elsewhere,
/// and never below 200px. When the cap is below 200px the floor wins.
///
/// ```
/// use turnstile_checkin::camera::{compute_scan_box_size, SurfaceRect};
///
/// let desktop = compute_scan_box_size(SurfaceRect::new(1280.0, 720.0), false);
/// assert_eq!(desktop.width, 350);
///
/// let phone = compute_scan_box_size(SurfaceRect::new(375.0, 667.0), true);
/// assert_eq!(phone.width, 318);
/// ```
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // side is finite and >= 200
pub fn compute_scan_box_size(rect: SurfaceRect, is_mobile: bool) -> ScanBoxSize {
    let short_side = rect.width.min(rect.height).max(0.0);
    let (share, max) = if is_mobile {
        (MOBILE_SCAN_SHARE, short_side * MOBILE_MAX_SHARE)
    } else {
        (DESKTOP_SCAN_SHARE, DESKTOP_MAX_SCAN_BOX)
    };

    let side = (short_side * share).min(max).max(MIN_SCAN_BOX).floor() as u32;
    ScanBoxSize {
        width: side,
        height: side,
    }
}

/// A camera the platform reported during enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraDevice {
    /// Platform device id
    pub id: String,
    /// Human-readable label
    pub label: String,
}

impl CameraDevice {
    /// Create a device entry
    #[must_use]
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }

    fn looks_rear_facing(&self) -> bool {
        let label = self.label.to_lowercase();
        REAR_CAMERA_HINTS.iter().any(|hint| label.contains(hint))
    }
}

/// Which way a camera faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FacingMode {
    /// Away from the operator
    Environment,
    /// Towards the operator
    User,
}

/// How the camera to open is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceSelector {
    /// A specific enumerated device
    DeviceId(String),
    /// Whatever the platform picks for this facing mode
    FacingMode(FacingMode),
}

/// Pick a camera: a rear-facing label first, then the first device, then a
/// generic environment-facing constraint when nothing was enumerated.
#[must_use]
pub fn select_device(devices: &[CameraDevice]) -> DeviceSelector {
    devices
        .iter()
        .find(|device| device.looks_rear_facing())
        .or_else(|| devices.first())
        .map_or(DeviceSelector::FacingMode(FacingMode::Environment), |device| {
            DeviceSelector::DeviceId(device.id.clone())
        })
}

/// Everything the backend needs to start capturing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraConstraints {
    /// Device choice
    pub selector: DeviceSelector,
    /// Region the decoder scans
    pub qr_box: ScanBoxSize,
    /// Decode attempts per second
    pub fps: u32,
}

/// Opaque token for a started camera.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CameraHandle {
    /// Backend-assigned id
    pub id: u64,
    /// Device the capture runs on
    pub device: String,
}

impl CameraHandle {
    /// Create a handle
    #[must_use]
    pub fn new(id: u64, device: impl Into<String>) -> Self {
        Self {
            id,
            device: device.into(),
        }
    }
}

/// A started camera together with the scan box it was started with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquiredCamera {
    /// Handle to release later
    pub handle: CameraHandle,
    /// Scan box in effect
    pub qr_box: ScanBoxSize,
}

/// The element the camera preview renders into.
pub trait ScanSurface: Send + Sync {
    /// Force the surface visible with a non-zero size before the camera
    /// starts. Some platforms refuse to start a camera into a hidden element.
    fn ensure_rendered(&self);

    /// Current on-screen size.
    fn bounding_rect(&self) -> SurfaceRect;

    /// Whether the surface is on a mobile device.
    fn is_mobile(&self) -> bool;
}

/// Platform camera backend.
///
/// This trait abstracts over the platform capture and QR decode pipeline
/// (browser media devices, a native capture library, a terminal stub).
pub trait CameraSource: Send + Sync {
    /// Enumerate available cameras.
    ///
    /// # Errors
    ///
    /// Returns error if the platform refuses enumeration.
    fn devices(&self) -> impl Future<Output = Result<Vec<CameraDevice>, CameraError>> + Send;

    /// Start capturing with the given constraints.
    ///
    /// # Errors
    ///
    /// Returns the classified platform error if the camera cannot start.
    fn start(
        &self,
        constraints: CameraConstraints,
    ) -> impl Future<Output = Result<CameraHandle, CameraError>> + Send;

    /// Decoded QR text for a started camera.
    ///
    /// The stream ends when the camera stops. Dropping it pauses decoding
    /// without stopping the camera.
    fn decodes(&self, handle: &CameraHandle) -> BoxStream<'static, String>;

    /// Stop capturing.
    ///
    /// # Errors
    ///
    /// Returns error if the platform fails to stop the camera.
    fn stop(&self, handle: &CameraHandle) -> impl Future<Output = Result<(), CameraError>> + Send;
}

/// Owns the camera lifecycle.
pub struct CameraResourceManager<C> {
    source: C,
    fps: u32,
    active: Mutex<Option<CameraHandle>>,
}

impl<C: CameraSource> CameraResourceManager<C> {
    /// Create a manager over a camera backend.
    #[must_use]
    pub fn new(source: C, fps: u32) -> Self {
        Self {
            source,
            fps,
            active: Mutex::new(None),
        }
    }

    /// The camera backend.
    #[must_use]
    pub const fn source(&self) -> &C {
        &self.source
    }

    /// Acquire the camera, releasing any handle still held first.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`CameraError`] if the camera cannot start.
    pub async fn acquire<S: ScanSurface>(&self, surface: &S) -> Result<AcquiredCamera, CameraError> {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            tracing::debug!(handle = previous.id, "Releasing held camera before acquire");
            self.stop_logged(&previous).await;
        }
        self.start_locked(&mut active, surface).await
    }

    /// Release then re-acquire as one operation.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`CameraError`] if the camera cannot restart.
    pub async fn restart<S: ScanSurface>(
        &self,
        handle: &CameraHandle,
        surface: &S,
    ) -> Result<AcquiredCamera, CameraError> {
        let mut active = self.active.lock().await;
        match active.take() {
            Some(current) => {
                if current != *handle {
                    tracing::warn!(
                        requested = handle.id,
                        active = current.id,
                        "Restart requested for a handle that is no longer active"
                    );
                }
                self.stop_logged(&current).await;
            },
            None => tracing::debug!(handle = handle.id, "Restart with no camera held"),
        }
        metrics::counter!("scanner.camera.restarts").increment(1);
        self.start_locked(&mut active, surface).await
    }

    /// Release a handle. Unknown or already released handles are ignored and
    /// backend stop failures are logged, never returned.
    pub async fn release(&self, handle: &CameraHandle) {
        let mut active = self.active.lock().await;
        if active.as_ref() == Some(handle) {
            active.take();
            self.stop_logged(handle).await;
        } else {
            tracing::debug!(handle = handle.id, "Ignoring release of inactive camera");
        }
    }

    /// Release whatever handle is held.
    pub async fn release_active(&self) {
        let mut active = self.active.lock().await;
        if let Some(handle) = active.take() {
            self.stop_logged(&handle).await;
        }
    }

    /// The handle currently held, if any.
    pub async fn active_handle(&self) -> Option<CameraHandle> {
        self.active.lock().await.clone()
    }

    /// Decoded text for a handle.
    #[must_use]
    pub fn decodes(&self, handle: &CameraHandle) -> BoxStream<'static, String> {
        self.source.decodes(handle)
    }

    async fn start_locked<S: ScanSurface>(
        &self,
        active: &mut Option<CameraHandle>,
        surface: &S,
    ) -> Result<AcquiredCamera, CameraError> {
        surface.ensure_rendered();
        let qr_box = compute_scan_box_size(surface.bounding_rect(), surface.is_mobile());

        let devices = match self.source.devices().await {
            Ok(devices) => devices,
            Err(error) => {
                tracing::warn!(%error, "Camera enumeration failed, falling back to facing mode");
                Vec::new()
            },
        };

        let constraints = CameraConstraints {
            selector: select_device(&devices),
            qr_box,
            fps: self.fps,
        };
        tracing::debug!(?constraints, "Starting camera");

        match self.source.start(constraints).await {
            Ok(handle) => {
                tracing::info!(handle = handle.id, device = %handle.device, "Camera acquired");
                metrics::counter!("scanner.camera.acquired").increment(1);
                *active = Some(handle.clone());
                Ok(AcquiredCamera { handle, qr_box })
            },
            Err(error) => {
                tracing::warn!(%error, "Camera acquisition failed");
                metrics::counter!("scanner.camera.failed").increment(1);
                Err(error)
            },
        }
    }

    async fn stop_logged(&self, handle: &CameraHandle) {
        match self.source.stop(handle).await {
            Ok(()) => tracing::info!(handle = handle.id, "Camera released"),
            Err(error) => tracing::warn!(handle = handle.id, %error, "Camera stop failed"),
        }
        metrics::counter!("scanner.camera.released").increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mocks::{MockCameraSource, MockSurface};
    use proptest::prelude::*;

    #[test]
    fn scan_box_desktop_caps_at_350() {
        let size = compute_scan_box_size(SurfaceRect::new(1920.0, 1080.0), false);
        assert_eq!(size, ScanBoxSize { width: 350, height: 350 });
    }

    #[test]
    fn scan_box_small_surfaces_use_the_floor() {
        let size = compute_scan_box_size(SurfaceRect::new(180.0, 120.0), true);
        assert_eq!(size.width, 200);

        let size = compute_scan_box_size(SurfaceRect::new(0.0, 0.0), false);
        assert_eq!(size.width, 200);
    }

    #[test]
    fn scan_box_mobile_uses_short_side() {
        // 375 * 0.85 = 318.75, cap 337.5
        let portrait = compute_scan_box_size(SurfaceRect::new(375.0, 667.0), true);
        let landscape = compute_scan_box_size(SurfaceRect::new(667.0, 375.0), true);
        assert_eq!(portrait.width, 318);
        assert_eq!(portrait, landscape);
    }

    #[test]
    fn rear_camera_label_wins() {
        let devices = vec![
            CameraDevice::new("front", "FaceTime HD Camera"),
            CameraDevice::new("rear", "Back Camera"),
        ];
        assert_eq!(select_device(&devices), DeviceSelector::DeviceId("rear".into()));

        let devices = vec![CameraDevice::new("cam0", "USB ENVIRONMENT cam")];
        assert_eq!(select_device(&devices), DeviceSelector::DeviceId("cam0".into()));
    }

    #[test]
    fn first_device_then_facing_mode() {
        let devices = vec![
            CameraDevice::new("a", "Integrated Webcam"),
            CameraDevice::new("b", "USB Webcam"),
        ];
        assert_eq!(select_device(&devices), DeviceSelector::DeviceId("a".into()));
        assert_eq!(
            select_device(&[]),
            DeviceSelector::FacingMode(FacingMode::Environment)
        );
    }

    #[tokio::test]
    async fn acquire_renders_surface_and_passes_constraints() {
        let source = MockCameraSource::new().with_devices(vec![CameraDevice::new("rear", "Rear")]);
        let surface = MockSurface::new(375.0, 667.0).mobile();
        let manager = CameraResourceManager::new(source.clone(), 10);

        let camera = manager.acquire(&surface).await.unwrap();

        assert_eq!(surface.render_calls(), 1);
        assert_eq!(camera.qr_box.width, 318);
        let constraints = source.last_constraints().unwrap();
        assert_eq!(constraints.selector, DeviceSelector::DeviceId("rear".into()));
        assert_eq!(constraints.fps, 10);
        assert_eq!(manager.active_handle().await, Some(camera.handle));
    }

    #[tokio::test]
    async fn acquire_releases_previous_handle_first() {
        let source = MockCameraSource::new();
        let surface = MockSurface::new(800.0, 600.0);
        let manager = CameraResourceManager::new(source.clone(), 10);

        manager.acquire(&surface).await.unwrap();
        manager.acquire(&surface).await.unwrap();

        assert_eq!(source.starts(), 2);
        assert_eq!(source.stops(), 1);
        assert_eq!(source.active(), 1);
        assert_eq!(source.max_active(), 1);
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let source = MockCameraSource::new();
        let surface = MockSurface::new(800.0, 600.0);
        let manager = CameraResourceManager::new(source.clone(), 10);

        let camera = manager.acquire(&surface).await.unwrap();
        manager.release(&camera.handle).await;
        manager.release(&camera.handle).await;
        manager.release(&CameraHandle::new(999, "ghost")).await;

        assert_eq!(source.stops(), 1);
        assert_eq!(manager.active_handle().await, None);
    }

    #[tokio::test]
    async fn stop_failures_are_swallowed() {
        let source = MockCameraSource::new();
        let surface = MockSurface::new(800.0, 600.0);
        let manager = CameraResourceManager::new(source.clone(), 10);

        let camera = manager.acquire(&surface).await.unwrap();
        source.fail_next_stop(CameraError::Unknown("driver hiccup".into()));
        manager.release(&camera.handle).await;

        assert_eq!(manager.active_handle().await, None);
        assert_eq!(source.active(), 0);
    }

    #[tokio::test]
    async fn failed_acquire_holds_nothing() {
        let source = MockCameraSource::new();
        source.fail_next_start(CameraError::PermissionDenied);
        let manager = CameraResourceManager::new(source.clone(), 10);

        let result = manager.acquire(&MockSurface::new(800.0, 600.0)).await;

        assert_eq!(result, Err(CameraError::PermissionDenied));
        assert_eq!(manager.active_handle().await, None);
    }

    #[tokio::test]
    async fn restart_cycles_the_camera_once() {
        let source = MockCameraSource::new();
        let surface = MockSurface::new(375.0, 667.0).mobile();
        let manager = CameraResourceManager::new(source.clone(), 10);

        let first = manager.acquire(&surface).await.unwrap();
        surface.resize(667.0, 375.0);
        let second = manager.restart(&first.handle, &surface).await.unwrap();

        assert_ne!(first.handle, second.handle);
        assert_eq!(source.starts(), 2);
        assert_eq!(source.stops(), 1);
        assert_eq!(source.max_active(), 1);
    }

    proptest! {
        #[test]
        fn scan_box_stays_within_bounds(
            width in 0.0f64..4000.0,
            height in 0.0f64..4000.0,
            is_mobile in any::<bool>(),
        ) {
            let size = compute_scan_box_size(SurfaceRect::new(width, height), is_mobile);
            let short = width.min(height);
            let max = if is_mobile { short * MOBILE_MAX_SHARE } else { DESKTOP_MAX_SCAN_BOX };
            let upper = MIN_SCAN_BOX.max(max);

            prop_assert!(f64::from(size.width) >= MIN_SCAN_BOX);
            prop_assert!(f64::from(size.width) <= upper);
            prop_assert_eq!(size.width, size.height);
        }
    }
}
