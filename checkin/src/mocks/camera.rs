//! Mock camera backend and scan surface.

use crate::camera::{
    CameraConstraints, CameraDevice, CameraHandle, CameraSource, DeviceSelector, ScanSurface,
    SurfaceRect,
};
use crate::error::CameraError;
use futures::channel::mpsc;
use futures::stream::{BoxStream, StreamExt};
use std::collections::{BTreeSet, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct CameraState {
    devices: Vec<CameraDevice>,
    start_failures: VecDeque<CameraError>,
    stop_failure: Option<CameraError>,
    next_id: u64,
    active: BTreeSet<u64>,
    max_active: usize,
    starts: usize,
    stops: usize,
    constraints: Vec<CameraConstraints>,
    subscribers: Vec<(u64, mpsc::UnboundedSender<String>)>,
}

/// Mock camera backend.
///
/// Records every start and stop, tracks how many cameras are held at once,
/// and lets tests push decoded text into the decode streams of active
/// cameras with [`MockCameraSource::emit`].
#[derive(Clone, Default)]
pub struct MockCameraSource {
    state: Arc<Mutex<CameraState>>,
}

impl MockCameraSource {
    /// Create a mock with no enumerated devices.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report these devices from enumeration.
    #[must_use]
    pub fn with_devices(self, devices: Vec<CameraDevice>) -> Self {
        self.lock().devices = devices;
        self
    }

    /// Make the next start fail with `error`.
    pub fn fail_next_start(&self, error: CameraError) {
        self.lock().start_failures.push_back(error);
    }

    /// Make the next stop report `error` (the camera still stops).
    pub fn fail_next_stop(&self, error: CameraError) {
        self.lock().stop_failure = Some(error);
    }

    /// Push decoded text to every open decode stream.
    ///
    /// Returns how many streams received it.
    pub fn emit(&self, text: &str) -> usize {
        let mut state = self.lock();
        state.subscribers.retain(|(_, tx)| !tx.is_closed());
        state
            .subscribers
            .iter()
            .filter(|(_, tx)| tx.unbounded_send(text.to_string()).is_ok())
            .count()
    }

    /// Number of successful starts.
    #[must_use]
    pub fn starts(&self) -> usize {
        self.lock().starts
    }

    /// Number of stops.
    #[must_use]
    pub fn stops(&self) -> usize {
        self.lock().stops
    }

    /// Cameras currently running.
    #[must_use]
    pub fn active(&self) -> usize {
        self.lock().active.len()
    }

    /// Most cameras ever running at the same time.
    #[must_use]
    pub fn max_active(&self) -> usize {
        self.lock().max_active
    }

    /// Constraints of the most recent start attempt.
    #[must_use]
    pub fn last_constraints(&self) -> Option<CameraConstraints> {
        self.lock().constraints.last().cloned()
    }

    fn lock(&self) -> MutexGuard<'_, CameraState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CameraSource for MockCameraSource {
    fn devices(&self) -> impl Future<Output = Result<Vec<CameraDevice>, CameraError>> + Send {
        let devices = self.lock().devices.clone();
        async move { Ok(devices) }
    }

    fn start(
        &self,
        constraints: CameraConstraints,
    ) -> impl Future<Output = Result<CameraHandle, CameraError>> + Send {
        let mut state = self.lock();
        let device = match &constraints.selector {
            DeviceSelector::DeviceId(id) => id.clone(),
            DeviceSelector::FacingMode(mode) => format!("{mode:?}").to_lowercase(),
        };
        state.constraints.push(constraints);

        let result = if let Some(error) = state.start_failures.pop_front() {
            Err(error)
        } else {
            state.next_id += 1;
            let id = state.next_id;
            state.starts += 1;
            state.active.insert(id);
            state.max_active = state.max_active.max(state.active.len());
            Ok(CameraHandle::new(id, device))
        };
        drop(state);

        async move { result }
    }

    fn decodes(&self, handle: &CameraHandle) -> BoxStream<'static, String> {
        let (tx, rx) = mpsc::unbounded();
        self.lock().subscribers.push((handle.id, tx));
        rx.boxed()
    }

    fn stop(&self, handle: &CameraHandle) -> impl Future<Output = Result<(), CameraError>> + Send {
        let mut state = self.lock();
        state.stops += 1;
        state.active.remove(&handle.id);
        // Ending the decode streams mirrors a stopped capture
        state.subscribers.retain(|(id, _)| *id != handle.id);
        let result = state.stop_failure.take().map_or(Ok(()), Err);
        drop(state);

        async move { result }
    }
}

/// Mock scan surface with a settable size.
#[derive(Clone)]
pub struct MockSurface {
    rect: Arc<Mutex<SurfaceRect>>,
    mobile: Arc<AtomicBool>,
    renders: Arc<AtomicUsize>,
}

impl MockSurface {
    /// Create a non-mobile surface of the given size.
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            rect: Arc::new(Mutex::new(SurfaceRect::new(width, height))),
            mobile: Arc::new(AtomicBool::new(false)),
            renders: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Report the surface as mobile.
    #[must_use]
    pub fn mobile(self) -> Self {
        self.mobile.store(true, Ordering::SeqCst);
        self
    }

    /// Change the reported size.
    pub fn resize(&self, width: f64, height: f64) {
        *self.rect.lock().unwrap_or_else(PoisonError::into_inner) = SurfaceRect::new(width, height);
    }

    /// How often the manager forced the surface to render.
    #[must_use]
    pub fn render_calls(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

impl ScanSurface for MockSurface {
    fn ensure_rendered(&self) {
        self.renders.fetch_add(1, Ordering::SeqCst);
    }

    fn bounding_rect(&self) -> SurfaceRect {
        *self.rect.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_mobile(&self) -> bool {
        self.mobile.load(Ordering::SeqCst)
    }
}
