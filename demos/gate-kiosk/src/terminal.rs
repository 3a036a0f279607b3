//! Terminal stand-ins for the camera and the preview surface.
//!
//! Lines typed at the prompt play the role of decoded QR codes: they are
//! forwarded to the decode stream of the running camera.

use futures::channel::mpsc;
use futures::stream::{BoxStream, StreamExt};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use turnstile_checkin::camera::{CameraConstraints, CameraDevice};
use turnstile_checkin::{CameraError, CameraHandle, CameraSource, ScanSurface, SurfaceRect};

#[derive(Default)]
struct Capture {
    next_id: u64,
    running: Option<u64>,
    subscribers: Vec<(u64, mpsc::UnboundedSender<String>)>,
}

/// Camera fed from stdin.
#[derive(Clone, Default)]
pub struct TerminalCamera {
    capture: Arc<Mutex<Capture>>,
}

impl TerminalCamera {
    fn lock(&self) -> MutexGuard<'_, Capture> {
        self.capture.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand a line to the running camera's decoder.
    ///
    /// Returns `false` when nothing is listening, e.g. while a result is shown.
    pub fn present(&self, text: &str) -> bool {
        let mut capture = self.lock();
        capture.subscribers.retain(|(_, tx)| !tx.is_closed());

        let Some(running) = capture.running else {
            return false;
        };
        capture
            .subscribers
            .iter()
            .filter(|(id, _)| *id == running)
            .filter(|(_, tx)| tx.unbounded_send(text.to_string()).is_ok())
            .count()
            > 0
    }
}

impl CameraSource for TerminalCamera {
    fn devices(&self) -> impl Future<Output = Result<Vec<CameraDevice>, CameraError>> + Send {
        async { Ok(vec![CameraDevice::new("stdin", "Terminal input")]) }
    }

    fn start(
        &self,
        constraints: CameraConstraints,
    ) -> impl Future<Output = Result<CameraHandle, CameraError>> + Send {
        let mut capture = self.lock();
        let result = if capture.running.is_some() {
            Err(CameraError::DeviceBusy)
        } else {
            capture.next_id += 1;
            capture.running = Some(capture.next_id);
            tracing::debug!(
                handle = capture.next_id,
                fps = constraints.fps,
                qr_box = constraints.qr_box.width,
                "Terminal camera started"
            );
            Ok(CameraHandle::new(capture.next_id, "stdin"))
        };
        drop(capture);

        async move { result }
    }

    fn decodes(&self, handle: &CameraHandle) -> BoxStream<'static, String> {
        let (tx, rx) = mpsc::unbounded();
        self.lock().subscribers.push((handle.id, tx));
        rx.boxed()
    }

    fn stop(&self, handle: &CameraHandle) -> impl Future<Output = Result<(), CameraError>> + Send {
        let mut capture = self.lock();
        if capture.running == Some(handle.id) {
            capture.running = None;
        }
        capture.subscribers.retain(|(id, _)| *id != handle.id);
        drop(capture);

        tracing::debug!(handle = handle.id, "Terminal camera stopped");
        async { Ok(()) }
    }
}

/// Preview surface with an operator-controlled size.
#[derive(Clone)]
pub struct TerminalSurface {
    rect: Arc<Mutex<SurfaceRect>>,
    mobile: bool,
}

impl TerminalSurface {
    /// A surface of the given size.
    pub fn new(width: f64, height: f64, mobile: bool) -> Self {
        Self {
            rect: Arc::new(Mutex::new(SurfaceRect::new(width, height))),
            mobile,
        }
    }

    /// Change the reported size.
    pub fn resize(&self, width: f64, height: f64) {
        *self.rect.lock().unwrap_or_else(PoisonError::into_inner) = SurfaceRect::new(width, height);
    }
}

impl ScanSurface for TerminalSurface {
    fn ensure_rendered(&self) {}

    fn bounding_rect(&self) -> SurfaceRect {
        *self.rect.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_mobile(&self) -> bool {
        self.mobile
    }
}
