//! Scan surface size tracking.
//!
//! Rotating a phone or resizing a window changes the surface the camera
//! preview renders into, which leaves the scan box and the capture
//! resolution stale. The watcher compares each size sample against the last
//! stable one and asks for a camera restart when either side moved by more
//! than the threshold. Timing (debounce, settle delay) belongs to the session
//! reducer; the watcher only holds the comparison state.

use crate::camera::SurfaceRect;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default relative change that counts as a layout shift.
pub const DEFAULT_RESTART_THRESHOLD: f64 = 0.1;

/// Size of the scan surface at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraDimensions {
    /// Width in pixels
    pub width: f64,
    /// Height in pixels
    pub height: f64,
    /// When the sample was taken
    pub captured_at: DateTime<Utc>,
}

impl CameraDimensions {
    /// Sample a surface rect at `captured_at`.
    #[must_use]
    pub const fn from_rect(rect: SurfaceRect, captured_at: DateTime<Utc>) -> Self {
        Self {
            width: rect.width,
            height: rect.height,
            captured_at,
        }
    }
}

/// What a new sample means for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First sample; it becomes the stable baseline.
    Baseline,
    /// Within the threshold of the stable sample.
    Stable,
    /// Significant change; (re)start the debounce timer.
    RestartScheduled,
}

fn relative_change(old: f64, new: f64) -> f64 {
    if old > 0.0 {
        (new - old).abs() / old
    } else if (new - old).abs() > f64::EPSILON {
        f64::INFINITY
    } else {
        0.0
    }
}

/// Comparison state for size samples.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionWatcher {
    threshold: f64,
    stable: Option<CameraDimensions>,
    latest: Option<CameraDimensions>,
    debounce_pending: bool,
    restart_in_flight: bool,
}

impl Default for DimensionWatcher {
    fn default() -> Self {
        Self::new(DEFAULT_RESTART_THRESHOLD)
    }
}

impl DimensionWatcher {
    /// Create a watcher that treats relative changes above `threshold` as significant.
    #[must_use]
    pub const fn new(threshold: f64) -> Self {
        Self {
            threshold,
            stable: None,
            latest: None,
            debounce_pending: false,
            restart_in_flight: false,
        }
    }

    /// Record a sample.
    pub fn observe(&mut self, sample: CameraDimensions) -> Observation {
        let Some(stable) = self.stable else {
            self.stable = Some(sample);
            self.latest = Some(sample);
            return Observation::Baseline;
        };
        self.latest = Some(sample);

        let width_change = relative_change(stable.width, sample.width);
        let height_change = relative_change(stable.height, sample.height);

        if width_change > self.threshold || height_change > self.threshold {
            tracing::debug!(
                width_change,
                height_change,
                width = sample.width,
                height = sample.height,
                "Significant layout change"
            );
            self.debounce_pending = true;
            Observation::RestartScheduled
        } else {
            Observation::Stable
        }
    }

    /// The debounce window elapsed.
    ///
    /// The latest sample becomes the stable one. Returns `true` when the
    /// caller should restart the camera, which happens only while a camera is
    /// active and no other restart is running. A `true` result marks a
    /// restart as in flight until [`DimensionWatcher::restart_finished`].
    pub fn debounce_elapsed(&mut self, camera_active: bool) -> bool {
        self.debounce_pending = false;
        if let Some(latest) = self.latest {
            self.stable = Some(latest);
        }

        if camera_active && !self.restart_in_flight {
            self.restart_in_flight = true;
            true
        } else {
            tracing::debug!(
                camera_active,
                restart_in_flight = self.restart_in_flight,
                "Layout settled without restart"
            );
            false
        }
    }

    /// The camera finished (re)acquiring, successfully or not.
    pub fn restart_finished(&mut self) {
        self.restart_in_flight = false;
    }

    /// The last stable sample.
    #[must_use]
    pub const fn stable(&self) -> Option<&CameraDimensions> {
        self.stable.as_ref()
    }

    /// Whether a debounce window is open.
    #[must_use]
    pub const fn debounce_pending(&self) -> bool {
        self.debounce_pending
    }

    /// Whether a restart is running.
    #[must_use]
    pub const fn restart_in_flight(&self) -> bool {
        self.restart_in_flight
    }
}
