//! Runtime wrapper around the scan session reducer.

use crate::camera::{CameraSource, ScanSurface};
use crate::confirmation::{AttendanceApi, ConfirmationResult};
use crate::dimensions::{CameraDimensions, DimensionWatcher};
use crate::session::{
    ScanAction, ScanEnvironment, ScanSession, ScanSessionReducer, ScanStatus,
};
use tokio::sync::broadcast;
use turnstile_core::effect::EffectId;
use turnstile_runtime::{EffectHandle, Store, StoreConfig, StoreError};

type SessionStore<C, S, A> =
    Store<ScanSession, ScanAction, ScanEnvironment<C, S, A>, ScanSessionReducer<C, S, A>>;

/// A running scan session.
///
/// Front ends drive the scanner through this type: operator commands and
/// surface events go in as actions, results come out through
/// [`ScanSessionStore::subscribe`] and [`ScanSessionStore::snapshot`].
pub struct ScanSessionStore<C, S, A>
where
    C: CameraSource + 'static,
    S: ScanSurface + Clone + 'static,
    A: AttendanceApi + 'static,
{
    store: SessionStore<C, S, A>,
}

impl<C, S, A> ScanSessionStore<C, S, A>
where
    C: CameraSource + 'static,
    S: ScanSurface + Clone + 'static,
    A: AttendanceApi + 'static,
{
    /// Create an idle session.
    #[must_use]
    pub fn new(env: ScanEnvironment<C, S, A>) -> Self {
        Self::with_config(env, StoreConfig::default())
    }

    /// Create an idle session with a custom store configuration.
    #[must_use]
    pub fn with_config(env: ScanEnvironment<C, S, A>, config: StoreConfig) -> Self {
        let session = ScanSession::new(DimensionWatcher::new(env.config.restart_threshold));
        Self {
            store: Store::with_config(session, ScanSessionReducer::new(), env, config),
        }
    }

    /// Send any action.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`ScanSessionStore::teardown`].
    pub async fn send(&self, action: ScanAction) -> Result<EffectHandle, StoreError> {
        self.store.send(action).await
    }

    /// Start scanning.
    ///
    /// # Errors
    ///
    /// See [`ScanSessionStore::send`].
    pub async fn start(&self) -> Result<EffectHandle, StoreError> {
        self.send(ScanAction::Start).await
    }

    /// Stop scanning and release the camera.
    ///
    /// # Errors
    ///
    /// See [`ScanSessionStore::send`].
    pub async fn stop(&self) -> Result<EffectHandle, StoreError> {
        self.send(ScanAction::Stop).await
    }

    /// Retry after a camera failure.
    ///
    /// # Errors
    ///
    /// See [`ScanSessionStore::send`].
    pub async fn retry(&self) -> Result<EffectHandle, StoreError> {
        self.send(ScanAction::Retry).await
    }

    /// Submit a typed code.
    ///
    /// # Errors
    ///
    /// See [`ScanSessionStore::send`].
    pub async fn submit_manual_entry(
        &self,
        text: impl Into<String>,
    ) -> Result<EffectHandle, StoreError> {
        self.send(ScanAction::ManualEntrySubmitted(text.into())).await
    }

    /// The scan surface was mounted.
    ///
    /// # Errors
    ///
    /// See [`ScanSessionStore::send`].
    pub async fn surface_mounted(&self) -> Result<EffectHandle, StoreError> {
        self.send(ScanAction::SurfaceMounted).await
    }

    /// The window was resized.
    ///
    /// # Errors
    ///
    /// See [`ScanSessionStore::send`].
    pub async fn window_resized(&self) -> Result<EffectHandle, StoreError> {
        self.send(ScanAction::WindowResized).await
    }

    /// The device orientation changed.
    ///
    /// # Errors
    ///
    /// See [`ScanSessionStore::send`].
    pub async fn orientation_changed(&self) -> Result<EffectHandle, StoreError> {
        self.send(ScanAction::OrientationChanged).await
    }

    /// Feed a size sample measured outside the surface trait.
    ///
    /// # Errors
    ///
    /// See [`ScanSessionStore::send`].
    pub async fn dimensions_sampled(
        &self,
        sample: CameraDimensions,
    ) -> Result<EffectHandle, StoreError> {
        self.send(ScanAction::DimensionsSampled(sample)).await
    }

    /// Copy of the session.
    pub async fn snapshot(&self) -> ScanSession {
        self.store.state(ScanSession::clone).await
    }

    /// Coarse status.
    pub async fn status(&self) -> ScanStatus {
        self.store.state(ScanSession::status).await
    }

    /// The result currently shown to the operator.
    pub async fn last_result(&self) -> Option<ConfirmationResult> {
        self.store.state(|session| session.last_result.clone()).await
    }

    /// Actions produced by effects, such as completed confirmations.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ScanAction> {
        self.store.subscribe_actions()
    }

    /// Number of tasks running under a cancellation id.
    #[must_use]
    pub fn in_flight(&self, id: EffectId) -> usize {
        self.store.in_flight(id)
    }

    /// The environment the session runs in.
    #[must_use]
    pub const fn environment(&self) -> &ScanEnvironment<C, S, A> {
        self.store.environment()
    }

    /// Stop the session, drain effects and release any camera still held.
    ///
    /// The camera is released even when draining times out.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if effects were still running
    /// after the configured shutdown timeout.
    pub async fn teardown(&self) -> Result<(), StoreError> {
        if let Err(error) = self.stop().await {
            tracing::debug!(%error, "Stop during teardown rejected");
        }

        let drained = self
            .store
            .shutdown(self.store.default_shutdown_timeout())
            .await;
        self.environment().cameras.release_active().await;

        tracing::info!(clean = drained.is_ok(), "Scan session torn down");
        drained
    }
}
