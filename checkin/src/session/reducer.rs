//! Reducer for the scan session.

use crate::camera::{AcquiredCamera, CameraHandle, CameraSource, ScanSurface};
use crate::confirmation::{AttendanceApi, ConfirmationResult};
use crate::dimensions::{CameraDimensions, Observation};
use crate::error::{CameraError, ParseError, ScanError};
use crate::parser::{self, CheckInTicket, DecodedPayload};
use crate::router::Routed;
use crate::session::{
    AUTO_RESUME, DECODE_STREAM, ORIENTATION_SETTLE, RESTART_DEBOUNCE, ScanAction,
    ScanEnvironment, ScanSession, ScanState, TicketId,
};
use futures::stream::{self, StreamExt};
use std::marker::PhantomData;
use std::sync::Arc;
use turnstile_core::{SmallVec, effect::Effect, reducer::Reducer, smallvec};

type Effects = SmallVec<[Effect<ScanAction>; 4]>;

/// Reducer for the scan session.
///
/// Drives `Idle → Starting → Scanning → Resolving → (Scanning | Idle)` plus
/// the `Error` state for camera failures. Camera acquisition, the decode
/// stream, confirmation calls and timers all run as effects; their results
/// come back as actions. Completions that belong to an attempt or ticket the
/// session already moved past are ignored, and cameras they carry are
/// released.
pub struct ScanSessionReducer<C, S, A> {
    _phantom: PhantomData<fn() -> (C, S, A)>,
}

impl<C, S, A> ScanSessionReducer<C, S, A> {
    /// Create a new scan session reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<C, S, A> Default for ScanSessionReducer<C, S, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, S, A> Clone for ScanSessionReducer<C, S, A> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<C, S, A> std::fmt::Debug for ScanSessionReducer<C, S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ScanSessionReducer")
    }
}

fn ignored(action: &'static str, session: &ScanSession) -> Effects {
    tracing::debug!(action, status = ?session.status(), "Ignoring action in current state");
    smallvec![Effect::None]
}

/// Where a scan settles when it does not resume the camera.
fn rest_state(camera_error: Option<CameraError>) -> ScanState {
    camera_error.map_or(ScanState::Idle, ScanState::Error)
}

impl<C, S, A> ScanSessionReducer<C, S, A>
where
    C: CameraSource + 'static,
    S: ScanSurface + Clone + 'static,
    A: AttendanceApi + 'static,
{
    // ═══════════════════════════════════════════════════════════════
    // Effect builders
    // ═══════════════════════════════════════════════════════════════

    fn acquire(env: &ScanEnvironment<C, S, A>, attempt: u64) -> Effect<ScanAction> {
        let cameras = Arc::clone(&env.cameras);
        let surface = env.surface.clone();

        Effect::Future(Box::pin(async move {
            Some(match cameras.acquire(&surface).await {
                Ok(camera) => ScanAction::CameraAcquired { attempt, camera },
                Err(error) => ScanAction::CameraAcquireFailed { attempt, error },
            })
        }))
    }

    fn restart(
        env: &ScanEnvironment<C, S, A>,
        attempt: u64,
        handle: CameraHandle,
    ) -> Effect<ScanAction> {
        let cameras = Arc::clone(&env.cameras);
        let surface = env.surface.clone();

        Effect::Future(Box::pin(async move {
            Some(match cameras.restart(&handle, &surface).await {
                Ok(camera) => ScanAction::CameraAcquired { attempt, camera },
                Err(error) => ScanAction::CameraAcquireFailed { attempt, error },
            })
        }))
    }

    fn release(env: &ScanEnvironment<C, S, A>, handle: CameraHandle) -> Effect<ScanAction> {
        let cameras = Arc::clone(&env.cameras);

        Effect::Future(Box::pin(async move {
            cameras.release(&handle).await;
            None
        }))
    }

    /// Subscribes to the camera's decoder when the stream is first polled.
    fn decode_stream(env: &ScanEnvironment<C, S, A>, handle: CameraHandle) -> Effect<ScanAction> {
        let cameras = Arc::clone(&env.cameras);
        let decodes = stream::once(async move { cameras.decodes(&handle) })
            .flatten()
            .map(ScanAction::FrameDecoded);

        Effect::Stream(Box::pin(decodes)).cancellable(DECODE_STREAM)
    }

    fn confirm(
        env: &ScanEnvironment<C, S, A>,
        epoch: u64,
        ticket: TicketId,
        check_in: CheckInTicket,
    ) -> Effect<ScanAction> {
        let coordinator = Arc::clone(&env.coordinator);

        Effect::Future(Box::pin(async move {
            let result = coordinator.confirm(epoch, check_in).await;
            Some(ScanAction::ConfirmationCompleted { ticket, result })
        }))
    }

    fn sample(env: &ScanEnvironment<C, S, A>) -> Effect<ScanAction> {
        let env = env.clone();

        Effect::Future(Box::pin(async move {
            Some(ScanAction::DimensionsSampled(env.sample_dimensions()))
        }))
    }

    fn announce_rejection(result: ConfirmationResult) -> Effect<ScanAction> {
        Effect::Future(Box::pin(async move { Some(ScanAction::ScanRejected { result }) }))
    }

    fn release_held(env: &ScanEnvironment<C, S, A>, camera: Option<AcquiredCamera>) -> Effects {
        camera.map_or_else(
            || smallvec![Effect::None],
            |camera| smallvec![Self::release(env, camera.handle)],
        )
    }

    // ═══════════════════════════════════════════════════════════════
    // Transitions
    // ═══════════════════════════════════════════════════════════════

    fn begin(session: &mut ScanSession, env: &ScanEnvironment<C, S, A>) -> Effects {
        let attempt = session.next_attempt();
        session.router.clear();
        session.state = ScanState::Starting { attempt };

        tracing::info!(attempt, "Starting camera");
        metrics::counter!("scanner.sessions.started").increment(1);
        smallvec![Self::acquire(env, attempt)]
    }

    fn stop(session: &mut ScanSession, env: &ScanEnvironment<C, S, A>) -> Effects {
        let previous = std::mem::take(&mut session.state);
        session.end_epoch();
        session.router.clear();
        session.qr_box = None;
        session.watcher.restart_finished();

        tracing::info!(from = ?previous.status(), "Scan session stopped");

        let mut effects: Effects =
            smallvec![Effect::Cancel(DECODE_STREAM), Effect::Cancel(AUTO_RESUME)];
        if let Some(camera) = previous.camera() {
            effects.push(Self::release(env, camera.handle.clone()));
        }
        effects
    }

    /// Take the camera out of `Scanning`, leaving other states untouched.
    fn pause(session: &mut ScanSession) -> Option<AcquiredCamera> {
        match std::mem::take(&mut session.state) {
            ScanState::Scanning { camera } => Some(camera),
            other => {
                session.state = other;
                None
            },
        }
    }

    fn fail(
        session: &mut ScanSession,
        env: &ScanEnvironment<C, S, A>,
        error: &ScanError,
        payload: Option<DecodedPayload>,
        held: (Option<AcquiredCamera>, Option<CameraError>),
    ) -> Effects {
        let (camera, camera_error) = held;
        let result = env.coordinator.reject(error, payload);
        session.last_result = Some(result.clone());
        session.state = rest_state(camera_error);
        session.qr_box = None;

        let mut effects = Self::release_held(env, camera);
        effects.push(Self::announce_rejection(result));
        effects
    }

    /// Run a parsed payload through validation and into confirmation.
    ///
    /// `held` is the paused camera, if any, and the camera failure the scan
    /// was made from, if any.
    fn accept(
        session: &mut ScanSession,
        env: &ScanEnvironment<C, S, A>,
        parsed: Result<DecodedPayload, ParseError>,
        held: (Option<AcquiredCamera>, Option<CameraError>),
    ) -> Effects {
        let payload = match parsed {
            Ok(payload) => payload,
            Err(error) => return Self::fail(session, env, &error.into(), None, held),
        };

        match payload.clone().validate() {
            Ok(check_in) => {
                let ticket = session.next_ticket();
                tracing::info!(
                    %ticket,
                    attendance = %check_in.event_attendance_id,
                    "Confirming attendance"
                );

                let (camera, camera_error) = held;
                session.last_result = None;
                session.state = ScanState::Resolving {
                    ticket,
                    payload,
                    camera,
                    camera_error,
                    confirmed: false,
                };
                smallvec![Self::confirm(env, session.epoch(), ticket, check_in)]
            },
            Err(error) => Self::fail(session, env, &error.into(), Some(payload), held),
        }
    }

    fn frame_decoded(
        session: &mut ScanSession,
        env: &ScanEnvironment<C, S, A>,
        raw_text: &str,
    ) -> Effects {
        if !matches!(session.state, ScanState::Scanning { .. }) {
            tracing::trace!(status = ?session.status(), "Dropping decode event outside Scanning");
            return smallvec![Effect::None];
        }

        match session.router.route(raw_text) {
            Routed::Duplicate => smallvec![Effect::None],
            Routed::Forward(parsed) => {
                let camera = Self::pause(session);
                let mut effects: Effects = smallvec![Effect::Cancel(DECODE_STREAM)];
                effects.extend(Self::accept(session, env, parsed, (camera, None)));
                effects
            },
        }
    }

    fn manual_entry(
        session: &mut ScanSession,
        env: &ScanEnvironment<C, S, A>,
        text: &str,
    ) -> Effects {
        let mut effects: Effects = SmallVec::new();
        let camera_error = match &session.state {
            ScanState::Scanning { .. } => {
                effects.push(Effect::Cancel(DECODE_STREAM));
                None
            },
            ScanState::Idle => None,
            ScanState::Error(error) => Some(error.clone()),
            ScanState::Starting { .. } | ScanState::Resolving { .. } => {
                return ignored("manual_entry", session);
            },
        };

        tracing::info!("Manual entry submitted");
        metrics::counter!("scanner.manual_entries").increment(1);

        let camera = Self::pause(session);
        effects.extend(Self::accept(
            session,
            env,
            parser::parse(text),
            (camera, camera_error),
        ));
        effects
    }

    fn camera_acquired(
        session: &mut ScanSession,
        env: &ScanEnvironment<C, S, A>,
        attempt: u64,
        camera: AcquiredCamera,
    ) -> Effects {
        if session.state != (ScanState::Starting { attempt }) {
            tracing::warn!(
                attempt,
                handle = camera.handle.id,
                "Releasing camera from a superseded acquisition"
            );
            return smallvec![Self::release(env, camera.handle)];
        }

        session.watcher.restart_finished();
        session.qr_box = Some(camera.qr_box);
        let decodes = Self::decode_stream(env, camera.handle.clone());
        session.state = ScanState::Scanning { camera };

        tracing::info!(attempt, "Scanning");
        smallvec![Effect::Cancel(DECODE_STREAM), decodes]
    }

    fn camera_acquire_failed(
        session: &mut ScanSession,
        attempt: u64,
        error: CameraError,
    ) -> Effects {
        if session.state != (ScanState::Starting { attempt }) {
            tracing::debug!(attempt, %error, "Ignoring failure of a superseded acquisition");
            return smallvec![Effect::None];
        }

        tracing::warn!(attempt, %error, "Camera unavailable");
        session.watcher.restart_finished();
        session.qr_box = None;
        session.state = ScanState::Error(error);
        smallvec![Effect::None]
    }

    fn confirmation_completed(
        session: &mut ScanSession,
        env: &ScanEnvironment<C, S, A>,
        ticket: TicketId,
        result: ConfirmationResult,
    ) -> Effects {
        match std::mem::take(&mut session.state) {
            ScanState::Resolving {
                ticket: current,
                payload,
                camera,
                camera_error,
                confirmed: false,
            } if current == ticket => {
                let success = result.success;
                session.last_result = Some(result);

                match camera {
                    Some(camera) if success => {
                        session.state = ScanState::Resolving {
                            ticket,
                            payload,
                            camera: Some(camera),
                            camera_error,
                            confirmed: true,
                        };
                        smallvec![
                            Effect::Cancel(AUTO_RESUME),
                            Effect::Delay {
                                duration: env.config.auto_resume(),
                                action: Box::new(ScanAction::ResumeScanning { ticket }),
                            }
                            .cancellable(AUTO_RESUME)
                        ]
                    },
                    None if success => {
                        // Nothing paused, nothing to resume
                        tracing::info!(%ticket, "Manual check-in confirmed");
                        session.state = rest_state(camera_error);
                        smallvec![Effect::None]
                    },
                    camera => {
                        session.state = rest_state(camera_error);
                        session.qr_box = None;
                        Self::release_held(env, camera)
                    },
                }
            },
            other => {
                session.state = other;
                tracing::debug!(%ticket, "Ignoring confirmation for a superseded scan");
                smallvec![Effect::None]
            },
        }
    }

    fn resume_scanning(
        session: &mut ScanSession,
        env: &ScanEnvironment<C, S, A>,
        ticket: TicketId,
    ) -> Effects {
        match std::mem::take(&mut session.state) {
            ScanState::Resolving {
                ticket: current,
                camera,
                camera_error,
                confirmed: true,
                ..
            } if current == ticket => {
                session.router.clear();
                session.last_result = None;

                if let Some(camera) = camera {
                    tracing::info!(%ticket, "Resuming scanning");
                    let decodes = Self::decode_stream(env, camera.handle.clone());
                    session.state = ScanState::Scanning { camera };
                    smallvec![Effect::Cancel(DECODE_STREAM), decodes]
                } else {
                    session.state = rest_state(camera_error);
                    smallvec![Effect::None]
                }
            },
            other => {
                session.state = other;
                ignored("resume_scanning", session)
            },
        }
    }

    fn observe(
        session: &mut ScanSession,
        env: &ScanEnvironment<C, S, A>,
        sample: CameraDimensions,
    ) -> Effects {
        match session.watcher.observe(sample) {
            Observation::RestartScheduled => smallvec![
                Effect::Cancel(RESTART_DEBOUNCE),
                Effect::Delay {
                    duration: env.config.restart_debounce(),
                    action: Box::new(ScanAction::RestartDebounceElapsed),
                }
                .cancellable(RESTART_DEBOUNCE)
            ],
            Observation::Baseline | Observation::Stable => smallvec![Effect::None],
        }
    }

    fn restart_debounce_elapsed(
        session: &mut ScanSession,
        env: &ScanEnvironment<C, S, A>,
    ) -> Effects {
        let camera_active = matches!(session.state, ScanState::Scanning { .. });
        if !session.watcher.debounce_elapsed(camera_active) {
            return smallvec![Effect::None];
        }

        match Self::pause(session) {
            Some(camera) => {
                let attempt = session.next_attempt();
                session.state = ScanState::Starting { attempt };

                tracing::info!(attempt, "Layout changed, restarting camera");
                smallvec![
                    Effect::Cancel(DECODE_STREAM),
                    Self::restart(env, attempt, camera.handle)
                ]
            },
            None => {
                session.watcher.restart_finished();
                smallvec![Effect::None]
            },
        }
    }
}

impl<C, S, A> Reducer for ScanSessionReducer<C, S, A>
where
    C: CameraSource + 'static,
    S: ScanSurface + Clone + 'static,
    A: AttendanceApi + 'static,
{
    type State = ScanSession;
    type Action = ScanAction;
    type Environment = ScanEnvironment<C, S, A>;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ═══════════════════════════════════════════════════════════════
            // Operator commands
            // ═══════════════════════════════════════════════════════════════
            ScanAction::Start => match state.state {
                ScanState::Idle => Self::begin(state, env),
                _ => ignored("start", state),
            },
            ScanAction::Retry => match state.state {
                ScanState::Error(_) => Self::begin(state, env),
                _ => ignored("retry", state),
            },
            ScanAction::Stop => Self::stop(state, env),
            ScanAction::ManualEntrySubmitted(text) => Self::manual_entry(state, env, &text),

            // ═══════════════════════════════════════════════════════════════
            // Camera lifecycle
            // ═══════════════════════════════════════════════════════════════
            ScanAction::CameraAcquired { attempt, camera } => {
                Self::camera_acquired(state, env, attempt, camera)
            },
            ScanAction::CameraAcquireFailed { attempt, error } => {
                Self::camera_acquire_failed(state, attempt, error)
            },
            ScanAction::FrameDecoded(raw_text) => Self::frame_decoded(state, env, &raw_text),

            // ═══════════════════════════════════════════════════════════════
            // Confirmation
            // ═══════════════════════════════════════════════════════════════
            ScanAction::ConfirmationCompleted { ticket, result } => {
                Self::confirmation_completed(state, env, ticket, result)
            },
            ScanAction::ResumeScanning { ticket } => Self::resume_scanning(state, env, ticket),
            ScanAction::ScanRejected { result } => {
                tracing::trace!(message = %result.message, "Rejection reported");
                smallvec![Effect::None]
            },

            // ═══════════════════════════════════════════════════════════════
            // Layout
            // ═══════════════════════════════════════════════════════════════
            ScanAction::SurfaceMounted | ScanAction::WindowResized | ScanAction::LayoutSettled => {
                smallvec![Self::sample(env)]
            },
            ScanAction::OrientationChanged => smallvec![
                Self::sample(env),
                Effect::Cancel(ORIENTATION_SETTLE),
                Effect::Delay {
                    duration: env.config.orientation_settle(),
                    action: Box::new(ScanAction::LayoutSettled),
                }
                .cancellable(ORIENTATION_SETTLE)
            ],
            ScanAction::DimensionsSampled(sample) => Self::observe(state, env, sample),
            ScanAction::RestartDebounceElapsed => Self::restart_debounce_elapsed(state, env),
        }
    }
}
