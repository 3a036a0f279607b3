//! Attendance confirmation.
//!
//! The coordinator makes exactly one backend call per accepted ticket and
//! never retries. A second call from the same session epoch while one is
//! running is rejected with [`ConfirmationError::Busy`] without contacting
//! the backend. A call left running by an earlier epoch (the operator stopped
//! mid-confirmation) is abandoned: it finishes in the background and the next
//! epoch may confirm right away.

use crate::error::{ConfirmationError, ScanError};
use crate::parser::{CheckInTicket, ConfirmationRequest, DecodedPayload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use turnstile_core::environment::Clock;

/// Path of the confirmation endpoint, relative to the API base URL.
pub const CONFIRM_PATH: &str = "/event-attendances/confirm";

/// Operator message shown after a successful check-in.
pub const SUCCESS_MESSAGE: &str = "Attendance confirmed";
/// Operator message for any backend failure.
pub const FAILURE_MESSAGE: &str = "Could not confirm attendance. Please scan again.";
/// Operator message for text that is not a check-in code.
pub const MALFORMED_MESSAGE: &str = "This QR code is not a check-in code.";
/// Operator message for a code missing an identifier.
pub const INCOMPLETE_MESSAGE: &str = "This QR code is missing check-in details.";

/// Outcome of one scan, as shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationResult {
    /// Whether attendance was confirmed
    pub success: bool,
    /// Operator-facing message
    pub message: String,
    /// The payload the result is about, when one was parsed
    pub payload: Option<DecodedPayload>,
    /// When the result was produced
    pub timestamp: DateTime<Utc>,
}

impl ConfirmationResult {
    /// A confirmed check-in.
    #[must_use]
    pub fn confirmed(payload: DecodedPayload, timestamp: DateTime<Utc>) -> Self {
        Self {
            success: true,
            message: SUCCESS_MESSAGE.to_string(),
            payload: Some(payload),
            timestamp,
        }
    }

    /// A failed scan. Backend failures share one message.
    #[must_use]
    pub fn failed(
        error: &ScanError,
        payload: Option<DecodedPayload>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let message = match error {
            ScanError::Parse(_) => MALFORMED_MESSAGE,
            ScanError::Payload(_) => INCOMPLETE_MESSAGE,
            ScanError::Confirmation(_) => FAILURE_MESSAGE,
        };
        Self {
            success: false,
            message: message.to_string(),
            payload,
            timestamp,
        }
    }
}

/// Backend that records attendance.
pub trait AttendanceApi: Send + Sync {
    /// Confirm one attendance.
    ///
    /// # Errors
    ///
    /// Returns [`ConfirmationError::Network`] when no response arrived and
    /// [`ConfirmationError::Rejected`] for non-success responses.
    fn confirm_attendance(
        &self,
        request: ConfirmationRequest,
    ) -> impl Future<Output = Result<(), ConfirmationError>> + Send;
}

fn lock(slot: &Mutex<Option<u64>>) -> MutexGuard<'_, Option<u64>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Frees the in-flight slot when the call ends or is dropped, unless a later
/// epoch has taken it over.
struct InFlightGuard<'a> {
    slot: &'a Mutex<Option<u64>>,
    epoch: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut slot = lock(self.slot);
        if *slot == Some(self.epoch) {
            *slot = None;
        }
    }
}

/// Single-flight wrapper around an [`AttendanceApi`].
pub struct AttendanceConfirmationCoordinator<A> {
    api: A,
    clock: Arc<dyn Clock>,
    /// Epoch of the call currently in flight
    in_flight: Mutex<Option<u64>>,
}

impl<A: AttendanceApi> AttendanceConfirmationCoordinator<A> {
    /// Create a coordinator.
    #[must_use]
    pub fn new(api: A, clock: Arc<dyn Clock>) -> Self {
        Self {
            api,
            clock,
            in_flight: Mutex::new(None),
        }
    }

    /// The wrapped backend.
    #[must_use]
    pub const fn api(&self) -> &A {
        &self.api
    }

    /// Whether a confirmation call is running.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        lock(&self.in_flight).is_some()
    }

    /// Confirm a ticket on behalf of session `epoch`.
    ///
    /// Failures are folded into the returned result; nothing is retried.
    #[tracing::instrument(skip(self, ticket), fields(attendance = %ticket.event_attendance_id))]
    pub async fn confirm(&self, epoch: u64, ticket: CheckInTicket) -> ConfirmationResult {
        {
            let mut slot = lock(&self.in_flight);
            match *slot {
                Some(current) if current == epoch => {
                    drop(slot);
                    tracing::warn!("Confirmation already in flight, rejecting");
                    return self.reject(&ConfirmationError::Busy.into(), Some(ticket.payload()));
                },
                Some(abandoned) => {
                    tracing::debug!(abandoned, "Confirmation from a stopped session still running");
                },
                None => {},
            }
            *slot = Some(epoch);
        }
        let _guard = InFlightGuard {
            slot: &self.in_flight,
            epoch,
        };

        let start = std::time::Instant::now();
        let outcome = self.api.confirm_attendance(ticket.request()).await;
        metrics::histogram!("scanner.confirmation.duration_seconds")
            .record(start.elapsed().as_secs_f64());

        match outcome {
            Ok(()) => {
                tracing::info!("Attendance confirmed");
                metrics::counter!("scanner.confirmations", "outcome" => "confirmed").increment(1);
                ConfirmationResult::confirmed(ticket.payload(), self.clock.now())
            },
            Err(error) => self.reject(&error.into(), Some(ticket.payload())),
        }
    }

    /// Produce a failure result for a scan that never reached the backend,
    /// or whose confirmation failed.
    #[must_use]
    pub fn reject(&self, error: &ScanError, payload: Option<DecodedPayload>) -> ConfirmationResult {
        tracing::warn!(%error, kind = error.kind(), "Scan failed");
        metrics::counter!("scanner.confirmations", "outcome" => error.kind()).increment(1);
        ConfirmationResult::failed(error, payload, self.clock.now())
    }
}

/// [`AttendanceApi`] over HTTP.
///
/// POSTs `{"eventAttendanceId", "checkingInAccountId"}` as JSON to
/// `<base_url>/event-attendances/confirm`. There is no request timeout.
#[derive(Debug, Clone)]
pub struct HttpAttendanceApi {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpAttendanceApi {
    /// Create a client for the API at `base_url`, optionally authenticating
    /// with a bearer token.
    #[must_use]
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, token)
    }

    /// Create a client reusing an existing `reqwest::Client`.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: &str, token: Option<String>) -> Self {
        Self {
            client,
            endpoint: format!("{}{CONFIRM_PATH}", base_url.trim_end_matches('/')),
            token,
        }
    }

    /// Full URL of the confirmation endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl AttendanceApi for HttpAttendanceApi {
    fn confirm_attendance(
        &self,
        request: ConfirmationRequest,
    ) -> impl Future<Output = Result<(), ConfirmationError>> + Send {
        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        async move {
            let response = builder
                .send()
                .await
                .map_err(|error| ConfirmationError::Network(error.to_string()))?;

            let status = response.status();
            if status.is_success() {
                return Ok(());
            }

            let message = response.text().await.unwrap_or_default();
            Err(ConfirmationError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }
}
