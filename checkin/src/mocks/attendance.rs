//! Mock attendance backend.

use crate::confirmation::AttendanceApi;
use crate::error::ConfirmationError;
use crate::parser::ConfirmationRequest;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

#[derive(Default)]
struct Inner {
    failures: Mutex<VecDeque<ConfirmationError>>,
    requests: Mutex<Vec<ConfirmationRequest>>,
    held: AtomicBool,
    gate: Notify,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock attendance backend.
///
/// Confirms every request unless a failure was queued with
/// [`MockAttendanceApi::fail_next`]. [`MockAttendanceApi::hold`] parks calls
/// until [`MockAttendanceApi::release`], for exercising in-flight behaviour.
#[derive(Clone, Default)]
pub struct MockAttendanceApi {
    inner: Arc<Inner>,
}

impl MockAttendanceApi {
    /// Create a mock that confirms everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call with `error`.
    pub fn fail_next(&self, error: ConfirmationError) {
        lock(&self.inner.failures).push_back(error);
    }

    /// Park calls until [`MockAttendanceApi::release`].
    pub fn hold(&self) {
        self.inner.held.store(true, Ordering::SeqCst);
    }

    /// Let parked and future calls complete.
    pub fn release(&self) {
        self.inner.held.store(false, Ordering::SeqCst);
        self.inner.gate.notify_waiters();
    }

    /// Number of calls that reached the backend.
    #[must_use]
    pub fn calls(&self) -> usize {
        lock(&self.inner.requests).len()
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<ConfirmationRequest> {
        lock(&self.inner.requests).clone()
    }
}

impl AttendanceApi for MockAttendanceApi {
    fn confirm_attendance(
        &self,
        request: ConfirmationRequest,
    ) -> impl Future<Output = Result<(), ConfirmationError>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            lock(&inner.requests).push(request);

            loop {
                let released = inner.gate.notified();
                if !inner.held.load(Ordering::SeqCst) {
                    break;
                }
                released.await;
            }

            lock(&inner.failures).pop_front().map_or(Ok(()), Err)
        }
    }
}
