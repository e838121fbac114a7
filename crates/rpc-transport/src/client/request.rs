//! Client request state machine (§4.4.2).
//!
//! States: *Pending → (Serialized → InFlight) → Done | Cancelled |
//! TimedOut*. `cancel()` on a request that has not yet been handed to the
//! sender succeeds and prevents transmission outright — `mark_serialized`
//! is the gate that checks this, refusing the transition once a request
//! has already moved to `Cancelled`.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use core_types::{CoreError, CoreResult};
use parking_lot::Mutex;
use task_runtime::Thread;

use crate::wire::RequestUnit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestState {
    Pending = 0,
    Serialized = 1,
    InFlight = 2,
    Done = 3,
    Cancelled = 4,
    TimedOut = 5,
}

impl From<u8> for RequestState {
    fn from(v: u8) -> Self {
        match v {
            0 => RequestState::Pending,
            1 => RequestState::Serialized,
            2 => RequestState::InFlight,
            3 => RequestState::Done,
            4 => RequestState::Cancelled,
            _ => RequestState::TimedOut,
        }
    }
}

type Callback = Box<dyn FnOnce(CoreResult<RequestUnit>) + Send>;

/// One in-flight client request: its header/payload, the thread its
/// callback must be posted on, and a deadline timer.
pub struct Request {
    pub unit: RequestUnit,
    state: AtomicU8,
    callback: Mutex<Option<Callback>>,
    callback_thread: Arc<Thread>,
    timer: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Request {
    pub fn new(unit: RequestUnit, callback_thread: Arc<Thread>, cb: impl FnOnce(CoreResult<RequestUnit>) + Send + 'static) -> Arc<Self> {
        Arc::new(Self {
            unit,
            state: AtomicU8::new(RequestState::Pending as u8),
            callback: Mutex::new(Some(Box::new(cb))),
            callback_thread,
            timer: Mutex::new(None),
        })
    }

    pub fn state(&self) -> RequestState {
        RequestState::from(self.state.load(Ordering::Acquire))
    }

    /// Attempts the `Pending -> Serialized` transition the sender makes
    /// just before writing the frame. Fails (returns `false`) if the
    /// request was cancelled first, in which case the caller must not
    /// write anything to the socket.
    pub fn mark_serialized(&self) -> bool {
        self.state
            .compare_exchange(
                RequestState::Pending as u8,
                RequestState::Serialized as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn mark_in_flight(&self) -> bool {
        self.state
            .compare_exchange(
                RequestState::Serialized as u8,
                RequestState::InFlight as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Starts the deadline timer; fires `TimedOut` on the callback thread
    /// if no response lands first.
    pub fn start_timer(self: &Arc<Self>, timeout: Duration) {
        let request = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            request.finish(RequestState::TimedOut, Err(CoreError::timeout("request deadline exceeded")));
        });
        *self.timer.lock() = Some(handle);
    }

    /// Cancels the request. Succeeds unconditionally against `Pending`,
    /// `Serialized`, or `InFlight`; a no-op against a request that has
    /// already reached a terminal state.
    pub fn cancel(self: &Arc<Self>) -> bool {
        let from = self.state.load(Ordering::Acquire);
        if matches!(RequestState::from(from), RequestState::Done | RequestState::Cancelled | RequestState::TimedOut) {
            return false;
        }
        self.finish(RequestState::Cancelled, Err(CoreError::cancelled("request cancelled by caller")));
        true
    }

    /// Completes the request with a response unit, moving it to `Done`.
    /// Ignored if the request already reached a terminal state (e.g. the
    /// deadline fired first).
    pub fn complete(self: &Arc<Self>, response: RequestUnit) {
        self.finish(RequestState::Done, Ok(response));
    }

    fn finish(self: &Arc<Self>, terminal: RequestState, result: CoreResult<RequestUnit>) {
        let previous = self.state.swap(terminal as u8, Ordering::AcqRel);
        if matches!(RequestState::from(previous), RequestState::Done | RequestState::Cancelled | RequestState::TimedOut) {
            // Already terminal; restore and drop this attempt.
            self.state.store(previous, Ordering::Release);
            return;
        }
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
        if let Some(cb) = self.callback.lock().take() {
            if self.callback_thread.is_started() {
                self.callback_thread.exec_async(move || cb(result));
            } else {
                cb(result);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::ObjectId;
    use std::sync::atomic::AtomicBool;

    fn unit() -> RequestUnit {
        RequestUnit {
            id: ObjectId::new(),
            service: "items".into(),
            method: "create".into(),
            topic: "t1".into(),
            tenancy: "acme".into(),
            session_id: None,
            message: b"{}".to_vec(),
            auth_header: None,
            method_auth_header: None,
        }
    }

    #[tokio::test]
    async fn cancel_before_send_succeeds_and_prevents_serialization() {
        let thread = Thread::new("cb").unwrap();
        thread.start().unwrap();
        let fired = Arc::new(AtomicBool::new(false));
        let fired_for_cb = fired.clone();
        let request = Request::new(unit(), thread.clone(), move |r| {
            fired_for_cb.store(true, Ordering::SeqCst);
            assert!(r.is_err());
        });

        assert!(request.cancel());
        assert!(!request.mark_serialized());
        assert_eq!(request.state(), RequestState::Cancelled);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(fired.load(Ordering::SeqCst));
        thread.stop();
    }

    #[tokio::test]
    async fn completing_an_in_flight_request_invokes_the_callback_once() {
        let thread = Thread::new("cb2").unwrap();
        thread.start().unwrap();
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let calls_for_cb = calls.clone();
        let request = Request::new(unit(), thread.clone(), move |_| {
            calls_for_cb.fetch_add(1, Ordering::SeqCst);
        });
        assert!(request.mark_serialized());
        assert!(request.mark_in_flight());
        request.complete(unit());
        // A second completion (e.g. a duplicate frame) must not re-fire.
        request.complete(unit());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        thread.stop();
    }

    #[tokio::test]
    async fn timer_fires_timed_out_when_no_response_arrives() {
        let thread = Thread::new("cb3").unwrap();
        thread.start().unwrap();
        let request = Request::new(unit(), thread.clone(), |r| {
            assert!(r.is_err());
        });
        assert!(request.mark_serialized());
        assert!(request.mark_in_flight());
        request.start_timer(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(request.state(), RequestState::TimedOut);
        thread.stop();
    }
}
