//! A thread owns one cooperative event loop: tasks posted from any thread
//! are drained on a single dedicated OS thread in bounded batches, and
//! timers fire on that same thread, so no handler ever runs concurrently
//! with another handler of the same [`Thread`].

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use core_types::{CoreError, CoreResult};
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

use crate::queue::{MpscQueue, Queue};

/// Default number of tasks drained per loop iteration before the loop
/// yields to let the reactor make progress. `0` means unbounded.
pub const DEFAULT_BATCH_SIZE: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ThreadError {
    #[error("thread id must be 1-16 ASCII bytes")]
    InvalidId,
    #[error("thread is already started")]
    AlreadyStarted,
}

/// A thread's identity: 1-16 ASCII bytes, matching hatn's
/// `FixedByteArrayThrow16` thread id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThreadId(String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Result<Self, ThreadError> {
        let id = id.into();
        if id.is_empty() || id.len() > 16 || !id.is_ascii() {
            return Err(ThreadError::InvalidId);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum ThreadState {
    Constructed = 0,
    Started = 1,
    Stopped = 2,
}

/// Opaque handle to an installed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u32);

type BoxedTask = Box<dyn FnOnce() + Send + 'static>;

struct TimerHandle {
    join: tokio::task::JoinHandle<()>,
    cancelled: Arc<AtomicBool>,
}

/// A single-threaded cooperative event loop with a task queue and timers.
pub struct Thread {
    id: ThreadId,
    state: AtomicU8,
    queue: Arc<MpscQueue<BoxedTask>>,
    wake: Arc<Notify>,
    shutdown: Arc<Notify>,
    batch_size: usize,
    timers: Mutex<HashMap<u32, TimerHandle>>,
    next_timer_id: AtomicU32,
    os_thread: Mutex<Option<std::thread::JoinHandle<()>>>,
    runtime_handle: OnceLock<tokio::runtime::Handle>,
}

thread_local! {
    static CURRENT_THREAD: std::cell::RefCell<Option<Arc<Thread>>> = const { std::cell::RefCell::new(None) };
}

static MAIN_THREAD: Mutex<Option<Arc<Thread>>> = Mutex::new(None);

impl Thread {
    /// Construct a thread in the `Constructed` state; call [`start`](Self::start)
    /// to spin up its OS thread and runtime.
    pub fn new(id: impl Into<String>) -> Result<Arc<Self>, ThreadError> {
        Self::with_batch_size(id, DEFAULT_BATCH_SIZE)
    }

    pub fn with_batch_size(id: impl Into<String>, batch_size: usize) -> Result<Arc<Self>, ThreadError> {
        let id = ThreadId::new(id)?;
        Ok(Arc::new(Self {
            id,
            state: AtomicU8::new(ThreadState::Constructed as u8),
            queue: Arc::new(MpscQueue::new(false)),
            wake: Arc::new(Notify::new()),
            shutdown: Arc::new(Notify::new()),
            batch_size,
            timers: Mutex::new(HashMap::new()),
            next_timer_id: AtomicU32::new(1),
            os_thread: Mutex::new(None),
            runtime_handle: OnceLock::new(),
        }))
    }

    pub fn id(&self) -> &ThreadId {
        &self.id
    }

    pub fn is_started(&self) -> bool {
        self.state.load(Ordering::Acquire) == ThreadState::Started as u8
    }

    pub fn is_stopped(&self) -> bool {
        self.state.load(Ordering::Acquire) == ThreadState::Stopped as u8
    }

    /// Spin up the dedicated OS thread and its single-threaded runtime.
    pub fn start(self: &Arc<Self>) -> Result<(), ThreadError> {
        if self
            .state
            .compare_exchange(
                ThreadState::Constructed as u8,
                ThreadState::Started as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(ThreadError::AlreadyStarted);
        }
        let this = self.clone();
        let (runtime_tx, runtime_rx) = std::sync::mpsc::channel();
        let handle = std::thread::Builder::new()
            .name(this.id.to_string())
            .spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to build thread-local tokio runtime");
                runtime_tx
                    .send(rt.handle().clone())
                    .expect("runtime handle receiver dropped before send");
                CURRENT_THREAD.with(|cell| *cell.borrow_mut() = Some(this.clone()));
                rt.block_on(this.run_loop());
            })
            .expect("failed to spawn OS thread for Thread");
        *self.os_thread.lock().unwrap() = Some(handle);
        let runtime_handle = runtime_rx
            .recv()
            .expect("thread exited before publishing its runtime handle");
        let _ = self.runtime_handle.set(runtime_handle);
        debug!(thread = %self.id, "thread started");
        Ok(())
    }

    async fn run_loop(self: Arc<Self>) {
        loop {
            let mut processed = 0usize;
            loop {
                if self.batch_size != 0 && processed >= self.batch_size {
                    break;
                }
                match self.queue.pop_item() {
                    Some(task) => {
                        task();
                        processed += 1;
                    }
                    None => break,
                }
            }
            if self.is_stopped() {
                break;
            }
            if self.batch_size != 0 && processed >= self.batch_size && !self.queue.is_empty() {
                tokio::task::yield_now().await;
                continue;
            }
            tokio::select! {
                biased;
                _ = self.shutdown.notified() => break,
                _ = self.wake.notified() => {}
            }
        }
        trace!(thread = %self.id, "event loop exited");
    }

    /// Post a unit of work; it runs on this thread's loop, not the caller's.
    pub fn exec_async(&self, f: impl FnOnce() + Send + 'static) {
        self.queue.push(Box::new(f));
        self.wake.notify_one();
    }

    /// Post `f` and block the caller until it completes or `timeout`
    /// elapses.
    pub fn exec_sync<T: Send + 'static>(
        &self,
        f: impl FnOnce() -> T + Send + 'static,
        timeout: Duration,
    ) -> CoreResult<T> {
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        self.exec_async(move || {
            let _ = tx.send(f());
        });
        if timeout.is_zero() {
            rx.recv().map_err(|_| CoreError::cancelled("thread stopped before task ran"))
        } else {
            rx.recv_timeout(timeout)
                .map_err(|_| CoreError::timeout("exec_sync deadline exceeded"))
        }
    }

    /// Install a periodic timer. `handler` returns `false` to uninstall
    /// itself after firing.
    pub fn install_timer(
        self: &Arc<Self>,
        period: Duration,
        mut handler: impl FnMut() -> bool + Send + 'static,
        run_once: bool,
    ) -> TimerId {
        let id = self.next_timer_id.fetch_add(1, Ordering::Relaxed);
        let cancelled = Arc::new(AtomicBool::new(false));
        let cancelled_for_task = cancelled.clone();
        let runtime = self
            .runtime_handle
            .get()
            .expect("install_timer called before start()")
            .clone();
        let thread_id = self.id.clone();
        let join = runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // first tick fires immediately; skip it
            loop {
                interval.tick().await;
                if cancelled_for_task.load(Ordering::Acquire) {
                    return;
                }
                if !handler() {
                    debug!(thread = %thread_id, timer = id, "timer handler requested uninstall");
                    return;
                }
                if run_once {
                    return;
                }
            }
        });
        self.timers
            .lock()
            .unwrap()
            .insert(id, TimerHandle { join, cancelled });
        TimerId(id)
    }

    pub fn uninstall_timer(&self, id: TimerId, wait: bool) {
        let handle = self.timers.lock().unwrap().remove(&id.0);
        if let Some(handle) = handle {
            handle.cancelled.store(true, Ordering::Release);
            handle.join.abort();
            if wait {
                let deadline = std::time::Instant::now() + Duration::from_millis(500);
                while !handle.join.is_finished() && std::time::Instant::now() < deadline {
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
        } else {
            warn!(timer = id.0, "uninstall_timer called with unknown id");
        }
    }

    /// Synchronous stop-and-clear: in-flight handlers finish, the queue and
    /// all timers are cleared, then the OS thread joins.
    pub fn stop(&self) {
        if self
            .state
            .compare_exchange(
                ThreadState::Started as u8,
                ThreadState::Stopped as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }
        for (_, handle) in self.timers.lock().unwrap().drain() {
            handle.cancelled.store(true, Ordering::Release);
            handle.join.abort();
        }
        self.queue.clear();
        self.shutdown.notify_one();
        if let Some(handle) = self.os_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
        debug!(thread = %self.id, "thread stopped");
    }

    /// The thread whose loop is executing on the calling OS thread, if any.
    pub fn current_thread() -> Option<Arc<Thread>> {
        CURRENT_THREAD.with(|cell| cell.borrow().clone())
    }

    /// `current_thread()`, falling back to the designated main thread.
    pub fn current_thread_or_main() -> Option<Arc<Thread>> {
        Self::current_thread().or_else(|| MAIN_THREAD.lock().unwrap().clone())
    }

    pub fn set_main_thread(thread: Arc<Thread>) {
        *MAIN_THREAD.lock().unwrap() = Some(thread);
    }

    pub fn main_thread() -> Option<Arc<Thread>> {
        MAIN_THREAD.lock().unwrap().clone()
    }

    pub fn release_main_thread() {
        *MAIN_THREAD.lock().unwrap() = None;
    }

    pub fn pending_tasks(&self) -> usize {
        self.queue.len()
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        if self.is_started() {
            self.stop();
        }
    }
}

impl PartialEq for Thread {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn rejects_oversized_id() {
        assert!(matches!(
            ThreadId::new("a".repeat(17)),
            Err(ThreadError::InvalidId)
        ));
    }

    #[test]
    fn exec_sync_returns_handler_result() {
        let thread = Thread::new("worker").unwrap();
        thread.start().unwrap();
        let result = thread
            .exec_sync(|| 2 + 2, Duration::from_secs(1))
            .unwrap();
        assert_eq!(result, 4);
        thread.stop();
    }

    #[test]
    fn exec_async_runs_on_the_threads_own_loop() {
        let thread = Thread::new("worker2").unwrap();
        thread.start().unwrap();
        let seen_id = thread
            .exec_sync(
                move || Thread::current_thread().map(|t| t.id().to_string()),
                Duration::from_secs(1),
            )
            .unwrap();
        assert_eq!(seen_id.as_deref(), Some("worker2"));
        thread.stop();
    }

    #[test]
    fn stop_is_idempotent_and_joins_cleanly() {
        let thread = Thread::new("worker3").unwrap();
        thread.start().unwrap();
        thread.stop();
        thread.stop();
        assert!(thread.is_stopped());
    }

    #[test]
    fn timer_fires_and_can_uninstall_itself() {
        let thread = Thread::new("worker4").unwrap();
        thread.start().unwrap();
        let fires = Arc::new(AtomicUsize::new(0));
        let fires_for_timer = fires.clone();
        thread.install_timer(
            Duration::from_millis(10),
            move || {
                fires_for_timer.fetch_add(1, Ordering::SeqCst);
                false // uninstall after first fire
            },
            false,
        );
        std::thread::sleep(Duration::from_millis(100));
        assert!(fires.load(Ordering::SeqCst) >= 1);
        thread.stop();
    }
}
