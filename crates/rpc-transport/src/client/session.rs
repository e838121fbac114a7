//! Session auth header with coalesced refresh (§4.4.3).
//!
//! At most one refresh is ever in flight. Callers that invoke `refresh`
//! while one is already running have their callback appended to the
//! pending map and return immediately; when the in-flight refresh
//! completes, every appended callback is invoked with the same result and
//! the map is cleared. One entry completed, many waiters notified, keyed
//! by the caller's `TaskContextId` instead of a correlation id, and driven
//! by callbacks instead of a oneshot channel since the caller may not be
//! on an async task at all.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use core_types::{CoreError, CoreResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use task_runtime::TaskContextId;

pub type AuthHeader = Vec<u8>;
type RefreshCallback = Box<dyn FnOnce(CoreResult<AuthHeader>) + Send>;

/// Performs the actual refresh round-trip (typically another RPC call out
/// of band). Supplied by whoever wires up the session; the transport
/// itself has no opinion on how a fresh auth header is obtained.
#[async_trait::async_trait]
pub trait SessionRefresher: Send + Sync {
    async fn refresh(&self) -> CoreResult<AuthHeader>;
}

struct RefreshState {
    in_progress: AtomicBool,
    waiters: Mutex<HashMap<TaskContextId, Vec<RefreshCallback>>>,
}

pub struct Session {
    auth_header: Mutex<Option<AuthHeader>>,
    valid: AtomicBool,
    refresher: Arc<dyn SessionRefresher>,
    refresh: Arc<RefreshState>,
}

impl Session {
    pub fn new(refresher: Arc<dyn SessionRefresher>) -> Self {
        Self {
            auth_header: Mutex::new(None),
            valid: AtomicBool::new(false),
            refresher,
            refresh: Arc::new(RefreshState {
                in_progress: AtomicBool::new(false),
                waiters: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn with_header(refresher: Arc<dyn SessionRefresher>, header: AuthHeader) -> Self {
        let session = Self::new(refresher);
        *session.auth_header.lock() = Some(header);
        session.valid.store(true, Ordering::Release);
        session
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    pub fn auth_header(&self) -> Option<AuthHeader> {
        self.auth_header.lock().clone()
    }

    /// Refresh the session's auth header. `ctx_id` identifies the caller
    /// for the pending-waiters bucket; `cb` fires exactly once, either when
    /// this call's own refresh completes or when a concurrent refresh this
    /// call coalesced into completes.
    pub fn refresh(self: &Arc<Self>, ctx_id: TaskContextId, cb: impl FnOnce(CoreResult<AuthHeader>) + Send + 'static) {
        self.refresh.waiters.lock().entry(ctx_id).or_default().push(Box::new(cb));

        if self.refresh.in_progress.swap(true, Ordering::AcqRel) {
            // Another caller already started a refresh; it will drain the
            // waiters map (including the entry just pushed) when it lands.
            return;
        }

        let session = self.clone();
        tokio::spawn(async move {
            let result = session.refresher.refresh().await;
            session.complete_refresh(result);
        });
    }

    fn complete_refresh(&self, result: CoreResult<AuthHeader>) {
        match &result {
            Ok(header) => {
                *self.auth_header.lock() = Some(header.clone());
                self.valid.store(true, Ordering::Release);
            }
            Err(_) => {
                *self.auth_header.lock() = None;
                self.valid.store(false, Ordering::Release);
            }
        }
        let waiters: Vec<RefreshCallback> = {
            let mut map = self.refresh.waiters.lock();
            map.drain().flat_map(|(_, cbs)| cbs).collect()
        };
        self.refresh.in_progress.store(false, Ordering::Release);
        for cb in waiters {
            cb(result.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use task_runtime::TaskContext;
    use tokio::sync::Notify;

    struct CountingRefresher {
        calls: AtomicUsize,
        notify: Notify,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl SessionRefresher for CountingRefresher {
        async fn refresh(&self) -> CoreResult<AuthHeader> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.notify.notified().await;
            if self.fail {
                Err(CoreError::auth_failure("refresh rejected"))
            } else {
                Ok(b"fresh-token".to_vec())
            }
        }
    }

    #[tokio::test]
    async fn concurrent_refreshes_coalesce_into_one_outbound_call() {
        let refresher = Arc::new(CountingRefresher {
            calls: AtomicUsize::new(0),
            notify: Notify::new(),
            fail: false,
        });
        let session = Arc::new(Session::new(refresher.clone()));

        let (tx1, rx1) = tokio::sync::oneshot::channel();
        let (tx2, rx2) = tokio::sync::oneshot::channel();
        let (tx3, rx3) = tokio::sync::oneshot::channel();

        let ctx_a = TaskContext::new().id();
        let ctx_b = TaskContext::new().id();
        session.refresh(ctx_a, move |r| {
            let _ = tx1.send(r);
        });
        session.refresh(ctx_b, move |r| {
            let _ = tx2.send(r);
        });
        session.refresh(ctx_b, move |r| {
            let _ = tx3.send(r);
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        refresher.notify.notify_one();

        let r1 = rx1.await.unwrap();
        let r2 = rx2.await.unwrap();
        let r3 = rx3.await.unwrap();
        assert!(r1.is_ok() && r2.is_ok() && r3.is_ok());
        assert!(session.is_valid());
    }

    #[tokio::test]
    async fn failed_refresh_clears_the_header_and_invalidates_the_session() {
        let refresher = Arc::new(CountingRefresher {
            calls: AtomicUsize::new(0),
            notify: Notify::new(),
            fail: true,
        });
        let session = Arc::new(Session::with_header(refresher.clone(), b"stale".to_vec()));
        assert!(session.is_valid());

        let (tx, rx) = tokio::sync::oneshot::channel();
        session.refresh(TaskContext::new().id(), move |r| {
            let _ = tx.send(r);
        });
        refresher.notify.notify_one();
        let result = rx.await.unwrap();
        assert!(result.is_err());
        assert!(!session.is_valid());
        assert!(session.auth_header().is_none());
    }
}
