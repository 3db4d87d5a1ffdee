/*
 * Cross-thread execution tunnel.
 *
 * Native windows may only be touched from the thread that created them. Work
 * that must run there is boxed into a `WorkItem`, its ownership is handed to
 * the native messaging mechanism as the `lparam` of the reserved
 * `WM_THREAD_TUNNEL` message, and the tunnel handler installed in every
 * `WindowCore` reclaims and runs it on the owning thread.
 *
 * Delivery is synchronous (`NativeHost::send_message`). If the message was
 * not consumed, e.g. because the window is already gone, the sender still
 * owns the item and frees it; each item is released exactly once.
 */
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};

use crate::error::{HandlerError, HandlerFailure, HandlerResult, PlatformError, Result as PlatformResult};
use crate::handler_table::HandlerTable;
use crate::host::NativeHost;
use crate::types::{EventArgs, NativeHandle, msg};

// Marks a tunnel message as produced by `OwnerThreadTunnel`.
const TUNNEL_COOKIE: usize = 0x4C57_5455;

const DETACHED_THREAD_NAME: &str = "lambdawin-detached";

type Callback = Box<dyn FnOnce() -> Result<(), HandlerError> + Send>;

struct WorkItem {
    callback: Callback,
    captured: Option<HandlerFailure>,
    origin: ThreadId,
    consumed: Arc<AtomicBool>,
}

impl WorkItem {
    fn new(callback: Callback, captured: Option<HandlerFailure>) -> Self {
        Self {
            callback,
            captured,
            origin: thread::current().id(),
            consumed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn into_raw(self) -> isize {
        Box::into_raw(Box::new(self)) as isize
    }

    /// # Safety
    /// `raw` must come from `into_raw` and must not have been reclaimed yet.
    unsafe fn reclaim(raw: isize) -> Box<Self> {
        unsafe { Box::from_raw(raw as *mut WorkItem) }
    }

    fn execute(self) -> HandlerResult {
        log::trace!("Executor: Running work item submitted from {:?}.", self.origin);
        if let Some(failure) = self.captured {
            return Err(Box::new(DetachedFailure(failure)));
        }
        (self.callback)()?;
        Ok(0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("detached thread failed: {0}")]
struct DetachedFailure(HandlerFailure);

/*
 * Installs the tunnel handler. Called on a fresh router, before any freeze,
 * through the table directly since clients may not register this message.
 */
pub(crate) fn install_tunnel(generic: &mut HandlerTable<u32>) {
    generic.register(msg::WM_THREAD_TUNNEL, |args: EventArgs| {
        if args.wparam != TUNNEL_COOKIE || args.lparam == 0 {
            log::warn!(
                "Executor: Ignoring WM_THREAD_TUNNEL without a work item (wparam 0x{:X}).",
                args.wparam
            );
            return Ok(0);
        }
        let item = unsafe { WorkItem::reclaim(args.lparam) };
        item.consumed.store(true, Ordering::Release);
        item.execute()
    });
}

/// A `Send` handle for running code on the thread that owns a window.
#[derive(Clone)]
pub struct OwnerThreadTunnel {
    handle: NativeHandle,
    host: Arc<dyn NativeHost>,
}

impl OwnerThreadTunnel {
    pub(crate) fn new(handle: NativeHandle, host: Arc<dyn NativeHost>) -> Self {
        Self { handle, host }
    }

    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    /*
     * Runs `callback` on the owning thread and returns once it has run. From
     * the owning thread itself the callback runs immediately, nested in the
     * current dispatch. An error or panic in `callback` is reported through
     * the window's failure surface like any handler failure.
     */
    pub fn run_on_owner_thread<F>(&self, callback: F) -> PlatformResult<()>
    where
        F: FnOnce() -> Result<(), HandlerError> + Send + 'static,
    {
        self.deliver(WorkItem::new(Box::new(callback), None))
    }

    /*
     * Runs `callback` on a new, detached thread. A failure is captured and
     * delivered to the owning thread, where it is reported instead of tearing
     * down the worker.
     */
    pub fn run_detached<F>(&self, callback: F) -> PlatformResult<()>
    where
        F: FnOnce() -> Result<(), HandlerError> + Send + 'static,
    {
        let tunnel = self.clone();
        thread::Builder::new()
            .name(DETACHED_THREAD_NAME.to_string())
            .spawn(move || {
                let failure = match panic::catch_unwind(AssertUnwindSafe(callback)) {
                    Ok(Ok(())) => return,
                    Ok(Err(error)) => HandlerFailure::Error(error),
                    Err(payload) => HandlerFailure::from_panic(payload.as_ref()),
                };
                log::warn!("Executor: Detached thread failed, forwarding to owner: {failure}");
                let item = WorkItem::new(Box::new(|| Ok(())), Some(failure));
                if let Err(e) = tunnel.deliver(item) {
                    log::error!("Executor: Could not report detached failure: {e}");
                }
            })
            .map_err(|e| {
                PlatformError::OperationFailed(format!("failed to spawn detached thread: {e}"))
            })?;
        Ok(())
    }

    fn deliver(&self, item: WorkItem) -> PlatformResult<()> {
        let consumed = Arc::clone(&item.consumed);
        let raw = item.into_raw();
        self.host.send_message(
            self.handle,
            EventArgs::new(msg::WM_THREAD_TUNNEL, TUNNEL_COOKIE, raw),
        );
        if consumed.load(Ordering::Acquire) {
            return Ok(());
        }
        // Never reached the tunnel handler, so ownership is still ours.
        drop(unsafe { WorkItem::reclaim(raw) });
        log::error!("Executor: Work item for {:?} was not consumed.", self.handle);
        Err(PlatformError::NotDelivered(format!(
            "window {:?} did not accept the work item",
            self.handle
        )))
    }
}

impl fmt::Debug for OwnerThreadTunnel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerThreadTunnel")
            .field("handle", &self.handle)
            .finish()
    }
}
