/*
 * In-process stand-in for the native windowing system, used by unit tests on
 * every platform. It simulates the per-handle user-data slot, the creation
 * and teardown callback sequences, and synchronous cross-thread delivery: a
 * send from a foreign thread is queued and blocks until the owning thread
 * pumps it, while a send from the owning thread is routed immediately.
 */
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

use crate::binding::{self, route_native_callback};
use crate::error::{PlatformError, Result as PlatformResult};
use crate::host::NativeHost;
use crate::router::{DispatchOutcome, FailureSurface};
use crate::types::{EventArgs, NativeHandle, msg};
use crate::window::WindowCore;

struct PendingSend {
    handle: NativeHandle,
    args: EventArgs,
    reply: Sender<isize>,
}

pub(crate) struct FakeHost {
    owner: ThreadId,
    slots: Mutex<HashMap<NativeHandle, usize>>,
    next_handle: AtomicUsize,
    created: AtomicUsize,
    fail_next_creation: AtomicBool,
    tunnel_messages: AtomicUsize,
    alerts: Mutex<Vec<String>>,
    exit_codes: Mutex<Vec<i32>>,
    queue_tx: Mutex<Sender<PendingSend>>,
    queue_rx: Mutex<Receiver<PendingSend>>,
}

impl FakeHost {
    pub(crate) fn new() -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::channel();
        Arc::new(Self {
            owner: thread::current().id(),
            slots: Mutex::new(HashMap::new()),
            next_handle: AtomicUsize::new(0x1000),
            created: AtomicUsize::new(0),
            fail_next_creation: AtomicBool::new(false),
            tunnel_messages: AtomicUsize::new(0),
            alerts: Mutex::new(Vec::new()),
            exit_codes: Mutex::new(Vec::new()),
            queue_tx: Mutex::new(queue_tx),
            queue_rx: Mutex::new(queue_rx),
        })
    }

    /// Mirrors `CreateWindowExW`: WM_NCCREATE, then WM_CREATE.
    pub(crate) fn create_window(&self, core: &Rc<WindowCore>) -> PlatformResult<NativeHandle> {
        let guard = binding::begin_creation(core)?;
        let handle = NativeHandle(self.next_handle.fetch_add(0x10, Ordering::Relaxed));
        self.created.fetch_add(1, Ordering::Relaxed);

        unsafe {
            route_native_callback(
                self,
                handle,
                EventArgs::new(msg::WM_NCCREATE, 0, 0),
                guard.creation_param(),
            );
        }
        if self.fail_next_creation.swap(false, Ordering::Relaxed) {
            // The system tears a half-created window down with WM_NCDESTROY.
            self.deliver(handle, EventArgs::new(msg::WM_NCDESTROY, 0, 0));
            return Err(PlatformError::OperationFailed(
                "simulated creation failure".into(),
            ));
        }
        self.deliver(handle, EventArgs::new(msg::WM_CREATE, 0, 0));
        guard.commit(handle)
    }

    /// Mirrors `DestroyWindow`: WM_DESTROY, then WM_NCDESTROY.
    pub(crate) fn destroy_window(&self, handle: NativeHandle) {
        self.deliver(handle, EventArgs::new(msg::WM_DESTROY, 0, 0));
        self.deliver(handle, EventArgs::new(msg::WM_NCDESTROY, 0, 0));
    }

    /// Routes one callback on the calling thread, like a window procedure.
    pub(crate) fn deliver(&self, handle: NativeHandle, args: EventArgs) -> DispatchOutcome {
        if args.msg == msg::WM_THREAD_TUNNEL {
            self.tunnel_messages.fetch_add(1, Ordering::Relaxed);
        }
        unsafe { route_native_callback(self, handle, args, std::ptr::null()) }
    }

    /// Processes one queued cross-thread send, waiting up to `timeout`.
    pub(crate) fn pump_one(&self, timeout: Duration) -> bool {
        assert_eq!(thread::current().id(), self.owner, "pump from owner thread only");
        let pending = self.queue_rx.lock().unwrap().recv_timeout(timeout);
        match pending {
            Ok(pending) => {
                let result = match self.deliver(pending.handle, pending.args) {
                    DispatchOutcome::Handled(result) => result,
                    DispatchOutcome::NotHandled => 0,
                };
                let _ = pending.reply.send(result);
                true
            }
            Err(_) => false,
        }
    }

    pub(crate) fn fail_next_creation(&self) {
        self.fail_next_creation.store(true, Ordering::Relaxed);
    }

    pub(crate) fn created_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    pub(crate) fn tunnel_messages(&self) -> usize {
        self.tunnel_messages.load(Ordering::Relaxed)
    }

    pub(crate) fn alerts(&self) -> Vec<String> {
        self.alerts.lock().unwrap().clone()
    }

    pub(crate) fn exit_codes(&self) -> Vec<i32> {
        self.exit_codes.lock().unwrap().clone()
    }
}

impl FailureSurface for FakeHost {
    fn alert(&self, _title: &str, text: &str) {
        self.alerts.lock().unwrap().push(text.to_string());
    }

    fn quit_loop(&self, exit_code: i32) {
        self.exit_codes.lock().unwrap().push(exit_code);
    }
}

impl NativeHost for FakeHost {
    fn user_data(&self, handle: NativeHandle) -> usize {
        self.slots.lock().unwrap().get(&handle).copied().unwrap_or(0)
    }

    fn set_user_data(&self, handle: NativeHandle, value: usize) {
        self.slots.lock().unwrap().insert(handle, value);
    }

    fn send_message(&self, handle: NativeHandle, args: EventArgs) -> isize {
        if thread::current().id() == self.owner {
            return match self.deliver(handle, args) {
                DispatchOutcome::Handled(result) => result,
                DispatchOutcome::NotHandled => 0,
            };
        }
        let (reply, reply_rx) = mpsc::channel();
        let queued = self.queue_tx.lock().unwrap().send(PendingSend {
            handle,
            args,
            reply,
        });
        if queued.is_err() {
            return 0;
        }
        reply_rx.recv().unwrap_or(0)
    }
}
