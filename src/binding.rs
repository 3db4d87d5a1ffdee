/*
 * Binds a native window handle to the `WindowCore` that manages it.
 *
 * The binding is established inside the native creation callback
 * (WM_NCCREATE): the creation parameters carry a pointer to the object, the
 * handle is stored on the object, and the object pointer is stored in the
 * handle's user-data slot. Every later callback reads the slot. After
 * WM_NCDESTROY has been routed to the handlers, the slot is cleared and the
 * object moves to `Released`; it is never bound again.
 *
 * Neither side owns the other. The slot holds a plain pointer; the object
 * keeps the slot in sync when it is dropped while still bound. Only this
 * module mutates the binding state.
 */
use std::cell::Cell;
use std::ffi::c_void;
use std::rc::Rc;

use crate::error::{PlatformError, Result as PlatformResult};
use crate::host::NativeHost;
use crate::router::DispatchOutcome;
use crate::types::{EventArgs, NativeHandle, msg};
use crate::window::WindowCore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindState {
    Unbound,
    /// Creation has started; waiting for the native creation callback.
    Creating,
    Bound(NativeHandle),
    /// The native window is gone. Terminal.
    Released,
}

#[derive(Debug)]
pub struct InstanceBinding {
    state: Cell<BindState>,
    // Set while a `CreationGuard` is alive and uncommitted.
    creation_pending: Cell<bool>,
}

impl InstanceBinding {
    pub(crate) fn new() -> Self {
        Self {
            state: Cell::new(BindState::Unbound),
            creation_pending: Cell::new(false),
        }
    }

    pub fn state(&self) -> BindState {
        self.state.get()
    }

    pub fn handle(&self) -> Option<NativeHandle> {
        match self.state.get() {
            BindState::Bound(handle) => Some(handle),
            _ => None,
        }
    }

    fn set(&self, state: BindState) {
        self.state.set(state);
    }
}

/*
 * Guards one creation attempt. The native creation call receives
 * `creation_param()`; on success the caller commits the returned handle.
 * Dropping the guard uncommitted undoes whatever part of the binding the
 * creation callback already established, so a failed creation leaves the
 * object exactly as unbound as before.
 */
pub(crate) struct CreationGuard<'a> {
    core: &'a Rc<WindowCore>,
    committed: bool,
}

impl CreationGuard<'_> {
    pub(crate) fn creation_param(&self) -> *const c_void {
        Rc::as_ptr(self.core).cast()
    }

    pub(crate) fn commit(mut self, handle: NativeHandle) -> PlatformResult<NativeHandle> {
        match self.core.binding().state() {
            BindState::Bound(bound) if bound == handle => {
                self.committed = true;
                self.core.binding().creation_pending.set(false);
                log::debug!("Binding: Creation of {handle:?} committed.");
                Ok(handle)
            }
            other => Err(PlatformError::OperationFailed(format!(
                "native creation returned {handle:?} but the binding is {other:?}"
            ))),
        }
    }
}

impl Drop for CreationGuard<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let binding = self.core.binding();
        binding.creation_pending.set(false);
        if let BindState::Bound(handle) = binding.state() {
            self.core.host().set_user_data(handle, 0);
        }
        log::debug!(
            "Binding: Creation aborted in state {:?}; object reverted to Unbound.",
            binding.state()
        );
        binding.set(BindState::Unbound);
    }
}

/// Starts a creation attempt. Fails before any native resource exists if the
/// object has ever been bound.
pub(crate) fn begin_creation(core: &Rc<WindowCore>) -> PlatformResult<CreationGuard<'_>> {
    let state = core.binding().state();
    if state != BindState::Unbound {
        log::error!("Binding: Refusing to create a second native window for an object in {state:?}.");
        return Err(PlatformError::AlreadyBound(format!(
            "object is in state {state:?}"
        )));
    }
    core.freeze()?;
    core.binding().set(BindState::Creating);
    core.binding().creation_pending.set(true);
    Ok(CreationGuard {
        core,
        committed: false,
    })
}

/*
 * The body of every native window procedure. `creation_param` is the pointer
 * from the creation parameters and is only consulted for WM_NCCREATE.
 *
 * # Safety
 * `creation_param` must be null or come from `CreationGuard::creation_param`
 * of a guard that is still alive. The user-data slot of `handle` must only
 * ever be written by this module. For WM_NOTIFY, `args.lparam` must be null
 * or point to a live NMHDR.
 */
pub(crate) unsafe fn route_native_callback(
    host: &dyn NativeHost,
    handle: NativeHandle,
    args: EventArgs,
    creation_param: *const c_void,
) -> DispatchOutcome {
    let core_ptr = if args.msg == msg::WM_NCCREATE && !creation_param.is_null() {
        let candidate = creation_param.cast::<WindowCore>();
        let binding = unsafe { &*candidate }.binding();
        if binding.state() != BindState::Creating {
            log::error!(
                "Binding: WM_NCCREATE for {handle:?} carries an object in {:?}; not binding.",
                binding.state()
            );
            return DispatchOutcome::NotHandled;
        }
        binding.set(BindState::Bound(handle));
        host.set_user_data(handle, candidate as usize);
        log::debug!("Binding: {handle:?} bound during WM_NCCREATE.");
        candidate
    } else {
        host.user_data(handle) as *const WindowCore
    };

    if core_ptr.is_null() {
        log::trace!(
            "Binding: msg 0x{:04X} for unbound {handle:?}; default processing.",
            args.msg
        );
        return DispatchOutcome::NotHandled;
    }

    // A handler may drop the last outside reference; keep the object alive
    // until this callback returns.
    let core = unsafe {
        Rc::increment_strong_count(core_ptr);
        Rc::from_raw(core_ptr)
    };

    let outcome = match core.router().try_borrow() {
        Ok(router) => unsafe { router.dispatch(args) },
        Err(_) => {
            log::warn!("Binding: Routing tables busy for {handle:?}; default processing.");
            DispatchOutcome::NotHandled
        }
    };

    if args.msg == msg::WM_NCDESTROY {
        host.set_user_data(handle, 0);
        core.binding().set(BindState::Released);
        log::debug!("Binding: {handle:?} released after WM_NCDESTROY.");
        if core.quits_on_teardown() {
            quit_after_teardown(host, &core, handle);
        }
    }
    outcome
}

/*
 * Ends the loop once the main window is gone. A teardown during an aborted
 * creation does not count: the caller may retry. A handler failure already
 * posted `FAILURE_EXIT_CODE`, and the newest quit request wins natively, so
 * the normal exit code must not be posted on top of it.
 */
fn quit_after_teardown(host: &dyn NativeHost, core: &WindowCore, handle: NativeHandle) {
    if core.binding().creation_pending.get() {
        log::debug!("Binding: {handle:?} torn down during creation; loop keeps running.");
        return;
    }
    let failed = core
        .router()
        .try_borrow()
        .map(|router| router.failure_reported())
        .unwrap_or(false);
    if failed {
        log::debug!("Binding: {handle:?} torn down after a handler failure; keeping failure exit code.");
        return;
    }
    host.quit_loop(0);
}

/// Clears a binding left behind by an object dropped before its window.
pub(crate) fn release_on_drop(core: &WindowCore) {
    if let BindState::Bound(handle) = core.binding().state() {
        log::warn!("Binding: Object dropped while bound to {handle:?}; detaching.");
        core.host().set_user_data(handle, 0);
        core.binding().set(BindState::Released);
    }
}
