/*
 * `WindowCore` is the managing object behind one native window: it owns the
 * routing tables, the binding to the native handle, and the native host
 * services. Control wrappers and application windows register their handler
 * closures here before the window is created; afterwards the object is
 * driven entirely by native callbacks on the owning thread.
 *
 * The object lives in an `Rc` so the binding can hand out a stable pointer
 * through the native user-data slot.
 */
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::binding::{self, BindState, InstanceBinding};
use crate::error::{HandlerError, HandlerResult, PlatformError, Result as PlatformResult};
use crate::executor::{self, OwnerThreadTunnel};
use crate::host::NativeHost;
use crate::router::{EventRouter, FailureSurface};
use crate::types::{EventArgs, NativeHandle, NotifyKey};

pub struct WindowCore {
    router: RefCell<EventRouter>,
    binding: InstanceBinding,
    host: Arc<dyn NativeHost>,
    quit_on_teardown: Cell<bool>,
}

impl WindowCore {
    pub fn new<H: NativeHost + 'static>(host: Arc<H>) -> Rc<Self> {
        let surface: Arc<dyn FailureSurface> = host.clone();
        let mut router = EventRouter::new(surface);
        executor::install_tunnel(router.generic_table_mut());
        Rc::new(Self {
            router: RefCell::new(router),
            binding: InstanceBinding::new(),
            host,
            quit_on_teardown: Cell::new(false),
        })
    }

    fn with_router_mut(
        &self,
        register: impl FnOnce(&mut EventRouter) -> PlatformResult<()>,
    ) -> PlatformResult<()> {
        let mut router = self.router.try_borrow_mut().map_err(|_| {
            PlatformError::RegistrationClosed("routing tables are in use by dispatch".into())
        })?;
        register(&mut router)
    }

    pub fn register_generic<F>(&self, id: u32, handler: F) -> PlatformResult<()>
    where
        F: Fn(EventArgs) -> HandlerResult + 'static,
    {
        self.with_router_mut(|router| router.register_generic(id, handler))
    }

    pub fn register_generic_many<F>(&self, ids: &[u32], handler: F) -> PlatformResult<()>
    where
        F: Fn(EventArgs) -> HandlerResult + 'static,
    {
        self.with_router_mut(|router| router.register_generic_many(ids, handler))
    }

    pub fn register_command<F>(&self, code: u16, handler: F) -> PlatformResult<()>
    where
        F: Fn(EventArgs) -> HandlerResult + 'static,
    {
        self.with_router_mut(|router| router.register_command(code, handler))
    }

    pub fn register_command_many<F>(&self, codes: &[u16], handler: F) -> PlatformResult<()>
    where
        F: Fn(EventArgs) -> HandlerResult + 'static,
    {
        self.with_router_mut(|router| router.register_command_many(codes, handler))
    }

    pub fn register_notification<F>(&self, key: NotifyKey, handler: F) -> PlatformResult<()>
    where
        F: Fn(EventArgs) -> HandlerResult + 'static,
    {
        self.with_router_mut(|router| router.register_notification(key, handler))
    }

    pub fn register_notification_many<F>(&self, keys: &[NotifyKey], handler: F) -> PlatformResult<()>
    where
        F: Fn(EventArgs) -> HandlerResult + 'static,
    {
        self.with_router_mut(|router| router.register_notification_many(keys, handler))
    }

    pub fn handle(&self) -> Option<NativeHandle> {
        self.binding.handle()
    }

    pub fn binding(&self) -> &InstanceBinding {
        &self.binding
    }

    pub fn is_frozen(&self) -> bool {
        self.router
            .try_borrow()
            .map(|router| router.is_frozen())
            .unwrap_or(true)
    }

    pub fn tunnel(&self) -> PlatformResult<OwnerThreadTunnel> {
        let handle = self.handle().ok_or_else(|| {
            PlatformError::NotBound(format!(
                "no native window to tunnel into (binding is {:?})",
                self.binding.state()
            ))
        })?;
        Ok(OwnerThreadTunnel::new(handle, Arc::clone(&self.host)))
    }

    pub fn run_on_owner_thread<F>(&self, callback: F) -> PlatformResult<()>
    where
        F: FnOnce() -> Result<(), HandlerError> + Send + 'static,
    {
        self.tunnel()?.run_on_owner_thread(callback)
    }

    pub fn run_detached<F>(&self, callback: F) -> PlatformResult<()>
    where
        F: FnOnce() -> Result<(), HandlerError> + Send + 'static,
    {
        self.tunnel()?.run_detached(callback)
    }

    pub(crate) fn freeze(&self) -> PlatformResult<()> {
        self.with_router_mut(|router| {
            router.freeze();
            Ok(())
        })
    }

    pub(crate) fn router(&self) -> &RefCell<EventRouter> {
        &self.router
    }

    pub(crate) fn host(&self) -> &Arc<dyn NativeHost> {
        &self.host
    }

    // Set for the application's main window: its teardown ends the message loop.
    pub(crate) fn set_quit_on_teardown(&self, quit: bool) {
        self.quit_on_teardown.set(quit);
    }

    pub(crate) fn quits_on_teardown(&self) -> bool {
        self.quit_on_teardown.get()
    }
}

impl Drop for WindowCore {
    fn drop(&mut self) {
        binding::release_on_drop(self);
        if self.binding.state() != BindState::Released {
            log::debug!("WindowCore dropped in state {:?}.", self.binding.state());
        }
    }
}

impl fmt::Debug for WindowCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowCore")
            .field("binding", &self.binding.state())
            .field("router", &self.router)
            .finish()
    }
}
