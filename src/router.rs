/*
 * Converts one raw native callback into at most one handler invocation.
 *
 * Each managing object owns three `HandlerTable`s: generic messages keyed by
 * message id, `WM_COMMAND` sub-events keyed by the command id in LOWORD(wparam),
 * and `WM_NOTIFY` sub-events keyed by the (idFrom, code) pair of the `NMHDR`.
 * Registration is only possible until `freeze()`, which happens right before
 * the native handle is created; dispatch therefore never races a mutation.
 *
 * Handler invocation is the boundary where errors must stop: a handler that
 * returns `Err` or panics is reported once through the `FailureSurface` and the
 * event loop is asked to terminate. Nothing unwinds into the native frame.
 */
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::{HandlerFailure, HandlerResult, PlatformError, Result as PlatformResult};
use crate::handler_table::{Handler, HandlerTable};
use crate::types::{EventArgs, NotifyKey, msg};

/// Exit code handed to the event loop after an unrecoverable handler failure.
pub const FAILURE_EXIT_CODE: i32 = -1;

const FAILURE_ALERT_TITLE: &str = "Unhandled error";

/// The single user-visible error channel of the core.
pub trait FailureSurface {
    /// Shows a blocking, last-resort message to the user.
    fn alert(&self, title: &str, text: &str);
    /// Asks the owning thread's event loop to exit with `exit_code`.
    fn quit_loop(&self, exit_code: i32);
}

/// Which table a raw event is looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Generic(u32),
    Command(u16),
    Notification(NotifyKey),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled(isize),
    /// No handler matched; the caller falls back to default native processing.
    NotHandled,
}

impl DispatchOutcome {
    pub fn is_handled(self) -> bool {
        matches!(self, DispatchOutcome::Handled(_))
    }
}

/// Classifies a raw event.
///
/// # Safety
/// For `WM_NOTIFY`, `args.lparam` must be null or point to a live `NMHDR`.
pub unsafe fn classify(args: EventArgs) -> Route {
    match args.msg {
        msg::WM_COMMAND => Route::Command(args.loword_wparam()),
        msg::WM_NOTIFY => match unsafe { args.notify_header() } {
            Some(header) => Route::Notification(header.key()),
            None => {
                log::warn!("WM_NOTIFY received with null NMHDR pointer. Routing as generic.");
                Route::Generic(args.msg)
            }
        },
        other => Route::Generic(other),
    }
}

pub struct EventRouter {
    generic: HandlerTable<u32>,
    command: HandlerTable<u16>,
    notification: HandlerTable<NotifyKey>,
    frozen: bool,
    failure_reported: Cell<bool>,
    surface: Arc<dyn FailureSurface>,
}

impl EventRouter {
    pub fn new(surface: Arc<dyn FailureSurface>) -> Self {
        Self {
            generic: HandlerTable::new(),
            command: HandlerTable::new(),
            notification: HandlerTable::new(),
            frozen: false,
            failure_reported: Cell::new(false),
            surface,
        }
    }

    fn ensure_open(&self, what: impl FnOnce() -> String) -> PlatformResult<()> {
        if self.frozen {
            let what = what();
            log::error!("EventRouter: Registration after freeze rejected: {what}");
            return Err(PlatformError::RegistrationClosed(what));
        }
        Ok(())
    }

    fn ensure_not_reserved(id: u32) -> PlatformResult<()> {
        if id == msg::WM_THREAD_TUNNEL {
            log::error!("EventRouter: Message 0x{id:04X} is reserved for the thread tunnel.");
            return Err(PlatformError::ReservedIdentifier(format!(
                "message 0x{id:04X} carries cross-thread work items"
            )));
        }
        Ok(())
    }

    pub fn register_generic<F>(&mut self, id: u32, handler: F) -> PlatformResult<()>
    where
        F: Fn(EventArgs) -> HandlerResult + 'static,
    {
        self.ensure_open(|| format!("generic handler for message 0x{id:04X}"))?;
        Self::ensure_not_reserved(id)?;
        self.generic.register(id, handler);
        Ok(())
    }

    pub fn register_generic_many<F>(&mut self, ids: &[u32], handler: F) -> PlatformResult<()>
    where
        F: Fn(EventArgs) -> HandlerResult + 'static,
    {
        self.ensure_open(|| format!("generic handler for messages {ids:?}"))?;
        ids.iter().try_for_each(|&id| Self::ensure_not_reserved(id))?;
        self.generic.register_many(ids, handler);
        Ok(())
    }

    pub fn register_command<F>(&mut self, code: u16, handler: F) -> PlatformResult<()>
    where
        F: Fn(EventArgs) -> HandlerResult + 'static,
    {
        self.ensure_open(|| format!("command handler for id {code}"))?;
        self.command.register(code, handler);
        Ok(())
    }

    pub fn register_command_many<F>(&mut self, codes: &[u16], handler: F) -> PlatformResult<()>
    where
        F: Fn(EventArgs) -> HandlerResult + 'static,
    {
        self.ensure_open(|| format!("command handler for ids {codes:?}"))?;
        self.command.register_many(codes, handler);
        Ok(())
    }

    pub fn register_notification<F>(&mut self, key: NotifyKey, handler: F) -> PlatformResult<()>
    where
        F: Fn(EventArgs) -> HandlerResult + 'static,
    {
        self.ensure_open(|| format!("notification handler for {key:?}"))?;
        self.notification.register(key, handler);
        Ok(())
    }

    pub fn register_notification_many<F>(
        &mut self,
        keys: &[NotifyKey],
        handler: F,
    ) -> PlatformResult<()>
    where
        F: Fn(EventArgs) -> HandlerResult + 'static,
    {
        self.ensure_open(|| format!("notification handler for {keys:?}"))?;
        self.notification.register_many(keys, handler);
        Ok(())
    }

    // Bypasses the reserved-id check; used to install the thread tunnel.
    pub(crate) fn generic_table_mut(&mut self) -> &mut HandlerTable<u32> {
        &mut self.generic
    }

    pub fn freeze(&mut self) {
        if !self.frozen {
            log::debug!(
                "EventRouter: Frozen with {} generic, {} command and {} notification entries.",
                self.generic.len(),
                self.command.len(),
                self.notification.len()
            );
        }
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// True once a handler failure has asked the loop to exit with
    /// `FAILURE_EXIT_CODE`. Later quit requests must not replace that code.
    pub fn failure_reported(&self) -> bool {
        self.failure_reported.get()
    }

    /*
     * Command and notification ids get their own tables; when none matches,
     * the generic table is consulted for the raw message id so a collaborator
     * can still observe every WM_COMMAND or WM_NOTIFY.
     */
    fn lookup(&self, route: Route, raw_msg: u32) -> Option<&Handler> {
        match route {
            Route::Generic(id) => self.generic.find(id),
            Route::Command(code) => self
                .command
                .find(code)
                .or_else(|| self.generic.find(raw_msg)),
            Route::Notification(key) => self
                .notification
                .find(key)
                .or_else(|| self.generic.find(raw_msg)),
        }
    }

    /// Routes one native event to its handler.
    ///
    /// # Safety
    /// For `WM_NOTIFY`, `args.lparam` must be null or point to a live `NMHDR`.
    pub unsafe fn dispatch(&self, args: EventArgs) -> DispatchOutcome {
        let route = unsafe { classify(args) };
        let Some(handler) = self.lookup(route, args.msg) else {
            return DispatchOutcome::NotHandled;
        };
        log::trace!("EventRouter: Dispatching {route:?} (msg 0x{:04X}).", args.msg);

        match panic::catch_unwind(AssertUnwindSafe(|| handler(args))) {
            Ok(Ok(result)) => DispatchOutcome::Handled(result),
            Ok(Err(error)) => {
                self.report_failure(route, HandlerFailure::Error(error));
                DispatchOutcome::Handled(0)
            }
            Err(payload) => {
                self.report_failure(route, HandlerFailure::from_panic(payload.as_ref()));
                DispatchOutcome::Handled(0)
            }
        }
    }

    fn report_failure(&self, route: Route, failure: HandlerFailure) {
        log::error!("EventRouter: Handler for {route:?} failed: {failure}");
        self.failure_reported.set(true);
        self.surface.alert(FAILURE_ALERT_TITLE, &failure.to_string());
        self.surface.quit_loop(FAILURE_EXIT_CODE);
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("generic", &self.generic)
            .field("command", &self.command)
            .field("notification", &self.notification)
            .field("frozen", &self.frozen)
            .field("failure_reported", &self.failure_reported.get())
            .finish()
    }
}
