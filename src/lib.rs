/*
 * Public entry point of the lambdawin crate: closure-based scaffolding for
 * native windows. Client code registers handler closures on a `WindowCore`,
 * the core binds the object to its native handle for the handle's lifetime,
 * routes every native callback to the right handler, and offers a tunnel for
 * running work on the thread that owns the window.
 *
 * The dispatch core (handler tables, routing, binding, tunnel) is portable
 * so its logic compiles and is tested on every platform. The Win32 host, the
 * window procedure trampoline and the message loop are Windows-only.
 */
#[cfg(target_os = "windows")]
pub mod app;
pub mod binding;
pub mod error;
pub mod executor;
pub mod handler_table;
pub mod host;
pub mod router;
#[cfg(test)]
pub(crate) mod test_host;
pub mod types;
pub mod window;
#[cfg(target_os = "windows")]
pub mod window_common;

#[cfg(target_os = "windows")]
pub use app::{MainWindow, run_message_loop};
pub use binding::{BindState, InstanceBinding};
pub use error::{HandlerError, HandlerFailure, HandlerResult, PlatformError, Result as PlatformResult};
pub use executor::OwnerThreadTunnel;
pub use handler_table::HandlerTable;
pub use host::NativeHost;
pub use router::{DispatchOutcome, EventRouter, FailureSurface, Route};
pub use types::{EventArgs, NativeHandle, NotifyHeader, NotifyKey, WindowConfig, msg};
pub use window::WindowCore;
#[cfg(target_os = "windows")]
pub use window_common::Win32Host;
