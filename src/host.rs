/*
 * The handful of native services the dispatch core relies on. The Win32
 * implementation lives in `window_common`; unit tests substitute an
 * in-process host that simulates the user-data slot and message delivery.
 */
use crate::router::FailureSurface;
use crate::types::{EventArgs, NativeHandle};

pub trait NativeHost: FailureSurface + Send + Sync {
    /// Reads the pointer-sized user-data slot of `handle` (0 when unset).
    fn user_data(&self, handle: NativeHandle) -> usize;

    fn set_user_data(&self, handle: NativeHandle, value: usize);

    /*
     * Delivers `args` to the window procedure of `handle` and waits until it
     * has been processed by the owning thread. Returns the callback's result,
     * or 0 when delivery failed.
     */
    fn send_message(&self, handle: NativeHandle, args: EventArgs) -> isize;
}
