/*
 * Application entry point on Windows: a main window whose teardown ends the
 * message loop, and the blocking loop itself. All dispatch for windows
 * created on this thread happens inside `run_message_loop`.
 */
use crate::error::{PlatformError, Result as PlatformResult};
use crate::types::WindowConfig;
use crate::window::WindowCore;
use crate::window_common::{self, Win32Host};

use std::rc::Rc;
use std::sync::Arc;

use windows::Win32::{
    Foundation::GetLastError,
    UI::WindowsAndMessaging::{DispatchMessageW, GetMessageW, MSG, TranslateMessage},
};

/*
 * The application's top-level window. Register handlers on `core()` before
 * calling `run`; once the native window is destroyed, WM_QUIT is posted and
 * `run` returns the exit code.
 */
#[derive(Debug)]
pub struct MainWindow {
    core: Rc<WindowCore>,
    config: WindowConfig,
}

impl MainWindow {
    pub fn new(config: WindowConfig) -> Self {
        let core = WindowCore::new(Arc::new(Win32Host));
        core.set_quit_on_teardown(true);
        Self { core, config }
    }

    pub fn core(&self) -> &Rc<WindowCore> {
        &self.core
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    /// Creates and shows the window, then runs the message loop to completion.
    pub fn run(&self) -> PlatformResult<i32> {
        let handle = window_common::create_native_window(&self.core, &self.config, None)?;
        window_common::show_window(handle, true)?;
        log::debug!("MainWindow: {handle:?} shown, entering message loop.");
        run_message_loop()
    }
}

/*
 * Pumps messages until WM_QUIT and returns its exit code. A handler failure
 * reported by the router posts WM_QUIT with a failure code, which ends up
 * here.
 */
pub fn run_message_loop() -> PlatformResult<i32> {
    let mut msg = MSG::default();
    loop {
        let result = unsafe { GetMessageW(&mut msg, None, 0, 0) };
        if result.0 > 0 {
            unsafe {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        } else if result.0 == 0 {
            let exit_code = msg.wParam.0 as i32;
            log::debug!("Platform: GetMessageW returned 0 (WM_QUIT), exit code {exit_code}.");
            return Ok(exit_code);
        } else {
            let last_error = unsafe { GetLastError() };
            log::error!("Platform: GetMessageW failed with return -1. LastError: {last_error:?}");
            return Err(PlatformError::OperationFailed(format!(
                "GetMessageW failed: {last_error:?}"
            )));
        }
    }
}
