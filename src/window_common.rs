/*
 * Win32 side of the dispatch core: window class registration, native window
 * creation through the binding protocol, the window procedure trampoline
 * shared by every window, and the `NativeHost` implementation backed by the
 * user-data slot, `SendMessageW`, `MessageBoxW` and `PostQuitMessage`.
 *
 * The trampoline itself is stateless. It finds the managing `WindowCore` via
 * `binding::route_native_callback` and falls back to `DefWindowProcW` for
 * anything the routing tables do not handle.
 */
use crate::binding;
use crate::error::{PlatformError, Result as PlatformResult};
use crate::host::NativeHost;
use crate::router::{DispatchOutcome, FailureSurface};
use crate::types::{EventArgs, NativeHandle, WindowConfig};
use crate::window::WindowCore;

use windows::{
    Win32::{
        Foundation::{
            ERROR_CLASS_ALREADY_EXISTS, ERROR_INVALID_WINDOW_HANDLE, GetLastError, HINSTANCE,
            HWND, LPARAM, LRESULT, WPARAM,
        },
        Graphics::Gdi::{COLOR_WINDOW, HBRUSH},
        System::LibraryLoader::GetModuleHandleW,
        UI::WindowsAndMessaging::*,
    },
    core::{HSTRING, PCWSTR},
};

use std::ffi::c_void;
use std::rc::Rc;

static WIN32_HOST: Win32Host = Win32Host;

pub(crate) fn hwnd_from(handle: NativeHandle) -> HWND {
    HWND(handle.raw() as *mut c_void)
}

pub(crate) fn native_handle(hwnd: HWND) -> NativeHandle {
    NativeHandle(hwnd.0 as usize)
}

/// `NativeHost` backed by the Win32 API. Stateless.
#[derive(Debug, Clone, Copy, Default)]
pub struct Win32Host;

impl FailureSurface for Win32Host {
    fn alert(&self, title: &str, text: &str) {
        unsafe {
            let _ = MessageBoxW(
                None,
                &HSTRING::from(text),
                &HSTRING::from(title),
                MB_OK | MB_ICONERROR,
            );
        }
    }

    fn quit_loop(&self, exit_code: i32) {
        log::debug!("Win32Host: Posting WM_QUIT with exit code {exit_code}.");
        unsafe { PostQuitMessage(exit_code) };
    }
}

impl NativeHost for Win32Host {
    fn user_data(&self, handle: NativeHandle) -> usize {
        unsafe { GetWindowLongPtrW(hwnd_from(handle), GWLP_USERDATA) as usize }
    }

    fn set_user_data(&self, handle: NativeHandle, value: usize) {
        unsafe { SetWindowLongPtrW(hwnd_from(handle), GWLP_USERDATA, value as isize) };
    }

    fn send_message(&self, handle: NativeHandle, args: EventArgs) -> isize {
        unsafe {
            SendMessageW(
                hwnd_from(handle),
                args.msg,
                Some(WPARAM(args.wparam)),
                Some(LPARAM(args.lparam)),
            )
            .0
        }
    }
}

pub(crate) fn module_instance() -> PlatformResult<HINSTANCE> {
    let module = unsafe { GetModuleHandleW(PCWSTR::null())? };
    Ok(HINSTANCE(module.0))
}

/*
 * Registers `class_name` with `facade_wnd_proc_router` as its window
 * procedure. Registering an already known class is not an error.
 */
pub(crate) fn register_window_class(class_name: &str, h_instance: HINSTANCE) -> PlatformResult<()> {
    let class_name_hstring = HSTRING::from(class_name);
    let class_name_pcwstr = PCWSTR(class_name_hstring.as_ptr());

    unsafe {
        let mut wc_test = WNDCLASSEXW::default();
        if GetClassInfoExW(Some(h_instance), class_name_pcwstr, &mut wc_test).is_ok() {
            log::debug!("Platform: Window class '{class_name}' already registered.");
            return Ok(());
        }

        let wc = WNDCLASSEXW {
            cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
            style: CS_HREDRAW | CS_VREDRAW | CS_DBLCLKS,
            lpfnWndProc: Some(facade_wnd_proc_router),
            cbClsExtra: 0,
            cbWndExtra: 0,
            hInstance: h_instance,
            hIcon: LoadIconW(None, IDI_APPLICATION)?,
            hCursor: LoadCursorW(None, IDC_ARROW)?,
            hbrBackground: HBRUSH((COLOR_WINDOW.0 + 1) as *mut c_void),
            lpszMenuName: PCWSTR::null(),
            lpszClassName: class_name_pcwstr,
            hIconSm: LoadIconW(None, IDI_APPLICATION)?,
        };

        if RegisterClassExW(&wc) == 0 {
            let error = GetLastError();
            if error == ERROR_CLASS_ALREADY_EXISTS {
                return Ok(());
            }
            log::error!("Platform: RegisterClassExW failed: {error:?}");
            Err(PlatformError::InitializationFailed(format!(
                "RegisterClassExW for '{class_name}' failed: {error:?}"
            )))
        } else {
            log::debug!("Platform: Window class '{class_name}' registered successfully.");
            Ok(())
        }
    }
}

/*
 * Creates the native window managed by `core`. Registration on `core` closes
 * here. The object pointer travels in `lpCreateParams` and is bound during
 * WM_NCCREATE; if `CreateWindowExW` fails the object is left unbound.
 */
pub fn create_native_window(
    core: &Rc<WindowCore>,
    config: &WindowConfig,
    parent: Option<NativeHandle>,
) -> PlatformResult<NativeHandle> {
    let guard = binding::begin_creation(core)?;
    let h_instance = module_instance()?;
    register_window_class(&config.class_name, h_instance)?;

    let hwnd = unsafe {
        CreateWindowExW(
            WINDOW_EX_STYLE(config.ex_style),
            &HSTRING::from(config.class_name.as_str()),
            &HSTRING::from(config.title.as_str()),
            WINDOW_STYLE(config.style),
            CW_USEDEFAULT,
            CW_USEDEFAULT,
            config.width,
            config.height,
            parent.map(hwnd_from),
            None,
            Some(h_instance),
            Some(guard.creation_param()),
        )?
    };
    log::debug!(
        "Platform: Native window {hwnd:?} created for class '{}'.",
        config.class_name
    );
    let handle = native_handle(hwnd);
    guard.commit(handle).inspect_err(|error| {
        // The window exists but is not ours, e.g. the class name belongs to a
        // class with a different window procedure. Do not leave it behind.
        log::error!("Platform: Destroying unbound window {hwnd:?}: {error}");
        if let Err(destroy_error) = destroy_native_window(handle) {
            log::error!("Platform: Cleanup of {hwnd:?} failed: {destroy_error}");
        }
    })
}

/*
 * Window procedure shared by every class registered here. WM_NCCREATE always
 * gets default processing too, so handlers can observe it but not veto the
 * creation.
 */
unsafe extern "system" fn facade_wnd_proc_router(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    let creation_param = if msg == WM_NCCREATE {
        let create_struct = unsafe { &*(lparam.0 as *const CREATESTRUCTW) };
        create_struct.lpCreateParams as *const c_void
    } else {
        std::ptr::null()
    };

    let args = EventArgs::new(msg, wparam.0, lparam.0);
    let outcome = unsafe {
        binding::route_native_callback(&WIN32_HOST, native_handle(hwnd), args, creation_param)
    };

    match outcome {
        DispatchOutcome::Handled(result) if msg != WM_NCCREATE => LRESULT(result),
        _ => unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) },
    }
}

pub fn show_window(handle: NativeHandle, show: bool) -> PlatformResult<()> {
    let hwnd = hwnd_from(handle);
    if hwnd.is_invalid() {
        return Err(PlatformError::InvalidHandle(
            "HWND is invalid in show_window".into(),
        ));
    }
    log::debug!("Setting visibility for {hwnd:?} to {show}");
    let cmd = if show { SW_SHOW } else { SW_HIDE };
    unsafe { _ = ShowWindow(hwnd, cmd) };
    Ok(())
}

pub fn set_window_title(handle: NativeHandle, title: &str) -> PlatformResult<()> {
    let hwnd = hwnd_from(handle);
    if hwnd.is_invalid() {
        return Err(PlatformError::InvalidHandle(
            "HWND is invalid in set_window_title".into(),
        ));
    }
    unsafe { SetWindowTextW(hwnd, &HSTRING::from(title))? };
    Ok(())
}

/*
 * Destroys the native window. WM_DESTROY and WM_NCDESTROY are routed
 * synchronously before this returns, so the binding is released by then.
 * An already destroyed handle is only logged.
 */
pub fn destroy_native_window(handle: NativeHandle) -> PlatformResult<()> {
    let hwnd = hwnd_from(handle);
    log::debug!("Calling DestroyWindow for HWND {hwnd:?}");
    unsafe {
        if DestroyWindow(hwnd).is_err() {
            let last_error = GetLastError();
            if last_error != ERROR_INVALID_WINDOW_HANDLE {
                log::error!("DestroyWindow for HWND {hwnd:?} failed: {last_error:?}");
                return Err(PlatformError::OperationFailed(format!(
                    "DestroyWindow failed: {last_error:?}"
                )));
            }
            log::debug!("DestroyWindow for HWND {hwnd:?} reported invalid handle (already destroyed?).");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::BindState;
    use std::cell::Cell;
    use std::sync::Arc;

    const WM_APP_TEST_PING: u32 = WM_APP + 0x10;

    fn hidden_config() -> WindowConfig {
        WindowConfig {
            class_name: "LambdaWin_TestClass".to_string(),
            title: "test".to_string(),
            style: WS_OVERLAPPED.0,
            ..WindowConfig::default()
        }
    }

    #[test]
    fn handle_conversion_roundtrips() {
        let hwnd = HWND(0x1234 as *mut c_void);
        assert_eq!(hwnd_from(native_handle(hwnd)), hwnd);
    }

    #[test]
    fn native_window_routes_messages_and_releases_binding() {
        // Arrange
        let core = WindowCore::new(Arc::new(Win32Host));
        let pings = Rc::new(Cell::new(0));
        let counter = Rc::clone(&pings);
        core.register_generic(WM_APP_TEST_PING, move |args| {
            counter.set(counter.get() + 1);
            Ok(args.wparam as isize * 2)
        })
        .unwrap();

        // Act
        let handle = create_native_window(&core, &hidden_config(), None).unwrap();
        let result = Win32Host.send_message(handle, EventArgs::new(WM_APP_TEST_PING, 21, 0));
        destroy_native_window(handle).unwrap();

        // Assert
        assert_eq!(result, 42);
        assert_eq!(pings.get(), 1);
        assert_eq!(core.binding().state(), BindState::Released);
        assert!(matches!(
            create_native_window(&core, &hidden_config(), None),
            Err(PlatformError::AlreadyBound(_))
        ));
    }

    #[test]
    fn window_title_can_be_changed() {
        let core = WindowCore::new(Arc::new(Win32Host));
        let handle = create_native_window(&core, &hidden_config(), None).unwrap();

        set_window_title(handle, "renamed").unwrap();

        let mut buffer = [0u16; 32];
        let len = unsafe { GetWindowTextW(hwnd_from(handle), &mut buffer) } as usize;
        assert_eq!(String::from_utf16_lossy(&buffer[..len]), "renamed");
        destroy_native_window(handle).unwrap();
        assert!(matches!(
            set_window_title(NativeHandle::NULL, "x"),
            Err(PlatformError::InvalidHandle(_))
        ));
    }

    unsafe extern "system" fn foreign_wnd_proc(
        hwnd: HWND,
        msg: u32,
        wparam: WPARAM,
        lparam: LPARAM,
    ) -> LRESULT {
        unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) }
    }

    #[test]
    fn window_of_a_foreign_class_is_destroyed_when_binding_fails() {
        let h_instance = module_instance().unwrap();
        let class_name = HSTRING::from("LambdaWin_ForeignClass");
        let wc = WNDCLASSEXW {
            cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
            lpfnWndProc: Some(foreign_wnd_proc),
            hInstance: h_instance,
            lpszClassName: PCWSTR(class_name.as_ptr()),
            ..Default::default()
        };
        unsafe { RegisterClassExW(&wc) };
        let config = WindowConfig {
            class_name: "LambdaWin_ForeignClass".to_string(),
            ..hidden_config()
        };
        let core = WindowCore::new(Arc::new(Win32Host));

        let result = create_native_window(&core, &config, None);

        assert!(matches!(result, Err(PlatformError::OperationFailed(_))));
        assert_eq!(core.binding().state(), BindState::Unbound);
        let leftover = unsafe {
            FindWindowExW(None, None, &class_name, PCWSTR::null()).unwrap_or_default()
        };
        assert!(leftover.is_invalid());
    }

    #[test]
    fn tunnel_from_owner_thread_runs_inline() {
        let core = WindowCore::new(Arc::new(Win32Host));
        let handle = create_native_window(&core, &hidden_config(), None).unwrap();
        let (tx, rx) = std::sync::mpsc::channel();

        core.run_on_owner_thread(move || {
            tx.send(std::thread::current().id())?;
            Ok(())
        })
        .unwrap();

        assert_eq!(rx.try_recv().unwrap(), std::thread::current().id());
        destroy_native_window(handle).unwrap();
    }
}
