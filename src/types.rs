/*
 * Platform-agnostic value types shared by the dispatch core: the raw event
 * triple handed to handlers, the identifiers the routing tables are keyed by,
 * the opaque native handle, and the window configuration.
 *
 * These types compile on every platform so routing and binding logic can be
 * unit tested without a live windowing system.
 */
use std::ffi::c_void;

/// Native message identifiers the core interprets. Values match the Win32 headers.
pub mod msg {
    pub const WM_CREATE: u32 = 0x0001;
    pub const WM_DESTROY: u32 = 0x0002;
    pub const WM_CLOSE: u32 = 0x0010;
    pub const WM_NOTIFY: u32 = 0x004E;
    pub const WM_NCCREATE: u32 = 0x0081;
    pub const WM_NCDESTROY: u32 = 0x0082;
    pub const WM_COMMAND: u32 = 0x0111;
    pub const WM_APP: u32 = 0x8000;

    /// Carries cross-thread work items onto the owning thread.
    pub const WM_THREAD_TUNNEL: u32 = WM_APP + 0x3FFF;
}

/// Opaque identifier issued by the windowing system for a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NativeHandle(pub usize);

impl NativeHandle {
    pub const NULL: NativeHandle = NativeHandle(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn raw(self) -> usize {
        self.0
    }
}

/// The raw event as delivered by the native callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventArgs {
    pub msg: u32,
    pub wparam: usize,
    pub lparam: isize,
}

impl EventArgs {
    pub fn new(msg: u32, wparam: usize, lparam: isize) -> Self {
        Self {
            msg,
            wparam,
            lparam,
        }
    }

    #[inline]
    pub fn loword_wparam(&self) -> u16 {
        (self.wparam & 0xFFFF) as u16
    }

    #[inline]
    pub fn hiword_wparam(&self) -> u16 {
        ((self.wparam >> 16) & 0xFFFF) as u16
    }

    #[inline]
    pub fn loword_lparam(&self) -> u16 {
        (self.lparam & 0xFFFF) as u16
    }

    #[inline]
    pub fn hiword_lparam(&self) -> u16 {
        ((self.lparam >> 16) & 0xFFFF) as u16
    }

    /// Reads the notification header a `WM_NOTIFY` carries in `lparam`.
    ///
    /// # Safety
    /// `lparam` must be null or point to a live `NotifyHeader` for the
    /// returned lifetime.
    pub unsafe fn notify_header(&self) -> Option<&NotifyHeader> {
        unsafe { (self.lparam as *const NotifyHeader).as_ref() }
    }
}

/// Layout-compatible with Win32 `NMHDR`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NotifyHeader {
    pub hwnd_from: *mut c_void,
    pub id_from: usize,
    pub code: u32,
}

impl NotifyHeader {
    pub fn key(&self) -> NotifyKey {
        NotifyKey::new(self.id_from, self.code)
    }
}

/// Compound key of a notification: the sending control's id plus the sub-code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NotifyKey {
    pub id_from: usize,
    pub code: u32,
}

impl NotifyKey {
    pub fn new(id_from: usize, code: u32) -> Self {
        Self { id_from, code }
    }
}

/*
 * Describes a top-level window to be created. Style bits are the raw Win32
 * `WINDOW_STYLE`/`WINDOW_EX_STYLE` values so this type stays portable.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowConfig {
    pub class_name: String,
    pub title: String,
    pub width: i32,
    pub height: i32,
    pub style: u32,
    pub ex_style: u32,
}

// WS_OVERLAPPEDWINDOW | WS_CLIPCHILDREN
const DEFAULT_WINDOW_STYLE: u32 = 0x00CF_0000 | 0x0200_0000;

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            class_name: "LambdaWin_WindowClass".to_string(),
            title: String::new(),
            width: 640,
            height: 480,
            style: DEFAULT_WINDOW_STYLE,
            ex_style: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_helpers_split_machine_words() {
        let args = EventArgs::new(msg::WM_COMMAND, 0x0003_002A, 0x0140_00F0);
        assert_eq!(args.loword_wparam(), 42);
        assert_eq!(args.hiword_wparam(), 3);
        assert_eq!(args.loword_lparam(), 0xF0);
        assert_eq!(args.hiword_lparam(), 0x140);
    }

    #[test]
    fn notify_header_reads_key_from_lparam() {
        let header = NotifyHeader {
            hwnd_from: std::ptr::null_mut(),
            id_from: 12,
            code: 0xFFFF_FFFE,
        };
        let args = EventArgs::new(msg::WM_NOTIFY, 12, &header as *const _ as isize);
        let read = unsafe { args.notify_header() }.expect("header should be present");
        assert_eq!(read.key(), NotifyKey::new(12, 0xFFFF_FFFE));

        let null_args = EventArgs::new(msg::WM_NOTIFY, 0, 0);
        assert!(unsafe { null_args.notify_header() }.is_none());
    }

    #[test]
    fn native_handle_null_check() {
        assert!(NativeHandle::NULL.is_null());
        assert!(!NativeHandle(0x10).is_null());
        assert_eq!(NativeHandle(0x10).raw(), 0x10);
    }

    #[cfg(target_os = "windows")]
    #[test]
    fn message_constants_match_win32_headers() {
        use windows::Win32::UI::Controls::NMHDR;
        use windows::Win32::UI::WindowsAndMessaging as wm;

        assert_eq!(msg::WM_CREATE, wm::WM_CREATE);
        assert_eq!(msg::WM_DESTROY, wm::WM_DESTROY);
        assert_eq!(msg::WM_CLOSE, wm::WM_CLOSE);
        assert_eq!(msg::WM_NOTIFY, wm::WM_NOTIFY);
        assert_eq!(msg::WM_NCCREATE, wm::WM_NCCREATE);
        assert_eq!(msg::WM_NCDESTROY, wm::WM_NCDESTROY);
        assert_eq!(msg::WM_COMMAND, wm::WM_COMMAND);
        assert_eq!(msg::WM_APP, wm::WM_APP);
        assert_eq!(
            std::mem::size_of::<NotifyHeader>(),
            std::mem::size_of::<NMHDR>()
        );
        assert_eq!(
            DEFAULT_WINDOW_STYLE,
            (wm::WS_OVERLAPPEDWINDOW | wm::WS_CLIPCHILDREN).0
        );
    }
}
