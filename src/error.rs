/*
 * Error types for the dispatch core. `PlatformError` covers failures raised at
 * a call site (lifecycle misuse, native API failures); `HandlerFailure` covers
 * what a registered handler or a detached worker produced and is only ever
 * reported through the last-resort failure surface, never propagated.
 */
use std::any::Any;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("initialization failed: {0}")]
    InitializationFailed(String),
    #[error("operation failed: {0}")]
    OperationFailed(String),
    #[error("invalid handle: {0}")]
    InvalidHandle(String),
    #[error("handler registration is closed: {0}")]
    RegistrationClosed(String),
    #[error("identifier is reserved: {0}")]
    ReservedIdentifier(String),
    #[error("object is already bound to a native handle: {0}")]
    AlreadyBound(String),
    #[error("object is not bound to a native handle: {0}")]
    NotBound(String),
    #[error("work item was not delivered: {0}")]
    NotDelivered(String),
    #[cfg(target_os = "windows")]
    #[error(transparent)]
    Win32(#[from] windows::core::Error),
}

pub type Result<T> = std::result::Result<T, PlatformError>;

/// Error type a handler closure may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Value returned by every handler: the native result word on success.
pub type HandlerResult = std::result::Result<isize, HandlerError>;

/// Something a handler or worker raised instead of returning normally.
#[derive(Debug, Error)]
pub enum HandlerFailure {
    #[error("{0}")]
    Error(HandlerError),
    #[error("panic: {0}")]
    Panic(String),
}

impl HandlerFailure {
    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        HandlerFailure::Panic(panic_message(payload))
    }
}

// Panic payloads are `&str` or `String` for every `panic!` with a message.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
