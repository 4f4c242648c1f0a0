//! Error types shared across the runtime.

use crate::platform::Descriptor;

/// An error code reported by the host platform.
///
/// Host errors are never fatal to the instance: the caller decides whether
/// to retry or abandon the logical operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("host error {} ({code})", errno_name(.code))]
pub struct HostError {
    code: i32,
}

impl HostError {
    pub const INVALID_ARGUMENT: HostError = HostError::new(libc::EINVAL);
    pub const NO_DEVICE: HostError = HostError::new(libc::ENODEV);
    pub const NO_DATA: HostError = HostError::new(libc::ENODATA);
    pub const FAULT: HostError = HostError::new(libc::EFAULT);
    pub const OUT_OF_MEMORY: HostError = HostError::new(libc::ENOMEM);
    pub const TIMED_OUT: HostError = HostError::new(libc::ETIMEDOUT);
    pub const SHUTDOWN: HostError = HostError::new(libc::ESHUTDOWN);
    pub const CANCELED: HostError = HostError::new(libc::ECANCELED);

    pub const fn new(code: i32) -> Self {
        Self { code }
    }

    /// The raw errno value.
    pub fn code(self) -> i32 {
        self.code
    }

    /// Symbolic errno name, `"unknown"` for codes the runtime never sees.
    pub fn name(self) -> &'static str {
        errno_name(&self.code)
    }
}

fn errno_name(code: &i32) -> &'static str {
    match *code {
        libc::EINVAL => "EINVAL",
        libc::ENODEV => "ENODEV",
        libc::ENODATA => "ENODATA",
        libc::EFAULT => "EFAULT",
        libc::ENOMEM => "ENOMEM",
        libc::ETIMEDOUT => "ETIMEDOUT",
        libc::ESHUTDOWN => "ESHUTDOWN",
        libc::ECANCELED => "ECANCELED",
        _ => "unknown",
    }
}

/// Failure to classify or initialize an inbound request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unexpected server request with magic: {0:#x}")]
    UnknownMagic(u32),

    #[error("request payload is {len} bytes, too short to carry a magic number")]
    Truncated { len: usize },

    #[error("frontend rejected the request: {0}")]
    Frontend(String),
}

/// Errors surfaced by runtime operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("stream {0} is closed")]
    StreamClosed(Descriptor),

    #[error("wrote {written} of {expected} bytes to stream {descriptor}")]
    ShortWrite {
        descriptor: Descriptor,
        written: usize,
        expected: usize,
    },

    #[error("there is no incoming stream to take")]
    NoIncomingStream,
}

/// An application-level exception thrown by script code.
///
/// Exceptions travel as data: a fork body returns `Err(Exception)` and the
/// fork registry keeps it for whoever inspects the fork afterwards.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{class}: {message}")]
pub struct Exception {
    pub class: String,
    pub message: String,
}

impl Exception {
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
        }
    }
}

/// Panic payload raised when a runtime invariant is broken.
///
/// The scheduler treats panics inside tasks as faults of that task, except
/// for this payload: a broken invariant means the instance state can no
/// longer be trusted, so it is re-raised instead of being contained.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("runtime invariant violated: {0}")]
pub(crate) struct InvariantViolation(pub(crate) String);

/// Aborts the current instance over a broken invariant.
#[track_caller]
pub(crate) fn invariant_violation(message: impl Into<String>) -> ! {
    let violation = InvariantViolation(message.into());
    tracing::error!("{violation}");
    std::panic::panic_any(violation)
}
