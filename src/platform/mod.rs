//! Host platform ABI.
//!
//! The runtime runs inside an image hosted by an external platform. The
//! platform exposes a narrow, non-blocking surface:
//! - opening streams to components, TCP and UDP peers,
//! - reading and writing descriptors,
//! - creating timers and reading the current instant,
//! - handing out one pending update at a time,
//! - asking the image to yield.
//!
//! Every call returns immediately. The runtime never blocks on the host.

mod memory;

pub use memory::InMemoryPlatform;

use crate::error::HostError;

use std::fmt;
use std::num::NonZeroU64;
use std::time::Duration;

/// An opaque host-issued handle identifying a stream, timer or connection.
///
/// The host reserves `0` as the invalid descriptor, so a `Descriptor` is
/// always a valid value and absence is spelled `Option<Descriptor>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Descriptor(NonZeroU64);

impl Descriptor {
    /// Wraps a raw descriptor, returning `None` for the invalid descriptor.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Returns the raw descriptor value as seen by the host.
    pub fn raw(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A point on the host's monotonic clock, in nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimePoint(pub u64);

impl TimePoint {
    pub fn as_nanos(self) -> u64 {
        self.0
    }

    /// Returns the instant `duration` after `self`, saturating on overflow.
    pub fn after(self, duration: Duration) -> Self {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(nanos))
    }

    /// Returns the time elapsed from `earlier` to `self`, or zero.
    pub fn since(self, earlier: TimePoint) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

/// Kind of outbound stream the host can open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Component,
    Tcp,
    Udp,
}

/// Readiness of one direction of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoStatus {
    /// Data can be transferred right now.
    Available,
    /// Nothing can be transferred until the host delivers an update.
    Blocked,
    /// This direction is closed for good.
    Closed,
}

/// Readiness of both directions of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamStatus {
    pub read: IoStatus,
    pub write: IoStatus,
}

/// Answer returned to the host after one round of update processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    /// Nothing can progress until the host delivers a new update.
    Blocked,
    /// The host asked for a yield; call back again.
    Reschedule,
    /// Every task has completed.
    FinishedOk,
    /// The request failed or a task faulted.
    FinishedError,
}

/// The host ABI consumed by the runtime.
///
/// Implementations keep their own interior state; every method takes `&self`
/// and must not call back into the runtime.
pub trait Platform {
    /// Opens a stream to a named component.
    fn open(&self, component: &str) -> Result<Descriptor, HostError>;

    /// Opens a TCP connection to `host`.
    fn tcp_connect(&self, host: &str) -> Result<Descriptor, HostError>;

    /// Opens a UDP association with `host`.
    fn udp_connect(&self, host: &str) -> Result<Descriptor, HostError>;

    /// Creates a timer firing `duration` from now.
    ///
    /// The host rejects zero durations.
    fn new_timer(&self, duration: Duration) -> Result<Descriptor, HostError>;

    /// Current instant on the host's monotonic clock.
    fn instant(&self) -> TimePoint;

    /// Releases a descriptor. Each descriptor must be released exactly once.
    fn free_descriptor(&self, descriptor: Descriptor);

    /// Takes the next pending update, if any.
    fn take_update(&self) -> Option<Descriptor>;

    /// Whether the host wants the image to yield control.
    fn please_yield(&self) -> bool;

    /// Reads up to `buf.len()` bytes, returning how many were read.
    fn read(&self, descriptor: Descriptor, buf: &mut [u8]) -> usize;

    /// Writes up to `data.len()` bytes, returning how many were accepted.
    fn write(&self, descriptor: Descriptor, data: &[u8]) -> usize;

    fn stream_status(&self, descriptor: Descriptor) -> StreamStatus;
}
