use super::{Descriptor, IoStatus, Platform, StreamKind, StreamStatus, TimePoint};
use crate::error::HostError;

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::time::Duration;

/// An in-process implementation of the host ABI.
///
/// `InMemoryPlatform` keeps streams as byte buffers, timers against a manual
/// clock, and updates in a FIFO. It is a cheap handle: clones share the same
/// host, so a test can keep one clone to inject events and inspect effects
/// while the instance owns another.
///
/// # Examples
///
/// ```rust,ignore
/// let host = InMemoryPlatform::new();
/// let request = host.incoming(b"payload");
/// host.advance(Duration::from_millis(5));
/// ```
#[derive(Clone, Default)]
pub struct InMemoryPlatform {
    state: Rc<RefCell<HostState>>,
}

#[derive(Default)]
struct HostState {
    last_descriptor: u64,
    now: TimePoint,
    entries: HashMap<Descriptor, Entry>,
    updates: VecDeque<Descriptor>,
    please_yield: bool,
    refused: HashSet<String>,
    freed: Vec<Descriptor>,
    retired: HashMap<Descriptor, Vec<u8>>,
    connections: Vec<(StreamKind, String, Descriptor)>,
}

enum Entry {
    Stream(Pipe),
    Timer { deadline: TimePoint },
}

#[derive(Default)]
struct Pipe {
    inbound: VecDeque<u8>,
    read_closed: bool,
    outbound: Vec<u8>,
    write_closed: bool,
}

impl HostState {
    fn allocate(&mut self, entry: Entry) -> Descriptor {
        self.last_descriptor += 1;
        let descriptor = Descriptor::new(self.last_descriptor).expect("descriptors start at 1");
        self.entries.insert(descriptor, entry);
        descriptor
    }

    fn pipe_mut(&mut self, descriptor: Descriptor) -> &mut Pipe {
        match self.entries.get_mut(&descriptor) {
            Some(Entry::Stream(pipe)) => pipe,
            _ => panic!("descriptor {descriptor} is not a live stream"),
        }
    }

    fn connect(&mut self, kind: StreamKind, name: &str) -> Result<Descriptor, HostError> {
        if name.is_empty() {
            return Err(HostError::INVALID_ARGUMENT);
        }
        if self.refused.contains(name) {
            return Err(HostError::NO_DEVICE);
        }

        let descriptor = self.allocate(Entry::Stream(Pipe::default()));
        self.connections.push((kind, name.to_owned(), descriptor));
        Ok(descriptor)
    }
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a complete inbound request stream and reports it as an update.
    ///
    /// The read side is closed after `payload`, the way a host hands over a
    /// fully received request.
    pub fn incoming(&self, payload: &[u8]) -> Descriptor {
        let descriptor = self.incoming_open(payload);
        self.close_read(descriptor);
        descriptor
    }

    /// Opens an inbound stream whose read side stays open.
    pub fn incoming_open(&self, payload: &[u8]) -> Descriptor {
        let mut state = self.state.borrow_mut();
        let descriptor = state.allocate(Entry::Stream(Pipe {
            inbound: payload.iter().copied().collect(),
            ..Pipe::default()
        }));
        state.updates.push_back(descriptor);
        descriptor
    }

    /// Appends inbound bytes to a stream and reports an update on it.
    pub fn push_data(&self, descriptor: Descriptor, data: &[u8]) {
        let mut state = self.state.borrow_mut();
        state.pipe_mut(descriptor).inbound.extend(data.iter().copied());
        state.updates.push_back(descriptor);
    }

    /// Closes the read side of a stream and reports an update on it.
    pub fn close_read(&self, descriptor: Descriptor) {
        let mut state = self.state.borrow_mut();
        state.pipe_mut(descriptor).read_closed = true;
        if state.updates.back() != Some(&descriptor) {
            state.updates.push_back(descriptor);
        }
    }

    /// Closes the write side of a stream and reports an update on it.
    pub fn close_write(&self, descriptor: Descriptor) {
        let mut state = self.state.borrow_mut();
        state.pipe_mut(descriptor).write_closed = true;
        state.updates.push_back(descriptor);
    }

    /// Reports an update on `descriptor` without changing anything.
    pub fn notify(&self, descriptor: Descriptor) {
        self.state.borrow_mut().updates.push_back(descriptor);
    }

    /// Moves the clock forward and fires every timer that became due.
    ///
    /// Timers fire in deadline order.
    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.borrow_mut();
        state.now = state.now.after(duration);
        let now = state.now;

        let mut due: Vec<(TimePoint, Descriptor)> = state
            .entries
            .iter()
            .filter_map(|(descriptor, entry)| match entry {
                Entry::Timer { deadline } if *deadline <= now => Some((*deadline, *descriptor)),
                _ => None,
            })
            .collect();
        due.sort();

        for (_, descriptor) in due {
            state.entries.remove(&descriptor);
            state.updates.push_back(descriptor);
        }
    }

    pub fn set_please_yield(&self, value: bool) {
        self.state.borrow_mut().please_yield = value;
    }

    /// Makes every future connection attempt to `name` fail with `ENODEV`.
    pub fn refuse(&self, name: &str) {
        self.state.borrow_mut().refused.insert(name.to_owned());
    }

    /// Bytes the image wrote to `descriptor`, including after its release.
    pub fn written(&self, descriptor: Descriptor) -> Vec<u8> {
        let state = self.state.borrow();
        match state.entries.get(&descriptor) {
            Some(Entry::Stream(pipe)) => pipe.outbound.clone(),
            _ => state.retired.get(&descriptor).cloned().unwrap_or_default(),
        }
    }

    /// Every descriptor released by the image, in release order.
    pub fn freed(&self) -> Vec<Descriptor> {
        self.state.borrow().freed.clone()
    }

    /// How many times `descriptor` was released.
    pub fn free_count(&self, descriptor: Descriptor) -> usize {
        self.state
            .borrow()
            .freed
            .iter()
            .filter(|d| **d == descriptor)
            .count()
    }

    /// Outbound connections opened by the image, in order.
    pub fn connections(&self) -> Vec<(StreamKind, String, Descriptor)> {
        self.state.borrow().connections.clone()
    }

    pub fn pending_updates(&self) -> usize {
        self.state.borrow().updates.len()
    }

    pub fn now(&self) -> TimePoint {
        self.state.borrow().now
    }
}

impl Platform for InMemoryPlatform {
    fn open(&self, component: &str) -> Result<Descriptor, HostError> {
        self.state
            .borrow_mut()
            .connect(StreamKind::Component, component)
    }

    fn tcp_connect(&self, host: &str) -> Result<Descriptor, HostError> {
        self.state.borrow_mut().connect(StreamKind::Tcp, host)
    }

    fn udp_connect(&self, host: &str) -> Result<Descriptor, HostError> {
        self.state.borrow_mut().connect(StreamKind::Udp, host)
    }

    fn new_timer(&self, duration: Duration) -> Result<Descriptor, HostError> {
        if duration.is_zero() {
            return Err(HostError::INVALID_ARGUMENT);
        }

        let mut state = self.state.borrow_mut();
        let deadline = state.now.after(duration);
        Ok(state.allocate(Entry::Timer { deadline }))
    }

    fn instant(&self) -> TimePoint {
        self.state.borrow().now
    }

    fn free_descriptor(&self, descriptor: Descriptor) {
        let mut state = self.state.borrow_mut();
        if let Some(Entry::Stream(pipe)) = state.entries.remove(&descriptor) {
            state.retired.insert(descriptor, pipe.outbound);
        }
        state.freed.push(descriptor);
    }

    fn take_update(&self) -> Option<Descriptor> {
        let mut state = self.state.borrow_mut();
        while let Some(descriptor) = state.updates.pop_front() {
            // Updates queued before a release are dropped with the descriptor.
            if !state.freed.contains(&descriptor) {
                return Some(descriptor);
            }
        }
        None
    }

    fn please_yield(&self) -> bool {
        self.state.borrow().please_yield
    }

    fn read(&self, descriptor: Descriptor, buf: &mut [u8]) -> usize {
        let mut state = self.state.borrow_mut();
        let Some(Entry::Stream(pipe)) = state.entries.get_mut(&descriptor) else {
            return 0;
        };

        let n = buf.len().min(pipe.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(pipe.inbound.drain(..n)) {
            *slot = byte;
        }
        n
    }

    fn write(&self, descriptor: Descriptor, data: &[u8]) -> usize {
        let mut state = self.state.borrow_mut();
        match state.entries.get_mut(&descriptor) {
            Some(Entry::Stream(pipe)) if !pipe.write_closed => {
                pipe.outbound.extend_from_slice(data);
                data.len()
            }
            _ => 0,
        }
    }

    fn stream_status(&self, descriptor: Descriptor) -> StreamStatus {
        let state = self.state.borrow();
        match state.entries.get(&descriptor) {
            Some(Entry::Stream(pipe)) => StreamStatus {
                read: if !pipe.inbound.is_empty() {
                    IoStatus::Available
                } else if pipe.read_closed {
                    IoStatus::Closed
                } else {
                    IoStatus::Blocked
                },
                write: if pipe.write_closed {
                    IoStatus::Closed
                } else {
                    IoStatus::Available
                },
            },
            _ => StreamStatus {
                read: IoStatus::Closed,
                write: IoStatus::Closed,
            },
        }
    }
}
