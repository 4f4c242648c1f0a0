use crate::error::{HostError, invariant_violation};
use crate::platform::{Descriptor, StreamKind};
use crate::runtime::core::Handle;

use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

/// Descriptors owned by the current execution.
///
/// Every descriptor in `opened` was handed out by the host and has not been
/// freed yet. Incoming streams are part of `opened` from the moment the host
/// reports them, whether or not a task has claimed them.
#[derive(Debug, Default)]
pub(crate) struct StreamTable {
    opened: BTreeSet<Descriptor>,
    incoming: VecDeque<Descriptor>,
    standard: Option<Descriptor>,
}

impl StreamTable {
    pub(crate) fn contains(&self, descriptor: Descriptor) -> bool {
        self.opened.contains(&descriptor)
    }

    /// Records a stream the host opened towards the instance.
    pub(crate) fn push_incoming(&mut self, descriptor: Descriptor) {
        self.opened.insert(descriptor);
        self.incoming.push_back(descriptor);
    }

    pub(crate) fn pop_incoming(&mut self) -> Option<Descriptor> {
        self.incoming.pop_front()
    }

    pub(crate) fn set_standard(&mut self, descriptor: Option<Descriptor>) {
        self.standard = descriptor;
    }
}

impl Handle {
    /// Opens a stream to `target` through the host.
    ///
    /// On failure the host error is returned and nothing is recorded.
    pub fn open_stream(&self, target: &str, kind: &StreamKind) -> Result<Descriptor, HostError> {
        let platform = self.platform();
        let opened = match kind {
            StreamKind::Component => platform.open(target),
            StreamKind::Tcp => platform.tcp_connect(target),
            StreamKind::Udp => platform.udp_connect(target),
        };

        match opened {
            Ok(descriptor) => {
                self.streams_mut().opened.insert(descriptor);
                tracing::debug!(%descriptor, peer = target, "opened a stream");
                Ok(descriptor)
            }
            Err(error) => {
                tracing::warn!(peer = target, %error, "can't open a stream");
                Err(error)
            }
        }
    }

    /// Creates a host timer firing after `duration`.
    ///
    /// The timer descriptor is owned like any stream and must be released.
    pub fn set_timer(&self, duration: Duration) -> Result<Descriptor, HostError> {
        match self.platform().new_timer(duration) {
            Ok(descriptor) => {
                self.streams_mut().opened.insert(descriptor);
                tracing::debug!(%descriptor, seconds = duration.as_secs_f64(), "set a timer");
                Ok(descriptor)
            }
            Err(error) => {
                tracing::warn!(seconds = duration.as_secs_f64(), %error, "can't set a timer");
                Err(error)
            }
        }
    }

    /// Claims the oldest incoming stream not taken yet.
    pub fn take_incoming_stream(&self) -> Option<Descriptor> {
        let taken = self.streams_mut().pop_incoming();

        match taken {
            Some(descriptor) => tracing::debug!(%descriptor, "took an incoming stream"),
            None => tracing::warn!("can't take an incoming stream since there is none"),
        }

        taken
    }

    /// Frees a descriptor owned by the instance.
    ///
    /// A task still waiting on the descriptor will never be resumed for it.
    ///
    /// # Panics
    ///
    /// Panics if the descriptor is not open, e.g. when it was already released.
    pub fn release_stream(&self, descriptor: Descriptor) {
        {
            let mut streams = self.streams_mut();
            if !streams.opened.remove(&descriptor) {
                drop(streams);
                invariant_violation(format!("release of stream {descriptor} that is not open"));
            }

            if streams.standard == Some(descriptor) {
                streams.standard = None;
            }
            streams.incoming.retain(|&incoming| incoming != descriptor);
        }

        if self.scheduler().forget_descriptor(descriptor) {
            tracing::warn!(%descriptor, "released a stream a task was waiting on");
        }

        self.platform().free_descriptor(descriptor);
        tracing::debug!(%descriptor, "released a stream");
    }

    /// Frees every descriptor the instance owns.
    pub fn release_all_streams(&self) {
        let opened = {
            let mut streams = self.streams_mut();
            streams.standard = None;
            streams.incoming.clear();
            std::mem::take(&mut streams.opened)
        };

        for descriptor in opened {
            self.scheduler().forget_descriptor(descriptor);
            self.platform().free_descriptor(descriptor);
            tracing::debug!(%descriptor, "released a stream");
        }
    }

    pub fn is_open(&self, descriptor: Descriptor) -> bool {
        self.streams().contains(descriptor)
    }

    /// The open descriptors, in ascending order.
    pub fn open_descriptors(&self) -> Vec<Descriptor> {
        self.streams().opened.iter().copied().collect()
    }

    /// Number of incoming streams waiting to be claimed.
    pub fn incoming_len(&self) -> usize {
        self.streams().incoming.len()
    }

    /// The stream the current request arrived on, if it is still open.
    pub fn standard_stream(&self) -> Option<Descriptor> {
        self.streams().standard
    }
}
