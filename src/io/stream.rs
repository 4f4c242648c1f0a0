use super::READ_CHUNK_SIZE;
use crate::error::RuntimeError;
use crate::platform::{Descriptor, IoStatus};
use crate::runtime::core::Handle;
use crate::runtime::scheduler::{WaitFor, WaitKey};

impl Handle {
    /// Suspends the current task until the host reports an update on
    /// `descriptor`.
    ///
    /// # Panics
    ///
    /// Panics if another task already waits on the same stream.
    pub fn wait_update(&self, descriptor: Descriptor) -> WaitFor {
        WaitFor::new(self.clone(), WaitKey::Stream(descriptor))
    }

    /// Waits for the host to open a stream towards the instance and claims
    /// it.
    ///
    /// Streams are claimed in the order the host reported them; a stream
    /// that is already queued is returned without suspending.
    pub async fn wait_for_incoming_stream(&self) -> Descriptor {
        loop {
            let taken = self.streams_mut().pop_incoming();
            if let Some(descriptor) = taken {
                tracing::debug!(%descriptor, "took an incoming stream");
                return descriptor;
            }

            WaitFor::new(self.clone(), WaitKey::IncomingStream).await;
        }
    }

    /// Reads from `descriptor` until the host closes its read side.
    pub async fn read_all(&self, descriptor: Descriptor) -> Result<Vec<u8>, RuntimeError> {
        if !self.is_open(descriptor) {
            return Err(RuntimeError::StreamClosed(descriptor));
        }

        let mut data = Vec::new();
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            match self.platform().stream_status(descriptor).read {
                IoStatus::Available => {
                    let read = self.platform().read(descriptor, &mut chunk);
                    if read == 0 {
                        self.wait_update(descriptor).await;
                    } else {
                        data.extend_from_slice(&chunk[..read]);
                    }
                }
                IoStatus::Blocked => self.wait_update(descriptor).await,
                IoStatus::Closed => break,
            }
        }

        tracing::trace!(%descriptor, bytes = data.len(), "read a stream to the end");
        Ok(data)
    }

    /// Writes all of `data` to `descriptor`.
    ///
    /// Fails with [`RuntimeError::ShortWrite`] if the host closes the write
    /// side before everything was written.
    pub async fn write_all(&self, descriptor: Descriptor, data: &[u8]) -> Result<(), RuntimeError> {
        if !self.is_open(descriptor) {
            return Err(RuntimeError::StreamClosed(descriptor));
        }

        let mut written = 0;
        while written < data.len() {
            match self.platform().stream_status(descriptor).write {
                IoStatus::Available => {
                    let n = self.platform().write(descriptor, &data[written..]);
                    if n == 0 {
                        self.wait_update(descriptor).await;
                    } else {
                        written += n;
                    }
                }
                IoStatus::Blocked => self.wait_update(descriptor).await,
                IoStatus::Closed => {
                    return Err(RuntimeError::ShortWrite {
                        descriptor,
                        written,
                        expected: data.len(),
                    });
                }
            }
        }

        tracing::trace!(%descriptor, bytes = written, "wrote to a stream");
        Ok(())
    }
}
