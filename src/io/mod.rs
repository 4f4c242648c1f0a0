//! Stream I/O over host descriptors.
//!
//! Reads and writes never block: when the host reports a direction as
//! blocked, the calling task suspends until the host delivers an update on
//! the stream.

mod stream;

/// Size of the chunks `read_all` pulls from the host.
pub const READ_CHUNK_SIZE: usize = 4096;
