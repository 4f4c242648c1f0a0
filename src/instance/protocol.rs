use crate::error::ProtocolError;

/// Protocol of a server request, selected by the magic number that opens
/// the first inbound payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Http,
    Rpc,
    JobWorker,
}

impl RequestKind {
    pub const HTTP_MAGIC: u32 = 0xd909_efe8;
    pub const RPC_MAGIC: u32 = 0x7b07_c7a4;
    pub const JOB_WORKER_MAGIC: u32 = 0x437d_7312;

    /// Classifies a request by its leading little-endian 32-bit magic.
    ///
    /// # Examples
    ///
    /// ```
    /// use lightrt::RequestKind;
    ///
    /// let payload = RequestKind::RPC_MAGIC.to_le_bytes();
    /// assert_eq!(RequestKind::classify(&payload), Ok(RequestKind::Rpc));
    /// ```
    pub fn classify(payload: &[u8]) -> Result<Self, ProtocolError> {
        let Some(head) = payload.first_chunk::<4>() else {
            return Err(ProtocolError::Truncated { len: payload.len() });
        };

        match u32::from_le_bytes(*head) {
            Self::HTTP_MAGIC => Ok(Self::Http),
            Self::RPC_MAGIC => Ok(Self::Rpc),
            Self::JOB_WORKER_MAGIC => Ok(Self::JobWorker),
            magic => Err(ProtocolError::UnknownMagic(magic)),
        }
    }

    pub fn magic(self) -> u32 {
        match self {
            Self::Http => Self::HTTP_MAGIC,
            Self::Rpc => Self::RPC_MAGIC,
            Self::JobWorker => Self::JOB_WORKER_MAGIC,
        }
    }
}

/// Whether the request stream is still needed once the request is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDisposition {
    /// A response will be written back on the request stream.
    Reply,

    /// The sender does not expect an answer; the stream is released early.
    NoReply,
}

/// A protocol front-end: turns the raw request into script input and the
/// script's state back into a response.
pub trait Frontend {
    /// Parses the request payload, magic included.
    fn init(&mut self, kind: RequestKind, payload: &[u8]) -> Result<StreamDisposition, ProtocolError>;

    /// Produces the bytes written back on the request stream at shutdown.
    fn finalize(&mut self, kind: RequestKind) -> Result<Vec<u8>, ProtocolError> {
        let _ = kind;
        Ok(Vec::new())
    }
}

/// A front-end that accepts every request and never answers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFrontend;

impl Frontend for NoopFrontend {
    fn init(&mut self, _kind: RequestKind, _payload: &[u8]) -> Result<StreamDisposition, ProtocolError> {
        Ok(StreamDisposition::Reply)
    }
}

#[cfg(test)]
mod tests {
    use super::RequestKind;
    use crate::error::ProtocolError;

    #[test]
    fn test_classify_known_magics() {
        for kind in [RequestKind::Http, RequestKind::Rpc, RequestKind::JobWorker] {
            let mut payload = kind.magic().to_le_bytes().to_vec();
            payload.extend_from_slice(b"body");

            assert_eq!(RequestKind::classify(&payload), Ok(kind));
        }
    }

    #[test]
    fn test_classify_rejects_unknown_and_short_payloads() {
        assert_eq!(
            RequestKind::classify(&0xdead_beef_u32.to_le_bytes()),
            Err(ProtocolError::UnknownMagic(0xdead_beef))
        );
        assert_eq!(RequestKind::classify(&[1, 2]), Err(ProtocolError::Truncated { len: 2 }));
    }
}
