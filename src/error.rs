use serde::Serialize;
use thiserror::Error;

/// Errors seen on the MK2 link. None of these are fatal to a connection; they
/// are recorded in the snapshot being assembled and the synchronizer
/// resynchronizes on its own.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize)]
pub enum FrameError {
    /// Reading from the byte stream failed, or the stream ended
    #[error("read error: {0}")]
    TransportRead(String),

    /// Fewer bytes arrived than the frame's length byte declared
    #[error("read length error: expected {expected} bytes, got {actual}")]
    FrameLengthMismatch { expected: usize, actual: usize },

    /// Frame bytes do not sum to zero
    #[error("invalid frame checksum: sum {sum:#04x}")]
    Checksum { sum: u8 },

    /// Writing a command to the byte stream failed
    #[error("write error: {0}")]
    TransportWrite(String),
}

impl FrameError {
    /// Whether this error comes from the read side and should cost us frame lock.
    pub fn breaks_lock(&self) -> bool {
        !matches!(self, FrameError::TransportWrite(_))
    }
}

impl From<std::io::Error> for FrameError {
    fn from(err: std::io::Error) -> Self {
        FrameError::TransportRead(err.to_string())
    }
}
