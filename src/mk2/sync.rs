use crate::prelude::*;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use super::frame::{checksum, Header, RawFrame};

/// Finds frame boundaries in the MK2 byte stream.
///
/// Unlocked, every byte is a candidate header; the byte in front of it is taken
/// as the length and the candidate is accepted only if its checksum holds. Once
/// a frame is accepted the synchronizer is locked and trusts each length byte to
/// lead straight to the next frame, still checking every checksum since header
/// values also turn up inside payloads.
#[derive(Debug, Default)]
pub struct FrameSynchronizer {
    locked: bool,
}

impl FrameSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn unlock(&mut self) {
        if self.locked {
            debug!("frame lock lost");
        }
        self.locked = false;
    }

    // total bytes of a frame on the wire, length byte included
    fn frame_len(length: u8) -> usize {
        length as usize + 2
    }

    fn sum(src: &[u8]) -> u8 {
        checksum(src[0], src[1], &src[2..])
    }

    fn decode_locked(&mut self, src: &mut BytesMut) -> Result<Option<RawFrame>, FrameError> {
        if src.is_empty() {
            return Ok(None);
        }

        let total = Self::frame_len(src[0]);
        if src.len() < total {
            return Ok(None);
        }

        let sum = Self::sum(&src[..total]);
        if sum != 0 {
            self.unlock();
            // only drop the length byte; scanning picks up from inside the
            // rejected frame in case the length itself was the damaged byte
            src.advance(1);
            return Err(FrameError::Checksum { sum });
        }

        src.advance(1);
        Ok(Some(RawFrame::new(src.split_to(total - 1).freeze())))
    }

    fn decode_unlocked(&mut self, src: &mut BytesMut) -> Option<RawFrame> {
        let mut start = 0;

        while start + 1 < src.len() {
            if !Header::is_marker(src[start + 1]) {
                start += 1;
                continue;
            }

            let total = Self::frame_len(src[start]);
            if src.len() < start + total {
                // candidate may be real, wait for the rest of it
                src.advance(start);
                return None;
            }

            if Self::sum(&src[start..start + total]) == 0 {
                src.advance(start + 1);
                self.locked = true;
                info!("Locked");
                return Some(RawFrame::new(src.split_to(total - 1).freeze()));
            }

            trace!("rejected frame candidate at offset {}", start);
            start += 1;
        }

        // keep the last byte, it could be the length of a frame still arriving
        src.advance(start);
        None
    }
}

impl Decoder for FrameSynchronizer {
    type Item = RawFrame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.locked {
            self.decode_locked(src)
        } else {
            Ok(self.decode_unlocked(src))
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }

        if self.locked && !src.is_empty() {
            let expected = Self::frame_len(src[0]) - 1;
            let actual = src.len() - 1;
            src.clear();
            self.unlock();
            return Err(FrameError::FrameLengthMismatch { expected, actual });
        }

        src.clear();
        Ok(None)
    }
}
