use crate::prelude::*;

use super::frame::{self, CommandKind, Header, InfoAddress, WinmonCommand};
use super::scale::RamVar;

/// Largest payload that still fits the length byte alongside the header.
pub const MAX_PAYLOAD: usize = 253;

/// Commands the driver itself issues while handshaking and polling.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Request {
    /// Address the first device on the VE.Bus
    SetTarget,
    /// Fetch scale and offset of a RAM variable
    ScaleInfo(u8),
    DcInfo,
    AcInfo,
    Led,
    ChargeState,
}

impl Request {
    pub fn payload(&self) -> Vec<u8> {
        use Request::*;

        match self {
            SetTarget => vec![CommandKind::SetTarget.into(), 0x01, 0x00],
            ScaleInfo(var) => vec![
                CommandKind::Winmon.into(),
                WinmonCommand::GetRamVarInfo.into(),
                *var,
                0x00,
            ],
            DcInfo => vec![CommandKind::InfoRequest.into(), InfoAddress::Dc.into()],
            AcInfo => vec![CommandKind::InfoRequest.into(), InfoAddress::AcL1.into()],
            Led => vec![CommandKind::Led.into()],
            ChargeState => vec![
                CommandKind::Winmon.into(),
                WinmonCommand::ReadRamVar.into(),
                RamVar::ChargeState.into(),
                0x00,
            ],
        }
    }

    pub fn frame(&self) -> Vec<u8> {
        frame::encode(Header::Command.into(), &self.payload())
    }
}

/// Frames opaque payloads, e.g. charger on/off commands, for the wire:
/// `[len][0xff][payload...][checksum]`.
pub struct CommandFrameFactory;
impl CommandFrameFactory {
    pub fn build(payload: &[u8]) -> Result<Vec<u8>> {
        if payload.is_empty() {
            bail!("refusing to send an empty command");
        }
        if payload.len() > MAX_PAYLOAD {
            bail!(
                "command payload of {} bytes exceeds {} bytes",
                payload.len(),
                MAX_PAYLOAD
            );
        }

        Ok(frame::encode(Header::Command.into(), payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mk2::frame::checksum_valid;

    #[test]
    fn request_frames() {
        assert_eq!(Request::SetTarget.frame(), vec![0x04, 0xff, 0x41, 0x01, 0x00, 0xbb]);
        assert_eq!(Request::DcInfo.frame(), vec![0x03, 0xff, 0x46, 0x00, 0xb8]);
        assert_eq!(Request::AcInfo.frame(), vec![0x03, 0xff, 0x46, 0x01, 0xb7]);
        assert_eq!(Request::Led.frame(), vec![0x02, 0xff, 0x4c, 0xb3]);
        assert_eq!(
            Request::ScaleInfo(5).frame(),
            vec![0x05, 0xff, 0x57, 0x36, 0x05, 0x00, 0x6a]
        );
        assert_eq!(
            Request::ChargeState.frame(),
            vec![0x05, 0xff, 0x57, 0x30, 0x0d, 0x00, 0x68]
        );
    }

    #[test]
    fn built_frames_validate() {
        let payload = [0x5a, 0x37, 0x01, 0x00, 0x54, 0x81];
        let f = CommandFrameFactory::build(&payload).unwrap();
        assert_eq!(f, vec![0x07, 0xff, 0x5a, 0x37, 0x01, 0x00, 0x54, 0x81, 0x93]);
        assert!(checksum_valid(f[0], f[1], &f[2..]));
    }

    #[test]
    fn rejects_unframeable_payloads() {
        assert!(CommandFrameFactory::build(&[]).is_err());
        assert!(CommandFrameFactory::build(&[0u8; MAX_PAYLOAD]).is_ok());
        assert!(CommandFrameFactory::build(&[0u8; MAX_PAYLOAD + 1]).is_err());
    }
}
