use crate::prelude::*;

use bytes::Bytes;
use nom::IResult;
use nom_derive::{Nom, Parse};
use num_enum::{IntoPrimitive, TryFromPrimitive};

// {{{ Header
/// First byte after the length byte; says what kind of frame follows.
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Header {
    Info = 0x20,
    Command = 0xff,
}

impl Header {
    pub fn is_marker(byte: u8) -> bool {
        Self::try_from(byte).is_ok()
    }
}
// }}}

// {{{ CommandKind
/// Second byte of a command frame, in either direction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum CommandKind {
    SetTarget = 0x41,  // 'A'
    InfoRequest = 0x46, // 'F'
    Led = 0x4c,        // 'L'
    Version = 0x56,    // 'V'
    Winmon = 0x57,     // 'W'
}
// }}}

// {{{ WinmonCommand
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum WinmonCommand {
    ReadRamVar = 0x30,
    GetRamVarInfo = 0x36,
    ReadRamResponse = 0x85,
    GetRamVarInfoResponse = 0x8e,
}
// }}}

// {{{ InfoKind
/// Subtype byte of an info frame, five bytes after the header.
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum InfoKind {
    AcL1 = 0x08,
    Dc = 0x0c,
}

/// Address byte of an info request.
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum InfoAddress {
    Dc = 0x00,
    AcL1 = 0x01,
}
// }}}

/// Sum of every byte modulo 256. A frame is intact when the sum over its
/// length byte, header, payload and trailing checksum is zero.
pub fn checksum(length: u8, header: u8, data: &[u8]) -> u8 {
    data.iter()
        .fold(length.wrapping_add(header), |acc, b| acc.wrapping_add(*b))
}

pub fn checksum_valid(length: u8, header: u8, data: &[u8]) -> bool {
    checksum(length, header, data) == 0
}

/// Builds `[length][header][body...][checksum]` with `length = body.len() + 1`.
/// Callers are responsible for keeping the body short enough for the length
/// byte.
pub fn encode(header: u8, body: &[u8]) -> Vec<u8> {
    let length = (body.len() + 1) as u8;

    let mut r = Vec::with_capacity(body.len() + 3);
    r.push(length);
    r.push(header);
    r.extend_from_slice(body);
    r.push(checksum(length, header, body).wrapping_neg());

    r
}

// {{{ RawFrame
/// A checksum-verified frame with the length byte stripped:
/// `[header][body...][checksum]`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawFrame(Bytes);

impl RawFrame {
    pub fn new(bytes: Bytes) -> Self {
        Self(bytes)
    }

    pub fn header(&self) -> u8 {
        self.0[0]
    }

    /// Everything between the header and the trailing checksum.
    pub fn body(&self) -> &[u8] {
        let len = self.0.len();
        if len < 2 {
            return &[];
        }
        &self.0[1..len - 1]
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}
// }}}

fn le_u24(input: &[u8]) -> IResult<&[u8], u32> {
    nom::number::complete::le_u24(input)
}

// {{{ DcInfo
/// Body of a DC info frame. The battery voltage is kept raw since its
/// signedness comes from the scale table.
#[derive(Clone, Debug, PartialEq, Nom)]
#[nom(LittleEndian)]
pub struct DcInfo {
    #[nom(SkipBefore(5))] // 4 bytes of phase info, then the subtype byte
    pub bat_voltage: u16,
    #[nom(Parse = "le_u24")]
    pub discharge_counter: u32,
    #[nom(Parse = "le_u24")]
    pub charge_counter: u32,
    pub inverter_period: u8,
}
// }}}

// {{{ AcInfo
#[derive(Clone, Debug, PartialEq, Nom)]
#[nom(LittleEndian)]
pub struct AcInfo {
    #[nom(SkipBefore(5))]
    pub mains_voltage: u16,
    pub mains_current: u16,
    pub inverter_voltage: u16,
    pub inverter_current: u16,
    pub mains_period: u8,
}

impl AcInfo {
    /// Mains period value the unit reports when there is no AC input.
    pub const NO_MAINS: u8 = 0xff;
}
// }}}

/// A verified frame, classified by header and subtype.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Version(u32),
    /// Scale metadata for the next RAM variable, starting at the response
    /// command byte.
    ScaleInfo(Vec<u8>),
    RamVar(u16),
    Led { on: u8, blink: u8 },
    DcInfo(DcInfo),
    AcInfo(AcInfo),
    /// Recognised framing but a combination we don't decode.
    Unknown { header: u8, kind: u8 },
}

pub struct Parser;
impl Parser {
    pub fn parse(frame: &RawFrame) -> Result<Frame> {
        let body = frame.body();
        if body.is_empty() {
            bail!("frame with empty body: {:02x?}", frame.bytes());
        }

        let r = match Header::try_from(frame.header()) {
            Ok(Header::Command) => Self::parse_command(body)?,
            Ok(Header::Info) => Self::parse_info(body)?,
            Err(_) => Frame::Unknown {
                header: frame.header(),
                kind: body[0],
            },
        };

        Ok(r)
    }

    fn parse_command(body: &[u8]) -> Result<Frame> {
        let unknown = Frame::Unknown {
            header: Header::Command.into(),
            kind: body[0],
        };

        let r = match CommandKind::try_from(body[0]) {
            Ok(CommandKind::Version) => {
                if body.len() < 5 {
                    bail!("version frame too short ({} bytes)", body.len());
                }
                Frame::Version(u32::from_le_bytes([body[1], body[2], body[3], body[4]]))
            }
            Ok(CommandKind::Winmon) => {
                if body.len() < 2 {
                    bail!("winmon frame without a command byte");
                }
                match WinmonCommand::try_from(body[1]) {
                    Ok(WinmonCommand::GetRamVarInfoResponse) => Frame::ScaleInfo(body[1..].to_vec()),
                    Ok(WinmonCommand::ReadRamResponse) => {
                        if body.len() < 4 {
                            bail!("RAM read response too short ({} bytes)", body.len());
                        }
                        Frame::RamVar(u16::from_le_bytes([body[2], body[3]]))
                    }
                    _ => unknown,
                }
            }
            Ok(CommandKind::Led) => {
                if body.len() < 3 {
                    bail!("LED frame too short ({} bytes)", body.len());
                }
                Frame::Led {
                    on: body[1],
                    blink: body[2],
                }
            }
            _ => unknown,
        };

        Ok(r)
    }

    fn parse_info(body: &[u8]) -> Result<Frame> {
        if body.len() < 5 {
            bail!("info frame too short ({} bytes)", body.len());
        }

        let r = match InfoKind::try_from(body[4]) {
            Ok(InfoKind::Dc) => match DcInfo::parse(body) {
                Ok((_, dc)) => Frame::DcInfo(dc),
                Err(e) => bail!("DC info frame: {}", e),
            },
            Ok(InfoKind::AcL1) => match AcInfo::parse(body) {
                Ok((_, ac)) => Frame::AcInfo(ac),
                Err(e) => bail!("AC info frame: {}", e),
            },
            Err(_) => Frame::Unknown {
                header: Header::Info.into(),
                kind: body[4],
            },
        };

        Ok(r)
    }
}
