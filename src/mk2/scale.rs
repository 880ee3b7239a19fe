use crate::prelude::*;

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// RAM variables the MK2 can report. Scale factors are fetched for the first
/// `SCALE_CHANNELS` of them.
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum RamVar {
    VMains = 0,
    IMains = 1,
    VInverter = 2,
    IInverter = 3,
    VBat = 4,
    IBat = 5,
    VBatRipple = 6,
    InverterPeriod = 7,
    MainPeriod = 8,
    IAcLoad = 9,
    VirSwitchPos = 10,
    IgnAcInState = 11,
    MultiFuncRelay = 12,
    ChargeState = 13,
    InverterPower1 = 14,
    InverterPower2 = 15,
    OutPower = 16,
}

pub const SCALE_CHANNELS: usize = 14;

// raw scale magnitudes at or above this are reciprocal (period-like) scales
const RECIPROCAL_THRESHOLD: u16 = 0x4000;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScaleEntry {
    pub scale: f64,
    pub offset: f64,
    pub signed: bool,
    pub supported: bool,
}

impl ScaleEntry {
    pub fn unsupported() -> Self {
        Self::default()
    }

    pub fn from_raw(raw_scale: i16, raw_offset: i16) -> Self {
        let magnitude = raw_scale.unsigned_abs();
        let scale = if magnitude >= RECIPROCAL_THRESHOLD {
            1.0 / (0x8000 as f64 - magnitude as f64)
        } else {
            magnitude as f64
        };

        Self {
            scale,
            offset: raw_offset as f64,
            signed: raw_scale < 0,
            supported: true,
        }
    }

    /// Decodes a get-RAM-var-info response starting at its command byte:
    /// `[0x8e][scale lo][scale hi]` then the offset, either right behind the
    /// scale or after one extra byte depending on firmware. Anything shorter
    /// marks the variable as unsupported.
    pub fn from_metadata(meta: &[u8]) -> Self {
        let (scale, offset) = match meta.len() {
            0..=4 => return Self::unsupported(),
            5 => (&meta[1..3], &meta[3..5]),
            _ => (&meta[1..3], &meta[4..6]),
        };

        Self::from_raw(
            i16::from_le_bytes([scale[0], scale[1]]),
            i16::from_le_bytes([offset[0], offset[1]]),
        )
    }

    /// `scale * (value + offset)`; unsupported entries pass the value through.
    pub fn apply_scale(&self, value: f64) -> f64 {
        if !self.supported {
            return value;
        }
        self.scale * (value + self.offset)
    }

    /// Interprets a little-endian 16-bit sample with this entry's signedness
    /// and scales it. Unsupported entries always decode to 0.
    pub fn apply_scale_and_sign(&self, raw: u16) -> f64 {
        if !self.supported {
            return 0.0;
        }
        let value = if self.signed {
            raw as i16 as f64
        } else {
            raw as f64
        };
        self.apply_scale(value)
    }
}

/// Per-connection scale factors, filled once during the handshake.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScaleTable {
    entries: Vec<ScaleEntry>,
}

impl ScaleTable {
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(SCALE_CHANNELS),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.entries.len() >= SCALE_CHANNELS
    }

    /// Channel the next scale request should ask for, if any are missing.
    pub fn next_channel(&self) -> Option<u8> {
        if self.is_complete() {
            None
        } else {
            Some(self.entries.len() as u8)
        }
    }

    pub fn push(&mut self, entry: ScaleEntry) -> Result<()> {
        if self.is_complete() {
            bail!("scale table already holds {} entries", SCALE_CHANNELS);
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn get(&self, var: RamVar) -> ScaleEntry {
        self.entries
            .get(u8::from(var) as usize)
            .copied()
            .unwrap_or_else(ScaleEntry::unsupported)
    }

    pub fn apply_scale(&self, var: RamVar, value: f64) -> f64 {
        self.get(var).apply_scale(value)
    }

    pub fn apply_scale_and_sign(&self, var: RamVar, raw: u16) -> f64 {
        self.get(var).apply_scale_and_sign(raw)
    }

    /// Converts a period-like sample to Hz: `10 / scaled period`.
    pub fn frequency(&self, var: RamVar, period: u8) -> f64 {
        let hz = 10.0 / self.apply_scale(var, period as f64);
        if hz.is_finite() {
            hz
        } else {
            0.0
        }
    }
}

impl FromIterator<ScaleEntry> for ScaleTable {
    fn from_iter<I: IntoIterator<Item = ScaleEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().take(SCALE_CHANNELS).collect(),
        }
    }
}
