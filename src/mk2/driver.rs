use crate::prelude::*;

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use super::command::Request;
use super::frame::{AcInfo, DcInfo, Frame, Parser, RawFrame};
use super::scale::{RamVar, ScaleEntry, ScaleTable};
use super::snapshot::{led_states, Snapshot};
use super::sync::FrameSynchronizer;

/// What the worker has to do after a frame was decoded.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
    Send(Request),
    /// The polling cycle is complete: publish the snapshot, then call
    /// `Driver::restart` and send what it returns.
    Publish,
}

/// Protocol state of one MK2 connection: frame lock, scale table and the
/// snapshot being assembled. Owned by the connection's worker task and never
/// shared; everything it produces leaves through the returned actions.
///
/// At most one request is outstanding. Responses that don't answer it are
/// dropped, which keeps a single polling cycle going even when the unit's
/// periodic version frames cross a request on the wire. A request still
/// unanswered after `STALE_AFTER_VERSIONS` version frames is sent again.
#[derive(Debug, Default)]
pub struct Driver {
    synchronizer: FrameSynchronizer,
    scales: ScaleTable,
    snapshot: Snapshot,
    pending: Option<Request>,
    versions_waited: u8,
    version: Option<u32>,
}

impl Driver {
    /// Version frames to wait for an answer before asking again. The first one
    /// may have crossed the request on the wire.
    pub const STALE_AFTER_VERSIONS: u8 = 2;

    pub fn new() -> Self {
        Self::default()
    }

    /// First command on a fresh connection. The unit does not answer it in a
    /// way we decode; the handshake proper starts with its next version frame.
    pub fn open(&self) -> Request {
        Request::SetTarget
    }

    /// Starts the next polling cycle.
    pub fn restart(&mut self) -> Request {
        self.request(Request::DcInfo)
    }

    pub fn is_locked(&self) -> bool {
        self.synchronizer.is_locked()
    }

    pub fn scales(&self) -> &ScaleTable {
        &self.scales
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn pending(&self) -> Option<Request> {
        self.pending
    }

    /// Pulls the next verified frame out of `src`. Framing errors are recorded
    /// here and reported as `Err` so the caller can keep decoding.
    pub fn next_frame(&mut self, src: &mut BytesMut) -> Result<Option<RawFrame>, FrameError> {
        self.synchronizer.decode(src).map_err(|e| self.fail(e))
    }

    /// Like `next_frame`, once the stream has ended.
    pub fn last_frame(&mut self, src: &mut BytesMut) -> Result<Option<RawFrame>, FrameError> {
        self.synchronizer.decode_eof(src).map_err(|e| self.fail(e))
    }

    /// Records an error against the current snapshot and gives up on the
    /// outstanding request, which was either never written or whose answer
    /// may have been lost with the bad bytes. Read side errors also drop
    /// frame lock. The next version frame picks polling up again.
    pub fn record_error(&mut self, err: FrameError) {
        warn!("{}", err);
        if err.breaks_lock() {
            self.synchronizer.unlock();
        }
        self.pending = None;
        self.snapshot.add_error(err);
    }

    fn fail(&mut self, err: FrameError) -> FrameError {
        self.record_error(err.clone());
        err
    }

    /// Hands out the finished snapshot and starts a new one. Once the unit
    /// has identified itself, new snapshots start out valid.
    pub fn take_snapshot(&mut self) -> Snapshot {
        let fresh = Snapshot {
            valid: self.version.is_some(),
            version: self.version.unwrap_or_default(),
            ..Default::default()
        };

        let mut snapshot = std::mem::replace(&mut self.snapshot, fresh);
        snapshot.timestamp = chrono::Utc::now();
        snapshot
    }

    fn request(&mut self, request: Request) -> Request {
        self.pending = Some(request);
        self.versions_waited = 0;
        request
    }

    fn send(&mut self, request: Request) -> Option<Action> {
        Some(Action::Send(self.request(request)))
    }

    /// Decodes a verified frame into the current snapshot and says what to do
    /// next. Frames we don't understand, or didn't ask for, are ignored.
    pub fn handle_frame(&mut self, raw: &RawFrame) -> Option<Action> {
        trace!("frame {:02x?}", raw.bytes());

        let frame = match Parser::parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("ignoring frame: {}", e);
                return None;
            }
        };

        let expected = match (&frame, self.pending) {
            (Frame::Version(_), _) => true,
            (Frame::ScaleInfo(_), Some(Request::ScaleInfo(_))) => true,
            (Frame::DcInfo(_), Some(Request::DcInfo)) => true,
            (Frame::AcInfo(_), Some(Request::AcInfo)) => true,
            (Frame::Led { .. }, Some(Request::Led)) => true,
            (Frame::RamVar(_), Some(Request::ChargeState)) => true,
            (Frame::Unknown { header, kind }, _) => {
                debug!("ignoring frame {:#04x}/{:#04x}", header, kind);
                return None;
            }
            _ => false,
        };
        if !expected {
            debug!("ignoring unrequested {:?} (pending {:?})", frame, self.pending);
            return None;
        }

        match frame {
            Frame::Version(version) => self.version_decode(version),
            Frame::ScaleInfo(meta) => self.scale_decode(&meta),
            Frame::DcInfo(dc) => self.dc_decode(&dc),
            Frame::AcInfo(ac) => self.ac_decode(&ac),
            Frame::Led { on, blink } => self.led_decode(on, blink),
            Frame::RamVar(value) => self.state_decode(value),
            Frame::Unknown { .. } => None,
        }
    }

    fn version_decode(&mut self, version: u32) -> Option<Action> {
        debug!("version {}", version);
        self.version = Some(version);
        self.snapshot.version = version;
        self.snapshot.valid = self.snapshot.errors.is_empty();

        if let Some(request) = self.pending {
            self.versions_waited += 1;
            if self.versions_waited < Self::STALE_AFTER_VERSIONS {
                return None;
            }
            debug!("no answer to {:?}, asking again", request);
            return self.send(request);
        }

        match self.scales.next_channel() {
            Some(channel) => {
                info!("Get scaling factors.");
                self.send(Request::ScaleInfo(channel))
            }
            None => self.send(Request::DcInfo),
        }
    }

    fn scale_decode(&mut self, meta: &[u8]) -> Option<Action> {
        let entry = ScaleEntry::from_metadata(meta);
        if !entry.supported {
            warn!("Skipping scaling factors for: {}", self.scales.len());
        }
        debug!("scale {}: {:?}", self.scales.len(), entry);

        if let Err(e) = self.scales.push(entry) {
            debug!("ignoring scale response: {}", e);
            self.pending = None;
            return None;
        }

        match self.scales.next_channel() {
            Some(channel) => self.send(Request::ScaleInfo(channel)),
            None => {
                info!("Monitoring starting.");
                self.send(Request::DcInfo)
            }
        }
    }

    fn dc_decode(&mut self, dc: &DcInfo) -> Option<Action> {
        let s = &self.scales;

        self.snapshot.bat_voltage = s.apply_scale_and_sign(RamVar::VBat, dc.bat_voltage);

        let discharge = s.apply_scale(RamVar::IBat, dc.discharge_counter as f64);
        let charge = s.apply_scale(RamVar::IBat, dc.charge_counter as f64);
        self.snapshot.bat_current = discharge - charge;

        self.snapshot.out_frequency = s.frequency(RamVar::InverterPeriod, dc.inverter_period);

        debug!("dc decode {:?}", dc);
        self.send(Request::AcInfo)
    }

    fn ac_decode(&mut self, ac: &AcInfo) -> Option<Action> {
        let s = &self.scales;

        self.snapshot.in_voltage = s.apply_scale_and_sign(RamVar::VMains, ac.mains_voltage);
        self.snapshot.in_current = s.apply_scale_and_sign(RamVar::IMains, ac.mains_current);
        self.snapshot.out_voltage = s.apply_scale_and_sign(RamVar::VInverter, ac.inverter_voltage);
        self.snapshot.out_current = s.apply_scale_and_sign(RamVar::IInverter, ac.inverter_current);

        self.snapshot.in_frequency = if ac.mains_period == AcInfo::NO_MAINS {
            0.0
        } else {
            s.frequency(RamVar::MainPeriod, ac.mains_period)
        };

        debug!("ac decode {:?}", ac);
        self.send(Request::Led)
    }

    fn led_decode(&mut self, on: u8, blink: u8) -> Option<Action> {
        self.snapshot.leds = led_states(on, blink);
        self.send(Request::ChargeState)
    }

    fn state_decode(&mut self, value: u16) -> Option<Action> {
        self.snapshot.charge_state = self.scales.apply_scale_and_sign(RamVar::ChargeState, value);
        debug!("charge state {}", self.snapshot.charge_state);
        self.pending = None;
        Some(Action::Publish)
    }
}
