#![allow(dead_code)]

use mk2_bridge::mk2::frame::encode;
use mk2_bridge::prelude::*;

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};

pub fn common_setup() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::max())
        .is_test(true)
        .try_init();
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {}, got {}",
        expected,
        actual
    );
}

/// Frames as a Multiplus would send them.
pub struct Factory;
impl Factory {
    pub const VERSION: u32 = 0x0011_db24;

    pub fn version() -> Vec<u8> {
        let v = Self::VERSION.to_le_bytes();
        encode(0xff, &[0x56, v[0], v[1], v[2], v[3], 0x00])
    }

    pub fn scale(raw_scale: i16, raw_offset: i16) -> Vec<u8> {
        let s = raw_scale.to_le_bytes();
        let o = raw_offset.to_le_bytes();
        encode(0xff, &[0x57, 0x8e, s[0], s[1], 0x8f, o[0], o[1]])
    }

    /// 1/100 for voltages and currents (currents signed), 1/1000 for periods,
    /// 1/200 for the charge state.
    pub fn scales() -> Vec<(i16, i16)> {
        vec![
            (0x7f9c, 0),
            (-0x7f9c, 0),
            (0x7f9c, 0),
            (-0x7f9c, 0),
            (0x7f9c, 0),
            (-0x7f9c, 0),
            (1, 0),
            (0x7c18, 0),
            (0x7c18, 0),
            (1, 0),
            (1, 0),
            (1, 0),
            (1, 0),
            (0x7f38, 0),
        ]
    }

    /// 26.5V, 10.0 discharged, 12.5 charged, 50Hz out
    pub fn dc_info() -> Vec<u8> {
        encode(
            0x20,
            &[
                0x00, 0x00, 0x00, 0x00, 0x0c, 0x5a, 0x0a, 0xe8, 0x03, 0x00, 0xe2, 0x04, 0x00, 0xc8,
            ],
        )
    }

    /// 230.1V 2.3A in at `mains_period`, 230.0V -2.0A out
    pub fn ac_info(mains_period: u8) -> Vec<u8> {
        encode(
            0x20,
            &[
                0x00, 0x00, 0x00, 0x00, 0x08, 0xe2, 0x59, 0xe6, 0x00, 0xd8, 0x59, 0x38, 0xff,
                mains_period,
            ],
        )
    }

    pub fn led(on: u8, blink: u8) -> Vec<u8> {
        encode(0xff, &[0x4c, on, blink])
    }

    /// 100/200 = 50%
    pub fn charge_state() -> Vec<u8> {
        encode(0xff, &[0x57, 0x85, 100, 0x00])
    }
}

/// The far end of a duplex pipe, playing the inverter.
pub struct FakeInverter {
    stream: DuplexStream,
}

impl FakeInverter {
    const TIMEOUT_SECS: u64 = 5;

    pub fn new(stream: DuplexStream) -> Self {
        Self { stream }
    }

    /// Reads one command frame.
    pub async fn next_command(&mut self) -> Result<Vec<u8>> {
        let read = async {
            let len = self.stream.read_u8().await?;
            let mut frame = vec![0u8; len as usize + 2];
            frame[0] = len;
            self.stream.read_exact(&mut frame[1..]).await?;
            Ok::<_, std::io::Error>(frame)
        };

        Ok(tokio::time::timeout(Duration::from_secs(Self::TIMEOUT_SECS), read).await??)
    }

    pub async fn reply(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Answers the set-target command, the version frame and all scale
    /// requests, leaving the first DC info request pending.
    pub async fn handshake(&mut self) -> Result<()> {
        use mk2_bridge::mk2::command::Request;

        assert_eq!(self.next_command().await?, Request::SetTarget.frame());
        self.reply(&Factory::version()).await?;

        for (channel, (s, o)) in Factory::scales().into_iter().enumerate() {
            assert_eq!(
                self.next_command().await?,
                Request::ScaleInfo(channel as u8).frame()
            );
            self.reply(&Factory::scale(s, o)).await?;
        }

        Ok(())
    }

    /// Answers one DC, AC, LED, charge state round, starting with reading the
    /// DC info request.
    pub async fn cycle(&mut self) -> Result<()> {
        use mk2_bridge::mk2::command::Request;

        assert_eq!(self.next_command().await?, Request::DcInfo.frame());
        self.reply(&Factory::dc_info()).await?;
        assert_eq!(self.next_command().await?, Request::AcInfo.frame());
        self.reply(&Factory::ac_info(0xc8)).await?;
        assert_eq!(self.next_command().await?, Request::Led.frame());
        self.reply(&Factory::led(0x01, 0x08)).await?;
        assert_eq!(self.next_command().await?, Request::ChargeState.frame());
        self.reply(&Factory::charge_state()).await?;

        Ok(())
    }

    /// Waits for the other end to go away, skipping anything still in flight.
    pub async fn closed(&mut self) -> Result<()> {
        let mut buf = [0u8; 64];
        loop {
            let read = self.stream.read(&mut buf);
            match tokio::time::timeout(Duration::from_secs(Self::TIMEOUT_SECS), read).await? {
                Ok(0) | Err(_) => return Ok(()),
                Ok(_) => continue,
            }
        }
    }

    pub fn into_inner(self) -> DuplexStream {
        self.stream
    }
}

/// A link with nothing on the other end: every read is end of stream, every
/// write vanishes. Counts the reads.
pub struct DeadStream {
    reads: Arc<AtomicUsize>,
}

impl DeadStream {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let reads = Arc::new(AtomicUsize::new(0));
        (
            Self {
                reads: reads.clone(),
            },
            reads,
        )
    }
}

impl AsyncRead for DeadStream {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for DeadStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Wraps the host end of a duplex pipe. Setting the returned flag makes the
/// next write fail.
pub struct FlakyStream {
    inner: DuplexStream,
    fail_next_write: Arc<AtomicBool>,
}

impl FlakyStream {
    pub fn new(inner: DuplexStream) -> (Self, Arc<AtomicBool>) {
        let fail_next_write = Arc::new(AtomicBool::new(false));
        (
            Self {
                inner,
                fail_next_write: fail_next_write.clone(),
            },
            fail_next_write,
        )
    }
}

impl AsyncRead for FlakyStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for FlakyStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        if this.fail_next_write.swap(false, Ordering::SeqCst) {
            return Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "cable pulled",
            )));
        }
        Pin::new(&mut this.inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
