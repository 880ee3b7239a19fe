use crate::prelude::*;

use bytes::BytesMut;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

use super::command::{CommandFrameFactory, Request};
use super::driver::{Action, Driver};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ChannelData {
    /// A complete, checksummed frame to write out as is
    Command(Vec<u8>),
    Shutdown,
}
pub type Sender = broadcast::Sender<ChannelData>;
pub type Receiver = broadcast::Receiver<ChannelData>;

const CONTROL_CAPACITY: usize = 2048;
const READ_BUFFER_SIZE: usize = 512;
const WRITE_TIMEOUT_SECS: u64 = 5; // Timeout for write operations
const RETRY_DELAY_SECS: u64 = 1; // Pause after a read error while unlocked
const CLOSE_TIMEOUT_SECS: u64 = 5; // How long close() waits for the worker

/// Handle to the worker task driving one MK2 link.
///
/// The worker owns the stream and all protocol state. This handle only talks
/// to it over the control channel; snapshots come back on the receiver
/// returned by `open`.
pub struct Connection {
    to_worker: Sender,
    handle: JoinHandle<()>,
}

impl Connection {
    /// Takes over an already open stream, starts the worker and kicks off the
    /// handshake. Must be called from within a tokio runtime.
    ///
    /// The snapshot channel holds a single snapshot. Snapshots published while
    /// it is full are dropped, so a slow consumer always sees recent data and
    /// never stalls the link.
    pub fn open<S>(stream: S) -> (Self, mpsc::Receiver<Snapshot>)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (to_worker, control) = broadcast::channel(CONTROL_CAPACITY);
        let (snapshots_tx, snapshots_rx) = mpsc::channel(1);

        let worker = Worker::new(stream, control, snapshots_tx);
        let handle = tokio::spawn(worker.run());

        (Self { to_worker, handle }, snapshots_rx)
    }

    /// Frames `payload` as a command and queues it for the worker. The payload
    /// is not interpreted.
    pub fn send_command(&self, payload: Vec<u8>) -> Result<()> {
        let frame = CommandFrameFactory::build(&payload)?;

        if self.to_worker.send(ChannelData::Command(frame)).is_err() {
            bail!("send(to_worker) failed - connection closed?");
        }

        Ok(())
    }

    /// Stops the worker and releases the stream.
    pub async fn close(self) {
        let _ = self.to_worker.send(ChannelData::Shutdown);

        let mut handle = self.handle;
        match tokio::time::timeout(Duration::from_secs(CLOSE_TIMEOUT_SECS), &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("connection worker failed: {}", e),
            Err(_) => {
                warn!(
                    "connection worker still running after {}s, aborting",
                    CLOSE_TIMEOUT_SECS
                );
                handle.abort();
            }
        }
    }
}

struct Worker<S> {
    reader: ReadHalf<S>,
    writer: WriteHalf<S>,
    control: Receiver,
    snapshots: mpsc::Sender<Snapshot>,
    driver: Driver,
    buf: BytesMut,
}

impl<S> Worker<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    fn new(stream: S, control: Receiver, snapshots: mpsc::Sender<Snapshot>) -> Self {
        let (reader, writer) = tokio::io::split(stream);

        Self {
            reader,
            writer,
            control,
            snapshots,
            driver: Driver::new(),
            buf: BytesMut::with_capacity(READ_BUFFER_SIZE),
        }
    }

    async fn run(mut self) {
        let request = self.driver.open();
        self.send(request).await;

        let mut backoff = false;

        loop {
            tokio::select! {
                biased;

                msg = self.control.recv() => {
                    match msg {
                        Ok(ChannelData::Command(frame)) => self.write(&frame).await,
                        Ok(ChannelData::Shutdown) => {
                            info!("connection received shutdown signal");
                            break;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("connection lagged, {} commands dropped", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }

                _ = tokio::time::sleep(Duration::from_secs(RETRY_DELAY_SECS)), if backoff => {
                    backoff = false;
                }

                r = self.reader.read_buf(&mut self.buf), if !backoff => {
                    match r {
                        Ok(0) => {
                            backoff = self.read_failed(FrameError::TransportRead(
                                "end of stream".to_string(),
                            )).await;
                        }
                        Ok(_) => self.process(false).await,
                        Err(e) => backoff = self.read_failed(e.into()).await,
                    }
                }
            }
        }

        info!("connection closed");
    }

    /// Drains whatever is left in the buffer, records the error and says
    /// whether to pause before reading again.
    async fn read_failed(&mut self, err: FrameError) -> bool {
        self.process(true).await;

        let was_locked = self.driver.is_locked();
        self.driver.record_error(err);

        !was_locked
    }

    async fn process(&mut self, eof: bool) {
        loop {
            let next = if eof {
                self.driver.last_frame(&mut self.buf)
            } else {
                self.driver.next_frame(&mut self.buf)
            };

            match next {
                Ok(Some(frame)) => {
                    if let Some(action) = self.driver.handle_frame(&frame) {
                        self.act(action).await;
                    }
                }
                Ok(None) => break,
                Err(_) => {} // recorded by the driver, keep scanning
            }
        }
    }

    async fn act(&mut self, action: Action) {
        match action {
            Action::Send(request) => self.send(request).await,
            Action::Publish => {
                self.publish();
                let request = self.driver.restart();
                self.send(request).await;
            }
        }
    }

    fn publish(&mut self) {
        let snapshot = self.driver.take_snapshot();
        if let Err(e) = self.snapshots.try_send(snapshot) {
            debug!("snapshot dropped: {}", e);
        }
    }

    async fn send(&mut self, request: Request) {
        debug!("tx {:?}", request);
        self.write(&request.frame()).await;
    }

    async fn write(&mut self, frame: &[u8]) {
        trace!("tx {:02x?}", frame);

        let writer = &mut self.writer;
        let r = tokio::time::timeout(Duration::from_secs(WRITE_TIMEOUT_SECS), async {
            writer.write_all(frame).await?;
            writer.flush().await?;
            Ok::<_, std::io::Error>(())
        })
        .await;

        let reason = match r {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("write timeout after {} seconds", WRITE_TIMEOUT_SECS),
        };

        self.driver.record_error(FrameError::TransportWrite(reason));
    }
}
