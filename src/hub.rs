use crate::prelude::*;

use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

const REGISTER_CAPACITY: usize = 255;

/// Fans snapshots from one source out to any number of subscribers.
///
/// Each subscriber gets a channel holding one snapshot. A subscriber that is
/// not keeping up misses snapshots rather than holding up the others, and one
/// that has gone away is forgotten on the next publish.
pub struct Hub {
    register: mpsc::Sender<mpsc::Sender<Snapshot>>,
    handle: JoinHandle<()>,
}

impl Hub {
    pub fn new(source: mpsc::Receiver<Snapshot>) -> Self {
        let (register, registrations) = mpsc::channel(REGISTER_CAPACITY);
        let handle = tokio::spawn(Self::run(source, registrations));

        Self { register, handle }
    }

    pub async fn subscribe(&self) -> Result<mpsc::Receiver<Snapshot>> {
        let (tx, rx) = mpsc::channel(1);

        if self.register.send(tx).await.is_err() {
            bail!("send(register) failed - hub stopped?");
        }

        Ok(rx)
    }

    /// Waits until the source closes. Subscribers see their channels close
    /// afterwards.
    pub async fn join(self) {
        let Self { register, handle } = self;
        drop(register);

        if let Err(e) = handle.await {
            warn!("hub task failed: {}", e);
        }
    }

    async fn run(
        mut source: mpsc::Receiver<Snapshot>,
        mut registrations: mpsc::Receiver<mpsc::Sender<Snapshot>>,
    ) {
        let mut subscribers: Vec<mpsc::Sender<Snapshot>> = Vec::new();

        loop {
            tokio::select! {
                biased;

                Some(subscriber) = registrations.recv() => {
                    subscribers.push(subscriber);
                    debug!("{} subscribers", subscribers.len());
                }

                snapshot = source.recv() => {
                    match snapshot {
                        Some(snapshot) => Self::publish(&mut subscribers, snapshot),
                        None => break,
                    }
                }
            }
        }

        debug!("hub source closed");
    }

    fn publish(subscribers: &mut Vec<mpsc::Sender<Snapshot>>, snapshot: Snapshot) {
        subscribers.retain(|subscriber| match subscriber.try_send(snapshot.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("subscriber busy, snapshot dropped");
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!("subscriber gone");
                false
            }
        });
    }
}
