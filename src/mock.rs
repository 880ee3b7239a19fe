use crate::prelude::*;

use std::collections::BTreeMap;
use std::time::Duration;
use tokio::task::JoinHandle;

const INTERVAL_SECS: u64 = 1;

/// Stand-in for a real inverter: publishes a made-up snapshot every second,
/// scaling all values down a little each time and cycling the LEDs through
/// off, on and blink.
pub struct Mock {
    shutdown: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl Mock {
    pub fn open() -> (Self, mpsc::Receiver<Snapshot>) {
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let (tx, rx) = mpsc::channel(1);

        let handle = tokio::spawn(Self::run(tx, shutdown_rx));

        (Self { shutdown, handle }, rx)
    }

    pub async fn close(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.handle.await {
            warn!("mock task failed: {}", e);
        }
    }

    async fn run(snapshots: mpsc::Sender<Snapshot>, mut shutdown: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(Duration::from_secs(INTERVAL_SECS));
        let mut mult = 1.0;
        let mut state = LedState::Off;

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = interval.tick() => {
                    if let Err(e) = snapshots.try_send(Self::snapshot(mult, state)) {
                        debug!("mock snapshot dropped: {}", e);
                    }

                    state = Self::next_state(state);
                    mult = Self::next_mult(mult);
                }
            }
        }

        debug!("mock stopped");
    }

    pub fn snapshot(mult: f64, state: LedState) -> Snapshot {
        let leds: BTreeMap<Led, LedState> = Led::ALL.iter().map(|led| (*led, state)).collect();

        Snapshot {
            valid: true,
            bat_voltage: 25.0 * mult,
            bat_current: -10.0 * mult,
            in_voltage: 230.1 * mult,
            in_current: 2.3 * mult,
            in_frequency: 50.0 * mult,
            out_voltage: 230.0 * mult,
            out_current: 2.0 * mult,
            out_frequency: 50.0 * mult,
            charge_state: mult,
            leds,
            ..Default::default()
        }
    }

    fn next_state(state: LedState) -> LedState {
        match state {
            LedState::Off => LedState::On,
            LedState::On => LedState::Blink,
            LedState::Blink => LedState::Off,
        }
    }

    fn next_mult(mult: f64) -> f64 {
        let next = mult - 0.1;
        if next < 0.0 {
            1.0
        } else {
            next
        }
    }
}
