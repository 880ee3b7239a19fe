use crate::prelude::*;

/// Logs every valid snapshot it receives in human readable form. The full
/// snapshot is also dumped as JSON at debug level.
pub struct Reporter {
    snapshots: mpsc::Receiver<Snapshot>,
}

impl Reporter {
    pub fn new(snapshots: mpsc::Receiver<Snapshot>) -> Self {
        Self { snapshots }
    }

    pub async fn start(mut self) -> Result<()> {
        while let Some(snapshot) = self.snapshots.recv().await {
            if !snapshot.valid {
                debug!("skipping invalid snapshot ({} errors)", snapshot.errors.len());
                continue;
            }

            info!("System Info:\n{}", Self::format(&snapshot));

            if log::log_enabled!(log::Level::Debug) {
                debug!("{}", serde_json::to_string(&snapshot)?);
            }
        }

        info!("reporter exiting");
        Ok(())
    }

    pub fn format(s: &Snapshot) -> String {
        let leds = |state: LedState| -> String {
            Led::ALL
                .iter()
                .filter(|led| s.led(**led) == state)
                .map(|led| format!(" {}", led))
                .collect()
        };
        let errors: String = s.errors.iter().map(|e| format!(" {}", e)).collect();

        [
            format!("Version: {}", s.version),
            format!("Bat Volt: {:.2}V Bat Cur: {:.2}A", s.bat_voltage, s.bat_current),
            format!(
                "In Volt: {:.2}V In Cur: {:.2}A In Freq {:.2}Hz",
                s.in_voltage, s.in_current, s.in_frequency
            ),
            format!(
                "Out Volt: {:.2}V Out Cur: {:.2}A Out Freq {:.2}Hz",
                s.out_voltage, s.out_current, s.out_frequency
            ),
            format!("In Power {:.2}W Out Power {:.2}W", s.in_power(), s.out_power()),
            format!("Charge State: {:.2}%", s.charge_state * 100.0),
            format!("LEDs on:{}", leds(LedState::On)),
            format!("LEDs blink:{}", leds(LedState::Blink)),
            format!("Errors:{}", errors),
        ]
        .join("\n")
    }
}
