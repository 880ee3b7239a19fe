use crate::prelude::*;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

// {{{ Led
/// Front panel indicators, in bit order of the LED masks.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub enum Led {
    #[serde(rename = "led_mains")]
    Mains,
    #[serde(rename = "led_absorb")]
    Absorption,
    #[serde(rename = "led_bulk")]
    Bulk,
    #[serde(rename = "led_float")]
    Float,
    #[serde(rename = "led_inverter")]
    Inverter,
    #[serde(rename = "led_overload")]
    Overload,
    #[serde(rename = "led_bat_low")]
    LowBattery,
    #[serde(rename = "led_over_temp")]
    Temperature,
}

impl Led {
    pub const ALL: [Led; 8] = [
        Led::Mains,
        Led::Absorption,
        Led::Bulk,
        Led::Float,
        Led::Inverter,
        Led::Overload,
        Led::LowBattery,
        Led::Temperature,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Led::Mains => "led_mains",
            Led::Absorption => "led_absorb",
            Led::Bulk => "led_bulk",
            Led::Float => "led_float",
            Led::Inverter => "led_inverter",
            Led::Overload => "led_overload",
            Led::LowBattery => "led_bat_low",
            Led::Temperature => "led_over_temp",
        }
    }
}

impl std::fmt::Display for Led {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
// }}}

// {{{ LedState
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LedState {
    #[default]
    Off,
    On,
    Blink,
}

impl std::fmt::Display for LedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LedState::Off => "off",
            LedState::On => "on",
            LedState::Blink => "blink",
        };
        write!(f, "{}", s)
    }
}

/// Expands the on and blink masks into a state for every LED. On wins over
/// blink.
pub fn led_states(on: u8, blink: u8) -> BTreeMap<Led, LedState> {
    Led::ALL
        .iter()
        .enumerate()
        .map(|(bit, led)| {
            let state = if (on >> bit) & 1 == 1 {
                LedState::On
            } else if (blink >> bit) & 1 == 1 {
                LedState::Blink
            } else {
                LedState::Off
            };
            (*led, state)
        })
        .collect()
}
// }}}

/// One full polling cycle worth of decoded telemetry.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    /// Cleared as soon as any error is seen while this snapshot is assembled
    pub valid: bool,
    pub version: u32,

    pub bat_voltage: f64,
    /// positive while charging
    pub bat_current: f64,

    pub in_voltage: f64,
    pub in_current: f64,
    pub in_frequency: f64,

    pub out_voltage: f64,
    pub out_current: f64,
    pub out_frequency: f64,

    /// 0.0 to 1.0
    pub charge_state: f64,

    pub leds: BTreeMap<Led, LedState>,
    pub errors: Vec<FrameError>,

    pub timestamp: DateTime<Utc>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            valid: false,
            version: 0,
            bat_voltage: 0.0,
            bat_current: 0.0,
            in_voltage: 0.0,
            in_current: 0.0,
            in_frequency: 0.0,
            out_voltage: 0.0,
            out_current: 0.0,
            out_frequency: 0.0,
            charge_state: 0.0,
            leds: BTreeMap::new(),
            errors: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

impl Snapshot {
    // a dead link would otherwise grow this forever between publishes
    const MAX_ERRORS: usize = 32;

    pub fn add_error(&mut self, err: FrameError) {
        if self.errors.len() >= Self::MAX_ERRORS {
            self.errors.remove(0);
        }
        self.errors.push(err);
        self.valid = false;
    }

    pub fn in_power(&self) -> f64 {
        self.in_voltage * self.in_current
    }

    pub fn out_power(&self) -> f64 {
        self.out_voltage * self.out_current
    }

    pub fn led(&self, led: Led) -> LedState {
        self.leds.get(&led).copied().unwrap_or_default()
    }
}
