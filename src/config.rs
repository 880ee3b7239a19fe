use crate::prelude::*;

use serde::Deserialize;
use std::str::FromStr;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default = "Config::default_source")]
    pub source: Source,

    #[serde(default = "Config::default_device")]
    pub device: String,

    #[serde(default = "Config::default_host")]
    pub host: String,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,

    #[serde(default = "Config::default_reporter")]
    pub reporter: Reporter,
}

// Source {{{
/// Where snapshots come from.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// MK2 interface on a local serial device
    Serial,
    /// MK2 interface behind a serial-over-TCP bridge
    Tcp,
    /// Generated values, no hardware needed
    Mock,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Source::Serial => "serial",
            Source::Tcp => "tcp",
            Source::Mock => "mock",
        };
        write!(f, "{}", s)
    }
} // }}}

// Reporter {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Reporter {
    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,
}

impl Reporter {
    pub fn enabled(&self) -> bool {
        self.enabled
    }
} // }}}

impl Config {
    pub fn new(file: String) -> Result<Self> {
        let config = Self::load(&file)?;
        config.log();
        Ok(config)
    }

    /// Reads and validates `file` without logging, for use before the logger
    /// is set up.
    pub fn load(file: &str) -> Result<Self> {
        let content = std::fs::read_to_string(file)
            .map_err(|err| anyhow!("error reading {}: {}", file, err))?;

        Self::from_yaml(&content)
    }

    pub fn log(&self) {
        info!("Configuration loaded successfully:");
        info!("  Source: {}", self.source);
        match self.source {
            Source::Serial => info!("    Device: {}", self.device),
            Source::Tcp => info!("    Host: {}", self.host),
            Source::Mock => {}
        }
        info!("  Reporter: {}", if self.reporter.enabled { "enabled" } else { "disabled" });
        info!("  Log Level: {}", self.loglevel);
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        match self.source {
            Source::Serial => {
                if self.device.is_empty() {
                    bail!("device cannot be empty");
                }
            }
            Source::Tcp => {
                let port = match self.host.rsplit_once(':') {
                    Some((host, port)) if !host.is_empty() => port,
                    _ => bail!("host must be host:port, got {:?}", self.host),
                };
                match port.parse::<u16>() {
                    Ok(p) if p > 0 => {}
                    _ => bail!("host port must be between 1 and 65535, got {:?}", port),
                }
            }
            Source::Mock => {}
        }

        if log::LevelFilter::from_str(&self.loglevel).is_err() {
            bail!("invalid loglevel {:?}", self.loglevel);
        }

        Ok(())
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn loglevel(&self) -> &str {
        &self.loglevel
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    fn default_source() -> Source {
        Source::Serial
    }

    fn default_device() -> String {
        "/dev/ttyUSB0".to_string()
    }

    fn default_host() -> String {
        "localhost:8139".to_string()
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }

    fn default_reporter() -> Reporter {
        Reporter {
            enabled: Self::default_enabled(),
        }
    }

    fn default_enabled() -> bool {
        true
    }
}
