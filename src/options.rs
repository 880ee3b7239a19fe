use clap::Parser;

/// mk2-bridge - reads telemetry from Victron inverters through an MK2 interface
#[derive(Debug, Parser)]
#[clap(author, version)]
pub struct Options {
    /// Config file to read
    #[clap(short = 'c', long = "config", default_value = "config.yaml")]
    pub config_file: String,
}

impl Options {
    pub fn new() -> Self {
        Self::parse()
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_flag() {
        let options = Options::parse_from(["mk2-bridge", "-c", "/etc/mk2.yaml"]);
        assert_eq!(options.config_file, "/etc/mk2.yaml");

        let options = Options::parse_from(["mk2-bridge"]);
        assert_eq!(options.config_file, "config.yaml");
    }
}
