use clap::Parser;
use std::path::PathBuf;

use crate::settings::BridgeSettings;

/// sdapi-compatible REST bridge in front of an asynchronous job engine
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to bind (default: 127.0.0.1)
    #[arg(long = "host", value_name = "ADDR")]
    pub host: Option<String>,

    /// Port to bind (default: 7860, 0 picks a free one)
    #[arg(short = 'p', long = "port", value_name = "PORT")]
    pub port: Option<u16>,

    /// Add permissive CORS headers to every response
    #[arg(long = "cors")]
    pub cors: bool,

    /// Log request and response bodies at info level (images truncated)
    #[arg(long = "verbose-bodies")]
    pub verbose_bodies: bool,

    /// Job type submissions are routed to
    #[arg(long = "job-type", value_name = "TYPE")]
    pub job_type: Option<String>,

    /// Owner identifier attached to each submission
    #[arg(long = "job-owner", value_name = "ID")]
    pub job_owner: Option<String>,

    /// Progress steps per loopback job
    #[arg(long = "steps", value_name = "N")]
    pub steps: Option<u32>,

    /// Delay between loopback progress steps in milliseconds
    #[arg(long = "step-delay-ms", value_name = "MS")]
    pub step_delay_ms: Option<u64>,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Settings file (default: <config dir>/sdapi-bridge.json)
    #[arg(short = 's', long = "settings", value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Write the effective settings back to the settings file
    #[arg(long = "save-settings")]
    pub save_settings: bool,

    /// Enable logging to file (default: sdapi-bridge.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
}

impl Args {
    /// Overlay command-line values on `settings`. Flags only ever switch things on.
    pub fn apply_to(&self, settings: &mut BridgeSettings) {
        let bridge = &mut settings.bridge;
        if let Some(host) = &self.host {
            bridge.address = host.clone();
        }
        if let Some(port) = self.port {
            bridge.port = port;
        }
        bridge.cors |= self.cors;
        bridge.verbose |= self.verbose_bodies;
        if let Some(job_type) = &self.job_type {
            bridge.job_type = job_type.clone();
        }
        if let Some(job_owner) = &self.job_owner {
            bridge.job_owner = job_owner.clone();
        }
        if let Some(steps) = self.steps {
            settings.steps = steps;
        }
        if let Some(delay) = self.step_delay_ms {
            settings.step_delay_ms = delay;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "sdapi-bridge", "--host", "0.0.0.0", "-p", "7861", "--cors", "-vv", "--log",
        ])
        .unwrap();
        assert_eq!(args.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(args.port, Some(7861));
        assert!(args.cors);
        assert_eq!(args.verbosity, 2);
        assert_eq!(args.log_file, Some(None));
    }

    #[test]
    fn test_cli_overrides_file_values() {
        let mut settings = BridgeSettings::default();
        settings.bridge.cors = true;
        settings.steps = 3;

        let args = Args::try_parse_from(["sdapi-bridge", "--port", "9000", "--job-owner", "17", "--steps", "8"])
            .unwrap();
        args.apply_to(&mut settings);

        assert_eq!(settings.bridge.port, 9000);
        assert_eq!(settings.bridge.job_owner, "17");
        assert_eq!(settings.steps, 8);
        assert!(settings.bridge.cors, "absent flag keeps file value");
        assert_eq!(settings.bridge.address, "127.0.0.1");
    }
}
