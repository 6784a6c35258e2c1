use crate::warn;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Runtime settings of the flight computer.
///
/// Built once at start-up and handed to the constructors that need it,
/// nothing reads the environment after that.
#[derive(Debug, Clone)]
pub struct FlightConfig {
    /// Base URL of the flight-management server.
    pub server_url: String,
    /// Fixed serial device path. `None` scans for the first USB serial port.
    pub serial_port: Option<String>,
    /// Baud rate of the microcontroller link.
    pub serial_baud: u32,
    /// Minimum duration of one control loop tick.
    pub min_frame_time: Duration,
    /// Length of the launch countdown.
    pub countdown: Duration,
    /// Time after launch at which the parachute is deployed unconditionally.
    pub deploy_delay: Duration,
    /// Name the vessel is registered under.
    pub vessel_name: String,
    /// Starts the actuator bench tester enabled.
    pub hardware_test: bool,
}

impl Default for FlightConfig {
    fn default() -> Self {
        Self {
            server_url: String::from("http://localhost:3000"),
            serial_port: None,
            serial_baud: 9600,
            min_frame_time: Duration::from_millis(10),
            countdown: Duration::from_secs(15),
            deploy_delay: Duration::from_secs(22),
            vessel_name: String::from("Spatula"),
            hardware_test: false,
        }
    }
}

impl FlightConfig {
    /// Reads all `FC_*` variables, falling back to [`FlightConfig::default`]
    /// for missing or unparsable values.
    pub fn from_env() -> Self {
        let def = Self::default();
        Self {
            server_url: env::var("FC_SERVER_URL").unwrap_or(def.server_url),
            serial_port: env::var("FC_SERIAL_PORT").ok().or(def.serial_port),
            serial_baud: parse_var("FC_SERIAL_BAUD").unwrap_or(def.serial_baud),
            min_frame_time: parse_var("FC_FRAME_TIME_MS")
                .map_or(def.min_frame_time, Duration::from_millis),
            countdown: parse_var("FC_COUNTDOWN_S").map_or(def.countdown, Duration::from_secs),
            deploy_delay: parse_var("FC_DEPLOY_DELAY_S")
                .map_or(def.deploy_delay, Duration::from_secs),
            vessel_name: env::var("FC_VESSEL_NAME").unwrap_or(def.vessel_name),
            hardware_test: parse_var("FC_HARDWARE_TEST").unwrap_or(def.hardware_test),
        }
    }
}

fn parse_var<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(val) => Some(val),
        Err(_) => {
            warn!("Ignoring unparsable value {raw:?} for {key}.");
            None
        }
    }
}
