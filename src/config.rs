use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{error::Error, relay, server};

/// The air-assist output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirConfig {
    /// If false, the valve is never touched and always reported as off.
    pub enable: bool,

    /// Line number on the SoC's pin controller (BCM numbering on a Raspberry Pi).
    /// The sysfs chip base is added when the pin is opened.
    pub pin: u32,

    /// True if a high level opens the valve.
    pub active_high: bool,

    /// Leave the valve alone entirely, no automatic control.
    /// Useful when something else (e.g. the controller itself) drives it.
    pub override_force: bool,
}

impl Default for AirConfig {
    fn default() -> Self {
        Self {
            enable: false,
            pin: 17,
            active_high: true,
            override_force: false,
        }
    }
}

/// Flow control used on the serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FlowControl {
    /// No flow control.
    #[default]
    None,

    /// XON/XOFF.
    Software,

    /// RTS/CTS.
    Hardware,
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow_control: FlowControl) -> Self {
        match flow_control {
            FlowControl::None => Self::None,
            FlowControl::Software => Self::Software,
            FlowControl::Hardware => Self::Hardware,
        }
    }
}

/// The motion controller's serial port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrblConfig {
    /// Likely "/dev/ttyUSB0", "/dev/ttyACMx" or "COMx".
    pub device: String,

    /// Baud rate.
    pub baud: u32,

    /// See [`FlowControl`].
    pub flow_control: FlowControl,
}

impl Default for GrblConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".into(),
            baud: 115_200,
            flow_control: FlowControl::None,
        }
    }
}

/// The TCP side of the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Port the relay accepts its client on.
    pub tcp_port: u16,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            tcp_port: relay::DEFAULT_PORT,
        }
    }
}

/// The HTTP status API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Port serving `/status`, `/ws` and friends.
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: server::DEFAULT_PORT,
        }
    }
}

/// The configuration used for running the bridge.
///
/// Loaded once at startup, never reloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// See [`AirConfig`].
    pub air: AirConfig,

    /// See [`GrblConfig`].
    pub grbl: GrblConfig,

    /// See [`BridgeConfig`].
    pub bridge: BridgeConfig,

    /// See [`ApiConfig`].
    pub api: ApiConfig,
}

impl Config {
    fn ron() -> ron::Options {
        ron::Options::default()
            .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
            .with_default_extension(ron::extensions::Extensions::UNWRAP_NEWTYPES)
    }

    /// Deserialize a .ron file's contents.
    pub fn deserialize(input: &str) -> Result<Self, Error> {
        Self::ron()
            .from_str::<Config>(input)
            .map_err(|e| Error::BadConfig(format!("Could not parse configuration: {e}")))
    }

    /// An example configuration with some fields filled in.
    pub fn example() -> Self {
        Self {
            air: AirConfig {
                enable: true,
                pin: 17,
                active_high: true,
                override_force: false,
            },
            grbl: GrblConfig {
                device: "/dev/ttyUSB0".into(),
                baud: 115_200,
                flow_control: FlowControl::None,
            },
            ..Default::default()
        }
    }

    /// Serialize the configuration in a "pretty" (i.e. non-compact) fashion.
    pub fn serialize_pretty(&self) -> Result<String, Error> {
        Self::ron()
            .to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Setup a new configuration from a RON file.
    pub fn new_from_path<P: AsRef<Path>>(p: P) -> Result<Self, Error> {
        let s = std::fs::read_to_string(p)?;

        Self::deserialize(&s)
    }

    /// Check the things serde can't.
    pub fn validate(&self) -> Result<(), Error> {
        if self.grbl.device.trim().is_empty() {
            return Err(Error::BadConfig(
                "The serial device path is empty. Please set `grbl.device`.".into(),
            ));
        }

        if self.grbl.baud == 0 {
            return Err(Error::BadConfig(format!(
                "The baud rate of `{}` must be non-zero.",
                self.grbl.device
            )));
        }

        if self.bridge.tcp_port != 0 && self.bridge.tcp_port == self.api.port {
            return Err(Error::BadConfig(format!(
                "The relay and the status API can't share port {}.",
                self.api.port
            )));
        }

        Ok(())
    }
}
