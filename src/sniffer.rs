//! Watches what the controller sends back for coolant commands,
//! so the air-assist valve follows the job.

use crate::{
    air::{AirAssist, Reason},
    serial::SerialMessage,
};

/// What a line asks of the valve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AirCommand {
    /// M7 (mist) or M8 (flood).
    On,

    /// M9 (coolant off).
    Off,
}

impl AirCommand {
    /// Match on the first two characters, ignoring case.
    ///
    /// Anything following is ignored, so `M92` reads as `M9` too.
    pub fn parse(line: &str) -> Option<Self> {
        let upper = line.to_ascii_uppercase();

        if upper.starts_with("M7") || upper.starts_with("M8") {
            Some(Self::On)
        } else if upper.starts_with("M9") {
            Some(Self::Off)
        } else {
            None
        }
    }
}

/// Applies [`AirCommand`]s found in serial traffic.
#[derive(Debug, Clone)]
pub struct Sniffer {
    air: AirAssist,
}

impl Sniffer {
    /// Sniff on behalf of `air`.
    pub fn new(air: AirAssist) -> Self {
        Self { air }
    }

    /// Look at one line read from the controller.
    /// The line itself is not changed, the caller forwards it as-is.
    pub async fn inspect(&self, line: &SerialMessage) {
        if !self.air.is_enabled() || self.air.is_forced() {
            return;
        }

        match AirCommand::parse(line.as_str()) {
            Some(AirCommand::On) => self.air.set(true, Reason::M8).await,
            Some(AirCommand::Off) => self.air.set(false, Reason::M9).await,
            None => {}
        }
    }
}
