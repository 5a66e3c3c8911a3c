use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::error::Error;

/// A binary digital output.
pub trait OutputPin: Send + 'static {
    /// Drive the output. `true` is a high level.
    fn write(&mut self, high: bool) -> Result<(), Error>;

    /// Hand the pin back to the system.
    fn release(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// Where the kernel exposes GPIOs.
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// A GPIO driven through the Linux sysfs interface.
///
/// The configured pin is a line offset on the SoC's pin controller (BCM numbering
/// on a Raspberry Pi). Sysfs numbers lines globally, starting at each chip's base,
/// which is not zero on recent kernels.
#[derive(Debug)]
pub struct SysfsPin {
    /// As configured.
    pin: u32,

    /// As sysfs knows it.
    gpio: u32,

    root: PathBuf,
    value: PathBuf,
}

/// A `gpiochipN` directory under the sysfs root.
#[derive(Debug, PartialEq, Eq)]
struct Chip {
    base: u32,
    label: String,
}

impl Chip {
    fn is_pin_controller(&self) -> bool {
        self.label.starts_with("pinctrl-")
    }
}

fn chips(root: &Path) -> Vec<Chip> {
    let Ok(entries) = fs::read_dir(root) else {
        return vec![];
    };

    entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("gpiochip"))
        .filter_map(|entry| {
            let dir = entry.path();
            let base = fs::read_to_string(dir.join("base")).ok()?.trim().parse().ok()?;
            let label = fs::read_to_string(dir.join("label"))
                .map(|label| label.trim().to_owned())
                .unwrap_or_default();

            Some(Chip { base, label })
        })
        .collect()
}

/// The sysfs number of line 0 on the pin controller.
///
/// Prefers a chip labelled as a pin controller, else the lowest base.
/// Without any chips listed, lines are numbered from zero.
pub fn line_base<P: AsRef<Path>>(root: P) -> u32 {
    let chips = chips(root.as_ref());

    chips
        .iter()
        .filter(|chip| chip.is_pin_controller())
        .map(|chip| chip.base)
        .min()
        .or_else(|| chips.iter().map(|chip| chip.base).min())
        .unwrap_or(0)
}

impl SysfsPin {
    /// Export `pin` (if needed) and make it an output.
    pub fn open(pin: u32) -> Result<Self, Error> {
        Self::open_at(SYSFS_GPIO_ROOT, pin)
    }

    /// Like [`SysfsPin::open`], with a different sysfs root.
    pub fn open_at<P: AsRef<Path>>(root: P, pin: u32) -> Result<Self, Error> {
        let root = root.as_ref().to_path_buf();
        let gpio = line_base(&root)
            .checked_add(pin)
            .ok_or_else(|| Error::Gpio {
                pin,
                problem: "pin number out of range".into(),
            })?;
        let dir = root.join(format!("gpio{gpio}"));

        if !dir.exists() {
            debug!(%pin, %gpio, "Exporting GPIO");
            fs::write(root.join("export"), gpio.to_string()).map_err(|e| gpio_error(pin, e))?;
        }

        fs::write(dir.join("direction"), "out").map_err(|e| gpio_error(pin, e))?;

        Ok(Self {
            pin,
            gpio,
            root,
            value: dir.join("value"),
        })
    }
}

fn gpio_error(pin: u32, e: std::io::Error) -> Error {
    Error::Gpio {
        pin,
        problem: e.to_string(),
    }
}

impl OutputPin for SysfsPin {
    fn write(&mut self, high: bool) -> Result<(), Error> {
        fs::write(&self.value, if high { "1" } else { "0" }).map_err(|e| gpio_error(self.pin, e))
    }

    fn release(&mut self) -> Result<(), Error> {
        fs::write(self.root.join("unexport"), self.gpio.to_string())
            .map_err(|e| gpio_error(self.pin, e))
    }
}
