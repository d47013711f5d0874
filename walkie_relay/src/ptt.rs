//! Push-to-talk button and indicator LEDs.
//!
//! The relay reads the button and drives two LEDs, one lit while transmitting,
//! one lit while playing a remote burst. [`SysfsPtt`] does so through the
//! legacy sysfs GPIO interface.

use std::{
    fs,
    io::{self, Read, Seek, SeekFrom, Write},
    path::Path,
    time::Duration,
};

use crate::config::GpioSection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Indicator {
    Transmit,
    Receive,
}

/// Button and indicators, shared by the transmit and receive loops.
///
/// Failures are logged by implementations and never propagated: a stuck LED
/// must not stop audio, and an unreadable button reads as released.
pub trait PttControl: Send + Sync {
    /// `true` while the button is held down.
    fn read_button(&self) -> bool;

    fn set_indicator(&self, indicator: Indicator, on: bool);

    fn indicators_off(&self) {
        self.set_indicator(Indicator::Transmit, false);
        self.set_indicator(Indicator::Receive, false);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GpioError {
    #[error("failed to export pin {pin}: {source}")]
    Export {
        pin: u32,
        #[source]
        source: io::Error,
    },
    #[error("failed to set direction of pin {pin}: {source}")]
    Direction {
        pin: u32,
        #[source]
        source: io::Error,
    },
    #[error("failed to open value of pin {pin}: {source}")]
    Open {
        pin: u32,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy)]
enum PinDirection {
    In,
    Out,
}

impl PinDirection {
    const fn as_str(self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }
}

#[derive(Debug)]
struct Pin {
    number: u32,
    value: fs::File,
}

impl Pin {
    fn open(
        root: &Path,
        number: u32,
        direction: PinDirection,
        export_settle: Duration,
    ) -> Result<Self, GpioError> {
        let pin_dir = root.join(format!("gpio{number}"));

        if !pin_dir.exists() {
            fs::write(root.join("export"), number.to_string())
                .map_err(|source| GpioError::Export { pin: number, source })?;
            // udev needs a moment to hand over the new attribute files
            std::thread::sleep(export_settle);
        }

        fs::write(pin_dir.join("direction"), direction.as_str())
            .map_err(|source| GpioError::Direction { pin: number, source })?;

        let value = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(pin_dir.join("value"))
            .map_err(|source| GpioError::Open { pin: number, source })?;

        Ok(Self { number, value })
    }

    fn read(&self) -> io::Result<bool> {
        let mut file = &self.value;
        file.seek(SeekFrom::Start(0))?;

        let mut level = [0u8];
        file.read_exact(&mut level)?;
        Ok(level[0] == b'1')
    }

    fn write(&self, high: bool) -> io::Result<()> {
        let mut file = &self.value;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(if high { b"1" } else { b"0" })
    }
}

/// Button and LEDs driven through `/sys/class/gpio`.
///
/// Both LEDs are switched off on creation and on drop.
#[derive(Debug)]
pub struct SysfsPtt {
    button: Pin,
    tx_led: Pin,
    rx_led: Pin,
}

impl SysfsPtt {
    pub fn open(config: &GpioSection) -> Result<Self, GpioError> {
        let root = &config.sysfs_root;
        let settle = Duration::from_millis(config.export_settle_ms);

        let ptt = Self {
            button: Pin::open(root, config.ptt_pin, PinDirection::In, settle)?,
            tx_led: Pin::open(root, config.tx_led_pin, PinDirection::Out, settle)?,
            rx_led: Pin::open(root, config.rx_led_pin, PinDirection::Out, settle)?,
        };

        ptt.indicators_off();

        log::info!(
            "GPIO initialized (button {}, TX LED {}, RX LED {})",
            config.ptt_pin,
            config.tx_led_pin,
            config.rx_led_pin
        );

        Ok(ptt)
    }
}

impl PttControl for SysfsPtt {
    fn read_button(&self) -> bool {
        self.button.read().unwrap_or_else(|e| {
            log::debug!("failed to read pin {}: {e}", self.button.number);
            false
        })
    }

    fn set_indicator(&self, indicator: Indicator, on: bool) {
        let pin = match indicator {
            Indicator::Transmit => &self.tx_led,
            Indicator::Receive => &self.rx_led,
        };

        if let Err(e) = pin.write(on) {
            log::warn!("failed to drive pin {}: {e}", pin.number);
        }
    }
}

impl Drop for SysfsPtt {
    fn drop(&mut self) {
        self.indicators_off();
    }
}
