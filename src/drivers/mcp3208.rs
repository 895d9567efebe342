//! MCP3208: 12-bit, 8-input SPI analog-to-digital converter.
//!
//! The request is three bytes: the start bit and single-ended flag with the
//! channel high bit in byte one, the channel low bits shifted into the top of
//! byte two, and a trailing don't-care byte. Three bytes come back; the low
//! nibble of the second and the whole third byte form the 12-bit result.

use crate::bus::{Bus, BusError, SpiHandle};
use crate::driver::{Channel, Driver, DriverError, Reading};
use log::warn;
use serde::Deserialize;

/// Full-scale divisor of the raw-to-volts conversion. The controller has
/// always scaled against 4095; the field on [`Mcp3208`] keeps it overridable
/// so the alternative 4096 scale can be exercised without touching the driver.
pub const DEFAULT_FULL_SCALE: f64 = 4095.0;

const FRAME_START: u8 = 0b0000_0100;
const FRAME_SINGLE_ENDED: u8 = 0b0000_0010;

/// SPI parameters carried in the hardware record's init string, e.g.
/// `{"channel": 0, "baud": 50000, "flags": 0}`. `channel` selects the
/// slave-select line (CE0/CE1), not an analog input.
#[derive(Debug, Deserialize)]
struct SpiInit {
    channel: u8,
    #[serde(default = "default_baud")]
    baud: u32,
    #[serde(default)]
    flags: u32,
}

fn default_baud() -> u32 {
    50_000
}

#[derive(Debug)]
pub struct Mcp3208 {
    bus: Bus,
    handle: Option<SpiHandle>,
    pub full_scale: f64,
}

impl Mcp3208 {
    pub fn new(bus: &Bus, init: &str) -> Result<Self, DriverError> {
        let mut deserializer = serde_json::Deserializer::from_str(init);
        let spi: SpiInit = serde_path_to_error::deserialize(&mut deserializer)
            .map_err(|e| DriverError::BadInit(format!("spi parameters: {}", e)))?;
        let handle = match bus {
            Bus::Live(port) => Some(port.open(spi.channel, spi.baud, spi.flags)?),
            Bus::Simulated => None,
        };
        Ok(Mcp3208 {
            bus: bus.clone(),
            handle,
            full_scale: DEFAULT_FULL_SCALE,
        })
    }

    /// Request frame for one single-ended input in 0..=7.
    pub fn request_frame(input: u8) -> [u8; 3] {
        [
            FRAME_START | FRAME_SINGLE_ENDED | (input >> 2),
            (input & 0b11) << 6,
            0,
        ]
    }

    /// Assemble the 12-bit result from a received frame.
    pub fn decode(rx: &[u8]) -> Result<u16, DriverError> {
        if rx.len() < 3 {
            return Err(DriverError::BadReading(format!(
                "expected 3 bytes from the converter, got {}",
                rx.len()
            )));
        }
        Ok((u16::from(rx[1] & 0x0F) << 8) | u16::from(rx[2]))
    }
}

impl Driver for Mcp3208 {
    fn family(&self) -> &'static str {
        "MCP3208"
    }

    fn read(&mut self, channel: Channel, param: f64) -> Result<Reading, DriverError> {
        let input = match channel {
            Channel::Analog(n) if n <= 7 => n,
            other => return Err(DriverError::BadChannel(other)),
        };
        let rx = match &self.bus {
            Bus::Simulated => return Ok(Reading::ZERO),
            Bus::Live(port) => {
                let handle = self.handle.ok_or(DriverError::Bus(BusError::Closed))?;
                port.transfer(handle, &Self::request_frame(input))?
            }
        };
        let raw = Self::decode(&rx)?;
        Ok(Reading {
            raw: f64::from(raw),
            value: f64::from(raw) * param / self.full_scale,
        })
    }

    fn write(&mut self, _value: f64) -> Result<(), DriverError> {
        // 12-bit ADC: read-only IC.
        Err(DriverError::NotSupported)
    }

    fn cleanup(&mut self) {
        if let (Bus::Live(port), Some(handle)) = (&self.bus, self.handle.take()) {
            if let Err(e) = port.close(handle) {
                warn!("MCP3208: closing SPI handle failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::fake::ScriptedPort;

    const INIT: &str = r#"{"channel": 0, "baud": 50000, "flags": 0}"#;

    #[test]
    fn request_frame_packs_channel_bits() {
        assert_eq!(Mcp3208::request_frame(3), [0b0000_0110, 0b1100_0000, 0]);
        assert_eq!(Mcp3208::request_frame(0), [0b0000_0110, 0b0000_0000, 0]);
        assert_eq!(Mcp3208::request_frame(7), [0b0000_0111, 0b1100_0000, 0]);
    }

    #[test]
    fn live_read_decodes_and_scales_against_vref() {
        let port = ScriptedPort::with_responses(vec![vec![0, 0x01, 0x00]]);
        let bus = Bus::Live(port.clone());
        let mut adc = Mcp3208::new(&bus, INIT).unwrap();

        let reading = adc.read(Channel::Analog(3), 3.3).unwrap();
        assert_eq!(reading.raw, 256.0);
        assert_eq!(reading.value, 256.0 * 3.3 / 4095.0);
        assert_eq!(port.sent.lock().unwrap()[0], vec![0b0000_0110, 0b1100_0000, 0]);
        assert_eq!(port.opened.lock().unwrap()[0], (0, 50_000, 0));
    }

    #[test]
    fn full_scale_divisor_is_overridable() {
        let port = ScriptedPort::with_responses(vec![vec![0, 0x01, 0x00]]);
        let mut adc = Mcp3208::new(&Bus::Live(port), INIT).unwrap();
        adc.full_scale = 4096.0;
        let reading = adc.read(Channel::Analog(0), 3.3).unwrap();
        assert_eq!(reading.value, 256.0 * 3.3 / 4096.0);
    }

    #[test]
    fn simulated_reads_report_zero_on_every_input() {
        let mut adc = Mcp3208::new(&Bus::Simulated, INIT).unwrap();
        for input in 0..8 {
            assert_eq!(adc.read(Channel::Analog(input), 3.3).unwrap(), Reading::ZERO);
        }
    }

    #[test]
    fn out_of_range_or_wrong_kind_channels_are_rejected() {
        let mut adc = Mcp3208::new(&Bus::Simulated, INIT).unwrap();
        assert!(matches!(
            adc.read(Channel::Analog(8), 3.3),
            Err(DriverError::BadChannel(Channel::Analog(8)))
        ));
        assert!(matches!(
            adc.read(Channel::Humidity, 3.3),
            Err(DriverError::BadChannel(Channel::Humidity))
        ));
    }

    #[test]
    fn write_is_not_supported() {
        let mut adc = Mcp3208::new(&Bus::Simulated, INIT).unwrap();
        assert!(matches!(adc.write(1.0), Err(DriverError::NotSupported)));
    }

    #[test]
    fn bad_init_json_names_the_offending_field() {
        let err = Mcp3208::new(&Bus::Simulated, r#"{"channel": "zero"}"#).unwrap_err();
        match err {
            DriverError::BadInit(message) => assert!(message.contains("channel"), "{}", message),
            other => panic!("expected BadInit, got {:?}", other),
        }
    }

    #[test]
    fn cleanup_closes_the_handle_once() {
        let port = ScriptedPort::with_responses(vec![]);
        let mut adc = Mcp3208::new(&Bus::Live(port.clone()), INIT).unwrap();
        adc.cleanup();
        adc.cleanup();
        assert_eq!(port.closed.lock().unwrap().len(), 1);
        assert!(matches!(
            adc.read(Channel::Analog(0), 3.3),
            Err(DriverError::Bus(BusError::Closed))
        ));
    }
}
