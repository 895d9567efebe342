//! DHT11/DHT22/AM2302 single-wire humidity and temperature ICs.
//!
//! The port owns the wire timing and hands back the five raw bytes the IC
//! signalled; this driver verifies the checksum and decodes them. DHT22 and
//! AM2302 share one encoding (tenths of a unit, sign bit on the temperature
//! high byte); DHT11 reports integral values.

use crate::bus::{Bus, BusError, SpiHandle};
use crate::driver::{Channel, Driver, DriverError, Reading};
use log::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhtModel {
    Dht11,
    Dht22,
    Am2302,
}

impl DhtModel {
    pub fn family(self) -> &'static str {
        match self {
            DhtModel::Dht11 => "DHT11",
            DhtModel::Dht22 => "DHT22",
            DhtModel::Am2302 => "AM2302",
        }
    }
}

/// Decoded frame: relative humidity in percent, temperature in Celsius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DhtReading {
    pub humidity: f64,
    pub temperature: f64,
}

pub struct Dht {
    model: DhtModel,
    bus: Bus,
    pin: u8,
    handle: Option<SpiHandle>,
}

impl Dht {
    /// `init` is the decimal GPIO pin the IC's data line is wired to.
    pub fn new(model: DhtModel, bus: &Bus, init: &str) -> Result<Self, DriverError> {
        let pin = init.trim().parse::<u8>().map_err(|_| {
            DriverError::BadInit(format!(
                "{}: expected a GPIO pin number, got `{}`",
                model.family(),
                init
            ))
        })?;
        let handle = match bus {
            Bus::Live(port) => Some(port.open(pin, 0, 0)?),
            Bus::Simulated => None,
        };
        Ok(Dht {
            model,
            bus: bus.clone(),
            pin,
            handle,
        })
    }

    /// Decode a five-byte frame. The fifth byte must be the low byte of the
    /// sum of the first four.
    pub fn decode(model: DhtModel, frame: &[u8]) -> Result<DhtReading, DriverError> {
        if frame.len() != 5 {
            return Err(DriverError::BadReading(format!(
                "expected a 5-byte frame, got {} byte(s)",
                frame.len()
            )));
        }
        let sum = frame[0]
            .wrapping_add(frame[1])
            .wrapping_add(frame[2])
            .wrapping_add(frame[3]);
        if sum != frame[4] {
            return Err(DriverError::BadReading(format!(
                "checksum mismatch: computed {:#04x}, frame carries {:#04x}",
                sum, frame[4]
            )));
        }
        match model {
            DhtModel::Dht11 => Ok(DhtReading {
                humidity: f64::from(frame[0]),
                temperature: f64::from(frame[2]),
            }),
            DhtModel::Dht22 | DhtModel::Am2302 => {
                let humidity = f64::from(u16::from_be_bytes([frame[0], frame[1]])) / 10.0;
                let magnitude = f64::from(u16::from_be_bytes([frame[2] & 0x7F, frame[3]])) / 10.0;
                let temperature = if frame[2] & 0x80 != 0 { -magnitude } else { magnitude };
                Ok(DhtReading { humidity, temperature })
            }
        }
    }
}

impl Driver for Dht {
    fn family(&self) -> &'static str {
        self.model.family()
    }

    fn read(&mut self, channel: Channel, _param: f64) -> Result<Reading, DriverError> {
        if !matches!(channel, Channel::Temperature | Channel::Humidity) {
            return Err(DriverError::BadChannel(channel));
        }
        let frame = match &self.bus {
            Bus::Simulated => return Ok(Reading::ZERO),
            Bus::Live(port) => {
                let handle = self.handle.ok_or(DriverError::Bus(BusError::Closed))?;
                port.transfer(handle, &[])?
            }
        };
        let decoded = Self::decode(self.model, &frame)?;
        let value = match channel {
            Channel::Humidity => decoded.humidity,
            _ => decoded.temperature,
        };
        // The IC reports calibrated units, so raw and calculated agree.
        Ok(Reading { raw: value, value })
    }

    fn write(&mut self, _value: f64) -> Result<(), DriverError> {
        Err(DriverError::NotSupported)
    }

    fn cleanup(&mut self) {
        if let (Bus::Live(port), Some(handle)) = (&self.bus, self.handle.take()) {
            if let Err(e) = port.close(handle) {
                warn!(
                    "{} on pin {}: closing bus handle failed: {}",
                    self.model.family(),
                    self.pin,
                    e
                );
            }
        }
    }
}
