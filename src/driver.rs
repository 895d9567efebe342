//! Uniform driver contract over heterogeneous ICs, and the registry that maps
//! a hardware tag string from the database to the matching driver factory.

use crate::bus::{Bus, BusError};
use crate::drivers::dht::{Dht, DhtModel};
use crate::drivers::ds18b20::Ds18b20;
use crate::drivers::mcp3208::Mcp3208;
use core::fmt;
use log::warn;
use std::collections::BTreeMap;

/// Probe selector within one IC: an ADC input number, or the temperature or
/// humidity side of a combo IC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Analog(u8),
    Temperature,
    Humidity,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Analog(n) => write!(f, "analog input {}", n),
            Channel::Temperature => f.write_str("temperature"),
            Channel::Humidity => f.write_str("humidity"),
        }
    }
}

/// One measurement: the device's raw value and its physical-unit conversion.
/// The two agree when the device already reports calibrated units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Reading {
    pub raw: f64,
    pub value: f64,
}

impl Reading {
    pub const ZERO: Reading = Reading { raw: 0.0, value: 0.0 };
}

#[derive(Debug)]
pub enum DriverError {
    /// Write attempted on a read-only driver, or vice versa.
    NotSupported,
    /// Channel kind or range does not fit the device.
    BadChannel(Channel),
    /// The init string did not parse for this family.
    BadInit(String),
    /// The device answered, but with a frame that fails its own format or
    /// checksum rules.
    BadReading(String),
    Bus(BusError),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::NotSupported => f.write_str("operation not supported by this driver"),
            DriverError::BadChannel(channel) => write!(f, "unsupported channel: {}", channel),
            DriverError::BadInit(s) => write!(f, "bad init string: {}", s),
            DriverError::BadReading(s) => write!(f, "bad reading: {}", s),
            DriverError::Bus(e) => write!(f, "bus error: {}", e),
        }
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DriverError::Bus(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BusError> for DriverError {
    fn from(value: BusError) -> Self {
        DriverError::Bus(value)
    }
}

/// Capability set implemented once per physical device family.
///
/// Every implementation tolerates a simulated bus: `read` then reports
/// [`Reading::ZERO`] instead of failing, so the system runs headless.
/// `cleanup` releases the bus handle and is idempotent.
pub trait Driver {
    fn family(&self) -> &'static str;
    fn read(&mut self, channel: Channel, param: f64) -> Result<Reading, DriverError>;
    fn write(&mut self, value: f64) -> Result<(), DriverError>;
    fn cleanup(&mut self);
}

pub type DriverFactory = fn(&Bus, &str) -> Result<Box<dyn Driver>, DriverError>;

/// Tag-to-factory table, built once at startup. Hardware records look their
/// `hardware` tag up here; a missing entry is a hard construction failure on
/// their side, never a silent default.
pub struct DriverRegistry {
    factories: BTreeMap<&'static str, DriverFactory>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        DriverRegistry {
            factories: BTreeMap::new(),
        }
    }

    /// All known IC families.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("MCP3208", |bus, init| Ok(Box::new(Mcp3208::new(bus, init)?)));
        registry.register("DHT11", |bus, init| Ok(Box::new(Dht::new(DhtModel::Dht11, bus, init)?)));
        registry.register("DHT22", |bus, init| Ok(Box::new(Dht::new(DhtModel::Dht22, bus, init)?)));
        registry.register("AM2302", |bus, init| Ok(Box::new(Dht::new(DhtModel::Am2302, bus, init)?)));
        registry.register("DS18B20", |bus, init| Ok(Box::new(Ds18b20::new(bus, init)?)));
        registry
    }

    pub fn register(&mut self, tag: &'static str, factory: DriverFactory) {
        if self.factories.insert(tag, factory).is_some() {
            warn!("Driver factory for {} registered twice; keeping the later one", tag);
        }
    }

    pub fn get(&self, tag: &str) -> Option<DriverFactory> {
        self.factories.get(tag).copied()
    }

    pub fn tags(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
