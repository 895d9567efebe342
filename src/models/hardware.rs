//! Hardware records: the ICs present on the control board (table
//! `tb_hardware`), each owning the driver instance that talks to it.
//!
//! The driver is derived state, never persisted: construction dispatches on
//! the row's `hardware` tag through the [`DriverRegistry`] and fails loudly
//! when the tag is unknown.

use crate::bus::Bus;
use crate::db::record::{Record, PLACEHOLDER_NAME};
use crate::db::store::{Row, Store, StoreError};
use crate::driver::{Channel, Driver, DriverError, DriverRegistry, Reading};
use chrono::{DateTime, Utc};
use core::fmt;
use serde::{Deserialize, Serialize};

/// Declared access direction of an IC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    // 0=READ, 1=WRITE, 2=R/W
    Read,
    Write,
    ReadWrite,
}

impl AccessMode {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(AccessMode::Read),
            1 => Some(AccessMode::Write),
            2 => Some(AccessMode::ReadWrite),
            _ => None,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            AccessMode::Read => 0,
            AccessMode::Write => 1,
            AccessMode::ReadWrite => 2,
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::Read => f.write_str("READ"),
            AccessMode::Write => f.write_str("WRITE"),
            AccessMode::ReadWrite => f.write_str("R/W"),
        }
    }
}

impl serde::Serialize for AccessMode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i64(self.as_i64())
    }
}

impl<'de> serde::Deserialize<'de> for AccessMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;
        impl<'de> serde::de::Visitor<'de> for V {
            type Value = AccessMode;

            fn expecting(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
                write!(f, "an integer 0, 1 or 2 for AccessMode")
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                AccessMode::from_i64(value)
                    .ok_or_else(|| E::invalid_value(serde::de::Unexpected::Signed(value), &self))
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                AccessMode::from_i64(value as i64)
                    .ok_or_else(|| E::invalid_value(serde::de::Unexpected::Unsigned(value), &self))
            }
        }

        deserializer.deserialize_any(V)
    }
}

/// One `tb_hardware` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareRow {
    pub id: i64,
    pub name: String,
    pub mode: AccessMode,
    /// IC family tag, e.g. "DHT22" or "DS18B20".
    pub hardware: String,
    /// Free string handed to the driver for hardware initialization.
    pub init: String,
    pub updated_on: Option<DateTime<Utc>>,
    pub synchro_on: Option<DateTime<Utc>>,
}

impl Record for HardwareRow {
    const TABLE: &'static str = "tb_hardware";
    const ID_COLUMN: &'static str = "hardware_id";
    const COLUMNS: &'static [&'static str] =
        &["hardware_id", "name", "mode", "hardware", "init", "updated_on", "synchro_on"];

    fn from_row(row: &Row) -> Result<Self, StoreError> {
        let mode_raw = row.integer("mode")?;
        let mode = AccessMode::from_i64(mode_raw).ok_or_else(|| StoreError::BadValue {
            column: "mode".to_string(),
            detail: format!("{} is not a known access mode", mode_raw),
        })?;
        Ok(HardwareRow {
            id: row.integer("hardware_id")?,
            name: row.text("name")?,
            mode,
            hardware: row.text("hardware")?,
            init: row.text("init")?,
            updated_on: row.opt_timestamp("updated_on")?,
            synchro_on: row.opt_timestamp("synchro_on")?,
        })
    }

    fn id(&self) -> i64 {
        self.id
    }
}

impl Default for HardwareRow {
    fn default() -> Self {
        HardwareRow {
            id: 0,
            name: PLACEHOLDER_NAME.to_string(),
            mode: AccessMode::Read,
            hardware: String::new(),
            init: String::new(),
            updated_on: None,
            synchro_on: None,
        }
    }
}

#[derive(Debug)]
pub enum HardwareError {
    Store(StoreError),
    /// The row's `hardware` tag matches no registered driver family.
    UnsupportedHardware(String),
    Driver(DriverError),
}

impl fmt::Display for HardwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HardwareError::Store(e) => write!(f, "store error: {}", e),
            HardwareError::UnsupportedHardware(tag) => write!(f, "unsupported hardware type: {}", tag),
            HardwareError::Driver(e) => write!(f, "driver error: {}", e),
        }
    }
}

impl std::error::Error for HardwareError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HardwareError::Store(e) => Some(e),
            HardwareError::UnsupportedHardware(_) => None,
            HardwareError::Driver(e) => Some(e),
        }
    }
}

impl From<StoreError> for HardwareError {
    fn from(value: StoreError) -> Self {
        HardwareError::Store(value)
    }
}

impl From<DriverError> for HardwareError {
    fn from(value: DriverError) -> Self {
        HardwareError::Driver(value)
    }
}

/// Hydrated hardware record plus its live driver. The record exclusively owns
/// the driver's bus handle; `cleanup` releases it and is also guaranteed on
/// drop, so the handle is returned on every exit path.
pub struct Hardware {
    pub row: HardwareRow,
    driver: Box<dyn Driver>,
}

impl Hardware {
    pub fn from_row(row: HardwareRow, registry: &DriverRegistry, bus: &Bus) -> Result<Self, HardwareError> {
        let factory = registry
            .get(&row.hardware)
            .ok_or_else(|| HardwareError::UnsupportedHardware(row.hardware.clone()))?;
        let driver = factory(bus, &row.init)?;
        Ok(Hardware { row, driver })
    }

    pub fn load_by_id(store: &Store, id: i64, registry: &DriverRegistry, bus: &Bus) -> Result<Self, HardwareError> {
        Self::from_row(HardwareRow::load_by_id(store, id)?, registry, bus)
    }

    pub fn load_by_name(
        store: &Store,
        name: &str,
        registry: &DriverRegistry,
        bus: &Bus,
    ) -> Result<Self, HardwareError> {
        Self::from_row(HardwareRow::load_by_name(store, name)?, registry, bus)
    }

    /// Hydrate every row in the table.
    pub fn load_all(store: &Store, registry: &DriverRegistry, bus: &Bus) -> Result<Vec<Self>, HardwareError> {
        HardwareRow::list_all_keys(store)?
            .into_iter()
            .map(|id| Self::load_by_id(store, id, registry, bus))
            .collect()
    }

    pub fn driver_family(&self) -> &'static str {
        self.driver.family()
    }

    pub fn read(&mut self, channel: Channel, param: f64) -> Result<Reading, HardwareError> {
        Ok(self.driver.read(channel, param)?)
    }

    pub fn write(&mut self, value: f64) -> Result<(), HardwareError> {
        Ok(self.driver.write(value)?)
    }

    pub fn cleanup(&mut self) {
        self.driver.cleanup();
    }
}

impl Drop for Hardware {
    fn drop(&mut self) {
        // idempotent: a no-op when cleanup() was already called explicitly
        self.driver.cleanup();
    }
}

impl fmt::Debug for Hardware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // the driver is not Debug; the row identifies the record
        f.debug_struct("Hardware").field("row", &self.row).finish_non_exhaustive()
    }
}

impl fmt::Display for Hardware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.row.name, self.row.mode)
    }
}
