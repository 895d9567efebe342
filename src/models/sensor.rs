//! Sensor records: one logical measurement point per `tb_sensor` row, linked
//! to a hardware IC through a dotted address like `"AM2302.4.T"` (pin 4 on an
//! AM2302, temperature side).

use crate::db::record::{Record, PLACEHOLDER_NAME};
use crate::db::store::{format_timestamp, Row, Store, StoreError};
use crate::driver::Channel;
use chrono::{DateTime, SubsecRound, Utc};
use core::fmt;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorMode {
    // 0=DIGITAL, 1=ANALOG, 2=DIRECT
    /// On/off pin input.
    Digital,
    /// Probe behind an ADC; the raw value spans the converter's native range.
    Analog,
    /// The IC reports the physical value itself (i2c / 1-wire devices).
    Direct,
}

impl SensorMode {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(SensorMode::Digital),
            1 => Some(SensorMode::Analog),
            2 => Some(SensorMode::Direct),
            _ => None,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            SensorMode::Digital => 0,
            SensorMode::Analog => 1,
            SensorMode::Direct => 2,
        }
    }
}

impl fmt::Display for SensorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorMode::Digital => f.write_str("DIGITAL"),
            SensorMode::Analog => f.write_str("ANALOG"),
            SensorMode::Direct => f.write_str("DIRECT"),
        }
    }
}

impl serde::Serialize for SensorMode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i64(self.as_i64())
    }
}

impl<'de> serde::Deserialize<'de> for SensorMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;
        impl<'de> serde::de::Visitor<'de> for V {
            type Value = SensorMode;

            fn expecting(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
                write!(f, "an integer 0, 1 or 2 for SensorMode")
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                SensorMode::from_i64(value)
                    .ok_or_else(|| E::invalid_value(serde::de::Unexpected::Signed(value), &self))
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                SensorMode::from_i64(value as i64)
                    .ok_or_else(|| E::invalid_value(serde::de::Unexpected::Unsigned(value), &self))
            }
        }

        deserializer.deserialize_any(V)
    }
}

#[derive(Debug)]
pub enum SensorError {
    Store(StoreError),
    /// The `hardware` column does not parse as a dotted address.
    MalformedAddress(String),
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorError::Store(e) => write!(f, "store error: {}", e),
            SensorError::MalformedAddress(s) => write!(f, "malformed hardware address: `{}`", s),
        }
    }
}

impl std::error::Error for SensorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SensorError::Store(e) => Some(e),
            SensorError::MalformedAddress(_) => None,
        }
    }
}

impl From<StoreError> for SensorError {
    fn from(value: StoreError) -> Self {
        SensorError::Store(value)
    }
}

/// Parsed dotted address: `<IC family>.<pin-or-channel>[.<suffix>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeAddress {
    pub family: String,
    pub pin: String,
    pub suffix: Option<char>,
}

impl ProbeAddress {
    /// Exactly two or three non-empty dot-separated components; the optional
    /// suffix is `T` (temperature) or `H` (humidity).
    pub fn parse(address: &str) -> Result<Self, SensorError> {
        let malformed = || SensorError::MalformedAddress(address.to_string());
        let parts: Vec<&str> = address.split('.').collect();
        if parts.len() < 2 || parts.len() > 3 || parts[0].is_empty() || parts[1].is_empty() {
            return Err(malformed());
        }
        let suffix = match parts.get(2).copied() {
            None => None,
            Some("T") => Some('T'),
            Some("H") => Some('H'),
            Some(_) => return Err(malformed()),
        };
        Ok(ProbeAddress {
            family: parts[0].to_string(),
            pin: parts[1].to_string(),
            suffix,
        })
    }

    /// Composite id correlating the sensor with a hardware record, e.g.
    /// `"AM2302.4"`.
    pub fn hw_id(&self) -> String {
        format!("{}.{}", self.family, self.pin)
    }

    /// Probe selector within the IC. Without a suffix, a numeric pin is an
    /// analog input and anything else defaults to the temperature side.
    pub fn channel(&self) -> Channel {
        match self.suffix {
            Some('H') => Channel::Humidity,
            Some(_) => Channel::Temperature,
            None => match self.pin.parse::<u8>() {
                Ok(input) => Channel::Analog(input),
                Err(_) => Channel::Temperature,
            },
        }
    }
}

/// One `tb_sensor` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorRow {
    pub id: i64,
    pub name: String,
    pub mode: SensorMode,
    /// Dotted address; parsed form lives on [`Sensor`].
    pub hardware: String,
    /// Opaque scheduling hint, stored but never interpreted here.
    pub timer: Option<String>,
    /// Last raw reading, always a float even for digital inputs.
    pub read_value: Option<f64>,
    /// Physical-unit conversion of the raw value; equal to it when the device
    /// reports calibrated units.
    pub calculated_value: Option<f64>,
    pub timestamp_value: Option<DateTime<Utc>>,
    pub updated_on: Option<DateTime<Utc>>,
    pub synchro_on: Option<DateTime<Utc>>,
}

impl Record for SensorRow {
    const TABLE: &'static str = "tb_sensor";
    const ID_COLUMN: &'static str = "sensor_id";
    const COLUMNS: &'static [&'static str] = &[
        "sensor_id",
        "name",
        "mode",
        "hardware",
        "timer",
        "read_value",
        "calculated_value",
        "timestamp_value",
        "updated_on",
        "synchro_on",
    ];

    fn from_row(row: &Row) -> Result<Self, StoreError> {
        let mode_raw = row.integer("mode")?;
        let mode = SensorMode::from_i64(mode_raw).ok_or_else(|| StoreError::BadValue {
            column: "mode".to_string(),
            detail: format!("{} is not a known sensor mode", mode_raw),
        })?;
        Ok(SensorRow {
            id: row.integer("sensor_id")?,
            name: row.text("name")?,
            mode,
            hardware: row.text("hardware")?,
            timer: row.opt_text("timer")?,
            read_value: row.opt_float("read_value")?,
            calculated_value: row.opt_float("calculated_value")?,
            timestamp_value: row.opt_timestamp("timestamp_value")?,
            updated_on: row.opt_timestamp("updated_on")?,
            synchro_on: row.opt_timestamp("synchro_on")?,
        })
    }

    fn id(&self) -> i64 {
        self.id
    }
}

impl Default for SensorRow {
    fn default() -> Self {
        SensorRow {
            id: 0,
            name: PLACEHOLDER_NAME.to_string(),
            mode: SensorMode::Digital,
            hardware: String::new(),
            timer: None,
            read_value: None,
            calculated_value: None,
            timestamp_value: None,
            updated_on: None,
            synchro_on: None,
        }
    }
}

/// Hydrated sensor row plus its parsed address. A row whose address does not
/// parse never becomes a `Sensor`: hydration fails with `MalformedAddress`.
#[derive(Debug, Clone, PartialEq)]
pub struct Sensor {
    pub row: SensorRow,
    pub address: ProbeAddress,
}

impl Sensor {
    pub fn from_row(row: SensorRow) -> Result<Self, SensorError> {
        let address = ProbeAddress::parse(&row.hardware)?;
        Ok(Sensor { row, address })
    }

    pub fn load_by_id(store: &Store, id: i64) -> Result<Self, SensorError> {
        Self::from_row(SensorRow::load_by_id(store, id).map_err(SensorError::Store)?)
    }

    pub fn load_by_name(store: &Store, name: &str) -> Result<Self, SensorError> {
        Self::from_row(SensorRow::load_by_name(store, name).map_err(SensorError::Store)?)
    }

    /// Every sensor row, fully hydrated, in primary-key listing order.
    pub fn list_all(store: &Store) -> Result<Vec<Self>, SensorError> {
        SensorRow::list_all_keys(store)
            .map_err(SensorError::Store)?
            .into_iter()
            .map(|id| Self::load_by_id(store, id))
            .collect()
    }

    /// Persist a fresh reading in one statement, without the reload the
    /// generic update performs. Sensors are written every scan tick; the
    /// in-memory snapshot is refreshed to the exact persisted values instead.
    pub fn record_reading(&mut self, store: &Store, read_value: f64, calculated_value: f64) -> Result<(), SensorError> {
        let now = Utc::now().trunc_subsecs(6);
        store
            .execute(
                "UPDATE tb_sensor SET read_value = ?1, calculated_value = ?2, updated_on = ?3 WHERE sensor_id = ?4",
                &[
                    Value::Real(read_value),
                    Value::Real(calculated_value),
                    Value::Text(format_timestamp(now)),
                    Value::Integer(self.row.id),
                ],
            )
            .map_err(SensorError::Store)?;
        self.row.read_value = Some(read_value);
        self.row.calculated_value = Some(calculated_value);
        self.row.updated_on = Some(now);
        Ok(())
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.row.name, self.row.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store.apply_schema().unwrap();
        store
    }

    fn insert_sensor(store: &Store, name: &str, mode: SensorMode, hardware: &str) -> Sensor {
        let row = SensorRow::insert(
            store,
            &[
                ("name", Value::Text(name.into())),
                ("mode", Value::Integer(mode.as_i64())),
                ("hardware", Value::Text(hardware.into())),
            ],
        )
        .unwrap();
        Sensor::from_row(row).unwrap()
    }

    #[test]
    fn address_parses_into_family_pin_and_composite_id() {
        let address = ProbeAddress::parse("AM2302.4.T").unwrap();
        assert_eq!(address.family, "AM2302");
        assert_eq!(address.pin, "4");
        assert_eq!(address.suffix, Some('T'));
        assert_eq!(address.hw_id(), "AM2302.4");
        assert_eq!(address.channel(), Channel::Temperature);
    }

    #[test]
    fn suffixes_and_pins_derive_the_channel() {
        assert_eq!(ProbeAddress::parse("AM2302.4.H").unwrap().channel(), Channel::Humidity);
        assert_eq!(ProbeAddress::parse("MCP3208.5").unwrap().channel(), Channel::Analog(5));
        assert_eq!(
            ProbeAddress::parse("DS18B20.28-000005e2fdc3").unwrap().channel(),
            Channel::Temperature
        );
    }

    #[test]
    fn malformed_addresses_are_rejected() {
        for address in ["AM2302", "", ".4", "AM2302.", "AM2302.4.T.X", "AM2302.4.Z"] {
            assert!(
                matches!(
                    ProbeAddress::parse(address),
                    Err(SensorError::MalformedAddress(bad)) if bad == address
                ),
                "address `{}` should not parse",
                address
            );
        }
    }

    #[test]
    fn malformed_stored_address_fails_hydration() {
        let store = sensor_store();
        SensorRow::insert(
            &store,
            &[
                ("name", Value::Text("broken".into())),
                ("mode", Value::Integer(SensorMode::Direct.as_i64())),
                ("hardware", Value::Text("AM2302".into())),
            ],
        )
        .unwrap();
        assert!(matches!(
            Sensor::load_by_name(&store, "broken"),
            Err(SensorError::MalformedAddress(_))
        ));
    }

    #[test]
    fn record_reading_writes_exactly_three_fields_and_skips_the_reload() {
        let store = sensor_store();
        let mut sensor = insert_sensor(&store, "air temp", SensorMode::Direct, "AM2302.4.T");
        let before = sensor.row.clone();

        sensor.record_reading(&store, 21.6, 21.6).unwrap();
        assert_eq!(sensor.row.read_value, Some(21.6));
        assert_eq!(sensor.row.calculated_value, Some(21.6));
        assert_ne!(sensor.row.updated_on, before.updated_on);

        // storage agrees with the in-memory snapshot on every written field,
        // and nothing else moved
        let stored = SensorRow::load_by_id(&store, sensor.row.id).unwrap();
        assert_eq!(stored, sensor.row);
        assert_eq!(stored.timestamp_value, before.timestamp_value);
        assert_eq!(stored.synchro_on, before.synchro_on);
        assert_eq!(stored.timer, before.timer);
    }

    #[test]
    fn list_all_hydrates_every_row() {
        let store = sensor_store();
        insert_sensor(&store, "a", SensorMode::Analog, "MCP3208.0");
        insert_sensor(&store, "b", SensorMode::Direct, "AM2302.4.H");
        let sensors = Sensor::list_all(&store).unwrap();
        assert_eq!(sensors.len(), 2);
        assert_eq!(sensors[0].row.name, "a");
        assert_eq!(sensors[1].address.channel(), Channel::Humidity);
    }

    #[test]
    fn rows_serialize_modes_as_integers() {
        let store = sensor_store();
        let sensor = insert_sensor(&store, "nutrient level", SensorMode::Analog, "MCP3208.0");
        let json = serde_json::to_value(&sensor.row).unwrap();
        assert_eq!(json["mode"], 1);
        assert_eq!(json["hardware"], "MCP3208.0");

        let back: SensorRow = serde_json::from_value(json).unwrap();
        assert_eq!(back, sensor.row);
    }

    #[test]
    fn renders_as_name_and_mode() {
        let store = sensor_store();
        let sensor = insert_sensor(&store, "nutrient level", SensorMode::Analog, "MCP3208.0");
        assert_eq!(sensor.to_string(), "nutrient level (ANALOG)");
    }

    #[test]
    fn default_row_carries_the_placeholder_name() {
        let row = SensorRow::default();
        assert_eq!(row.name, PLACEHOLDER_NAME);
        assert!(row.read_value.is_none());
    }
}
