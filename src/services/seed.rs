//! Demo configuration seeding: a small greenhouse setup (one ADC, one air
//! combo probe, one submerged thermometer) inserted on first start so the
//! scan loop has something to read. Every entry is keyed by name, so running
//! the seed again touches nothing.

use crate::db::record::Record;
use crate::db::store::{Store, StoreError};
use crate::models::hardware::{AccessMode, HardwareRow};
use crate::models::sensor::{SensorMode, SensorRow};
use log::info;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rusqlite::types::Value;

const HARDWARE: &[(&str, AccessMode, &str, &str)] = &[
    ("Nutrient ADC", AccessMode::Read, "MCP3208", r#"{"channel": 0, "baud": 50000, "flags": 0}"#),
    ("Air combo probe", AccessMode::Read, "AM2302", "4"),
    ("Tank probe", AccessMode::Read, "DS18B20", "/sys/bus/w1/devices/28-000005e2fdc3"),
];

const SENSORS: &[(&str, SensorMode, &str)] = &[
    ("Nutrient level", SensorMode::Analog, "MCP3208.0"),
    ("pH probe", SensorMode::Analog, "MCP3208.1"),
    ("Air temperature", SensorMode::Direct, "AM2302.4.T"),
    ("Air humidity", SensorMode::Direct, "AM2302.4.H"),
    ("Tank temperature", SensorMode::Direct, "DS18B20.28-000005e2fdc3"),
];

pub fn run(store: &Store) -> Result<(), String> {
    let mut created_hardware = 0;
    for &(name, mode, hardware, init) in HARDWARE {
        if ensure_hardware(store, name, mode, hardware, init)
            .map_err(|e| format!("seeding hardware `{}` failed: {}", name, e))?
        {
            created_hardware += 1;
        }
    }

    // fixed seed so repeated demo runs start from the same values
    let mut rng = SmallRng::seed_from_u64(0x5eed);
    let mut created_sensors = 0;
    for &(name, mode, address) in SENSORS {
        if ensure_sensor(store, name, mode, address, &mut rng)
            .map_err(|e| format!("seeding sensor `{}` failed: {}", name, e))?
        {
            created_sensors += 1;
        }
    }

    info!(
        "Demo seed complete: {} hardware and {} sensor record(s) created",
        created_hardware, created_sensors
    );
    Ok(())
}

/// Insert the hardware record unless a row of that name already exists.
/// Returns whether a row was created.
fn ensure_hardware(
    store: &Store,
    name: &str,
    mode: AccessMode,
    hardware: &str,
    init: &str,
) -> Result<bool, StoreError> {
    match HardwareRow::load_by_name(store, name) {
        Ok(_) => Ok(false),
        Err(StoreError::NotFound { .. }) => {
            HardwareRow::insert(
                store,
                &[
                    ("name", Value::Text(name.to_string())),
                    ("mode", Value::Integer(mode.as_i64())),
                    ("hardware", Value::Text(hardware.to_string())),
                    ("init", Value::Text(init.to_string())),
                ],
            )?;
            Ok(true)
        }
        Err(e) => Err(e),
    }
}

/// Insert the sensor record unless a row of that name already exists, giving
/// new rows a plausible starting value so the demo database is not all NULLs
/// before the first scan.
fn ensure_sensor(
    store: &Store,
    name: &str,
    mode: SensorMode,
    address: &str,
    rng: &mut SmallRng,
) -> Result<bool, StoreError> {
    match SensorRow::load_by_name(store, name) {
        Ok(_) => Ok(false),
        Err(StoreError::NotFound { .. }) => {
            let mut row = SensorRow::insert(
                store,
                &[
                    ("name", Value::Text(name.to_string())),
                    ("mode", Value::Integer(mode.as_i64())),
                    ("hardware", Value::Text(address.to_string())),
                ],
            )?;
            if row.read_value.is_none() {
                let value: f64 = rng.random_range(0.0..30.0);
                row.update(
                    store,
                    &[
                        ("read_value", Value::Real(value)),
                        ("calculated_value", Value::Real(value)),
                    ],
                )?;
            }
            Ok(true)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sensor::Sensor;

    fn seeded_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store.apply_schema().unwrap();
        run(&store).unwrap();
        store
    }

    #[test]
    fn seed_creates_the_demo_configuration() {
        let store = seeded_store();
        assert_eq!(HardwareRow::list_all_keys(&store).unwrap().len(), HARDWARE.len());
        assert_eq!(SensorRow::list_all_keys(&store).unwrap().len(), SENSORS.len());

        let adc = HardwareRow::load_by_name(&store, "Nutrient ADC").unwrap();
        assert_eq!(adc.hardware, "MCP3208");
        assert_eq!(adc.mode, AccessMode::Read);

        // every seeded address must hydrate
        for sensor in Sensor::list_all(&store).unwrap() {
            assert!(sensor.row.read_value.is_some());
        }
    }

    #[test]
    fn seeding_twice_changes_nothing() {
        let store = seeded_store();
        let before: Vec<SensorRow> = Sensor::list_all(&store).unwrap().into_iter().map(|s| s.row).collect();

        run(&store).unwrap();
        let after: Vec<SensorRow> = Sensor::list_all(&store).unwrap().into_iter().map(|s| s.row).collect();
        assert_eq!(after, before);
        assert_eq!(HardwareRow::list_all_keys(&store).unwrap().len(), HARDWARE.len());
    }

    #[test]
    fn initial_values_are_deterministic_across_databases() {
        let a = seeded_store();
        let b = seeded_store();
        let values_a: Vec<Option<f64>> =
            Sensor::list_all(&a).unwrap().into_iter().map(|s| s.row.read_value).collect();
        let values_b: Vec<Option<f64>> =
            Sensor::list_all(&b).unwrap().into_iter().map(|s| s.row.read_value).collect();
        assert_eq!(values_a, values_b);
    }
}
