//! Sensor scan service: one pass reads every configured sensor through its
//! hardware record's driver and persists the values. A sensor that cannot be
//! resolved or read is logged and skipped; it never aborts the pass.

use crate::bus::Bus;
use crate::db::store::Store;
use crate::driver::DriverRegistry;
use crate::models::hardware::Hardware;
use crate::models::sensor::{ProbeAddress, Sensor};
use log::{info, warn};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    pub read: usize,
    pub skipped: usize,
}

pub fn run_loop(
    store: &Store,
    registry: &DriverRegistry,
    bus: &Bus,
    vref: f64,
    interval: Duration,
) -> Result<(), String> {
    loop {
        let tick_start = Instant::now();

        let stats = scan_once(store, registry, bus, vref)?;
        info!("Scan pass complete: {} sensor(s) read, {} skipped", stats.read, stats.skipped);

        // Maintain steady cadence
        let elapsed = tick_start.elapsed();
        if elapsed < interval {
            thread::sleep(interval - elapsed);
        }
    }
}

pub fn scan_once(store: &Store, registry: &DriverRegistry, bus: &Bus, vref: f64) -> Result<ScanStats, String> {
    let sensors = Sensor::list_all(store).map_err(|e| format!("listing sensors failed: {}", e))?;
    let mut hardware =
        Hardware::load_all(store, registry, bus).map_err(|e| format!("loading hardware failed: {}", e))?;

    let mut stats = ScanStats::default();
    for mut sensor in sensors {
        match poll_sensor(store, &mut hardware, &mut sensor, vref) {
            Ok(()) => stats.read += 1,
            Err(e) => {
                warn!("Skipping {}: {}", sensor, e);
                stats.skipped += 1;
            }
        }
    }
    Ok(stats)
}

fn poll_sensor(store: &Store, hardware: &mut [Hardware], sensor: &mut Sensor, vref: f64) -> Result<(), String> {
    let index = find_hardware(hardware, &sensor.address)
        .ok_or_else(|| format!("no hardware record matches address {}", sensor.address.hw_id()))?;
    let hw = &mut hardware[index];
    let reading = hw
        .read(sensor.address.channel(), vref)
        .map_err(|e| format!("{} read failed: {}", hw, e))?;
    sensor
        .record_reading(store, reading.raw, reading.value)
        .map_err(|e| format!("recording values failed: {}", e))
}

/// Resolve a dotted address against the loaded hardware records. The tag must
/// equal the address family; several ICs of one family are told apart by
/// their init string (the GPIO pin), falling back to the first tag match.
fn find_hardware(hardware: &[Hardware], address: &ProbeAddress) -> Option<usize> {
    let mut tag_match = None;
    for (index, hw) in hardware.iter().enumerate() {
        if hw.row.hardware != address.family {
            continue;
        }
        if hw.row.init == address.pin {
            return Some(index);
        }
        tag_match.get_or_insert(index);
    }
    tag_match
}
