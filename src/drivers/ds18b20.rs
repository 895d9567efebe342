//! DS18B20 one-wire digital thermometer.
//!
//! The kernel's w1 subsystem owns the wire protocol and exposes each probe as
//! a device folder; reading `w1_slave` triggers a conversion and reports the
//! result in milli-degrees Celsius.

use crate::bus::Bus;
use crate::driver::{Channel, Driver, DriverError, Reading};
use std::fs;
use std::path::PathBuf;

pub struct Ds18b20 {
    device_folder: PathBuf,
    live: bool,
}

impl Ds18b20 {
    /// `init` is the device-folder path containing the `w1_slave` file. A
    /// folder that is not there yet is not a construction error: the record
    /// stays usable and reads report zero until the kernel exposes the probe.
    pub fn new(bus: &Bus, init: &str) -> Result<Self, DriverError> {
        let device_folder = PathBuf::from(init.trim());
        let live = !bus.is_simulated() && device_folder.is_dir();
        Ok(Ds18b20 { device_folder, live })
    }

    /// Parse a `w1_slave` report: the first line carries the kernel's CRC
    /// verdict (`... YES`), the second the temperature as `t=<milli-degrees>`.
    pub fn parse_report(body: &str) -> Result<i64, DriverError> {
        let mut lines = body.lines();
        let verdict = lines.next().unwrap_or("");
        if !verdict.trim_end().ends_with("YES") {
            return Err(DriverError::BadReading("kernel CRC check failed".to_string()));
        }
        let data = lines.next().unwrap_or("");
        data.split_once("t=")
            .and_then(|(_, v)| v.trim().parse::<i64>().ok())
            .ok_or_else(|| DriverError::BadReading(format!("missing temperature in report line `{}`", data)))
    }
}

impl Driver for Ds18b20 {
    fn family(&self) -> &'static str {
        "DS18B20"
    }

    fn read(&mut self, channel: Channel, _param: f64) -> Result<Reading, DriverError> {
        if channel != Channel::Temperature {
            return Err(DriverError::BadChannel(channel));
        }
        if !self.live {
            return Ok(Reading::ZERO);
        }
        let path = self.device_folder.join("w1_slave");
        let body = fs::read_to_string(&path).map_err(|e| DriverError::Bus(e.into()))?;
        let milli = Self::parse_report(&body)?;
        Ok(Reading {
            raw: milli as f64,
            value: milli as f64 / 1000.0,
        })
    }

    fn write(&mut self, _value: f64) -> Result<(), DriverError> {
        Err(DriverError::NotSupported)
    }

    fn cleanup(&mut self) {
        // Nothing held open; the kernel owns the wire.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;

    const GOOD_REPORT: &str = "72 01 4b 46 7f ff 0e 10 57 : crc=57 YES\n72 01 4b 46 7f ff 0e 10 57 t=21562\n";
    const BAD_CRC_REPORT: &str = "72 01 4b 46 7f ff 0e 10 57 : crc=57 NO\n72 01 4b 46 7f ff 0e 10 57 t=21562\n";

    fn live_bus() -> Bus {
        Bus::Live(Arc::new(crate::bus::fake::ScriptedPort::default()))
    }

    fn device_folder(report: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let mut file = fs::File::create(dir.path().join("w1_slave")).unwrap();
        file.write_all(report.as_bytes()).unwrap();
        dir
    }

    #[test]
    fn reads_milli_degrees_from_the_report() {
        let dir = device_folder(GOOD_REPORT);
        let mut probe = Ds18b20::new(&live_bus(), dir.path().to_str().unwrap()).unwrap();
        let reading = probe.read(Channel::Temperature, 0.0).unwrap();
        assert_eq!(reading.raw, 21562.0);
        assert_eq!(reading.value, 21.562);
    }

    #[test]
    fn failed_kernel_crc_fails_the_read() {
        let dir = device_folder(BAD_CRC_REPORT);
        let mut probe = Ds18b20::new(&live_bus(), dir.path().to_str().unwrap()).unwrap();
        assert!(matches!(
            probe.read(Channel::Temperature, 0.0),
            Err(DriverError::BadReading(_))
        ));
    }

    #[test]
    fn missing_device_folder_reads_zero() {
        let mut probe = Ds18b20::new(&live_bus(), "/nonexistent/w1/device").unwrap();
        assert_eq!(probe.read(Channel::Temperature, 0.0).unwrap(), Reading::ZERO);
    }

    #[test]
    fn simulated_bus_reads_zero_even_with_a_real_folder() {
        let dir = device_folder(GOOD_REPORT);
        let mut probe = Ds18b20::new(&Bus::Simulated, dir.path().to_str().unwrap()).unwrap();
        assert_eq!(probe.read(Channel::Temperature, 0.0).unwrap(), Reading::ZERO);
    }

    #[test]
    fn only_the_temperature_channel_exists() {
        let mut probe = Ds18b20::new(&Bus::Simulated, "/nonexistent").unwrap();
        assert!(matches!(
            probe.read(Channel::Humidity, 0.0),
            Err(DriverError::BadChannel(Channel::Humidity))
        ));
    }

    #[test]
    fn write_is_not_supported() {
        let mut probe = Ds18b20::new(&Bus::Simulated, "/nonexistent").unwrap();
        assert!(matches!(probe.write(1.0), Err(DriverError::NotSupported)));
    }

    #[test]
    fn report_without_temperature_line_fails() {
        assert!(matches!(
            Ds18b20::parse_report("72 01 : crc=57 YES\n"),
            Err(DriverError::BadReading(_))
        ));
    }
}
