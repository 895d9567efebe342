pub mod bus;
pub mod config;
pub mod db {
    pub mod record;
    pub mod store;
}
pub mod driver;
pub mod drivers {
    pub mod dht;
    pub mod ds18b20;
    pub mod mcp3208;
}
pub mod models {
    pub mod hardware;
    pub mod sensor;
}
pub mod services {
    pub mod poll;
    pub mod seed;
}

use crate::bus::Bus;
use crate::config::Config;
use crate::db::store::Store;
use crate::driver::DriverRegistry;
use crate::services::{poll, seed};
use log::info;

pub fn run() -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (database={}, poll_interval={}s, adc_vref={}V, seed_demo={})",
        cfg.database_path,
        cfg.poll_interval.as_secs(),
        cfg.adc_vref,
        cfg.seed_demo
    );

    // 2) Open the record store and apply the embedded schema
    let store = Store::open(&cfg.database_path).map_err(|e| format!("opening record store failed: {}", e))?;
    store
        .apply_schema()
        .map_err(|e| format!("applying database schema failed: {}", e))?;
    info!("Record store ready at {}", cfg.database_path);

    // 3) Driver registry
    let registry = DriverRegistry::builtin();
    info!("Registered driver families: {}", registry.tags().join(", "));

    // 4) Hardware bus. No GPIO/SPI port library is compiled in, so every
    //    driver runs against the simulated bus and reports zero readings.
    let bus = Bus::Simulated;
    info!("Hardware bus: {:?}", bus);

    // 5) Optional demo configuration
    if cfg.seed_demo {
        seed::run(&store)?;
    }

    // 6) Scan loop (steady cadence)
    info!("Starting scan loop: interval={}s", cfg.poll_interval.as_secs());
    poll::run_loop(&store, &registry, &bus, cfg.adc_vref, cfg.poll_interval)
}
