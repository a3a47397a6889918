use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use touchup::calibration::{CalibrationMapper, CalibrationStore};
use touchup::touch::now_ms;
use touchup::{LogListener, OnsetDetector, TouchConfig, TouchDeviceManager};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => TouchConfig::load(&path).expect("load config"),
        None => TouchConfig::default(),
    };

    let calibration = CalibrationMapper::new(config.calibration_range).with_store(
        CalibrationStore::new(
            config
                .calibration_file
                .clone()
                .unwrap_or_else(CalibrationStore::default_path),
        ),
    );
    let loaded = calibration.load();
    println!(
        "Touch calibration: {}",
        if loaded { "loaded from file" } else { "using defaults" }
    );

    let mgr = Arc::new(TouchDeviceManager::with_config(config.clone()));
    mgr.add_listener(Arc::new(LogListener::new())).expect("add log listener");
    let onset = OnsetDetector::new(config.release_timeout());

    mgr.enable_auto_reconnect(config.known_devices.clone(), config.reconnect_interval())
        .expect("start reconnect supervisor");

    // Stand-in for an audio render callback at ~1.3 ms blocks.
    let block = Duration::from_micros(1333);
    let report_every = Duration::from_secs(1);
    let mut last_report = Instant::now();

    loop {
        let t = mgr.latest_touch();
        if onset.poll(now_ms(), &t) {
            let (nx, ny) = calibration.convert_to_normalized(&t);
            println!("click at ({nx:.3}, {ny:.3}) raw=({}, {})", t.x, t.y);
        }

        if last_report.elapsed() >= report_every {
            last_report = Instant::now();
            let snap = mgr.snapshot();
            let s = snap.stats;
            println!(
                "{:?} touches={} rate={:.1}Hz avg={:.2}ms min={:.2}ms max={:.2}ms n={}",
                snap.state,
                snap.active_touches(),
                s.report_rate_hz,
                s.avg_interval_ms,
                s.min_interval_ms,
                s.max_interval_ms,
                s.sample_count
            );
        }

        thread::sleep(block);
    }
}
