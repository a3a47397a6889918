use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use touchup::backends::virtual_input::{VirtualBackend, VirtualDevice};
use touchup::touch::now_ms;
use touchup::{
    ConnectionState, DeviceIdentity, OnsetDetector, TouchConfig, TouchDeviceManager, TouchSample,
    ELO_TOUCH_VID_PID, STANDARD_DIGITIZER_VID_PID,
};

fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}

fn digitizer_report(points: &[(u8, u8, u16, u16)]) -> Vec<u8> {
    let mut r = vec![0u8; 44];
    r[0] = 1;
    for (i, &(tip, id, x, y)) in points.iter().enumerate() {
        let o = 1 + i * 5;
        r[o] = (id << 3) | tip;
        r[o + 1..o + 3].copy_from_slice(&x.to_le_bytes());
        r[o + 3..o + 5].copy_from_slice(&y.to_le_bytes());
    }
    r[43] = points.len() as u8;
    r
}

fn elo_report(x: u16, y: u16) -> Vec<u8> {
    let mut r = vec![0u8; 64];
    r[0] = 1;
    r[2..4].copy_from_slice(&x.to_le_bytes());
    r[6..8].copy_from_slice(&y.to_le_bytes());
    r[58] = if x > 0 { 0x02 } else { 0x01 };
    r
}

fn setup(vid_pid: (u16, u16)) -> (Arc<VirtualBackend>, VirtualDevice, TouchDeviceManager) {
    let backend = Arc::new(VirtualBackend::new());
    let mut id = DeviceIdentity::new(vid_pid.0, vid_pid.1, "virtual:touch");
    id.product = "Virtual Touch".into();
    let dev = backend.add_device(id);
    let mgr = TouchDeviceManager::with_backend(backend.clone(), TouchConfig::default());
    (backend, dev, mgr)
}

#[derive(Default)]
struct EdgeLog(Mutex<Vec<TouchSample>>);

impl touchup::TouchListener for EdgeLog {
    fn on_touch(&self, sample: &TouchSample) {
        self.0.lock().unwrap().push(*sample);
    }
}

#[test]
fn digitizer_reports_reach_both_publish_paths() {
    let (_backend, dev, mgr) = setup(STANDARD_DIGITIZER_VID_PID);
    let edges = Arc::new(EdgeLog::default());
    mgr.add_listener(edges.clone()).unwrap();
    mgr.connect(dev.identity()).unwrap();

    dev.feed(digitizer_report(&[(1, 1, 100, 200), (1, 4, 3000, 4000)]));
    assert!(wait_for(|| mgr.all_touches().len() == 2));

    let latest = mgr.latest_touch();
    assert!(latest.active);
    assert_eq!((latest.x, latest.y, latest.contact_id), (100, 200, 1));
    let ids: Vec<u8> = mgr.all_touches().iter().map(|t| t.contact_id).collect();
    assert_eq!(ids, vec![1, 4]);

    // Fingers lifted: every tip switch clear.
    dev.feed(digitizer_report(&[(0, 1, 100, 200), (0, 4, 3000, 4000)]));
    assert!(wait_for(|| !mgr.latest_touch().active));
    assert!(mgr.all_touches().is_empty());

    let edges = edges.0.lock().unwrap();
    assert_eq!(edges.len(), 2);
    assert!(edges[0].active);
    assert!(!edges[1].active);
}

#[test]
fn listeners_fire_on_edges_not_on_every_report() {
    let (_backend, dev, mgr) = setup(ELO_TOUCH_VID_PID);
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    mgr.add_listener(Arc::new(move |_: &TouchSample| {
        c.fetch_add(1, Ordering::SeqCst);
    }))
    .unwrap();
    mgr.connect(dev.identity()).unwrap();

    for i in 0..5 {
        dev.feed(elo_report(1000 + i, 2000));
    }
    dev.feed(elo_report(0, 0));
    assert!(wait_for(|| dev.pending() == 0 && !mgr.latest_touch().active));
    assert!(wait_for(|| count.load(Ordering::SeqCst) == 2));
    thread::sleep(Duration::from_millis(20));
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[test]
fn timing_stats_count_only_consecutive_active_reports() {
    let (_backend, dev, mgr) = setup(ELO_TOUCH_VID_PID);
    mgr.connect(dev.identity()).unwrap();

    // Three active reports -> two intervals, then a lift and a fresh touch.
    for x in [1000, 1010, 1020] {
        dev.feed(elo_report(x, 500));
        assert!(wait_for(|| dev.pending() == 0));
        thread::sleep(Duration::from_millis(3));
    }
    dev.feed(elo_report(0, 0));
    dev.feed(elo_report(1000, 500));
    assert!(wait_for(|| dev.pending() == 0));
    thread::sleep(Duration::from_millis(10));

    let stats = mgr.report_stats();
    assert_eq!(stats.sample_count, 2);
    assert!(stats.min_interval_ms > 0.0);
    assert!(stats.min_interval_ms <= stats.avg_interval_ms);
    assert!(stats.avg_interval_ms <= stats.max_interval_ms);
    assert!(stats.report_rate_hz > 0.0);
}

#[test]
fn noise_does_not_disturb_published_state() {
    let (_backend, dev, mgr) = setup(STANDARD_DIGITIZER_VID_PID);
    mgr.connect(dev.identity()).unwrap();

    dev.feed(digitizer_report(&[(1, 2, 500, 600)]));
    assert!(wait_for(|| mgr.latest_touch().active));

    dev.feed(vec![1u8; 10]); // short
    let mut wrong_id = digitizer_report(&[]);
    wrong_id[0] = 7;
    dev.feed(wrong_id);
    assert!(wait_for(|| dev.pending() == 0));
    thread::sleep(Duration::from_millis(10));

    let latest = mgr.latest_touch();
    assert!(latest.active);
    assert_eq!((latest.x, latest.y, latest.contact_id), (500, 600, 2));
}

#[test]
fn unknown_devices_connect_but_decode_nothing() {
    let (_backend, dev, mgr) = setup((0x046D, 0xC52B));
    mgr.connect(dev.identity()).unwrap();
    dev.feed(elo_report(1000, 1000));
    dev.feed(digitizer_report(&[(1, 1, 100, 200)]));
    assert!(wait_for(|| dev.pending() == 0));
    thread::sleep(Duration::from_millis(10));
    assert!(mgr.is_device_connected());
    assert!(!mgr.latest_touch().active);
    assert!(mgr.all_touches().is_empty());
}

#[test]
fn read_error_disconnects_automatically() {
    let (_backend, dev, mgr) = setup(STANDARD_DIGITIZER_VID_PID);
    let edges = Arc::new(EdgeLog::default());
    mgr.add_listener(edges.clone()).unwrap();
    mgr.connect(dev.identity()).unwrap();
    assert!(mgr.is_device_connected());

    dev.feed(digitizer_report(&[(1, 2, 500, 600)]));
    assert!(wait_for(|| mgr.latest_touch().active));

    dev.fail_read("EIO");
    assert!(wait_for(|| !mgr.is_device_connected()));
    assert_eq!(mgr.connection_state(), ConnectionState::Disconnected);
    assert!(mgr.connected_device().is_none());
    assert!(wait_for(|| dev.open_handles() == 0));

    // The finger on the vanished device is released, not left showing.
    assert!(wait_for(|| !mgr.latest_touch().active));
    assert!(mgr.all_touches().is_empty());
    assert!(wait_for(|| edges.0.lock().unwrap().len() == 2));
    assert!(!edges.0.lock().unwrap()[1].active);

    // A later explicit disconnect is harmless.
    mgr.disconnect();
    assert!(!mgr.is_device_connected());
}

#[test]
fn refused_nonblocking_mode_fails_the_connect() {
    let (_backend, dev, mgr) = setup(STANDARD_DIGITIZER_VID_PID);
    dev.refuse_nonblocking(true);
    assert!(mgr.connect(dev.identity()).is_err());
    assert_eq!(mgr.connection_state(), ConnectionState::Disconnected);
    assert!(mgr.connected_device().is_none());
    assert_eq!(dev.open_handles(), 0);

    dev.refuse_nonblocking(false);
    mgr.connect(dev.identity()).unwrap();
    assert!(mgr.is_device_connected());
}

#[test]
fn detached_poller_cannot_disturb_a_newer_connection() {
    let backend = Arc::new(VirtualBackend::new());
    let (vid, pid) = STANDARD_DIGITIZER_VID_PID;
    let a = backend.add_device(DeviceIdentity::new(vid, pid, "virtual:a"));
    let b = backend.add_device(DeviceIdentity::new(vid, pid, "virtual:b"));
    let config = TouchConfig {
        disconnect_timeout_ms: 50,
        ..TouchConfig::default()
    };
    let mgr = TouchDeviceManager::with_backend(backend.clone(), config);

    mgr.connect(a.identity()).unwrap();
    a.stall_read(Duration::from_millis(400));
    // a's polling thread is now wedged inside the read.
    assert!(wait_for(|| a.pending() == 0));

    // Waits 50 ms for a's thread, then detaches it.
    mgr.connect(b.identity()).unwrap();
    b.feed(digitizer_report(&[(1, 6, 900, 901)]));
    assert!(wait_for(|| mgr.latest_touch().active));

    // a's read finally fails; its thread exits without touching b's state.
    assert!(wait_for(|| a.open_handles() == 0));
    thread::sleep(Duration::from_millis(20));
    assert!(mgr.is_device_connected());
    assert_eq!(mgr.connected_device().as_ref(), Some(b.identity()));
    let latest = mgr.latest_touch();
    assert!(latest.active);
    assert_eq!((latest.x, latest.y, latest.contact_id), (900, 901, 6));
    assert_eq!(b.open_handles(), 1);
}

#[test]
fn auto_reconnect_recovers_after_unplug() {
    let (_backend, dev, mgr) = setup(STANDARD_DIGITIZER_VID_PID);
    let mgr = Arc::new(mgr);
    mgr.enable_auto_reconnect(vec![STANDARD_DIGITIZER_VID_PID], Duration::from_millis(20))
        .unwrap();
    assert!(wait_for(|| mgr.is_device_connected()));

    dev.unplug();
    assert!(wait_for(|| !mgr.is_device_connected()));

    dev.plug_in();
    assert!(wait_for(|| mgr.is_device_connected()));
    assert_eq!(mgr.connected_device().as_ref(), Some(dev.identity()));

    mgr.disable_auto_reconnect();
    mgr.disconnect();
    assert!(wait_for(|| dev.open_handles() == 0));
}

#[test]
fn auto_reconnect_ignores_unlisted_devices() {
    let (_backend, _dev, mgr) = setup(STANDARD_DIGITIZER_VID_PID);
    let mgr = Arc::new(mgr);
    mgr.enable_auto_reconnect(vec![ELO_TOUCH_VID_PID], Duration::from_millis(10))
        .unwrap();
    thread::sleep(Duration::from_millis(60));
    assert!(!mgr.is_device_connected());
    mgr.disable_auto_reconnect();
}

/// Feeds one report and waits until the polling thread has published it.
fn feed_and_wait(dev: &VirtualDevice, mgr: &TouchDeviceManager, report: Vec<u8>) -> TouchSample {
    let before = mgr.latest_touch();
    dev.feed(report);
    assert!(wait_for(|| mgr.latest_touch() != before));
    mgr.latest_touch()
}

#[test]
fn onset_detector_holds_a_long_press() {
    let (_backend, dev, mgr) = setup(ELO_TOUCH_VID_PID);
    let onset = OnsetDetector::new(Duration::from_millis(50));
    mgr.connect(dev.identity()).unwrap();

    // ~300 ms of reports every 5 ms, far longer than the release timeout.
    let mut clicks = 0;
    for i in 0..60u16 {
        let latest = feed_and_wait(&dev, &mgr, elo_report(4000 + i, 4000));
        if onset.poll(now_ms(), &latest) {
            clicks += 1;
        }
        assert!(onset.is_touching(), "press dropped after {i} reports");
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(clicks, 1);
}

#[test]
fn onset_detector_retriggers_without_a_release_report() {
    let (_backend, dev, mgr) = setup(ELO_TOUCH_VID_PID);
    let onset = OnsetDetector::new(Duration::from_millis(50));
    mgr.connect(dev.identity()).unwrap();

    let latest = feed_and_wait(&dev, &mgr, elo_report(4000, 4000));
    assert!(onset.poll(now_ms(), &latest));

    // The device goes silent; the published word stays active.
    assert!(wait_for(|| {
        let _ = onset.poll(now_ms(), &mgr.latest_touch());
        !onset.is_touching()
    }));
    assert!(mgr.latest_touch().active);

    let latest = feed_and_wait(&dev, &mgr, elo_report(9000, 9000));
    assert!(onset.poll(now_ms(), &latest));
    assert!(onset.is_touching());
}

#[test]
fn snapshot_reflects_connection() {
    let (_backend, dev, mgr) = setup(STANDARD_DIGITIZER_VID_PID);
    assert_eq!(mgr.snapshot().state, ConnectionState::Disconnected);

    mgr.connect(dev.identity()).unwrap();
    dev.feed(digitizer_report(&[(1, 3, 700, 800)]));
    assert!(wait_for(|| mgr.snapshot().active_touches() == 1));

    let snap = mgr.snapshot();
    assert_eq!(snap.state, ConnectionState::Connected);
    assert_eq!(snap.device.as_ref(), Some(dev.identity()));
    assert!(snap.to_json().unwrap().contains("\"contact_id\":3"));
}
