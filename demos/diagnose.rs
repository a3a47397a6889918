use touchup::{DeviceFamily, TouchDeviceManager};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mgr = TouchDeviceManager::new();
    let devices = mgr.available_devices().expect("enumerate HID devices");

    println!("Discovered {} HID device(s)", devices.len());
    for d in &devices {
        let family = d.family();
        let marker = if family == DeviceFamily::Unknown { " " } else { "*" };
        println!("{marker} {d} [{family:?}]");
    }

    println!("{}", serde_json::to_string_pretty(&devices).expect("serialize device list"));
}
