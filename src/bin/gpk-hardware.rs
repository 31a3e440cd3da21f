use anyhow::{Context, Error};
use gpk_tools::config::{self, PROMPT_HARDWARE};
use gpk_tools::hardware::{self, HardwareNotifier, LOGIN_DELAY, POLL_INTERVAL, SYSFS_ROOT};
use gpk_tools::logging;
use gpk_tools::notify::DesktopNotifier;
use gpk_tools::packagekit::{self, PackageKitClient};
use log::info;
use std::path::Path;
use std::sync::{mpsc, Arc};

fn main() -> Result<(), Error> {
    let args: Vec<String> = std::env::args().collect();
    logging::init(logging::verbose_requested(&args));

    let config = config::open_default().context("Could not open settings")?;
    if !config.get_bool(PROMPT_HARDWARE).unwrap_or(true) {
        info!("hardware driver checking disabled in settings");
        return Ok(());
    }

    let runtime = packagekit::new_runtime().context("Could not start the D-Bus runtime")?;
    let backend = Arc::new(PackageKitClient::new(runtime.clone()));
    let notifier = Arc::new(DesktopNotifier::new(runtime));

    let sysfs_root = Path::new(SYSFS_ROOT);
    let (tx, rx) = mpsc::channel();
    hardware::spawn_device_monitor(sysfs_root, POLL_INTERVAL, tx.clone());
    hardware::schedule_cold_plug_check(LOGIN_DELAY, tx.clone());

    info!("watching for new hardware");
    HardwareNotifier::new(backend, notifier, config, sysfs_root, tx).run(rx);
    Ok(())
}
