// src/hardware.rs
//
// Session daemon that watches for new devices and offers to install the
// driver packages the backend knows for them.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::backend::{Backend, EnumerationEvent, Query};
use crate::config::{ConfigStore, PROMPT_HARDWARE};
use crate::error::Result;
use crate::model::PackageId;
use crate::notify::{Notification, NotificationService};
use crate::pk_enum::{Filter, Role};
use crate::reconciler::{CycleId, ListReconciler};

pub const SYSFS_ROOT: &str = "/sys";
/// Cold-plugged hardware is checked once the login has settled.
pub const LOGIN_DELAY: Duration = Duration::from_secs(50);
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

pub const ACTION_INSTALL: &str = "install-package";
pub const ACTION_DO_NOT_SHOW: &str = "do-not-show-prompt-hardware";

const DEVICE_BUSES: [&str; 2] = ["pci", "usb"];

/// Modaliases of every PCI and USB device under `root` (normally `/sys`).
pub fn scan_modaliases(root: &Path) -> BTreeSet<String> {
    let mut modaliases = BTreeSet::new();

    for bus in DEVICE_BUSES {
        let devices = root.join("bus").join(bus).join("devices");
        if let Ok(entries) = fs::read_dir(&devices) {
            for entry in entries.flatten() {
                let modalias_path = entry.path().join("modalias");
                if let Ok(modalias) = fs::read_to_string(modalias_path) {
                    let modalias = modalias.trim();
                    if !modalias.is_empty() {
                        modaliases.insert(modalias.to_string());
                    }
                }
            }
        }
    }

    modaliases
}

/// Reports modaliases that were not present at the previous scan.
pub struct DeviceMonitor {
    root: PathBuf,
    known: BTreeSet<String>,
}

impl DeviceMonitor {
    /// The devices present now are the baseline.
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            known: scan_modaliases(root),
        }
    }

    pub fn poll(&mut self) -> Vec<String> {
        let current = scan_modaliases(&self.root);
        let added: Vec<String> = current.difference(&self.known).cloned().collect();
        self.known = current;
        added
    }
}

#[derive(Debug)]
pub enum HardwareEvent {
    ColdPlugCheck,
    DevicesAdded(Vec<String>),
    Lookup { cycle: CycleId, event: EnumerationEvent },
    ActionInvoked { action: Option<String>, package_ids: Vec<String> },
    InstallFinished(Result<()>),
}

pub fn spawn_device_monitor(root: &Path, interval: Duration, tx: Sender<HardwareEvent>) {
    let mut monitor = DeviceMonitor::new(root);
    thread::spawn(move || loop {
        thread::sleep(interval);
        let added = monitor.poll();
        if !added.is_empty() && tx.send(HardwareEvent::DevicesAdded(added)).is_err() {
            break;
        }
    });
}

pub fn schedule_cold_plug_check(delay: Duration, tx: Sender<HardwareEvent>) {
    thread::spawn(move || {
        thread::sleep(delay);
        let _ = tx.send(HardwareEvent::ColdPlugCheck);
    });
}

/// Tracks the driver packages available for the present hardware. Each check
/// is a full lookup over all devices, reconciled into `offered`; only
/// packages not yet `announced` in a popup produce one.
pub struct HardwareNotifier {
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn NotificationService>,
    config: Box<dyn ConfigStore>,
    sysfs_root: PathBuf,
    offered: ListReconciler,
    announced: HashSet<String>,
    tx: Sender<HardwareEvent>,
}

impl HardwareNotifier {
    pub fn new(
        backend: Arc<dyn Backend>,
        notifier: Arc<dyn NotificationService>,
        config: Box<dyn ConfigStore>,
        sysfs_root: &Path,
        tx: Sender<HardwareEvent>,
    ) -> Self {
        Self {
            backend,
            notifier,
            config,
            sysfs_root: sysfs_root.to_path_buf(),
            offered: ListReconciler::new(),
            announced: HashSet::new(),
            tx,
        }
    }

    pub fn prompt_enabled(&self) -> bool {
        self.config.get_bool(PROMPT_HARDWARE).unwrap_or_else(|err| {
            warn!("failed to read {}: {}", PROMPT_HARDWARE, err);
            true
        })
    }

    /// Package ids currently offered, in presentation order.
    pub fn offered(&self) -> Vec<String> {
        self.offered
            .collection()
            .sorted_by_label()
            .into_iter()
            .map(|entry| entry.id.clone())
            .collect()
    }

    pub fn run(mut self, rx: Receiver<HardwareEvent>) {
        for event in rx {
            self.handle(event);
        }
    }

    pub fn handle(&mut self, event: HardwareEvent) {
        match event {
            HardwareEvent::ColdPlugCheck => {
                debug!("checking cold plugged hardware");
                self.check_for_driver_available();
            }
            HardwareEvent::DevicesAdded(modaliases) => {
                debug!("devices added: {}", modaliases.join(", "));
                self.check_for_driver_available();
            }
            HardwareEvent::Lookup { cycle, event } => self.on_lookup_event(cycle, event),
            HardwareEvent::ActionInvoked {
                action,
                package_ids,
            } => self.on_action(action.as_deref(), package_ids),
            HardwareEvent::InstallFinished(Ok(())) => info!("driver packages installed"),
            HardwareEvent::InstallFinished(Err(err)) => warn!("failed to install package: {}", err),
        }
    }

    fn check_for_driver_available(&mut self) {
        if !self.prompt_enabled() {
            debug!("hardware driver checking disabled");
            return;
        }

        match self.backend.capabilities() {
            Ok(roles)
                if roles.contains(Role::WhatProvides) && roles.contains(Role::InstallPackages) => {}
            Ok(_) => {
                debug!("backend cannot look up or install drivers");
                return;
            }
            Err(err) => {
                warn!("failed to get backend roles: {}", err);
                return;
            }
        }

        let modaliases: Vec<String> = scan_modaliases(&self.sysfs_root).into_iter().collect();
        if modaliases.is_empty() {
            debug!("no devices to check");
            return;
        }

        let query = Query::HardwareDrivers(modaliases);
        let enumeration = match self.backend.enumerate(&query, Filter::NotInstalled.into()) {
            Ok(enumeration) => enumeration,
            Err(err) => {
                warn!("error looking up drivers: {}", err);
                return;
            }
        };

        if self.offered.is_refreshing() {
            debug!("superseding the driver lookup in flight");
        }
        let cycle = self.offered.begin_refresh();
        let tx = self.tx.clone();
        thread::spawn(move || {
            for event in enumeration {
                if tx.send(HardwareEvent::Lookup { cycle, event }).is_err() {
                    break;
                }
            }
        });
    }

    fn on_lookup_event(&mut self, cycle: CycleId, event: EnumerationEvent) {
        match event {
            EnumerationEvent::Detail { id, label, enabled } => {
                self.offered.upsert(cycle, &id, &label, enabled);
            }
            EnumerationEvent::Status(status) => {
                debug!("lookup status: {}", status.to_localised_text());
            }
            EnumerationEvent::Finished => {
                let Some(removed) = self.offered.end_refresh(cycle) else {
                    return;
                };
                for entry in removed {
                    debug!("no longer offering {}", entry.id);
                    self.announced.remove(&entry.id);
                }
                let fresh: Vec<String> = self
                    .offered()
                    .into_iter()
                    .filter(|id| !self.announced.contains(id))
                    .collect();
                if fresh.is_empty() {
                    debug!("no new drivers available");
                } else {
                    self.announced.extend(fresh.iter().cloned());
                    self.prompt_install(fresh);
                }
            }
            EnumerationEvent::Failed(err) => {
                if self.offered.abort(cycle) {
                    warn!("driver lookup failed: {}", err);
                }
            }
        }
    }

    fn prompt_install(&self, package_ids: Vec<String>) {
        let names: Vec<String> = package_ids
            .iter()
            .map(|id| PackageId::display_name(id))
            .collect();
        let message = format!("{} is needed for this hardware", names.join(", "));
        let notification = Notification::new("Install package?", &message, "help-browser")
            .with_action(ACTION_INSTALL, "Install package")
            .with_action(ACTION_DO_NOT_SHOW, "Do not show this again");

        let notifier = self.notifier.clone();
        let tx = self.tx.clone();
        thread::spawn(move || match notifier.show(&notification) {
            Ok(action) => {
                let _ = tx.send(HardwareEvent::ActionInvoked {
                    action,
                    package_ids,
                });
            }
            Err(err) => warn!("error: {}", err),
        });
    }

    fn on_action(&mut self, action: Option<&str>, package_ids: Vec<String>) {
        match action {
            Some(ACTION_INSTALL) => {
                let backend = self.backend.clone();
                let tx = self.tx.clone();
                thread::spawn(move || {
                    let result = backend.install_packages(&package_ids);
                    let _ = tx.send(HardwareEvent::InstallFinished(result));
                });
            }
            Some(ACTION_DO_NOT_SHOW) => {
                debug!("set {} to false", PROMPT_HARDWARE);
                if let Err(err) = self.config.set_bool(PROMPT_HARDWARE, false) {
                    warn!("failed to save {}: {}", PROMPT_HARDWARE, err);
                }
            }
            Some(other) => warn!("unknown action id: {}", other),
            None => debug!("notification dismissed"),
        }
    }
}
