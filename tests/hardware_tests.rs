// tests/hardware_tests.rs
use gpk_tools::backend::{Backend, Enumeration, EnumerationEvent, Query};
use gpk_tools::config::{default_bool, ConfigStore, PROMPT_HARDWARE};
use gpk_tools::error::{Error, Result};
use gpk_tools::hardware::{
    scan_modaliases, DeviceMonitor, HardwareEvent, HardwareNotifier, ACTION_DO_NOT_SHOW,
    ACTION_INSTALL,
};
use gpk_tools::notify::{Notification, NotificationService};
use gpk_tools::pk_enum::{Filter, Filters, Role, Roles};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use std::{env, fs, process};

const NVIDIA: &str = "pci:v000010DEd00002484sv*sd*bc03sc00i00";
const WEBCAM: &str = "usb:v046Dp0825d0012dcEFdsc02dp01ic0Eisc01ip00in00";

fn sysfs_tree(name: &str) -> PathBuf {
    let root = env::temp_dir().join(format!("gpk-sysfs-{}-{}", name, process::id()));
    let _ = fs::remove_dir_all(&root);
    fs::create_dir_all(&root).unwrap();
    root
}

fn add_device(root: &Path, bus: &str, device: &str, modalias: &str) {
    let dir = root.join("bus").join(bus).join("devices").join(device);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("modalias"), format!("{}\n", modalias)).unwrap();
}

/// Answers every driver lookup with the same packages.
#[derive(Default)]
struct FakeBackend {
    roles: Roles,
    packages: Mutex<Vec<String>>,
    lookups: Mutex<Vec<(Query, Filters)>>,
    installed: Mutex<Vec<Vec<String>>>,
}

impl Backend for FakeBackend {
    fn capabilities(&self) -> Result<Roles> {
        Ok(self.roles)
    }

    fn enumerate(&self, query: &Query, filters: Filters) -> Result<Enumeration> {
        self.lookups.lock().unwrap().push((query.clone(), filters));
        let (tx, rx) = mpsc::channel();
        for id in self.packages.lock().unwrap().iter() {
            tx.send(EnumerationEvent::Detail {
                id: id.clone(),
                label: id.clone(),
                enabled: false,
            })
            .unwrap();
        }
        tx.send(EnumerationEvent::Finished).unwrap();
        Ok(Enumeration::new(rx))
    }

    fn set_enabled(&self, _id: &str, _enabled: bool) -> Result<()> {
        Err(Error::rejected("not-supported", "no sources here"))
    }

    fn install_packages(&self, package_ids: &[String]) -> Result<()> {
        self.installed.lock().unwrap().push(package_ids.to_vec());
        Ok(())
    }

    fn watch_repo_list(&self) -> Result<Receiver<()>> {
        Err(Error::BackendUnavailable("not watched".into()))
    }
}

/// Records popups and answers each with a fixed action.
struct FakeNotifier {
    answer: Option<String>,
    shown: Mutex<Vec<Notification>>,
}

impl FakeNotifier {
    fn answering(answer: Option<&str>) -> Self {
        Self {
            answer: answer.map(str::to_string),
            shown: Mutex::new(Vec::new()),
        }
    }
}

impl NotificationService for FakeNotifier {
    fn show(&self, notification: &Notification) -> Result<Option<String>> {
        self.shown.lock().unwrap().push(notification.clone());
        Ok(self.answer.clone())
    }
}

#[derive(Clone, Default)]
struct MemoryConfig {
    values: Arc<Mutex<HashMap<String, bool>>>,
}

impl ConfigStore for MemoryConfig {
    fn get_bool(&self, key: &str) -> Result<bool> {
        let default = default_bool(key).ok_or_else(|| Error::Config(key.to_string()))?;
        Ok(*self.values.lock().unwrap().get(key).unwrap_or(&default))
    }

    fn set_bool(&mut self, key: &str, value: bool) -> Result<()> {
        self.values.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }
}

struct Harness {
    backend: Arc<FakeBackend>,
    notifier: Arc<FakeNotifier>,
    config: MemoryConfig,
    hardware: HardwareNotifier,
    rx: Receiver<HardwareEvent>,
}

impl Harness {
    fn new(root: &Path, packages: &[&str], answer: Option<&str>) -> Self {
        let roles = [Role::WhatProvides, Role::InstallPackages].into_iter().collect();
        Self::with_roles(root, roles, packages, answer)
    }

    fn with_roles(root: &Path, roles: Roles, packages: &[&str], answer: Option<&str>) -> Self {
        let backend = Arc::new(FakeBackend {
            roles,
            ..Default::default()
        });
        *backend.packages.lock().unwrap() = packages.iter().map(|p| p.to_string()).collect();
        let notifier = Arc::new(FakeNotifier::answering(answer));
        let config = MemoryConfig::default();
        let (tx, rx) = mpsc::channel();
        let hardware = HardwareNotifier::new(
            backend.clone(),
            notifier.clone(),
            Box::new(config.clone()),
            root,
            tx,
        );
        Self {
            backend,
            notifier,
            config,
            hardware,
            rx,
        }
    }

    /// Handles queued events until one matching `stop` has been handled.
    fn drive_until<F>(&mut self, stop: F)
    where
        F: Fn(&HardwareEvent) -> bool,
    {
        loop {
            let event = self
                .rx
                .recv_timeout(Duration::from_secs(5))
                .expect("no event within timeout");
            let last = stop(&event);
            self.hardware.handle(event);
            if last {
                return;
            }
        }
    }
}

fn is_lookup_finished(event: &HardwareEvent) -> bool {
    matches!(
        event,
        HardwareEvent::Lookup {
            event: EnumerationEvent::Finished,
            ..
        }
    )
}

fn is_action(event: &HardwareEvent) -> bool {
    matches!(event, HardwareEvent::ActionInvoked { .. })
}

#[test]
fn scan_reads_pci_and_usb_modaliases() {
    let root = sysfs_tree("scan");
    add_device(&root, "pci", "0000:01:00.0", NVIDIA);
    add_device(&root, "usb", "1-1", WEBCAM);
    add_device(&root, "usb", "usb1", "");
    add_device(&root, "i2c", "i2c-0", "i2c:dummy");

    let modaliases: Vec<String> = scan_modaliases(&root).into_iter().collect();

    assert_eq!(modaliases, vec![NVIDIA.to_string(), WEBCAM.to_string()]);
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn monitor_reports_only_new_devices() {
    let root = sysfs_tree("monitor");
    add_device(&root, "pci", "0000:01:00.0", NVIDIA);

    let mut monitor = DeviceMonitor::new(&root);
    assert!(monitor.poll().is_empty());

    add_device(&root, "usb", "1-1", WEBCAM);
    assert_eq!(monitor.poll(), vec![WEBCAM.to_string()]);
    assert!(monitor.poll().is_empty());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn cold_plug_offers_and_installs_drivers() {
    let root = sysfs_tree("install");
    add_device(&root, "pci", "0000:01:00.0", NVIDIA);
    let package = "nvidia-driver;550.54;x86_64;rpmfusion";
    let mut harness = Harness::new(&root, &[package], Some(ACTION_INSTALL));

    harness.hardware.handle(HardwareEvent::ColdPlugCheck);
    harness.drive_until(is_action);
    harness.drive_until(|e| matches!(e, HardwareEvent::InstallFinished(_)));

    let lookups = harness.backend.lookups.lock().unwrap().clone();
    assert_eq!(lookups.len(), 1);
    assert_eq!(lookups[0].0, Query::HardwareDrivers(vec![NVIDIA.to_string()]));
    assert!(lookups[0].1.contains(Filter::NotInstalled));

    let shown = harness.notifier.shown.lock().unwrap().clone();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].title, "Install package?");
    assert_eq!(shown[0].body, "nvidia-driver is needed for this hardware");
    let actions: Vec<&str> = shown[0].actions.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(actions, vec![ACTION_INSTALL, ACTION_DO_NOT_SHOW]);

    assert_eq!(
        *harness.backend.installed.lock().unwrap(),
        vec![vec![package.to_string()]]
    );
    assert_eq!(harness.hardware.offered(), vec![package.to_string()]);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn same_drivers_are_not_offered_twice() {
    let root = sysfs_tree("repeat");
    add_device(&root, "pci", "0000:01:00.0", NVIDIA);
    let mut harness = Harness::new(&root, &["nvidia-driver;550;x86_64;repo"], None);

    harness.hardware.handle(HardwareEvent::ColdPlugCheck);
    harness.drive_until(is_action);
    assert_eq!(harness.notifier.shown.lock().unwrap().len(), 1);

    add_device(&root, "usb", "1-1", WEBCAM);
    harness
        .hardware
        .handle(HardwareEvent::DevicesAdded(vec![WEBCAM.to_string()]));
    harness.drive_until(is_lookup_finished);

    assert_eq!(harness.backend.lookups.lock().unwrap().len(), 2);
    assert_eq!(harness.notifier.shown.lock().unwrap().len(), 1);
    assert!(harness.backend.installed.lock().unwrap().is_empty());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn do_not_show_disables_further_checks() {
    let root = sysfs_tree("do-not-show");
    add_device(&root, "pci", "0000:01:00.0", NVIDIA);
    let mut harness = Harness::new(&root, &["nvidia-driver;550;x86_64;repo"], Some(ACTION_DO_NOT_SHOW));

    assert!(harness.hardware.prompt_enabled());
    harness.hardware.handle(HardwareEvent::ColdPlugCheck);
    harness.drive_until(is_action);

    assert!(!harness.config.get_bool(PROMPT_HARDWARE).unwrap());
    assert!(!harness.hardware.prompt_enabled());

    harness
        .hardware
        .handle(HardwareEvent::DevicesAdded(vec![WEBCAM.to_string()]));
    assert_eq!(harness.backend.lookups.lock().unwrap().len(), 1);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn no_drivers_means_no_popup() {
    let root = sysfs_tree("none");
    add_device(&root, "pci", "0000:01:00.0", NVIDIA);
    let mut harness = Harness::new(&root, &[], None);

    harness.hardware.handle(HardwareEvent::ColdPlugCheck);
    harness.drive_until(is_lookup_finished);

    assert!(harness.notifier.shown.lock().unwrap().is_empty());
    assert!(harness.hardware.offered().is_empty());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn no_devices_skips_lookup() {
    let root = sysfs_tree("empty");
    let mut harness = Harness::new(&root, &["anything;1;noarch;repo"], None);

    harness.hardware.handle(HardwareEvent::ColdPlugCheck);

    assert!(harness.backend.lookups.lock().unwrap().is_empty());
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn unknown_action_is_ignored() {
    let root = sysfs_tree("unknown-action");
    let mut harness = Harness::new(&root, &[], None);

    harness.hardware.handle(HardwareEvent::ActionInvoked {
        action: Some("install-driver".into()),
        package_ids: vec!["foo;1;noarch;repo".into()],
    });

    assert!(harness.rx.try_recv().is_err());
    assert!(harness.config.get_bool(PROMPT_HARDWARE).unwrap());
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn superseded_lookup_still_offers_its_drivers() {
    let root = sysfs_tree("superseded");
    add_device(&root, "pci", "0000:01:00.0", NVIDIA);
    let mut harness = Harness::new(&root, &["nvidia-driver;550;x86_64;repo"], None);

    harness.hardware.handle(HardwareEvent::ColdPlugCheck);
    // Only the first lookup's detail arrives before the next check starts.
    let first = harness
        .rx
        .recv_timeout(Duration::from_secs(5))
        .expect("no lookup event");
    assert!(matches!(
        first,
        HardwareEvent::Lookup {
            event: EnumerationEvent::Detail { .. },
            ..
        }
    ));
    harness.hardware.handle(first);

    add_device(&root, "usb", "1-1", WEBCAM);
    harness
        .hardware
        .handle(HardwareEvent::DevicesAdded(vec![WEBCAM.to_string()]));
    harness.drive_until(is_action);

    assert_eq!(harness.backend.lookups.lock().unwrap().len(), 2);
    let shown = harness.notifier.shown.lock().unwrap().clone();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].body, "nvidia-driver is needed for this hardware");
    assert_eq!(
        harness.hardware.offered(),
        vec!["nvidia-driver;550;x86_64;repo".to_string()]
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn backend_without_driver_roles_is_not_asked() {
    let root = sysfs_tree("no-roles");
    add_device(&root, "pci", "0000:01:00.0", NVIDIA);
    let roles = [Role::WhatProvides].into_iter().collect();
    let mut harness = Harness::with_roles(&root, roles, &["nvidia-driver;550;x86_64;repo"], None);

    harness.hardware.handle(HardwareEvent::ColdPlugCheck);

    assert!(harness.backend.lookups.lock().unwrap().is_empty());
    assert!(harness.rx.try_recv().is_err());
    let _ = fs::remove_dir_all(&root);
}
