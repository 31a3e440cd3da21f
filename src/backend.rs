// src/backend.rs

use std::sync::mpsc::{Receiver, TryRecvError};

use crate::error::{Error, Result};
use crate::pk_enum::{Filters, Roles, Status};

/// What an enumeration lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Repositories,
    /// Driver packages for the given device modaliases.
    HardwareDrivers(Vec<String>),
}

#[derive(Debug)]
pub enum EnumerationEvent {
    Detail { id: String, label: String, enabled: bool },
    Status(Status),
    Finished,
    Failed(Error),
}

impl EnumerationEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EnumerationEvent::Finished | EnumerationEvent::Failed(_))
    }
}

/// Handle to a running enumeration. Yields details and status changes, then
/// exactly one terminal event.
pub struct Enumeration {
    rx: Receiver<EnumerationEvent>,
    done: bool,
}

impl Enumeration {
    pub fn new(rx: Receiver<EnumerationEvent>) -> Self {
        Self { rx, done: false }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Next event if one is ready.
    pub fn try_next(&mut self) -> Option<EnumerationEvent> {
        if self.done {
            return None;
        }
        match self.rx.try_recv() {
            Ok(event) => Some(self.track(event)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(self.vanished()),
        }
    }

    fn track(&mut self, event: EnumerationEvent) -> EnumerationEvent {
        if event.is_terminal() {
            self.done = true;
        }
        event
    }

    fn vanished(&mut self) -> EnumerationEvent {
        self.done = true;
        EnumerationEvent::Failed(Error::BackendUnavailable(
            "enumeration ended without a result".to_string(),
        ))
    }
}

/// Blocking iteration, for worker threads.
impl Iterator for Enumeration {
    type Item = EnumerationEvent;

    fn next(&mut self) -> Option<EnumerationEvent> {
        if self.done {
            return None;
        }
        match self.rx.recv() {
            Ok(event) => Some(self.track(event)),
            Err(_) => Some(self.vanished()),
        }
    }
}

/// The package management service. Calls other than `enumerate` and
/// `watch_repo_list` block until the backend has answered, so the UI calls
/// them from worker threads.
pub trait Backend: Send + Sync {
    fn capabilities(&self) -> Result<Roles>;

    /// Dispatches the query and returns without waiting for results.
    /// An `Err` means nothing was dispatched.
    fn enumerate(&self, query: &Query, filters: Filters) -> Result<Enumeration>;

    fn set_enabled(&self, id: &str, enabled: bool) -> Result<()>;

    fn install_packages(&self, package_ids: &[String]) -> Result<()>;

    /// Receives one message each time the backend's source list changes.
    fn watch_repo_list(&self) -> Result<Receiver<()>>;
}
