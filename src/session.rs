// src/session.rs
//
// State of one software-sources window: the backend handle, settings, the
// reconciled source list and whatever requests are still in flight. Lives on
// the UI thread; worker threads only report back through channels.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;

use log::{debug, warn};

use crate::backend::{Backend, Enumeration, EnumerationEvent, Query};
use crate::config::{ConfigStore, REPO_SHOW_DETAILS};
use crate::error::{Error, Result};
use crate::model::Entry;
use crate::pk_enum::{Filter, Role, Roles, Status};
use crate::reconciler::{CycleId, ListReconciler};

pub const UNSUPPORTED_ID: &str = "default";
pub const UNSUPPORTED_LABEL: &str = "Getting software source list not supported by backend";

/// What the view has to redraw after a `poll`.
#[derive(Debug)]
pub enum SessionUpdate {
    Upserted(Entry),
    Removed(Vec<Entry>),
    Status(Status),
    RefreshFinished,
    RefreshFailed(Error),
    ToggleApplied { id: String, enabled: bool },
    /// `enabled` is the restored value.
    ToggleFailed { id: String, enabled: bool, error: Error },
}

struct ToggleResult {
    id: String,
    enabled: bool,
    result: Result<()>,
}

pub struct SourcesSession {
    backend: Arc<dyn Backend>,
    config: Box<dyn ConfigStore>,
    roles: Roles,
    show_details: bool,
    reconciler: ListReconciler,
    pending: Option<(CycleId, Enumeration)>,
    repo_list_changes: Option<Receiver<()>>,
    toggle_tx: Sender<ToggleResult>,
    toggle_rx: Receiver<ToggleResult>,
}

impl SourcesSession {
    pub fn new(backend: Arc<dyn Backend>, config: Box<dyn ConfigStore>) -> Self {
        let roles = backend.capabilities().unwrap_or_else(|err| {
            warn!("failed to get backend roles: {}", err);
            Roles::empty()
        });
        let show_details = config.get_bool(REPO_SHOW_DETAILS).unwrap_or_else(|err| {
            warn!("failed to read {}: {}", REPO_SHOW_DETAILS, err);
            false
        });
        let repo_list_changes = match backend.watch_repo_list() {
            Ok(changes) => Some(changes),
            Err(err) => {
                warn!("not watching for source list changes: {}", err);
                None
            }
        };
        let (toggle_tx, toggle_rx) = mpsc::channel();

        Self {
            backend,
            config,
            roles,
            show_details,
            reconciler: ListReconciler::new(),
            pending: None,
            repo_list_changes,
            toggle_tx,
            toggle_rx,
        }
    }

    pub fn roles(&self) -> Roles {
        self.roles
    }

    pub fn can_list(&self) -> bool {
        self.roles.contains(Role::GetRepoList)
    }

    pub fn can_toggle(&self) -> bool {
        self.roles.contains(Role::RepoEnable)
    }

    pub fn show_details(&self) -> bool {
        self.show_details
    }

    pub fn is_refreshing(&self) -> bool {
        self.pending.is_some()
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.reconciler
            .collection()
            .sorted_by_label()
            .into_iter()
            .cloned()
            .collect()
    }

    /// First load. Without list support a single placeholder row explains why.
    pub fn start(&mut self) -> Vec<SessionUpdate> {
        if self.can_list() {
            return match self.refresh() {
                Ok(()) => Vec::new(),
                Err(err) => vec![SessionUpdate::RefreshFailed(err)],
            };
        }

        let cycle = self.reconciler.begin_refresh();
        let mut updates = Vec::new();
        if let Some(entry) = self
            .reconciler
            .upsert(cycle, UNSUPPORTED_ID, UNSUPPORTED_LABEL, false)
        {
            updates.push(SessionUpdate::Upserted(entry.clone()));
        }
        if let Some(removed) = self.reconciler.end_refresh(cycle) {
            if !removed.is_empty() {
                updates.push(SessionUpdate::Removed(removed));
            }
        }
        updates
    }

    /// Asks the backend for the source list. A dispatch failure leaves the
    /// current list untouched.
    pub fn refresh(&mut self) -> Result<()> {
        if !self.can_list() {
            return Err(Error::Unsupported(Role::GetRepoList));
        }
        let filter = if self.show_details {
            Filter::None
        } else {
            Filter::NotDevelopment
        };
        debug!("refreshing list");
        let enumeration = self.backend.enumerate(&Query::Repositories, filter.into())?;
        let cycle = self.reconciler.begin_refresh();
        self.pending = Some((cycle, enumeration));
        Ok(())
    }

    pub fn set_show_details(&mut self, show_details: bool) -> Result<()> {
        debug!("changing {} to {}", REPO_SHOW_DETAILS, show_details);
        self.show_details = show_details;
        let saved = self.config.set_bool(REPO_SHOW_DETAILS, show_details);
        self.refresh()?;
        saved
    }

    /// Flips the source locally and sends the change to the backend on a
    /// worker thread. The outcome arrives through `poll`.
    pub fn toggle(&mut self, id: &str) -> Result<bool> {
        let enabled = self.reconciler.toggle(self.roles, id)?;
        let backend = self.backend.clone();
        let tx = self.toggle_tx.clone();
        let id = id.to_string();

        thread::spawn(move || {
            let result = backend.set_enabled(&id, enabled);
            let _ = tx.send(ToggleResult {
                id,
                enabled,
                result,
            });
        });
        Ok(enabled)
    }

    /// Applies everything that arrived since the last call.
    pub fn poll(&mut self) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();

        if self.take_repo_list_change() {
            debug!("source list changed, refreshing");
            if let Err(err) = self.refresh() {
                updates.push(SessionUpdate::RefreshFailed(err));
            }
        }

        self.drain_enumeration(&mut updates);
        self.drain_toggles(&mut updates);
        updates
    }

    fn take_repo_list_change(&mut self) -> bool {
        let mut changed = false;
        let mut lost = false;
        if let Some(changes) = &self.repo_list_changes {
            loop {
                match changes.try_recv() {
                    Ok(()) => changed = true,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        lost = true;
                        break;
                    }
                }
            }
        }
        if lost {
            warn!("lost the source list change watch");
            self.repo_list_changes = None;
        }
        changed
    }

    fn drain_enumeration(&mut self, updates: &mut Vec<SessionUpdate>) {
        let Some((cycle, enumeration)) = self.pending.as_mut() else {
            return;
        };
        let cycle = *cycle;

        while let Some(event) = enumeration.try_next() {
            match event {
                EnumerationEvent::Detail { id, label, enabled } => {
                    debug!("repo = {}:{}:{}", id, label, enabled);
                    if let Some(entry) = self.reconciler.upsert(cycle, &id, &label, enabled) {
                        updates.push(SessionUpdate::Upserted(entry.clone()));
                    }
                }
                EnumerationEvent::Status(status) => updates.push(SessionUpdate::Status(status)),
                EnumerationEvent::Finished => {
                    if let Some(removed) = self.reconciler.end_refresh(cycle) {
                        if !removed.is_empty() {
                            updates.push(SessionUpdate::Removed(removed));
                        }
                    }
                    updates.push(SessionUpdate::RefreshFinished);
                }
                EnumerationEvent::Failed(err) => {
                    warn!("failed to get repo list: {}", err);
                    self.reconciler.abort(cycle);
                    updates.push(SessionUpdate::RefreshFailed(err));
                }
            }
        }

        if enumeration.is_done() {
            self.pending = None;
        }
    }

    fn drain_toggles(&mut self, updates: &mut Vec<SessionUpdate>) {
        while let Ok(ToggleResult { id, enabled, result }) = self.toggle_rx.try_recv() {
            match result {
                Ok(()) => updates.push(SessionUpdate::ToggleApplied { id, enabled }),
                Err(error) => {
                    warn!("could not set repo enabled state: {}", error);
                    let restored = !enabled;
                    // The source may have been pruned by a refresh meanwhile.
                    if let Err(err) = self.reconciler.set_enabled(&id, restored) {
                        debug!("not reverting {}: {}", id, err);
                    }
                    updates.push(SessionUpdate::ToggleFailed {
                        id,
                        enabled: restored,
                        error,
                    });
                }
            }
        }
    }
}
