// src/repo_window.rs

use crate::model::Entry;
use crate::session::{SessionUpdate, SourcesSession};
use gtk::prelude::*;
use gtk::{
    glib, Application, ApplicationWindow, Box as GtkBox, Button, ButtonsType, CheckButton,
    HeaderBar, Label, ListBox, ListBoxRow, MessageDialog, MessageType, Orientation,
    ScrolledWindow, Separator, Spinner,
};
use log::{debug, warn};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

const HELP_URI: &str = "help:gnome-packagekit/software-sources";
const POLL_INTERVAL: Duration = Duration::from_millis(100);

struct SourceRow {
    row: ListBoxRow,
    check: CheckButton,
    label: Label,
}

#[derive(Clone)]
pub struct RepoWindow {
    pub window: ApplicationWindow,
    listbox: ListBox,
    status_box: GtkBox,
    spinner: Spinner,
    status_label: Label,
    detail_check: CheckButton,
    session: Rc<RefCell<SourcesSession>>,
    rows: Rc<RefCell<HashMap<String, SourceRow>>>,
    // Set while the view itself changes check buttons.
    updating: Rc<Cell<bool>>,
}

impl RepoWindow {
    pub fn new(app: &Application, session: SourcesSession) -> Self {
        let window = ApplicationWindow::builder()
            .application(app)
            .title("Software Sources")
            .icon_name("gpk-repo")
            .default_width(500)
            .default_height(300)
            .build();

        let header_bar = HeaderBar::new();
        header_bar.set_title_widget(Some(&Label::new(Some("Software Sources"))));
        window.set_titlebar(Some(&header_bar));

        let main_vbox = GtkBox::new(Orientation::Vertical, 0);

        // Status line, visible while a transaction runs
        let status_box = GtkBox::new(Orientation::Horizontal, 8);
        status_box.set_margin_top(8);
        status_box.set_margin_start(16);
        status_box.set_margin_end(16);
        let spinner = Spinner::new();
        let status_label = Label::new(None);
        status_label.set_halign(gtk::Align::Start);
        status_label.add_css_class("status-label");
        status_box.append(&spinner);
        status_box.append(&status_label);
        status_box.set_visible(false);
        main_vbox.append(&status_box);

        let scrolled_window = ScrolledWindow::builder()
            .vexpand(true)
            .hexpand(true)
            .margin_top(8)
            .margin_bottom(8)
            .margin_start(16)
            .margin_end(16)
            .build();

        let listbox = ListBox::new();
        listbox.set_selection_mode(gtk::SelectionMode::Single);
        listbox.set_sort_func(|a, b| row_label(a).cmp(&row_label(b)).into());
        scrolled_window.set_child(Some(&listbox));
        main_vbox.append(&scrolled_window);

        let detail_check = CheckButton::with_label("Show debug and development software sources");
        detail_check.set_margin_start(16);
        detail_check.set_margin_end(16);
        main_vbox.append(&detail_check);

        main_vbox.append(&Separator::new(Orientation::Horizontal));

        let button_panel = GtkBox::new(Orientation::Horizontal, 12);
        button_panel.set_margin_top(12);
        button_panel.set_margin_bottom(12);
        button_panel.set_margin_start(16);
        button_panel.set_margin_end(16);

        let help_btn = Button::with_label("Help");
        let spacer = GtkBox::new(Orientation::Horizontal, 0);
        spacer.set_hexpand(true);
        let close_btn = Button::with_label("Close");
        button_panel.append(&help_btn);
        button_panel.append(&spacer);
        button_panel.append(&close_btn);
        main_vbox.append(&button_panel);

        window.set_child(Some(&main_vbox));

        let repo_window = Self {
            window: window.clone(),
            listbox: listbox.clone(),
            status_box,
            spinner,
            status_label,
            detail_check: detail_check.clone(),
            session: Rc::new(RefCell::new(session)),
            rows: Rc::new(RefCell::new(HashMap::new())),
            updating: Rc::new(Cell::new(false)),
        };

        // Event handlers
        help_btn.connect_clicked(|_| {
            if let Err(e) = open::that(HELP_URI) {
                warn!("failed to open help: {}", e);
            }
        });

        let window_clone = window.clone();
        close_btn.connect_clicked(move |_| {
            window_clone.close();
        });

        listbox.connect_row_selected(|_, row| match row {
            Some(row) => debug!("selected row is: {}", row.widget_name()),
            None => debug!("no row selected"),
        });

        let show_details = repo_window.session.borrow().show_details();
        detail_check.set_active(show_details);
        let this = repo_window.clone();
        detail_check.connect_toggled(move |check| {
            let result = this.session.borrow_mut().set_show_details(check.is_active());
            if let Err(e) = result {
                this.show_status_message(&format!("Failed to get software source list: {}", e));
            }
        });

        // First load
        let updates = repo_window.session.borrow_mut().start();
        if !repo_window.session.borrow().can_list() {
            listbox.set_sensitive(false);
            detail_check.set_sensitive(false);
        }
        repo_window.apply_updates(updates);
        if repo_window.session.borrow().is_refreshing() {
            repo_window.show_busy("Getting software source list");
        }

        // Backend events arrive on worker threads; pick them up here
        let this = repo_window.clone();
        glib::timeout_add_local(POLL_INTERVAL, move || {
            let updates = this.session.borrow_mut().poll();
            this.apply_updates(updates);
            glib::ControlFlow::Continue
        });

        close_btn.grab_focus();
        repo_window
    }

    pub fn present(&self) {
        self.window.present();
    }

    fn apply_updates(&self, updates: Vec<SessionUpdate>) {
        for update in updates {
            match update {
                SessionUpdate::Upserted(entry) => self.upsert_row(&entry),
                SessionUpdate::Removed(entries) => {
                    let mut rows = self.rows.borrow_mut();
                    for entry in entries {
                        if let Some(source_row) = rows.remove(&entry.id) {
                            self.listbox.remove(&source_row.row);
                        }
                    }
                }
                SessionUpdate::Status(status) => self.show_busy(status.to_localised_text()),
                SessionUpdate::RefreshFinished => self.hide_status(),
                SessionUpdate::RefreshFailed(e) => {
                    self.show_status_message(&format!("Failed to get software source list: {}", e));
                }
                SessionUpdate::ToggleApplied { id, enabled } => {
                    debug!("{} is now {}", id, if enabled { "enabled" } else { "disabled" });
                    self.listbox.set_sensitive(true);
                }
                SessionUpdate::ToggleFailed { id, enabled, error } => {
                    self.set_row_active(&id, enabled);
                    self.listbox.set_sensitive(true);
                    self.show_error("Failed to change status", &error.to_string());
                }
            }
        }
    }

    fn upsert_row(&self, entry: &Entry) {
        let markup = glib::markup_escape_text(&entry.label);
        {
            let rows = self.rows.borrow();
            if let Some(source_row) = rows.get(&entry.id) {
                source_row.label.set_markup(&markup);
                self.updating.set(true);
                source_row.check.set_active(entry.enabled);
                self.updating.set(false);
                source_row.row.changed();
                return;
            }
        }

        let row = ListBoxRow::new();
        row.set_widget_name(&entry.id);
        row.add_css_class("source-row");

        let hbox = GtkBox::new(Orientation::Horizontal, 12);
        hbox.set_margin_top(6);
        hbox.set_margin_bottom(6);
        hbox.set_margin_start(8);
        hbox.set_margin_end(8);

        let check = CheckButton::new();
        check.set_active(entry.enabled);
        check.set_tooltip_text(Some("Enabled"));
        check.set_sensitive(self.session.borrow().can_toggle());

        let label = Label::new(None);
        label.set_markup(&markup);
        label.set_hexpand(true);
        label.set_halign(gtk::Align::Start);
        label.set_ellipsize(pango::EllipsizeMode::End);

        let this = self.clone();
        let id = entry.id.clone();
        check.connect_toggled(move |check| {
            if this.updating.get() {
                return;
            }
            let result = this.session.borrow_mut().toggle(&id);
            match result {
                // Insensitive until the backend has answered
                Ok(_) => this.listbox.set_sensitive(false),
                Err(e) => {
                    warn!("can't change state of {}: {}", id, e);
                    this.updating.set(true);
                    check.set_active(!check.is_active());
                    this.updating.set(false);
                    this.show_error("Failed to change status", &e.to_string());
                }
            }
        });

        hbox.append(&check);
        hbox.append(&label);
        row.set_child(Some(&hbox));
        self.listbox.append(&row);

        self.rows
            .borrow_mut()
            .insert(entry.id.clone(), SourceRow { row, check, label });
    }

    fn set_row_active(&self, id: &str, enabled: bool) {
        if let Some(source_row) = self.rows.borrow().get(id) {
            self.updating.set(true);
            source_row.check.set_active(enabled);
            self.updating.set(false);
        }
    }

    fn show_busy(&self, text: &str) {
        self.status_label.set_text(text);
        self.spinner.start();
        self.status_box.set_visible(true);
    }

    fn hide_status(&self) {
        self.spinner.stop();
        self.status_box.set_visible(false);
    }

    /// Transient message; the previous list stays as it was.
    fn show_status_message(&self, text: &str) {
        self.spinner.stop();
        self.status_label.set_text(text);
        self.status_box.set_visible(true);

        let this = self.clone();
        glib::timeout_add_seconds_local_once(5, move || {
            if !this.session.borrow().is_refreshing() {
                this.hide_status();
            }
        });
    }

    fn show_error(&self, title: &str, details: &str) {
        let dialog = MessageDialog::builder()
            .transient_for(&self.window)
            .modal(true)
            .message_type(MessageType::Error)
            .buttons(ButtonsType::Ok)
            .text(title)
            .secondary_text(details)
            .build();
        dialog.connect_response(|dlg, _| dlg.close());
        dialog.show();
    }
}

/// Label text of a source row, for sorting.
fn row_label(row: &ListBoxRow) -> String {
    row.child()
        .and_then(|c| c.downcast::<GtkBox>().ok())
        .and_then(|hbox| hbox.last_child())
        .and_then(|w| w.downcast::<Label>().ok())
        .map(|label| label.text().to_string())
        .unwrap_or_default()
}
