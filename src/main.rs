use anyhow::Error;
use gpk_tools::backend::Backend;
use gpk_tools::packagekit::{self, PackageKitClient};
use gpk_tools::repo_window::RepoWindow;
use gpk_tools::session::SourcesSession;
use gpk_tools::{config, logging};
use gtk::prelude::*;
use gtk::{gdk::Display, Application, CssProvider};
use log::{debug, error};
use std::sync::Arc;

// Also the single-instance name: a second launch presents the first window.
const APP_ID: &str = "org.freedesktop.PackageKit.Repo";

fn load_css() {
    let Some(display) = Display::default() else {
        error!("Could not connect to a display.");
        return;
    };

    let provider = CssProvider::new();
    provider.load_from_data(
        "
        .source-row {
            padding: 4px;
            border-bottom: 1px solid alpha(currentColor, 0.1);
        }

        .status-label {
            font-style: italic;
        }
        ",
    );

    gtk::style_context_add_provider_for_display(
        &display,
        &provider,
        gtk::STYLE_PROVIDER_PRIORITY_APPLICATION,
    );
}

fn build_ui(app: &Application, backend: &Arc<dyn Backend>) {
    if let Some(window) = app.active_window() {
        debug!("already running, presenting the existing window");
        window.present();
        return;
    }

    load_css();

    let config = match config::open_default() {
        Ok(config) => config,
        Err(e) => {
            error!("Could not open settings: {}", e);
            return;
        }
    };
    let session = SourcesSession::new(backend.clone(), config);
    let window = RepoWindow::new(app, session);
    window.present();
}

fn main() -> Result<(), Error> {
    let args: Vec<String> = std::env::args().collect();
    logging::init(logging::verbose_requested(&args));

    let runtime = packagekit::new_runtime()?;
    let backend: Arc<dyn Backend> = Arc::new(PackageKitClient::new(runtime));

    let app = Application::builder().application_id(APP_ID).build();

    app.connect_activate(move |app| build_ui(app, &backend));
    app.run_with_args(&logging::strip_verbose(&args));
    Ok(())
}
