// src/notify.rs

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use log::debug;
use tokio::runtime::Runtime;
use zbus::{proxy, zvariant::Value, Connection};

use crate::error::{Error, Result};

#[proxy(
    interface = "org.freedesktop.Notifications",
    default_service = "org.freedesktop.Notifications",
    default_path = "/org/freedesktop/Notifications",
    gen_blocking = false
)]
trait Notifications {
    fn notify(
        &self,
        app_name: &str,
        replaces_id: u32,
        app_icon: &str,
        summary: &str,
        body: &str,
        actions: &[&str],
        hints: HashMap<&str, Value<'_>>,
        expire_timeout: i32,
    ) -> zbus::Result<u32>;

    #[zbus(signal)]
    fn action_invoked(&self, id: u32, action_key: &str) -> zbus::Result<()>;

    #[zbus(signal)]
    fn notification_closed(&self, id: u32, reason: u32) -> zbus::Result<()>;
}

const APP_NAME: &str = "gpk-tools";
const EXPIRES_NEVER: i32 = 0;
const URGENCY_LOW: u8 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub actions: Vec<Action>,
}

impl Notification {
    pub fn new(title: &str, body: &str, icon: &str) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            icon: icon.to_string(),
            actions: Vec::new(),
        }
    }

    pub fn with_action(mut self, id: &str, label: &str) -> Self {
        self.actions.push(Action {
            id: id.to_string(),
            label: label.to_string(),
        });
        self
    }
}

pub trait NotificationService: Send + Sync {
    /// Shows the popup and blocks until the user invokes an action (its id)
    /// or the popup goes away (`None`).
    fn show(&self, notification: &Notification) -> Result<Option<String>>;
}

/// Popups through the freedesktop notification daemon on the session bus.
pub struct DesktopNotifier {
    runtime: Arc<Runtime>,
}

impl DesktopNotifier {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self { runtime }
    }

    async fn show_async(notification: &Notification) -> Result<Option<String>> {
        let connection = Connection::session().await.map_err(|err| {
            Error::BackendUnavailable(format!("Cannot connect to the session bus: {}", err))
        })?;
        let proxy = NotificationsProxy::new(&connection).await?;
        let mut invoked = proxy.receive_action_invoked().await?;
        let mut closed = proxy.receive_notification_closed().await?;

        let mut actions = Vec::new();
        for action in &notification.actions {
            actions.push(action.id.as_str());
            actions.push(action.label.as_str());
        }
        let mut hints = HashMap::new();
        hints.insert("urgency", Value::from(URGENCY_LOW));

        let id = proxy
            .notify(
                APP_NAME,
                0,
                &notification.icon,
                &notification.title,
                &notification.body,
                &actions,
                hints,
                EXPIRES_NEVER,
            )
            .await?;
        debug!("notification {} shown", id);

        loop {
            tokio::select! {
                biased;
                Some(signal) = invoked.next() => {
                    if let Ok(args) = signal.args() {
                        if *args.id() == id {
                            return Ok(Some(args.action_key().to_string()));
                        }
                    }
                }
                Some(signal) = closed.next() => {
                    if let Ok(args) = signal.args() {
                        if *args.id() == id {
                            debug!("notification {} closed, reason {}", id, args.reason());
                            return Ok(None);
                        }
                    }
                }
                else => return Ok(None),
            }
        }
    }
}

impl NotificationService for DesktopNotifier {
    fn show(&self, notification: &Notification) -> Result<Option<String>> {
        self.runtime.block_on(Self::show_async(notification))
    }
}
