// src/packagekit.rs
//
// Backend implementation talking to the PackageKit daemon on the system bus.
// Every request runs on a private tokio runtime; blocking calls wait on it
// with `block_on`, enumerations keep running on it and forward their signals
// through a std channel.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use futures_util::StreamExt;
use log::{debug, warn};
use tokio::runtime::Runtime;
use tokio::sync::{oneshot, OnceCell};
use zbus::{proxy, zvariant::OwnedObjectPath, Connection};

use crate::backend::{Backend, Enumeration, EnumerationEvent, Query};
use crate::error::{Error, Result};
use crate::pk_enum::{
    error_code_text, Exit, Filters, Roles, Status, INFO_INSTALLED, TRANSACTION_FLAG_ONLY_TRUSTED,
};

#[proxy(
    interface = "org.freedesktop.PackageKit",
    default_service = "org.freedesktop.PackageKit",
    default_path = "/org/freedesktop/PackageKit",
    gen_blocking = false
)]
trait PackageKit {
    fn create_transaction(&self) -> zbus::Result<OwnedObjectPath>;

    #[zbus(property)]
    fn roles(&self) -> zbus::Result<u64>;

    #[zbus(signal)]
    fn repo_list_changed(&self) -> zbus::Result<()>;
}

#[proxy(
    interface = "org.freedesktop.PackageKit.Transaction",
    default_service = "org.freedesktop.PackageKit",
    gen_blocking = false
)]
trait Transaction {
    fn get_repo_list(&self, filter: u64) -> zbus::Result<()>;

    fn repo_enable(&self, repo_id: &str, enabled: bool) -> zbus::Result<()>;

    fn what_provides(&self, filter: u64, values: &[&str]) -> zbus::Result<()>;

    fn install_packages(&self, transaction_flags: u64, package_ids: &[&str]) -> zbus::Result<()>;

    #[zbus(property)]
    fn status(&self) -> zbus::Result<u32>;

    #[zbus(signal)]
    fn repo_detail(&self, repo_id: &str, description: &str, enabled: bool) -> zbus::Result<()>;

    #[zbus(signal)]
    fn package(&self, info: u32, package_id: &str, summary: &str) -> zbus::Result<()>;

    #[zbus(signal)]
    fn error_code(&self, code: u32, details: &str) -> zbus::Result<()>;

    #[zbus(signal)]
    fn finished(&self, exit: u32, runtime: u32) -> zbus::Result<()>;
}

/// Runtime shared by the D-Bus clients of one process.
pub fn new_runtime() -> std::io::Result<Arc<Runtime>> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("gpk-dbus")
        .enable_all()
        .build()
        .map(Arc::new)
}

/// Mutating transactions, which run to completion before returning.
#[derive(Debug, Clone)]
enum Mutation {
    RepoEnable { repo_id: String, enabled: bool },
    InstallPackages(Vec<String>),
}

pub struct PackageKitClient {
    runtime: Arc<Runtime>,
    connection: OnceCell<Connection>,
}

impl PackageKitClient {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self {
            runtime,
            connection: OnceCell::new(),
        }
    }

    async fn connection(&self) -> Result<Connection> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                Connection::system().await.map_err(|err| {
                    Error::BackendUnavailable(format!("Cannot connect to the system bus: {}", err))
                })
            })
            .await?;
        Ok(connection.clone())
    }
}

async fn open_transaction(connection: &Connection) -> Result<TransactionProxy<'static>> {
    let daemon = PackageKitProxy::new(connection).await?;
    let path = daemon.create_transaction().await?;
    debug!("created transaction {}", path.as_str());
    let proxy = TransactionProxy::builder(connection)
        .path(path)?
        .build()
        .await?;
    Ok(proxy)
}

fn transaction_outcome(exit: Exit, error: Option<Error>) -> Result<()> {
    if let Some(error) = error {
        return Err(error);
    }
    match exit {
        Exit::Success => Ok(()),
        other => Err(Error::rejected(
            other.to_localised_text(),
            format!("{:?}", other).to_lowercase(),
        )),
    }
}

async fn run_enumeration(
    connection: Connection,
    query: Query,
    filters: Filters,
    dispatched: oneshot::Sender<Result<()>>,
    events: Sender<EnumerationEvent>,
) {
    let proxy = match open_transaction(&connection).await {
        Ok(proxy) => proxy,
        Err(err) => {
            let _ = dispatched.send(Err(err));
            return;
        }
    };

    // Subscribe before dispatching so no early signal is missed.
    let subscribed = async {
        let details = proxy.receive_repo_detail().await?;
        let packages = proxy.receive_package().await?;
        let errors = proxy.receive_error_code().await?;
        let finished = proxy.receive_finished().await?;
        let status = proxy.receive_status_changed().await;

        match &query {
            Query::Repositories => proxy.get_repo_list(filters.bits()).await?,
            Query::HardwareDrivers(modaliases) => {
                let values: Vec<String> = modaliases
                    .iter()
                    .map(|modalias| format!("modalias({})", modalias))
                    .collect();
                let values: Vec<&str> = values.iter().map(String::as_str).collect();
                proxy.what_provides(filters.bits(), &values).await?
            }
        }
        Ok::<_, Error>((details, packages, errors, finished, status))
    }
    .await;

    let (mut details, mut packages, mut errors, mut finished, mut status) = match subscribed {
        Ok(streams) => {
            let _ = dispatched.send(Ok(()));
            streams
        }
        Err(err) => {
            let _ = dispatched.send(Err(err));
            return;
        }
    };

    let mut error = None;
    loop {
        // Details are drained before the finished signal that follows them.
        tokio::select! {
            biased;
            Some(signal) = details.next() => {
                if let Ok(args) = signal.args() {
                    let _ = events.send(EnumerationEvent::Detail {
                        id: args.repo_id().to_string(),
                        label: args.description().to_string(),
                        enabled: *args.enabled(),
                    });
                }
            }
            Some(signal) = packages.next() => {
                if let Ok(args) = signal.args() {
                    let _ = events.send(EnumerationEvent::Detail {
                        id: args.package_id().to_string(),
                        label: args.summary().to_string(),
                        enabled: *args.info() == INFO_INSTALLED,
                    });
                }
            }
            Some(changed) = status.next() => {
                if let Ok(value) = changed.get().await {
                    let _ = events.send(EnumerationEvent::Status(Status::from_u32(value)));
                }
            }
            Some(signal) = errors.next() => {
                if let Ok(args) = signal.args() {
                    warn!("transaction error {}: {}", args.code(), args.details());
                    error = Some(Error::rejected(error_code_text(*args.code()), args.details().to_string()));
                }
            }
            Some(signal) = finished.next() => {
                let exit = signal
                    .args()
                    .map(|args| Exit::from_u32(*args.exit()))
                    .unwrap_or(Exit::Unknown);
                let event = match transaction_outcome(exit, error.take()) {
                    Ok(()) => EnumerationEvent::Finished,
                    Err(err) => EnumerationEvent::Failed(err),
                };
                let _ = events.send(event);
                break;
            }
            else => {
                let _ = events.send(EnumerationEvent::Failed(Error::BackendUnavailable(
                    "the transaction disappeared from the bus".to_string(),
                )));
                break;
            }
        }
    }
}

async fn run_mutation(connection: &Connection, mutation: &Mutation) -> Result<()> {
    let proxy = open_transaction(connection).await?;
    let mut errors = proxy.receive_error_code().await?;
    let mut finished = proxy.receive_finished().await?;

    match mutation {
        Mutation::RepoEnable { repo_id, enabled } => {
            debug!("setting {} to {}", repo_id, enabled);
            proxy.repo_enable(repo_id, *enabled).await?
        }
        Mutation::InstallPackages(package_ids) => {
            debug!("installing {}", package_ids.join(", "));
            let ids: Vec<&str> = package_ids.iter().map(String::as_str).collect();
            proxy
                .install_packages(TRANSACTION_FLAG_ONLY_TRUSTED, &ids)
                .await?
        }
    }

    let mut error = None;
    loop {
        tokio::select! {
            biased;
            Some(signal) = errors.next() => {
                if let Ok(args) = signal.args() {
                    error = Some(Error::rejected(error_code_text(*args.code()), args.details().to_string()));
                }
            }
            Some(signal) = finished.next() => {
                let exit = signal
                    .args()
                    .map(|args| Exit::from_u32(*args.exit()))
                    .unwrap_or(Exit::Unknown);
                return transaction_outcome(exit, error);
            }
            else => {
                return Err(Error::BackendUnavailable(
                    "the transaction disappeared from the bus".to_string(),
                ));
            }
        }
    }
}

impl Backend for PackageKitClient {
    fn capabilities(&self) -> Result<Roles> {
        self.runtime.block_on(async {
            let connection = self.connection().await?;
            let daemon = PackageKitProxy::new(&connection).await?;
            let roles = daemon.roles().await?;
            debug!("backend roles {:#x}", roles);
            Ok::<_, Error>(Roles::from_bits(roles))
        })
    }

    fn enumerate(&self, query: &Query, filters: Filters) -> Result<Enumeration> {
        let connection = self.runtime.block_on(self.connection())?;
        let (events_tx, events_rx) = mpsc::channel();
        let (dispatched_tx, dispatched_rx) = oneshot::channel();

        self.runtime.spawn(run_enumeration(
            connection,
            query.clone(),
            filters,
            dispatched_tx,
            events_tx,
        ));

        self.runtime
            .block_on(dispatched_rx)
            .map_err(|_| Error::BackendUnavailable("the request was dropped".to_string()))??;
        Ok(Enumeration::new(events_rx))
    }

    fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        let mutation = Mutation::RepoEnable {
            repo_id: id.to_string(),
            enabled,
        };
        self.runtime.block_on(async {
            let connection = self.connection().await?;
            run_mutation(&connection, &mutation).await
        })
    }

    fn install_packages(&self, package_ids: &[String]) -> Result<()> {
        if package_ids.is_empty() {
            return Err(Error::rejected("No package selected", ""));
        }
        let mutation = Mutation::InstallPackages(package_ids.to_vec());
        self.runtime.block_on(async {
            let connection = self.connection().await?;
            run_mutation(&connection, &mutation).await
        })
    }

    fn watch_repo_list(&self) -> Result<Receiver<()>> {
        let connection = self.runtime.block_on(self.connection())?;
        let (changes_tx, changes_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();

        self.runtime.spawn(async move {
            let daemon = match PackageKitProxy::new(&connection).await {
                Ok(daemon) => daemon,
                Err(err) => {
                    let _ = ready_tx.send(Err(err.into()));
                    return;
                }
            };
            let mut changes = match daemon.receive_repo_list_changed().await {
                Ok(changes) => changes,
                Err(err) => {
                    let _ = ready_tx.send(Err(err.into()));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));

            while changes.next().await.is_some() {
                debug!("repo list changed");
                if changes_tx.send(()).is_err() {
                    break;
                }
            }
        });

        self.runtime
            .block_on(ready_rx)
            .map_err(|_| Error::BackendUnavailable("the request was dropped".to_string()))??;
        Ok(changes_rx)
    }
}
