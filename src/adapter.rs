//! Purpose: Compose resolver, listener, dispatcher, and discovery into one plugin module.
//! Exports: `AdapterConfig`, `Identity`, `Adapter`.
//! Role: Start/stop lifecycle object the binary (or a host program) drives.
//! Invariants: Identity is fixed at construction; configuration is never global.
//! Invariants: `start` either returns a serving handle with discovery published, or nothing runs.
//! Notes: `stop` is a no-op; teardown lives on the returned `Server`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::api::VolumeManager;
use crate::core::address::{
    self, DEFAULT_MODULE_NAME, default_discovery_path, effective_address,
};
use crate::core::error::{Error, ErrorKind};
use crate::core::name::sanitize;
use crate::discovery;
use crate::dispatch;
use crate::listener::{self, Endpoint, Server};

#[derive(Clone, Debug)]
pub struct AdapterConfig {
    pub name: String,
    pub description: String,
    /// `unix:///path.sock` or `tcp://host:port`; empty selects the default socket.
    pub address: String,
    /// Overrides the default `/etc/docker/plugins/<name>.spec` location.
    pub discovery_path: Option<PathBuf>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_MODULE_NAME.to_string(),
            description: "Docker volume driver".to_string(),
            address: String::new(),
            discovery_path: None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Identity {
    pub name: String,
    pub description: String,
    pub address: String,
}

pub struct Adapter {
    identity: Identity,
    discovery_path: PathBuf,
    manager: Arc<dyn VolumeManager>,
}

fn needs_token(name: &str) -> bool {
    name != DEFAULT_MODULE_NAME && sanitize(name).is_empty()
}

impl Adapter {
    pub fn new(config: AdapterConfig, manager: Arc<dyn VolumeManager>) -> Result<Self, Error> {
        let defaults_needed = config.address.trim().is_empty() || config.discovery_path.is_none();
        if defaults_needed && needs_token(&config.name) {
            return Err(Error::new(ErrorKind::Config)
                .with_message(format!(
                    "module name {:?} has no usable characters for default paths",
                    config.name
                ))
                .with_hint("Use a name with letters or digits, or set --address and --spec."));
        }

        let address = effective_address(&config.name, &config.address);
        let discovery_path = config
            .discovery_path
            .unwrap_or_else(|| default_discovery_path(&config.name));

        Ok(Self {
            identity: Identity {
                name: config.name,
                description: config.description,
                address,
            },
            discovery_path,
            manager,
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn description(&self) -> &str {
        &self.identity.description
    }

    pub fn address(&self) -> &str {
        &self.identity.address
    }

    pub fn discovery_path(&self) -> &Path {
        &self.discovery_path
    }

    /// Bind, begin serving in the background, and publish the discovery file.
    ///
    /// Dropping the returned `Server` stops serving.
    pub async fn start(&self) -> Result<Server, Error> {
        let address = address::parse(self.address()).map_err(|err| {
            Error::new(ErrorKind::Config)
                .with_message(err.to_string())
                .with_hint(format!("configured address: {}", self.address()))
                .with_source(err)
        })?;

        self.manager.init().map_err(|err| {
            Error::new(ErrorKind::Backend)
                .with_message("error initializing drivers")
                .with_source(err)
        })?;

        discovery::ensure_dir(&self.discovery_path)?;

        let endpoint = Endpoint::from(&address);
        let bound = listener::bind(&endpoint).await?;
        let server = bound.serve(dispatch::router(self.manager.clone()));
        info!(
            name = %self.identity.name,
            address = %server.local_addr(),
            "volume driver module started"
        );

        if let Err(err) = discovery::publish(&self.discovery_path, self.address()) {
            if let Err(teardown) = server.shutdown().await {
                warn!(error = %teardown, "failed to stop server after discovery error");
            }
            return Err(err);
        }
        Ok(server)
    }

    pub fn stop(&self) -> Result<(), Error> {
        Ok(())
    }
}
