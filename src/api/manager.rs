//! Purpose: Define the Volume Manager contract the adapter relays verbs to.
//! Exports: `VolumeManager`, `VolumeDescriptor`, `VolumeOpts`, `MountOptions`.
//! Role: Seam between the protocol shim and whatever performs the storage work.
//! Invariants: Implementations own locking, persistence, and attach semantics.
//! Invariants: Calls are synchronous; the adapter runs them on the blocking pool.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::error::Error;

pub type VolumeOpts = BTreeMap<String, String>;

/// A volume as reported by the manager.
///
/// Serializes as one flat object: `Name` plus whatever attributes the manager
/// attached (`Mountpoint`, `Status`, ...). The adapter passes it through as-is.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeDescriptor {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl VolumeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MountOptions {
    pub volume_id: String,
    pub overwrite_fs: bool,
    pub new_fs_type: String,
    pub preempt: bool,
}

pub trait VolumeManager: Send + Sync + 'static {
    /// Prepare backends before the adapter starts serving.
    fn init(&self) -> Result<(), Error> {
        Ok(())
    }

    fn create(&self, name: &str, opts: &VolumeOpts) -> Result<(), Error>;

    fn remove(&self, name: &str) -> Result<(), Error>;

    fn path(&self, name: &str, volume_id: &str) -> Result<String, Error>;

    fn mount(&self, name: &str, options: &MountOptions) -> Result<String, Error>;

    fn unmount(&self, name: &str, volume_id: &str) -> Result<(), Error>;

    fn get(&self, name: &str) -> Result<VolumeDescriptor, Error>;

    fn list(&self) -> Result<Vec<VolumeDescriptor>, Error>;
}
