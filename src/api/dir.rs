//! Purpose: Directory-backed Volume Manager used by the `voldriver` binary.
//! Exports: `DirVolumeManager`.
//! Role: Minimal reference backend; one directory per volume under a root.
//! Invariants: Volume names must be single path segments (no separators, no dot names).
//! Invariants: Options are persisted as `<root>/opts/<name>.json` next to `<root>/volumes/<name>`.
#![allow(clippy::result_large_err)]

use std::path::{Path, PathBuf};

use serde_json::json;
use tracing::debug;

use super::manager::{MountOptions, VolumeDescriptor, VolumeManager, VolumeOpts};
use crate::core::error::{Error, ErrorKind, map_io_error_kind};

pub const DEFAULT_VOLUME_ROOT: &str = "/var/lib/voldriver";

#[derive(Clone, Debug)]
pub struct DirVolumeManager {
    root: PathBuf,
}

impl Default for DirVolumeManager {
    fn default() -> Self {
        Self::new(DEFAULT_VOLUME_ROOT)
    }
}

impl DirVolumeManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn volumes_dir(&self) -> PathBuf {
        self.root.join("volumes")
    }

    fn opts_dir(&self) -> PathBuf {
        self.root.join("opts")
    }

    fn volume_dir(&self, name: &str) -> Result<PathBuf, Error> {
        validate_name(name)?;
        Ok(self.volumes_dir().join(name))
    }

    fn opts_path(&self, name: &str) -> PathBuf {
        self.opts_dir().join(format!("{name}.json"))
    }

    fn existing_volume_dir(&self, name: &str) -> Result<PathBuf, Error> {
        let dir = self.volume_dir(name)?;
        if !dir.is_dir() {
            return Err(Error::new(ErrorKind::NotFound)
                .with_message(format!("volume {name} not found"))
                .with_path(&dir));
        }
        Ok(dir)
    }

    fn read_opts(&self, name: &str) -> Result<VolumeOpts, Error> {
        let path = self.opts_path(name);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(VolumeOpts::new());
            }
            Err(err) => {
                return Err(Error::new(ErrorKind::Io)
                    .with_message(format!("failed to read options for volume {name}"))
                    .with_path(&path)
                    .with_source(err));
            }
        };
        serde_json::from_slice(&bytes).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(format!("options for volume {name} are corrupt"))
                .with_path(&path)
                .with_source(err)
        })
    }

    fn write_opts(&self, name: &str, opts: &VolumeOpts) -> Result<(), Error> {
        let path = self.opts_path(name);
        let bytes = serde_json::to_vec(opts).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode volume options")
                .with_source(err)
        })?;
        std::fs::write(&path, bytes).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(format!("failed to write options for volume {name}"))
                .with_path(&path)
                .with_source(err)
        })
    }

    fn describe(&self, name: &str, dir: &Path) -> Result<VolumeDescriptor, Error> {
        let opts = self.read_opts(name)?;
        Ok(VolumeDescriptor::new(name)
            .with_attribute("Mountpoint", dir.display().to_string())
            .with_attribute("Status", json!({ "Opts": opts })))
    }
}

fn validate_name(name: &str) -> Result<(), Error> {
    if name.is_empty() {
        return Err(Error::new(ErrorKind::Usage).with_message("volume name is required"));
    }
    if name.contains('/') || name == "." || name == ".." {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("invalid volume name {name:?}"))
            .with_hint("Volume names must not contain path separators."));
    }
    Ok(())
}

fn create_dir(path: &Path) -> Result<(), Error> {
    std::fs::create_dir_all(path).map_err(|err| {
        Error::new(map_io_error_kind(&err))
            .with_message("failed to create volume directory")
            .with_path(path)
            .with_source(err)
    })
}

impl VolumeManager for DirVolumeManager {
    fn init(&self) -> Result<(), Error> {
        create_dir(&self.volumes_dir())?;
        create_dir(&self.opts_dir())
    }

    fn create(&self, name: &str, opts: &VolumeOpts) -> Result<(), Error> {
        let dir = self.volume_dir(name)?;
        match std::fs::create_dir(&dir) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                debug!(volume = name, "volume already exists");
                return Ok(());
            }
            Err(err) => {
                return Err(Error::new(map_io_error_kind(&err))
                    .with_message(format!("failed to create volume {name}"))
                    .with_path(&dir)
                    .with_source(err));
            }
        }
        self.write_opts(name, opts)
    }

    fn remove(&self, name: &str) -> Result<(), Error> {
        let dir = self.existing_volume_dir(name)?;
        std::fs::remove_dir_all(&dir).map_err(|err| {
            Error::new(map_io_error_kind(&err))
                .with_message(format!("failed to remove volume {name}"))
                .with_path(&dir)
                .with_source(err)
        })?;
        let opts = self.opts_path(name);
        match std::fs::remove_file(&opts) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::new(ErrorKind::Io)
                .with_message(format!("failed to remove options for volume {name}"))
                .with_path(&opts)
                .with_source(err)),
        }
    }

    fn path(&self, name: &str, _volume_id: &str) -> Result<String, Error> {
        let dir = self.existing_volume_dir(name)?;
        Ok(dir.display().to_string())
    }

    fn mount(&self, name: &str, _options: &MountOptions) -> Result<String, Error> {
        let dir = self.existing_volume_dir(name)?;
        Ok(dir.display().to_string())
    }

    fn unmount(&self, name: &str, _volume_id: &str) -> Result<(), Error> {
        self.existing_volume_dir(name).map(|_| ())
    }

    fn get(&self, name: &str) -> Result<VolumeDescriptor, Error> {
        let dir = self.existing_volume_dir(name)?;
        self.describe(name, &dir)
    }

    fn list(&self) -> Result<Vec<VolumeDescriptor>, Error> {
        let volumes_dir = self.volumes_dir();
        let entries = std::fs::read_dir(&volumes_dir).map_err(|err| {
            Error::new(map_io_error_kind(&err))
                .with_message("failed to read volume directory")
                .with_path(&volumes_dir)
                .with_source(err)
        })?;

        let mut volumes = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to read volume directory entry")
                    .with_path(&volumes_dir)
                    .with_source(err)
            })?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            volumes.push(self.describe(name, &path)?);
        }
        volumes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(volumes)
    }
}
