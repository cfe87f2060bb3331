//! Purpose: Publish the plugin's address in a Docker discovery (`.spec`) file.
//! Exports: `publish`.
//! Role: Lets plugin-aware runtimes find the adapter without configuration.
//! Invariants: The containing directory is ensured (0755) before anything else.
//! Invariants: An existing file is never overwritten; its content stays authoritative.

use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use tracing::{debug, info};

use crate::core::error::{Error, ErrorKind};
use crate::listener::create_dir_0755;

const SPEC_FILE_MODE: u32 = 0o644;

/// Ensure the discovery directory exists.
pub fn ensure_dir(path: &Path) -> Result<(), Error> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => create_dir_0755(parent),
        _ => Ok(()),
    }
}

/// Write `address` to `path` unless the file already exists.
///
/// Returns `true` when this call created the file. A restart with a different
/// address leaves the old record in place; operators delete the file to force
/// republication.
pub fn publish(path: &Path, address: &str) -> Result<bool, Error> {
    ensure_dir(path)?;
    debug!(path = %path.display(), "docker voldriver spec file");

    let file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(SPEC_FILE_MODE)
        .open(path);
    let mut file = match file {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            info!(path = %path.display(), "discovery file exists, leaving it untouched");
            return Ok(false);
        }
        Err(err) => {
            return Err(Error::new(ErrorKind::Io)
                .with_message("failed to create discovery file")
                .with_path(path)
                .with_source(err));
        }
    };
    file.write_all(address.as_bytes()).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to write discovery file")
            .with_path(path)
            .with_source(err)
    })?;
    info!(path = %path.display(), address, "published discovery file");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::publish;
    use crate::core::error::ErrorKind;

    #[test]
    fn writes_address_as_entire_content() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("etc").join("docker").join("plugins").join("a.spec");
        let wrote = publish(&path, "unix:///run/docker/plugins/a.sock").expect("publish");
        assert!(wrote);
        assert_eq!(
            std::fs::read_to_string(&path).expect("read"),
            "unix:///run/docker/plugins/a.sock"
        );
    }

    #[test]
    fn never_overwrites_an_existing_record() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("b.spec");
        assert!(publish(&path, "unix:///first.sock").expect("first"));
        assert!(!publish(&path, "tcp://127.0.0.1:9000").expect("second"));
        assert_eq!(
            std::fs::read_to_string(&path).expect("read"),
            "unix:///first.sock"
        );
    }

    #[test]
    fn unwritable_location_is_an_io_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let blocker = temp.path().join("not-a-dir");
        std::fs::write(&blocker, b"").expect("write");
        let err = publish(&blocker.join("c.spec"), "unix:///x.sock").expect_err("io error");
        assert!(matches!(err.kind(), ErrorKind::Io | ErrorKind::AlreadyExists));
    }
}
