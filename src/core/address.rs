//! Purpose: Resolve and validate the adapter's listen address.
//! Exports: `Address`, `Scheme`, `AddressError`, `resolve`, `parse`, default path helpers.
//! Role: Single source for `unix://` / `tcp://` parsing and the default socket/spec paths.
//! Invariants: Only `unix` and `tcp` schemes are accepted, case-insensitively.
//! Invariants: The `default-docker` identity maps to the fixed `rexray` paths, unsanitized.

use std::fmt;
use std::path::{Path, PathBuf};

use super::name::sanitize;

pub const DEFAULT_MODULE_NAME: &str = "default-docker";
pub const PLUGIN_SOCKET_DIR: &str = "/run/docker/plugins";
pub const PLUGIN_SPEC_DIR: &str = "/etc/docker/plugins";
const DEFAULT_FILE_STEM: &str = "rexray";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Scheme {
    Unix,
    Tcp,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Unix => "unix",
            Scheme::Tcp => "tcp",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AddressError {
    InvalidAddress,
    UnsupportedScheme,
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressError::InvalidAddress => write!(
                f,
                "bad host specified, ie. unix:///run/docker/plugins/rexray.sock or tcp://127.0.0.1:8080"
            ),
            AddressError::UnsupportedScheme => {
                write!(f, "bad protocol specified with host, ie. unix:// or tcp://")
            }
        }
    }
}

impl std::error::Error for AddressError {}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Address {
    pub scheme: Scheme,
    pub endpoint: String,
}

impl Address {
    /// Socket file for unix addresses.
    pub fn socket_path(&self) -> Option<&Path> {
        match self.scheme {
            Scheme::Unix => Some(Path::new(&self.endpoint)),
            Scheme::Tcp => None,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme.as_str(), self.endpoint)
    }
}

pub fn parse(raw: &str) -> Result<Address, AddressError> {
    let Some((scheme, endpoint)) = raw.split_once("://") else {
        return Err(AddressError::InvalidAddress);
    };
    let scheme_is_word = !scheme.is_empty()
        && scheme
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if !scheme_is_word || endpoint.is_empty() {
        return Err(AddressError::InvalidAddress);
    }
    let scheme = if scheme.eq_ignore_ascii_case("unix") {
        Scheme::Unix
    } else if scheme.eq_ignore_ascii_case("tcp") {
        Scheme::Tcp
    } else {
        return Err(AddressError::UnsupportedScheme);
    };
    Ok(Address {
        scheme,
        endpoint: endpoint.to_string(),
    })
}

/// The address string an adapter listens on: `raw` trimmed, or the default
/// derived from `name` when that is empty.
pub fn effective_address(name: &str, raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        default_address(name)
    } else {
        raw.to_string()
    }
}

pub fn resolve(name: &str, raw: &str) -> Result<Address, AddressError> {
    parse(&effective_address(name, raw))
}

pub fn default_address(name: &str) -> String {
    format!("unix://{}", default_socket_path(name).display())
}

pub fn default_socket_path(name: &str) -> PathBuf {
    Path::new(PLUGIN_SOCKET_DIR).join(format!("{}.sock", file_stem(name)))
}

pub fn default_discovery_path(name: &str) -> PathBuf {
    Path::new(PLUGIN_SPEC_DIR).join(format!("{}.spec", file_stem(name)))
}

fn file_stem(name: &str) -> String {
    if name == DEFAULT_MODULE_NAME {
        DEFAULT_FILE_STEM.to_string()
    } else {
        sanitize(name)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Address, AddressError, Scheme, default_address, default_discovery_path, parse, resolve,
    };
    use crate::core::name::sanitize;
    use std::path::{Path, PathBuf};

    #[test]
    fn parses_unix_and_tcp() {
        assert_eq!(
            parse("unix:///run/docker/plugins/x.sock"),
            Ok(Address {
                scheme: Scheme::Unix,
                endpoint: "/run/docker/plugins/x.sock".to_string(),
            })
        );
        assert_eq!(
            parse("tcp://127.0.0.1:8080"),
            Ok(Address {
                scheme: Scheme::Tcp,
                endpoint: "127.0.0.1:8080".to_string(),
            })
        );
    }

    #[test]
    fn scheme_match_is_case_insensitive() {
        assert_eq!(parse("UNIX:///tmp/a.sock").map(|a| a.scheme), Ok(Scheme::Unix));
        assert_eq!(parse("Tcp://localhost:1").map(|a| a.scheme), Ok(Scheme::Tcp));
    }

    #[test]
    fn rejects_unknown_schemes() {
        for raw in ["ftp://host", "http://127.0.0.1:80", "unixx:///a", "xtcp://h:1"] {
            assert_eq!(parse(raw), Err(AddressError::UnsupportedScheme), "{raw}");
        }
    }

    #[test]
    fn rejects_unsplittable_addresses() {
        for raw in ["", "/run/docker/plugins/x.sock", "127.0.0.1:80", "://x", "unix://", "a b://x"] {
            assert_eq!(parse(raw), Err(AddressError::InvalidAddress), "{raw}");
        }
    }

    #[test]
    fn empty_address_derives_from_sanitized_name() {
        for name in ["myplugin", "My Plugin", "ebs_fast+1", "default"] {
            let resolved = resolve(name, "").expect("resolve");
            assert_eq!(resolved.scheme, Scheme::Unix);
            assert_eq!(
                resolved.endpoint,
                format!("/run/docker/plugins/{}.sock", sanitize(name))
            );
        }
    }

    #[test]
    fn default_docker_uses_fixed_paths() {
        let resolved = resolve("default-docker", "  ").expect("resolve");
        assert_eq!(resolved.endpoint, "/run/docker/plugins/rexray.sock");
        assert_eq!(
            default_address("default-docker"),
            "unix:///run/docker/plugins/rexray.sock"
        );
        assert_eq!(
            default_discovery_path("default-docker"),
            PathBuf::from("/etc/docker/plugins/rexray.spec")
        );
    }

    #[test]
    fn configured_address_wins_over_default() {
        let resolved = resolve("ignored", " tcp://0.0.0.0:7979 ").expect("resolve");
        assert_eq!(resolved.to_string(), "tcp://0.0.0.0:7979");
        assert!(resolved.socket_path().is_none());
    }

    #[test]
    fn discovery_path_mirrors_socket_naming() {
        assert_eq!(
            default_discovery_path("Block Store"),
            PathBuf::from("/etc/docker/plugins/block-store.spec")
        );
        let unix = resolve("Block Store", "").expect("resolve");
        assert_eq!(
            unix.socket_path(),
            Some(Path::new("/run/docker/plugins/block-store.sock"))
        );
    }
}
