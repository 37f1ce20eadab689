//! `.automator.json` build descriptor.
//!
//! A build records the endpoint it was compiled against so the next launch
//! can skip compilation when nothing relevant changed. The check is coarse:
//! only the endpoint and the tool version are compared.
//!
//! Location, first match wins:
//!
//! | Condition | Path |
//! |-----------|------|
//! | `UNI_OUTPUT_DIR` set | `<UNI_OUTPUT_DIR>/../.automator/<platform>/.automator.json` |
//! | otherwise | `<project>/dist/<mode>/.automator/<platform>/.automator.json` |
//! | fallback | `<project>/unpackage/dist/<mode>/.automator/<platform>/.automator.json` |

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::{BuildMode, Environment};

// ============================================================================
// Constants
// ============================================================================

/// Descriptor file name.
pub const AUTOMATOR_JSON_FILE: &str = ".automator.json";

/// Tool version recorded in descriptors.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// AutomatorDescriptor
// ============================================================================

/// Contents of `.automator.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomatorDescriptor {
    /// Tool version that produced the build.
    #[serde(default)]
    pub version: String,
    /// Endpoint the build connects back to.
    #[serde(default)]
    pub ws_endpoint: String,
}

impl AutomatorDescriptor {
    /// Creates a descriptor for the current tool version.
    #[must_use]
    pub fn new(ws_endpoint: impl Into<String>) -> Self {
        Self {
            version: VERSION.to_string(),
            ws_endpoint: ws_endpoint.into(),
        }
    }

    /// Candidate descriptor paths, in lookup order.
    #[must_use]
    pub fn candidate_paths(
        project_path: &Path,
        platform: &str,
        mode: BuildMode,
        env: &Environment,
    ) -> Vec<PathBuf> {
        let tail = Path::new(".automator").join(platform).join(AUTOMATOR_JSON_FILE);

        if let Some(output_dir) = &env.output_dir {
            return vec![output_dir.join("..").join(tail)];
        }

        vec![
            project_path.join("dist").join(mode.as_str()).join(&tail),
            project_path
                .join("unpackage")
                .join("dist")
                .join(mode.as_str())
                .join(&tail),
        ]
    }

    /// Reads the first parsable descriptor.
    ///
    /// Missing or malformed files count as absent.
    #[must_use]
    pub fn resolve(
        project_path: &Path,
        platform: &str,
        mode: BuildMode,
        env: &Environment,
    ) -> Option<Self> {
        for path in Self::candidate_paths(project_path, platform, mode, env) {
            let Ok(text) = std::fs::read_to_string(&path) else {
                trace!(path = %path.display(), "No descriptor");
                continue;
            };
            match serde_json::from_str::<Self>(&text) {
                Ok(descriptor) => {
                    debug!(path = %path.display(), ?descriptor, "Descriptor found");
                    return Some(descriptor);
                }
                Err(e) => debug!(path = %path.display(), error = %e, "Malformed descriptor"),
            }
        }
        None
    }

    /// Writes the descriptor the way a build does.
    #[cfg(test)]
    fn save(&self, path: &Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        debug!(path = %path.display(), "Descriptor saved");
        Ok(())
    }
}

// ============================================================================
// Endpoint
// ============================================================================

/// Returns the endpoint an application should dial: the private LAN IPv4
/// address when there is one, else `localhost`.
#[must_use]
pub fn ws_endpoint(port: u16) -> String {
    let host = local_private_ipv4().map_or_else(|| "localhost".to_string(), |ip| ip.to_string());
    format!("ws://{host}:{port}")
}

/// Returns `true` if the persisted descriptor matches `port` and this tool
/// version.
#[must_use]
pub fn equal_ws_endpoint(
    project_path: &Path,
    port: u16,
    platform: &str,
    mode: BuildMode,
    env: &Environment,
) -> bool {
    let Some(descriptor) = AutomatorDescriptor::resolve(project_path, platform, mode, env) else {
        return false;
    };
    if descriptor.ws_endpoint.is_empty() {
        return false;
    }
    if descriptor.version != VERSION {
        debug!(found = %descriptor.version, expected = VERSION, "Descriptor version mismatch");
        return false;
    }
    let current = ws_endpoint(port);
    debug!(ws_endpoint = %current, "Comparing descriptor endpoint");
    descriptor.ws_endpoint == current
}

/// Address of the default-route interface, if it is a private IPv4.
fn local_private_ipv4() -> Option<Ipv4Addr> {
    // No packet is sent; connect only selects the outbound interface.
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(10, 255, 255, 255), 1)).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if ip.is_private() => Some(ip),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
