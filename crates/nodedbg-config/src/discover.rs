//! Engine executable discovery.

use std::path::PathBuf;

/// Executable name looked up on `PATH`.
pub const ENGINE_BINARY: &str = "node";

/// Locate the engine executable.
///
/// Searches `PATH` first, then the default install locations for the
/// current platform. Returns `None` when nothing usable is found.
pub fn discover_engine() -> Option<PathBuf> {
    match which::which(ENGINE_BINARY) {
        Ok(path) => return Some(path),
        Err(e) => tracing::debug!("{} not on PATH: {}", ENGINE_BINARY, e),
    }
    let found = fallback_locations().into_iter().find(|p| p.is_file());
    if found.is_none() {
        tracing::warn!("no {} executable found", ENGINE_BINARY);
    }
    found
}

#[cfg(windows)]
fn fallback_locations() -> Vec<PathBuf> {
    ["ProgramFiles", "ProgramFiles(x86)"]
        .iter()
        .filter_map(std::env::var_os)
        .map(|dir| PathBuf::from(dir).join("nodejs").join("node.exe"))
        .collect()
}

#[cfg(not(windows))]
fn fallback_locations() -> Vec<PathBuf> {
    ["/usr/local/bin/node", "/usr/bin/node", "/opt/homebrew/bin/node"]
        .iter()
        .map(PathBuf::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_locations_are_absolute() {
        for p in fallback_locations() {
            assert!(p.is_absolute(), "{} is not absolute", p.display());
        }
    }

    #[test]
    fn discovered_engine_is_a_file() {
        // Environment dependent; only check consistency when something is found.
        if let Some(path) = discover_engine() {
            assert!(path.is_file());
        }
    }
}
