use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;
use tracing::warn;

/// Firmware version string for the `GIT_HASH` define.
///
/// Tries the git checkout holding `component_dir` first, then the host
/// framework version, and finally settles for `unknown`. Never fails.
pub async fn discover_version(component_dir: &Path, host_version: Option<&str>) -> String {
    let git = git_version(component_dir).await;
    pick_version(git, host_version)
}

/// Choose between the discovered sources, in order of preference
pub fn pick_version(git: Option<String>, host_version: Option<&str>) -> String {
    if let Some(version) = git {
        return version;
    }

    match host_version.map(str::trim).filter(|v| !v.is_empty()) {
        Some(version) => format!("esphome-{}", version),
        None => {
            warn!("Could not determine firmware version from git or the host framework, using 'unknown'");
            "unknown".to_string()
        }
    }
}

/// `git-<short hash>`, with `-dirty` when the work tree has unstaged changes
pub async fn git_version(dir: &Path) -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .current_dir(dir)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
        .map_err(|e| debug!("git not available: {}", e))
        .ok()?;

    if !output.status.success() {
        debug!("{} is not inside a git checkout", dir.display());
        return None;
    }

    let hash = String::from_utf8(output.stdout).ok()?.trim().to_string();
    if hash.is_empty() {
        return None;
    }

    let clean = Command::new("git")
        .args(["diff", "--quiet"])
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false);

    Some(if clean {
        format!("git-{}", hash)
    } else {
        format!("git-{}-dirty", hash)
    })
}
