use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;

use crate::error::{ClientError, Result};

/// Pinned version of the external command-line tool.
pub const OP_CLI_VERSION: &str = "0.5.7";

const DOWNLOAD_TIMEOUT_MS: u64 = 120_000;

/// Map a platform identifier (`std::env::consts::OS`) to the distribution
/// artifact name. An unrecognized platform is a fatal configuration error.
fn distribution_platform(platform: &str) -> Result<&'static str> {
    match platform {
        "macos" => Ok("darwin_amd64"),
        "linux" => Ok("linux_amd64"),
        "windows" => Ok("windows_amd64"),
        other => Err(ClientError::PlatformNotSupported {
            platform: other.to_string(),
        }),
    }
}

fn executable_name(platform: &str) -> &'static str {
    if platform == "windows" { "op.exe" } else { "op" }
}

fn versioned_dir(install_dir: &Path, version: &str) -> PathBuf {
    let mut dir = install_dir.as_os_str().to_os_string();
    dir.push(format!("-{version}"));
    PathBuf::from(dir)
}

fn download_url(version: &str, distribution: &str) -> String {
    format!("https://cache.agilebits.com/dist/1P/op/pkg/v{version}/op_{distribution}_v{version}.zip")
}

/// Where the executable lives for a given install prefix and version:
/// `<install_dir>-<version>/op` (`op.exe` on Windows).
pub fn executable_path(install_dir: &Path, version: &str, platform: &str) -> PathBuf {
    versioned_dir(install_dir, version).join(executable_name(platform))
}

pub fn is_installed(install_dir: &Path, version: &str, platform: &str) -> bool {
    executable_path(install_dir, version, platform).exists()
}

/// Locate the executable, downloading and unpacking the distribution archive
/// first when it is missing. Idempotent; an already-installed executable is
/// returned without touching the network.
pub fn ensure_installed(install_dir: &Path, version: &str, platform: &str) -> Result<PathBuf> {
    let executable = executable_path(install_dir, version, platform);
    if executable.exists() {
        return Ok(executable);
    }

    let distribution = distribution_platform(platform)?;
    let folder = versioned_dir(install_dir, version);
    let url = download_url(version, distribution);
    debug!("downloading {url} into {}", folder.display());

    let timeout = Duration::from_millis(DOWNLOAD_TIMEOUT_MS);
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout_read(timeout)
        .timeout_write(timeout)
        .build();
    let response = agent
        .get(&url)
        .call()
        .map_err(|err| ClientError::install(format!("download {url}: {err}")))?;

    let mut archive_bytes = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut archive_bytes)
        .map_err(|err| ClientError::install(format!("download read: {err}")))?;

    fs::create_dir_all(&folder)
        .map_err(|err| ClientError::install(format!("create {}: {err}", folder.display())))?;

    let mut archive = zip::ZipArchive::new(Cursor::new(archive_bytes))
        .map_err(|err| ClientError::install(format!("open archive: {err}")))?;
    archive
        .extract(&folder)
        .map_err(|err| ClientError::install(format!("extract archive: {err}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&executable, fs::Permissions::from_mode(0o755))
            .map_err(|err| ClientError::install(format!("chmod executable: {err}")))?;
    }

    if !executable.exists() {
        return Err(ClientError::install(format!(
            "archive did not contain {}",
            executable.display()
        )));
    }
    Ok(executable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_platforms_map_to_artifacts() {
        assert_eq!(distribution_platform("macos").unwrap(), "darwin_amd64");
        assert_eq!(distribution_platform("linux").unwrap(), "linux_amd64");
        assert_eq!(distribution_platform("windows").unwrap(), "windows_amd64");
    }

    #[test]
    fn unknown_platform_is_fatal() {
        let err = distribution_platform("freebsd").unwrap_err();
        assert!(matches!(
            err,
            ClientError::PlatformNotSupported { platform } if platform == "freebsd"
        ));
    }

    #[test]
    fn executable_path_is_versioned() {
        let path = executable_path(Path::new("./bin/op"), "0.5.7", "linux");
        assert_eq!(path, PathBuf::from("./bin/op-0.5.7/op"));

        let windows = executable_path(Path::new("./bin/op"), "0.5.7", "windows");
        assert!(windows.ends_with("op.exe"));
    }

    #[test]
    fn download_url_matches_distribution_layout() {
        assert_eq!(
            download_url("0.5.7", "linux_amd64"),
            "https://cache.agilebits.com/dist/1P/op/pkg/v0.5.7/op_linux_amd64_v0.5.7.zip"
        );
    }

    #[test]
    fn is_installed_reflects_filesystem() {
        let tmp = tempfile::tempdir().unwrap();
        let prefix = tmp.path().join("op");
        assert!(!is_installed(&prefix, OP_CLI_VERSION, "linux"));

        let exe = executable_path(&prefix, OP_CLI_VERSION, "linux");
        fs::create_dir_all(exe.parent().unwrap()).unwrap();
        fs::write(&exe, b"").unwrap();
        assert!(is_installed(&prefix, OP_CLI_VERSION, "linux"));
    }

    #[test]
    fn ensure_installed_short_circuits_when_present() {
        let tmp = tempfile::tempdir().unwrap();
        let prefix = tmp.path().join("op");
        let exe = executable_path(&prefix, OP_CLI_VERSION, "linux");
        fs::create_dir_all(exe.parent().unwrap()).unwrap();
        fs::write(&exe, b"").unwrap();

        let resolved = ensure_installed(&prefix, OP_CLI_VERSION, "linux").unwrap();
        assert_eq!(resolved, exe);
    }
}
