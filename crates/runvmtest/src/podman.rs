//! Extract artifacts from container images using podman.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::process::Stdio;

use bootc_utils::CommandRunExt;
use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::{eyre, Context};
use color_eyre::Result;
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, instrument};

use crate::artifacts::{host_path, ArtifactClient, ArtifactKind, Rootfs};
use crate::cleanup::{self, Cancel};

const PODMAN: &str = "podman";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VersionInfo {
    version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PodmanVersion {
    client: VersionInfo,
    /// Only present when talking to a remote service
    server: Option<VersionInfo>,
}

/// A podman installation verified to respond.
#[derive(Debug)]
pub(crate) struct PodmanClient {
    version: String,
}

impl PodmanClient {
    /// Check that podman can be invoked and answers queries.
    #[instrument]
    pub(crate) fn connect() -> Result<Self> {
        let v: PodmanVersion = std::process::Command::new(PODMAN)
            .args(["version", "--format=json"])
            .run_and_parse_json()
            .map_err(|e| eyre!("podman version failed: {e}"))?;
        let version = v.server.unwrap_or(v.client).version;
        debug!("Connected to podman {version}");
        Ok(Self { version })
    }

    pub(crate) fn version(&self) -> &str {
        &self.version
    }
}

/// Run podman, returning its trimmed stdout.
///
/// On cancellation podman is killed and reaped before this returns.
async fn podman<I, S>(args: I, cancel: &Cancel) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    cancel.check()?;
    let mut cmd = tokio::process::Command::new(PODMAN);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    debug!("exec: {cmd:?}");
    let mut child = cmd.spawn().with_context(|| format!("Invoking {cmd:?}"))?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| eyre!("podman stdout not captured"))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| eyre!("podman stderr not captured"))?;
    let (mut out, mut err) = (String::new(), String::new());
    let (status, _, _) = tokio::try_join!(
        cleanup::wait_child(&mut child, cancel),
        async { stdout.read_to_string(&mut out).await.context("Reading stdout") },
        async { stderr.read_to_string(&mut err).await.context("Reading stderr") },
    )?;
    if !status.success() {
        return Err(eyre!("{cmd:?} failed ({status}): {}", err.trim()));
    }
    Ok(out.trim().to_owned())
}

async fn copy_out(
    id: &str,
    paths: &BTreeMap<Utf8PathBuf, ArtifactKind>,
    dest: &Utf8Path,
    cancel: &Cancel,
) -> Result<()> {
    for (path, kind) in paths {
        cancel.check()?;
        let target = host_path(dest, path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Creating {parent}"))?;
        }
        debug!("Copying {kind:?} {path} to {target}");
        let source = format!("{id}:{path}");
        podman(["cp", source.as_str(), target.as_str()], cancel)
            .await
            .with_context(|| format!("Copying {path}"))?;
    }
    Ok(())
}

impl ArtifactClient for PodmanClient {
    #[instrument(skip_all, fields(dest = %dest))]
    async fn export(&self, rootfs: &Rootfs, dest: &Utf8Path, cancel: &Cancel) -> Result<()> {
        for (image, paths) in rootfs.images() {
            info!("Extracting {} path(s) from {image}", paths.len());
            // The command is never run; it only satisfies images without one.
            let id = podman(["create", "--pull=newer", image, "true"], cancel)
                .await
                .with_context(|| format!("Fetching {image}"))?;
            let copied = copy_out(&id, paths, dest, cancel)
                .await
                .with_context(|| format!("Extracting from {image}"));
            // Also after an interrupt, so no container is left behind
            let removed = podman(["rm", "--force", id.as_str()], &Cancel::never())
                .await
                .with_context(|| format!("Removing container for {image}"));
            copied?;
            removed?;
        }
        Ok(())
    }
}
