//! Provision artifacts and run the test command.
//!
//! The flow is: create a scratch directory, decide which variables need
//! artifacts, render them, export the artifacts, then run the command with
//! the rendered variables added to its environment. Without
//! `--keep-artifacts` the scratch directory is removed afterwards, also
//! when interrupted.

use std::ffi::OsString;
use std::future::Future;

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::{eyre, Context};
use color_eyre::Result;
use tracing::{debug, info, instrument};

use crate::arch::ContainerConfig;
use crate::artifacts::ArtifactClient;
use crate::cleanup::{self, Cancel, InterruptCleanup, Outcome};
use crate::materialize::{self, Assignment};
use crate::podman::PodmanClient;
use crate::resolve;

/// Prefix of the scratch directory created for each run.
const WORKDIR_PREFIX: &str = "ci-testing";

/// Sets VMTEST_QEMU and VMTEST_KERNEL (if not already set) with binaries
/// extracted from container images, then executes a command.
#[derive(clap::Parser, Debug)]
#[clap(version)]
pub(crate) struct RunOpts {
    /// Keep artifacts directory available for further local tests
    #[clap(long)]
    pub(crate) keep_artifacts: bool,

    /// Command to execute, followed by its arguments
    ///
    /// Separate it from runvmtest's own flags with `--`.
    #[clap(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND"
    )]
    pub(crate) command: Vec<OsString>,
}

/// Everything a single run depends on.
#[derive(Debug)]
pub(crate) struct Invocation<'a> {
    pub(crate) config: ContainerConfig,
    /// Directory in which the scratch directory is created
    pub(crate) workdir_parent: &'a Utf8Path,
    pub(crate) keep_artifacts: bool,
    pub(crate) command: &'a [OsString],
}

/// Entry point for the CLI, once `client` is connected.
pub(crate) async fn run(client: &PodmanClient, opts: RunOpts) -> Result<()> {
    // Before the directory exists, so an early Ctrl-C still cleans up
    let interrupt = cleanup::sigint(!opts.keep_artifacts)?;
    let inv = Invocation {
        config: crate::arch::default_config(),
        workdir_parent: Utf8Path::new("."),
        keep_artifacts: opts.keep_artifacts,
        command: &opts.command,
    };
    run_natively(client, &inv, interrupt).await
}

fn create_workdir(parent: &Utf8Path) -> Result<Utf8PathBuf> {
    let td = tempfile::Builder::new()
        .prefix(WORKDIR_PREFIX)
        .keep(true)
        .tempdir_in(parent)
        .with_context(|| format!("unable to create tmp dir in {parent}"))?;
    let abs = std::fs::canonicalize(td.path()).context("could not retrieve absolute path")?;
    Utf8PathBuf::try_from(abs).context("tmp dir path is not UTF-8")
}

/// Run the command with artifacts provisioned from `client`.
///
/// Without `keep_artifacts`, `interrupt` resolving at any point stops the
/// run; the scratch directory is removed once nothing writes to it anymore.
#[instrument(skip_all)]
pub(crate) async fn run_natively<C, F>(client: &C, inv: &Invocation<'_>, interrupt: F) -> Result<()>
where
    C: ArtifactClient,
    F: Future<Output = ()> + Send + 'static,
{
    let tmp = create_workdir(inv.workdir_parent)?;
    debug!("Artifacts directory: {tmp}");

    if inv.keep_artifacts {
        let result = provision_and_exec(client, inv, &tmp, &Cancel::never()).await;
        info!("Keeping artifacts in {tmp}");
        return result;
    }

    let (listener, cancel) = InterruptCleanup::spawn(interrupt);
    // Returns only after any podman or child process has been reaped
    let result = provision_and_exec(client, inv, &tmp, &cancel).await;
    let outcome = listener.finish().await?;
    cleanup::remove_workdir(&tmp)?;
    match outcome {
        Outcome::Stopped => result,
        Outcome::Interrupted => {
            if let Err(e) = result {
                debug!("Run stopped with: {e:#}");
            }
            Err(eyre!(cleanup::INTERRUPTED))
        }
    }
}

async fn provision_and_exec<C: ArtifactClient>(
    client: &C,
    inv: &Invocation<'_>,
    tmp: &Utf8Path,
    cancel: &Cancel,
) -> Result<()> {
    let resolution = resolve::resolve(inv.config, tmp, resolve::ambient_is_set);
    let assignments = materialize::materialize(&resolution.vars)?;

    if !resolution.rootfs.is_empty() {
        client
            .export(&resolution.rootfs, tmp, cancel)
            .await
            .context("failed artifact export")?;
    }

    let r = exec(inv.command, &assignments, cancel).await;
    if inv.keep_artifacts {
        println!("{}", reuse_hint(&assignments));
    }
    r
}

/// What is printed after the run when artifacts are kept.
fn reuse_hint(assignments: &[Assignment]) -> String {
    format!(
        "\nTo run another test using the same artifacts:\n{} ...",
        materialize::join(assignments)
    )
}

async fn exec(command: &[OsString], assignments: &[Assignment], cancel: &Cancel) -> Result<()> {
    let (bin, args) = command
        .split_first()
        .ok_or_else(|| eyre!("too few arguments: usage: `runvmtest -- ./test-to-run`"))?;
    for a in assignments {
        info!("{a}");
    }
    cancel.check()?;
    let mut child = tokio::process::Command::new(bin)
        .args(args)
        .envs(assignments.iter().map(|a| (&a.name, &a.value)))
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed execution: unable to start {bin:?}"))?;
    let status = cleanup::wait_child(&mut child, cancel).await?;
    if !status.success() {
        return Err(eyre!("failed execution: {bin:?} {status}"));
    }
    Ok(())
}
