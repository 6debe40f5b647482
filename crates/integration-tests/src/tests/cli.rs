//! Integration tests for the runvmtest command line
//!
//! These set VMTEST_KERNEL and VMTEST_QEMU in the environment so that no
//! image is pulled; podman must still be reachable.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use color_eyre::eyre::eyre;
use color_eyre::Result;
use xshell::{cmd, Shell};

use crate::get_runvmtest_command;

const KERNEL: &str = "/opt/vmtest/bzImage";
const QEMU: &str = "/opt/vmtest/qemu-system-x86_64 -L /opt/vmtest/pc-bios -m 2G";

fn workdirs(dir: &Path) -> Result<Vec<String>> {
    let mut r = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if name.starts_with("ci-testing") {
            r.push(name);
        }
    }
    Ok(r)
}

pub fn test_too_few_arguments() -> Result<()> {
    let sh = Shell::new()?;
    let bin = get_runvmtest_command()?;

    for output in [
        cmd!(sh, "{bin}").ignore_status().output()?,
        cmd!(sh, "{bin} --keep-artifacts --").ignore_status().output()?,
    ] {
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert_eq!(output.status.code(), Some(2), "stderr: {stderr}");
        assert!(stderr.contains("<COMMAND>"), "stderr: {stderr}");
    }
    Ok(())
}

pub fn test_caller_override_wins() -> Result<()> {
    let sh = Shell::new()?;
    let td = tempfile::tempdir()?;
    sh.change_dir(td.path());
    let bin = get_runvmtest_command()?;

    let script = r#"printf '%s\n%s\n' "$VMTEST_KERNEL" "$VMTEST_QEMU""#;
    let stdout = cmd!(sh, "{bin} -- sh -c {script}")
        .env("VMTEST_KERNEL", KERNEL)
        .env("VMTEST_QEMU", QEMU)
        .read()?;
    assert_eq!(stdout, format!("{KERNEL}\n{QEMU}"));

    let leftover = workdirs(td.path())?;
    if !leftover.is_empty() {
        return Err(eyre!("Artifacts directory not removed: {leftover:?}"));
    }
    Ok(())
}

pub fn test_child_failure_propagates() -> Result<()> {
    let sh = Shell::new()?;
    let td = tempfile::tempdir()?;
    sh.change_dir(td.path());
    let bin = get_runvmtest_command()?;

    let output = cmd!(sh, "{bin} -- sh -c 'exit 7'")
        .env("VMTEST_KERNEL", KERNEL)
        .env("VMTEST_QEMU", QEMU)
        .ignore_status()
        .output()?;
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success(), "stderr: {stderr}");
    assert!(stderr.contains("failed execution"), "stderr: {stderr}");
    assert!(workdirs(td.path())?.is_empty());
    Ok(())
}

pub fn test_keep_artifacts() -> Result<()> {
    let sh = Shell::new()?;
    let td = tempfile::tempdir()?;
    sh.change_dir(td.path());
    let bin = get_runvmtest_command()?;

    let stdout = cmd!(sh, "{bin} --keep-artifacts -- true")
        .env("VMTEST_KERNEL", KERNEL)
        .env("VMTEST_QEMU", QEMU)
        .read()?;
    // Both variables came from the caller, so nothing is left to reuse
    assert!(
        stdout.ends_with("To run another test using the same artifacts:\n ..."),
        "stdout: {stdout}"
    );
    assert_eq!(workdirs(td.path())?.len(), 1);
    Ok(())
}

pub fn test_connect_failure() -> Result<()> {
    let sh = Shell::new()?;
    let td = tempfile::tempdir()?;
    sh.change_dir(td.path());
    let bin = get_runvmtest_command()?;

    // A podman that is installed but cannot reach its service
    let stubs = td.path().join("stubs");
    std::fs::create_dir(&stubs)?;
    let podman = stubs.join("podman");
    std::fs::write(
        &podman,
        "#!/bin/sh\necho 'Cannot connect to Podman' >&2\nexit 125\n",
    )?;
    std::fs::set_permissions(&podman, std::fs::Permissions::from_mode(0o755))?;
    let path = std::env::var_os("PATH").unwrap_or_default();
    let path = std::env::join_paths(
        std::iter::once(stubs.clone()).chain(std::env::split_paths(&path)),
    )?;

    let marker = td.path().join("ran");
    let output = cmd!(sh, "{bin} -- touch {marker}")
        .env("PATH", &path)
        .ignore_status()
        .output()?;
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success(), "stderr: {stderr}");
    assert!(
        stderr.contains("unable to connect to client"),
        "stderr: {stderr}"
    );
    assert!(!marker.exists());
    assert!(workdirs(td.path())?.is_empty());
    Ok(())
}
