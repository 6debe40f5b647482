use std::path::Path;
use std::process::{Command, Stdio};

use color_eyre::eyre::{eyre, Context};
use color_eyre::Result;
use libtest_mimic::{Arguments, Trial};

mod tests {
    pub mod cli;
    pub mod guest_timeout;
}

/// Get the path to the runvmtest binary, checking RUNVMTEST_PATH first, then falling back to "runvmtest"
pub(crate) fn get_runvmtest_command() -> Result<String> {
    if let Ok(path) = std::env::var("RUNVMTEST_PATH") {
        // Tests change directory, so relative paths must be resolved first
        if path.contains('/') {
            let abs = std::fs::canonicalize(&path)
                .with_context(|| format!("Resolving RUNVMTEST_PATH={path}"))?;
            return abs
                .into_os_string()
                .into_string()
                .map_err(|p| eyre!("Non UTF-8 path: {p:?}"));
        }
        return Ok(path);
    }
    // Force the user to set this if we're running from the project dir
    if let Some(path) = ["target/debug/runvmtest", "target/release/runvmtest"]
        .into_iter()
        .find(|p| Path::new(p).exists())
    {
        return Err(eyre!(
            "Detected {path} - set RUNVMTEST_PATH={path} to run using this binary"
        ));
    }
    Ok("runvmtest".to_owned())
}

fn podman_available() -> bool {
    Command::new("podman")
        .args(["version", "--format=json"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

fn main() {
    let args = Arguments::from_args();
    let no_podman = !podman_available();

    let tests = vec![
        Trial::test("too_few_arguments", || {
            tests::cli::test_too_few_arguments()?;
            Ok(())
        }),
        Trial::test("connect_failure", || {
            tests::cli::test_connect_failure()?;
            Ok(())
        }),
        Trial::test("caller_override_wins", || {
            tests::cli::test_caller_override_wins()?;
            Ok(())
        })
        .with_ignored_flag(no_podman),
        Trial::test("child_failure_propagates", || {
            tests::cli::test_child_failure_propagates()?;
            Ok(())
        })
        .with_ignored_flag(no_podman),
        Trial::test("keep_artifacts", || {
            tests::cli::test_keep_artifacts()?;
            Ok(())
        })
        .with_ignored_flag(no_podman),
        Trial::test("guest_timeout", || {
            tests::guest_timeout::test_guest_timeout()?;
            Ok(())
        })
        .with_ignored_flag(!tests::guest_timeout::qemu_available()),
    ];

    libtest_mimic::run(&args, tests).exit();
}
