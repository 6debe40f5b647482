//! Decide which variables need artifacts and stage them.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info};

use crate::arch::{ContainerConfig, EnvVarSpec};
use crate::artifacts::{host_path, Rootfs};

/// A variable whose artifacts are staged but which is not rendered yet.
#[derive(Debug)]
pub(crate) struct PendingVar {
    pub(crate) name: &'static str,
    pub(crate) spec: &'static EnvVarSpec,
    /// Template variable name -> host path after export
    pub(crate) files: BTreeMap<&'static str, Utf8PathBuf>,
}

/// Everything needed to export artifacts and render variables.
#[derive(Debug, Default)]
pub(crate) struct Resolution {
    pub(crate) rootfs: Rootfs,
    pub(crate) vars: Vec<PendingVar>,
}

/// Whether `name` is set to a non-empty value in this process.
pub(crate) fn ambient_is_set(name: &str) -> bool {
    std::env::var_os(name).is_some_and(|v| !v.is_empty())
}

/// Stage the artifacts of every variable the caller has not set.
///
/// `tmp` must be absolute; it is the directory the rootfs will later be
/// exported into, and every recorded host path lives beneath it.
pub(crate) fn resolve(
    config: ContainerConfig,
    tmp: &Utf8Path,
    is_set: impl Fn(&str) -> bool,
) -> Resolution {
    let mut r = Resolution::default();
    for container in config {
        for (name, spec) in container.vars {
            let name: &'static str = name;
            if is_set(name) {
                info!("Using {name} from the environment");
                continue;
            }
            let mut files = BTreeMap::new();
            for (key, path) in spec.files {
                debug!("Staging file {path} from {} for {name}", container.image);
                r.rootfs.with_file(container.image, path);
                files.insert(*key, host_path(tmp, path));
            }
            for (key, path) in spec.directories {
                debug!("Staging directory {path} from {} for {name}", container.image);
                r.rootfs.with_directory(container.image, path);
                files.insert(*key, host_path(tmp, path));
            }
            r.vars.push(PendingVar { name, spec, files });
        }
    }
    r
}

#[cfg(test)]
mod tests {
    use crate::arch::{self, KERNEL_ENV, QEMU_ENV};
    use crate::artifacts::ArtifactKind;

    use super::*;

    const TMP: &str = "/work/ci-testing42";

    fn amd64() -> ContainerConfig {
        arch::lookup("amd64").unwrap()
    }

    fn staged(r: &Resolution) -> Vec<(String, String, ArtifactKind)> {
        r.rootfs
            .images()
            .flat_map(|(image, paths)| {
                paths
                    .iter()
                    .map(move |(p, k)| (image.to_owned(), p.to_string(), *k))
            })
            .collect()
    }

    #[test]
    fn test_resolve_amd64() {
        let r = resolve(amd64(), Utf8Path::new(TMP), |_| false);
        similar_asserts::assert_eq!(
            staged(&r),
            vec![
                (
                    "ghcr.io/hugelgupf/vmtest/kernel-amd64:main".to_owned(),
                    "/bzImage".to_owned(),
                    ArtifactKind::File
                ),
                (
                    "ghcr.io/hugelgupf/vmtest/qemu:main".to_owned(),
                    "/zqemu".to_owned(),
                    ArtifactKind::Directory
                ),
            ]
        );
        let names: Vec<_> = r.vars.iter().map(|v| v.name).collect();
        assert_eq!(names, [KERNEL_ENV, QEMU_ENV]);
        assert_eq!(
            r.vars[0].files["bzImage"],
            Utf8Path::new("/work/ci-testing42/bzImage")
        );
        assert_eq!(
            r.vars[1].files["qemu"],
            Utf8Path::new("/work/ci-testing42/zqemu")
        );
    }

    #[test]
    fn test_resolve_skips_ambient() {
        let r = resolve(amd64(), Utf8Path::new(TMP), |name| name == KERNEL_ENV);
        let names: Vec<_> = r.vars.iter().map(|v| v.name).collect();
        assert_eq!(names, [QEMU_ENV]);
        let images: Vec<_> = r.rootfs.images().map(|(i, _)| i).collect();
        assert_eq!(images, ["ghcr.io/hugelgupf/vmtest/qemu:main"]);

        let r = resolve(amd64(), Utf8Path::new(TMP), |_| true);
        assert!(r.vars.is_empty());
        assert!(r.rootfs.is_empty());
    }

    #[test]
    fn test_resolve_empty_config() {
        let r = resolve(&[], Utf8Path::new(TMP), |_| false);
        assert!(r.vars.is_empty());
        assert!(r.rootfs.is_empty());
    }

    #[test]
    fn test_resolve_deterministic() {
        for arch in ["amd64", "arm", "arm64"] {
            let config = arch::lookup(arch).unwrap();
            let a = resolve(config, Utf8Path::new(TMP), |_| false);
            let b = resolve(config, Utf8Path::new(TMP), |_| false);
            let summary = |r: &Resolution| {
                r.vars
                    .iter()
                    .map(|v| (v.name, v.spec.template, v.files.clone()))
                    .collect::<Vec<_>>()
            };
            assert_eq!(summary(&a), summary(&b), "{arch}");
            assert_eq!(staged(&a), staged(&b), "{arch}");
        }
    }
}
