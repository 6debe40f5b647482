//! Architecture detection and the artifact configuration table
//!
//! Each supported architecture maps a set of container images to the
//! environment variables they provide. The table is static; selecting an
//! architecture never fails, an unknown one simply yields no configuration
//! and the caller has to provide every variable manually.

use tracing::{debug, warn};

/// Environment variable overriding the detected host architecture.
pub(crate) const ARCH_ENV: &str = "VMTEST_ARCH";

/// Environment variable holding the guest kernel image path.
pub(crate) const KERNEL_ENV: &str = "VMTEST_KERNEL";

/// Environment variable holding the QEMU command line.
pub(crate) const QEMU_ENV: &str = "VMTEST_QEMU";

const QEMU_IMAGE: &str = "ghcr.io/hugelgupf/vmtest/qemu:main";

/// How to produce a single environment variable from container artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EnvVarSpec {
    /// Evaluated to become the variable's value.
    ///
    /// `{{.Files.$name}}` refers to an artifact extracted from the
    /// container, where `$name` is a key of `files` or `directories`.
    pub(crate) template: &'static str,
    /// Template variable name -> file path in the container
    pub(crate) files: &'static [(&'static str, &'static str)],
    /// Template variable name -> directory path in the container
    pub(crate) directories: &'static [(&'static str, &'static str)],
}

/// The variables sourced from one container image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ContainerSpec {
    /// Image reference, pulled if not present locally
    pub(crate) image: &'static str,
    /// Variable name -> how to render it
    pub(crate) vars: &'static [(&'static str, EnvVarSpec)],
}

/// All container images used on one architecture.
pub(crate) type ContainerConfig = &'static [ContainerSpec];

#[derive(Debug)]
struct ArchConfig {
    /// Architecture name, using Go's naming (amd64, arm, arm64)
    arch: &'static str,
    containers: ContainerConfig,
}

static CONFIGS: &[ArchConfig] = &[
    ArchConfig {
        arch: "amd64",
        containers: &[
            ContainerSpec {
                image: "ghcr.io/hugelgupf/vmtest/kernel-amd64:main",
                vars: &[(
                    KERNEL_ENV,
                    EnvVarSpec {
                        template: "{{.Files.bzImage}}",
                        files: &[("bzImage", "/bzImage")],
                        directories: &[],
                    },
                )],
            },
            ContainerSpec {
                image: QEMU_IMAGE,
                vars: &[(
                    QEMU_ENV,
                    EnvVarSpec {
                        template:
                            "{{.Files.qemu}}/bin/qemu-system-x86_64 -L {{.Files.qemu}}/pc-bios -m 1G",
                        files: &[],
                        directories: &[("qemu", "/zqemu")],
                    },
                )],
            },
        ],
    },
    ArchConfig {
        arch: "arm",
        containers: &[
            ContainerSpec {
                image: "ghcr.io/hugelgupf/vmtest/kernel-arm:main",
                vars: &[(
                    KERNEL_ENV,
                    EnvVarSpec {
                        template: "{{.Files.zImage}}",
                        files: &[("zImage", "/zImage")],
                        directories: &[],
                    },
                )],
            },
            ContainerSpec {
                image: QEMU_IMAGE,
                vars: &[(
                    QEMU_ENV,
                    EnvVarSpec {
                        template: "{{.Files.qemu}}/bin/qemu-system-arm -M virt,highmem=off -L {{.Files.qemu}}/pc-bios",
                        files: &[],
                        directories: &[("qemu", "/zqemu")],
                    },
                )],
            },
        ],
    },
    ArchConfig {
        arch: "arm64",
        containers: &[
            ContainerSpec {
                image: "ghcr.io/hugelgupf/vmtest/kernel-arm64:main",
                vars: &[(
                    KERNEL_ENV,
                    EnvVarSpec {
                        template: "{{.Files.Image}}",
                        files: &[("Image", "/Image")],
                        directories: &[],
                    },
                )],
            },
            ContainerSpec {
                image: QEMU_IMAGE,
                vars: &[(
                    QEMU_ENV,
                    EnvVarSpec {
                        template: "{{.Files.qemu}}/bin/qemu-system-aarch64 -machine virt -cpu max -m 1G -L {{.Files.qemu}}/pc-bios",
                        files: &[],
                        directories: &[("qemu", "/zqemu")],
                    },
                )],
            },
        ],
    },
];

/// Translate a Rust target architecture name into the table's naming.
fn table_arch(rust_arch: &str) -> Option<&'static str> {
    match rust_arch {
        "x86_64" => Some("amd64"),
        "aarch64" => Some("arm64"),
        "arm" => Some("arm"),
        _ => None,
    }
}

/// Look up the configuration for an architecture in the table's naming.
pub(crate) fn lookup(arch: &str) -> Option<ContainerConfig> {
    CONFIGS
        .iter()
        .find(|c| c.arch == arch)
        .map(|c| c.containers)
}

/// Pick a configuration: the explicit request first, then the host.
///
/// Returns an empty configuration when neither is known.
pub(crate) fn select_config(requested: Option<&str>, host: &str) -> ContainerConfig {
    if let Some(requested) = requested.filter(|a| !a.is_empty()) {
        if let Some(c) = lookup(requested) {
            debug!("Using configuration for requested architecture {requested}");
            return c;
        }
        warn!("No artifacts known for {ARCH_ENV}={requested}, falling back to host architecture");
    }
    if let Some(c) = table_arch(host).and_then(lookup) {
        debug!("Using configuration for host architecture {host}");
        return c;
    }
    warn!("No artifacts known for host architecture {host}; all variables must be set manually");
    &[]
}

/// Configuration for the current process, honoring `VMTEST_ARCH`.
pub(crate) fn default_config() -> ContainerConfig {
    let requested = std::env::var(ARCH_ENV).ok();
    select_config(requested.as_deref(), std::env::consts::ARCH)
}
