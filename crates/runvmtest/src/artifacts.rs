//! Files and directories staged out of container images.
//!
//! Staging only records what to copy; nothing touches the network or the
//! host filesystem until the assembled root is exported by an
//! [`ArtifactClient`].

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::Result;

use crate::cleanup::Cancel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArtifactKind {
    File,
    Directory,
}

/// A filesystem root assembled from paths of one or more images.
#[derive(Debug, Default)]
pub(crate) struct Rootfs {
    /// image -> in-container path -> kind
    images: BTreeMap<String, BTreeMap<Utf8PathBuf, ArtifactKind>>,
}

impl Rootfs {
    fn with(&mut self, image: &str, path: &str, kind: ArtifactKind) -> &mut Self {
        self.images
            .entry(image.to_owned())
            .or_default()
            .insert(Utf8PathBuf::from(path), kind);
        self
    }

    /// Stage a single file from `image`.
    pub(crate) fn with_file(&mut self, image: &str, path: &str) -> &mut Self {
        self.with(image, path, ArtifactKind::File)
    }

    /// Stage a directory (recursively) from `image`.
    pub(crate) fn with_directory(&mut self, image: &str, path: &str) -> &mut Self {
        self.with(image, path, ArtifactKind::Directory)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Staged paths grouped by source image, in a stable order.
    pub(crate) fn images(
        &self,
    ) -> impl Iterator<Item = (&str, &BTreeMap<Utf8PathBuf, ArtifactKind>)> {
        self.images.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Where an in-container path lands once exported under `root`.
pub(crate) fn host_path(root: &Utf8Path, container_path: impl AsRef<str>) -> Utf8PathBuf {
    root.join(container_path.as_ref().trim_start_matches('/'))
}

/// Something able to materialize a [`Rootfs`] onto the host.
pub(crate) trait ArtifactClient {
    /// Export every staged path into `dest`, preserving in-container
    /// paths relative to it.
    ///
    /// Once `cancel` is raised, must return promptly without leaving any
    /// process writing into `dest`.
    async fn export(&self, rootfs: &Rootfs, dest: &Utf8Path, cancel: &Cancel) -> Result<()>;
}
