use anyhow::{anyhow, Result};
use std::path::PathBuf;
use tempfile::TempDir;

use super::{naming, Source};
use crate::notifier::Notifier;

/// Tar implementation of the Source trait for pre-saved tarballs
pub struct TarSource;

impl TarSource {
    pub fn new() -> Result<Self> {
        Ok(Self)
    }
}

impl Source for TarSource {
    fn name(&self) -> &str {
        "tar"
    }

    fn get_image_tarball(
        &self,
        image_path: &str,
        notifier: &Notifier,
    ) -> Result<(PathBuf, Option<TempDir>)> {
        // For tar source, image_path is the path to the existing tarball
        let tarball_path = PathBuf::from(image_path);

        if !tarball_path.exists() {
            return Err(anyhow!(
                "Tarball file does not exist: {}",
                tarball_path.display()
            ));
        }

        if !tarball_path.is_file() {
            return Err(anyhow!("Path is not a file: {}", tarball_path.display()));
        }

        let extension = tarball_path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");

        if !matches!(extension, "tar" | "gz" | "tgz") {
            notifier.warn("File does not have a .tar extension. Proceeding anyway, but this might not be a valid image tarball.");
        }

        // No temp dir needed: the tarball is read in place
        Ok((tarball_path, None))
    }

    fn script_name(&self, image_path: &str) -> String {
        naming::script_name_for_tar(image_path)
    }
}
