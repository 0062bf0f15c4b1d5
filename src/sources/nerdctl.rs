use anyhow::{Context, Result};
use std::path::PathBuf;
use tempfile::TempDir;

use super::{naming, save_image, Source};
use crate::notifier::Notifier;

/// containerd images through the nerdctl CLI, which mirrors `docker save`
pub struct NerdctlSource;

impl NerdctlSource {
    pub fn new() -> Result<Self> {
        Ok(Self)
    }
}

impl Source for NerdctlSource {
    fn name(&self) -> &str {
        "nerdctl"
    }

    fn get_image_tarball(
        &self,
        image_name: &str,
        notifier: &Notifier,
    ) -> Result<(PathBuf, Option<TempDir>)> {
        let temp_dir = TempDir::new().context("Failed to create temporary directory")?;
        let tarball_path = temp_dir.path().join("image.tar");

        notifier.info(&format!(
            "Exporting nerdctl image '{}' to tarball...",
            image_name
        ));
        save_image("nerdctl", image_name, &tarball_path)?;

        Ok((tarball_path, Some(temp_dir)))
    }

    fn script_name(&self, image_name: &str) -> String {
        naming::script_name_for_image(image_name)
    }
}
