//! Where image tarballs come from.
//!
//! Every source hands the processor a `docker save`-compatible tarball; daemon-backed
//! sources export into a temporary directory the caller keeps alive.

mod docker;
pub mod naming;
mod nerdctl;
mod source;
mod tar;

pub use docker::DockerSource;
pub use nerdctl::NerdctlSource;
pub use source::Source;
pub use tar::TarSource;

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::process::Command;

/// Runs `<cli> save -o <tarball> <image>`, the export both daemon CLIs share.
pub(crate) fn save_image(cli: &str, image_name: &str, tarball_path: &Path) -> Result<()> {
    let output = Command::new(cli)
        .arg("save")
        .arg("-o")
        .arg(tarball_path)
        .arg(image_name)
        .output()
        .with_context(|| format!("Failed to execute {} command. Is {} installed?", cli, cli))?;

    if !output.status.success() {
        let error = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("{} save failed: {}", cli, error.trim()));
    }

    Ok(())
}
