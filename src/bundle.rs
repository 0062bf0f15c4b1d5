//! Packs a generated script and its staged layer archives into one portable `.tar.gz`.

use anyhow::{anyhow, Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::{Path, PathBuf};
use tar_rs::Builder;

/// Writes `bundle_path` holding `script_name` and every path in `resources`, all stored
/// relative to `output_dir` so the bundle unpacks into a directory the script can run from.
pub fn create_bundle<'a, I>(
    output_dir: &Path,
    script_name: &str,
    resources: I,
    bundle_path: &Path,
) -> Result<PathBuf>
where
    I: IntoIterator<Item = &'a PathBuf>,
{
    let output_file = File::create(bundle_path)
        .with_context(|| format!("Failed to create bundle: {}", bundle_path.display()))?;
    let mut archive = Builder::new(GzEncoder::new(output_file, Compression::default()));

    let entries = std::iter::once(PathBuf::from(script_name)).chain(resources.into_iter().cloned());
    for relative in entries {
        if relative.is_absolute() {
            return Err(anyhow!(
                "Bundle entries must be relative to the output directory: {}",
                relative.display()
            ));
        }

        let source = output_dir.join(&relative);
        log::debug!("Adding to bundle: {}", relative.display());
        archive
            .append_path_with_name(&source, &relative)
            .with_context(|| format!("Failed to add {} to bundle", source.display()))?;
    }

    archive
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .context("Failed to finish bundle")?;

    Ok(bundle_path.to_path_buf())
}
