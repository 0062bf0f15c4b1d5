//! Extract an OCI/Docker image tarball into a typed, queryable structure.
//!
//! [`ExtractedImage`] unwraps a `docker save`/OCI image tarball into:
//! - [`ImageMetadata`]: id, repo tags, container identifier, config defaults and the ordered
//!   build history.
//! - Ordered [`Layer`] records (oldest → newest), each non-empty one paired with its layer
//!   archive from the manifest.
//!
//! Key behavior:
//! - Validates the expected layout (`manifest.json` required).
//! - The id comes from `index.json` when present, otherwise from the config path.
//! - History entries are mapped to layer archives by walking history in reverse and pairing
//!   non-empty entries with manifest `Layers` from the end, then re-reversing.
//! - Manifest paths must stay inside the extraction directory; `..` and absolute paths are
//!   rejected.
//! - Implements [`AttachmentResolver`] by history position, so identical ADD/COPY lines still
//!   resolve to their own layer archives.
//!
//! Temporary extraction is scoped to the instance lifetime via `tempfile::TempDir`.

use crate::generator::AttachmentResolver;
use crate::metadata::{self, container_from_id, ImageMetadata};
use crate::notifier::Notifier;
use crate::tar_extractor;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
struct ManifestEntry {
    #[serde(rename = "Config")]
    config: String,
    #[serde(default, rename = "RepoTags")]
    repo_tags: Option<Vec<String>>,
    #[serde(default, rename = "Layers")]
    layers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    /// Position in the history list
    pub index: usize,
    pub created_by: Option<String>,
    pub is_empty: bool,
    /// Manifest-relative archive path; `None` for empty layers
    pub tarball_path: Option<String>,
}

pub struct ExtractedImage {
    extract_dir: PathBuf,
    _temp_dir: tempfile::TempDir,
    metadata: ImageMetadata,
    layers: Vec<Layer>,
}

impl ExtractedImage {
    pub fn from_tarball<P: AsRef<Path>>(tarball_path: P, notifier: &Notifier) -> Result<Self> {
        let tarball_path = tarball_path.as_ref();

        notifier.debug(&format!("Extracting image tarball: {:?}", tarball_path));

        let temp_dir = tempfile::tempdir().context("Failed to create temporary directory")?;
        let extract_dir = temp_dir.path().join("extracted");
        fs::create_dir_all(&extract_dir)?;

        tar_extractor::extract_tar(tarball_path, &extract_dir)
            .with_context(|| format!("Failed to extract tar file: {:?}", tarball_path))?;

        let manifest_path = extract_dir.join("manifest.json");
        if !manifest_path.exists() {
            return Err(anyhow!(
                "Invalid image tarball: manifest.json not found. This does not appear to be a valid OCI/Docker image tarball."
            ));
        }

        notifier.debug("Loading image metadata...");
        let manifest = Self::load_manifest(&extract_dir)?;
        let metadata = Self::load_metadata(&extract_dir, &manifest)?;

        notifier.debug("Mapping history to layer archives...");
        let layers = Self::map_layers(&metadata, &manifest.layers);

        notifier.info(&format!(
            "Loaded {} history entries, {} layer archives",
            layers.len(),
            manifest.layers.len()
        ));

        Ok(ExtractedImage {
            extract_dir,
            _temp_dir: temp_dir,
            metadata,
            layers,
        })
    }

    pub fn metadata(&self) -> &ImageMetadata {
        &self.metadata
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn extract_dir(&self) -> &Path {
        &self.extract_dir
    }

    /// Absolute location of a manifest-relative layer archive.
    pub fn layer_archive(&self, relative: &str) -> PathBuf {
        self.extract_dir.join(relative)
    }

    fn load_manifest(extract_dir: &Path) -> Result<ManifestEntry> {
        let manifest_content = fs::read_to_string(extract_dir.join("manifest.json"))
            .context("Failed to read manifest.json")?;

        let manifest: Vec<ManifestEntry> =
            serde_json::from_str(&manifest_content).context("Failed to parse manifest.json")?;

        let entry = manifest
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Empty manifest.json"))?;

        check_contained_path(&entry.config)
            .context("Invalid config path in manifest.json")?;
        for layer in &entry.layers {
            check_contained_path(layer).context("Invalid layer path in manifest.json")?;
        }

        Ok(entry)
    }

    fn load_metadata(extract_dir: &Path, manifest: &ManifestEntry) -> Result<ImageMetadata> {
        let config_file = manifest.config.as_str();
        let config_content = fs::read_to_string(extract_dir.join(config_file))
            .with_context(|| format!("Failed to read config file: {}", config_file))?;

        let config: oci_spec::image::ImageConfiguration =
            serde_json::from_str(&config_content).context("Failed to parse image configuration")?;

        // The legacy `container` field is not part of the OCI schema
        let raw: serde_json::Value =
            serde_json::from_str(&config_content).context("Failed to parse image configuration")?;

        let id = Self::image_id(extract_dir, config_file)?;
        let container = raw["container"]
            .as_str()
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| container_from_id(&id));

        let mut metadata = metadata::from_oci_config(&config, &container);
        metadata.id = id;
        metadata.repo_tags = manifest.repo_tags.clone().unwrap_or_default();

        Ok(metadata)
    }

    /// The manifest digest from `index.json` (what `docker image inspect` shows), falling back
    /// to the digest encoded in the config path.
    fn image_id(extract_dir: &Path, config_file: &str) -> Result<String> {
        let index_path = extract_dir.join("index.json");
        if index_path.exists() {
            let index_content =
                fs::read_to_string(&index_path).context("Failed to read index.json")?;
            let index: serde_json::Value =
                serde_json::from_str(&index_content).context("Failed to parse index.json")?;

            if let Some(digest) = index["manifests"][0]["digest"].as_str() {
                return Ok(digest.to_string());
            }
        }

        if let Some(digest_hash) = config_file.strip_prefix("blobs/sha256/") {
            Ok(format!("sha256:{}", digest_hash))
        } else if let Some(digest_hash) = config_file.strip_suffix(".json") {
            Ok(format!("sha256:{}", digest_hash))
        } else {
            Ok(config_file.to_string())
        }
    }

    fn map_layers(metadata: &ImageMetadata, layer_tarballs: &[String]) -> Vec<Layer> {
        let mut current_tarball_idx = layer_tarballs.len();
        let mut layers = Vec::with_capacity(metadata.history.len());

        // Pair from the newest end so that extra base-image entries without archives
        // fall on the oldest side
        for (index, entry) in metadata.history.iter().enumerate().rev() {
            let tarball_path = if !entry.empty_layer && current_tarball_idx > 0 {
                current_tarball_idx -= 1;
                Some(layer_tarballs[current_tarball_idx].clone())
            } else {
                None
            };

            layers.push(Layer {
                index,
                created_by: entry.created_by.clone(),
                is_empty: entry.empty_layer,
                tarball_path,
            });
        }

        layers.reverse();
        layers
    }
}

/// Manifest paths come from the image and are later joined onto the extraction and output
/// directories; only plain relative paths are accepted.
fn check_contained_path(path: &str) -> Result<()> {
    let mut depth = 0usize;
    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(anyhow!("{:?} escapes the image directory", path));
            }
        }
    }
    if depth == 0 {
        return Err(anyhow!("{:?} does not name a file", path));
    }
    Ok(())
}

impl AttachmentResolver for ExtractedImage {
    fn attachment_path(&self, index: usize, line: &str) -> Option<String> {
        self.layers
            .get(index)
            .filter(|layer| layer.created_by.as_deref() == Some(line))
            .and_then(|layer| layer.tarball_path.clone())
    }
}
