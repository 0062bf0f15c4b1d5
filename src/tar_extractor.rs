use anyhow::{anyhow, Context, Result};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};
use tar_rs as tar;

/// Normalizes a path from a tar archive so it stays inside the extraction root
fn normalize_tar_path(p: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for comp in p.components() {
        match comp {
            Component::CurDir => { /* skip "." */ }
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(c) => out.push(c),
            // Absolute roots and Windows prefixes are dropped
            Component::RootDir | Component::Prefix(_) => { /* ignore */ }
        }
    }

    out
}

/// Open a tar archive, transparently un-gzipping it when the gzip magic is present
fn open_archive(tar_path: &Path) -> Result<tar::Archive<Box<dyn Read>>> {
    let file = File::open(tar_path)
        .with_context(|| format!("Failed to open tar file: {}", tar_path.display()))?;

    let mut buf_reader = BufReader::new(file);
    let mut magic_bytes = [0u8; 2];
    buf_reader
        .read_exact(&mut magic_bytes)
        .context("Failed to read magic bytes from tar file")?;

    // Reopen the file since we consumed some bytes
    let file = File::open(tar_path)?;

    Ok(if magic_bytes == [0x1f, 0x8b] {
        tar::Archive::new(Box::new(GzDecoder::new(file)))
    } else {
        tar::Archive::new(Box::new(file))
    })
}

struct PendingLink {
    dest: PathBuf,
    target: PathBuf,
}

/// Extracts an image tarball (plain or gzipped) into `extract_dir`.
///
/// Layer archives inside an image tarball are only ever read back as files, so entries are
/// written as-is: no whiteout processing and no ownership changes.
pub fn extract_tar(tar_path: &Path, extract_dir: &Path) -> Result<()> {
    let mut archive = open_archive(tar_path)?;
    let mut pending_links = Vec::new();

    for entry_result in archive.entries()? {
        let mut entry = entry_result.context("Failed to read tar entry")?;
        let entry_type = entry.header().entry_type();

        let rel_path = normalize_tar_path(&entry.path().context("Failed to get entry path")?);
        if rel_path.as_os_str().is_empty() {
            continue;
        }
        let dest = extract_dir.join(&rel_path);

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        match entry_type {
            tar::EntryType::Directory => {
                fs::create_dir_all(&dest)
                    .with_context(|| format!("Failed to create directory: {}", dest.display()))?;
            }
            tar::EntryType::Regular => {
                log::debug!("Creating file: {}", dest.display());
                let mut out_file = File::create(&dest)
                    .with_context(|| format!("Failed to create file: {}", dest.display()))?;
                std::io::copy(&mut entry, &mut out_file)
                    .with_context(|| format!("Failed to write file: {}", dest.display()))?;
            }
            tar::EntryType::Symlink | tar::EntryType::Link => {
                let link_name = entry
                    .link_name()
                    .context("Failed to get link target")?
                    .ok_or_else(|| anyhow!("Link without target: {}", dest.display()))?;

                // Legacy `docker save` points duplicate layers at each other with
                // relative symlinks; hardlink names are relative to the archive root.
                let target = if entry_type == tar::EntryType::Symlink && link_name.is_relative() {
                    let base = rel_path.parent().unwrap_or_else(|| Path::new(""));
                    extract_dir.join(normalize_tar_path(&base.join(&link_name)))
                } else {
                    extract_dir.join(normalize_tar_path(&link_name))
                };
                pending_links.push(PendingLink { dest, target });
            }
            _ => {
                log::debug!("Skipping unsupported entry type: {:?}", entry_type);
            }
        }
    }

    // Links are materialized as copies once every regular file exists
    for link in pending_links {
        if link.target.is_file() {
            fs::copy(&link.target, &link.dest).with_context(|| {
                format!(
                    "Failed to copy {} to {}",
                    link.target.display(),
                    link.dest.display()
                )
            })?;
        } else {
            log::warn!(
                "Skipping link with missing target: {} -> {}",
                link.dest.display(),
                link.target.display()
            );
        }
    }

    Ok(())
}
