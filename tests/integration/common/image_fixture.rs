//! Builds synthetic `docker save` tarballs so the pipeline can run without a daemon.

use serde_json::{json, Value};
use std::fs::File;
use std::path::{Path, PathBuf};
use tar_rs::{Builder, Header};

pub const NOP: &str = "/bin/sh -c #(nop) ";

struct FixtureEntry {
    created_by: String,
    comment: Option<String>,
    /// Files of the layer this entry produced; `None` for metadata-only entries
    files: Option<Vec<(String, String)>>,
}

#[derive(Default)]
pub struct ImageFixture {
    entries: Vec<FixtureEntry>,
    container: Option<String>,
    cmd: Option<Vec<String>>,
    entrypoint: Option<Vec<String>>,
    env: Vec<String>,
    repo_tag: Option<String>,
    with_index: bool,
}

impl ImageFixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// A metadata-only history entry.
    pub fn empty(mut self, created_by: &str) -> Self {
        self.entries.push(FixtureEntry {
            created_by: created_by.to_string(),
            comment: None,
            files: None,
        });
        self
    }

    /// A `#(nop)` instruction recorded by the legacy builder.
    pub fn nop(self, instruction: &str) -> Self {
        self.empty(&format!("{}{}", NOP, instruction))
    }

    /// A history entry that produced a layer holding `files`.
    pub fn layer(mut self, created_by: &str, files: &[(&str, &str)]) -> Self {
        self.entries.push(FixtureEntry {
            created_by: created_by.to_string(),
            comment: None,
            files: Some(
                files
                    .iter()
                    .map(|(path, content)| (path.to_string(), content.to_string()))
                    .collect(),
            ),
        });
        self
    }

    /// Tags the last entry with a buildkit comment.
    pub fn buildkit(mut self) -> Self {
        if let Some(entry) = self.entries.last_mut() {
            entry.comment = Some("buildkit.dockerfile.v0".to_string());
        }
        self
    }

    pub fn container(mut self, container: &str) -> Self {
        self.container = Some(container.to_string());
        self
    }

    pub fn cmd(mut self, cmd: &[&str]) -> Self {
        self.cmd = Some(cmd.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn entrypoint(mut self, entrypoint: &[&str]) -> Self {
        self.entrypoint = Some(entrypoint.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn env(mut self, var: &str) -> Self {
        self.env.push(var.to_string());
        self
    }

    pub fn repo_tag(mut self, tag: &str) -> Self {
        self.repo_tag = Some(tag.to_string());
        self
    }

    /// Also write an OCI `index.json` pointing at a manifest digest.
    pub fn with_index(mut self) -> Self {
        self.with_index = true;
        self
    }

    /// Writes the image tarball into `dir` and returns its path.
    pub fn build(&self, dir: &Path, file_name: &str) -> PathBuf {
        let tarball_path = dir.join(file_name);
        let mut image = Builder::new(File::create(&tarball_path).unwrap());

        let mut layer_paths = Vec::new();
        let mut diff_ids = Vec::new();
        let mut history = Vec::new();

        for (i, entry) in self.entries.iter().enumerate() {
            let mut record = json!({
                "created": "2024-05-01T10:00:00Z",
                "created_by": entry.created_by,
            });
            if let Some(comment) = &entry.comment {
                record["comment"] = json!(comment);
            }

            match &entry.files {
                Some(files) => {
                    let layer_path = format!("{:064x}/layer.tar", i + 1);
                    append_bytes(&mut image, &layer_path, &layer_tar(files));
                    diff_ids.push(format!("sha256:{:064x}", i + 1));
                    layer_paths.push(layer_path);
                }
                None => record["empty_layer"] = json!(true),
            }
            history.push(record);
        }

        let mut config: Value = json!({
            "architecture": "amd64",
            "os": "linux",
            "created": "2024-05-01T10:00:00Z",
            "config": {
                "Env": self.env,
            },
            "rootfs": { "type": "layers", "diff_ids": diff_ids },
            "history": history,
        });
        if let Some(cmd) = &self.cmd {
            config["config"]["Cmd"] = json!(cmd);
        }
        if let Some(entrypoint) = &self.entrypoint {
            config["config"]["Entrypoint"] = json!(entrypoint);
        }
        if let Some(container) = &self.container {
            config["container"] = json!(container);
        }

        let config_hash = "c0ffee".repeat(10) + "abcd";
        let config_path = format!("{}.json", config_hash);
        append_bytes(&mut image, &config_path, config.to_string().as_bytes());

        let repo_tags: Vec<&String> = self.repo_tag.iter().collect();
        let manifest = json!([{
            "Config": config_path,
            "RepoTags": repo_tags,
            "Layers": layer_paths,
        }]);
        append_bytes(&mut image, "manifest.json", manifest.to_string().as_bytes());

        if self.with_index {
            let index = json!({
                "schemaVersion": 2,
                "manifests": [{
                    "mediaType": "application/vnd.oci.image.manifest.v1+json",
                    "digest": format!("sha256:{}", "feed".repeat(16)),
                    "size": 1,
                }],
            });
            append_bytes(&mut image, "index.json", index.to_string().as_bytes());
        }

        image.finish().unwrap();
        tarball_path
    }
}

fn append_bytes<W: std::io::Write>(builder: &mut Builder<W>, path: &str, content: &[u8]) {
    let mut header = Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, path, content).unwrap();
}

fn layer_tar(files: &[(String, String)]) -> Vec<u8> {
    let mut builder = Builder::new(Vec::new());
    for (path, content) in files {
        append_bytes(&mut builder, path, content.as_bytes());
    }
    builder.into_inner().unwrap()
}
