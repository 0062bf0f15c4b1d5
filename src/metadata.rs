use oci_spec::image::ImageConfiguration;
use serde::{Deserialize, Serialize};

/// Decoded image facts the script generator and its caller need.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub id: String,
    #[serde(default)]
    pub repo_tags: Vec<String>,
    /// Identifier used to name the script's extraction and content folders.
    pub container: String,
    pub created: String,
    pub architecture: String,
    pub os: String,
    pub config: ContainerConfig,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerConfig {
    #[serde(default)]
    pub env: Vec<String>,
    pub user: Option<String>,
    pub working_dir: Option<String>,
    pub cmd: Option<Vec<String>>,
    pub entrypoint: Option<Vec<String>>,
    #[serde(default)]
    pub exposed_ports: Vec<String>,
}

/// One recorded build step, in build order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub created_by: Option<String>,
    pub comment: Option<String>,
    #[serde(default)]
    pub empty_layer: bool,
}

impl HistoryEntry {
    pub fn new(created_by: &str, empty_layer: bool) -> Self {
        Self {
            created_by: Some(created_by.to_string()),
            comment: None,
            empty_layer,
        }
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }

    /// The instruction body, treating an empty string like a missing one.
    pub fn body(&self) -> Option<&str> {
        self.created_by.as_deref().filter(|line| !line.is_empty())
    }
}

/// Derive the short container identifier from an image id when the configuration
/// does not carry a legacy `container` field.
pub fn container_from_id(id: &str) -> String {
    let hash = id.strip_prefix("sha256:").unwrap_or(id);
    hash.chars().take(12).collect()
}

// Conversion from the oci-spec configuration to our internal model
pub fn from_oci_config(config: &ImageConfiguration, container: &str) -> ImageMetadata {
    let config_obj = config.config().as_ref();

    let container_config = ContainerConfig {
        env: config_obj
            .map(|c| c.env().clone().unwrap_or_default())
            .unwrap_or_default(),
        user: config_obj.and_then(|c| c.user().clone()),
        working_dir: config_obj.and_then(|c| c.working_dir().clone()),
        cmd: config_obj.and_then(|c| c.cmd().clone()),
        entrypoint: config_obj.and_then(|c| c.entrypoint().clone()),
        exposed_ports: config_obj
            .and_then(|c| c.exposed_ports().clone())
            .unwrap_or_default(),
    };

    let history: Vec<HistoryEntry> = config
        .history()
        .as_ref()
        .map(|hist_vec| {
            hist_vec
                .iter()
                .map(|h| HistoryEntry {
                    created_by: h.created_by().clone(),
                    comment: h.comment().clone(),
                    empty_layer: h.empty_layer().unwrap_or(false),
                })
                .collect()
        })
        .unwrap_or_default();

    // The id is filled in from the manifest by the caller
    ImageMetadata {
        id: String::new(),
        repo_tags: vec![],
        container: container.to_string(),
        created: config.created().clone().unwrap_or_default(),
        architecture: config.architecture().to_string(),
        os: config.os().to_string(),
        config: container_config,
        history,
    }
}
