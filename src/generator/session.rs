use std::collections::BTreeSet;
use std::path::PathBuf;

use super::prefix::LearnedPrefixes;

/// Mutable state of one translation run.
///
/// A session is created per image and never shared: prefixes are anchored once, the
/// secret set only grows, and the CMD/ENTRYPOINT holders keep the last value seen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationSession {
    prefixes: Option<LearnedPrefixes>,
    pub build_kit_detected: bool,
    pub detected_secret_paths: BTreeSet<String>,
    pub last_command_sentence: Option<String>,
    pub last_entry_point_sentence: Option<String>,
    /// Layer archives, relative to the image root, that ADD/COPY steps replay.
    pub staged_content: BTreeSet<String>,
    /// Content paths registered for the archive bundle; empty unless archiving is on.
    pub resources_to_archive: BTreeSet<PathBuf>,
}

impl GenerationSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn first_marker_found(&self) -> bool {
        self.prefixes.is_some()
    }

    pub fn prefixes(&self) -> Option<&LearnedPrefixes> {
        self.prefixes.as_ref()
    }

    pub fn no_ops_prefix(&self) -> Option<&str> {
        self.prefixes.as_ref().map(|p| p.no_ops_prefix.as_str())
    }

    pub fn instruction_prefix(&self) -> Option<&str> {
        self.prefixes.as_ref().map(|p| p.instruction_prefix.as_str())
    }

    /// Anchor the prefixes. Returns `false` (and changes nothing) if already anchored.
    pub fn anchor(&mut self, prefixes: LearnedPrefixes) -> bool {
        if self.prefixes.is_some() {
            return false;
        }
        self.prefixes = Some(prefixes);
        true
    }
}
