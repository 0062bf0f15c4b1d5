//! ADD/COPY argument parsing and the commands that replay a copied layer.
//!
//! Accepted shapes of the text after the keyword:
//! - `file:<id> in <target>` / `dir:<id> in <target>` (legacy builder)
//! - `--chown=<user>[:<group>]<ref>:<id> in <target>`, where `<ref>` is the reference kind
//!   glued to the owner by the legacy builder
//! - `--chown=<user>[:<group>] <source> ...` followed by either of the other shapes
//! - `<source> <target> [# comment]` (buildkit)
//!
//! The generated commands never use the parsed source or target: the layer archive already
//! holds absolute paths, so it is unpacked, re-owned and copied onto `/` as a whole.

use anyhow::Result;
use thiserror::Error;

use crate::script_writer::{ScriptSink, WORKDIR_VAR};

/// Reference kinds the legacy builder prefixes a source with.
const REFERENCE_KINDS: [&str; 3] = ["file", "dir", "multi"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddCopyParseError {
    #[error("Error processing ADD instruction (parsing in clause): {0}")]
    MissingSeparator(String),

    #[error("Error processing ADD instruction (parsing user): {0}")]
    InvalidChown(String),

    #[error("Error processing ADD instruction (target not found): {0}")]
    MissingTarget(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddCopySpec<'a> {
    pub filename: &'a str,
    pub target: &'a str,
    pub user: Option<&'a str>,
    pub group: Option<&'a str>,
}

impl<'a> AddCopySpec<'a> {
    pub fn parse(value: &'a str) -> Result<Self, AddCopyParseError> {
        let first_space = value
            .find(' ')
            .ok_or_else(|| AddCopyParseError::MissingSeparator(value.to_string()))?;

        if !value.starts_with("--chown=") {
            let (filename, tail) = split_source(value)?;
            return Self::finish(value, filename, tail, None, None);
        }

        let invalid_chown = || AddCopyParseError::InvalidChown(value.to_string());
        let token = value.get("--chown=".len()..first_space).ok_or_else(invalid_chown)?;
        let tail = &value[first_space..];

        if tail.starts_with(" in ") {
            // Legacy form: the source reference is glued to the owner
            let (user, group, filename) = split_glued_owner(token).ok_or_else(invalid_chown)?;
            return Self::finish(value, filename, tail, Some(user), group);
        }

        let (user, group) = match token.split_once(':') {
            Some((user, group)) => (user, Some(group)),
            None => (token, None),
        };
        if user.is_empty() || group == Some("") {
            return Err(invalid_chown());
        }
        let (filename, tail) = split_source(tail.trim_start())?;
        Self::finish(value, filename, tail, Some(user), group)
    }

    fn finish(
        value: &str,
        filename: &'a str,
        tail: &'a str,
        user: Option<&'a str>,
        group: Option<&'a str>,
    ) -> Result<Self, AddCopyParseError> {
        let target = resolve_target(tail)
            .ok_or_else(|| AddCopyParseError::MissingTarget(value.to_string()))?;
        Ok(Self {
            filename,
            target,
            user,
            group,
        })
    }

    /// `user[:group]` as given to `chown`, if an owner was parsed.
    pub fn owner(&self) -> Option<String> {
        self.user.map(|user| match self.group {
            Some(group) => format!("{}:{}", user, group),
            None => user.to_string(),
        })
    }
}

/// Split `<source> <rest>` and strip a `file:`/`dir:` prefix from the source.
/// The returned tail starts at the separating space.
fn split_source(text: &str) -> Result<(&str, &str), AddCopyParseError> {
    let space = text
        .find(' ')
        .ok_or_else(|| AddCopyParseError::MissingSeparator(text.to_string()))?;
    let word = &text[..space];
    let filename = word
        .strip_prefix("file:")
        .or_else(|| word.strip_prefix("dir:"))
        .unwrap_or(word);
    Ok((filename, &text[space..]))
}

/// `user<ref>:id` or `user:group<ref>:id`.
fn split_glued_owner(token: &str) -> Option<(&str, Option<&str>, &str)> {
    let (first, rest) = token.split_once(':')?;
    match rest.split_once(':') {
        Some((group_field, filename)) => {
            Some((first, Some(strip_reference_kind(group_field)?), filename))
        }
        None => Some((strip_reference_kind(first)?, None, rest)),
    }
}

fn strip_reference_kind(field: &str) -> Option<&str> {
    REFERENCE_KINDS
        .iter()
        .find_map(|kind| field.strip_suffix(kind))
        .filter(|owner| !owner.is_empty())
}

/// Target after ` in `, or the text after the space up to a trailing `#` comment.
fn resolve_target(tail: &str) -> Option<&str> {
    let target = match tail.strip_prefix(" in ") {
        Some(target) => target,
        None => {
            let after = tail.get(1..)?;
            match after.find('#') {
                Some(comment) => &after[..comment],
                None => after,
            }
        }
    };
    Some(target.trim()).filter(|target| !target.is_empty())
}

/// Folder, relative to the script workdir, holding the image's layer archives.
pub fn content_folder_name(container: &str) -> String {
    format!("{}_content", container)
}

/// Emit the commands that replay one copied layer.
///
/// `attachment` is the layer archive's path relative to the content folder.
pub fn write_add<S: ScriptSink + ?Sized>(
    sink: &mut S,
    container: &str,
    attachment: &str,
    owner: Option<&str>,
) -> Result<()> {
    let tmp_dir = format!("${}/{}/{}", WORKDIR_VAR, container, attachment);
    let source = format!(
        "${}/{}/{}",
        WORKDIR_VAR,
        content_folder_name(container),
        attachment
    );

    sink.write_command(
        &format!("mkdir -p {} && tar -xvf {} -C {}", tmp_dir, source, tmp_dir),
        None,
    )?;
    if let Some(owner) = owner {
        sink.write_command(&format!("chown -R {} {}/", owner, tmp_dir), None)?;
    }
    sink.write_command(&format!("cp -r {}/* / && rm -rf {}", tmp_dir, tmp_dir), None)
}
