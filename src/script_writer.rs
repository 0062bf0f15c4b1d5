//! Script sinks: where the translation engine sends every line it produces.
//!
//! The engine only ever talks to [`ScriptSink`]; [`ShellScriptWriter`] is the POSIX-shell
//! rendering used by the CLI. Calls are written in the order they are made.

use anyhow::{Context, Result};
use chrono::Utc;
use std::io::Write;

/// Receiver of the emitted script, one call per logical script line.
pub trait ScriptSink {
    /// A shell command, optionally preceded by environment assignments that only apply to it.
    fn write_command(&mut self, body: &str, env_prefix: Option<&str>) -> Result<()>;

    fn write_comment(&mut self, text: &str) -> Result<()>;

    /// A persistent (exported) environment variable.
    fn write_env_var(&mut self, name: &str, value: &str) -> Result<()>;

    /// A variable local to the script session.
    fn write_var(&mut self, name: &str, value: &str) -> Result<()>;

    fn write_change_user(&mut self, user: &str) -> Result<()>;

    /// A warning printed when the script runs.
    fn write_message(&mut self, text: &str) -> Result<()>;

    /// Aborts the script with `message` if `path` does not exist.
    fn write_file_exists(&mut self, path: &str, message: &str) -> Result<()>;
}

/// Variable the generated script uses as the root for layer content and temp folders.
pub const WORKDIR_VAR: &str = "UNDOCKERIZER_WORKDIR";

/// Renders sink calls as a POSIX shell script.
pub struct ShellScriptWriter<W: Write> {
    out: W,
}

impl<W: Write> ShellScriptWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Shebang, provenance banner and the workdir default.
    pub fn write_header(&mut self, image_name: &str, image_id: &str) -> Result<()> {
        self.line("#!/bin/sh")?;
        self.line(&format!(
            "# Generated by undockerizer from image {} ({}) at {}",
            image_name,
            image_id,
            Utc::now().to_rfc3339()
        ))?;
        self.line("set -e")?;
        self.line(&format!(
            "{WORKDIR_VAR}=\"${{{WORKDIR_VAR}:-$(cd \"$(dirname \"$0\")\" && pwd)}}\""
        ))?;
        self.line(&format!("export {WORKDIR_VAR}"))?;
        self.line("")
    }

    /// Records the image's default process. Nothing is executed.
    pub fn write_default_process(
        &mut self,
        entrypoint: Option<&str>,
        command: Option<&str>,
    ) -> Result<()> {
        if entrypoint.is_none() && command.is_none() {
            return Ok(());
        }
        self.line("")?;
        if let Some(entrypoint) = entrypoint {
            self.write_comment(&format!("ENTRYPOINT: {}", entrypoint))?;
        }
        if let Some(command) = command {
            self.write_comment(&format!("CMD: {}", command))?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush().context("Failed to flush script")
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) -> Result<()> {
        writeln!(self.out, "{}", text).context("Failed to write script line")
    }
}

/// Escape a value for use inside double quotes. `$` is left alone so references expand.
fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

impl<W: Write> ScriptSink for ShellScriptWriter<W> {
    fn write_command(&mut self, body: &str, env_prefix: Option<&str>) -> Result<()> {
        match env_prefix.map(str::trim).filter(|prefix| !prefix.is_empty()) {
            Some(prefix) => self.line(&format!("( export {}; {} )", prefix, body)),
            None => self.line(body),
        }
    }

    fn write_comment(&mut self, text: &str) -> Result<()> {
        for comment_line in text.lines() {
            self.line(&format!("# {}", comment_line))?;
        }
        if text.is_empty() {
            self.line("#")?;
        }
        Ok(())
    }

    fn write_env_var(&mut self, name: &str, value: &str) -> Result<()> {
        self.line(&format!("export {}={}", name, quote(value)))
    }

    fn write_var(&mut self, name: &str, value: &str) -> Result<()> {
        self.line(&format!("{}={}", name, quote(value)))
    }

    fn write_change_user(&mut self, user: &str) -> Result<()> {
        self.line(&format!("# USER {}", user))?;
        self.line(&format!("UNDOCKERIZER_USER={}", quote(user)))
    }

    fn write_message(&mut self, text: &str) -> Result<()> {
        self.line(&format!("echo {} >&2", quote(text)))
    }

    fn write_file_exists(&mut self, path: &str, message: &str) -> Result<()> {
        self.line(&format!(
            "if [ ! -e {} ]; then echo {} >&2; exit 1; fi",
            quote(path),
            quote(message)
        ))
    }
}
