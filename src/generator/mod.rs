//! History → shell script translation.
//!
//! [`ScriptGenerator::generate`] makes one ordered pass over an image's build history:
//! 1. [`secrets`] scans the whole history once for buildkit secret mounts.
//! 2. [`prefix`] learns the `<shell> -c #(nop) ` convention from the first metadata-only
//!    entry that carries it; everything before that entry is base-image noise and skipped.
//! 3. Each later entry is sorted by [`classifier`] into an instruction sentence, a verbatim
//!    shell command, or a `|N` line, then handed to [`directive`], [`add_copy`] or
//!    [`arg_line`].
//!
//! All output goes through a [`ScriptSink`]; the returned [`GenerationSession`] carries what
//! the caller still has to act on (default process, content to stage or archive).

pub mod add_copy;
pub mod arg_line;
pub mod classifier;
pub mod directive;
pub mod prefix;
pub mod secrets;
pub mod session;

use anyhow::Result;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::metadata::HistoryEntry;
use crate::notifier::Notifier;
use crate::script_writer::ScriptSink;

use add_copy::{content_folder_name, write_add, AddCopySpec};
use arg_line::decode_arg_line;
use classifier::{classify, EntryClass};
pub use directive::{Directive, ExecFormParsing};
use prefix::match_no_op_prefix;
pub use session::GenerationSession;

/// Looks up the layer archive produced by a history entry.
pub trait AttachmentResolver {
    /// Path of the layer archive, relative to the image's content root, for the ADD/COPY
    /// step at position `index` of the history. `line` is that entry's raw `created_by`.
    ///
    /// Resolution is positional: identical lines at different positions name different layers.
    fn attachment_path(&self, index: usize, line: &str) -> Option<String>;
}

impl AttachmentResolver for HashMap<usize, String> {
    fn attachment_path(&self, index: usize, _line: &str) -> Option<String> {
        self.get(&index).cloned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorOptions {
    /// Names the script's temp-extraction and content folders.
    pub container: String,
    /// Shell binary that precedes ` -c ` in `|N` lines.
    pub shell_path: String,
    /// Register every referenced layer archive for bundling.
    pub archive: bool,
    pub exec_form: ExecFormParsing,
}

impl GeneratorOptions {
    pub fn new(container: &str) -> Self {
        Self {
            container: container.to_string(),
            shell_path: "/bin/sh".to_string(),
            archive: false,
            exec_form: ExecFormParsing::default(),
        }
    }
}

/// Position and raw text of the history entry being translated.
#[derive(Debug, Clone, Copy)]
struct Step<'a> {
    index: usize,
    line: &'a str,
}

pub struct ScriptGenerator<'n> {
    options: GeneratorOptions,
    notifier: &'n Notifier,
}

impl<'n> ScriptGenerator<'n> {
    pub fn new(options: GeneratorOptions, notifier: &'n Notifier) -> Self {
        Self { options, notifier }
    }

    pub fn options(&self) -> &GeneratorOptions {
        &self.options
    }

    /// Translate `history` into calls on `sink`.
    ///
    /// Recoverable problems are reported and the offending entry contributes nothing.
    /// A `|N` line that cannot be decoded, or a sink failure, aborts the run.
    pub fn generate<R, S>(
        &self,
        history: &[HistoryEntry],
        resolver: &R,
        sink: &mut S,
    ) -> Result<GenerationSession>
    where
        R: AttachmentResolver + ?Sized,
        S: ScriptSink + ?Sized,
    {
        let mut session = GenerationSession::new();

        let report = secrets::scan_build_secrets(history);
        if report.build_kit_detected {
            self.notifier.info("Buildkit mode detected");
            for path in &report.secret_paths {
                self.notifier
                    .info(&format!("Docker build secret detected: {}", path));
            }
        } else {
            self.notifier.debug("Buildkit mode not found");
        }
        secrets::write_secret_checks(sink, &report)?;
        session.build_kit_detected = report.build_kit_detected;
        session.detected_secret_paths = report.secret_paths;

        for (index, entry) in history.iter().enumerate() {
            self.notifier
                .trace(&format!("Processing line: {:?}", entry.created_by));

            let Some(line) = entry.body() else {
                if session.first_marker_found() {
                    self.notifier.warn("Layer without creation data");
                }
                continue;
            };

            let Some(prefixes) = session.prefixes().cloned() else {
                self.learn_prefixes(&mut session, entry, line);
                continue;
            };

            match classify(line, entry.empty_layer, &prefixes) {
                EntryClass::Sentence(sentence) => {
                    let step = Step { index, line };
                    self.process_sentence(&mut session, sentence, step, resolver, sink)?
                }
                EntryClass::Command(command) => {
                    sink.write_command(command, None)?;
                    self.notifier
                        .debug(&format!("--> Command line added: {}", line));
                }
                EntryClass::ArgLine(arg_line) => self.process_arg_line(arg_line, sink)?,
            }
        }

        if !session.first_marker_found() && !history.is_empty() {
            self.notifier.warn(
                "No '#(nop)' marker found in the image history; no instruction was translated",
            );
        }

        Ok(session)
    }

    fn learn_prefixes(&self, session: &mut GenerationSession, entry: &HistoryEntry, line: &str) {
        if !entry.empty_layer {
            self.notifier.debug(&format!(
                "--> Skipped. First command not found. Line: {}",
                line
            ));
            return;
        }

        match match_no_op_prefix(line) {
            Some(prefixes) => {
                self.notifier.debug(&format!(
                    "--> First command found. noOpsPrefix: {:?}, instructionPrefix: {:?}",
                    prefixes.no_ops_prefix, prefixes.instruction_prefix
                ));
                session.anchor(prefixes);
            }
            None => self.notifier.debug(&format!(
                "--> Skipped. Metadata entry without marker: {}",
                line
            )),
        }
    }

    fn process_sentence<R, S>(
        &self,
        session: &mut GenerationSession,
        sentence: &str,
        step: Step<'_>,
        resolver: &R,
        sink: &mut S,
    ) -> Result<()>
    where
        R: AttachmentResolver + ?Sized,
        S: ScriptSink + ?Sized,
    {
        match Directive::parse(sentence, step.line, self.options.exec_form) {
            Directive::Label(label) => {
                sink.write_comment(label)?;
                self.notifier.debug(&format!("--> Label added: {}", label));
            }
            Directive::Maintainer(maintainer) => {
                sink.write_comment(maintainer)?;
                self.notifier
                    .debug(&format!("--> Maintainer added: {}", maintainer));
            }
            Directive::Env { name, value } => {
                sink.write_env_var(name, value)?;
                self.notifier.debug(&format!(
                    "--> Environment variable added. key: {}, value: {}",
                    name, value
                ));
            }
            Directive::Arg { name, default } => {
                match default {
                    Some(value) => sink.write_var(name, value)?,
                    None => sink.write_comment(&format!("ARG var without default value: {}", name))?,
                }
                self.notifier.debug(&format!(
                    "--> Local variable added. key: {}, value: {:?}",
                    name, default
                ));
            }
            Directive::User(user) => {
                sink.write_change_user(user)?;
                self.notifier.debug(&format!("--> Set user added: {}", user));
            }
            Directive::Workdir(dir) => {
                // `&`, not `&&`: kept as the history translation has always emitted it
                sink.write_command(&format!("mkdir -p {} & cd {}", dir, dir), None)?;
                self.notifier.debug(&format!("--> Set workdir added: {}", dir));
            }
            Directive::Expose(ports) => {
                sink.write_comment(&format!("Expose Ports: {}", ports))?;
                self.notifier
                    .debug(&format!("--> Comment: Expose ports {}", ports));
            }
            Directive::Cmd(command) => {
                self.notifier.debug(&format!("--> CMD line saved: {}", command));
                session.last_command_sentence = Some(command);
            }
            Directive::Entrypoint(entrypoint) => {
                self.notifier
                    .debug(&format!("--> ENTRYPOINT line saved: {}", entrypoint));
                session.last_entry_point_sentence = Some(entrypoint);
            }
            Directive::Add(value) | Directive::Copy(value) => {
                self.process_add(session, value, step, resolver, sink)?
            }
            Directive::Run(rest) => self.process_run(session, rest, sink)?,
            Directive::Invalid { keyword, text } => {
                self.notifier
                    .warn(&format!("--> Error parsing {}: {}", keyword, text));
            }
            Directive::Unsupported(sentence) => {
                sink.write_comment(sentence)?;
                self.notifier.warn(&format!(
                    "--> Operation not supported (comment added): {}",
                    sentence
                ));
            }
        }
        Ok(())
    }

    fn process_add<R, S>(
        &self,
        session: &mut GenerationSession,
        value: &str,
        step: Step<'_>,
        resolver: &R,
        sink: &mut S,
    ) -> Result<()>
    where
        R: AttachmentResolver + ?Sized,
        S: ScriptSink + ?Sized,
    {
        let spec = match AddCopySpec::parse(value) {
            Ok(spec) => spec,
            Err(e) => {
                self.notifier.warn(&e.to_string());
                return Ok(());
            }
        };

        let Some(attachment) = resolver.attachment_path(step.index, step.line) else {
            self.notifier
                .warn(&format!("No layer archive found for instruction: {}", step.line));
            return Ok(());
        };

        let container = &self.options.container;
        write_add(sink, container, &attachment, spec.owner().as_deref())?;

        if self.options.archive {
            session.resources_to_archive.insert(PathBuf::from(format!(
                "{}/{}",
                content_folder_name(container),
                attachment
            )));
        }
        session.staged_content.insert(attachment);

        self.notifier.debug(&format!(
            "--> Files added: {} -> {}",
            spec.filename, spec.target
        ));
        Ok(())
    }

    /// `RUN <rest>` as recorded by buildkit: either a `|N` line or a plain shell invocation.
    fn process_run<S: ScriptSink + ?Sized>(
        &self,
        session: &GenerationSession,
        rest: &str,
        sink: &mut S,
    ) -> Result<()> {
        if rest.starts_with('|') {
            return self.process_arg_line(rest, sink);
        }

        let command = session
            .instruction_prefix()
            .and_then(|prefix| rest.strip_prefix(prefix))
            .map(str::trim_start)
            .unwrap_or(rest);
        sink.write_command(command, None)?;
        self.notifier
            .debug(&format!("--> Command line added: {}", command));
        Ok(())
    }

    fn process_arg_line<S: ScriptSink + ?Sized>(&self, line: &str, sink: &mut S) -> Result<()> {
        match decode_arg_line(line, &self.options.shell_path)? {
            Some(decoded) => {
                sink.write_command(decoded.body, Some(decoded.env_prefix))?;
                self.notifier
                    .debug(&format!("--> Command line added: {}", decoded.body));
            }
            None => self
                .notifier
                .warn(&format!("Error processing command line (skipped): {}", line)),
        }
        Ok(())
    }
}
