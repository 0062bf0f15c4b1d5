//! End-to-end "container image → shell script" pipeline orchestrator.
//!
//! [`ScriptProcessor`] ties the pieces together:
//! - fetches an image tarball from a concrete [`crate::sources::Source`],
//! - decodes it into an [`ExtractedImage`] (metadata, history, layer archives),
//! - runs the [`ScriptGenerator`] over the history into a [`ShellScriptWriter`],
//! - stages the layer archives the script replays next to it,
//! - and optionally packs script and content into a single `.tar.gz` bundle.

use crate::bundle;
use crate::extracted_image::ExtractedImage;
use crate::generator::add_copy::content_folder_name;
use crate::generator::{ExecFormParsing, GenerationSession, GeneratorOptions, ScriptGenerator};
use crate::metadata::ImageMetadata;
use crate::notifier::Notifier;
use crate::script_writer::ShellScriptWriter;
use crate::sources::Source;
use anyhow::{Context, Result};
use indicatif::HumanDuration;
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::NamedTempFile;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorOptions {
    /// Shell that `|N` history lines were recorded with.
    pub shell_path: String,
    /// Also write `<script stem>.tar.gz` with the script and its content.
    pub archive: bool,
    pub exec_form: ExecFormParsing,
    /// Overrides the file name the source would derive from the image name.
    pub script_name: Option<String>,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            shell_path: "/bin/sh".to_string(),
            archive: false,
            exec_form: ExecFormParsing::default(),
            script_name: None,
        }
    }
}

/// Orchestrates the image to script conversion for a concrete [`Source`].
pub struct ScriptProcessor<S: Source> {
    source: S,
    notifier: Notifier,
}

impl<S: Source> ScriptProcessor<S> {
    pub fn new(source: S, notifier: Notifier) -> Self {
        Self { source, notifier }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Convert `image_name` into a runnable script inside `output_dir`.
    ///
    /// Layout of `output_dir` afterwards:
    /// - `<script>.sh`: the reconstructed build, executable on unix
    /// - `<container>_content/<attachment>`: every layer archive an ADD/COPY step replays
    /// - `<script stem>.tar.gz`: both of the above, when `options.archive` is set
    ///
    /// Returns the path of the script.
    ///
    /// # Errors
    /// - Image fetch or tarball decoding failures from the [`Source`] or [`ExtractedImage`].
    /// - A `|N` history line that cannot be decoded.
    /// - I/O errors while writing the script, staging content or bundling.
    pub fn convert(
        &self,
        image_name: &str,
        output_dir: &Path,
        options: &ProcessorOptions,
    ) -> Result<PathBuf> {
        let started = Instant::now();
        self.notifier.info(&format!(
            "Starting conversion of image with {} source: {}",
            self.source.name(),
            image_name
        ));
        self.notifier
            .debug(&format!("Output directory: {}", output_dir.display()));

        // Keeps an exported tarball alive until the image is decoded
        let (tarball_path, _tarball_temp_dir) =
            self.source.get_image_tarball(image_name, &self.notifier)?;

        self.notifier.info("Extracting image tarball...");
        let image = ExtractedImage::from_tarball(&tarball_path, &self.notifier)?;
        let metadata = image.metadata();
        self.notifier.debug(&format!("Image ID: {}", metadata.id));
        self.notifier
            .debug(&format!("Container: {}", metadata.container));

        fs::create_dir_all(output_dir).with_context(|| {
            format!("Failed to create output directory: {}", output_dir.display())
        })?;

        let script_name = options
            .script_name
            .clone()
            .unwrap_or_else(|| self.source.script_name(image_name));
        let script_path = output_dir.join(&script_name);

        self.notifier.info("Translating image history...");
        let session = self.write_script(image_name, &image, output_dir, &script_path, options)?;

        self.stage_content(&image, &session, output_dir)?;
        make_executable(&script_path)?;

        if options.archive {
            let bundle_path = output_dir.join(bundle_name(&script_name));
            self.notifier.info(&format!(
                "Creating bundle {}...",
                bundle_path.display()
            ));
            bundle::create_bundle(
                output_dir,
                &script_name,
                &session.resources_to_archive,
                &bundle_path,
            )?;
        }

        self.notifier.finish(&format!(
            "Script written to {} in {}",
            script_path.display(),
            HumanDuration(started.elapsed())
        ));

        Ok(script_path)
    }

    /// The script only appears at `script_path` once generation succeeded; a fatal history
    /// line leaves nothing behind.
    fn write_script(
        &self,
        image_name: &str,
        image: &ExtractedImage,
        output_dir: &Path,
        script_path: &Path,
        options: &ProcessorOptions,
    ) -> Result<GenerationSession> {
        let metadata = image.metadata();
        let mut script = NamedTempFile::new_in(output_dir).with_context(|| {
            format!("Failed to create script in {}", output_dir.display())
        })?;
        let mut writer = ShellScriptWriter::new(BufWriter::new(script.as_file_mut()));
        writer.write_header(image_name, &metadata.id)?;

        let generator = ScriptGenerator::new(
            GeneratorOptions {
                container: metadata.container.clone(),
                shell_path: options.shell_path.clone(),
                archive: options.archive,
                exec_form: options.exec_form,
            },
            &self.notifier,
        );
        let session = generator.generate(&metadata.history, image, &mut writer)?;

        let (entrypoint, command) = default_process(&session, metadata);
        writer.write_default_process(entrypoint.as_deref(), command.as_deref())?;
        writer.flush()?;
        drop(writer);

        script
            .persist(script_path)
            .with_context(|| format!("Failed to write script: {}", script_path.display()))?;

        Ok(session)
    }

    /// Copy every layer archive the script replays to `<container>_content/`.
    fn stage_content(
        &self,
        image: &ExtractedImage,
        session: &GenerationSession,
        output_dir: &Path,
    ) -> Result<()> {
        let content_dir = output_dir.join(content_folder_name(&image.metadata().container));

        for (i, attachment) in session.staged_content.iter().enumerate() {
            self.notifier.info(&format!(
                "Staging content {}/{}: {}",
                i + 1,
                session.staged_content.len(),
                attachment
            ));

            let source = image.layer_archive(attachment);
            let dest = content_dir.join(attachment);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory: {}", parent.display())
                })?;
            }
            fs::copy(&source, &dest).with_context(|| {
                format!(
                    "Failed to copy layer archive {} to {}",
                    source.display(),
                    dest.display()
                )
            })?;
        }

        Ok(())
    }
}

/// ENTRYPOINT/CMD recorded in the history, falling back to the image config.
fn default_process(
    session: &GenerationSession,
    metadata: &ImageMetadata,
) -> (Option<String>, Option<String>) {
    let from_config = |args: &Option<Vec<String>>| {
        args.as_ref()
            .filter(|args| !args.is_empty())
            .map(|args| args.join(" "))
    };

    let entrypoint = session
        .last_entry_point_sentence
        .clone()
        .or_else(|| from_config(&metadata.config.entrypoint));
    let command = session
        .last_command_sentence
        .clone()
        .or_else(|| from_config(&metadata.config.cmd));

    (entrypoint, command)
}

/// `app.sh` → `app.tar.gz`
fn bundle_name(script_name: &str) -> String {
    let stem = Path::new(script_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(script_name);
    format!("{}.tar.gz", stem)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    fs::set_permissions(path, permissions)
        .with_context(|| format!("Failed to make {} executable", path.display()))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
