use anyhow::{anyhow, Result};
use clap::{Parser, ValueEnum};
use env_logger::Env;
use log::debug;
use std::path::PathBuf;

use undockerizer::notifier::VerbosityLevel;
use undockerizer::{
    DockerSource, ExecFormParsing, NerdctlSource, Notifier, ProcessorOptions, ScriptProcessor,
    Source, TarSource,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum SourceKind {
    Docker,
    Nerdctl,
    Tar,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(help = "Image name (e.g., nginx:latest) or path to an image tarball")]
    image: String,

    #[arg(
        short,
        long,
        value_enum,
        default_value = "docker",
        help = "Where to get the image from"
    )]
    source: SourceKind,

    #[arg(
        short,
        long,
        default_value = "./undockerized",
        help = "Output directory for the script and its content"
    )]
    output: PathBuf,

    #[arg(long, help = "Script file name (derived from the image name by default)")]
    script_name: Option<String>,

    #[arg(
        long,
        default_value = "/bin/sh",
        help = "Shell the image history was recorded with"
    )]
    shell: String,

    #[arg(
        short,
        long,
        help = "Also pack the script and its content into a .tar.gz bundle"
    )]
    archive: bool,

    #[arg(
        long,
        help = "Parse exec-form CMD/ENTRYPOINT as JSON instead of splitting on quotes, spaces and commas"
    )]
    strict_exec_form: bool,

    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        help = "Verbose mode (-v for info, -vv for debug, -vvv for trace). Also switches to text-based progress"
    )]
    verbose: u8,
}

fn run<S: Source>(source: S, cli: &Cli, notifier: Notifier) -> Result<PathBuf> {
    let options = ProcessorOptions {
        shell_path: cli.shell.clone(),
        archive: cli.archive,
        exec_form: if cli.strict_exec_form {
            ExecFormParsing::Json
        } else {
            ExecFormParsing::Lossy
        },
        script_name: cli.script_name.clone(),
    };

    let processor = ScriptProcessor::new(source, notifier);
    processor.convert(&cli.image, &cli.output, &options)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Library modules log through the `log` facade
    env_logger::Builder::from_env(Env::default())
        .filter_level(VerbosityLevel::from(cli.verbose).to_log_level())
        .init();

    let notifier = Notifier::new(cli.verbose);

    debug!("Output directory: {}", cli.output.display());
    debug!("Source: {:?}", cli.source);

    let result = match cli.source {
        SourceKind::Docker => {
            let source = DockerSource::new()
                .map_err(|e| anyhow!("Failed to initialize Docker source: {}", e))?;
            run(source, &cli, notifier)
        }
        SourceKind::Nerdctl => {
            let source = NerdctlSource::new()
                .map_err(|e| anyhow!("Failed to initialize nerdctl source: {}", e))?;
            run(source, &cli, notifier)
        }
        SourceKind::Tar => {
            let source = TarSource::new()
                .map_err(|e| anyhow!("Failed to initialize tar source: {}", e))?;
            run(source, &cli, notifier)
        }
    };

    let script_path = result?;
    println!("{}", script_path.display());
    Ok(())
}
