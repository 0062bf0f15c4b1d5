pub mod bundle;
pub mod extracted_image;
pub mod generator;
pub mod metadata;
pub mod notifier;
pub mod processor;
pub mod script_writer;
pub mod sources;
pub mod tar_extractor;

// Re-exports for easy access
pub use extracted_image::{ExtractedImage, Layer};
pub use generator::{
    AttachmentResolver, ExecFormParsing, GenerationSession, GeneratorOptions, ScriptGenerator,
};
pub use metadata::{HistoryEntry, ImageMetadata};
pub use notifier::Notifier;
pub use processor::{ProcessorOptions, ScriptProcessor};
pub use script_writer::{ScriptSink, ShellScriptWriter};
pub use sources::DockerSource;
pub use sources::NerdctlSource;
pub use sources::Source;
pub use sources::TarSource;
