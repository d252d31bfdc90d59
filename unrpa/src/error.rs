use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, UnrpaError>;

#[derive(Debug, Error)]
pub enum UnrpaError {
    #[error("Auto-detection of the archive version is ambiguous, it could be any one of: {}", .0.join(", "))]
    AmbiguousArchive(Vec<String>),
    #[error("Auto-detection of the archive version failed. Header: \"{}\"", String::from_utf8_lossy(.0).trim())]
    UnknownArchive(Vec<u8>),
    #[error("Unknown archive version: {0}")]
    UnknownVersion(String),
    #[error("Malformed archive header: {0}")]
    MalformedHeader(String),
    #[error("Extracting from this archive requires \"{requirement}\": {reason}")]
    MissingRequirement { requirement: String, reason: String },
    #[error("The \"loader.pyo\" file is required alongside the archive, looked for it at {0:?}")]
    LoaderRequired(PathBuf),
    #[error("The provided \"loader.pyo\" does not appear to be the correct one: {0}")]
    IncorrectLoader(String),
    #[error("{0} must locate the index before postprocessing")]
    MissingDetails(String),
    #[error("Could not decode archive index: {0}")]
    IndexDecode(String),
    #[error("End of archive reached before {path} should end ({remaining} bytes missing)")]
    TruncatedEntry { path: String, remaining: u64 },
    #[error("File not found in archive: {0}")]
    FileNotFound(String),
    #[error("Refusing to extract outside of the output directory: {0}")]
    UnsafePath(String),
    #[error("Error while extracting {path}: {source}")]
    ExtractingFile {
        path: String,
        #[source]
        source: Box<UnrpaError>,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl UnrpaError {
    /// Hint shown by the command line front end below the error message.
    pub fn help(&self) -> Option<&'static str> {
        match self {
            Self::AmbiguousArchive(_) => Some(
                "You can try using --force to force these versions and see what works.",
            ),
            Self::UnknownArchive(_) => Some(
                "You can try using --force to force a specific version rather than relying on auto-detection.",
            ),
            Self::LoaderRequired(_) => Some(
                "Copy the \"loader.pyo\" file from the game's \"renpy\" directory next to the archive.",
            ),
            Self::IncorrectLoader(_) => Some(
                "Please check the loader comes from the game this archive came from.",
            ),
            Self::MissingRequirement { .. } => Some(
                "Install the decompiler or point --decompiler at it.",
            ),
            Self::ExtractingFile { .. } => Some(
                "To extract as much from the archive as possible, use --continue-on-error.",
            ),
            _ => None,
        }
    }
}
