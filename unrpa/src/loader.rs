//! Access to the `loader.pyo` file ZiX games ship next to their archives.
//!
//! The loader is compiled python; turning it back into source text is left
//! to a [`Decompiler`], the interesting literals are then pulled out of the
//! source with regular expressions.

use crate::{cipher, error::UnrpaError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    fmt::Debug,
    io,
    path::{Path, PathBuf},
    process::Command,
};

pub const LOADER_NAME: &str = "loader.pyo";

static VERIFICATION_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"verificationcode = _string\.sha1\('(.*?)'\)")
        .expect("valid regex")
});

static BLOCK_SIZE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"_string\.run\(rv\.read\(([0-9]*?)\), verificationcode\)")
        .expect("valid regex")
});

/// Turns a compiled python file into source text.
pub trait Decompiler: Debug + Send + Sync {
    fn decompile(&self, path: &Path) -> Result<String>;
}

/// Runs an external decompiler with the file path as its only argument and
/// takes its standard output as the source.
#[derive(Debug, Clone)]
pub struct CommandDecompiler {
    program: PathBuf,
}

impl CommandDecompiler {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for CommandDecompiler {
    fn default() -> Self {
        Self::new("uncompyle6")
    }
}

impl Decompiler for CommandDecompiler {
    fn decompile(&self, path: &Path) -> Result<String> {
        log::debug!("Decompiling {:?} with {:?}", path, self.program);
        let output = Command::new(&self.program).arg(path).output().map_err(
            |err| match err.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                    UnrpaError::MissingRequirement {
                        requirement: self.program.display().to_string(),
                        reason: err.to_string(),
                    }
                }
                _ => UnrpaError::Io(err),
            },
        )?;
        if !output.status.success() {
            return Err(UnrpaError::IncorrectLoader(format!(
                "{} failed: {}",
                self.program.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Where the loader is expected for a given archive.
pub fn loader_path(archive_path: &Path) -> PathBuf {
    archive_path
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(LOADER_NAME)
}

/// Decompile the loader sitting next to `archive_path`.
pub fn get_loader(archive_path: &Path, decompiler: &dyn Decompiler) -> Result<String> {
    let path = loader_path(archive_path);
    if !path.is_file() {
        return Err(UnrpaError::LoaderRequired(path));
    }
    decompiler.decompile(&path)
}

/// Derive the archive key from the verification code in the loader source.
pub fn find_key(loader: &str) -> Result<u64> {
    let code = VERIFICATION_CODE
        .captures(loader)
        .and_then(|c| c.get(1))
        .ok_or_else(|| {
            UnrpaError::IncorrectLoader("no verification code found".to_string())
        })?;
    cipher::derive_key(code.as_str())
}

/// Size of the leading block of each file that is run through the cipher.
pub fn find_block_size(loader: &str) -> Result<usize> {
    let amount = BLOCK_SIZE
        .captures(loader)
        .and_then(|c| c.get(1))
        .ok_or_else(|| {
            UnrpaError::IncorrectLoader("no block read found".to_string())
        })?;
    amount.as_str().parse::<usize>().map_err(|_| {
        UnrpaError::IncorrectLoader(format!(
            "block size {:?} is not a number",
            amount.as_str()
        ))
    })
}
