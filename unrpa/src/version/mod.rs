use crate::{
    error::UnrpaError, loader::Decompiler, util::parse_hex, view::ArchiveView,
    Result, CHUNK_SIZE,
};
use dyn_clone::DynClone;
use std::{
    fmt::Debug,
    io::{BufRead, Write},
    path::Path,
};

pub mod alt;
pub mod official;
pub mod unofficial;
pub mod zix;

/// Where the index lives and how to undo its obfuscation, as found in the
/// archive header. Also carries whatever a version's postprocess needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub offset: u64,
    pub key: Option<u64>,
    pub block: Option<BlockCipher>,
}

impl Location {
    pub fn new(offset: u64, key: Option<u64>) -> Self {
        Self {
            offset,
            key,
            block: None,
        }
    }
}

/// Leading block of every file that has to go through
/// [`crate::cipher::transform_block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockCipher {
    pub key: u64,
    pub size: usize,
}

/// Things a version may need from outside the archive itself.
#[derive(Debug, Clone, Copy)]
pub struct LookupContext<'a> {
    pub archive_path: &'a Path,
    pub decompiler: &'a dyn Decompiler,
}

/// How a version recognizes its archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// File extension without the dot, compared case-insensitively
    Extension(&'static str),
    /// Literal the first line of the archive starts with
    Header(&'static [u8]),
}

impl Detection {
    pub fn matches(&self, extension: &str, first_line: &[u8]) -> bool {
        match self {
            Self::Extension(ext) => extension.eq_ignore_ascii_case(ext),
            Self::Header(header) => first_line.starts_with(header),
        }
    }
}

pub trait Version: Debug + Send + Sync + DynClone {
    fn get_name(&self) -> &str;

    fn detect(&self, extension: &str, first_line: &[u8]) -> bool;

    /// Read the header from the current position of `archive` and work out
    /// where the index is. The archive is left at an arbitrary position.
    fn find_offset_and_key(
        &self,
        archive: &mut dyn BufRead,
        context: &LookupContext<'_>,
    ) -> Result<Location>;

    /// Write the final contents of one file to `sink`.
    fn postprocess(
        &self,
        source: &mut ArchiveView<'_>,
        sink: &mut dyn Write,
        _location: &Location,
    ) -> Result<()> {
        passthrough(source, sink)
    }
}

dyn_clone::clone_trait_object!(Version);

/// Copy the rest of `source` to `sink` unchanged.
pub fn passthrough(source: &mut ArchiveView<'_>, sink: &mut dyn Write) -> Result<()> {
    let mut buf = vec![0; CHUNK_SIZE];
    loop {
        let read = source.read_chunk(&mut buf)?;
        if read == 0 {
            return Ok(());
        }
        sink.write_all(&buf[..read])?;
    }
}

/// Every known version, in detection order.
pub fn get_all_versions() -> Vec<Box<dyn Version>> {
    official::OfficialRpa::get_versions()
        .into_iter()
        .chain(alt::Alt::get_versions())
        .chain(zix::Zix::get_versions())
        .chain(unofficial::UnofficialRpa::get_versions())
        .collect()
}

/// Look up a version by its case-insensitive name.
pub fn find_version(
    versions: &[Box<dyn Version>],
    name: &str,
) -> Result<Box<dyn Version>> {
    versions
        .iter()
        .find(|v| v.get_name().eq_ignore_ascii_case(name))
        .map(|v| dyn_clone::clone_box(&**v))
        .ok_or_else(|| UnrpaError::UnknownVersion(name.to_string()))
}

/// Run every detector; exactly one has to match.
pub fn detect_version(
    versions: &[Box<dyn Version>],
    extension: &str,
    first_line: &[u8],
) -> Result<Box<dyn Version>> {
    let mut detected = versions
        .iter()
        .filter(|v| v.detect(extension, first_line))
        .collect::<Vec<_>>();
    match detected.len() {
        0 => Err(UnrpaError::UnknownArchive(first_line.to_vec())),
        1 => Ok(dyn_clone::clone_box(&**detected.remove(0))),
        _ => Err(UnrpaError::AmbiguousArchive(
            detected.iter().map(|v| v.get_name().to_string()).collect(),
        )),
    }
}

/// First line of the archive including its `\n`.
pub fn read_first_line(archive: &mut dyn BufRead) -> Result<Vec<u8>> {
    let mut line = Vec::new();
    archive.read_until(b'\n', &mut line)?;
    Ok(line)
}

pub(crate) fn tokens(line: &[u8]) -> Vec<&[u8]> {
    line.split(|b| b.is_ascii_whitespace())
        .filter(|t| !t.is_empty())
        .collect()
}

pub(crate) fn hex_token(tokens: &[&[u8]], index: usize) -> Result<u64> {
    let token = tokens.get(index).ok_or_else(|| {
        UnrpaError::MalformedHeader(format!(
            "expected at least {} fields in header",
            index + 1
        ))
    })?;
    parse_hex(token).ok_or_else(|| {
        UnrpaError::MalformedHeader(format!(
            "{:?} is not hexadecimal",
            String::from_utf8_lossy(token)
        ))
    })
}

/// `HEADER offset key` as written by RPA-3.0 and its descendants.
pub(crate) fn parse_offset_and_key(line: &[u8]) -> Result<(u64, u64)> {
    let tokens = tokens(line);
    Ok((hex_token(&tokens, 1)?, hex_token(&tokens, 2)?))
}
