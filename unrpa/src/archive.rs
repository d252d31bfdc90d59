use crate::{
    error::UnrpaError,
    index::Index,
    loader::{CommandDecompiler, Decompiler},
    version::{
        detect_version, get_all_versions, passthrough, read_first_line,
        Location, LookupContext, Version,
    },
    view::ArchiveView,
    Result,
};
use bytes::{BufMut, Bytes, BytesMut};
use itertools::Itertools;
use std::{
    collections::BTreeMap,
    ffi::OsStr,
    fs::File,
    io::{BufReader, BufWriter, Seek, SeekFrom, Write},
    path::{Component, Path, PathBuf, MAIN_SEPARATOR},
    sync::Arc,
};

/// Resolves the version of one archive and opens it for extraction.
#[derive(Debug, Clone)]
pub struct Extractor {
    path: PathBuf,
    versions: Vec<Box<dyn Version>>,
    version: Option<Box<dyn Version>>,
    offset_and_key: Option<(u64, u64)>,
    decompiler: Arc<dyn Decompiler>,
}

impl Extractor {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            versions: get_all_versions(),
            version: None,
            offset_and_key: None,
            decompiler: Arc::new(CommandDecompiler::default()),
        }
    }

    /// Replace the set of versions detection chooses from.
    pub fn with_versions(mut self, versions: Vec<Box<dyn Version>>) -> Self {
        self.versions = versions;
        self
    }

    /// Skip detection and treat the archive as `version`.
    pub fn with_version(mut self, version: Box<dyn Version>) -> Self {
        self.version = Some(version);
        self
    }

    /// Skip the header lookup and use this index offset and key.
    pub fn with_offset_and_key(mut self, offset: u64, key: u64) -> Self {
        self.offset_and_key = Some((offset, key));
        self
    }

    pub fn with_decompiler(mut self, decompiler: Arc<dyn Decompiler>) -> Self {
        self.decompiler = decompiler;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn extension(&self) -> String {
        self.path
            .extension()
            .and_then(OsStr::to_str)
            .unwrap_or("")
            .to_lowercase()
    }

    /// Pick the one registered version matching this archive.
    pub fn detect_version(&self) -> Result<Box<dyn Version>> {
        let mut archive = BufReader::new(File::open(&self.path)?);
        let first_line = read_first_line(&mut archive)?;
        detect_version(&self.versions, &self.extension(), &first_line)
    }

    /// Resolve the version, locate and decode the index.
    pub fn open(&self) -> Result<OpenArchive> {
        let mut archive = BufReader::new(File::open(&self.path)?);
        let first_line = read_first_line(&mut archive)?;

        let version = match &self.version {
            Some(version) => {
                log::warn!("Forcing version {}", version.get_name());
                Some(version.clone())
            }
            None => match detect_version(&self.versions, &self.extension(), &first_line) {
                Ok(version) => Some(version),
                // Only postprocessing needs a version when the caller
                // already knows where the index is
                Err(err) if self.offset_and_key.is_some() => {
                    log::warn!("{}, extracting without postprocessing", err);
                    None
                }
                Err(err) => return Err(err),
            },
        };
        if let Some(version) = &version {
            log::debug!("Version: {}", version.get_name());
        }

        let location = match (self.offset_and_key, &version) {
            (Some((offset, key)), _) => Location::new(offset, Some(key)),
            (None, Some(version)) => {
                archive.seek(SeekFrom::Start(0))?;
                let context = LookupContext {
                    archive_path: &self.path,
                    decompiler: &*self.decompiler,
                };
                version.find_offset_and_key(&mut archive, &context)?
            }
            (None, None) => return Err(UnrpaError::UnknownArchive(first_line)),
        };
        log::debug!("Location: {:X?}", location);

        archive.seek(SeekFrom::Start(location.offset))?;
        let index = Index::decode(&mut archive, location.key)?;
        log::debug!("Index holds {} files", index.len());

        Ok(OpenArchive {
            path: self.path.clone(),
            archive,
            version,
            location,
            index,
        })
    }
}

/// An archive with its index decoded, ready to hand out files one at a time.
#[derive(Debug)]
pub struct OpenArchive {
    path: PathBuf,
    archive: BufReader<File>,
    version: Option<Box<dyn Version>>,
    location: Location,
    index: Index,
}

impl OpenArchive {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> Option<&dyn Version> {
        self.version.as_deref()
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Sorted paths of every archived file.
    pub fn paths(&self) -> Vec<&str> {
        self.index.paths().map(String::as_str).collect()
    }

    pub fn directory(&self) -> Directory {
        Directory::new(self.index.paths().map(String::as_str))
    }

    /// Stream the final contents of `path` into `sink`.
    pub fn extract_file(&mut self, path: &str, sink: &mut dyn Write) -> Result<()> {
        let entry = self
            .index
            .get(path)
            .ok_or_else(|| UnrpaError::FileNotFound(path.to_string()))?;
        for part in entry {
            log::debug!(
                "Extracting {}: offset {:#x}, length {:#x}, prefix {} bytes",
                path,
                part.offset,
                part.length,
                part.prefix.len()
            );
            let mut view = ArchiveView::new(
                &mut self.archive,
                path,
                part.offset,
                part.length,
                &part.prefix,
            )?;
            match &self.version {
                Some(version) => version.postprocess(&mut view, sink, &self.location)?,
                None => passthrough(&mut view, sink)?,
            }
        }
        Ok(())
    }

    pub fn read_file(&mut self, path: &str) -> Result<Bytes> {
        let mut writer = BytesMut::new().writer();
        self.extract_file(path, &mut writer)?;
        Ok(writer.into_inner().freeze())
    }

    /// Write `path` below `output_dir`, creating directories as needed.
    pub fn extract_to(&mut self, path: &str, output_dir: &Path) -> Result<()> {
        if path.is_empty() {
            return Ok(());
        }
        let relative = Path::new(path);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(UnrpaError::UnsafePath(path.to_string()));
        }
        let output_file_name = output_dir.join(relative);
        if let Some(parent) = output_file_name.parent() {
            std::fs::create_dir_all(parent)?;
        }
        log::info!("Extracting resource: {:?}", output_file_name);
        let mut sink = BufWriter::new(File::create(&output_file_name)?);
        let written = self
            .extract_file(path, &mut sink)
            .and_then(|()| sink.flush().map_err(UnrpaError::from));
        drop(sink);
        if let Err(err) = written {
            // A file is written whole or not at all
            if let Err(remove_err) = std::fs::remove_file(&output_file_name) {
                log::warn!(
                    "Could not remove partial file {:?}: {}",
                    output_file_name,
                    remove_err
                );
            }
            return Err(err);
        }
        Ok(())
    }

    /// Extract every file in path order. `progress` is called before each
    /// file with its position and path. Returns how many files were written.
    ///
    /// Without `continue_on_error` the first failure stops extraction,
    /// otherwise it is logged and the file skipped.
    pub fn extract_all<F>(
        &mut self,
        output_dir: &Path,
        continue_on_error: bool,
        mut progress: F,
    ) -> Result<usize>
    where
        F: FnMut(usize, &str),
    {
        let paths = self.index.paths().cloned().collect::<Vec<String>>();
        let mut extracted = 0;
        for (number, path) in paths.iter().enumerate() {
            progress(number, path.as_str());
            match self.extract_to(path, output_dir) {
                Ok(()) => extracted += 1,
                Err(err) if continue_on_error => {
                    log::error!("Error extracting {}, continuing: {}", path, err)
                }
                Err(err) => {
                    return Err(UnrpaError::ExtractingFile {
                        path: path.clone(),
                        source: Box::new(err),
                    })
                }
            }
        }
        Ok(extracted)
    }
}

/// Archive paths arranged as a tree, for listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directory {
    pub files: Vec<String>,
    pub directories: BTreeMap<String, Directory>,
}

impl Directory {
    pub fn new<'a, I: IntoIterator<Item = &'a str>>(paths: I) -> Self {
        let mut root_dir = Directory::default();
        for path in paths.into_iter().sorted() {
            let dirs = path
                .split(MAIN_SEPARATOR)
                .filter(|d| !d.is_empty())
                .collect::<Vec<&str>>();
            let (file, dirs) = match dirs.split_last() {
                Some(split) => split,
                None => continue,
            };
            let mut current = &mut root_dir;
            for dir in dirs {
                current = current
                    .directories
                    .entry(dir.to_string())
                    .or_insert_with(Directory::default);
            }
            current.files.push(file.to_string());
        }
        root_dir
    }

    /// Total number of files below this directory.
    pub fn file_count(&self) -> usize {
        self.files.len()
            + self
                .directories
                .values()
                .map(Directory::file_count)
                .sum::<usize>()
    }

    /// Render the tree with `├--- ` and `└--- ` connectors, children in
    /// name order.
    pub fn tree_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        self.push_tree_lines("", &mut lines);
        lines
    }

    fn push_tree_lines(&self, prefix: &str, lines: &mut Vec<String>) {
        let children = self
            .files
            .iter()
            .map(|f| (f.as_str(), None))
            .chain(self.directories.iter().map(|(d, dir)| (d.as_str(), Some(dir))))
            .sorted_by(|a, b| a.0.cmp(&b.0))
            .collect::<Vec<(&str, Option<&Directory>)>>();
        let count = children.len();
        for (i, (name, dir)) in children.into_iter().enumerate() {
            let (connector, indent) = if i + 1 == count {
                ("└--- ", "     ")
            } else {
                ("├--- ", "|    ")
            };
            lines.push(format!("{}{}{}", prefix, connector, name));
            if let Some(dir) = dir {
                dir.push_tree_lines(&format!("{}{}", prefix, indent), lines);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sep(path: &str) -> String {
        path.replace('/', &MAIN_SEPARATOR.to_string())
    }

    #[test]
    fn directory_from_paths() {
        let paths = vec![sep("images/bg/room.png"), sep("script.rpyc"), sep("images/cg.png")];
        let dir = Directory::new(paths.iter().map(String::as_str));
        assert_eq!(dir.files, vec!["script.rpyc".to_string()]);
        let images = &dir.directories["images"];
        assert_eq!(images.files, vec!["cg.png".to_string()]);
        assert_eq!(images.directories["bg"].files, vec!["room.png".to_string()]);
        assert_eq!(dir.file_count(), 3);
    }

    #[test]
    fn tree_rendering() {
        let paths = vec![sep("a/x.txt"), sep("a/y.txt"), sep("b.txt"), sep("c/d/e.txt")];
        let dir = Directory::new(paths.iter().map(String::as_str));
        assert_eq!(
            dir.tree_lines(),
            vec![
                "├--- a",
                "|    ├--- x.txt",
                "|    └--- y.txt",
                "├--- b.txt",
                "└--- c",
                "     └--- d",
                "          └--- e.txt",
            ]
        );
    }

    #[test]
    fn version_not_forced_by_default() {
        let extractor = Extractor::new("archive.rpa");
        assert!(extractor.version.is_none());
        assert!(extractor.offset_and_key.is_none());
        assert_eq!(extractor.versions.len(), get_all_versions().len());
    }
}
