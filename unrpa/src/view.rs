use crate::{error::UnrpaError, Result};
use std::{
    collections::VecDeque,
    fmt::Debug,
    io::{self, Cursor, Read, Seek, SeekFrom},
};

/// Anything an archive can be read from.
pub trait Container: Read + Seek + Debug {}

impl<T: Read + Seek + Debug> Container for T {}

#[derive(Debug)]
enum Source<'a> {
    Prefix(Cursor<Vec<u8>>),
    Archive(&'a mut dyn Container),
}

impl<'a> Source<'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Prefix(cursor) => cursor.read(buf),
            Self::Archive(archive) => archive.read(buf),
        }
    }
}

/// A bounded view over one archived file: the literal prefix stored in the
/// index followed by a window of the archive itself.
///
/// The archive is borrowed mutably for the lifetime of the view since
/// constructing the view repositions it.
#[derive(Debug)]
pub struct ArchiveView<'a> {
    name: String,
    sources: VecDeque<Source<'a>>,
    remaining: u64,
}

impl<'a> ArchiveView<'a> {
    /// `length` covers the prefix too, the archive is read for
    /// `length - prefix.len()` bytes starting at `offset`.
    pub fn new(
        archive: &'a mut dyn Container,
        name: &str,
        offset: u64,
        length: u64,
        prefix: &[u8],
    ) -> Result<Self> {
        archive.seek(SeekFrom::Start(offset))?;
        let mut sources = VecDeque::with_capacity(2);
        if !prefix.is_empty() {
            sources.push_back(Source::Prefix(Cursor::new(prefix.to_vec())));
        }
        sources.push_back(Source::Archive(archive));
        Ok(Self {
            name: name.to_string(),
            sources,
            remaining: length,
        })
    }

    /// Bytes still owed by this view.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Read whatever the current source hands out in one call, never more
    /// than `buf.len()` or the remaining length.
    ///
    /// Returns 0 once the declared length has been produced. Running out of
    /// sources before that is a [`UnrpaError::TruncatedEntry`].
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        let limit = buf.len().min(self.remaining_usize());
        if limit == 0 {
            return Ok(0);
        }
        while let Some(source) = self.sources.front_mut() {
            let read = source.read(&mut buf[..limit])?;
            if read > 0 {
                self.remaining -= read as u64;
                return Ok(read);
            }
            self.sources.pop_front();
        }
        Err(UnrpaError::TruncatedEntry {
            path: self.name.clone(),
            remaining: self.remaining,
        })
    }

    /// Read exactly `amount` bytes, or fewer only when the view's remaining
    /// length is smaller.
    pub fn read_amount(&mut self, amount: usize) -> Result<Vec<u8>> {
        let amount = amount.min(self.remaining_usize());
        let mut buf = vec![0; amount];
        let mut filled = 0;
        while filled < amount {
            filled += self.read_chunk(&mut buf[filled..])?;
        }
        Ok(buf)
    }

    fn remaining_usize(&self) -> usize {
        if self.remaining > usize::MAX as u64 {
            usize::MAX
        } else {
            self.remaining as usize
        }
    }
}

impl<'a> Read for ArchiveView<'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_chunk(buf).map_err(|err| match err {
            UnrpaError::Io(err) => err,
            err => io::Error::new(io::ErrorKind::UnexpectedEof, err),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archive() -> Cursor<Vec<u8>> {
        Cursor::new((0..=255u8).collect())
    }

    fn drain(view: &mut ArchiveView<'_>, chunk: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = vec![0; chunk];
        loop {
            let read = view.read_chunk(&mut buf).unwrap();
            if read == 0 {
                break;
            }
            out.extend_from_slice(&buf[..read]);
        }
        out
    }

    #[test]
    fn prefix_then_window() {
        let mut archive = archive();
        let mut view =
            ArchiveView::new(&mut archive, "a", 16, 7, b"hdr").unwrap();
        let out = drain(&mut view, 1024);
        assert_eq!(out, [b'h', b'd', b'r', 16, 17, 18, 19]);
        assert_eq!(view.remaining(), 0);
    }

    #[test]
    fn chunk_size_does_not_change_output() {
        let expected = {
            let mut archive = archive();
            let mut view =
                ArchiveView::new(&mut archive, "a", 100, 40, b"prefix").unwrap();
            drain(&mut view, 4096)
        };
        for chunk in 1..9 {
            let mut archive = archive();
            let mut view =
                ArchiveView::new(&mut archive, "a", 100, 40, b"prefix").unwrap();
            assert_eq!(drain(&mut view, chunk), expected);
        }
        let mut archive = archive();
        let mut view =
            ArchiveView::new(&mut archive, "a", 100, 40, b"prefix").unwrap();
        assert_eq!(view.read_amount(40).unwrap(), expected);
    }

    #[test]
    fn read_amount_crosses_sources() {
        let mut archive = archive();
        let mut view = ArchiveView::new(&mut archive, "a", 0, 6, b"xy").unwrap();
        assert_eq!(view.read_amount(3).unwrap(), vec![b'x', b'y', 0]);
        assert_eq!(view.read_amount(100).unwrap(), vec![1, 2, 3]);
        assert!(view.read_amount(100).unwrap().is_empty());
    }

    #[test]
    fn empty_once_consumed() {
        let mut archive = archive();
        let mut view = ArchiveView::new(&mut archive, "a", 250, 6, &[]).unwrap();
        assert_eq!(drain(&mut view, 2), vec![250, 251, 252, 253, 254, 255]);
        let mut buf = [0; 4];
        assert_eq!(view.read_chunk(&mut buf).unwrap(), 0);
        assert_eq!(view.read(&mut buf).unwrap(), 0);
        assert_eq!(view.remaining(), 0);
    }

    #[test]
    fn declared_length_past_end_is_an_error() {
        let mut archive = archive();
        let mut view = ArchiveView::new(&mut archive, "a/b", 250, 10, &[]).unwrap();
        let mut buf = [0; 64];
        assert_eq!(view.read_chunk(&mut buf).unwrap(), 6);
        match view.read_chunk(&mut buf) {
            Err(UnrpaError::TruncatedEntry { path, remaining }) => {
                assert_eq!(path, "a/b");
                assert_eq!(remaining, 4);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn io_read_reports_truncation() {
        let mut archive = archive();
        let mut view = ArchiveView::new(&mut archive, "a", 255, 2, &[]).unwrap();
        let mut out = Vec::new();
        let err = view.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(out, vec![255]);
    }
}
