use super::{
    passthrough, read_first_line, tokens, BlockCipher, Detection, Location,
    LookupContext, Version,
};
use crate::{cipher, error::UnrpaError, loader, view::ArchiveView, Result};
use enum_iterator::IntoEnumIterator;
use std::io::{BufRead, Write};

/// Proprietary archives whose key is hidden in the game's `loader.pyo`.
///
/// ZiX-12B additionally runs the first block of every file through
/// [`cipher::transform_block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoEnumIterator)]
pub enum Zix {
    Zix12A,
    Zix12B,
}

impl Zix {
    pub fn get_versions() -> Vec<Box<dyn Version>> {
        Self::into_enum_iter()
            .map(|v| Box::new(v) as Box<dyn Version>)
            .collect()
    }

    fn header(&self) -> &'static [u8] {
        match self {
            Self::Zix12A => b"ZiX-12A",
            Self::Zix12B => b"ZiX-12B",
        }
    }
}

impl Version for Zix {
    fn get_name(&self) -> &str {
        match self {
            Self::Zix12A => "ZiX-12A",
            Self::Zix12B => "ZiX-12B",
        }
    }

    fn detect(&self, extension: &str, first_line: &[u8]) -> bool {
        Detection::Header(self.header()).matches(extension, first_line)
    }

    fn find_offset_and_key(
        &self,
        archive: &mut dyn BufRead,
        context: &LookupContext<'_>,
    ) -> Result<Location> {
        let source = loader::get_loader(context.archive_path, context.decompiler)?;
        let key = loader::find_key(&source)?;
        let block = match self {
            Self::Zix12A => None,
            Self::Zix12B => Some(BlockCipher {
                key,
                size: loader::find_block_size(&source)?,
            }),
        };

        let line = read_first_line(archive)?;
        let token = tokens(&line).pop().ok_or_else(|| {
            UnrpaError::MalformedHeader("empty ZiX header".to_string())
        })?;
        let offset = cipher::decode_offset(token)?;
        log::debug!("ZiX key: {:#x}, block: {:?}", key, block);
        Ok(Location {
            offset,
            key: Some(key),
            block,
        })
    }

    fn postprocess(
        &self,
        source: &mut ArchiveView<'_>,
        sink: &mut dyn Write,
        location: &Location,
    ) -> Result<()> {
        if let Self::Zix12B = self {
            let block = location
                .block
                .ok_or_else(|| UnrpaError::MissingDetails(self.get_name().to_string()))?;
            let mut head = source.read_amount(block.size)?;
            cipher::transform_block(&mut head, block.key);
            sink.write_all(&head)?;
        }
        passthrough(source, sink)
    }
}
