use super::{
    parse_offset_and_key, read_first_line, Detection, Location, LookupContext,
    Version,
};
use crate::{error::UnrpaError, util::parse_hex, Result};
use enum_iterator::IntoEnumIterator;
use std::io::BufRead;

/// Column where RPA-2.0 writes its index offset
const RPA2_OFFSET_COLUMN: usize = 8;

/// Versions written by mainline Ren'Py.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoEnumIterator)]
pub enum OfficialRpa {
    Rpa1,
    Rpa2,
    Rpa3,
}

impl OfficialRpa {
    pub fn get_versions() -> Vec<Box<dyn Version>> {
        Self::into_enum_iter()
            .map(|v| Box::new(v) as Box<dyn Version>)
            .collect()
    }

    fn detection(&self) -> Detection {
        match self {
            Self::Rpa1 => Detection::Extension("rpi"),
            Self::Rpa2 => Detection::Header(b"RPA-2.0"),
            Self::Rpa3 => Detection::Header(b"RPA-3.0"),
        }
    }
}

impl Version for OfficialRpa {
    fn get_name(&self) -> &str {
        match self {
            Self::Rpa1 => "RPA-1.0",
            Self::Rpa2 => "RPA-2.0",
            Self::Rpa3 => "RPA-3.0",
        }
    }

    fn detect(&self, extension: &str, first_line: &[u8]) -> bool {
        self.detection().matches(extension, first_line)
    }

    fn find_offset_and_key(
        &self,
        archive: &mut dyn BufRead,
        _context: &LookupContext<'_>,
    ) -> Result<Location> {
        match self {
            // The .rpi file holds nothing but the index
            Self::Rpa1 => Ok(Location::new(0, None)),
            Self::Rpa2 => {
                let line = read_first_line(archive)?;
                let offset = line
                    .get(RPA2_OFFSET_COLUMN..)
                    .and_then(parse_hex)
                    .ok_or_else(|| {
                        UnrpaError::MalformedHeader(format!(
                            "no offset in {:?}",
                            String::from_utf8_lossy(&line)
                        ))
                    })?;
                Ok(Location::new(offset, None))
            }
            Self::Rpa3 => {
                let (offset, key) = parse_offset_and_key(&read_first_line(archive)?)?;
                Ok(Location::new(offset, Some(key)))
            }
        }
    }
}
