use super::{official::OfficialRpa, Detection, Location, LookupContext, Version};
use crate::Result;
use enum_iterator::IntoEnumIterator;
use std::io::BufRead;

/// Slightly customised RPA-3.0 archives found in the wild. Only the header
/// literal differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoEnumIterator)]
pub enum UnofficialRpa {
    Rpa32,
    Rpa40,
}

impl UnofficialRpa {
    pub fn get_versions() -> Vec<Box<dyn Version>> {
        Self::into_enum_iter()
            .map(|v| Box::new(v) as Box<dyn Version>)
            .collect()
    }

    fn header(&self) -> &'static [u8] {
        match self {
            Self::Rpa32 => b"RPA-3.2",
            Self::Rpa40 => b"RPA-4.0",
        }
    }
}

impl Version for UnofficialRpa {
    fn get_name(&self) -> &str {
        match self {
            Self::Rpa32 => "RPA-3.2",
            Self::Rpa40 => "RPA-4.0",
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
        OfficialRpa::Rpa3.find_offset_and_key(archive, context)
    }
}
