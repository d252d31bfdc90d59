use super::{hex_token, read_first_line, tokens, Detection, Location, LookupContext, Version};
use crate::Result;
use enum_iterator::IntoEnumIterator;
use std::io::BufRead;

const EXTRA_KEY: u64 = 0xDABE_8DF0;

/// A short-lived alternative to RPA-3.0 from mainline Ren'Py. Writes the key
/// before the offset and masks it with a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoEnumIterator)]
pub enum Alt {
    Alt1,
}

impl Alt {
    pub fn get_versions() -> Vec<Box<dyn Version>> {
        Self::into_enum_iter()
            .map(|v| Box::new(v) as Box<dyn Version>)
            .collect()
    }
}

impl Version for Alt {
    fn get_name(&self) -> &str {
        "ALT-1.0"
    }

    fn detect(&self, extension: &str, first_line: &[u8]) -> bool {
        Detection::Header(b"ALT-1.0").matches(extension, first_line)
    }

    fn find_offset_and_key(
        &self,
        archive: &mut dyn BufRead,
        _context: &LookupContext<'_>,
    ) -> Result<Location> {
        let line = read_first_line(archive)?;
        let tokens = tokens(&line);
        let key = hex_token(&tokens, 1)? ^ EXTRA_KEY;
        let offset = hex_token(&tokens, 2)?;
        Ok(Location::new(offset, Some(key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::tests::locate;

    #[test]
    fn key_masked() {
        assert_eq!(
            locate(&Alt::Alt1, b"ALT-1.0 dabe8df1 0000abcd\n").unwrap(),
            Location::new(0xabcd, Some(1))
        );
    }
}
