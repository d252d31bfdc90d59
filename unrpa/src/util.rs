pub fn zlib_decompress(buf: &[u8]) -> std::io::Result<Vec<u8>> {
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    let mut decoder = ZlibDecoder::new(buf);
    let mut ret = Vec::with_capacity(buf.len() * 2);
    decoder.read_to_end(&mut ret)?;
    Ok(ret)
}

/// Parse a hexadecimal token the way the archive headers write them,
/// tolerating surrounding whitespace and an optional `0x` prefix.
pub fn parse_hex(token: &[u8]) -> Option<u64> {
    let text = std::str::from_utf8(token).ok()?.trim();
    let text = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u64::from_str_radix(text, 16).ok()
}
