//! Numeric routines used by the ZiX archive versions.
//!
//! They are reverse engineered from the `_string` extension module shipped
//! with those games and are named after what they do, not after the
//! (misleading) names the module gives them. Arithmetic is kept exactly as
//! the module performs it, including the floating point cube root.

use crate::{error::UnrpaError, util::parse_hex, Result};

const KEY_MAGIC: u128 = 102_464_652_121_606_009;

pub const MAGIC_KEYS: [u64; 7] = [
    3621826839565189698,
    8167163782024462963,
    5643161164948769306,
    4940859562182903807,
    2672489546482320731,
    8917212212349173728,
    7093854916990953299,
];

/// Turn a loader verification code into the key used for both the index
/// and the leading block of every file.
///
/// Only the decimal digits of `code` take part.
pub fn derive_key(code: &str) -> Result<u64> {
    let digits = code
        .chars()
        .filter(char::is_ascii_digit)
        .collect::<String>();
    if digits.is_empty() {
        return Err(UnrpaError::IncorrectLoader(format!(
            "verification code {:?} contains no digits",
            code
        )));
    }
    let a = match digits.parse::<u128>().ok().and_then(|a| a.checked_add(KEY_MAGIC)) {
        Some(a) => a as f64,
        // Too wide for u128, the magic is far below f64 precision here
        None => {
            digits
                .parse::<f64>()
                .map_err(|e| UnrpaError::IncorrectLoader(e.to_string()))?
                + KEY_MAGIC as f64
        }
    };
    let root = a.powf(1.0 / 3.0).round_ties_even();
    Ok((root / 23.0 * 109.0) as u64)
}

/// Decode the obfuscated index offset stored as the last token of a ZiX
/// header line.
pub fn decode_offset(token: &[u8]) -> Result<u64> {
    if token.len() < 8 {
        return Err(UnrpaError::MalformedHeader(format!(
            "offset token {:?} is shorter than 8 bytes",
            String::from_utf8_lossy(token)
        )));
    }
    let reordered = [
        token[7], token[6], token[0], token[1], token[2], token[5], token[4],
        token[3],
    ];
    parse_hex(&reordered).ok_or_else(|| {
        UnrpaError::MalformedHeader(format!(
            "offset token {:?} is not hexadecimal",
            String::from_utf8_lossy(token)
        ))
    })
}

/// XOR every little endian u64 word of `buf` with `key` and the magic keys
/// in turn. Applying it twice restores the input.
///
/// A trailing partial word is left untouched.
pub fn transform_block(buf: &mut [u8], key: u64) {
    buf.chunks_exact_mut(8)
        .zip(MAGIC_KEYS.iter().cycle())
        .for_each(|(word, magic)| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(word);
            let value = u64::from_le_bytes(bytes) ^ key ^ magic;
            word.copy_from_slice(&value.to_le_bytes());
        });
}
