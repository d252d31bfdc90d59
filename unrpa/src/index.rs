use crate::{error::UnrpaError, util::zlib_decompress, Result};
use serde_pickle::{DeOptions, HashableValue, Value};
use std::{collections::BTreeMap, io::Read, path::MAIN_SEPARATOR};

/// One byte range of an archived file, preceded by literal prefix bytes
/// stored in the index itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPart {
    pub offset: u64,
    /// Length of the whole part, prefix included
    pub length: u64,
    pub prefix: Vec<u8>,
}

pub type IndexEntry = Vec<IndexPart>;

/// Decoded archive directory, keyed by path with host separators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    entries: BTreeMap<String, IndexEntry>,
}

impl Index {
    /// Read everything left in `reader`, inflate it and unpickle the index.
    /// When `key` is set every offset and length is XORed with it.
    pub fn decode<R: Read>(mut reader: R, key: Option<u64>) -> Result<Self> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        let inflated = zlib_decompress(&buf).map_err(|e| {
            UnrpaError::IndexDecode(format!("Could not inflate index: {}", e))
        })?;
        log::debug!(
            "Index: {} compressed bytes, {} inflated",
            buf.len(),
            inflated.len()
        );
        let value = serde_pickle::value_from_slice(&inflated, DeOptions::new())
            .map_err(|e| {
                UnrpaError::IndexDecode(format!("Could not unpickle index: {}", e))
            })?;
        Self::from_value(value, key)
    }

    pub fn from_value(value: Value, key: Option<u64>) -> Result<Self> {
        let dict = match value {
            Value::Dict(dict) => dict,
            other => {
                return Err(UnrpaError::IndexDecode(format!(
                    "Index is not a dict: {:?}",
                    other
                )))
            }
        };
        let mut entries = BTreeMap::new();
        for (path, entry) in dict {
            let path = normalize_path(&path_to_string(path)?);
            let parts = sequence(entry)?
                .into_iter()
                .map(|part| {
                    let (offset, length, prefix) = normalize_part(part)?;
                    Ok(IndexPart {
                        offset: deobfuscate(offset, key)?,
                        length: deobfuscate(length, key)?,
                        prefix,
                    })
                })
                .collect::<Result<IndexEntry>>()?;
            entries.insert(path, parts);
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&IndexEntry> {
        self.entries.get(path)
    }

    /// Entries ordered by path.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &IndexEntry)> {
        self.entries.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }
}

fn path_to_string(path: HashableValue) -> Result<String> {
    match path {
        HashableValue::String(s) => Ok(s),
        HashableValue::Bytes(b) => Ok(String::from_utf8_lossy(&b).into_owned()),
        other => Err(UnrpaError::IndexDecode(format!(
            "Index path is neither bytes nor str: {:?}",
            other
        ))),
    }
}

fn normalize_path(path: &str) -> String {
    if MAIN_SEPARATOR == '/' {
        path.to_string()
    } else {
        path.replace('/', &MAIN_SEPARATOR.to_string())
    }
}

fn sequence(value: Value) -> Result<Vec<Value>> {
    match value {
        Value::List(items) | Value::Tuple(items) => Ok(items),
        other => Err(UnrpaError::IndexDecode(format!(
            "Expected a list or tuple in index, got {:?}",
            other
        ))),
    }
}

/// `(offset, length)` gains an empty prefix, `(offset, length, prefix)`
/// passes through.
fn normalize_part(part: Value) -> Result<(i64, i64, Vec<u8>)> {
    let mut fields = sequence(part)?.into_iter();
    match (fields.next(), fields.next(), fields.next(), fields.next()) {
        (Some(offset), Some(length), None, None) => {
            Ok((integer(offset)?, integer(length)?, Vec::new()))
        }
        (Some(offset), Some(length), Some(prefix), None) => {
            Ok((integer(offset)?, integer(length)?, bytes(prefix)?))
        }
        _ => Err(UnrpaError::IndexDecode(
            "Index part must have 2 or 3 fields".to_string(),
        )),
    }
}

fn integer(value: Value) -> Result<i64> {
    match value {
        Value::I64(v) => Ok(v),
        Value::Bool(v) => Ok(v as i64),
        other => Err(UnrpaError::IndexDecode(format!(
            "Expected an integer in index part, got {:?}",
            other
        ))),
    }
}

fn bytes(value: Value) -> Result<Vec<u8>> {
    match value {
        Value::Bytes(b) => Ok(b),
        Value::String(s) => Ok(s.into_bytes()),
        Value::None => Ok(Vec::new()),
        other => Err(UnrpaError::IndexDecode(format!(
            "Expected bytes as index part prefix, got {:?}",
            other
        ))),
    }
}

fn deobfuscate(value: i64, key: Option<u64>) -> Result<u64> {
    let value = match key {
        Some(key) => i128::from(value) ^ i128::from(key),
        None => i128::from(value),
    };
    if value < 0 || value > i128::from(u64::MAX) {
        return Err(UnrpaError::IndexDecode(format!(
            "Index offset or length out of range: {}",
            value
        )));
    }
    Ok(value as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::ZlibEncoder, Compression};
    use serde_pickle::SerOptions;
    use std::io::Write;

    fn part(fields: Vec<Value>) -> Value {
        Value::Tuple(fields)
    }

    fn pack(value: &Value) -> Vec<u8> {
        let pickled = serde_pickle::value_to_vec(value, SerOptions::new()).unwrap();
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&pickled).unwrap();
        encoder.finish().unwrap()
    }

    fn sample(key: i64) -> Value {
        let mut dict = BTreeMap::new();
        dict.insert(
            HashableValue::Bytes(b"script.rpyc".to_vec()),
            Value::List(vec![part(vec![Value::I64(34 ^ key), Value::I64(10 ^ key)])]),
        );
        dict.insert(
            HashableValue::String("images/bg.png".to_string()),
            Value::List(vec![part(vec![
                Value::I64(51 ^ key),
                Value::I64(8 ^ key),
                Value::Bytes(b"\x89PNG".to_vec()),
            ])]),
        );
        Value::Dict(dict)
    }

    fn expected() -> Index {
        let mut entries = BTreeMap::new();
        entries.insert(
            normalize_path("images/bg.png"),
            vec![IndexPart {
                offset: 51,
                length: 8,
                prefix: b"\x89PNG".to_vec(),
            }],
        );
        entries.insert(
            "script.rpyc".to_string(),
            vec![IndexPart {
                offset: 34,
                length: 10,
                prefix: Vec::new(),
            }],
        );
        Index { entries }
    }

    #[test]
    fn decode_plain_index() {
        let index = Index::decode(&pack(&sample(0))[..], None).unwrap();
        assert_eq!(index, expected());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn decode_obfuscated_index() {
        let key = 0x1234_abcd;
        let index = Index::decode(&pack(&sample(key))[..], Some(key as u64)).unwrap();
        assert_eq!(index, expected());
    }

    #[test]
    fn paths_are_sorted_and_lossy() {
        let mut dict = BTreeMap::new();
        dict.insert(
            HashableValue::Bytes(b"b/\xffname".to_vec()),
            Value::List(vec![part(vec![Value::I64(0), Value::I64(1)])]),
        );
        dict.insert(
            HashableValue::Bytes(b"a".to_vec()),
            Value::List(vec![part(vec![Value::I64(0), Value::I64(1)])]),
        );
        let index = Index::from_value(Value::Dict(dict), None).unwrap();
        let paths = index.paths().cloned().collect::<Vec<String>>();
        assert_eq!(
            paths,
            vec!["a".to_string(), normalize_path("b/\u{FFFD}name")]
        );
    }

    #[test]
    fn corrupt_compression() {
        let err = Index::decode(&b"not zlib at all"[..], None).unwrap_err();
        assert!(matches!(err, UnrpaError::IndexDecode(_)));
    }

    #[test]
    fn corrupt_pickle() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"\x80\x02garbage").unwrap();
        let blob = encoder.finish().unwrap();
        let err = Index::decode(&blob[..], None).unwrap_err();
        assert!(matches!(err, UnrpaError::IndexDecode(_)));
    }

    #[test]
    fn bad_part_shapes() {
        let shapes = vec![
            Value::I64(4),
            Value::List(vec![Value::I64(4)]),
            Value::List(vec![part(vec![Value::I64(1)])]),
            Value::List(vec![part(vec![
                Value::I64(1),
                Value::I64(2),
                Value::Bytes(Vec::new()),
                Value::I64(3),
            ])]),
            Value::List(vec![part(vec![Value::String("x".into()), Value::I64(2)])]),
        ];
        for shape in shapes {
            let mut dict = BTreeMap::new();
            dict.insert(HashableValue::String("a".to_string()), shape);
            assert!(Index::from_value(Value::Dict(dict), None).is_err());
        }
    }

    #[test]
    fn negative_fields_rejected() {
        let mut dict = BTreeMap::new();
        dict.insert(
            HashableValue::String("a".to_string()),
            Value::List(vec![part(vec![Value::I64(-1), Value::I64(2)])]),
        );
        assert!(Index::from_value(Value::Dict(dict), None).is_err());
    }

    #[test]
    fn not_a_dict() {
        assert!(Index::from_value(Value::List(Vec::new()), None).is_err());
    }
}
