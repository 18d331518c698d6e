//! On-disk embedding matrix formats.
//!
//! Binary layout (little-endian):
//!
//! ```text
//! magic "JOBM" | version u16 | dims u32 | rows u32 | header crc32 u32 | rows * dims f32
//! ```
//!
//! The JSON Lines form stores one array per row. Entries may be numbers,
//! `null`, or the strings `"NaN"`, `"Infinity"` and `"-Infinity"`, so exports
//! from numeric tooling keep their non-finite values until load-time sanitation.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;

use serde::Deserialize;

use crate::corpus::CorpusLoadError;
use crate::matrix::EmbeddingMatrix;

/// Magic bytes opening a binary matrix file.
pub const MATRIX_MAGIC: [u8; 4] = *b"JOBM";
/// Current binary format version.
pub const MATRIX_VERSION: u16 = 1;

const HEADER_LEN: usize = 4 + 2 + 4 + 4;
// 4 MiB of f32; larger bodies grow as they are read
const MAX_PREALLOCATED_VALUES: usize = 1 << 20;

/// Reads a matrix from `path`, choosing the format by sniffing the magic bytes.
pub fn read_matrix(path: &Path) -> Result<EmbeddingMatrix, CorpusLoadError> {
    let source_name = path.display().to_string();
    let file = File::open(path).map_err(|source| CorpusLoadError::Unreadable {
        source_name: source_name.clone(),
        source,
    })?;
    let mut reader = BufReader::new(file);
    let is_binary = {
        let peek = reader
            .fill_buf()
            .map_err(|source| CorpusLoadError::Unreadable {
                source_name: source_name.clone(),
                source,
            })?;
        peek.starts_with(&MATRIX_MAGIC)
    };
    if is_binary {
        let file_len = reader
            .get_ref()
            .metadata()
            .map_err(|source| CorpusLoadError::Unreadable {
                source_name: source_name.clone(),
                source,
            })?
            .len();
        decode_binary(reader, &source_name, Some(file_len))
    } else {
        read_jsonl(reader, &source_name)
    }
}

/// Decodes the binary layout.
///
/// The header shape is trusted only as far as the bytes that follow it; a
/// short body fails as unreadable rather than being allocated up front.
pub fn read_binary<R: Read>(
    reader: R,
    source_name: &str,
) -> Result<EmbeddingMatrix, CorpusLoadError> {
    decode_binary(reader, source_name, None)
}

/// Total file size implied by a binary header, or `None` on overflow.
pub fn binary_len(rows: usize, dims: usize) -> Option<u64> {
    let values = u64::try_from(rows).ok()?.checked_mul(u64::try_from(dims).ok()?)?;
    values.checked_mul(4)?.checked_add((HEADER_LEN + 4) as u64)
}

fn decode_binary<R: Read>(
    mut reader: R,
    source_name: &str,
    file_len: Option<u64>,
) -> Result<EmbeddingMatrix, CorpusLoadError> {
    let unreadable = |source: io::Error| CorpusLoadError::Unreadable {
        source_name: source_name.to_string(),
        source,
    };
    let format = |message: String| CorpusLoadError::Format {
        source_name: source_name.to_string(),
        message,
    };

    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).map_err(unreadable)?;
    let mut crc_bytes = [0u8; 4];
    reader.read_exact(&mut crc_bytes).map_err(unreadable)?;

    if header[0..4] != MATRIX_MAGIC {
        return Err(format(format!("invalid magic {:?}", &header[0..4])));
    }
    let expected_crc = u32::from_le_bytes(crc_bytes);
    let actual_crc = crc32fast::hash(&header);
    if expected_crc != actual_crc {
        return Err(format(format!(
            "header CRC mismatch (expected {expected_crc:#010x}, got {actual_crc:#010x})"
        )));
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != MATRIX_VERSION {
        return Err(format(format!("unsupported version {version}")));
    }
    let dims = u32::from_le_bytes([header[6], header[7], header[8], header[9]]) as usize;
    let rows = u32::from_le_bytes([header[10], header[11], header[12], header[13]]) as usize;

    let expected_len =
        binary_len(rows, dims).ok_or_else(|| format(format!("shape [{rows}, {dims}] overflows")))?;
    if let Some(file_len) = file_len {
        if file_len != expected_len {
            return Err(format(format!(
                "file size mismatch for shape [{rows}, {dims}] (expected {expected_len}, got {file_len})"
            )));
        }
    }
    let value_count = rows
        .checked_mul(dims)
        .ok_or_else(|| format(format!("shape [{rows}, {dims}] overflows")))?;
    let mut data = Vec::with_capacity(value_count.min(MAX_PREALLOCATED_VALUES));
    let mut buf = [0u8; 4];
    for _ in 0..value_count {
        reader.read_exact(&mut buf).map_err(unreadable)?;
        data.push(f32::from_le_bytes(buf));
    }
    let mut trailing = [0u8; 1];
    if reader.read(&mut trailing).map_err(unreadable)? != 0 {
        return Err(format("trailing bytes after matrix body".to_string()));
    }
    EmbeddingMatrix::from_flat(rows, dims, data)
}

/// Encodes `matrix` in the binary layout.
pub fn write_binary<W: Write>(matrix: &EmbeddingMatrix, mut writer: W) -> io::Result<()> {
    let dims = u32::try_from(matrix.dims())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "dimension exceeds u32"))?;
    let rows = u32::try_from(matrix.rows())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "row count exceeds u32"))?;

    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(&MATRIX_MAGIC);
    header.extend_from_slice(&MATRIX_VERSION.to_le_bytes());
    header.extend_from_slice(&dims.to_le_bytes());
    header.extend_from_slice(&rows.to_le_bytes());
    writer.write_all(&header)?;
    writer.write_all(&crc32fast::hash(&header).to_le_bytes())?;
    for value in matrix.as_slice() {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer.flush()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    Number(f64),
    Text(String),
    Missing(()),
}

impl RawValue {
    fn into_f32(self) -> Result<f32, String> {
        match self {
            RawValue::Number(value) => Ok(value as f32),
            RawValue::Missing(()) => Ok(f32::NAN),
            RawValue::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "nan" => Ok(f32::NAN),
                "inf" | "+inf" | "infinity" | "+infinity" => Ok(f32::INFINITY),
                "-inf" | "-infinity" => Ok(f32::NEG_INFINITY),
                other => other
                    .parse::<f32>()
                    .map_err(|_| format!("unrecognized value {text:?}")),
            },
        }
    }
}

/// Decodes one JSON array per line; blank lines are skipped.
pub fn read_jsonl<R: BufRead>(
    reader: R,
    source_name: &str,
) -> Result<EmbeddingMatrix, CorpusLoadError> {
    let mut rows = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| CorpusLoadError::Unreadable {
            source_name: source_name.to_string(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let malformed = |message: String| CorpusLoadError::Malformed {
            source_name: source_name.to_string(),
            line: line_no + 1,
            message,
        };
        let raw: Vec<RawValue> =
            serde_json::from_str(&line).map_err(|err| malformed(err.to_string()))?;
        let row = raw
            .into_iter()
            .map(RawValue::into_f32)
            .collect::<Result<Vec<f32>, String>>()
            .map_err(malformed)?;
        rows.push(row);
    }
    EmbeddingMatrix::from_rows(rows)
}

/// Encodes `matrix` as JSON Lines, writing non-finite values as strings.
pub fn write_jsonl<W: Write>(matrix: &EmbeddingMatrix, mut writer: W) -> io::Result<()> {
    for row in matrix.iter_rows().take(matrix.rows()) {
        let values: Vec<serde_json::Value> = row
            .iter()
            .map(|value| {
                if value.is_nan() {
                    serde_json::Value::from("NaN")
                } else if value.is_infinite() && value.is_sign_positive() {
                    serde_json::Value::from("Infinity")
                } else if value.is_infinite() {
                    serde_json::Value::from("-Infinity")
                } else {
                    serde_json::Value::from(*value)
                }
            })
            .collect();
        serde_json::to_writer(&mut writer, &values)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}
