//! Binary adapter container.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! [0..8)        magic header 00 61 73 6d 01 00 00 00
//! [8..12)       u32  M   metadata block length
//! [12..12+M)    JSON metadata (scalar fields + additionalMetadata)
//! u32 LA, LA bytes of weights_a as packed f32
//! u32 LB, LB bytes of weights_b as packed f32
//! ```
//!
//! Metadata is written as UTF-8. The decoder also accepts a UTF-16LE block,
//! which is detected by the presence of NUL bytes (valid UTF-8 JSON never
//! contains a raw NUL).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{FormatError, LoraError, Result};
use crate::types::LoraAdapter;

/// Fixed container header.
pub const HEADER: [u8; 8] = [0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];

/// Scalar fields carried in the JSON metadata block.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MetadataRef<'a> {
    skill_id: &'a str,
    skill_name: &'a str,
    description: &'a str,
    base_model_compatibility: &'a str,
    version: u32,
    rank: i32,
    alpha: f32,
    additional_metadata: &'a HashMap<String, String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataOwned {
    skill_id: String,
    skill_name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    base_model_compatibility: String,
    version: u32,
    rank: i32,
    alpha: f32,
    #[serde(default)]
    additional_metadata: HashMap<String, String>,
}

/// Encode an adapter into the binary container.
pub fn encode(adapter: &LoraAdapter) -> Result<Vec<u8>> {
    let metadata = serde_json::to_vec(&MetadataRef {
        skill_id: &adapter.skill_id,
        skill_name: &adapter.skill_name,
        description: &adapter.description,
        base_model_compatibility: &adapter.base_model_compatibility,
        version: adapter.version,
        rank: adapter.rank,
        alpha: adapter.alpha,
        additional_metadata: &adapter.additional_metadata,
    })?;
    let weights_a = pack_f32(&adapter.weights_a);
    let weights_b = pack_f32(&adapter.weights_b);

    let mut out =
        Vec::with_capacity(HEADER.len() + 12 + metadata.len() + weights_a.len() + weights_b.len());
    out.extend_from_slice(&HEADER);
    write_block(&mut out, "metadata block", &metadata)?;
    write_block(&mut out, "weights_a block", &weights_a)?;
    write_block(&mut out, "weights_b block", &weights_b)?;

    tracing::trace!(
        skill_id = %adapter.skill_id,
        bytes = out.len(),
        "adapter encoded"
    );
    Ok(out)
}

/// Decode an adapter from the binary container.
///
/// The header is validated before anything else is read.
pub fn decode(bytes: &[u8]) -> Result<LoraAdapter> {
    let header = bytes.get(..HEADER.len()).unwrap_or(bytes);
    if header != HEADER {
        return Err(FormatError::InvalidHeader {
            expected: HEADER,
            found: header.to_vec(),
        }
        .into());
    }

    let mut reader = Reader {
        bytes,
        pos: HEADER.len(),
    };
    let metadata = reader.block("metadata block")?;
    let weights_a = unpack_f32_section(reader.block("weights_a block")?, "weights_a block")?;
    let weights_b = unpack_f32_section(reader.block("weights_b block")?, "weights_b block")?;

    let remaining = bytes.len() - reader.pos;
    if remaining != 0 {
        return Err(FormatError::TrailingBytes(remaining).into());
    }

    let meta = parse_metadata(metadata)?;
    Ok(LoraAdapter {
        skill_id: meta.skill_id,
        skill_name: meta.skill_name,
        description: meta.description,
        base_model_compatibility: meta.base_model_compatibility,
        version: meta.version,
        rank: meta.rank,
        alpha: meta.alpha,
        weights_a,
        weights_b,
        additional_metadata: meta.additional_metadata,
    })
}

/// Pack floats as contiguous little-endian IEEE-754 bytes.
pub fn pack_f32(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Unpack contiguous little-endian IEEE-754 bytes.
pub fn unpack_f32(bytes: &[u8]) -> std::result::Result<Vec<f32>, FormatError> {
    unpack_f32_section(bytes, "float block")
}

fn unpack_f32_section(
    bytes: &[u8],
    section: &'static str,
) -> std::result::Result<Vec<f32>, FormatError> {
    if bytes.len() % 4 != 0 {
        return Err(FormatError::MisalignedFloats {
            section,
            len: bytes.len(),
        });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn write_block(out: &mut Vec<u8>, section: &'static str, block: &[u8]) -> Result<()> {
    let len = u32::try_from(block.len()).map_err(|_| FormatError::Oversized {
        section,
        len: block.len(),
    })?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(block);
    Ok(())
}

fn parse_metadata(block: &[u8]) -> std::result::Result<MetadataOwned, LoraError> {
    let text = if block.contains(&0) {
        decode_utf16le(block)?
    } else {
        String::from_utf8(block.to_vec())
            .map_err(|e| FormatError::InvalidMetadata(e.to_string()))?
    };
    let text = text.trim_start_matches('\u{feff}');
    serde_json::from_str(text).map_err(|e| FormatError::InvalidMetadata(e.to_string()).into())
}

fn decode_utf16le(block: &[u8]) -> std::result::Result<String, FormatError> {
    if block.len() % 2 != 0 {
        return Err(FormatError::InvalidMetadata(format!(
            "odd UTF-16 block length {}",
            block.len()
        )));
    }
    let units: Vec<u16> = block
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16(&units).map_err(|e| FormatError::InvalidMetadata(e.to_string()))
}

/// Cursor over a container buffer.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize, section: &'static str) -> std::result::Result<&'a [u8], FormatError> {
        let available = self.bytes.len() - self.pos;
        if n > available {
            return Err(FormatError::Truncated {
                section,
                needed: n,
                available,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Read a u32 length prefix followed by that many bytes.
    fn block(&mut self, section: &'static str) -> std::result::Result<&'a [u8], FormatError> {
        let prefix = self.take(4, section)?;
        let len = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        self.take(len, section)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LoraAdapter {
        let mut additional_metadata = HashMap::new();
        additional_metadata.insert("compilationId".to_owned(), "c-1".to_owned());
        additional_metadata.insert("note".to_owned(), "ünïcödé ✓".to_owned());
        LoraAdapter {
            skill_id: "skill-retry-1".into(),
            skill_name: "Retry".into(),
            description: "Retries flaky calls".into(),
            base_model_compatibility: "hrm-base".into(),
            version: 3,
            rank: 4,
            alpha: 8.5,
            weights_a: vec![0.25, -1.5, f32::MIN_POSITIVE, 3.0e-7],
            weights_b: vec![1.0, 2.0],
            additional_metadata,
        }
    }

    #[test]
    fn round_trip_preserves_adapter() {
        let adapter = sample();
        let bytes = encode(&adapter).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, adapter);
    }

    #[test]
    fn layout_matches_container_format() {
        let adapter = sample();
        let bytes = encode(&adapter).unwrap();

        assert_eq!(&bytes[..8], &HEADER);
        let m = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
        let json: serde_json::Value = serde_json::from_slice(&bytes[12..12 + m]).unwrap();
        assert_eq!(json["skillId"], "skill-retry-1");
        assert_eq!(json["baseModelCompatibility"], "hrm-base");
        assert_eq!(json["rank"], 4);

        let la_at = 12 + m;
        let la = u32::from_le_bytes(bytes[la_at..la_at + 4].try_into().unwrap()) as usize;
        assert_eq!(la, 16);
        assert_eq!(&bytes[la_at + 4..la_at + 8], &0.25f32.to_le_bytes());

        let lb_at = la_at + 4 + la;
        let lb = u32::from_le_bytes(bytes[lb_at..lb_at + 4].try_into().unwrap()) as usize;
        assert_eq!(lb, 8);
        assert_eq!(bytes.len(), lb_at + 4 + lb);
    }

    #[test]
    fn empty_weights_round_trip() {
        let mut adapter = sample();
        adapter.weights_a.clear();
        adapter.weights_b.clear();
        let decoded = decode(&encode(&adapter).unwrap()).unwrap();
        assert!(decoded.weights_a.is_empty());
        assert!(decoded.weights_b.is_empty());
    }

    #[test]
    fn bad_header_is_rejected() {
        let mut bytes = encode(&sample()).unwrap();
        bytes[1] = b'x';
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(
            err,
            LoraError::Format(FormatError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn short_buffer_fails_on_header() {
        let err = decode(&[0x00, 0x61]).unwrap_err();
        assert!(matches!(
            err,
            LoraError::Format(FormatError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn truncated_weights_are_rejected() {
        let bytes = encode(&sample()).unwrap();
        let err = decode(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(
            err,
            LoraError::Format(FormatError::Truncated {
                section: "weights_b block",
                ..
            })
        ));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = encode(&sample()).unwrap();
        bytes.push(0);
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, LoraError::Format(FormatError::TrailingBytes(1))));
    }

    #[test]
    fn misaligned_float_block_is_rejected() {
        assert_eq!(
            unpack_f32(&[0, 0, 128]),
            Err(FormatError::MisalignedFloats {
                section: "float block",
                len: 3
            })
        );
    }

    #[test]
    fn utf16_metadata_is_accepted() {
        let adapter = sample();
        let json = serde_json::to_string(&serde_json::json!({
            "skillId": adapter.skill_id,
            "skillName": adapter.skill_name,
            "description": adapter.description,
            "baseModelCompatibility": adapter.base_model_compatibility,
            "version": adapter.version,
            "rank": adapter.rank,
            "alpha": adapter.alpha,
            "additionalMetadata": adapter.additional_metadata,
        }))
        .unwrap();
        let utf16: Vec<u8> = json.encode_utf16().flat_map(u16::to_le_bytes).collect();

        let mut bytes = HEADER.to_vec();
        bytes.extend_from_slice(&(utf16.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&utf16);
        let a = pack_f32(&adapter.weights_a);
        bytes.extend_from_slice(&(a.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&a);
        let b = pack_f32(&adapter.weights_b);
        bytes.extend_from_slice(&(b.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&b);

        assert_eq!(decode(&bytes).unwrap(), adapter);
    }

    #[test]
    fn garbage_metadata_is_a_format_error() {
        let mut bytes = HEADER.to_vec();
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(b"{{{");
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(
            err,
            LoraError::Format(FormatError::InvalidMetadata(_))
        ));
    }
}
