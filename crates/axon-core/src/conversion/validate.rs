//! Cheap structural checks on freshly exported artifacts.

use crate::config::ConversionConfig;
use crate::error::{AxonError, Result};
use std::io::Read;
use std::path::Path;

/// Check that `path` exists, clears the size floor and starts with a
/// plausible protobuf field tag. Returns the file size.
pub fn validate_artifact(path: &Path) -> Result<u64> {
    let corrupt = |message: String| AxonError::ArtifactCorrupt {
        path: path.to_path_buf(),
        message,
    };

    let metadata = std::fs::metadata(path).map_err(|e| corrupt(format!("not readable: {}", e)))?;
    let size = metadata.len();
    if size < ConversionConfig::MIN_ARTIFACT_BYTES {
        return Err(corrupt(format!("only {} bytes, likely truncated", size)));
    }

    let mut header = [0u8; ConversionConfig::HEADER_PROBE_BYTES];
    std::fs::File::open(path)
        .and_then(|mut f| f.read_exact(&mut header))
        .map_err(|e| corrupt(format!("header unreadable: {}", e)))?;
    if !has_plausible_header(&header) {
        return Err(corrupt(format!(
            "first byte {:#04x} is not a valid field tag",
            header[0]
        )));
    }
    Ok(size)
}

/// Whether the first byte is a field tag with a valid wire type
/// (varint, 64-bit, length-delimited, group start/end, 32-bit).
pub fn has_plausible_header(header: &[u8]) -> bool {
    match header.first() {
        Some(&tag) => tag >> 3 != 0 && tag & 0x07 <= 5,
        None => false,
    }
}
