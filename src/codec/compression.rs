//! Gzip compression for frame payloads.
//!
//! The frame encoder calls [`maybe_compress`] on every outbound payload. The
//! compressed form is only adopted when it is strictly smaller than the
//! original; otherwise the payload goes out as-is and the COMPRESSED flag
//! stays clear. There is no marker byte: the header flag is the only signal.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{CommsError, Result};

/// Compress `data` if it is larger than `threshold` and compression pays off.
///
/// Returns `Ok(None)` when the caller should send the original bytes.
///
/// # Errors
///
/// Returns `CommsError::Compression` if gzip encoding fails.
pub fn maybe_compress(data: &[u8], threshold: usize) -> Result<Option<Vec<u8>>> {
    if data.len() <= threshold {
        return Ok(None);
    }

    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len()), Compression::fast());
    encoder
        .write_all(data)
        .map_err(|e| CommsError::Compression(format!("gzip write failed: {e}")))?;
    let compressed = encoder
        .finish()
        .map_err(|e| CommsError::Compression(format!("gzip finish failed: {e}")))?;

    if compressed.len() < data.len() {
        Ok(Some(compressed))
    } else {
        Ok(None)
    }
}

/// Decompress a gzip payload, refusing output larger than `max_size`.
///
/// # Errors
///
/// Returns `CommsError::Compression` on malformed input and
/// `CommsError::PayloadTooLarge` when the output would exceed `max_size`.
pub fn decompress(data: &[u8], max_size: usize) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data).take(max_size as u64 + 1);
    let mut out = Vec::with_capacity(data.len().saturating_mul(2).min(max_size));
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CommsError::Compression(format!("gzip decompress failed: {e}")))?;

    if out.len() > max_size {
        return Err(CommsError::PayloadTooLarge {
            size: out.len(),
            max: max_size,
        });
    }
    Ok(out)
}
