//! Element encoding for the in-crate stores
//!
//! Values are stored as little-endian `f64` and compressed with c-blosc
//! (`blosclz`, byte shuffle), one blosc frame per tile or chunk.

use std::ffi::{c_char, c_int, c_void};

use blosc_src::{
    blosc_cbuffer_sizes, blosc_compress_ctx, blosc_decompress_ctx, BLOSC_BLOSCLZ_COMPNAME,
    BLOSC_MAX_OVERHEAD,
};

use super::{StoreError, StoreResult};

const F64_SIZE: usize = std::mem::size_of::<f64>();

/// Compressor name recorded in store metadata
pub const COMPRESSOR: &str = "blosclz";

/// Compression level used by the in-crate stores
pub const LEVEL: u8 = 4;

/// Largest input one blosc frame can hold, in bytes
pub const MAX_BUFFER_BYTES: u64 = i32::MAX as u64 - BLOSC_MAX_OVERHEAD as u64;

const BYTE_SHUFFLE: c_int = 1;

pub fn encode_f64(values: &[f64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * F64_SIZE);
    for value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

pub fn decode_f64(bytes: &[u8]) -> StoreResult<Vec<f64>> {
    if bytes.len() % F64_SIZE != 0 {
        return Err(StoreError::Format(format!(
            "{} bytes is not a whole number of f64 values",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(F64_SIZE)
        .map(|chunk| {
            let mut raw = [0u8; F64_SIZE];
            raw.copy_from_slice(chunk);
            f64::from_le_bytes(raw)
        })
        .collect())
}

/// Encode and compress `values` into one blosc frame
pub fn compress(values: &[f64], level: u8) -> StoreResult<Vec<u8>> {
    let src = encode_f64(values);
    if src.len() as u64 > MAX_BUFFER_BYTES {
        return Err(StoreError::Unsupported(format!(
            "{} bytes exceeds the blosc buffer limit of {} bytes",
            src.len(),
            MAX_BUFFER_BYTES
        )));
    }

    let capacity = src.len() + BLOSC_MAX_OVERHEAD as usize;
    let mut dest: Vec<u8> = Vec::with_capacity(capacity);
    // SAFETY: `src` is valid for `src.len()` bytes, `dest` has room for
    // `capacity` bytes and the compressor name is NUL-terminated.
    let written = unsafe {
        blosc_compress_ctx(
            c_int::from(level),
            BYTE_SHUFFLE,
            F64_SIZE,
            src.len(),
            src.as_ptr().cast::<c_void>(),
            dest.as_mut_ptr().cast::<c_void>(),
            capacity,
            BLOSC_BLOSCLZ_COMPNAME.as_ptr().cast::<c_char>(),
            0,
            1,
        )
    };
    if written <= 0 {
        return Err(StoreError::Backend(format!(
            "blosc compression failed with code {}",
            written
        )));
    }
    // SAFETY: blosc initialised the first `written` bytes.
    unsafe { dest.set_len(written as usize) };
    Ok(dest)
}

/// Decompress a frame holding exactly `num_values` values
pub fn decompress(frame: &[u8], num_values: usize) -> StoreResult<Vec<f64>> {
    if frame.len() < BLOSC_MAX_OVERHEAD as usize {
        return Err(StoreError::Format(format!(
            "blosc frame of {} bytes is shorter than its header",
            frame.len()
        )));
    }

    let expected = num_values * F64_SIZE;
    let (mut nbytes, mut cbytes, mut blocksize) = (0usize, 0usize, 0usize);
    // SAFETY: the frame holds at least a full blosc header.
    unsafe {
        blosc_cbuffer_sizes(
            frame.as_ptr().cast::<c_void>(),
            &mut nbytes,
            &mut cbytes,
            &mut blocksize,
        )
    };
    if nbytes != expected || cbytes > frame.len() {
        return Err(StoreError::Format(format!(
            "blosc frame holds {} bytes, expected {}",
            nbytes, expected
        )));
    }

    let mut dest: Vec<u8> = Vec::with_capacity(expected);
    // SAFETY: `dest` has room for `expected` bytes, which the header says
    // is the decompressed size.
    let read = unsafe {
        blosc_decompress_ctx(
            frame.as_ptr().cast::<c_void>(),
            dest.as_mut_ptr().cast::<c_void>(),
            expected,
            1,
        )
    };
    if read < 0 || read as usize != expected {
        return Err(StoreError::Backend(format!(
            "blosc decompression failed with code {}",
            read
        )));
    }
    // SAFETY: blosc initialised `expected` bytes.
    unsafe { dest.set_len(expected) };
    decode_f64(&dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_roundtrip_is_exact() {
        let values: Vec<f64> = (0..1000).map(|i| (i as f64).sin()).collect();
        let frame = compress(&values, LEVEL).unwrap();
        assert_eq!(decompress(&frame, values.len()).unwrap(), values);
    }

    #[test]
    fn test_constant_data_compresses() {
        let values = vec![1.5; 4096];
        let frame = compress(&values, LEVEL).unwrap();
        assert!(frame.len() < values.len() * F64_SIZE);
    }

    #[test]
    fn test_decompress_rejects_wrong_length() {
        let frame = compress(&[1.0, 2.0, 3.0], LEVEL).unwrap();
        assert!(decompress(&frame, 4).is_err());
        assert!(decompress(&frame[..4], 3).is_err());
    }

    #[test]
    fn test_decode_rejects_partial_values() {
        assert!(decode_f64(&[0u8; 7]).is_err());
    }
}
