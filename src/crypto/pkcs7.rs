//! PKCS7 block padding

use crate::error::CryptoError;

/// AES block size in bytes
pub const AES_BLOCK_SIZE: usize = 16;

/// Pad `data` to a multiple of `block_size`.
///
/// Always appends between 1 and `block_size` bytes, each holding the pad length.
pub fn pad(data: &[u8], block_size: usize) -> Vec<u8> {
    debug_assert!((1..=255).contains(&block_size));

    let pad_len = block_size - data.len() % block_size;
    let mut padded = Vec::with_capacity(data.len() + pad_len);
    padded.extend_from_slice(data);
    padded.resize(data.len() + pad_len, pad_len as u8);
    padded
}

/// Strip PKCS7 padding produced with `block_size`.
///
/// The pad length must lie in `[1, block_size]` and every pad byte must carry it.
pub fn unpad(data: &[u8], block_size: usize) -> Result<&[u8], CryptoError> {
    let pad_len = *data.last().ok_or(CryptoError::Padding)? as usize;
    if pad_len == 0 || pad_len > block_size || pad_len > data.len() {
        return Err(CryptoError::Padding);
    }

    let (body, padding) = data.split_at(data.len() - pad_len);
    if padding.iter().any(|&b| b as usize != pad_len) {
        return Err(CryptoError::Padding);
    }

    Ok(body)
}
