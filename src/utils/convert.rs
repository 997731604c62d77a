use crate::Result;
use crate::StorageError;

/// Converts a `u64` to an 8-byte array in big-endian byte order, so that sled's
/// lexicographic key order equals numeric order.
///
/// # Examples
/// ```
/// use d_config::convert::safe_kv;
///
/// let bytes = safe_kv(0x1234_5678_9ABC_DEF0);
/// assert_eq!(bytes, [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0]);
/// ```
pub const fn safe_kv(num: u64) -> [u8; 8] {
    num.to_be_bytes()
}

/// Decodes the big-endian `u64` at the start of `bytes`
pub fn safe_vk<K: AsRef<[u8]>>(bytes: K) -> Result<u64> {
    let bytes = bytes.as_ref();
    let prefix: [u8; 8] = bytes
        .get(..8)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| StorageError::DataCorruption {
            location: format!("u64 key of length {}", bytes.len()),
        })?;
    Ok(u64::from_be_bytes(prefix))
}

/// Composite key `(high, low)` ordered by `high` first
pub fn composite_key(
    high: u64,
    low: u64,
) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&safe_kv(high));
    key[8..].copy_from_slice(&safe_kv(low));
    key
}

/// Splits a key built by [`composite_key`]
pub fn split_composite_key<K: AsRef<[u8]>>(bytes: K) -> Result<(u64, u64)> {
    let bytes = bytes.as_ref();
    if bytes.len() != 16 {
        return Err(StorageError::DataCorruption {
            location: format!("composite key of length {}", bytes.len()),
        }
        .into());
    }
    Ok((safe_vk(&bytes[..8])?, safe_vk(&bytes[8..])?))
}
