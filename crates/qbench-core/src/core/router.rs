const FNV_OFFSET_BASIS_32: u32 = 0x811c_9dc5;
const FNV_PRIME_32: u32 = 0x0100_0193;

/// 32-bit FNV-1a hash of `bytes`.
#[inline]
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS_32, |hash, &byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME_32)
    })
}

/// Maps a partition key to a lane index in `[0, lane_count)`.
///
/// The hash is masked to 31 bits before the modulo so the result matches a
/// signed 32-bit implementation of the same routing. Empty keys are ordinary
/// keys and always land on the same lane.
///
/// # Panics
/// Panics if `lane_count` is zero; runners validate this before routing.
#[inline]
pub fn route(partition_key: &str, lane_count: usize) -> usize {
    assert!(lane_count > 0, "lane count must be at least 1");
    (fnv1a_32(partition_key.as_bytes()) & 0x7FFF_FFFF) as usize % lane_count
}
