#[inline]
pub(crate) fn calculate_checksum(data: &[u8]) -> u16 {
    let mut checksum = 0u16;

    for byte in data {
        checksum = checksum.wrapping_add(*byte as u16);
    }

    checksum
}
