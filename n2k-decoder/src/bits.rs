//! Bit-level field extraction
//!
//! NMEA2000 packs every field least-significant bit first, starting at an
//! arbitrary bit offset and crossing byte boundaries freely. All reads in this
//! module are zero-filled: a bit whose source byte lies past the end of the
//! buffer reads as 0, so short or sparse payloads never abort a decode.

/// Extract `bit_length` bits starting at bit `bit_start` of byte `byte_start`
///
/// Bits are read LSB first and returned right-aligned. `bit_start` may exceed 7,
/// in which case it simply advances into the following bytes. Lengths above 64
/// are clamped to 64.
pub fn extract_bits(data: &[u8], byte_start: usize, bit_start: usize, bit_length: usize) -> u64 {
    let length = bit_length.min(64);
    let mut result: u64 = 0;

    for i in 0..length {
        let bit_pos = bit_start + i;
        let byte_idx = byte_start + bit_pos / 8;
        let bit_in_byte = bit_pos % 8;

        if let Some(byte) = data.get(byte_idx) {
            let bit_value = (byte >> bit_in_byte) & 0x01;
            result |= (bit_value as u64) << i;
        }
    }

    result
}

/// Extract a field addressed by its absolute bit offset within the payload
pub fn extract_at(data: &[u8], bit_offset: usize, bit_length: usize) -> u64 {
    extract_bits(data, bit_offset / 8, bit_offset % 8, bit_length)
}

/// Sign-extend a value from N bits to 64 bits
///
/// If the value's MSB is 1, fill the upper bits with 1s.
pub fn sign_extend(value: u64, bit_length: usize) -> i64 {
    if bit_length == 0 || bit_length >= 64 {
        return value as i64;
    }

    let sign_bit = 1u64 << (bit_length - 1);
    if (value & sign_bit) != 0 {
        let mask = !0u64 << bit_length;
        (value | mask) as i64
    } else {
        value as i64
    }
}

/// All-ones mask covering the low `bit_length` bits
pub fn low_mask(bit_length: usize) -> u64 {
    if bit_length >= 64 {
        u64::MAX
    } else {
        (1u64 << bit_length) - 1
    }
}
