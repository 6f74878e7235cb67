//! Property-based tests for bitstream operations.
//!
//! Uses proptest to check that BitReader reads back exactly what BitWriter
//! packed, including mixed-width header layouts.

use proptest::prelude::*;
use theoraenc_core::bitstream::{BitReader, BitWriter};

// =============================================================================
// BitReader/BitWriter Round-Trip Tests
// =============================================================================

proptest! {
    /// Arbitrary widths read back the masked value.
    #[test]
    fn roundtrip_bits_variable_width(value in any::<u32>(), width in 1u8..=32) {
        let masked_value = if width == 32 { value } else { value & ((1u32 << width) - 1) };

        let mut writer = BitWriter::new();
        writer.write_bits(value, width).unwrap();
        writer.align_to_byte().unwrap();

        let mut reader = BitReader::new(writer.data());
        prop_assert_eq!(reader.read_bits(width).unwrap(), masked_value);
    }

    /// A sequence of fields laid out like a frame header survives packing.
    #[test]
    fn roundtrip_field_sequence(fields in prop::collection::vec((any::<u32>(), 1u8..=24), 1..40)) {
        let mut writer = BitWriter::new();
        for &(value, width) in &fields {
            writer.write_bits(value, width).unwrap();
        }
        let total: usize = fields.iter().map(|&(_, w)| w as usize).sum();
        prop_assert_eq!(writer.position(), total);
        prop_assert_eq!(writer.bytes_written(), total.div_ceil(8));

        let mut reader = BitReader::new(writer.data());
        for &(value, width) in &fields {
            let expected = value & ((1u32 << width) - 1);
            prop_assert_eq!(reader.read_bits(width).unwrap(), expected);
        }
    }

    /// Raw byte runs written at any bit offset come back intact.
    #[test]
    fn roundtrip_bytes_at_offset(prefix in 0u8..8, bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let mut writer = BitWriter::new();
        writer.write_bits(0, prefix).unwrap();
        writer.write_bytes(&bytes).unwrap();
        writer.align_to_byte().unwrap();

        let mut reader = BitReader::new(writer.data());
        reader.skip(prefix as usize).unwrap();
        for &b in &bytes {
            prop_assert_eq!(reader.read_u8().unwrap(), b);
        }
    }

    /// 64-bit granule-sized values round-trip.
    #[test]
    fn roundtrip_bits_u64(value in any::<u64>()) {
        let mut writer = BitWriter::new();
        writer.write_bits_u64(value, 64).unwrap();

        let mut reader = BitReader::new(writer.data());
        prop_assert_eq!(reader.read_bits_u64(64).unwrap(), value);
    }
}

// =============================================================================
// BitReader Edge Cases
// =============================================================================

proptest! {
    /// Reads never run past the end of the buffer.
    #[test]
    fn reader_stops_at_end(data in prop::collection::vec(any::<u8>(), 0..16), width in 1u8..=32) {
        let mut reader = BitReader::new(&data);
        let mut consumed = 0usize;
        while reader.read_bits(width).is_ok() {
            consumed += width as usize;
        }
        prop_assert!(consumed <= data.len() * 8);
        prop_assert!(reader.remaining_bits() < width as usize);
    }

    /// Peeking does not advance the reader.
    #[test]
    fn peek_is_non_consuming(data in prop::collection::vec(any::<u8>(), 4..16), width in 1u8..=32) {
        let reader = BitReader::new(&data);
        let peeked = reader.peek_bits(width).unwrap();
        let mut reader2 = reader.clone();
        prop_assert_eq!(reader2.read_bits(width).unwrap(), peeked);
        prop_assert_eq!(reader.position(), 0);
    }
}
