//! Huffman code tables for the setup header.
//!
//! Theora carries 80 code tables of 32 tokens each (16 for DC and 16 for
//! each of four AC coefficient groups). Each table is sent as its code tree
//! in pre-order: a 0 bit for an internal node, a 1 bit followed by the 5-bit
//! token for a leaf.

use crate::error::{Result, TheoraError};
use theoraenc_core::BitWriter;

/// Number of code tables in the setup header.
pub const NUM_HUFFMAN_TABLES: usize = 80;

/// Number of tokens per table.
pub const NUM_TOKENS: usize = 32;

/// Longest code Theora allows.
pub const MAX_CODE_LENGTH: u8 = 32;

/// Tokens ordered from most to least likely in DC tables.
const DC_TOKEN_RANK: [u8; NUM_TOKENS] = [
    0, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 1, 2, 3, 4, 5, 6, 7, 8, 24, 25,
    26, 27, 28, 29, 30, 31,
];

/// Tokens ordered from most to least likely in AC tables.
const AC_TOKEN_RANK: [u8; NUM_TOKENS] = [
    0, 7, 9, 10, 24, 11, 12, 1, 13, 14, 25, 8, 15, 16, 17, 18, 2, 19, 20, 21, 22, 23, 26, 27, 28,
    29, 30, 31, 3, 4, 5, 6,
];

/// Code lengths by rank: 2x3, 4x4, 6x5 and 20x6 bits.
const RANKED_LENGTHS: [u8; NUM_TOKENS] = [
    3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 5, 5, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6,
];

/// One token's code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HuffmanCode {
    /// Code bits, right-aligned.
    pub code: u32,
    /// Code length in bits.
    pub len: u8,
}

/// A complete prefix code over the 32 tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuffmanTable {
    codes: [HuffmanCode; NUM_TOKENS],
}

impl HuffmanTable {
    /// Build the canonical code for the given per-token lengths.
    ///
    /// The lengths must describe a complete prefix code.
    pub fn from_lengths(lengths: &[u8; NUM_TOKENS]) -> Result<Self> {
        if lengths.iter().any(|&len| len == 0 || len > MAX_CODE_LENGTH) {
            return Err(TheoraError::InvalidArgument(
                "Huffman code lengths must be in 1..=32".into(),
            ));
        }
        // Kraft sum scaled by 2^32
        let kraft: u64 = lengths.iter().map(|&len| 1u64 << (32 - len)).sum();
        if kraft != 1 << 32 {
            return Err(TheoraError::InvalidArgument(
                "Huffman code lengths do not form a complete code".into(),
            ));
        }

        let mut order: Vec<usize> = (0..NUM_TOKENS).collect();
        order.sort_by_key(|&token| (lengths[token], token));

        let mut codes = [HuffmanCode::default(); NUM_TOKENS];
        let mut code = 0u64;
        let mut prev_len = lengths[order[0]];
        for &token in &order {
            let len = lengths[token];
            code <<= len - prev_len;
            codes[token] = HuffmanCode {
                code: code as u32,
                len,
            };
            code += 1;
            prev_len = len;
        }
        Ok(Self { codes })
    }

    /// Serialize the code tree in pre-order.
    pub fn write_tree(&self, writer: &mut BitWriter) -> Result<()> {
        self.write_node(writer, 0, 0)
    }

    fn write_node(&self, writer: &mut BitWriter, prefix: u32, depth: u8) -> Result<()> {
        if let Some(token) = self
            .codes
            .iter()
            .position(|c| c.len == depth && c.code == prefix)
        {
            writer.write_bit(true)?;
            writer.write_bits(token as u32, 5)?;
            return Ok(());
        }
        if depth >= MAX_CODE_LENGTH {
            return Err(TheoraError::Encode("Huffman tree deeper than 32".into()));
        }
        writer.write_bit(false)?;
        self.write_node(writer, prefix << 1, depth + 1)?;
        self.write_node(writer, (prefix << 1) | 1, depth + 1)
    }
}

/// The full set of code tables sent in the setup header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuffmanSet {
    tables: Vec<HuffmanTable>,
}

impl HuffmanSet {
    /// Default tables: one shape for the DC group, another for the AC groups.
    pub fn vp3_default() -> Result<Self> {
        let dc = HuffmanTable::from_lengths(&lengths_for(&DC_TOKEN_RANK))?;
        let ac = HuffmanTable::from_lengths(&lengths_for(&AC_TOKEN_RANK))?;
        let tables = (0..NUM_HUFFMAN_TABLES)
            .map(|i| if i < 16 { dc.clone() } else { ac.clone() })
            .collect();
        Ok(Self { tables })
    }

    /// Table `index` (0..80).
    pub fn table(&self, index: usize) -> &HuffmanTable {
        &self.tables[index % NUM_HUFFMAN_TABLES]
    }

    /// Write all 80 trees.
    pub fn write(&self, writer: &mut BitWriter) -> Result<()> {
        for table in &self.tables {
            table.write_tree(writer)?;
        }
        Ok(())
    }
}

fn lengths_for(rank: &[u8; NUM_TOKENS]) -> [u8; NUM_TOKENS] {
    let mut lengths = [0u8; NUM_TOKENS];
    for (position, &token) in rank.iter().enumerate() {
        lengths[token as usize] = RANKED_LENGTHS[position];
    }
    lengths
}

#[cfg(test)]
mod tests {
    use super::*;
    use theoraenc_core::BitReader;

    fn read_tree(reader: &mut BitReader<'_>, prefix: u32, depth: u8, out: &mut Vec<(usize, HuffmanCode)>) {
        if reader.read_bit().unwrap() {
            let token = reader.read_bits(5).unwrap() as usize;
            out.push((token, HuffmanCode { code: prefix, len: depth }));
        } else {
            read_tree(reader, prefix << 1, depth + 1, out);
            read_tree(reader, (prefix << 1) | 1, depth + 1, out);
        }
    }

    #[test]
    fn test_rank_tables_are_permutations() {
        for rank in [&DC_TOKEN_RANK, &AC_TOKEN_RANK] {
            let mut seen = [false; NUM_TOKENS];
            for &token in rank.iter() {
                assert!(!seen[token as usize]);
                seen[token as usize] = true;
            }
        }
    }

    #[test]
    fn test_incomplete_code_rejected() {
        let mut lengths = [5u8; NUM_TOKENS];
        assert!(HuffmanTable::from_lengths(&lengths).is_ok());
        lengths[0] = 6;
        assert!(HuffmanTable::from_lengths(&lengths).is_err());
        lengths[0] = 0;
        assert!(HuffmanTable::from_lengths(&lengths).is_err());
    }

    #[test]
    fn test_codes_are_prefix_free() {
        let table = HuffmanTable::from_lengths(&lengths_for(&AC_TOKEN_RANK)).unwrap();
        for a in 0..NUM_TOKENS {
            for b in 0..NUM_TOKENS {
                if a == b {
                    continue;
                }
                let (ca, cb) = (table.codes[a], table.codes[b]);
                if ca.len <= cb.len {
                    assert_ne!(cb.code >> (cb.len - ca.len), ca.code, "{a} prefixes {b}");
                }
            }
        }
        assert_eq!(table.codes[0].len, 3);
    }

    #[test]
    fn test_tree_round_trip() {
        let table = HuffmanTable::from_lengths(&lengths_for(&DC_TOKEN_RANK)).unwrap();
        let mut writer = BitWriter::new();
        table.write_tree(&mut writer).unwrap();
        // 31 internal nodes + 32 leaves of 6 bits
        assert_eq!(writer.position(), 31 + 32 * 6);

        let mut reader = BitReader::new(writer.data());
        let mut leaves = Vec::new();
        read_tree(&mut reader, 0, 0, &mut leaves);
        assert_eq!(leaves.len(), NUM_TOKENS);
        for (token, code) in leaves {
            assert_eq!(table.codes[token], code);
        }
    }

    #[test]
    fn test_default_set_size() {
        let set = HuffmanSet::vp3_default().unwrap();
        let mut writer = BitWriter::new();
        set.write(&mut writer).unwrap();
        assert_eq!(writer.position(), NUM_HUFFMAN_TABLES * (31 + 32 * 6));
        assert_ne!(set.table(0), set.table(16));
    }
}
