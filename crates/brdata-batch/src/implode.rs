//! PKWare DCL "implode" decompressor
//!
//! DATASUS `.dbc` files wrap their DBF records in this format. The stream is a
//! two-byte header (literal coding flag, dictionary size) followed by
//! LSB-first bit-packed literals and (length, distance) matches against a
//! 4 KiB sliding window. Codes are canonical Huffman with fixed tables.

use std::io::Write;

use crate::error::ConvertError;

const MAXBITS: usize = 13;
const MAXWIN: usize = 4096;
const END_OF_STREAM: usize = 519;

/// Compact code-length tables: each byte is `(repeat - 1) << 4 | length`.
const LITERAL_LENGTHS: [u8; 98] = [
    11, 124, 8, 7, 28, 7, 188, 13, 76, 4, 10, 8, 12, 10, 12, 10, 8, 23, 8, 9, 7, 6, 7, 8, 7, 6,
    55, 8, 23, 24, 12, 11, 7, 9, 11, 12, 6, 7, 22, 5, 7, 24, 6, 11, 9, 6, 7, 22, 7, 11, 38, 7, 9,
    8, 25, 11, 8, 11, 9, 12, 8, 12, 5, 38, 5, 38, 5, 11, 7, 5, 6, 21, 6, 10, 53, 8, 7, 24, 10, 27,
    44, 253, 253, 253, 252, 252, 252, 13, 12, 45, 12, 45, 12, 61, 12, 45, 44, 173,
];
const LENGTH_LENGTHS: [u8; 6] = [2, 35, 36, 53, 38, 23];
const DISTANCE_LENGTHS: [u8; 7] = [2, 20, 53, 230, 247, 151, 248];

const LENGTH_BASE: [usize; 16] = [3, 2, 4, 5, 6, 7, 8, 9, 10, 12, 16, 24, 40, 72, 136, 264];
const LENGTH_EXTRA: [u32; 16] = [0, 0, 0, 0, 0, 0, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8];

struct Huffman {
    count: [u16; MAXBITS + 1],
    symbol: Vec<u16>,
}

impl Huffman {
    fn construct(rep: &[u8]) -> Self {
        let lengths: Vec<usize> = rep
            .iter()
            .flat_map(|b| std::iter::repeat((b & 15) as usize).take(((b >> 4) + 1) as usize))
            .collect();

        let mut count = [0u16; MAXBITS + 1];
        for &len in &lengths {
            count[len] += 1;
        }

        let mut offs = [0u16; MAXBITS + 1];
        for len in 1..MAXBITS {
            offs[len + 1] = offs[len] + count[len];
        }

        let mut symbol = vec![0u16; lengths.len()];
        for (sym, &len) in lengths.iter().enumerate() {
            if len != 0 {
                symbol[offs[len] as usize] = sym as u16;
                offs[len] += 1;
            }
        }

        Self { count, symbol }
    }
}

struct BitReader<'a> {
    input: &'a [u8],
    pos: usize,
    bitbuf: u32,
    bitcnt: u32,
}

impl<'a> BitReader<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            pos: 0,
            bitbuf: 0,
            bitcnt: 0,
        }
    }

    fn bits(&mut self, need: u32) -> Result<u32, ConvertError> {
        let mut val = self.bitbuf;
        while self.bitcnt < need {
            let byte = *self
                .input
                .get(self.pos)
                .ok_or_else(|| ConvertError::decode("implode stream truncated"))?;
            self.pos += 1;
            val |= u32::from(byte) << self.bitcnt;
            self.bitcnt += 8;
        }
        self.bitbuf = val >> need;
        self.bitcnt -= need;
        Ok(val & ((1u32 << need) - 1))
    }

    /// Codes are stored bit-inverted.
    fn decode(&mut self, h: &Huffman) -> Result<usize, ConvertError> {
        let mut code: i32 = 0;
        let mut first: i32 = 0;
        let mut index: i32 = 0;
        for len in 1..=MAXBITS {
            code |= (self.bits(1)? ^ 1) as i32;
            let count = i32::from(h.count[len]);
            if code < first + count {
                return Ok(usize::from(h.symbol[(index + code - first) as usize]));
            }
            index += count;
            first += count;
            first <<= 1;
            code <<= 1;
        }
        Err(ConvertError::decode("invalid Huffman code in implode stream"))
    }
}

/// Decompress an imploded stream into `out`. Returns the number of bytes written.
pub fn explode<W: Write>(input: &[u8], out: &mut W) -> Result<u64, ConvertError> {
    let literals = Huffman::construct(&LITERAL_LENGTHS);
    let lengths = Huffman::construct(&LENGTH_LENGTHS);
    let distances = Huffman::construct(&DISTANCE_LENGTHS);

    let mut reader = BitReader::new(input);
    let coded_literals = reader.bits(8)?;
    if coded_literals > 1 {
        return Err(ConvertError::decode(format!(
            "invalid literal flag {coded_literals}"
        )));
    }
    let dict = reader.bits(8)?;
    if !(4..=6).contains(&dict) {
        return Err(ConvertError::decode(format!(
            "invalid dictionary size {dict}"
        )));
    }

    let mut window = vec![0u8; MAXWIN];
    let mut next = 0usize;
    let mut wrapped = false;
    let mut written = 0u64;

    loop {
        if reader.bits(1)? == 1 {
            let sym = reader.decode(&lengths)?;
            let len = LENGTH_BASE[sym] + reader.bits(LENGTH_EXTRA[sym])? as usize;
            if len == END_OF_STREAM {
                break;
            }

            let shift = if len == 2 { 2 } else { dict };
            let dist = (reader.decode(&distances)? << shift) + reader.bits(shift)? as usize + 1;
            if !wrapped && dist > next {
                return Err(ConvertError::decode("match distance too far back"));
            }

            for _ in 0..len {
                window[next] = window[(next + MAXWIN - dist) % MAXWIN];
                next += 1;
                if next == MAXWIN {
                    out.write_all(&window)?;
                    written += MAXWIN as u64;
                    next = 0;
                    wrapped = true;
                }
            }
        } else {
            let symbol = if coded_literals == 1 {
                reader.decode(&literals)? as u8
            } else {
                reader.bits(8)? as u8
            };
            window[next] = symbol;
            next += 1;
            if next == MAXWIN {
                out.write_all(&window)?;
                written += MAXWIN as u64;
                next = 0;
                wrapped = true;
            }
        }
    }

    out.write_all(&window[..next])?;
    written += next as u64;
    Ok(written)
}

/// Literal-only imploder, enough to build fixtures.
#[cfg(any(test, feature = "test-support"))]
pub(crate) fn implode_literals(data: &[u8]) -> Vec<u8> {
    fn put(bits: &mut Vec<u8>, value: u32, n: u32) {
        for i in 0..n {
            bits.push(((value >> i) & 1) as u8);
        }
    }

    let mut bits: Vec<u8> = Vec::new();
    put(&mut bits, 0, 8);
    put(&mut bits, 4, 8);
    for &byte in data {
        put(&mut bits, 0, 1);
        put(&mut bits, u32::from(byte), 8);
    }
    // end-of-stream: length symbol 15 with all extra bits set
    put(&mut bits, 1, 1);
    put(&mut bits, 0, 7);
    put(&mut bits, 255, 8);
    while bits.len() % 8 != 0 {
        bits.push(0);
    }
    bits.chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |acc, (i, bit)| acc | (*bit << i))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_stream() {
        let input = [0x00, 0x04, 0x82, 0x24, 0x25, 0x8f, 0x80, 0x7f];
        let mut out = Vec::new();
        let n = explode(&input, &mut out).unwrap();
        assert_eq!(out, b"AIAIAIAIAIAIA");
        assert_eq!(n, 13);
    }

    #[test]
    fn test_literal_fixture() {
        let stream = implode_literals(b"hello world");
        let hex: String = stream.iter().map(|b| format!("{b:02x}")).collect();
        assert_eq!(hex, "0004d09461c3e60d883b6fe4b0210bf807");

        let mut out = Vec::new();
        explode(&stream, &mut out).unwrap();
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn test_output_larger_than_window() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut out = Vec::new();
        explode(&implode_literals(&data), &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_truncated_stream() {
        let stream = implode_literals(b"hello world");
        let mut out = Vec::new();
        let err = explode(&stream[..6], &mut out).unwrap_err();
        assert!(matches!(err, ConvertError::Decode(_)));
    }

    #[test]
    fn test_bad_header() {
        let mut out = Vec::new();
        assert!(explode(&[0x02, 0x04, 0x00], &mut out).is_err());
        assert!(explode(&[0x00, 0x07, 0x00], &mut out).is_err());
    }
}
