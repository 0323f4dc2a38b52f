//! dBASE (DBF) table reader
//!
//! Layout: 32-byte file header, 32-byte field descriptors terminated by 0x0D,
//! then fixed-width records each prefixed by a deletion flag. All values are
//! surfaced as ISO-8859-1 text; typing is left to downstream models.

use std::io::Read;

use crate::error::{ConvertError, Result};

const HEADER_LEN: usize = 32;
const DESCRIPTOR_LEN: usize = 32;
const DESCRIPTOR_END: u8 = 0x0D;
const END_OF_FILE: u8 = 0x1A;
const DELETED: u8 = b'*';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbfField {
    pub name: String,
    pub kind: char,
    pub length: usize,
    pub decimals: u8,
}

/// Streaming reader yielding one row of optional text values per record.
pub struct DbfReader<R> {
    reader: R,
    fields: Vec<DbfField>,
    record_len: usize,
    remaining: u32,
    buf: Vec<u8>,
}

impl<R: Read> DbfReader<R> {
    pub fn new(mut reader: R) -> Result<Self> {
        let mut header = [0u8; HEADER_LEN];
        reader
            .read_exact(&mut header)
            .map_err(|e| ConvertError::decode(format!("DBF header: {e}")))?;

        let record_count = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        let header_len = usize::from(u16::from_le_bytes([header[8], header[9]]));
        let record_len = usize::from(u16::from_le_bytes([header[10], header[11]]));
        if header_len < HEADER_LEN + 1 {
            return Err(ConvertError::decode(format!(
                "DBF header length {header_len} too small"
            )));
        }

        let mut rest = vec![0u8; header_len - HEADER_LEN];
        reader
            .read_exact(&mut rest)
            .map_err(|e| ConvertError::decode(format!("DBF field descriptors: {e}")))?;

        let fields = parse_descriptors(&rest)?;
        let width: usize = 1 + fields.iter().map(|f| f.length).sum::<usize>();
        if width != record_len {
            return Err(ConvertError::decode(format!(
                "DBF record length {record_len} does not match field widths {width}"
            )));
        }

        Ok(Self {
            reader,
            fields,
            record_len,
            remaining: record_count,
            buf: vec![0u8; record_len],
        })
    }

    pub fn fields(&self) -> &[DbfField] {
        &self.fields
    }

    pub fn column_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    fn read_record(&mut self) -> Result<Option<Vec<Option<String>>>> {
        loop {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;

            self.reader.read_exact(&mut self.buf[..1])?;
            if self.buf[0] == END_OF_FILE {
                self.remaining = 0;
                return Ok(None);
            }
            self.reader
                .read_exact(&mut self.buf[1..self.record_len])
                .map_err(|e| ConvertError::decode(format!("truncated DBF record: {e}")))?;
            if self.buf[0] == DELETED {
                continue;
            }

            let mut offset = 1;
            let mut row = Vec::with_capacity(self.fields.len());
            for field in &self.fields {
                row.push(latin1_value(&self.buf[offset..offset + field.length]));
                offset += field.length;
            }
            return Ok(Some(row));
        }
    }
}

impl<R: Read> Iterator for DbfReader<R> {
    type Item = Result<Vec<Option<String>>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_record() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => None,
            Err(e) => {
                self.remaining = 0;
                Some(Err(e))
            }
        }
    }
}

fn parse_descriptors(bytes: &[u8]) -> Result<Vec<DbfField>> {
    let mut fields = Vec::new();
    let mut offset = 0;
    loop {
        match bytes.get(offset) {
            Some(&DESCRIPTOR_END) => break,
            None => return Err(ConvertError::decode("DBF descriptor terminator missing")),
            Some(_) => {}
        }
        let desc = bytes
            .get(offset..offset + DESCRIPTOR_LEN)
            .ok_or_else(|| ConvertError::decode("truncated DBF field descriptor"))?;

        let name_end = desc[..11].iter().position(|&b| b == 0).unwrap_or(11);
        fields.push(DbfField {
            name: latin1(&desc[..name_end]).trim().to_string(),
            kind: char::from(desc[11]),
            length: usize::from(desc[16]),
            decimals: desc[17],
        });
        offset += DESCRIPTOR_LEN;
    }
    if fields.is_empty() {
        return Err(ConvertError::decode("DBF has no fields"));
    }
    Ok(fields)
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Padding trimmed; blank becomes `None`.
fn latin1_value(bytes: &[u8]) -> Option<String> {
    let text = latin1(bytes);
    let trimmed = text.trim_matches(|c: char| c == ' ' || c == '\0');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Build a DBF image with character fields. `rows` pairs each row's values
/// with its deletion flag.
#[cfg(any(test, feature = "test-support"))]
pub fn build_dbf(fields: &[(&str, usize)], rows: &[(Vec<&str>, bool)]) -> Vec<u8> {
    let header_len = HEADER_LEN + DESCRIPTOR_LEN * fields.len() + 1;
    let record_len = 1 + fields.iter().map(|(_, len)| len).sum::<usize>();

    let mut out = vec![0u8; HEADER_LEN];
    out[0] = 0x03;
    out[4..8].copy_from_slice(&(rows.len() as u32).to_le_bytes());
    out[8..10].copy_from_slice(&(header_len as u16).to_le_bytes());
    out[10..12].copy_from_slice(&(record_len as u16).to_le_bytes());

    for (name, len) in fields {
        let mut desc = [0u8; DESCRIPTOR_LEN];
        desc[..name.len()].copy_from_slice(name.as_bytes());
        desc[11] = b'C';
        desc[16] = *len as u8;
        out.extend_from_slice(&desc);
    }
    out.push(DESCRIPTOR_END);

    for (values, deleted) in rows {
        out.push(if *deleted { DELETED } else { b' ' });
        for ((_, len), value) in fields.iter().zip(values.iter()) {
            let mut cell: Vec<u8> = value.chars().map(|c| c as u32 as u8).collect();
            cell.resize(*len, b' ');
            out.extend_from_slice(&cell);
        }
    }
    out.push(END_OF_FILE);
    out
}
