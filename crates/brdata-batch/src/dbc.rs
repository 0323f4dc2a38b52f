// DBC → DBF decode pass
//
// A .dbc file is a DBF header, four CRC bytes, and the imploded record area.
// The decoded DBF is materialized in full on local disk before any batching.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{ConvertError, Result};
use crate::implode::explode;

const CRC_LEN: usize = 4;

/// Decode a DBC image into a DBF byte stream.
pub fn decode_dbc<W: Write>(dbc: &[u8], out: &mut W) -> Result<u64> {
    if dbc.len() < 10 {
        return Err(ConvertError::decode("DBC file too short"));
    }
    let header_len = usize::from(u16::from_le_bytes([dbc[8], dbc[9]]));
    let body = header_len + CRC_LEN;
    if dbc.len() < body {
        return Err(ConvertError::decode(format!(
            "DBC header claims {header_len} bytes, file has {}",
            dbc.len()
        )));
    }

    out.write_all(&dbc[..header_len])?;
    let records = explode(&dbc[body..], out)?;
    Ok(header_len as u64 + records)
}

/// Decode `source` into a temporary DBF file.
///
/// The file is deleted when the returned handle is dropped. On decode failure
/// it is deleted before returning.
pub fn decode_to_temp(source: &Path, temp_dir: Option<&Path>) -> Result<NamedTempFile> {
    let dbc = std::fs::read(source)?;
    let temp = match temp_dir {
        Some(dir) => tempfile::Builder::new().suffix(".dbf").tempfile_in(dir)?,
        None => tempfile::Builder::new().suffix(".dbf").tempfile()?,
    };

    let file: File = temp.reopen()?;
    let mut writer = BufWriter::new(file);
    let bytes = decode_dbc(&dbc, &mut writer)?;
    writer.flush()?;

    debug!(
        source = %source.display(),
        compressed = dbc.len(),
        decoded = bytes,
        "Decoded DBC"
    );
    Ok(temp)
}

/// Assemble a DBC image from a DBF image. Records are stored as literals.
#[cfg(any(test, feature = "test-support"))]
pub fn build_dbc(dbf: &[u8]) -> Vec<u8> {
    let header_len = usize::from(u16::from_le_bytes([dbf[8], dbf[9]]));
    let mut out = dbf[..header_len].to_vec();
    out.extend_from_slice(&[0u8; CRC_LEN]);
    out.extend(crate::implode::implode_literals(&dbf[header_len..]));
    out
}
