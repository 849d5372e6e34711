//! Central-directory reader for finished archives.
//!
//! Used to inspect what the writer produced. ZIP files are read from the end:
//! locate the End of Central Directory (EOCD), read the central directory it
//! points at, then reach each entry's data through its Local File Header.
//! Archives written by [`ZipStreamWriter`](super::ZipStreamWriter) never need
//! ZIP64, so those records are not handled.

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::Crc;
use flate2::read::DeflateDecoder;
use std::io::{Cursor, Read};

use anyhow::{Result, bail};

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: usize = 65535;

pub struct ZipReader<'a> {
    data: &'a [u8],
}

impl<'a> ZipReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Tries the comment-less position first, then searches backwards for
    /// the signature.
    pub fn find_eocd(&self) -> Result<EndOfCentralDirectory> {
        let size = self.data.len();
        if size < EndOfCentralDirectory::SIZE {
            bail!("Not a valid ZIP file");
        }

        let tail = &self.data[size - EndOfCentralDirectory::SIZE..];
        if &tail[0..4] == EndOfCentralDirectory::SIGNATURE && tail[20..22] == [0, 0] {
            return EndOfCentralDirectory::from_bytes(tail);
        }

        let search_start = size.saturating_sub(MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE);
        let buf = &self.data[search_start..];
        for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
            if &buf[i..i + 4] == EndOfCentralDirectory::SIGNATURE {
                // The comment length must account for every remaining byte
                let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;
                if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                    return EndOfCentralDirectory::from_bytes(&buf[i..]);
                }
            }
        }

        bail!("Not a valid ZIP file")
    }

    /// List all entries in central directory order
    pub fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        let eocd = self.find_eocd()?;
        let start = eocd.cd_offset as usize;
        let end = start + eocd.cd_size as usize;
        if end > self.data.len() {
            bail!("Central directory extends past end of archive");
        }

        let mut cursor = Cursor::new(&self.data[start..end]);
        let mut entries = Vec::with_capacity(eocd.total_entries as usize);
        for _ in 0..eocd.total_entries {
            entries.push(parse_cdfh(&mut cursor)?);
        }
        Ok(entries)
    }

    /// Offset of an entry's data, past its Local File Header
    pub fn data_offset(&self, entry: &ZipFileEntry) -> Result<usize> {
        let start = entry.lfh_offset as usize;
        let Some(lfh) = self.data.get(start..start + LFH_SIZE) else {
            bail!("Invalid Local File Header");
        };
        if &lfh[0..4] != LFH_SIGNATURE {
            bail!("Invalid Local File Header");
        }

        let mut cursor = Cursor::new(&lfh[26..]);
        let file_name_length = cursor.read_u16::<LittleEndian>()? as usize;
        let extra_field_length = cursor.read_u16::<LittleEndian>()? as usize;
        Ok(start + LFH_SIZE + file_name_length + extra_field_length)
    }

    /// Decompress an entry and verify its CRC
    pub fn extract(&self, entry: &ZipFileEntry) -> Result<Vec<u8>> {
        let offset = self.data_offset(entry)?;
        let Some(raw) = self.data.get(offset..offset + entry.compressed_size as usize) else {
            bail!("Entry data extends past end of archive: {}", entry.file_name);
        };

        let mut out = Vec::with_capacity(entry.uncompressed_size as usize);
        match entry.compression_method {
            CompressionMethod::Stored => out.extend_from_slice(raw),
            CompressionMethod::Deflate => {
                DeflateDecoder::new(raw).read_to_end(&mut out)?;
            }
            CompressionMethod::Unknown(method) => {
                bail!("Unsupported compression method: {method}");
            }
        }

        let mut crc = Crc::new();
        crc.update(&out);
        if crc.sum() != entry.crc32 || out.len() as u64 != entry.uncompressed_size {
            bail!("CRC mismatch for {}", entry.file_name);
        }
        Ok(out)
    }
}

/// Parse a Central Directory File Header from a cursor
fn parse_cdfh(cursor: &mut Cursor<&[u8]>) -> Result<ZipFileEntry> {
    let mut sig = [0u8; 4];
    cursor.read_exact(&mut sig)?;
    if sig != CDFH_SIGNATURE {
        bail!("Invalid Central Directory File Header");
    }

    let _version_made_by = cursor.read_u16::<LittleEndian>()?;
    let _version_needed = cursor.read_u16::<LittleEndian>()?;
    let _flags = cursor.read_u16::<LittleEndian>()?;
    let compression_method = cursor.read_u16::<LittleEndian>()?;
    let last_mod_time = cursor.read_u16::<LittleEndian>()?;
    let last_mod_date = cursor.read_u16::<LittleEndian>()?;
    let crc32 = cursor.read_u32::<LittleEndian>()?;
    let compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let file_name_length = cursor.read_u16::<LittleEndian>()?;
    let extra_field_length = cursor.read_u16::<LittleEndian>()?;
    let file_comment_length = cursor.read_u16::<LittleEndian>()?;
    let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
    let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
    let _external_attrs = cursor.read_u32::<LittleEndian>()?;
    let lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

    let mut file_name_bytes = vec![0u8; file_name_length as usize];
    cursor.read_exact(&mut file_name_bytes)?;
    let file_name = String::from_utf8_lossy(&file_name_bytes).to_string();

    // Skip extra field and comment
    cursor.set_position(
        cursor.position() + extra_field_length as u64 + file_comment_length as u64,
    );

    Ok(ZipFileEntry {
        is_directory: file_name.ends_with('/'),
        file_name,
        compression_method: CompressionMethod::from_u16(compression_method),
        compressed_size,
        uncompressed_size,
        crc32,
        lfh_offset,
        last_mod_time,
        last_mod_date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_zip() {
        assert!(ZipReader::new(b"definitely not a zip archive").list_files().is_err());
        assert!(ZipReader::new(b"PK").find_eocd().is_err());
    }

    #[test]
    fn finds_eocd_behind_comment() {
        let mut data = EndOfCentralDirectory::new(0, 0, 0).to_bytes().unwrap();
        data[20..22].copy_from_slice(&5u16.to_le_bytes());
        data.extend_from_slice(b"hello");

        let eocd = ZipReader::new(&data).find_eocd().unwrap();
        assert_eq!(eocd.comment_len, 5);
        assert_eq!(eocd.total_entries, 0);
    }
}
