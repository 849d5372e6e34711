use std::io::{Cursor, Write};
use std::time::SystemTime;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Datelike, Local, Timelike};

use anyhow::{Result, bail};

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// General purpose flag: sizes and CRC follow the data in a descriptor
pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
/// General purpose flag: file name is UTF-8
pub const FLAG_UTF8: u16 = 1 << 11;

/// Version 2.0: deflate and directories
pub const VERSION_NEEDED: u16 = 20;
/// Upper byte 3 = unix, so readers honor the mode bits in external attributes
pub const VERSION_MADE_BY: u16 = (3 << 8) | VERSION_NEEDED;

const MODE_FILE: u32 = 0o100644;
const MODE_DIR: u32 = 0o040755;
const MSDOS_DIR_ATTR: u32 = 0x10;

/// Largest value a 32-bit size or offset field can carry
pub const ZIP32_MAX: u64 = 0xFFFF_FFFF;

/// End of Central Directory (EOCD) - 22 bytes minimum
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    /// Single-disk record without comment
    pub fn new(total_entries: u16, cd_size: u32, cd_offset: u32) -> Self {
        Self {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: total_entries,
            total_entries,
            cd_size,
            cd_offset,
            comment_len: 0,
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            bail!("Invalid End of Central Directory");
        }

        // Verify signature
        if &data[0..4] != Self::SIGNATURE {
            bail!("Invalid End of Central Directory");
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>()?,
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    pub fn to_bytes(&self) -> std::io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.write_all(Self::SIGNATURE)?;
        out.write_u16::<LittleEndian>(self.disk_number)?;
        out.write_u16::<LittleEndian>(self.disk_with_cd)?;
        out.write_u16::<LittleEndian>(self.disk_entries)?;
        out.write_u16::<LittleEndian>(self.total_entries)?;
        out.write_u32::<LittleEndian>(self.cd_size)?;
        out.write_u32::<LittleEndian>(self.cd_offset)?;
        out.write_u16::<LittleEndian>(self.comment_len)?;
        Ok(out)
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// Data descriptor written after streamed entry data - 16 bytes with signature
pub const DATA_DESCRIPTOR_SIGNATURE: &[u8] = b"PK\x07\x08";

/// Header fields shared by the local and central records of one entry
#[derive(Debug, Clone)]
pub struct EntryHeader {
    pub file_name: String,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
}

impl EntryHeader {
    pub fn is_directory(&self) -> bool {
        self.file_name.ends_with('/')
    }

    fn write_common(&self, out: &mut Vec<u8>) -> std::io::Result<()> {
        out.write_u16::<LittleEndian>(self.flags)?;
        out.write_u16::<LittleEndian>(self.compression_method.as_u16())?;
        out.write_u16::<LittleEndian>(self.last_mod_time)?;
        out.write_u16::<LittleEndian>(self.last_mod_date)?;
        out.write_u32::<LittleEndian>(self.crc32)?;
        out.write_u32::<LittleEndian>(self.compressed_size)?;
        out.write_u32::<LittleEndian>(self.uncompressed_size)?;
        out.write_u16::<LittleEndian>(self.file_name.len() as u16)?;
        // No extra field
        out.write_u16::<LittleEndian>(0)
    }

    /// Local File Header followed by the file name
    pub fn local_header(&self) -> std::io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(LFH_SIZE + self.file_name.len());
        out.write_all(LFH_SIGNATURE)?;
        out.write_u16::<LittleEndian>(VERSION_NEEDED)?;
        self.write_common(&mut out)?;
        out.write_all(self.file_name.as_bytes())?;
        Ok(out)
    }

    /// Central Directory File Header for an entry whose local header starts
    /// at `lfh_offset`
    pub fn central_header(&self, lfh_offset: u32) -> std::io::Result<Vec<u8>> {
        let external_attrs = if self.is_directory() {
            (MODE_DIR << 16) | MSDOS_DIR_ATTR
        } else {
            MODE_FILE << 16
        };

        let mut out = Vec::with_capacity(CDFH_MIN_SIZE + self.file_name.len());
        out.write_all(CDFH_SIGNATURE)?;
        out.write_u16::<LittleEndian>(VERSION_MADE_BY)?;
        out.write_u16::<LittleEndian>(VERSION_NEEDED)?;
        self.write_common(&mut out)?;
        // Comment length, disk number start, internal attributes
        out.write_u16::<LittleEndian>(0)?;
        out.write_u16::<LittleEndian>(0)?;
        out.write_u16::<LittleEndian>(0)?;
        out.write_u32::<LittleEndian>(external_attrs)?;
        out.write_u32::<LittleEndian>(lfh_offset)?;
        out.write_all(self.file_name.as_bytes())?;
        Ok(out)
    }

    /// Data descriptor carrying the values unknown when the local header went out
    pub fn data_descriptor(&self) -> std::io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(16);
        out.write_all(DATA_DESCRIPTOR_SIGNATURE)?;
        out.write_u32::<LittleEndian>(self.crc32)?;
        out.write_u32::<LittleEndian>(self.compressed_size)?;
        out.write_u32::<LittleEndian>(self.uncompressed_size)?;
        Ok(out)
    }
}

/// Parsed ZIP file entry information
#[derive(Debug, Clone)]
pub struct ZipFileEntry {
    pub file_name: String,
    pub compression_method: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub lfh_offset: u64,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub is_directory: bool,
}

impl ZipFileEntry {
    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let day = (self.last_mod_date & 0x1F) as u8;
        let month = ((self.last_mod_date >> 5) & 0x0F) as u8;
        let year = ((self.last_mod_date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        let second = ((self.last_mod_time & 0x1F) * 2) as u8;
        let minute = ((self.last_mod_time >> 5) & 0x3F) as u8;
        let hour = ((self.last_mod_time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }
}

/// 1980-01-01 00:00, the earliest DOS timestamp
const DOS_EPOCH: (u16, u16) = (0, (1 << 5) | 1);

/// Encode a timestamp as DOS (time, date) in local time, clamped to the
/// 1980..=2107 range the format can express
pub fn dos_datetime(modified: Option<SystemTime>) -> (u16, u16) {
    let Some(modified) = modified else {
        return DOS_EPOCH;
    };

    let local: DateTime<Local> = modified.into();
    let year = local.year();
    if year < 1980 {
        return DOS_EPOCH;
    }
    if year > 2107 {
        return ((23 << 11) | (59 << 5) | 29, (127 << 9) | (12 << 5) | 31);
    }

    let time = ((local.hour() as u16) << 11)
        | ((local.minute() as u16) << 5)
        | (local.second() as u16 / 2);
    let date = (((year - 1980) as u16) << 9) | ((local.month() as u16) << 5) | local.day() as u16;
    (time, date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(time: u16, date: u16) -> ZipFileEntry {
        ZipFileEntry {
            file_name: "a.txt".into(),
            compression_method: CompressionMethod::Deflate,
            compressed_size: 0,
            uncompressed_size: 0,
            crc32: 0,
            lfh_offset: 0,
            last_mod_time: time,
            last_mod_date: date,
            is_directory: false,
        }
    }

    #[test]
    fn dos_datetime_matches_decoder() {
        let when = Local.with_ymd_and_hms(2024, 7, 14, 13, 37, 42).unwrap();
        let (time, date) = dos_datetime(Some(when.into()));
        let decoded = entry(time, date);
        assert_eq!(decoded.mod_date(), (2024, 7, 14));
        assert_eq!(decoded.mod_time(), (13, 37, 42));
    }

    #[test]
    fn dos_datetime_clamps_old_times() {
        assert_eq!(dos_datetime(Some(SystemTime::UNIX_EPOCH)), DOS_EPOCH);
        assert_eq!(dos_datetime(None), DOS_EPOCH);
        assert_eq!(entry(DOS_EPOCH.0, DOS_EPOCH.1).mod_date(), (1980, 1, 1));
    }

    #[test]
    fn eocd_round_trip() {
        let bytes = EndOfCentralDirectory::new(3, 150, 4096).to_bytes().unwrap();
        assert_eq!(bytes.len(), EndOfCentralDirectory::SIZE);
        let parsed = EndOfCentralDirectory::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.total_entries, 3);
        assert_eq!(parsed.cd_size, 150);
        assert_eq!(parsed.cd_offset, 4096);
    }

    #[test]
    fn local_header_layout() {
        let header = EntryHeader {
            file_name: "sub/b.txt".into(),
            flags: FLAG_DATA_DESCRIPTOR | FLAG_UTF8,
            compression_method: CompressionMethod::Deflate,
            last_mod_time: 0,
            last_mod_date: DOS_EPOCH.1,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
        };
        let bytes = header.local_header().unwrap();
        assert_eq!(bytes.len(), LFH_SIZE + "sub/b.txt".len());
        assert_eq!(&bytes[0..4], LFH_SIGNATURE);
        assert_eq!(u16::from_le_bytes([bytes[8], bytes[9]]), 8);
        assert_eq!(&bytes[LFH_SIZE..], b"sub/b.txt");

        let central = header.central_header(0).unwrap();
        assert_eq!(central.len(), CDFH_MIN_SIZE + "sub/b.txt".len());
    }
}
