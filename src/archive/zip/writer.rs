//! Streaming ZIP writer.
//!
//! Entries are written front to back without seeking: every file entry sets
//! the data-descriptor flag, so its CRC and sizes follow the compressed data
//! instead of being patched into the local header. The central directory is
//! kept in memory (one small record per entry) and written by `finish`.

use std::io::{self, Write};
use std::mem;

use async_trait::async_trait;
use flate2::Compression;
use flate2::Crc;
use flate2::write::DeflateEncoder;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::structures::*;
use crate::archive::{ArchiveEncoder, CHUNK_SIZE, EntryMeta};

pub struct ZipStreamWriter<W> {
    dest: W,
    /// Bytes written so far; the offset of the next local header
    offset: u64,
    central: Vec<(EntryHeader, u32)>,
}

fn limit_error(what: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("{what} exceeds the 4 GiB zip limit"),
    )
}

impl<W: AsyncWrite + Unpin + Send> ZipStreamWriter<W> {
    pub fn new(dest: W) -> Self {
        Self {
            dest,
            offset: 0,
            central: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.dest
    }

    async fn emit(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.dest.write_all(bytes).await?;
        self.offset += bytes.len() as u64;
        Ok(())
    }

    fn begin_entry(&self, name: &str) -> io::Result<u32> {
        if name.len() > u16::MAX as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("entry name too long: {name}"),
            ));
        }
        if self.central.len() >= u16::MAX as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "too many entries for a zip archive",
            ));
        }
        u32::try_from(self.offset).map_err(|_| limit_error("archive"))
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ArchiveEncoder for ZipStreamWriter<W> {
    async fn add_file(
        &mut self,
        name: &str,
        meta: &EntryMeta,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> io::Result<u64> {
        let lfh_offset = self.begin_entry(name)?;
        let (last_mod_time, last_mod_date) = dos_datetime(meta.modified);

        let mut header = EntryHeader {
            file_name: name.to_string(),
            flags: FLAG_DATA_DESCRIPTOR | FLAG_UTF8,
            compression_method: CompressionMethod::Deflate,
            last_mod_time,
            last_mod_date,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
        };
        self.emit(&header.local_header()?).await?;

        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        let mut crc = Crc::new();
        let mut chunk = vec![0u8; CHUNK_SIZE];
        let mut uncompressed = 0u64;
        let mut compressed = 0u64;

        loop {
            let n = source.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            crc.update(&chunk[..n]);
            uncompressed += n as u64;
            encoder.write_all(&chunk[..n])?;

            // Forward whatever the encoder produced so far
            let out = mem::take(encoder.get_mut());
            compressed += out.len() as u64;
            self.emit(&out).await?;
        }

        let tail = encoder.finish()?;
        compressed += tail.len() as u64;
        self.emit(&tail).await?;

        if uncompressed > ZIP32_MAX || compressed > ZIP32_MAX {
            return Err(limit_error(name));
        }
        header.crc32 = crc.sum();
        header.compressed_size = compressed as u32;
        header.uncompressed_size = uncompressed as u32;
        self.emit(&header.data_descriptor()?).await?;

        self.central.push((header, lfh_offset));
        Ok(uncompressed)
    }

    async fn add_directory(&mut self, name: &str, meta: &EntryMeta) -> io::Result<()> {
        let name = if name.ends_with('/') {
            name.to_string()
        } else {
            format!("{name}/")
        };
        let lfh_offset = self.begin_entry(&name)?;
        let (last_mod_time, last_mod_date) = dos_datetime(meta.modified);

        let header = EntryHeader {
            file_name: name,
            flags: FLAG_UTF8,
            compression_method: CompressionMethod::Stored,
            last_mod_time,
            last_mod_date,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
        };
        self.emit(&header.local_header()?).await?;
        self.central.push((header, lfh_offset));
        Ok(())
    }

    async fn finish(&mut self) -> io::Result<()> {
        let cd_offset = u32::try_from(self.offset).map_err(|_| limit_error("archive"))?;

        let central = mem::take(&mut self.central);
        for (header, lfh_offset) in &central {
            self.emit(&header.central_header(*lfh_offset)?).await?;
        }

        let cd_size = u32::try_from(self.offset - cd_offset as u64)
            .map_err(|_| limit_error("central directory"))?;
        let eocd = EndOfCentralDirectory::new(central.len() as u16, cd_size, cd_offset);
        self.emit(&eocd.to_bytes()?).await?;
        self.dest.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::zip::ZipReader;

    fn meta(len: u64) -> EntryMeta {
        EntryMeta {
            len,
            modified: None,
        }
    }

    #[tokio::test]
    async fn writes_readable_archive() {
        let mut writer = ZipStreamWriter::new(Vec::new());
        let big: Vec<u8> = (0..200_000u32).flat_map(|i| (i % 251).to_le_bytes()).collect();

        writer.add_file("a.txt", &meta(1), &mut &b"X"[..]).await.unwrap();
        writer
            .add_file("data/big.bin", &meta(big.len() as u64), &mut &big[..])
            .await
            .unwrap();
        writer.add_directory("empty", &meta(0)).await.unwrap();
        writer.finish().await.unwrap();
        let bytes = writer.into_inner();

        let reader = ZipReader::new(&bytes);
        let entries = reader.list_files().unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "data/big.bin", "empty/"]);

        assert_eq!(reader.extract(&entries[0]).unwrap(), b"X");
        assert_eq!(reader.extract(&entries[1]).unwrap(), big);
        assert!(entries[1].compressed_size < entries[1].uncompressed_size);
        assert!(entries[2].is_directory);
        assert_eq!(entries[2].compression_method, CompressionMethod::Stored);
    }

    #[tokio::test]
    async fn reports_bytes_actually_read() {
        let mut writer = ZipStreamWriter::new(Vec::new());
        // Listed at 1 byte, but the file grew before it was read
        let read = writer
            .add_file("grown.txt", &meta(1), &mut &b"hello"[..])
            .await
            .unwrap();
        assert_eq!(read, 5);
        writer.finish().await.unwrap();

        let bytes = writer.into_inner();
        let reader = ZipReader::new(&bytes);
        let entries = reader.list_files().unwrap();
        assert_eq!(entries[0].uncompressed_size, 5);
        assert_eq!(reader.extract(&entries[0]).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn empty_archive_is_just_eocd() {
        let mut writer = ZipStreamWriter::new(Vec::new());
        writer.finish().await.unwrap();
        let bytes = writer.into_inner();
        assert_eq!(bytes.len(), EndOfCentralDirectory::SIZE);
        assert!(ZipReader::new(&bytes).list_files().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_file_entry() {
        let mut writer = ZipStreamWriter::new(Vec::new());
        writer.add_file("blank.txt", &meta(0), &mut &b""[..]).await.unwrap();
        writer.finish().await.unwrap();
        let bytes = writer.into_inner();

        let reader = ZipReader::new(&bytes);
        let entries = reader.list_files().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(reader.extract(&entries[0]).unwrap().is_empty());
    }
}
