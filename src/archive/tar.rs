//! Streaming tar+gzip writer.
//!
//! Tar records are 512-byte blocks: a ustar header, the file data padded to
//! a block boundary, and two zero blocks at the end. Names longer than the
//! 100-byte header field are carried by a preceding GNU `L` (long name)
//! record. Everything is fed through one gzip member whose output is
//! forwarded after every write.

use std::io::{self, Write};
use std::mem;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::archive::{ArchiveEncoder, CHUNK_SIZE, EntryMeta};

pub const TAR_BLOCK_LEN: usize = 512;
const NAME_FIELD_LEN: usize = 100;
const LONG_NAME_MARKER: &str = "././@LongLink";

const MODE_FILE: u64 = 0o644;
const MODE_DIR: u64 = 0o755;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TarEntryType {
    File,
    Directory,
    LongName,
}

impl TarEntryType {
    fn typeflag(&self) -> u8 {
        match self {
            TarEntryType::File => b'0',
            TarEntryType::Directory => b'5',
            TarEntryType::LongName => b'L',
        }
    }
}

/// Fields of one ustar header block
#[derive(Debug, Clone)]
pub struct TarHeader<'a> {
    pub name: &'a [u8],
    pub mode: u64,
    pub size: u64,
    pub mtime: u64,
    pub entry_type: TarEntryType,
}

impl TarHeader<'_> {
    pub fn encode(&self) -> io::Result<[u8; TAR_BLOCK_LEN]> {
        let mut block = [0u8; TAR_BLOCK_LEN];
        let name_len = self.name.len().min(NAME_FIELD_LEN);
        block[..name_len].copy_from_slice(&self.name[..name_len]);

        write_octal(&mut block[100..108], self.mode)?;
        write_octal(&mut block[108..116], 0)?; // uid
        write_octal(&mut block[116..124], 0)?; // gid
        write_octal(&mut block[124..136], self.size)?;
        write_octal(&mut block[136..148], self.mtime)?;
        block[156] = self.entry_type.typeflag();
        block[257..263].copy_from_slice(b"ustar\0");
        block[263..265].copy_from_slice(b"00");

        // Checksum is computed with its own field filled with spaces
        block[148..156].fill(b' ');
        let sum: u32 = block.iter().map(|&b| b as u32).sum();
        let checksum = format!("{sum:06o}\0 ");
        block[148..156].copy_from_slice(checksum.as_bytes());
        Ok(block)
    }
}

/// Zero-padded octal terminated by NUL, filling `field`
fn write_octal(field: &mut [u8], value: u64) -> io::Result<()> {
    let digits = field.len() - 1;
    let text = format!("{value:0digits$o}");
    if text.len() > digits {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("value {value} does not fit a {digits}-digit tar field"),
        ));
    }
    field[..digits].copy_from_slice(text.as_bytes());
    field[digits] = 0;
    Ok(())
}

fn padding(size: u64) -> usize {
    let rem = (size % TAR_BLOCK_LEN as u64) as usize;
    if rem == 0 { 0 } else { TAR_BLOCK_LEN - rem }
}

fn unix_seconds(time: Option<SystemTime>) -> u64 {
    time.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs())
}

pub struct TarGzStreamWriter<W> {
    gz: GzEncoder<Vec<u8>>,
    dest: W,
}

impl<W: AsyncWrite + Unpin + Send> TarGzStreamWriter<W> {
    pub fn new(dest: W) -> Self {
        Self {
            gz: GzEncoder::new(Vec::new(), Compression::default()),
            dest,
        }
    }

    pub fn into_inner(self) -> W {
        self.dest
    }

    /// Compress `bytes` and forward whatever gzip has produced
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.gz.write_all(bytes)?;
        let out = mem::take(self.gz.get_mut());
        if !out.is_empty() {
            self.dest.write_all(&out).await?;
        }
        Ok(())
    }

    async fn write_headers(
        &mut self,
        name: &str,
        entry_type: TarEntryType,
        size: u64,
        modified: Option<SystemTime>,
    ) -> io::Result<()> {
        let mtime = unix_seconds(modified);
        let mode = if entry_type == TarEntryType::Directory {
            MODE_DIR
        } else {
            MODE_FILE
        };

        if name.len() > NAME_FIELD_LEN {
            // Long name record: the full name, NUL terminated, as entry data
            let long = TarHeader {
                name: LONG_NAME_MARKER.as_bytes(),
                mode: 0,
                size: name.len() as u64 + 1,
                mtime: 0,
                entry_type: TarEntryType::LongName,
            };
            self.write(&long.encode()?).await?;
            self.write(name.as_bytes()).await?;
            self.write(&[0u8]).await?;
            self.write(&vec![0u8; padding(name.len() as u64 + 1)]).await?;
        }

        let header = TarHeader {
            name: name.as_bytes(),
            mode,
            size,
            mtime,
            entry_type,
        };
        self.write(&header.encode()?).await
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ArchiveEncoder for TarGzStreamWriter<W> {
    async fn add_file(
        &mut self,
        name: &str,
        meta: &EntryMeta,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> io::Result<u64> {
        self.write_headers(name, TarEntryType::File, meta.len, meta.modified)
            .await?;

        // The header already promised `meta.len` bytes; a file that changes
        // size underneath us cannot be archived consistently.
        let mut chunk = vec![0u8; CHUNK_SIZE];
        let mut remaining = meta.len;
        while remaining > 0 {
            let want = remaining.min(chunk.len() as u64) as usize;
            let n = source.read(&mut chunk[..want]).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("{name} shrank while being archived"),
                ));
            }
            self.write(&chunk[..n]).await?;
            remaining -= n as u64;
        }

        self.write(&vec![0u8; padding(meta.len)]).await?;
        Ok(meta.len)
    }

    async fn add_directory(&mut self, name: &str, meta: &EntryMeta) -> io::Result<()> {
        let name = if name.ends_with('/') {
            name.to_string()
        } else {
            format!("{name}/")
        };
        self.write_headers(&name, TarEntryType::Directory, 0, meta.modified)
            .await
    }

    async fn finish(&mut self) -> io::Result<()> {
        self.write(&[0u8; TAR_BLOCK_LEN * 2]).await?;
        self.gz.try_finish()?;
        let out = mem::take(self.gz.get_mut());
        self.dest.write_all(&out).await?;
        self.dest.flush().await
    }
}
