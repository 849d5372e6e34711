//! Decoders for checking archives produced by the streamer.
//!
//! Available to unit tests and, through the `test-utils` feature, to
//! integration tests.

use std::io::Read;

use flate2::read::GzDecoder;

use super::tar::TAR_BLOCK_LEN;
use super::zip::ZipReader;

/// Decode a tar.gz into (name, contents) pairs in archive order.
///
/// Verifies each header checksum and folds GNU long-name records into the
/// entry that follows them. Panics on malformed input.
pub fn read_tar_gz(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut tar = Vec::new();
    GzDecoder::new(bytes).read_to_end(&mut tar).unwrap();

    let mut entries = Vec::new();
    let mut pos = 0;
    let mut long_name: Option<String> = None;
    while pos + TAR_BLOCK_LEN <= tar.len() {
        let header = &tar[pos..pos + TAR_BLOCK_LEN];
        if header.iter().all(|&b| b == 0) {
            break;
        }

        let checksum_field = std::str::from_utf8(&header[148..154]).unwrap();
        let stored = u32::from_str_radix(checksum_field, 8).unwrap();
        let mut check = header.to_vec();
        check[148..156].fill(b' ');
        assert_eq!(check.iter().map(|&b| b as u32).sum::<u32>(), stored, "bad tar checksum");

        let size_field = std::str::from_utf8(&header[124..135]).unwrap();
        let size = usize::from_str_radix(size_field, 8).unwrap();
        let name_end = header[..100].iter().position(|&b| b == 0).unwrap_or(100);
        let name = String::from_utf8(header[..name_end].to_vec()).unwrap();
        let data = tar[pos + TAR_BLOCK_LEN..pos + TAR_BLOCK_LEN + size].to_vec();
        pos += TAR_BLOCK_LEN + size.div_ceil(TAR_BLOCK_LEN) * TAR_BLOCK_LEN;

        if header[156] == b'L' {
            let full = data.split(|&b| b == 0).next().unwrap();
            long_name = Some(String::from_utf8(full.to_vec()).unwrap());
            continue;
        }
        entries.push((long_name.take().unwrap_or(name), data));
    }
    entries
}

/// Decode a zip into (name, contents) pairs in central directory order.
/// CRCs are checked on extraction. Panics on malformed input.
pub fn read_zip(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let reader = ZipReader::new(bytes);
    reader
        .list_files()
        .unwrap()
        .iter()
        .map(|e| (e.file_name.clone(), reader.extract(e).unwrap()))
        .collect()
}
