//! Blocking file work for finished uploads: concatenating chunks and
//! unpacking the payload.

use super::error::{UploadError, UploadResult};
use flate2::read::MultiGzDecoder;
use regex::Regex;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Name of the reassembled, still-compressed payload. The leading dot keeps it
/// out of reach of [`sanitize_filename`].
pub(crate) const BLOB_NAME: &str = ".payload";

const FALLBACK_NAME: &str = "upload.bin";

/// File holding chunk `index`; re-sent chunks land on the same name
pub(crate) fn chunk_file_name(index: u32) -> String {
    format!("chunk_{:06}", index)
}

/// Concatenate `chunk_000000 ..` in index order into the blob, deleting each
/// chunk once it has been appended. Returns the blob path and its size.
pub(crate) fn concat_chunks(work_dir: &Path, total_chunks: u32) -> UploadResult<(PathBuf, u64)> {
    let blob_path = work_dir.join(BLOB_NAME);
    let mut blob = BufWriter::new(File::create(&blob_path).map_err(UploadError::Reassemble)?);
    let mut written = 0u64;

    for index in 0..total_chunks {
        let chunk_path = work_dir.join(chunk_file_name(index));
        let mut chunk = File::open(&chunk_path).map_err(UploadError::Reassemble)?;
        written += io::copy(&mut chunk, &mut blob).map_err(UploadError::Reassemble)?;
        drop(chunk);
        fs::remove_file(&chunk_path).map_err(UploadError::Reassemble)?;
    }

    blob.flush().map_err(UploadError::Reassemble)?;
    Ok((blob_path, written))
}

fn starts_with_gzip_magic(path: &Path) -> io::Result<bool> {
    let mut magic = [0u8; 2];
    let mut file = File::open(path)?;
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == GZIP_MAGIC),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Turn the blob into the log file `work_dir/filename` and remove the blob.
///
/// The blob is gunzipped when `force_gzip` is set or when it carries the gzip
/// magic; otherwise it is renamed.
pub(crate) fn unpack(
    blob: &Path,
    work_dir: &Path,
    filename: &str,
    force_gzip: bool,
) -> UploadResult<PathBuf> {
    let dest = work_dir.join(filename);

    if force_gzip || starts_with_gzip_magic(blob).map_err(UploadError::Decompress)? {
        let input = BufReader::new(File::open(blob).map_err(UploadError::Decompress)?);
        let mut decoder = MultiGzDecoder::new(input);
        let mut output = BufWriter::new(File::create(&dest).map_err(UploadError::Decompress)?);
        io::copy(&mut decoder, &mut output).map_err(UploadError::Decompress)?;
        output.flush().map_err(UploadError::Decompress)?;
        fs::remove_file(blob)?;
    } else {
        fs::rename(blob, &dest)?;
    }

    Ok(dest)
}

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid regex"))
}

/// Reduce a client-supplied name to a safe file name and drop a `.gz` suffix
pub fn sanitize_filename(name: &str) -> String {
    // Only the last path component counts
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let base = base
        .strip_suffix(".gz")
        .or_else(|| base.strip_suffix(".GZ"))
        .unwrap_or(base);

    let cleaned = unsafe_chars().replace_all(base.trim(), "_");
    let cleaned = cleaned.trim_start_matches(['.', '_']);

    if cleaned.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::tempdir;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_concat_in_index_order_and_delete_chunks() {
        let dir = tempdir().unwrap();
        // Written out of order on purpose
        fs::write(dir.path().join(chunk_file_name(2)), b"CC").unwrap();
        fs::write(dir.path().join(chunk_file_name(0)), b"AAAA").unwrap();
        fs::write(dir.path().join(chunk_file_name(1)), b"B").unwrap();

        let (blob, size) = concat_chunks(dir.path(), 3).unwrap();
        assert_eq!(size, 7);
        assert_eq!(fs::read(&blob).unwrap(), b"AAAABCC");
        for i in 0..3 {
            assert!(!dir.path().join(chunk_file_name(i)).exists());
        }
    }

    #[test]
    fn test_missing_chunk_fails() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(chunk_file_name(0)), b"A").unwrap();
        assert!(matches!(
            concat_chunks(dir.path(), 2),
            Err(UploadError::Reassemble(_))
        ));
    }

    #[test]
    fn test_unpack_gzip_by_magic() {
        let dir = tempdir().unwrap();
        let blob = dir.path().join(BLOB_NAME);
        fs::write(&blob, gzip(b"log bytes")).unwrap();

        let out = unpack(&blob, dir.path(), "flight.bin", false).unwrap();
        assert_eq!(fs::read(out).unwrap(), b"log bytes");
        assert!(!blob.exists());
    }

    #[test]
    fn test_unpack_plain_is_renamed() {
        let dir = tempdir().unwrap();
        let blob = dir.path().join(BLOB_NAME);
        fs::write(&blob, b"\xa3\x95raw").unwrap();

        let out = unpack(&blob, dir.path(), "flight.bin", false).unwrap();
        assert_eq!(fs::read(out).unwrap(), b"\xa3\x95raw");
        assert!(!blob.exists());
    }

    #[test]
    fn test_forced_gzip_on_plain_data_fails() {
        let dir = tempdir().unwrap();
        let blob = dir.path().join(BLOB_NAME);
        fs::write(&blob, b"not gzip at all").unwrap();

        assert!(matches!(
            unpack(&blob, dir.path(), "flight.bin", true),
            Err(UploadError::Decompress(_))
        ));
    }

    #[test]
    fn test_unpack_never_overwrites_its_own_blob() {
        let dir = tempdir().unwrap();
        let blob = dir.path().join(BLOB_NAME);
        fs::write(&blob, gzip(b"log bytes")).unwrap();

        for name in [".payload.gz", "payload.gz.gz", BLOB_NAME] {
            assert_ne!(sanitize_filename(name), BLOB_NAME);
        }

        let out = unpack(&blob, dir.path(), &sanitize_filename("payload.gz.gz"), true).unwrap();
        assert_eq!(out, dir.path().join("payload.gz"));
        assert_eq!(fs::read(out).unwrap(), b"log bytes");
        assert!(!blob.exists());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("00000042.BIN.gz"), "00000042.BIN");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\logs\\my flight.bin"), "my_flight.bin");
        assert_eq!(sanitize_filename(".hidden"), "hidden");
        assert_eq!(sanitize_filename(""), "upload.bin");
        assert_eq!(sanitize_filename(".gz"), "upload.bin");
    }
}
