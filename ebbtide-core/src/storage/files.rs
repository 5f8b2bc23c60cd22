//! Layout validation and byte-range reads over a torrent's local files.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::StorageError;
use crate::torrent::{PieceIndex, TorrentFile, TorrentMetaInfo};

/// Absolute path of a declared file under the torrent root.
fn file_path(root: &Path, file: &TorrentFile) -> PathBuf {
    let mut path = root.to_path_buf();
    for component in &file.path {
        path.push(component);
    }
    path
}

/// Checks that every declared file exists under `root`, is readable, and has
/// exactly the declared byte length.
///
/// This is a best-effort precondition check: it proves the layout matches,
/// not that the contents hash correctly.
///
/// # Errors
/// - `StorageError::FileMissing` - A declared path is absent or not a regular file
/// - `StorageError::LengthMismatch` - A file exists with the wrong size
/// - `StorageError::Io` - A file exists but cannot be opened for reading
pub async fn validate_layout(meta: &TorrentMetaInfo, root: &Path) -> Result<(), StorageError> {
    for file in meta.files() {
        let path = file_path(root, file);

        let file_meta = match fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::FileMissing { path });
            }
            Err(e) => return Err(StorageError::Io(e)),
        };

        if !file_meta.is_file() {
            return Err(StorageError::FileMissing { path });
        }
        if file_meta.len() != file.length {
            return Err(StorageError::LengthMismatch {
                path,
                expected: file.length,
                actual: file_meta.len(),
            });
        }

        // Opening proves read permission; metadata alone does not.
        fs::File::open(&path).await?;
    }

    Ok(())
}

/// Reads the byte range of one piece.
///
/// # Errors
/// - `StorageError::RangeOutOfBounds` - Piece index past the end of the data
/// - `StorageError::Io` - A file is missing, short, or unreadable
pub async fn read_piece(
    meta: &TorrentMetaInfo,
    root: &Path,
    index: PieceIndex,
) -> Result<Vec<u8>, StorageError> {
    read_range(meta, root, meta.piece_offset(index), meta.piece_size(index)).await
}

/// Reads `length` bytes at absolute `offset` within the concatenated file
/// data, crossing file boundaries as needed.
///
/// # Errors
/// - `StorageError::RangeOutOfBounds` - Range exceeds the declared data size
/// - `StorageError::Io` - A file is missing, short, or unreadable
pub async fn read_range(
    meta: &TorrentMetaInfo,
    root: &Path,
    offset: u64,
    length: usize,
) -> Result<Vec<u8>, StorageError> {
    if offset + length as u64 > meta.total_length() {
        return Err(StorageError::RangeOutOfBounds {
            offset,
            length: length as u64,
            total: meta.total_length(),
        });
    }

    let mut out = vec![0u8; length];
    let mut filled = 0usize;
    let mut file_start = 0u64;

    for file in meta.files() {
        let file_end = file_start + file.length;
        let read_at = offset + filled as u64;

        if filled < length && read_at < file_end {
            let within = read_at - file_start;
            let take = ((file.length - within).min((length - filled) as u64)) as usize;

            let mut handle = fs::File::open(file_path(root, file)).await?;
            handle.seek(SeekFrom::Start(within)).await?;
            handle.read_exact(&mut out[filled..filled + take]).await?;
            filled += take;
        }

        file_start = file_end;
        if filled == length {
            break;
        }
    }

    Ok(out)
}
