//! Immutable torrent metadata with structural validation.

use super::{InfoHash, PieceIndex, TorrentError};

/// Individual file within a torrent.
///
/// Single-file torrents are represented as one entry whose path is the
/// torrent name, so the layout logic never special-cases them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentFile {
    /// Relative path components under the torrent root
    pub path: Vec<String>,
    /// File length in bytes
    pub length: u64,
}

/// Complete, validated metadata of one torrent.
///
/// A value of this type always satisfies the structural invariant
/// `ceil(total_length / piece_length) == piece_hashes.len()` with
/// `total_length` equal to the sum of the declared file lengths; it can
/// only be obtained through [`TorrentMetaInfo::new`] or the loaders built
/// on top of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentMetaInfo {
    info_hash: InfoHash,
    announce: String,
    name: String,
    piece_length: u32,
    piece_hashes: Vec<[u8; 20]>,
    files: Vec<TorrentFile>,
    total_length: u64,
}

impl TorrentMetaInfo {
    /// Validates the declared layout against the piece table and constructs
    /// the metadata.
    ///
    /// # Errors
    /// - `TorrentError::InvalidTorrentFile` - Zero piece length, empty file
    ///   list, zero total length, or a piece count that does not match the
    ///   declared lengths
    pub fn new(
        info_hash: InfoHash,
        announce: String,
        name: String,
        piece_length: u32,
        piece_hashes: Vec<[u8; 20]>,
        files: Vec<TorrentFile>,
    ) -> Result<Self, TorrentError> {
        if piece_length == 0 {
            return Err(TorrentError::InvalidTorrentFile {
                reason: "Piece length must be non-zero".to_string(),
            });
        }
        if files.is_empty() {
            return Err(TorrentError::InvalidTorrentFile {
                reason: "Torrent declares no files".to_string(),
            });
        }

        let total_length: u64 = files.iter().map(|f| f.length).sum();
        if total_length == 0 {
            return Err(TorrentError::InvalidTorrentFile {
                reason: "Torrent declares no data".to_string(),
            });
        }

        let expected_pieces = total_length.div_ceil(u64::from(piece_length));
        if expected_pieces != piece_hashes.len() as u64 {
            return Err(TorrentError::InvalidTorrentFile {
                reason: format!(
                    "Declared lengths require {expected_pieces} pieces, found {}",
                    piece_hashes.len()
                ),
            });
        }

        Ok(Self {
            info_hash,
            announce,
            name,
            piece_length,
            piece_hashes,
            files,
            total_length,
        })
    }

    pub fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    pub fn announce(&self) -> &str {
        &self.announce
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn piece_length(&self) -> u32 {
        self.piece_length
    }

    pub fn piece_hash(&self, index: PieceIndex) -> Option<&[u8; 20]> {
        self.piece_hashes.get(index.as_u32() as usize)
    }

    pub fn num_pieces(&self) -> u32 {
        self.piece_hashes.len() as u32
    }

    pub fn files(&self) -> &[TorrentFile] {
        &self.files
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Byte offset of a piece within the concatenated file data.
    pub fn piece_offset(&self, index: PieceIndex) -> u64 {
        u64::from(index.as_u32()) * u64::from(self.piece_length)
    }

    /// Actual size of a piece; only the final piece may be short.
    pub fn piece_size(&self, index: PieceIndex) -> usize {
        let offset = self.piece_offset(index);
        let remaining = self.total_length.saturating_sub(offset);
        remaining.min(u64::from(self.piece_length)) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_file(length: u64) -> Vec<TorrentFile> {
        vec![TorrentFile {
            path: vec!["data.bin".to_string()],
            length,
        }]
    }

    fn meta(
        piece_length: u32,
        piece_count: usize,
        files: Vec<TorrentFile>,
    ) -> Result<TorrentMetaInfo, TorrentError> {
        TorrentMetaInfo::new(
            InfoHash::new([0x11; 20]),
            "http://tracker.example.com/announce".to_string(),
            "data.bin".to_string(),
            piece_length,
            vec![[0u8; 20]; piece_count],
            files,
        )
    }

    #[test]
    fn test_valid_exact_multiple() {
        let info = meta(16384, 4, single_file(4 * 16384)).unwrap();
        assert_eq!(info.num_pieces(), 4);
        assert_eq!(info.piece_size(PieceIndex::new(3)), 16384);
    }

    #[test]
    fn test_valid_short_last_piece() {
        let info = meta(16384, 4, single_file(3 * 16384 + 1)).unwrap();
        assert_eq!(info.piece_size(PieceIndex::new(2)), 16384);
        assert_eq!(info.piece_size(PieceIndex::new(3)), 1);
    }

    #[test]
    fn test_rejects_piece_count_mismatch() {
        assert!(meta(16384, 3, single_file(4 * 16384)).is_err());
        assert!(meta(16384, 5, single_file(4 * 16384)).is_err());
    }

    #[test]
    fn test_rejects_zero_piece_length() {
        assert!(meta(0, 1, single_file(100)).is_err());
    }

    #[test]
    fn test_rejects_empty_layout() {
        assert!(meta(16384, 0, Vec::new()).is_err());
        assert!(meta(16384, 0, single_file(0)).is_err());
    }

    #[test]
    fn test_multi_file_lengths_sum() {
        let files = vec![
            TorrentFile {
                path: vec!["a".to_string(), "one.bin".to_string()],
                length: 10_000,
            },
            TorrentFile {
                path: vec!["two.bin".to_string()],
                length: 6_384,
            },
        ];
        let info = meta(16384, 1, files).unwrap();
        assert_eq!(info.total_length(), 16384);
        assert_eq!(info.piece_size(PieceIndex::new(0)), 16384);
    }
}
