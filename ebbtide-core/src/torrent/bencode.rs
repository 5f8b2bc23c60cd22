//! Bencode decoding of `.torrent` files and info hash calculation.

use sha1::{Digest, Sha1};

use super::metainfo::{TorrentFile, TorrentMetaInfo};
use super::{InfoHash, TorrentError};

type Dict<'a> = std::collections::HashMap<&'a [u8], bencode_rs::Value<'a>>;

/// Decodes a bencoded `.torrent` document into validated metadata.
///
/// # Errors
/// - `TorrentError::InvalidTorrentFile` - Malformed bencode, missing fields,
///   or declared lengths inconsistent with the piece table
pub fn parse_metainfo(torrent_bytes: &[u8]) -> Result<TorrentMetaInfo, TorrentError> {
    let parsed =
        bencode_rs::Value::parse(torrent_bytes).map_err(|e| TorrentError::InvalidTorrentFile {
            reason: format!("Bencode parsing failed: {e:?}"),
        })?;

    let Some(bencode_rs::Value::Dictionary(root)) = parsed.first() else {
        return Err(TorrentError::InvalidTorrentFile {
            reason: "Root element must be a dictionary".to_string(),
        });
    };

    let announce = require_string(root, b"announce")?;

    let Some(info_value) = root.get(b"info".as_slice()) else {
        return Err(TorrentError::InvalidTorrentFile {
            reason: "Missing 'info' field".to_string(),
        });
    };
    let bencode_rs::Value::Dictionary(info) = info_value else {
        return Err(TorrentError::InvalidTorrentFile {
            reason: "Info field must be a dictionary".to_string(),
        });
    };

    let info_hash = info_dict_hash(torrent_bytes)?;
    let name = require_string(info, b"name")?;
    let piece_length = require_integer(info, b"piece length")?;
    if piece_length <= 0 || piece_length > i64::from(u32::MAX) {
        return Err(TorrentError::InvalidTorrentFile {
            reason: format!("Unreasonable piece length {piece_length}"),
        });
    }

    let pieces_bytes = require_bytes(info, b"pieces")?;
    if !pieces_bytes.len().is_multiple_of(20) {
        return Err(TorrentError::InvalidTorrentFile {
            reason: "Pieces string is not a whole number of 20-byte hashes".to_string(),
        });
    }
    let piece_hashes: Vec<[u8; 20]> = pieces_bytes
        .chunks(20)
        .map(|chunk| {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(chunk);
            hash
        })
        .collect();

    let files = if let Ok(length) = require_integer(info, b"length") {
        if length < 0 {
            return Err(TorrentError::InvalidTorrentFile {
                reason: "Negative file length".to_string(),
            });
        }
        vec![TorrentFile {
            path: vec![name.clone()],
            length: length as u64,
        }]
    } else if let Some(bencode_rs::Value::List(entries)) = info.get(b"files".as_slice()) {
        parse_file_entries(entries)?
    } else {
        return Err(TorrentError::InvalidTorrentFile {
            reason: "Missing 'length' or 'files' field".to_string(),
        });
    };

    TorrentMetaInfo::new(
        info_hash,
        announce,
        name,
        piece_length as u32,
        piece_hashes,
        files,
    )
}

/// SHA-1 of the raw bencoded info dictionary.
///
/// The hash covers the exact byte span of the dictionary in the original
/// document, so the span is located by walking the bencode structure rather
/// than re-encoding the decoded value.
fn info_dict_hash(torrent_bytes: &[u8]) -> Result<InfoHash, TorrentError> {
    let key_pos = torrent_bytes
        .windows(b"4:info".len())
        .position(|window| window == b"4:info")
        .ok_or_else(|| TorrentError::InvalidTorrentFile {
            reason: "Could not locate info dictionary".to_string(),
        })?;

    let dict_start = key_pos + b"4:info".len();
    let dict_len = dictionary_span(&torrent_bytes[dict_start..])?;
    let info_bytes = &torrent_bytes[dict_start..dict_start + dict_len];

    let mut hasher = Sha1::new();
    hasher.update(info_bytes);
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&hasher.finalize());
    Ok(InfoHash::new(hash))
}

/// Length in bytes of the bencode dictionary starting at `data[0]`.
fn dictionary_span(data: &[u8]) -> Result<usize, TorrentError> {
    if data.first() != Some(&b'd') {
        return Err(TorrentError::InvalidTorrentFile {
            reason: "Expected dictionary start".to_string(),
        });
    }

    let mut pos = 1;
    let mut depth = 1usize;

    while pos < data.len() && depth > 0 {
        match data[pos] {
            b'd' | b'l' => {
                depth += 1;
                pos += 1;
            }
            b'e' => {
                depth -= 1;
                pos += 1;
            }
            b'i' => {
                pos += 1;
                while pos < data.len() && data[pos] != b'e' {
                    pos += 1;
                }
                pos += 1;
            }
            b'0'..=b'9' => {
                let start = pos;
                while pos < data.len() && data[pos] != b':' {
                    pos += 1;
                }
                let length: usize = std::str::from_utf8(&data[start..pos])
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| TorrentError::InvalidTorrentFile {
                        reason: "Invalid string length".to_string(),
                    })?;
                pos = pos.saturating_add(1).saturating_add(length);
            }
            _ => {
                return Err(TorrentError::InvalidTorrentFile {
                    reason: "Invalid bencode character".to_string(),
                });
            }
        }
    }

    if depth != 0 || pos > data.len() {
        return Err(TorrentError::InvalidTorrentFile {
            reason: "Truncated bencode dictionary".to_string(),
        });
    }

    Ok(pos)
}

fn parse_file_entries(entries: &[bencode_rs::Value<'_>]) -> Result<Vec<TorrentFile>, TorrentError> {
    let mut files = Vec::with_capacity(entries.len());

    for entry in entries {
        let bencode_rs::Value::Dictionary(file_dict) = entry else {
            return Err(TorrentError::InvalidTorrentFile {
                reason: "File entry must be a dictionary".to_string(),
            });
        };

        let length = require_integer(file_dict, b"length")?;
        if length < 0 {
            return Err(TorrentError::InvalidTorrentFile {
                reason: "Negative file length".to_string(),
            });
        }

        let Some(bencode_rs::Value::List(components)) = file_dict.get(b"path".as_slice()) else {
            return Err(TorrentError::InvalidTorrentFile {
                reason: "Missing or invalid path in file entry".to_string(),
            });
        };

        let mut path = Vec::with_capacity(components.len());
        for component in components {
            let bencode_rs::Value::Bytes(bytes) = component else {
                return Err(TorrentError::InvalidTorrentFile {
                    reason: "Path component must be a string".to_string(),
                });
            };
            let component =
                String::from_utf8(bytes.to_vec()).map_err(|_| TorrentError::InvalidTorrentFile {
                    reason: "Invalid UTF-8 in file path".to_string(),
                })?;
            path.push(component);
        }
        if path.is_empty() {
            return Err(TorrentError::InvalidTorrentFile {
                reason: "Empty path in file entry".to_string(),
            });
        }

        files.push(TorrentFile {
            path,
            length: length as u64,
        });
    }

    Ok(files)
}

fn require_bytes<'a>(dict: &'a Dict<'_>, key: &[u8]) -> Result<&'a [u8], TorrentError> {
    match dict.get(key) {
        Some(bencode_rs::Value::Bytes(bytes)) => Ok(bytes),
        _ => Err(TorrentError::InvalidTorrentFile {
            reason: format!("Missing or invalid field: {}", String::from_utf8_lossy(key)),
        }),
    }
}

fn require_string(dict: &Dict<'_>, key: &[u8]) -> Result<String, TorrentError> {
    let bytes = require_bytes(dict, key)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| TorrentError::InvalidTorrentFile {
        reason: format!("Invalid UTF-8 in field: {}", String::from_utf8_lossy(key)),
    })
}

fn require_integer(dict: &Dict<'_>, key: &[u8]) -> Result<i64, TorrentError> {
    match dict.get(key) {
        Some(bencode_rs::Value::Integer(value)) => Ok(*value),
        _ => Err(TorrentError::InvalidTorrentFile {
            reason: format!(
                "Missing or invalid integer field: {}",
                String::from_utf8_lossy(key)
            ),
        }),
    }
}
