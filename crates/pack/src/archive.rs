//! Archive container: a small header, a ciphered payload region, and a
//! trailing ciphered `ValueTree` index (spec.md §4.3).

use std::fs::File;
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use memmap2::{Mmap, MmapOptions};

use ggtool_formats::{cipher, value_tree, Game, Node};

use crate::error::{Error, Result};

/// The GUID shipped in every real archive's index; new archives reuse it
/// rather than minting a fresh one (spec.md §4.3).
pub const FIXED_GUID: &str = "b554baf88ff004c50cc0214575794b8c";

const SOUND_BANK_EXTENSION: &str = "assets.bank";

/// Identifies one packed payload by its byte range within its archive.
/// Immutable after construction (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub filename: String,
    pub offset: u64,
    pub size: u64,
    pub pack_path: PathBuf,
    pub game: Game,
}

impl FileEntry {
    /// The suffix after the *first* `.` of the basename, so `foo.strings.bank`
    /// and `foo.assets.bank` are distinguishable (spec.md §3).
    pub fn extension(&self) -> &str {
        extension_of(&self.filename)
    }
}

fn extension_of(filename: &str) -> &str {
    let basename = Path::new(filename)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);
    match basename.find('.') {
        Some(i) => &basename[i + 1..],
        None => "",
    }
}

/// An opened, memory-mapped content archive.
pub struct Archive {
    path: PathBuf,
    game: Game,
    mmap: Mmap,
    entries: Vec<FileEntry>,
}

impl Archive {
    /// Open `path`, detect its game from the basename, decipher and parse
    /// the trailing index, and build the entry list (spec.md §4.3).
    pub fn open(path: impl AsRef<Path>) -> Result<Archive> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        // SAFETY: the archive file is not expected to be modified concurrently
        // while this process holds it open.
        let mmap = unsafe { MmapOptions::new().map(&file) }.map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;

        let data_offset = LittleEndian::read_u32(&mmap[0..4]) as usize;
        let data_size = LittleEndian::read_u32(&mmap[4..8]) as usize;
        let game = Game::from_archive_path(&path);

        let index_ciphertext = &mmap[data_offset..data_offset + data_size];
        let index_plaintext = cipher::decode(index_ciphertext, game, None);
        let index = value_tree::parse(&index_plaintext, game)?;

        let entries = read_entries(&index, &path, game, mmap.len() as u64)?;
        tracing::debug!(archive = %path.display(), game = ?game, entries = entries.len(), "opened archive");

        Ok(Archive {
            path,
            game,
            mmap,
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn game(&self) -> Game {
        self.game
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    /// Extract raw, post-cipher bytes for one entry. `.assets.bank` payloads
    /// are stored unciphered and returned as-is (spec.md §4.3).
    pub fn extract(&self, entry: &FileEntry) -> Vec<u8> {
        let start = entry.offset as usize;
        let end = start + entry.size as usize;
        let raw = &self.mmap[start..end];
        if entry.extension() == SOUND_BANK_EXTENSION {
            raw.to_vec()
        } else {
            cipher::decode(raw, self.game, None)
        }
    }
}

fn read_entries(index: &Node, path: &Path, game: Game, archive_len: u64) -> Result<Vec<FileEntry>> {
    let files = index
        .get("files")
        .and_then(Node::as_array)
        .ok_or(Error::IndexNotADict)?;

    let mut entries = Vec::with_capacity(files.len());
    for file in files {
        let filename = file
            .get("filename")
            .and_then(Node::as_str)
            .ok_or(Error::IndexEntryMissingField { field: "filename" })?
            .to_string();
        let offset = file
            .get("offset")
            .and_then(Node::as_int)
            .ok_or(Error::IndexEntryMissingField { field: "offset" })? as u64;
        let size = file
            .get("size")
            .and_then(Node::as_int)
            .ok_or(Error::IndexEntryMissingField { field: "size" })? as u64;

        if offset + size > archive_len {
            return Err(Error::EntryOutOfBounds {
                filename,
                offset,
                size,
                archive_len,
            });
        }

        entries.push(FileEntry {
            filename,
            offset,
            size,
            pack_path: path.to_path_buf(),
            game,
        });
    }
    Ok(entries)
}

/// Build a new archive's bytes from `(filename, contents)` pairs, ciphering
/// each entry (except `.assets.bank` payloads, stored raw) and emitting the
/// ciphered `ValueTree` index (spec.md §4.3).
pub fn build_archive(files: &[(String, Vec<u8>)], game: Game) -> Vec<u8> {
    let mut payload = Vec::new();
    let mut file_nodes = Vec::with_capacity(files.len());

    for (filename, contents) in files {
        let offset = 8 + payload.len();
        let ciphered = if extension_of(filename) == SOUND_BANK_EXTENSION {
            contents.clone()
        } else {
            cipher::encode(contents, game, None)
        };
        let size = ciphered.len();
        payload.extend_from_slice(&ciphered);

        file_nodes.push(Node::Dict(vec![
            ("filename".to_string(), Node::String(filename.clone())),
            ("offset".to_string(), Node::Int(offset as i64)),
            ("size".to_string(), Node::Int(size as i64)),
        ]));
    }

    let index = Node::Dict(vec![
        ("files".to_string(), Node::Array(file_nodes)),
        ("guid".to_string(), Node::String(FIXED_GUID.to_string())),
    ]);
    let index_plaintext = value_tree::write(&index, game);
    let index_ciphertext = cipher::encode(&index_plaintext, game, None);

    let data_offset = 8 + payload.len() as u32;
    let data_size = index_ciphertext.len() as u32;

    let mut out = Vec::with_capacity(8 + payload.len() + index_ciphertext.len());
    out.extend_from_slice(&data_offset.to_le_bytes());
    out.extend_from_slice(&data_size.to_le_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&index_ciphertext);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn extension_is_suffix_after_first_dot() {
        let entry = FileEntry {
            filename: "foo.strings.bank".to_string(),
            offset: 0,
            size: 0,
            pack_path: PathBuf::new(),
            game: Game::ReturnToMonkeyIsland,
        };
        assert_eq!(entry.extension(), "strings.bank");
    }

    #[test]
    fn s3_archive_round_trips_two_files() {
        let files = vec![
            ("a.txt".to_string(), b"hi".to_vec()),
            ("b.bin".to_string(), vec![0u8; 16]),
        ];
        let bytes = build_archive(&files, Game::ReturnToMonkeyIsland);

        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&bytes).unwrap();
        let path = tmp.path().with_file_name("Weird.pack");
        std::fs::copy(tmp.path(), &path).unwrap();

        let archive = Archive::open(&path).unwrap();
        assert_eq!(archive.entries().len(), 2);

        let a = archive.entries().iter().find(|e| e.filename == "a.txt").unwrap();
        assert_eq!(archive.extract(a), b"hi");

        let b = archive.entries().iter().find(|e| e.filename == "b.bin").unwrap();
        assert_eq!(archive.extract(b), vec![0u8; 16]);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn every_entry_satisfies_offset_plus_size_bound() {
        let files = vec![("only.txt".to_string(), b"payload".to_vec())];
        let bytes = build_archive(&files, Game::Delores);

        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&bytes).unwrap();
        let path = tmp.path().with_file_name("Delores.pack");
        std::fs::copy(tmp.path(), &path).unwrap();

        let archive = Archive::open(&path).unwrap();
        let archive_len = std::fs::metadata(&path).unwrap().len();
        for entry in archive.entries() {
            assert!(entry.offset + entry.size <= archive_len);
        }

        std::fs::remove_file(&path).ok();
    }
}
