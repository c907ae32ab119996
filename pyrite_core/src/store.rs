//! The score store: a catalogue of named audio handles over one append-only
//! byte buffer, plus the versioned file codec used to persist it.

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

/// First four bytes of a score binary.
pub const AUDIO_FILE_MAGIC: [u8; 4] = *b"GSCA";

/// Major format version. A file's major must match the reader's exactly.
pub const MAJOR_VERSION: u8 = 0x01;

/// Minor format version. A file's minor must not exceed the reader's.
pub const MINOR_VERSION: u8 = 0x00;

/// On-disk size of a handle's name field, including the NUL padding.
pub const HANDLE_NAME_LEN: usize = 64;

/// Size of one handle-table entry on disk: padded name plus u64 offset.
const HANDLE_ENTRY_SIZE: usize = HANDLE_NAME_LEN + 8;

/// Size of the file header: magic, major, minor, audio count.
const HEADER_SIZE: usize = 8;

/// Error type covering score-file I/O and codec failures.
#[derive(Debug)]
pub enum StoreError {
    /// The operation involved file I/O which failed, providing the underlying io::Error
    Io(io::Error),
    /// The file contents did not match the expected format
    Format(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            StoreError::Io(ref e) => write!(f, "I/O Error: {}", e),
            StoreError::Format(ref s) => write!(f, "Format Error: {}", s),
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        StoreError::Io(e)
    }
}

/// A named, id-tagged pointer into the store's data buffer.
#[derive(Debug, Clone)]
pub struct AudioHandle {
    name: String,
    offset: u64,
    id: u16,
}

impl AudioHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Byte index of this score's header within the store data.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Store-scoped monotonic identifier; never zero.
    pub fn id(&self) -> u16 {
        self.id
    }
}

/// In-memory collection of scores: a growable handle table over a single
/// contiguous data buffer. Scores are only ever appended.
pub struct AudioStore {
    handles: Vec<AudioHandle>,
    data: Vec<u8>,
    next_id: u16,
}

impl Default for AudioStore {
    fn default() -> Self {
        AudioStore::new()
    }
}

impl AudioStore {
    pub fn new() -> Self {
        AudioStore::with_capacity(0x400)
    }

    pub fn with_capacity(data_capacity: usize) -> Self {
        AudioStore {
            handles: Vec::with_capacity(8),
            data: Vec::with_capacity(data_capacity),
            next_id: 1,
        }
    }

    /// Raw score data shared by all handles.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn audio_count(&self) -> usize {
        self.handles.len()
    }

    pub fn handle_by_index(&self, index: usize) -> Option<&AudioHandle> {
        self.handles.get(index)
    }

    pub fn handle_by_name(&self, name: &str) -> Option<&AudioHandle> {
        self.handles.iter().find(|h| h.name == name)
    }

    pub fn handle_by_id(&self, id: u16) -> Option<&AudioHandle> {
        self.handles.iter().find(|h| h.id == id)
    }

    /// Appends a score to the buffer under a new handle and returns it. An
    /// already-present name returns its existing handle untouched; invalid
    /// arguments are reported and return `None`.
    pub fn add_audio(&mut self, name: &str, data: &[u8]) -> Option<&AudioHandle> {
        if name.is_empty() || name.len() >= HANDLE_NAME_LEN {
            error!(
                "Audio handle name must be between 1 and {} in length.",
                HANDLE_NAME_LEN - 1
            );
            return None;
        }

        if let Some(index) = self.handles.iter().position(|h| h.name == name) {
            return Some(&self.handles[index]);
        }

        if data.is_empty() {
            error!("Audio entry cannot have zero size.");
            return None;
        }

        let handle = AudioHandle {
            name: name.to_string(),
            offset: self.data.len() as u64,
            id: self.next_id,
        };
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.data.extend_from_slice(data);
        self.handles.push(handle);
        self.handles.last()
    }

    /// Loads a score binary, merging it into this store. Loaded offsets are
    /// biased by the data already present so multiple files can coexist; new
    /// ids are assigned on load. On any failure the store is left untouched.
    pub fn read_audio_file(&mut self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        if bytes.len() < HEADER_SIZE {
            return Err(StoreError::Format(format!(
                "file '{}' is too small to hold a header",
                path.display()
            )));
        }

        if bytes[0..4] != AUDIO_FILE_MAGIC {
            return Err(StoreError::Format(format!(
                "file '{}' has incorrect magic number",
                path.display()
            )));
        }

        let major = bytes[4];
        let minor = bytes[5];
        if major != MAJOR_VERSION {
            return Err(StoreError::Format(format!(
                "file '{}' has major version {} (expected {})",
                path.display(),
                major,
                MAJOR_VERSION
            )));
        }
        if minor > MINOR_VERSION {
            return Err(StoreError::Format(format!(
                "file '{}' has minor version {} newer than {}",
                path.display(),
                minor,
                MINOR_VERSION
            )));
        }

        let audio_count = u16::from_le_bytes([bytes[6], bytes[7]]) as usize;
        let table_end = HEADER_SIZE + audio_count * HANDLE_ENTRY_SIZE;
        if bytes.len() < table_end {
            return Err(StoreError::Format(format!(
                "file '{}' is truncated within its handle table",
                path.display()
            )));
        }

        // Stage new handles in a scratch list so a bad entry cannot leave the
        // store half-loaded.
        let bias = self.data.len() as u64;
        let mut loaded = Vec::with_capacity(audio_count);
        for i in 0..audio_count {
            let entry = &bytes[HEADER_SIZE + i * HANDLE_ENTRY_SIZE..];
            let name_bytes = &entry[..HANDLE_NAME_LEN];
            let name_end = name_bytes.iter().position(|&b| b == 0).unwrap_or(HANDLE_NAME_LEN);
            let name = match std::str::from_utf8(&name_bytes[..name_end]) {
                Ok(s) => s.to_string(),
                Err(_) => {
                    return Err(StoreError::Format(format!(
                        "audio entry #{} of file '{}' has a malformed name",
                        i,
                        path.display()
                    )))
                }
            };
            let mut offset_bytes = [0u8; 8];
            offset_bytes.copy_from_slice(&entry[HANDLE_NAME_LEN..HANDLE_ENTRY_SIZE]);
            loaded.push(AudioHandle {
                name,
                offset: u64::from_le_bytes(offset_bytes) + bias,
                id: 0,
            });
        }

        for mut handle in loaded {
            handle.id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1).max(1);
            self.handles.push(handle);
        }
        self.data.extend_from_slice(&bytes[table_end..]);

        info!(
            "Loaded {} audio entries ({} score bytes) from '{}'.",
            audio_count,
            bytes.len() - table_end,
            path.display()
        );

        Ok(())
    }

    /// Writes the whole store out in the score binary format.
    pub fn write_audio_file(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let mut file = File::create(path.as_ref())?;

        file.write_all(&AUDIO_FILE_MAGIC)?;
        file.write_all(&[MAJOR_VERSION, MINOR_VERSION])?;
        file.write_all(&(self.handles.len() as u16).to_le_bytes())?;

        for handle in &self.handles {
            let mut name = [0u8; HANDLE_NAME_LEN];
            name[..handle.name.len()].copy_from_slice(handle.name.as_bytes());
            file.write_all(&name)?;
            file.write_all(&handle.offset.to_le_bytes())?;
        }

        file.write_all(&self.data)?;

        Ok(())
    }
}

#[cfg(test)]
mod store_tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("pyrite_{}_{}", std::process::id(), name))
    }

    #[test]
    fn add_and_lookup() {
        let mut store = AudioStore::new();
        let id = store.add_audio("Song_A", &[0xFF]).unwrap().id();
        assert_eq!(id, 1);
        let id = store.add_audio("Song_B", &[0x00, 0xFF]).unwrap().id();
        assert_eq!(id, 2);

        assert_eq!(store.audio_count(), 2);
        assert_eq!(store.data_size(), 3);
        assert_eq!(store.handle_by_name("Song_B").unwrap().offset(), 1);
        assert_eq!(store.handle_by_id(1).unwrap().name(), "Song_A");
        assert_eq!(store.handle_by_index(1).unwrap().name(), "Song_B");
        assert!(store.handle_by_name("Song_C").is_none());
        assert!(store.handle_by_id(3).is_none());
    }

    #[test]
    fn duplicate_name_returns_existing() {
        let mut store = AudioStore::new();
        store.add_audio("Song", &[0xFF]).unwrap();
        let handle = store.add_audio("Song", &[0x01, 0x02]).unwrap();
        assert_eq!(handle.id(), 1);
        assert_eq!(store.data_size(), 1);
    }

    #[test]
    fn rejects_bad_arguments() {
        let mut store = AudioStore::new();
        assert!(store.add_audio("", &[0xFF]).is_none());
        assert!(store.add_audio(&"x".repeat(64), &[0xFF]).is_none());
        assert!(store.add_audio("Song", &[]).is_none());
        assert_eq!(store.audio_count(), 0);
    }

    #[test]
    fn file_round_trip_and_merge() {
        let mut store = AudioStore::new();
        store.add_audio("First", &[0x10, 0x11, 0xFF]).unwrap();
        store.add_audio("Second", &[0xFF]).unwrap();

        let path = temp_path("roundtrip.gsca");
        store.write_audio_file(&path).unwrap();

        let mut loaded = AudioStore::new();
        loaded.add_audio("Resident", &[0xAA, 0xFF]).unwrap();
        loaded.read_audio_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded.audio_count(), 3);
        assert_eq!(loaded.data_size(), 6);
        // Loaded offsets are biased past the resident data.
        assert_eq!(loaded.handle_by_name("First").unwrap().offset(), 2);
        assert_eq!(loaded.handle_by_name("Second").unwrap().offset(), 5);
        assert_eq!(loaded.handle_by_name("Second").unwrap().id(), 3);
    }

    #[test]
    fn read_failures_leave_store_untouched() {
        let path = temp_path("bad.gsca");

        // Wrong magic.
        std::fs::write(&path, b"NOPE\x01\x00\x00\x00").unwrap();
        let mut store = AudioStore::new();
        store.add_audio("Resident", &[0xFF]).unwrap();
        assert!(matches!(
            store.read_audio_file(&path),
            Err(StoreError::Format(_))
        ));

        // Wrong major version.
        std::fs::write(&path, b"GSCA\x02\x00\x00\x00").unwrap();
        assert!(store.read_audio_file(&path).is_err());

        // Future minor version.
        std::fs::write(&path, b"GSCA\x01\x01\x00\x00").unwrap();
        assert!(store.read_audio_file(&path).is_err());

        // Truncated handle table.
        std::fs::write(&path, b"GSCA\x01\x00\x02\x00abc").unwrap();
        assert!(store.read_audio_file(&path).is_err());

        std::fs::remove_file(&path).unwrap();
        assert_eq!(store.audio_count(), 1);
        assert_eq!(store.data_size(), 1);
    }

    #[test]
    fn missing_file_is_io_error() {
        let mut store = AudioStore::new();
        assert!(matches!(
            store.read_audio_file(temp_path("does_not_exist.gsca")),
            Err(StoreError::Io(_))
        ));
    }
}
