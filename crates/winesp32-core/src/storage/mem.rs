use alloc::{
    collections::{BTreeMap, BTreeSet},
    rc::Rc,
    string::{String, ToString},
    vec::Vec,
};
use core::cell::RefCell;

use super::{FileStore, FsError, OpenMode};

/// RAM-backed store used on the host and as the volatile fallback when no
/// card is mounted. Clones share one volume.
#[derive(Clone, Debug, Default)]
pub struct MemFileStore {
    volume: Rc<RefCell<MemVolume>>,
}

/// Handle into a [`MemFileStore`].
#[derive(Debug)]
pub struct MemFile {
    id: u32,
}

#[derive(Debug, Default)]
struct MemVolume {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    open: BTreeMap<u32, OpenFile>,
    next_id: u32,
    fail_writes: bool,
}

#[derive(Debug)]
struct OpenFile {
    path: String,
    mode: OpenMode,
    pos: usize,
}

fn normalize(path: &str) -> &str {
    path.trim_start_matches('/').trim_end_matches('/')
}

fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

impl MemVolume {
    fn has_dir(&self, path: &str) -> bool {
        path.is_empty() || self.dirs.contains(path)
    }

    fn is_open(&self, path: &str) -> bool {
        self.open.values().any(|f| f.path == path)
    }
}

impl MemFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a file's bytes.
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.volume.borrow().files.get(normalize(path)).cloned()
    }

    /// Place a file directly, creating missing parent directories.
    pub fn insert(&self, path: &str, data: &[u8]) {
        let path = normalize(path);
        let mut volume = self.volume.borrow_mut();
        let mut dir = parent(path);
        while !dir.is_empty() {
            volume.dirs.insert(dir.to_string());
            dir = parent(dir);
        }
        volume.files.insert(path.to_string(), data.to_vec());
    }

    pub fn open_handles(&self) -> usize {
        self.volume.borrow().open.len()
    }

    /// Make every subsequent write fail with [`FsError::Io`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.volume.borrow_mut().fail_writes = fail;
    }
}

impl FileStore for MemFileStore {
    type File = MemFile;

    fn open(&mut self, path: &str, mode: OpenMode) -> Result<Self::File, FsError> {
        let path = normalize(path);
        if path.is_empty() {
            return Err(FsError::InvalidName);
        }

        let mut volume = self.volume.borrow_mut();
        if volume.is_open(path) {
            return Err(FsError::AlreadyOpen);
        }
        if volume.dirs.contains(path) {
            return Err(FsError::InvalidName);
        }

        match mode {
            OpenMode::Read => {
                if !volume.files.contains_key(path) {
                    return Err(FsError::NotFound);
                }
            }
            OpenMode::WriteTruncate => {
                if !volume.has_dir(parent(path)) {
                    return Err(FsError::NotFound);
                }
                volume.files.insert(path.to_string(), Vec::new());
            }
        }

        let id = volume.next_id;
        volume.next_id = volume.next_id.wrapping_add(1);
        volume.open.insert(
            id,
            OpenFile {
                path: path.to_string(),
                mode,
                pos: 0,
            },
        );
        Ok(MemFile { id })
    }

    fn read(&mut self, file: &mut Self::File, buf: &mut [u8]) -> Result<usize, FsError> {
        let mut volume = self.volume.borrow_mut();
        let volume = &mut *volume;
        let handle = volume.open.get_mut(&file.id).ok_or(FsError::Io)?;
        if handle.mode != OpenMode::Read {
            return Err(FsError::Io);
        }
        let data = volume.files.get(&handle.path).ok_or(FsError::NotFound)?;

        let remaining = data.len().saturating_sub(handle.pos);
        let count = remaining.min(buf.len());
        buf[..count].copy_from_slice(&data[handle.pos..handle.pos + count]);
        handle.pos += count;
        Ok(count)
    }

    fn write(&mut self, file: &mut Self::File, data: &[u8]) -> Result<(), FsError> {
        let mut volume = self.volume.borrow_mut();
        let volume = &mut *volume;
        if volume.fail_writes {
            return Err(FsError::Io);
        }
        let handle = volume.open.get_mut(&file.id).ok_or(FsError::Io)?;
        if handle.mode != OpenMode::WriteTruncate {
            return Err(FsError::Io);
        }
        let contents = volume.files.get_mut(&handle.path).ok_or(FsError::NotFound)?;
        contents.extend_from_slice(data);
        handle.pos = contents.len();
        Ok(())
    }

    fn close(&mut self, file: Self::File) -> Result<(), FsError> {
        self.volume
            .borrow_mut()
            .open
            .remove(&file.id)
            .map(|_| ())
            .ok_or(FsError::Io)
    }

    fn file_size(&mut self, path: &str) -> Result<u32, FsError> {
        let volume = self.volume.borrow();
        let data = volume.files.get(normalize(path)).ok_or(FsError::NotFound)?;
        u32::try_from(data.len()).map_err(|_| FsError::Io)
    }

    fn remove(&mut self, path: &str) -> Result<(), FsError> {
        let path = normalize(path);
        let mut volume = self.volume.borrow_mut();
        if volume.is_open(path) {
            return Err(FsError::AlreadyOpen);
        }
        volume.files.remove(path).map(|_| ()).ok_or(FsError::NotFound)
    }

    fn dir_exists(&mut self, path: &str) -> Result<bool, FsError> {
        Ok(self.volume.borrow().has_dir(normalize(path)))
    }

    fn create_dir(&mut self, path: &str) -> Result<(), FsError> {
        let path = normalize(path);
        if path.is_empty() {
            return Err(FsError::InvalidName);
        }
        let mut volume = self.volume.borrow_mut();
        if !volume.has_dir(parent(path)) {
            return Err(FsError::NotFound);
        }
        if volume.files.contains_key(path) {
            return Err(FsError::InvalidName);
        }
        volume.dirs.insert(path.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::read_full;

    #[test]
    fn write_then_read_back() {
        let mut fs = MemFileStore::new();
        let mut file = fs.open("/notes.txt", OpenMode::WriteTruncate).unwrap();
        fs.write(&mut file, b"hello ").unwrap();
        fs.write(&mut file, b"world").unwrap();
        fs.close(file).unwrap();

        assert_eq!(fs.file_size("notes.txt").unwrap(), 11);
        let mut file = fs.open("notes.txt", OpenMode::Read).unwrap();
        let mut buf = [0u8; 32];
        let n = read_full(&mut fs, &mut file, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello world");
        fs.close(file).unwrap();
        assert_eq!(fs.open_handles(), 0);
    }

    #[test]
    fn second_open_of_same_path_is_rejected() {
        let mut fs = MemFileStore::new();
        fs.insert("a.bin", &[1, 2, 3]);
        let first = fs.open("a.bin", OpenMode::Read).unwrap();
        assert_eq!(
            fs.open("a.bin", OpenMode::Read).err(),
            Some(FsError::AlreadyOpen)
        );
        assert_eq!(fs.remove("a.bin"), Err(FsError::AlreadyOpen));
        fs.close(first).unwrap();
        assert!(fs.open("a.bin", OpenMode::Read).is_ok());
    }

    #[test]
    fn writes_need_an_existing_parent() {
        let mut fs = MemFileStore::new();
        assert_eq!(
            fs.open("RECV/a.bin", OpenMode::WriteTruncate).err(),
            Some(FsError::NotFound)
        );
        fs.create_dir("RECV").unwrap();
        assert!(fs.dir_exists("/RECV/").unwrap());
        assert!(fs.open("RECV/a.bin", OpenMode::WriteTruncate).is_ok());
    }
}
