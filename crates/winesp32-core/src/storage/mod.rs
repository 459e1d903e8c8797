//! Byte-oriented file store consumed by the settings and transfer services.

mod mem;

pub use mem::{MemFile, MemFileStore};

/// How a file is opened.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OpenMode {
    /// Existing file, sequential reads from offset 0.
    Read,
    /// Create or truncate, sequential appends.
    WriteTruncate,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FsError {
    NotFound,
    /// The path already has a live handle.
    AlreadyOpen,
    InvalidName,
    NoSpace,
    Io,
}

impl FsError {
    pub const fn code(self) -> i32 {
        match self {
            Self::NotFound => -1,
            Self::AlreadyOpen => -2,
            Self::InvalidName => -3,
            Self::NoSpace => -4,
            Self::Io => -5,
        }
    }
}

/// POSIX-like file store. Handles are opaque and must be returned through
/// [`FileStore::close`].
pub trait FileStore {
    type File;

    fn open(&mut self, path: &str, mode: OpenMode) -> Result<Self::File, FsError>;

    /// Returns `0` at end of file.
    fn read(&mut self, file: &mut Self::File, buf: &mut [u8]) -> Result<usize, FsError>;

    /// Writes all of `data` or fails.
    fn write(&mut self, file: &mut Self::File, data: &[u8]) -> Result<(), FsError>;

    fn close(&mut self, file: Self::File) -> Result<(), FsError>;

    fn file_size(&mut self, path: &str) -> Result<u32, FsError>;

    fn remove(&mut self, path: &str) -> Result<(), FsError>;

    fn dir_exists(&mut self, path: &str) -> Result<bool, FsError>;

    /// Single-level mkdir; the parent must exist.
    fn create_dir(&mut self, path: &str) -> Result<(), FsError>;
}

/// Fill `buf` from `file` until it is full or the file ends.
pub fn read_full<S: FileStore>(
    store: &mut S,
    file: &mut S::File,
    buf: &mut [u8],
) -> Result<usize, FsError> {
    let mut total = 0usize;
    while total < buf.len() {
        let read_now = store.read(file, &mut buf[total..])?;
        if read_now == 0 {
            break;
        }
        total = total.saturating_add(read_now);
    }
    Ok(total)
}
