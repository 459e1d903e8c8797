use esp_hal::{Blocking, delay::Delay, gpio::Output, spi::master::Spi};
use winesp32_core::storage::{FileStore, FsError, MemFile, MemFileStore, OpenMode};
use winesp32_hal_esp32s3::storage::{SdFile, SdFileStore, SdSpiDevice};

pub(super) type BoardSdCard =
    SdFileStore<SdSpiDevice<Spi<'static, Blocking>, Output<'static>>, Delay>;

/// Settings and transfer volume: the SD card when it mounted, otherwise a
/// RAM volume that is lost on reset.
#[derive(Clone)]
pub(super) enum BoardStore {
    Sd(&'static BoardSdCard),
    Ram(MemFileStore),
}

pub(super) enum BoardFile {
    Sd(SdFile),
    Ram(MemFile),
}

impl BoardStore {
    pub(super) const fn is_persistent(&self) -> bool {
        matches!(self, Self::Sd(_))
    }
}

impl FileStore for BoardStore {
    type File = BoardFile;

    fn open(&mut self, path: &str, mode: OpenMode) -> Result<Self::File, FsError> {
        match self {
            Self::Sd(card) => card.open(path, mode).map(BoardFile::Sd),
            Self::Ram(ram) => ram.open(path, mode).map(BoardFile::Ram),
        }
    }

    fn read(&mut self, file: &mut Self::File, buf: &mut [u8]) -> Result<usize, FsError> {
        match (self, file) {
            (Self::Sd(card), BoardFile::Sd(file)) => card.read(file, buf),
            (Self::Ram(ram), BoardFile::Ram(file)) => ram.read(file, buf),
            _ => Err(FsError::Io),
        }
    }

    fn write(&mut self, file: &mut Self::File, data: &[u8]) -> Result<(), FsError> {
        match (self, file) {
            (Self::Sd(card), BoardFile::Sd(file)) => card.write(file, data),
            (Self::Ram(ram), BoardFile::Ram(file)) => ram.write(file, data),
            _ => Err(FsError::Io),
        }
    }

    fn close(&mut self, file: Self::File) -> Result<(), FsError> {
        match (self, file) {
            (Self::Sd(card), BoardFile::Sd(file)) => card.close(file),
            (Self::Ram(ram), BoardFile::Ram(file)) => ram.close(file),
            _ => Err(FsError::Io),
        }
    }

    fn file_size(&mut self, path: &str) -> Result<u32, FsError> {
        match self {
            Self::Sd(card) => card.file_size(path),
            Self::Ram(ram) => ram.file_size(path),
        }
    }

    fn remove(&mut self, path: &str) -> Result<(), FsError> {
        match self {
            Self::Sd(card) => card.remove(path),
            Self::Ram(ram) => ram.remove(path),
        }
    }

    fn dir_exists(&mut self, path: &str) -> Result<bool, FsError> {
        match self {
            Self::Sd(card) => card.dir_exists(path),
            Self::Ram(ram) => ram.dir_exists(path),
        }
    }

    fn create_dir(&mut self, path: &str) -> Result<(), FsError> {
        match self {
            Self::Sd(card) => card.create_dir(path),
            Self::Ram(ram) => ram.create_dir(path),
        }
    }
}
