use embedded_hal::{
    delay::DelayNs,
    digital::OutputPin,
    spi::{SpiBus, SpiDevice},
};
use embedded_hal_bus::spi::{ExclusiveDevice, NoDelay};
use embedded_sdmmc::{
    Mode, RawDirectory, RawFile, SdCard, SdCardError, TimeSource, Timestamp, VolumeIdx,
    VolumeManager,
};
use heapless::Vec;
use log::{debug, info, warn};
use winesp32_core::storage::{FileStore, FsError, OpenMode};

/// Directory levels below the root a path may walk through. The volume
/// manager keeps the root open permanently, leaving three directory slots.
const MAX_DIR_DEPTH: usize = 3;

type SdError = embedded_sdmmc::Error<SdCardError>;

/// Open file handle on the card.
pub type SdFile = RawFile;

/// SPI device with exclusive bus ownership, as used for the card slot.
pub type SdSpiDevice<BUS, CS> = ExclusiveDevice<BUS, CS, NoDelay>;

/// Fixed timestamp source used until RTC time integration is added.
#[derive(Clone, Copy, Debug, Default)]
pub struct FixedTimeSource;

impl TimeSource for FixedTimeSource {
    fn get_timestamp(&self) -> Timestamp {
        // 2026-01-01 00:00:00
        Timestamp {
            year_since_1970: 56,
            zero_indexed_month: 0,
            zero_indexed_day: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }
}

/// SD mount error details.
#[derive(Debug)]
pub enum SdMountError<BusErr, CsErr>
where
    BusErr: core::fmt::Debug,
    CsErr: core::fmt::Debug,
{
    ChipSelect(CsErr),
    Spi(BusErr),
    Card(SdCardError),
    Filesystem(SdError),
}

/// FAT volume on an SPI SD card, exposed as a [`FileStore`].
///
/// The volume manager uses interior mutability, so the store is shared by
/// reference: `&SdFileStore` implements [`FileStore`]. Paths are
/// `/`-separated 8.3 short names relative to the volume root.
pub struct SdFileStore<SPI, DELAY>
where
    SPI: SpiDevice<u8>,
    DELAY: DelayNs,
{
    volume_mgr: VolumeManager<SdCard<SPI, DELAY>, FixedTimeSource>,
    root: RawDirectory,
    card_size_bytes: u64,
}

impl<BUS, CS, DELAY> SdFileStore<SdSpiDevice<BUS, CS>, DELAY>
where
    BUS: SpiBus<u8>,
    CS: OutputPin,
    DELAY: DelayNs,
    BUS::Error: core::fmt::Debug,
    CS::Error: core::fmt::Debug,
{
    /// Initialize the card and open the first FAT volume.
    pub fn mount(
        mut bus: BUS,
        mut cs: CS,
        delay: DELAY,
    ) -> Result<Self, SdMountError<BUS::Error, CS::Error>> {
        cs.set_high().map_err(SdMountError::ChipSelect)?;

        // SD SPI init requires >=74 clock cycles with CS deasserted.
        let preclock = [0xFFu8; 10];
        bus.write(&preclock).map_err(SdMountError::Spi)?;

        let spi_device =
            ExclusiveDevice::new_no_delay(bus, cs).map_err(SdMountError::ChipSelect)?;
        let sd_card = SdCard::new(spi_device, delay);
        let card_size_bytes = sd_card.num_bytes().map_err(SdMountError::Card)?;

        let volume_mgr = VolumeManager::new(sd_card, FixedTimeSource);
        let volume = volume_mgr
            .open_raw_volume(VolumeIdx(0))
            .map_err(SdMountError::Filesystem)?;
        let root = volume_mgr
            .open_root_dir(volume)
            .map_err(SdMountError::Filesystem)?;

        info!("sd: mounted card_bytes={}", card_size_bytes);
        Ok(Self {
            volume_mgr,
            root,
            card_size_bytes,
        })
    }
}

impl<SPI, DELAY> SdFileStore<SPI, DELAY>
where
    SPI: SpiDevice<u8>,
    DELAY: DelayNs,
{
    pub const fn card_size_bytes(&self) -> u64 {
        self.card_size_bytes
    }

    /// Walk to the parent directory of `path` and run `op` with it and the
    /// leaf name. Directories opened on the way are closed again.
    fn with_parent<R>(
        &self,
        path: &str,
        op: impl FnOnce(RawDirectory, &str) -> Result<R, SdError>,
    ) -> Result<R, FsError> {
        let path = path.trim_matches('/');
        let (dirs, leaf) = path.rsplit_once('/').unwrap_or(("", path));
        if leaf.is_empty() {
            return Err(FsError::InvalidName);
        }

        let mut opened: Vec<RawDirectory, MAX_DIR_DEPTH> = Vec::new();
        let mut parent = self.root;
        for segment in dirs.split('/').filter(|segment| !segment.is_empty()) {
            if opened.is_full() {
                self.close_dirs(&opened);
                return Err(FsError::InvalidName);
            }
            match self.volume_mgr.open_dir(parent, segment) {
                Ok(dir) => {
                    parent = dir;
                    let _ = opened.push(dir);
                }
                Err(err) => {
                    self.close_dirs(&opened);
                    return Err(map_sd_error(err));
                }
            }
        }

        let result = op(parent, leaf).map_err(map_sd_error);
        self.close_dirs(&opened);
        result
    }

    fn close_dirs(&self, dirs: &[RawDirectory]) {
        for dir in dirs.iter().rev() {
            if let Err(err) = self.volume_mgr.close_dir(*dir) {
                warn!("sd: close dir failed: {:?}", err);
            }
        }
    }
}

impl<SPI, DELAY> FileStore for &SdFileStore<SPI, DELAY>
where
    SPI: SpiDevice<u8>,
    DELAY: DelayNs,
{
    type File = SdFile;

    fn open(&mut self, path: &str, mode: OpenMode) -> Result<Self::File, FsError> {
        let mode = match mode {
            OpenMode::Read => Mode::ReadOnly,
            OpenMode::WriteTruncate => Mode::ReadWriteCreateOrTruncate,
        };
        let store = *self;
        let file = store.with_parent(path, |dir, leaf| {
            store.volume_mgr.open_file_in_dir(dir, leaf, mode)
        })?;
        debug!("sd: open path={} mode={:?}", path, mode);
        Ok(file)
    }

    fn read(&mut self, file: &mut Self::File, buf: &mut [u8]) -> Result<usize, FsError> {
        match self.volume_mgr.read(*file, buf) {
            Ok(read) => Ok(read),
            Err(embedded_sdmmc::Error::EndOfFile) => Ok(0),
            Err(err) => Err(map_sd_error(err)),
        }
    }

    fn write(&mut self, file: &mut Self::File, data: &[u8]) -> Result<(), FsError> {
        self.volume_mgr.write(*file, data).map_err(map_sd_error)
    }

    fn close(&mut self, file: Self::File) -> Result<(), FsError> {
        self.volume_mgr.close_file(file).map_err(map_sd_error)
    }

    fn file_size(&mut self, path: &str) -> Result<u32, FsError> {
        let store = *self;
        let entry = store.with_parent(path, |dir, leaf| {
            store.volume_mgr.find_directory_entry(dir, leaf)
        })?;
        if entry.attributes.is_directory() {
            return Err(FsError::InvalidName);
        }
        Ok(entry.size)
    }

    fn remove(&mut self, path: &str) -> Result<(), FsError> {
        let store = *self;
        store.with_parent(path, |dir, leaf| {
            store.volume_mgr.delete_file_in_dir(dir, leaf)
        })
    }

    fn dir_exists(&mut self, path: &str) -> Result<bool, FsError> {
        if path.trim_matches('/').is_empty() {
            return Ok(true);
        }
        let store = *self;
        match store.with_parent(path, |dir, leaf| {
            store.volume_mgr.find_directory_entry(dir, leaf)
        }) {
            Ok(entry) => Ok(entry.attributes.is_directory()),
            Err(FsError::NotFound) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn create_dir(&mut self, path: &str) -> Result<(), FsError> {
        let store = *self;
        store.with_parent(path, |dir, leaf| store.volume_mgr.make_dir_in_dir(dir, leaf))
    }
}

fn map_sd_error(err: SdError) -> FsError {
    use embedded_sdmmc::Error;

    match err {
        Error::NotFound => FsError::NotFound,
        Error::FileAlreadyOpen | Error::DirAlreadyOpen => FsError::AlreadyOpen,
        Error::FilenameError(_)
        | Error::OpenedDirAsFile
        | Error::OpenedFileAsDir
        | Error::DeleteDirAsFile
        | Error::DirAlreadyExists => FsError::InvalidName,
        Error::DiskFull | Error::NotEnoughSpace => FsError::NoSpace,
        other => {
            warn!("sd: io error: {:?}", other);
            FsError::Io
        }
    }
}
