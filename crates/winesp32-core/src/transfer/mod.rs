//! Chunked BLE GATT file transfer.
//!
//! [`TransferService`] owns at most one transfer. Bytes only move when the
//! peer reads or writes the Data characteristic; the service never pumps
//! data on its own, so a stalled peer leaves the session parked until it is
//! cancelled or the link drops.

mod gatt;
mod link;
mod session;

use alloc::{boxed::Box, vec::Vec};

use heapless::String;
use log::{debug, info, warn};

use crate::{
    settings::{BT_NAME_BYTES, SettingsRecord},
    storage::{FileStore, FsError, OpenMode},
    text::{bounded, file_name, join_path},
};

pub use gatt::{
    CONTROL_CANCEL, CONTROL_MAX_BYTES, CONTROL_START_RECEIVE, ControlCommand, ControlPayload,
    DataChunk, GattReply, GattRequest, INFO_MAX_BYTES, InfoText, format_info,
};
pub use link::{Advertiser, LinkState, PeerInfo};
pub use session::{
    FILENAME_BYTES, TransferDirection, TransferInfo, TransferStatus, progress_percent,
};

/// Largest payload of one Data characteristic access.
pub const TRANSFER_CHUNK_BYTES: usize = 512;
pub const SAVE_DIR_BYTES: usize = 64;
const SAVE_PATH_BYTES: usize = SAVE_DIR_BYTES + 1 + FILENAME_BYTES;

pub type DeviceName = String<BT_NAME_BYTES>;

/// Invoked synchronously after every chunk and once more on completion.
pub type ProgressCallback = Box<dyn FnMut(&TransferInfo)>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransferError {
    NotInitialized,
    NotConnected,
    /// Another transfer is already sending or receiving.
    Busy,
    FileOpenFailed,
    /// Scratch buffer allocation failed.
    InsufficientResources,
    /// Data access while no matching transfer is active.
    InvalidState,
    /// Malformed Control write.
    InvalidCommand,
    /// Read or write failed mid-session.
    Io,
}

impl TransferError {
    pub const fn code(self) -> i32 {
        match self {
            Self::NotInitialized => -1,
            Self::NotConnected => -2,
            Self::Busy => -3,
            Self::FileOpenFailed => -4,
            Self::InsufficientResources => -5,
            Self::InvalidState => -6,
            Self::InvalidCommand => -7,
            Self::Io => -8,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TransferConfig {
    /// Receive directory used until `receive_file` records another one.
    pub default_save_dir: &'static str,
    /// Advertised when settings carry no device name.
    pub default_device_name: &'static str,
}

impl TransferConfig {
    pub const fn new() -> Self {
        Self {
            default_save_dir: "RECV",
            default_device_name: "WinESP32",
        }
    }

    pub const fn with_default_save_dir(mut self, dir: &'static str) -> Self {
        self.default_save_dir = dir;
        self
    }

    pub const fn with_default_device_name(mut self, name: &'static str) -> Self {
        self.default_device_name = name;
        self
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TransferService<S: FileStore> {
    fs: S,
    config: TransferConfig,
    initialized: bool,

    info: TransferInfo,
    file: Option<S::File>,
    scratch: Option<Vec<u8>>,
    save_dir: String<SAVE_DIR_BYTES>,
    callback: Option<ProgressCallback>,

    link: LinkState,
    peer: Option<PeerInfo>,
    device_name: DeviceName,
}

impl<S: FileStore> TransferService<S> {
    pub fn new(fs: S, config: TransferConfig) -> Self {
        Self {
            fs,
            initialized: false,
            info: TransferInfo::default(),
            file: None,
            scratch: None,
            save_dir: bounded(config.default_save_dir),
            callback: None,
            link: LinkState::Idle,
            peer: None,
            device_name: bounded(config.default_device_name),
            config,
        }
    }

    pub fn init(&mut self) -> Result<(), TransferError> {
        if self.initialized {
            return Ok(());
        }
        self.info = TransferInfo::default();
        self.initialized = true;
        info!("bt-transfer: ready name={}", self.device_name);
        Ok(())
    }

    /// Cancel any transfer and return to the uninitialized state.
    pub fn deinit(&mut self) {
        self.cancel();
        self.initialized = false;
    }

    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Start serving `path` to the connected peer through Data reads.
    pub fn send_file(
        &mut self,
        path: &str,
        callback: Option<ProgressCallback>,
    ) -> Result<(), TransferError> {
        self.ensure_initialized()?;
        if !self.is_connected() {
            return Err(TransferError::NotConnected);
        }
        self.ensure_idle()?;

        let file = self.fs.open(path, OpenMode::Read).map_err(|err| {
            warn!("bt-transfer: send open failed path={} err={:?}", path, err);
            TransferError::FileOpenFailed
        })?;
        let size = match self.fs.file_size(path) {
            Ok(size) => size,
            Err(err) => {
                warn!("bt-transfer: send stat failed path={} err={:?}", path, err);
                let _ = self.fs.close(file);
                return Err(TransferError::FileOpenFailed);
            }
        };
        let scratch = match alloc_scratch() {
            Ok(scratch) => scratch,
            Err(err) => {
                let _ = self.fs.close(file);
                return Err(err);
            }
        };

        self.release_session_resources();
        self.file = Some(file);
        self.scratch = Some(scratch);
        self.callback = callback;
        self.info = TransferInfo::started(bounded(file_name(path)), size, TransferDirection::Send);
        info!(
            "bt-transfer: send started file={} size={}",
            self.info.filename, size
        );
        Ok(())
    }

    /// Record where the next peer-initiated receive lands. The filename and
    /// size arrive later through the Control characteristic.
    pub fn receive_file(
        &mut self,
        save_dir: &str,
        callback: Option<ProgressCallback>,
    ) -> Result<(), TransferError> {
        self.ensure_initialized()?;
        self.ensure_idle()?;
        self.save_dir = bounded(save_dir);
        self.callback = callback;
        debug!("bt-transfer: receive armed dir={}", self.save_dir);
        Ok(())
    }

    /// Close any open file, drop the scratch buffer and callback, and force
    /// the session back to idle.
    pub fn cancel(&mut self) {
        if self.info.status.is_active() {
            info!(
                "bt-transfer: cancelled file={} at={}/{}",
                self.info.filename, self.info.transferred, self.info.total_size
            );
        }
        self.release_session_resources();
        self.callback = None;
        self.info = TransferInfo::default();
    }

    pub const fn status(&self) -> TransferStatus {
        self.info.status
    }

    pub const fn info(&self) -> &TransferInfo {
        &self.info
    }

    pub const fn progress(&self) -> u8 {
        self.info.progress
    }

    pub fn save_dir(&self) -> &str {
        self.save_dir.as_str()
    }

    // GATT characteristic handlers

    pub fn read_info(&self) -> InfoText {
        format_info(&self.info)
    }

    pub const fn read_control(&self) -> u8 {
        self.info.status.as_raw()
    }

    /// Pull the next chunk of the file being sent. The returned slice stays
    /// valid until the next call on the service.
    pub fn read_data(&mut self) -> Result<&[u8], TransferError> {
        self.ensure_initialized()?;
        if self.info.status != TransferStatus::Sending {
            self.scratch = None;
            return Err(TransferError::InvalidState);
        }

        let want = TRANSFER_CHUNK_BYTES.min(self.info.remaining() as usize);
        let read = match (self.file.as_mut(), self.scratch.as_mut()) {
            (Some(file), Some(scratch)) if want > 0 => self.fs.read(file, &mut scratch[..want]),
            (Some(_), Some(_)) => Ok(0),
            _ => return Err(TransferError::InvalidState),
        };
        let read = match read {
            Ok(read) => read,
            Err(err) => {
                self.fail(err);
                return Err(TransferError::Io);
            }
        };

        if read > 0 {
            self.info.advance(read);
        }
        if read == 0 || self.info.remaining() == 0 {
            self.finish();
        } else {
            self.notify();
        }

        Ok(self
            .scratch
            .as_deref()
            .map_or(&[][..], |scratch| &scratch[..read]))
    }

    /// Append a chunk to the file being received. Bytes past the declared
    /// size are dropped; returns the number of bytes stored.
    pub fn write_data(&mut self, data: &[u8]) -> Result<usize, TransferError> {
        self.ensure_initialized()?;
        if self.info.status != TransferStatus::Receiving {
            return Err(TransferError::InvalidState);
        }

        let take = data.len().min(self.info.remaining() as usize);
        if take < data.len() {
            warn!(
                "bt-transfer: dropped {} bytes past declared size",
                data.len() - take
            );
        }
        let file = self.file.as_mut().ok_or(TransferError::InvalidState)?;
        if take > 0 {
            if let Err(err) = self.fs.write(file, &data[..take]) {
                self.fail(err);
                return Err(TransferError::Io);
            }
        }

        self.info.advance(take);
        if self.info.remaining() == 0 {
            self.finish();
        } else {
            self.notify();
        }
        Ok(take)
    }

    pub fn write_control(&mut self, payload: &[u8]) -> Result<(), TransferError> {
        self.ensure_initialized()?;
        match ControlCommand::parse(payload) {
            Ok(ControlCommand::Cancel) => {
                self.cancel();
                Ok(())
            }
            Ok(ControlCommand::StartReceive { filename, size }) => {
                self.start_receive(filename, size)
            }
            Err(err) => {
                warn!("bt-transfer: bad control write len={}", payload.len());
                Err(err)
            }
        }
    }

    // Link

    /// Start advertising under the settings' device name, or the factory
    /// name when none is configured.
    pub fn start_advertising<A: Advertiser>(
        &mut self,
        adv: &mut A,
        settings: &SettingsRecord,
    ) -> Result<(), TransferError> {
        self.ensure_initialized()?;
        if self.link == LinkState::Connected {
            return Err(TransferError::InvalidState);
        }
        self.device_name = if settings.bt_name.is_empty() {
            bounded(self.config.default_device_name)
        } else {
            bounded(settings.bt_name.as_str())
        };
        if self.link == LinkState::Advertising {
            adv.stop();
        }
        adv.start(&self.device_name);
        self.link = LinkState::Advertising;
        info!("bt-transfer: advertising name={}", self.device_name);
        Ok(())
    }

    pub fn stop_advertising<A: Advertiser>(&mut self, adv: &mut A) {
        if self.link == LinkState::Advertising {
            adv.stop();
            self.link = LinkState::Idle;
            info!("bt-transfer: advertising stopped");
        }
    }

    pub fn on_connected(&mut self, peer: PeerInfo) {
        info!(
            "bt-transfer: connected peer={:02x?} rssi={}",
            peer.address, peer.rssi
        );
        self.peer = Some(peer);
        self.link = LinkState::Connected;
    }

    /// Cancel any active transfer, then resume advertising. Ignored unless a
    /// peer is connected.
    pub fn on_disconnected<A: Advertiser>(&mut self, adv: &mut A) {
        if self.link != LinkState::Connected {
            debug!("bt-transfer: disconnect ignored link={:?}", self.link);
            return;
        }
        info!("bt-transfer: disconnected");
        if self.info.status.is_active() {
            self.cancel();
        }
        self.peer = None;
        adv.start(&self.device_name);
        self.link = LinkState::Advertising;
    }

    pub fn update_rssi(&mut self, rssi: i8) {
        if let Some(peer) = self.peer.as_mut() {
            peer.rssi = rssi;
        }
    }

    pub const fn peer(&self) -> Option<&PeerInfo> {
        self.peer.as_ref()
    }

    pub const fn is_connected(&self) -> bool {
        matches!(self.link, LinkState::Connected)
    }

    pub const fn link_state(&self) -> LinkState {
        self.link
    }

    pub fn device_name(&self) -> &str {
        self.device_name.as_str()
    }

    /// Rename the device; advertising restarts so the new name goes out.
    pub fn set_device_name<A: Advertiser>(&mut self, name: &str, adv: &mut A) {
        self.device_name = if name.is_empty() {
            bounded(self.config.default_device_name)
        } else {
            bounded(name)
        };
        if self.link == LinkState::Advertising {
            adv.stop();
            adv.start(&self.device_name);
            debug!("bt-transfer: advertising restarted name={}", self.device_name);
        }
    }

    fn start_receive(&mut self, filename: &str, size: u32) -> Result<(), TransferError> {
        self.ensure_idle()?;

        let dir = self.save_dir.trim_end_matches('/');
        if !dir.is_empty() {
            match self.fs.dir_exists(dir) {
                Ok(true) => {}
                Ok(false) => self.fs.create_dir(dir).map_err(|err| {
                    warn!("bt-transfer: mkdir failed dir={} err={:?}", dir, err);
                    TransferError::FileOpenFailed
                })?,
                Err(err) => {
                    warn!("bt-transfer: stat dir failed dir={} err={:?}", dir, err);
                    return Err(TransferError::FileOpenFailed);
                }
            }
        }

        let path: String<SAVE_PATH_BYTES> =
            join_path(dir, filename).ok_or(TransferError::InvalidCommand)?;
        let file = self.fs.open(&path, OpenMode::WriteTruncate).map_err(|err| {
            warn!("bt-transfer: receive open failed path={} err={:?}", path, err);
            TransferError::FileOpenFailed
        })?;

        self.release_session_resources();
        self.file = Some(file);
        self.info = TransferInfo::started(bounded(filename), size, TransferDirection::Receive);
        info!(
            "bt-transfer: receive started file={} size={}",
            self.info.filename, size
        );

        if size == 0 {
            self.finish();
        }
        Ok(())
    }

    /// Close the file, mark the session complete and deliver the final
    /// notification. The scratch buffer outlives this call so the last
    /// chunk can still be returned.
    fn finish(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(err) = self.fs.close(file) {
                warn!("bt-transfer: close failed err={:?}", err);
            }
        }
        self.info.status = TransferStatus::Complete;
        info!(
            "bt-transfer: complete file={} bytes={}",
            self.info.filename, self.info.transferred
        );
        self.notify();
        self.callback = None;
    }

    fn fail(&mut self, err: FsError) {
        warn!(
            "bt-transfer: io error file={} at={} err={:?}",
            self.info.filename, self.info.transferred, err
        );
        self.release_session_resources();
        self.info.status = TransferStatus::Error;
        self.notify();
        self.callback = None;
    }

    fn release_session_resources(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(err) = self.fs.close(file) {
                warn!("bt-transfer: close failed err={:?}", err);
            }
        }
        self.scratch = None;
    }

    fn notify(&mut self) {
        if let Some(callback) = self.callback.as_mut() {
            callback(&self.info);
        }
    }

    fn ensure_initialized(&self) -> Result<(), TransferError> {
        if self.initialized {
            Ok(())
        } else {
            Err(TransferError::NotInitialized)
        }
    }

    fn ensure_idle(&self) -> Result<(), TransferError> {
        if self.info.status.is_active() {
            debug!(
                "bt-transfer: busy status={:?} file={}",
                self.info.status, self.info.filename
            );
            Err(TransferError::Busy)
        } else {
            Ok(())
        }
    }
}

fn alloc_scratch() -> Result<Vec<u8>, TransferError> {
    let mut scratch = Vec::new();
    scratch.try_reserve_exact(TRANSFER_CHUNK_BYTES).map_err(|_| {
        warn!("bt-transfer: scratch allocation failed");
        TransferError::InsufficientResources
    })?;
    scratch.resize(TRANSFER_CHUNK_BYTES, 0);
    Ok(scratch)
}
