//! Persisted system settings with write-through accessors.
//!
//! [`SettingsStore`] owns the single in-memory [`SettingsRecord`], persists it
//! as a versioned fixed-layout image through a [`FileStore`] and re-clamps
//! out-of-range values whenever a record is loaded.

mod codec;
mod record;

use core::fmt::Write as _;

use heapless::String;
use log::{debug, error, info, warn};

use crate::{
    storage::{FileStore, FsError, OpenMode, read_full},
    text::bounded,
};

pub use codec::{FILE_LEN, RECORD_LEN, SETTINGS_MAGIC, SETTINGS_VERSION};
pub use record::{
    APP_NAME_BYTES, BRIGHTNESS_MAX, BT_NAME_BYTES, CITY_BYTES, DEFAULT_AVATAR_COLOR,
    DEFAULT_BT_NAME, DEFAULT_USERNAME, DESKTOP_COLS_MAX, DESKTOP_COLS_MIN, DESKTOP_ROWS_MAX,
    DESKTOP_ROWS_MIN, ICON_POSITION_SLOTS, IconPosition, KEYBOARD_HEIGHT_MAX, KEYBOARD_HEIGHT_MIN,
    KeyboardTheme, Location, LockType, PASSWORD_BYTES, PINNED_APP_SLOTS, SettingsRecord,
    USERNAME_BYTES, UiStyle, WIFI_MAX_ENTRIES, WIFI_PASSWORD_BYTES, WIFI_SSID_BYTES, WifiEntry,
    keyboard_px,
};

use codec::{HEADER_LEN, check_header, decode_record, encode_file};
use record::{clamp_desktop_cols, clamp_desktop_rows, clamp_keyboard_percent};

const AVATAR_COLOR_MASK: u32 = 0x00FF_FFFF;

/// Enough for `UTC+12`, `UTC-14`, `UTC0`.
pub type PosixTimezone = String<8>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SettingsError {
    /// No settings file on the volume.
    NotFound,
    /// Bad magic, unsupported version, wrong length or undecodable field.
    InvalidFormat,
    Io,
    /// Icon position table is full.
    CapacityExceeded,
    /// WiFi or icon lookup miss.
    NotFoundInList,
    /// Pinned-app slot out of range.
    InvalidIndex,
}

impl SettingsError {
    pub const fn code(self) -> i32 {
        match self {
            Self::NotFound => -1,
            Self::InvalidFormat => -2,
            Self::Io => -3,
            Self::CapacityExceeded => -4,
            Self::NotFoundInList => -5,
            Self::InvalidIndex => -6,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SettingsConfig {
    pub path: &'static str,
    /// Vertical resolution used to derive the keyboard height in pixels.
    pub screen_height_px: u16,
    /// Backlight floor; the panel goes dark below it.
    pub brightness_min: u8,
}

impl SettingsConfig {
    pub const fn new() -> Self {
        Self {
            path: "SYSTEM.CFG",
            screen_height_px: 800,
            brightness_min: 10,
        }
    }

    pub const fn with_path(mut self, path: &'static str) -> Self {
        self.path = path;
        self
    }

    pub const fn with_screen_height_px(mut self, screen_height_px: u16) -> Self {
        self.screen_height_px = screen_height_px;
        self
    }

    /// Capped at [`BRIGHTNESS_MAX`].
    pub const fn with_brightness_min(mut self, brightness_min: u8) -> Self {
        self.brightness_min = if brightness_min > BRIGHTNESS_MAX {
            BRIGHTNESS_MAX
        } else {
            brightness_min
        };
        self
    }
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SettingsStore<S: FileStore> {
    fs: S,
    config: SettingsConfig,
    record: SettingsRecord,
    initialized: bool,
    timezone_hook: Option<fn(&str)>,
}

impl<S: FileStore> SettingsStore<S> {
    pub fn new(fs: S, config: SettingsConfig) -> Self {
        Self {
            record: SettingsRecord::with_defaults(config.screen_height_px),
            fs,
            config,
            initialized: false,
            timezone_hook: None,
        }
    }

    /// Receives the POSIX TZ string whenever the timezone is applied.
    pub fn with_timezone_hook(mut self, hook: fn(&str)) -> Self {
        self.timezone_hook = Some(hook);
        self
    }

    pub const fn config(&self) -> &SettingsConfig {
        &self.config
    }

    /// Load the record, falling back to freshly saved defaults, then apply
    /// the timezone. Calling it again once initialized does nothing.
    pub fn init(&mut self) -> Result<(), SettingsError> {
        if self.initialized {
            return Ok(());
        }

        if let Err(err) = self.load() {
            warn!(
                "settings: load failed err={:?}; writing defaults path={}",
                err, self.config.path
            );
            self.record = SettingsRecord::with_defaults(self.config.screen_height_px);
            self.save()?;
        }

        self.apply_timezone();
        self.initialized = true;
        info!(
            "settings: ready brightness={} tz={} wifi={}",
            self.record.brightness,
            self.record.timezone,
            self.record.wifi.len()
        );
        Ok(())
    }

    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Drop the initialized flag; the in-memory record is kept.
    pub fn deinit(&mut self) {
        self.initialized = false;
    }

    /// Replace the in-memory record with the persisted one. The record is
    /// left untouched on failure.
    pub fn load(&mut self) -> Result<(), SettingsError> {
        let mut record = self.read_record()?;
        let clamped = validate(&mut record, &self.config);
        if clamped > 0 {
            warn!("settings: clamped {} out-of-range fields", clamped);
        }
        self.record = record;
        info!(
            "settings: loaded version={} bytes={}",
            SETTINGS_VERSION, FILE_LEN
        );
        Ok(())
    }

    pub fn save(&mut self) -> Result<(), SettingsError> {
        let image = encode_file(&self.record);
        let mut file = self
            .fs
            .open(self.config.path, OpenMode::WriteTruncate)
            .map_err(|err| {
                error!(
                    "settings: save open failed path={} err={:?}",
                    self.config.path, err
                );
                SettingsError::Io
            })?;
        let written = self.fs.write(&mut file, &image);
        let closed = self.fs.close(file);
        written.and(closed).map_err(|err| {
            error!(
                "settings: save failed path={} err={:?}",
                self.config.path, err
            );
            SettingsError::Io
        })?;
        debug!("settings: saved bytes={}", image.len());
        Ok(())
    }

    pub const fn record(&self) -> &SettingsRecord {
        &self.record
    }

    /// Delete the settings file and persist a fresh default record.
    pub fn factory_reset(&mut self) -> Result<(), SettingsError> {
        match self.fs.remove(self.config.path) {
            Ok(()) | Err(FsError::NotFound) => {}
            Err(err) => {
                error!("settings: factory reset remove failed err={:?}", err);
                return Err(SettingsError::Io);
            }
        }
        self.record = SettingsRecord::with_defaults(self.config.screen_height_px);
        info!("settings: factory reset");
        self.save()?;
        self.apply_timezone();
        Ok(())
    }

    fn read_record(&mut self) -> Result<SettingsRecord, SettingsError> {
        let mut file = self
            .fs
            .open(self.config.path, OpenMode::Read)
            .map_err(|err| match err {
                FsError::NotFound => SettingsError::NotFound,
                _ => SettingsError::Io,
            })?;
        let result = read_image(&mut self.fs, &mut file);
        let closed = self.fs.close(file);
        let record = result?;
        closed.map_err(|_| SettingsError::Io)?;
        Ok(record)
    }

    fn update(&mut self, apply: impl FnOnce(&mut SettingsRecord)) -> Result<(), SettingsError> {
        apply(&mut self.record);
        self.save()
    }

    fn apply_timezone(&self) {
        let tz = posix_timezone(self.record.timezone);
        debug!("settings: timezone applied tz={}", tz.as_str());
        if let Some(hook) = self.timezone_hook {
            hook(tz.as_str());
        }
    }

    // Display

    pub const fn brightness(&self) -> u8 {
        self.record.brightness
    }

    pub fn set_brightness(&mut self, brightness: u8) -> Result<(), SettingsError> {
        let value = brightness.clamp(self.config.brightness_min, BRIGHTNESS_MAX);
        self.update(|r| r.brightness = value)
    }

    pub const fn wallpaper(&self) -> u8 {
        self.record.wallpaper
    }

    pub fn set_wallpaper(&mut self, index: u8) -> Result<(), SettingsError> {
        self.update(|r| r.wallpaper = index)
    }

    // Time

    pub const fn timezone(&self) -> i8 {
        self.record.timezone
    }

    pub fn set_timezone(&mut self, hours: i8) -> Result<(), SettingsError> {
        self.update(|r| r.timezone = hours)?;
        self.apply_timezone();
        Ok(())
    }

    pub fn posix_timezone(&self) -> PosixTimezone {
        posix_timezone(self.record.timezone)
    }

    pub const fn use_24h(&self) -> bool {
        self.record.use_24h
    }

    pub fn set_use_24h(&mut self, enabled: bool) -> Result<(), SettingsError> {
        self.update(|r| r.use_24h = enabled)
    }

    pub const fn last_time(&self) -> i64 {
        self.record.last_time
    }

    pub fn set_last_time(&mut self, unix_seconds: i64) -> Result<(), SettingsError> {
        self.update(|r| r.last_time = unix_seconds)
    }

    // WiFi

    /// Update the entry with a matching SSID, or append a new one, evicting
    /// the oldest entry when the list is full.
    pub fn save_wifi(&mut self, ssid: &str, password: &str) -> Result<(), SettingsError> {
        let ssid: String<WIFI_SSID_BYTES> = bounded(ssid);
        let password: String<WIFI_PASSWORD_BYTES> = bounded(password);

        if let Some(idx) = self.find_wifi(&ssid) {
            let entry = &mut self.record.wifi[idx];
            entry.password = password;
            entry.valid = true;
            return self.save();
        }

        if self.record.wifi.is_full() {
            let evicted = self.record.wifi.remove(0);
            info!("settings: wifi list full; dropped ssid={}", evicted.ssid);
        }
        self.record
            .wifi
            .push(WifiEntry {
                ssid,
                password,
                valid: true,
            })
            .map_err(|_| SettingsError::CapacityExceeded)?;
        self.save()
    }

    pub fn delete_wifi(&mut self, ssid: &str) -> Result<(), SettingsError> {
        let idx = self.find_wifi(ssid).ok_or(SettingsError::NotFoundInList)?;
        self.record.wifi.remove(idx);
        self.save()
    }

    pub fn find_wifi(&self, ssid: &str) -> Option<usize> {
        self.record
            .wifi
            .iter()
            .position(|entry| entry.ssid.as_str() == ssid)
    }

    pub fn wifi_count(&self) -> usize {
        self.record.wifi.len()
    }

    pub fn wifi_entry(&self, index: usize) -> Option<&WifiEntry> {
        self.record.wifi.get(index)
    }

    /// Oldest first.
    pub fn wifi_entries(&self) -> &[WifiEntry] {
        &self.record.wifi
    }

    // Keyboard

    pub fn set_keyboard_height(&mut self, percent: u8) -> Result<(), SettingsError> {
        let percent = clamp_keyboard_percent(percent);
        let px = keyboard_px(percent, self.config.screen_height_px);
        self.update(|r| {
            r.keyboard_height_percent = percent;
            r.keyboard_height_px = px;
        })
    }

    pub const fn keyboard_height(&self) -> u8 {
        self.record.keyboard_height_percent
    }

    pub const fn keyboard_height_px(&self) -> u16 {
        self.record.keyboard_height_px
    }

    pub const fn keyboard_use_percent(&self) -> bool {
        self.record.keyboard_use_percent
    }

    pub fn set_keyboard_use_percent(&mut self, enabled: bool) -> Result<(), SettingsError> {
        self.update(|r| r.keyboard_use_percent = enabled)
    }

    pub const fn keyboard_theme(&self) -> KeyboardTheme {
        self.record.keyboard_theme
    }

    pub fn set_keyboard_theme(&mut self, theme: KeyboardTheme) -> Result<(), SettingsError> {
        self.update(|r| r.keyboard_theme = theme)
    }

    // Location

    /// Store a location; its offset also becomes the global timezone.
    pub fn set_location(
        &mut self,
        city: &str,
        latitude: f32,
        longitude: f32,
        timezone: i8,
    ) -> Result<(), SettingsError> {
        let city = bounded(city);
        self.update(|r| {
            r.location = Location {
                city,
                latitude,
                longitude,
                timezone,
                valid: true,
            };
            r.timezone = timezone;
        })?;
        self.apply_timezone();
        Ok(())
    }

    pub fn location(&self) -> Option<&Location> {
        self.record
            .location
            .valid
            .then_some(&self.record.location)
    }

    pub fn clear_location(&mut self) -> Result<(), SettingsError> {
        self.update(|r| r.location = Location::default())
    }

    // User

    pub fn username(&self) -> &str {
        if self.record.username.is_empty() {
            DEFAULT_USERNAME
        } else {
            self.record.username.as_str()
        }
    }

    pub fn set_username(&mut self, name: &str) -> Result<(), SettingsError> {
        let name = if name.is_empty() { DEFAULT_USERNAME } else { name };
        let name = bounded(name);
        self.update(|r| r.username = name)
    }

    pub const fn avatar_color(&self) -> u32 {
        match self.record.avatar_color & AVATAR_COLOR_MASK {
            0 => DEFAULT_AVATAR_COLOR,
            color => color,
        }
    }

    pub fn set_avatar_color(&mut self, rgb: u32) -> Result<(), SettingsError> {
        let color = match rgb & AVATAR_COLOR_MASK {
            0 => DEFAULT_AVATAR_COLOR,
            color => color,
        };
        self.update(|r| r.avatar_color = color)
    }

    pub fn set_password(&mut self, password: &str) -> Result<(), SettingsError> {
        let password = bounded(password);
        self.update(|r| r.password = password)
    }

    pub const fn password_enabled(&self) -> bool {
        self.record.password_enabled
    }

    pub fn set_password_enabled(&mut self, enabled: bool) -> Result<(), SettingsError> {
        self.update(|r| r.password_enabled = enabled)
    }

    /// Always true while the password lock is disabled.
    pub fn verify_password(&self, candidate: &str) -> bool {
        !self.record.password_enabled || self.record.password.as_str() == candidate
    }

    pub const fn lock_type(&self) -> LockType {
        self.record.lock_type
    }

    pub fn set_lock_type(&mut self, lock: LockType) -> Result<(), SettingsError> {
        self.update(|r| r.lock_type = lock)
    }

    // Game

    pub const fn flappy_score(&self) -> u32 {
        self.record.flappy_high_score
    }

    /// Returns `true` when `score` beat the stored high score.
    pub fn set_flappy_score(&mut self, score: u32) -> Result<bool, SettingsError> {
        if score <= self.record.flappy_high_score {
            return Ok(false);
        }
        self.update(|r| r.flappy_high_score = score)?;
        Ok(true)
    }

    // Personalization

    pub const fn ui_style(&self) -> UiStyle {
        self.record.ui_style
    }

    pub fn set_ui_style(&mut self, style: UiStyle) -> Result<(), SettingsError> {
        self.update(|r| r.ui_style = style)
    }

    /// Raw selector index; anything past the last style selects it.
    pub fn set_ui_style_raw(&mut self, raw: u8) -> Result<(), SettingsError> {
        self.set_ui_style(UiStyle::from_raw_clamped(raw))
    }

    pub fn set_desktop_grid(&mut self, cols: u8, rows: u8) -> Result<(), SettingsError> {
        let cols = clamp_desktop_cols(cols);
        let rows = clamp_desktop_rows(rows);
        self.update(|r| {
            r.desktop_cols = cols;
            r.desktop_rows = rows;
        })
    }

    pub const fn desktop_cols(&self) -> u8 {
        self.record.desktop_cols
    }

    pub const fn desktop_rows(&self) -> u8 {
        self.record.desktop_rows
    }

    /// `None` for an empty or out-of-range slot.
    pub fn pinned_app(&self, slot: usize) -> Option<&str> {
        self.record
            .pinned_apps
            .get(slot)
            .map(|name| name.as_str())
            .filter(|name| !name.is_empty())
    }

    /// An empty name clears the slot.
    pub fn set_pinned_app(&mut self, slot: usize, name: &str) -> Result<(), SettingsError> {
        if slot >= PINNED_APP_SLOTS {
            return Err(SettingsError::InvalidIndex);
        }
        let name = bounded(name);
        self.update(|r| r.pinned_apps[slot] = name)
    }

    /// Update the entry for `app`, or append one. A full table rejects new
    /// apps instead of evicting.
    pub fn save_icon_position(&mut self, app: &str, x: u8, y: u8) -> Result<(), SettingsError> {
        let app: String<APP_NAME_BYTES> = bounded(app);

        if let Some(icon) = self
            .record
            .icon_positions
            .iter_mut()
            .find(|icon| icon.app == app)
        {
            icon.x = x;
            icon.y = y;
            icon.valid = true;
            return self.save();
        }

        if self.record.icon_positions.is_full() {
            warn!("settings: icon table full; rejected app={}", app);
            return Err(SettingsError::CapacityExceeded);
        }
        self.record
            .icon_positions
            .push(IconPosition {
                app,
                x,
                y,
                valid: true,
            })
            .map_err(|_| SettingsError::CapacityExceeded)?;
        self.save()
    }

    pub fn icon_position(&self, app: &str) -> Option<(u8, u8)> {
        self.record
            .icon_positions
            .iter()
            .find(|icon| icon.valid && icon.app.as_str() == app)
            .map(|icon| (icon.x, icon.y))
    }

    pub fn delete_icon_position(&mut self, app: &str) -> Result<(), SettingsError> {
        let idx = self
            .record
            .icon_positions
            .iter()
            .position(|icon| icon.app.as_str() == app)
            .ok_or(SettingsError::NotFoundInList)?;
        self.record.icon_positions.remove(idx);
        self.save()
    }

    pub fn clear_icon_positions(&mut self) -> Result<(), SettingsError> {
        self.update(|r| r.icon_positions.clear())
    }

    // Bluetooth

    pub const fn bluetooth_enabled(&self) -> bool {
        self.record.bt_enabled
    }

    pub fn set_bluetooth_enabled(&mut self, enabled: bool) -> Result<(), SettingsError> {
        self.update(|r| r.bt_enabled = enabled)
    }

    pub fn bt_device_name(&self) -> &str {
        self.record.bt_name.as_str()
    }

    pub fn set_bt_device_name(&mut self, name: &str) -> Result<(), SettingsError> {
        let name = bounded(name);
        self.update(|r| r.bt_name = name)
    }

    // Debug

    pub const fn debug_enabled(&self) -> bool {
        self.record.debug
    }

    pub fn set_debug_enabled(&mut self, enabled: bool) -> Result<(), SettingsError> {
        self.update(|r| r.debug = enabled)
    }
}

/// `UTC-8` for +8 hours, `UTC+5` for -5, `UTC0` for zero.
pub fn posix_timezone(hours_east: i8) -> PosixTimezone {
    let mut out = PosixTimezone::new();
    let posix_offset = -i16::from(hours_east);
    let _ = if posix_offset == 0 {
        out.push_str("UTC0").map_err(|_| core::fmt::Error)
    } else {
        write!(out, "UTC{:+}", posix_offset)
    };
    out
}

fn read_image<S: FileStore>(fs: &mut S, file: &mut S::File) -> Result<SettingsRecord, SettingsError> {
    let mut header = [0u8; HEADER_LEN];
    let read = read_full(fs, file, &mut header).map_err(|_| SettingsError::Io)?;
    if read != HEADER_LEN {
        warn!("settings: short header bytes={}", read);
        return Err(SettingsError::InvalidFormat);
    }
    if check_header(&header).is_err() {
        warn!("settings: bad magic or version={}", header[HEADER_LEN - 1]);
        return Err(SettingsError::InvalidFormat);
    }

    let mut body = [0u8; RECORD_LEN];
    let read = read_full(fs, file, &mut body).map_err(|_| SettingsError::Io)?;
    if read != RECORD_LEN {
        warn!("settings: short record bytes={} expected={}", read, RECORD_LEN);
        return Err(SettingsError::InvalidFormat);
    }
    let mut probe = [0u8; 1];
    if fs.read(file, &mut probe).map_err(|_| SettingsError::Io)? != 0 {
        warn!("settings: trailing bytes after record");
        return Err(SettingsError::InvalidFormat);
    }

    decode_record(&body).map_err(|_| {
        warn!("settings: record failed to decode");
        SettingsError::InvalidFormat
    })
}

/// Re-clamp values a corrupted or foreign image could carry. Returns the
/// number of fields changed.
fn validate(record: &mut SettingsRecord, config: &SettingsConfig) -> usize {
    let mut clamped = 0usize;

    let percent = clamp_keyboard_percent(record.keyboard_height_percent);
    if percent != record.keyboard_height_percent {
        warn!(
            "settings: keyboard height {} out of range; using {}",
            record.keyboard_height_percent, percent
        );
        record.keyboard_height_percent = percent;
        clamped += 1;
    }
    let px = keyboard_px(percent, config.screen_height_px);
    if px != record.keyboard_height_px {
        debug!(
            "settings: keyboard px {} recomputed to {}",
            record.keyboard_height_px, px
        );
        record.keyboard_height_px = px;
        clamped += 1;
    }

    let brightness = record.brightness.clamp(config.brightness_min, BRIGHTNESS_MAX);
    if brightness != record.brightness {
        warn!(
            "settings: brightness {} out of range; using {}",
            record.brightness, brightness
        );
        record.brightness = brightness;
        clamped += 1;
    }

    let cols = clamp_desktop_cols(record.desktop_cols);
    let rows = clamp_desktop_rows(record.desktop_rows);
    if cols != record.desktop_cols || rows != record.desktop_rows {
        warn!(
            "settings: desktop grid {}x{} out of range; using {}x{}",
            record.desktop_cols, record.desktop_rows, cols, rows
        );
        record.desktop_cols = cols;
        record.desktop_rows = rows;
        clamped += 1;
    }

    clamped
}

#[cfg(test)]
mod tests;
