//! Fixed-layout, versioned on-disk image of [`SettingsRecord`].
//!
//! ```text
//! [8 magic "WIN32CFG"][1 version][RECORD_LEN record bytes]
//! ```
//!
//! Integers are little-endian, strings occupy `capacity + 1` bytes and are
//! NUL padded, lists store a count byte followed by every slot.

use heapless::{String, Vec};
use log::warn;

use super::record::{
    APP_NAME_BYTES, BT_NAME_BYTES, CITY_BYTES, ICON_POSITION_SLOTS, IconPosition, KeyboardTheme,
    Location, LockType, PASSWORD_BYTES, PINNED_APP_SLOTS, SettingsRecord, USERNAME_BYTES,
    UiStyle, WIFI_MAX_ENTRIES, WIFI_PASSWORD_BYTES, WIFI_SSID_BYTES, WifiEntry,
};

pub const SETTINGS_MAGIC: [u8; 8] = *b"WIN32CFG";
pub const SETTINGS_VERSION: u8 = 1;
pub const HEADER_LEN: usize = SETTINGS_MAGIC.len() + 1;

const fn slot(capacity: usize) -> usize {
    capacity + 1
}

const WIFI_ENTRY_LEN: usize = slot(WIFI_SSID_BYTES) + slot(WIFI_PASSWORD_BYTES) + 1;
const ICON_ENTRY_LEN: usize = slot(APP_NAME_BYTES) + 3;

pub const RECORD_LEN: usize = 2 // brightness, wallpaper
    + 1 + 1 + 8 // timezone, 24h, last_time
    + 1 + WIFI_MAX_ENTRIES * WIFI_ENTRY_LEN
    + 1 + 2 + 1 + 1 // keyboard
    + slot(CITY_BYTES) + 4 + 4 + 1 + 1 // location
    + slot(USERNAME_BYTES) + 4 + slot(PASSWORD_BYTES) + 1 + 1 // user
    + 4 // flappy
    + 1 + 1 + 1 // style, cols, rows
    + PINNED_APP_SLOTS * slot(APP_NAME_BYTES)
    + 1 + ICON_POSITION_SLOTS * ICON_ENTRY_LEN
    + 1 + slot(BT_NAME_BYTES)
    + 1; // debug

pub const FILE_LEN: usize = HEADER_LEN + RECORD_LEN;

/// The byte image is structurally invalid.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Malformed;

/// Validate the header of a settings image.
pub fn check_header(header: &[u8]) -> Result<(), Malformed> {
    if header.len() != HEADER_LEN || header[..SETTINGS_MAGIC.len()] != SETTINGS_MAGIC {
        return Err(Malformed);
    }
    if header[SETTINGS_MAGIC.len()] != SETTINGS_VERSION {
        return Err(Malformed);
    }
    Ok(())
}

pub fn encode_file(record: &SettingsRecord) -> [u8; FILE_LEN] {
    let mut buf = [0u8; FILE_LEN];
    buf[..SETTINGS_MAGIC.len()].copy_from_slice(&SETTINGS_MAGIC);
    buf[SETTINGS_MAGIC.len()] = SETTINGS_VERSION;
    encode_record(record, &mut buf[HEADER_LEN..]);
    buf
}

fn encode_record(record: &SettingsRecord, out: &mut [u8]) {
    let mut w = Writer { buf: out, pos: 0 };

    w.u8(record.brightness);
    w.u8(record.wallpaper);

    w.u8(record.timezone as u8);
    w.bool(record.use_24h);
    w.bytes(&record.last_time.to_le_bytes());

    w.u8(record.wifi.len() as u8);
    for idx in 0..WIFI_MAX_ENTRIES {
        match record.wifi.get(idx) {
            Some(entry) => {
                w.str_slot(&entry.ssid, WIFI_SSID_BYTES);
                w.str_slot(&entry.password, WIFI_PASSWORD_BYTES);
                w.bool(entry.valid);
            }
            None => w.zeros(WIFI_ENTRY_LEN),
        }
    }

    w.u8(record.keyboard_height_percent);
    w.bytes(&record.keyboard_height_px.to_le_bytes());
    w.bool(record.keyboard_use_percent);
    w.u8(record.keyboard_theme.as_raw());

    w.str_slot(&record.location.city, CITY_BYTES);
    w.bytes(&record.location.latitude.to_bits().to_le_bytes());
    w.bytes(&record.location.longitude.to_bits().to_le_bytes());
    w.u8(record.location.timezone as u8);
    w.bool(record.location.valid);

    w.str_slot(&record.username, USERNAME_BYTES);
    w.bytes(&record.avatar_color.to_le_bytes());
    w.str_slot(&record.password, PASSWORD_BYTES);
    w.bool(record.password_enabled);
    w.u8(record.lock_type.as_raw());

    w.bytes(&record.flappy_high_score.to_le_bytes());

    w.u8(record.ui_style.as_raw());
    w.u8(record.desktop_cols);
    w.u8(record.desktop_rows);
    for name in &record.pinned_apps {
        w.str_slot(name, APP_NAME_BYTES);
    }
    w.u8(record.icon_positions.len() as u8);
    for idx in 0..ICON_POSITION_SLOTS {
        match record.icon_positions.get(idx) {
            Some(icon) => {
                w.str_slot(&icon.app, APP_NAME_BYTES);
                w.u8(icon.x);
                w.u8(icon.y);
                w.bool(icon.valid);
            }
            None => w.zeros(ICON_ENTRY_LEN),
        }
    }

    w.bool(record.bt_enabled);
    w.str_slot(&record.bt_name, BT_NAME_BYTES);

    w.bool(record.debug);

    debug_assert_eq!(w.pos, RECORD_LEN);
}

/// Decode a record body (header already stripped). The slice must be
/// exactly [`RECORD_LEN`] bytes.
pub fn decode_record(body: &[u8]) -> Result<SettingsRecord, Malformed> {
    if body.len() != RECORD_LEN {
        return Err(Malformed);
    }
    let mut r = Reader { buf: body, pos: 0 };

    let brightness = r.u8()?;
    let wallpaper = r.u8()?;

    let timezone = r.u8()? as i8;
    let use_24h = r.bool()?;
    let last_time = i64::from_le_bytes(r.array()?);

    let wifi_count = clamp_count(r.u8()?, WIFI_MAX_ENTRIES, "wifi");
    let mut wifi = Vec::new();
    for idx in 0..WIFI_MAX_ENTRIES {
        let ssid = r.str_slot::<WIFI_SSID_BYTES>()?;
        let password = r.str_slot::<WIFI_PASSWORD_BYTES>()?;
        let valid = r.bool()?;
        if idx < wifi_count {
            let _ = wifi.push(WifiEntry {
                ssid,
                password,
                valid,
            });
        }
    }

    let keyboard_height_percent = r.u8()?;
    let keyboard_height_px = u16::from_le_bytes(r.array()?);
    let keyboard_use_percent = r.bool()?;
    let raw_theme = r.u8()?;
    let keyboard_theme = KeyboardTheme::from_raw(raw_theme).unwrap_or_else(|| {
        warn!("settings: unknown keyboard theme {}; using light", raw_theme);
        KeyboardTheme::Light
    });

    let city = r.str_slot::<CITY_BYTES>()?;
    let latitude = f32::from_bits(u32::from_le_bytes(r.array()?));
    let longitude = f32::from_bits(u32::from_le_bytes(r.array()?));
    let location_tz = r.u8()? as i8;
    let location_valid = r.bool()?;

    let username = r.str_slot::<USERNAME_BYTES>()?;
    let avatar_color = u32::from_le_bytes(r.array()?);
    let password = r.str_slot::<PASSWORD_BYTES>()?;
    let password_enabled = r.bool()?;
    let raw_lock = r.u8()?;
    let lock_type = LockType::from_raw(raw_lock).unwrap_or_else(|| {
        warn!("settings: unknown lock type {}; using slide", raw_lock);
        LockType::Slide
    });

    let flappy_high_score = u32::from_le_bytes(r.array()?);

    let ui_style = UiStyle::from_raw_clamped(r.u8()?);
    let desktop_cols = r.u8()?;
    let desktop_rows = r.u8()?;
    let pinned_apps = [
        r.str_slot::<APP_NAME_BYTES>()?,
        r.str_slot::<APP_NAME_BYTES>()?,
        r.str_slot::<APP_NAME_BYTES>()?,
    ];
    let icon_count = clamp_count(r.u8()?, ICON_POSITION_SLOTS, "icon");
    let mut icon_positions = Vec::new();
    for idx in 0..ICON_POSITION_SLOTS {
        let app = r.str_slot::<APP_NAME_BYTES>()?;
        let x = r.u8()?;
        let y = r.u8()?;
        let valid = r.bool()?;
        if idx < icon_count {
            let _ = icon_positions.push(IconPosition { app, x, y, valid });
        }
    }

    let bt_enabled = r.bool()?;
    let bt_name = r.str_slot::<BT_NAME_BYTES>()?;

    let debug = r.bool()?;

    Ok(SettingsRecord {
        brightness,
        wallpaper,
        timezone,
        use_24h,
        last_time,
        wifi,
        keyboard_height_percent,
        keyboard_height_px,
        keyboard_use_percent,
        keyboard_theme,
        location: Location {
            city,
            latitude,
            longitude,
            timezone: location_tz,
            valid: location_valid,
        },
        username,
        avatar_color,
        password,
        password_enabled,
        lock_type,
        flappy_high_score,
        ui_style,
        desktop_cols,
        desktop_rows,
        pinned_apps,
        icon_positions,
        bt_enabled,
        bt_name,
        debug,
    })
}

fn clamp_count(raw: u8, capacity: usize, what: &str) -> usize {
    let count = raw as usize;
    if count > capacity {
        warn!(
            "settings: {} count {} exceeds capacity {}; clamping",
            what, count, capacity
        );
        capacity
    } else {
        count
    }
}

struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl Writer<'_> {
    fn bytes(&mut self, data: &[u8]) {
        self.buf[self.pos..self.pos + data.len()].copy_from_slice(data);
        self.pos += data.len();
    }

    fn u8(&mut self, value: u8) {
        self.bytes(&[value]);
    }

    fn bool(&mut self, value: bool) {
        self.u8(value as u8);
    }

    fn zeros(&mut self, len: usize) {
        self.buf[self.pos..self.pos + len].fill(0);
        self.pos += len;
    }

    fn str_slot(&mut self, value: &str, capacity: usize) {
        let bytes = value.as_bytes();
        self.bytes(bytes);
        self.zeros(slot(capacity) - bytes.len());
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], Malformed> {
        let out = self.buf.get(self.pos..self.pos + len).ok_or(Malformed)?;
        self.pos += len;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], Malformed> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, Malformed> {
        Ok(self.take(1)?[0])
    }

    fn bool(&mut self) -> Result<bool, Malformed> {
        Ok(self.u8()? != 0)
    }

    /// The slot must contain a NUL within its `N + 1` bytes.
    fn str_slot<const N: usize>(&mut self) -> Result<String<N>, Malformed> {
        let raw = self.take(slot(N))?;
        let len = raw.iter().position(|b| *b == 0).ok_or(Malformed)?;
        let text = core::str::from_utf8(&raw[..len]).map_err(|_| Malformed)?;
        let mut out = String::new();
        out.push_str(text).map_err(|_| Malformed)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::bounded;

    #[test]
    fn record_len_matches_layout() {
        assert_eq!(RECORD_LEN, 1522);
        assert_eq!(FILE_LEN, 1531);
    }

    #[test]
    fn header_is_magic_then_version() {
        let image = encode_file(&SettingsRecord::with_defaults(800));
        assert_eq!(&image[..8], b"WIN32CFG");
        assert_eq!(image[8], SETTINGS_VERSION);
        assert!(check_header(&image[..HEADER_LEN]).is_ok());
    }

    #[test]
    fn populated_record_decodes_identically() {
        let mut record = SettingsRecord::with_defaults(800);
        record.timezone = -5;
        record.last_time = 1_700_000_000;
        let _ = record.wifi.push(WifiEntry {
            ssid: bounded("home"),
            password: bounded("hunter22"),
            valid: true,
        });
        record.location.city = bounded("Zürich");
        record.location.latitude = 47.37;
        record.location.longitude = 8.54;
        record.location.timezone = 1;
        record.location.valid = true;
        record.lock_type = LockType::Password;
        record.pinned_apps[1] = bounded("Notepad");
        let _ = record.icon_positions.push(IconPosition {
            app: bounded("Paint"),
            x: 2,
            y: 5,
            valid: true,
        });

        let image = encode_file(&record);
        let decoded = decode_record(&image[HEADER_LEN..]).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn string_slot_without_terminator_is_malformed() {
        let mut image = encode_file(&SettingsRecord::with_defaults(800));
        // First WiFi ssid slot begins after display, time and count bytes.
        let ssid_at = HEADER_LEN + 2 + 10 + 1;
        image[ssid_at..ssid_at + slot(WIFI_SSID_BYTES)].fill(b'A');
        assert_eq!(decode_record(&image[HEADER_LEN..]), Err(Malformed));
    }

    #[test]
    fn oversized_counts_are_clamped() {
        let mut image = encode_file(&SettingsRecord::with_defaults(800));
        image[HEADER_LEN + 12] = 200;
        let decoded = decode_record(&image[HEADER_LEN..]).unwrap();
        assert_eq!(decoded.wifi.len(), WIFI_MAX_ENTRIES);
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut image = encode_file(&SettingsRecord::with_defaults(800));
        image[8] = SETTINGS_VERSION + 1;
        assert_eq!(check_header(&image[..HEADER_LEN]), Err(Malformed));
    }
}
