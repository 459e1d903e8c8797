//! The persisted system settings record.

use heapless::{String, Vec};

use crate::text::bounded;

pub const WIFI_MAX_ENTRIES: usize = 5;
pub const WIFI_SSID_BYTES: usize = 32;
pub const WIFI_PASSWORD_BYTES: usize = 64;
pub const CITY_BYTES: usize = 64;
pub const USERNAME_BYTES: usize = 32;
pub const PASSWORD_BYTES: usize = 32;
pub const PINNED_APP_SLOTS: usize = 3;
pub const APP_NAME_BYTES: usize = 32;
pub const ICON_POSITION_SLOTS: usize = 20;
pub const BT_NAME_BYTES: usize = 32;

pub const BRIGHTNESS_MAX: u8 = 100;
pub const KEYBOARD_HEIGHT_MIN: u8 = 17;
pub const KEYBOARD_HEIGHT_MAX: u8 = 80;
pub const DESKTOP_COLS_MIN: u8 = 3;
pub const DESKTOP_COLS_MAX: u8 = 10;
pub const DESKTOP_ROWS_MIN: u8 = 3;
pub const DESKTOP_ROWS_MAX: u8 = 8;

pub const DEFAULT_USERNAME: &str = "User";
/// 24-bit RGB.
pub const DEFAULT_AVATAR_COLOR: u32 = 0x00_0078D7;
pub const DEFAULT_BT_NAME: &str = "WinESP32";

const DEFAULT_BRIGHTNESS: u8 = 80;
const DEFAULT_TIMEZONE: i8 = 8;
const DEFAULT_KEYBOARD_HEIGHT: u8 = 40;
const DEFAULT_DESKTOP_COLS: u8 = 4;
const DEFAULT_DESKTOP_ROWS: u8 = 6;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum KeyboardTheme {
    #[default]
    Light,
    Dark,
}

impl KeyboardTheme {
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Light),
            1 => Some(Self::Dark),
            _ => None,
        }
    }

    pub const fn as_raw(self) -> u8 {
        self as u8
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LockType {
    #[default]
    Slide,
    Pin,
    Password,
}

impl LockType {
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Slide),
            1 => Some(Self::Pin),
            2 => Some(Self::Password),
            _ => None,
        }
    }

    pub const fn as_raw(self) -> u8 {
        self as u8
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum UiStyle {
    #[default]
    StyleA,
    StyleB,
    StyleC,
}

impl UiStyle {
    /// Out-of-range values clamp to the last style.
    pub const fn from_raw_clamped(raw: u8) -> Self {
        match raw {
            0 => Self::StyleA,
            1 => Self::StyleB,
            _ => Self::StyleC,
        }
    }

    pub const fn as_raw(self) -> u8 {
        self as u8
    }
}

/// One remembered access point.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WifiEntry {
    pub ssid: String<WIFI_SSID_BYTES>,
    pub password: String<WIFI_PASSWORD_BYTES>,
    pub valid: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Location {
    pub city: String<CITY_BYTES>,
    pub latitude: f32,
    pub longitude: f32,
    pub timezone: i8,
    pub valid: bool,
}

/// Desktop icon placed away from its default grid cell.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IconPosition {
    pub app: String<APP_NAME_BYTES>,
    pub x: u8,
    pub y: u8,
    pub valid: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SettingsRecord {
    pub brightness: u8,
    pub wallpaper: u8,

    /// Whole hours east of UTC.
    pub timezone: i8,
    pub use_24h: bool,
    pub last_time: i64,

    /// Oldest first.
    pub wifi: Vec<WifiEntry, WIFI_MAX_ENTRIES>,

    pub keyboard_height_percent: u8,
    /// Always derived from `keyboard_height_percent`.
    pub keyboard_height_px: u16,
    pub keyboard_use_percent: bool,
    pub keyboard_theme: KeyboardTheme,

    pub location: Location,

    pub username: String<USERNAME_BYTES>,
    pub avatar_color: u32,
    pub password: String<PASSWORD_BYTES>,
    pub password_enabled: bool,
    pub lock_type: LockType,

    pub flappy_high_score: u32,

    pub ui_style: UiStyle,
    pub desktop_cols: u8,
    pub desktop_rows: u8,
    pub pinned_apps: [String<APP_NAME_BYTES>; PINNED_APP_SLOTS],
    pub icon_positions: Vec<IconPosition, ICON_POSITION_SLOTS>,

    pub bt_enabled: bool,
    pub bt_name: String<BT_NAME_BYTES>,

    pub debug: bool,
}

impl SettingsRecord {
    pub fn with_defaults(screen_height_px: u16) -> Self {
        Self {
            brightness: DEFAULT_BRIGHTNESS,
            wallpaper: 0,
            timezone: DEFAULT_TIMEZONE,
            use_24h: true,
            last_time: 0,
            wifi: Vec::new(),
            keyboard_height_percent: DEFAULT_KEYBOARD_HEIGHT,
            keyboard_height_px: keyboard_px(DEFAULT_KEYBOARD_HEIGHT, screen_height_px),
            keyboard_use_percent: true,
            keyboard_theme: KeyboardTheme::Light,
            location: Location::default(),
            username: bounded(DEFAULT_USERNAME),
            avatar_color: DEFAULT_AVATAR_COLOR,
            password: String::new(),
            password_enabled: false,
            lock_type: LockType::Slide,
            flappy_high_score: 0,
            ui_style: UiStyle::StyleA,
            desktop_cols: DEFAULT_DESKTOP_COLS,
            desktop_rows: DEFAULT_DESKTOP_ROWS,
            pinned_apps: [String::new(), String::new(), String::new()],
            icon_positions: Vec::new(),
            bt_enabled: false,
            bt_name: bounded(DEFAULT_BT_NAME),
            debug: false,
        }
    }
}

pub const fn keyboard_px(percent: u8, screen_height_px: u16) -> u16 {
    ((percent as u32 * screen_height_px as u32) / 100) as u16
}

pub fn clamp_keyboard_percent(percent: u8) -> u8 {
    percent.clamp(KEYBOARD_HEIGHT_MIN, KEYBOARD_HEIGHT_MAX)
}

pub fn clamp_desktop_cols(cols: u8) -> u8 {
    cols.clamp(DESKTOP_COLS_MIN, DESKTOP_COLS_MAX)
}

pub fn clamp_desktop_rows(rows: u8) -> u8 {
    rows.clamp(DESKTOP_ROWS_MIN, DESKTOP_ROWS_MAX)
}
