use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::*;
use crate::storage::MemFileStore;

const PATH: &str = "SYSTEM.CFG";

fn store(fs: &MemFileStore) -> SettingsStore<MemFileStore> {
    SettingsStore::new(fs.clone(), SettingsConfig::default())
}

fn ready(fs: &MemFileStore) -> SettingsStore<MemFileStore> {
    let mut settings = store(fs);
    settings.init().unwrap();
    settings
}

#[test]
fn init_without_file_writes_defaults() {
    let fs = MemFileStore::new();
    let settings = ready(&fs);

    assert!(settings.is_initialized());
    assert_eq!(settings.brightness(), 80);
    assert_eq!(settings.timezone(), 8);
    assert_eq!(settings.keyboard_height(), 40);
    assert_eq!(settings.keyboard_height_px(), 320);
    assert_eq!(settings.username(), "User");
    assert_eq!(settings.avatar_color(), DEFAULT_AVATAR_COLOR);
    assert_eq!(settings.bt_device_name(), DEFAULT_BT_NAME);
    assert_eq!((settings.desktop_cols(), settings.desktop_rows()), (4, 6));

    let image = fs.contents(PATH).unwrap();
    assert_eq!(image.len(), FILE_LEN);
    assert_eq!(&image[..8], &SETTINGS_MAGIC);
    assert_eq!(image[8], SETTINGS_VERSION);
}

#[test]
fn second_init_is_a_no_op() {
    let fs = MemFileStore::new();
    let mut settings = ready(&fs);
    settings.set_wallpaper(3).unwrap();

    fs.insert(PATH, b"garbage");
    settings.init().unwrap();
    assert_eq!(settings.wallpaper(), 3);
    assert_eq!(fs.contents(PATH).unwrap(), b"garbage");
}

#[test]
fn saved_record_loads_back_identically() {
    let fs = MemFileStore::new();
    let mut settings = ready(&fs);
    settings.set_brightness(55).unwrap();
    settings.set_use_24h(false).unwrap();
    settings.set_last_time(1_712_345_678).unwrap();
    settings.save_wifi("home", "pw-home").unwrap();
    settings.save_wifi("office", "pw-office").unwrap();
    settings.set_keyboard_theme(KeyboardTheme::Dark).unwrap();
    settings.set_location("Lisbon", 38.72, -9.14, 0).unwrap();
    settings.set_username("ada").unwrap();
    settings.set_lock_type(LockType::Pin).unwrap();
    settings.set_password("1234").unwrap();
    settings.set_password_enabled(true).unwrap();
    settings.set_ui_style(UiStyle::StyleB).unwrap();
    settings.set_pinned_app(2, "Calculator").unwrap();
    settings.save_icon_position("Paint", 1, 2).unwrap();
    settings.set_bluetooth_enabled(true).unwrap();
    settings.set_bt_device_name("Desk").unwrap();
    settings.set_debug_enabled(true).unwrap();
    let expected = settings.record().clone();

    let mut reloaded = store(&fs);
    reloaded.load().unwrap();
    assert_eq!(reloaded.record(), &expected);
    assert_eq!(reloaded.wifi_count(), 2);
}

#[test]
fn corrupted_images_fail_to_load_and_leave_record_untouched() {
    let fs = MemFileStore::new();
    let mut settings = ready(&fs);
    settings.set_wallpaper(7).unwrap();
    let good = fs.contents(PATH).unwrap();

    let mut bad_magic = good.clone();
    bad_magic[0] = b'X';
    let mut bad_version = good.clone();
    bad_version[8] = 2;
    let truncated = good[..good.len() - 1].to_vec();
    let mut extended = good.clone();
    extended.push(0);

    let mut reader = store(&fs);
    for image in [bad_magic, bad_version, truncated, extended] {
        fs.insert(PATH, &image);
        assert_eq!(reader.load(), Err(SettingsError::InvalidFormat));
        assert_eq!(reader.wallpaper(), 0);
    }
}

#[test]
fn missing_file_reports_not_found() {
    let fs = MemFileStore::new();
    let mut settings = store(&fs);
    assert_eq!(settings.load(), Err(SettingsError::NotFound));
}

#[test]
fn corrupted_file_falls_back_to_defaults_on_init() {
    let fs = MemFileStore::new();
    fs.insert(PATH, b"WIN32CFG\x01short");

    let settings = ready(&fs);
    assert_eq!(settings.record(), &SettingsRecord::with_defaults(800));
    assert_eq!(fs.contents(PATH).unwrap().len(), FILE_LEN);

    let mut again = store(&fs);
    assert!(again.load().is_ok());
}

#[test]
fn out_of_range_keyboard_height_is_clamped_on_load() {
    let fs = MemFileStore::new();
    let mut settings = ready(&fs);
    settings.set_keyboard_height(50).unwrap();

    let mut record = settings.record().clone();
    record.keyboard_height_percent = 99;
    record.keyboard_height_px = 12;
    record.brightness = 0;
    record.desktop_cols = 40;
    fs.insert(PATH, &codec::encode_file(&record));

    let mut reloaded = store(&fs);
    reloaded.load().unwrap();
    assert_eq!(reloaded.keyboard_height(), 80);
    assert_eq!(reloaded.keyboard_height_px(), 640);
    assert_eq!(reloaded.brightness(), 10);
    assert_eq!(reloaded.desktop_cols(), DESKTOP_COLS_MAX);
}

#[test]
fn keyboard_height_is_clamped_and_px_derived() {
    let fs = MemFileStore::new();
    let mut settings = ready(&fs);

    settings.set_keyboard_height(5).unwrap();
    assert_eq!(settings.keyboard_height(), 17);
    settings.set_keyboard_height(95).unwrap();
    assert_eq!(settings.keyboard_height(), 80);
    settings.set_keyboard_height(50).unwrap();
    assert_eq!(settings.keyboard_height(), 50);
    assert_eq!(settings.keyboard_height_px(), 400);
}

#[test]
fn brightness_respects_configured_floor() {
    let fs = MemFileStore::new();
    let mut settings = SettingsStore::new(
        fs.clone(),
        SettingsConfig::default().with_brightness_min(25),
    );
    settings.init().unwrap();

    settings.set_brightness(3).unwrap();
    assert_eq!(settings.brightness(), 25);
    settings.set_brightness(250).unwrap();
    assert_eq!(settings.brightness(), 100);
}

#[test]
fn brightness_floor_above_max_is_capped() {
    let config = SettingsConfig::default().with_brightness_min(150);
    assert_eq!(config.brightness_min, BRIGHTNESS_MAX);

    let fs = MemFileStore::new();
    let mut settings = SettingsStore::new(fs.clone(), config);
    settings.init().unwrap();
    settings.set_brightness(50).unwrap();
    assert_eq!(settings.brightness(), BRIGHTNESS_MAX);
}

#[test]
fn sixth_wifi_network_evicts_the_oldest() {
    let fs = MemFileStore::new();
    let mut settings = ready(&fs);
    for ssid in ["n1", "n2", "n3", "n4", "n5"] {
        settings.save_wifi(ssid, "pw").unwrap();
    }
    settings.save_wifi("n6", "pw").unwrap();

    assert_eq!(settings.wifi_count(), 5);
    let ssids: Vec<&str> = settings
        .wifi_entries()
        .iter()
        .map(|entry| entry.ssid.as_str())
        .collect();
    assert_eq!(ssids, ["n2", "n3", "n4", "n5", "n6"]);
    assert_eq!(settings.find_wifi("n1"), None);
}

#[test]
fn existing_wifi_network_is_updated_in_place() {
    let fs = MemFileStore::new();
    let mut settings = ready(&fs);
    settings.save_wifi("home", "old").unwrap();
    settings.save_wifi("cafe", "latte").unwrap();
    settings.save_wifi("home", "new").unwrap();

    assert_eq!(settings.wifi_count(), 2);
    assert_eq!(settings.find_wifi("home"), Some(0));
    assert_eq!(settings.wifi_entry(0).unwrap().password.as_str(), "new");
}

#[test]
fn deleting_wifi_closes_the_gap() {
    let fs = MemFileStore::new();
    let mut settings = ready(&fs);
    for ssid in ["a", "b", "c"] {
        settings.save_wifi(ssid, "pw").unwrap();
    }

    settings.delete_wifi("b").unwrap();
    assert_eq!(settings.wifi_count(), 2);
    assert_eq!(settings.find_wifi("c"), Some(1));
    assert_eq!(settings.delete_wifi("b"), Err(SettingsError::NotFoundInList));
}

#[test]
fn flappy_score_only_ratchets_upward() {
    let fs = MemFileStore::new();
    let mut settings = ready(&fs);

    assert!(settings.set_flappy_score(10).unwrap());
    assert!(!settings.set_flappy_score(5).unwrap());
    assert_eq!(settings.flappy_score(), 10);
    assert!(settings.set_flappy_score(20).unwrap());
    assert_eq!(settings.flappy_score(), 20);
}

#[test]
fn icon_table_rejects_new_apps_when_full() {
    let fs = MemFileStore::new();
    let mut settings = ready(&fs);
    for idx in 0..ICON_POSITION_SLOTS {
        let name = format!("app{idx}");
        settings.save_icon_position(&name, idx as u8, 0).unwrap();
    }

    assert_eq!(
        settings.save_icon_position("late", 0, 0),
        Err(SettingsError::CapacityExceeded)
    );
    settings.save_icon_position("app3", 9, 9).unwrap();
    assert_eq!(settings.icon_position("app3"), Some((9, 9)));

    settings.delete_icon_position("app0").unwrap();
    settings.save_icon_position("late", 1, 1).unwrap();
    assert_eq!(settings.icon_position("late"), Some((1, 1)));

    settings.clear_icon_positions().unwrap();
    assert_eq!(settings.icon_position("late"), None);
}

#[test]
fn pinned_slots_are_bounded() {
    let fs = MemFileStore::new();
    let mut settings = ready(&fs);

    settings.set_pinned_app(0, "Notepad").unwrap();
    assert_eq!(settings.pinned_app(0), Some("Notepad"));
    settings.set_pinned_app(0, "").unwrap();
    assert_eq!(settings.pinned_app(0), None);
    assert_eq!(
        settings.set_pinned_app(PINNED_APP_SLOTS, "Paint"),
        Err(SettingsError::InvalidIndex)
    );
}

#[test]
fn grid_and_style_are_clamped() {
    let fs = MemFileStore::new();
    let mut settings = ready(&fs);

    settings.set_desktop_grid(1, 20).unwrap();
    assert_eq!((settings.desktop_cols(), settings.desktop_rows()), (3, 8));
    settings.set_ui_style_raw(9).unwrap();
    assert_eq!(settings.ui_style(), UiStyle::StyleC);
}

#[test]
fn user_profile_defaults_apply() {
    let fs = MemFileStore::new();
    let mut settings = ready(&fs);

    settings.set_username("").unwrap();
    assert_eq!(settings.username(), "User");
    settings.set_avatar_color(0xFF00_0000).unwrap();
    assert_eq!(settings.avatar_color(), DEFAULT_AVATAR_COLOR);
    settings.set_avatar_color(0x12_3456).unwrap();
    assert_eq!(settings.avatar_color(), 0x12_3456);

    settings.set_password("hunter2").unwrap();
    assert!(settings.verify_password("anything"));
    settings.set_password_enabled(true).unwrap();
    assert!(settings.verify_password("hunter2"));
    assert!(!settings.verify_password("hunter3"));
}

#[test]
fn long_strings_are_truncated_to_capacity() {
    let fs = MemFileStore::new();
    let mut settings = ready(&fs);
    let long = "x".repeat(100);

    settings.set_username(&long).unwrap();
    assert_eq!(settings.username().len(), USERNAME_BYTES);
    settings.set_location(&long, 0.0, 0.0, 1).unwrap();
    assert_eq!(settings.location().unwrap().city.len(), CITY_BYTES);
}

static TZ_CALLS: AtomicUsize = AtomicUsize::new(0);
static LAST_TZ: Mutex<std::string::String> = Mutex::new(std::string::String::new());

fn record_tz(tz: &str) {
    TZ_CALLS.fetch_add(1, Ordering::SeqCst);
    if let Ok(mut last) = LAST_TZ.lock() {
        last.clear();
        last.push_str(tz);
    }
}

#[test]
fn location_overrides_timezone_and_applies_it() {
    let fs = MemFileStore::new();
    let mut settings = store(&fs).with_timezone_hook(record_tz);
    settings.init().unwrap();
    assert!(TZ_CALLS.load(Ordering::SeqCst) >= 1);

    settings.set_location("New York", 40.71, -74.0, -5).unwrap();
    assert_eq!(settings.timezone(), -5);
    assert_eq!(settings.posix_timezone().as_str(), "UTC+5");
    assert_eq!(LAST_TZ.lock().unwrap().as_str(), "UTC+5");

    settings.clear_location().unwrap();
    assert!(settings.location().is_none());
    assert_eq!(settings.timezone(), -5);
}

#[test]
fn posix_timezone_inverts_sign() {
    assert_eq!(posix_timezone(8).as_str(), "UTC-8");
    assert_eq!(posix_timezone(-5).as_str(), "UTC+5");
    assert_eq!(posix_timezone(0).as_str(), "UTC0");
    assert_eq!(posix_timezone(14).as_str(), "UTC-14");
}

#[test]
fn factory_reset_restores_and_persists_defaults() {
    let fs = MemFileStore::new();
    let mut settings = ready(&fs);
    settings.save_wifi("home", "pw").unwrap();
    settings.set_flappy_score(42).unwrap();

    settings.factory_reset().unwrap();
    assert_eq!(settings.record(), &SettingsRecord::with_defaults(800));

    let mut reloaded = store(&fs);
    reloaded.load().unwrap();
    assert_eq!(reloaded.wifi_count(), 0);
    assert_eq!(reloaded.flappy_score(), 0);
}

#[test]
fn write_failure_surfaces_as_io() {
    let fs = MemFileStore::new();
    let mut settings = ready(&fs);
    fs.set_fail_writes(true);

    assert_eq!(settings.set_wallpaper(2), Err(SettingsError::Io));
    assert_eq!(settings.wallpaper(), 2);
    assert_eq!(fs.open_handles(), 0);
    assert_eq!(SettingsError::Io.code(), -3);
}

#[test]
fn deinit_allows_reinitialization() {
    let fs = MemFileStore::new();
    let mut settings = ready(&fs);
    settings.set_wallpaper(4).unwrap();
    settings.deinit();
    assert!(!settings.is_initialized());

    settings.init().unwrap();
    assert_eq!(settings.wallpaper(), 4);
}
