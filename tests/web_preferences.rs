#![cfg(target_arch = "wasm32")]

use particlefield::preferences::{LocalStorageStore, PreferenceStore, THEME_KEY, ThemeFlag};
use particlefield::theme::ThemeMode;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

fn clear_theme() {
    let storage = web_sys::window()
        .and_then(|window| window.local_storage().ok().flatten())
        .expect("localStorage should be available in the test browser");
    storage.remove_item(THEME_KEY).expect("removing the theme key should succeed");
}

#[wasm_bindgen_test]
fn theme_round_trips_through_local_storage() {
    clear_theme();
    let mut store = LocalStorageStore::open().expect("localStorage should open");
    assert_eq!(store.get(THEME_KEY), None);

    store.set(THEME_KEY, "light").unwrap();
    let reopened = LocalStorageStore::open().unwrap();
    assert_eq!(reopened.get(THEME_KEY).as_deref(), Some("light"));
    clear_theme();
}

#[wasm_bindgen_test]
fn missing_theme_defaults_to_dark_and_toggle_persists() {
    clear_theme();
    let mut flag = ThemeFlag::load(Box::new(LocalStorageStore::open().unwrap()));
    assert_eq!(flag.get_preference(), ThemeMode::Dark);

    assert_eq!(flag.toggle(), ThemeMode::Light);
    let reloaded = ThemeFlag::load(Box::new(LocalStorageStore::open().unwrap()));
    assert_eq!(reloaded.get_preference(), ThemeMode::Light);
    clear_theme();
}
