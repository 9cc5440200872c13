//! WiFi credentials baked in at build time by `build.rs`.

pub const WIFI_SSID: &str = match option_env!("WIFI_SSID") {
    Some(ssid) => ssid,
    None => "",
};

pub const WIFI_PASSWORD: &str = match option_env!("WIFI_PASSWORD") {
    Some(password) => password,
    None => "",
};

pub const fn has_credentials() -> bool {
    !WIFI_SSID.is_empty()
}
