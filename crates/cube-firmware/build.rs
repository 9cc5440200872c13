//! Bakes WiFi credentials from `.env` (or the environment) into the binary.

const CREDENTIALS: [&str; 2] = ["WIFI_SSID", "WIFI_PASSWORD"];

fn main() {
    println!("cargo:rerun-if-changed=.env");

    if let Err(e) = dotenvy::dotenv() {
        println!("cargo:warning=no .env file loaded: {e}");
    }

    for key in CREDENTIALS {
        println!("cargo:rerun-if-env-changed={key}");
        match std::env::var(key) {
            Ok(value) => println!("cargo:rustc-env={key}={value}"),
            Err(_) => println!("cargo:warning={key} is not set; WiFi will not connect"),
        }
    }
}
