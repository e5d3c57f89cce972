//! Network identity configuration utility.
//!
//! Writes the station-mode identity into the credential store so the
//! controller joins the network on its next boot instead of opening the
//! provisioning access point.
//!
//! Usage (ESP32, credentials baked in at compile time):
//!   WIFI_SSID="MyNetwork" WIFI_PASSWORD="secret" cargo configure-identity
//!
//! Usage (host, credentials read at run time, stored under `~/.greenhouse-controller/`):
//!   WIFI_SSID="MyNetwork" WIFI_PASSWORD="secret" cargo run --bin configure-identity
//!
//! For open networks leave `WIFI_PASSWORD` empty or unset.

use greenhouse_controller::config::{IdentityError, NetworkIdentity};
use greenhouse_controller::storage::{ByteStore, CredentialStore};

/// WiFi SSID - set via WIFI_SSID environment variable at compile time.
#[cfg(feature = "esp32")]
const WIFI_SSID: Option<&str> = option_env!("WIFI_SSID");

/// WiFi password - set via WIFI_PASSWORD environment variable at compile time.
/// Empty string for open networks.
#[cfg(feature = "esp32")]
const WIFI_PASSWORD: Option<&str> = option_env!("WIFI_PASSWORD");

const USAGE: &str = "Usage:\n  \
                     WIFI_SSID=\"MyNetwork\" WIFI_PASSWORD=\"secret\" cargo configure-identity\n\n\
                     For open networks:\n  \
                     WIFI_SSID=\"OpenNetwork\" WIFI_PASSWORD=\"\" cargo configure-identity";

/// Print error message and exit. On ESP32, pause first so the serial
/// monitor shows the output.
fn halt_with_error(msg: &str) -> ! {
    eprintln!("\n{}", msg);
    eprintln!("\n=== Configuration failed ===\n");
    #[cfg(feature = "esp32")]
    std::thread::sleep(std::time::Duration::from_secs(2));
    std::process::exit(1);
}

fn build_identity(ssid: Option<&str>, password: Option<&str>) -> NetworkIdentity {
    let ssid = match ssid {
        Some(s) if !s.is_empty() => s,
        _ => halt_with_error(&format!("Error: WIFI_SSID is not set.\n\n{}", USAGE)),
    };
    let password = password.unwrap_or("");

    println!("SSID: {}", ssid);
    println!(
        "Password: {} ({} chars)",
        if password.is_empty() { "(none)" } else { "****" },
        password.len()
    );

    match NetworkIdentity::new(ssid, password) {
        Ok(identity) => identity,
        Err(IdentityError::NameTooLong { len, max }) => halt_with_error(&format!(
            "Error: SSID too long ({} bytes, max {})",
            len, max
        )),
        Err(IdentityError::SecretTooLong { len, max }) => halt_with_error(&format!(
            "Error: Password too long ({} bytes, max {})",
            len, max
        )),
        Err(e) => halt_with_error(&format!("Error: {}", e)),
    }
}

fn store_identity<B: ByteStore>(backend: B, identity: &NetworkIdentity) {
    let mut store = match CredentialStore::new(backend) {
        Ok(store) => store,
        Err(e) => halt_with_error(&format!("Error opening credential store: {}", e)),
    };
    if let Err(e) = store.save(identity) {
        halt_with_error(&format!("Error saving identity: {}", e));
    }
    println!("\n=== Identity saved ===");
    println!("\nThe controller joins this network on its next boot.");
}

#[cfg(feature = "esp32")]
fn main() {
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use greenhouse_controller::storage::NvsByteStore;

    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    println!("\n=== Identity Configuration Utility ===\n");
    let identity = build_identity(WIFI_SSID, WIFI_PASSWORD);

    let backend = match EspDefaultNvsPartition::take() {
        Ok(partition) => match NvsByteStore::open(partition) {
            Ok(backend) => backend,
            Err(e) => halt_with_error(&format!("Error opening NVS: {}", e)),
        },
        Err(e) => halt_with_error(&format!("Error initializing NVS: {:?}", e)),
    };
    store_identity(backend, &identity);

    println!("\n=== Done - you can disconnect the device ===\n");
    std::thread::sleep(std::time::Duration::from_secs(2));
}

#[cfg(not(feature = "esp32"))]
fn main() {
    use greenhouse_controller::storage::FileStore;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("\n=== Identity Configuration Utility ===\n");
    let ssid = std::env::var("WIFI_SSID").ok();
    let password = std::env::var("WIFI_PASSWORD").ok();
    let identity = build_identity(ssid.as_deref(), password.as_deref());

    let backend = match FileStore::open_default() {
        Ok(backend) => backend,
        Err(e) => halt_with_error(&format!("Error opening credential file: {}", e)),
    };
    println!("Store: {}", backend.path().display());
    store_identity(backend, &identity);
}
