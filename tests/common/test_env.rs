//! Environment for hardware tests.
//!
//! A repository-root `.env` is loaded first so IDE runs pick up
//! `CANOKEY_PIN` without exporting it. Variables already set win.

use std::env;
use std::fs;
use std::path::Path;

/// Load `<repo>/.env` into the process environment, keeping existing values.
pub fn load_dotenv_if_present() {
    let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let Ok(content) = fs::read_to_string(env_path) else {
        return;
    };

    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() || env::var_os(key).is_some() {
            continue;
        }
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        env::set_var(key, value);
    }
}

/// Admin PIN for hardware runs, if configured.
pub fn hardware_pin() -> Option<String> {
    load_dotenv_if_present();
    env::var("CANOKEY_PIN").ok().filter(|pin| !pin.is_empty())
}

/// OATH passphrase for hardware runs, if configured.
pub fn hardware_passphrase() -> Option<String> {
    load_dotenv_if_present();
    env::var("CANOKEY_OATH_PASSPHRASE").ok().filter(|p| !p.is_empty())
}
