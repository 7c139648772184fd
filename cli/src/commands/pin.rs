use anyhow::{Result, bail};

use hearth_core::auth::{PIN_LENGTH, hash_pin, is_valid_pin_format};

use crate::config::{Config, PIN_HASH_ENV};

fn check_format(pin: &str) -> Result<()> {
    if !is_valid_pin_format(pin) {
        bail!("PIN must be exactly {PIN_LENGTH} characters");
    }
    Ok(())
}

pub(crate) fn cmd_pin_hash(pin: &str) -> Result<()> {
    check_format(pin)?;
    println!("{}", hash_pin(pin));
    Ok(())
}

pub(crate) fn cmd_pin_set(config: &Config, pin: &str) -> Result<()> {
    check_format(pin)?;
    config.store_pin(pin)?;
    println!("PIN saved to {}", config.data_dir.display());
    if std::env::var_os(PIN_HASH_ENV).is_some() {
        eprintln!("Note: {PIN_HASH_ENV} is set and takes precedence over the stored PIN");
    }
    Ok(())
}
