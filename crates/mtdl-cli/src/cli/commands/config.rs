//! `mtdl config` – read and write config values.

use anyhow::Result;
use mtdl_core::config::{self, ConfigStore};

use crate::cli::ConfigAction;

pub fn run_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Path => println!("{}", config::config_path()?.display()),
        ConfigAction::Get { section, key } => {
            let store = ConfigStore::open_default()?;
            println!("{}", store.get(&section, &key)?);
        }
        ConfigAction::Set {
            section,
            key,
            value,
        } => {
            let mut store = ConfigStore::open_default()?;
            store.set(&section, &key, &value)?;
            println!("{}.{} = {}", section, key, store.get(&section, &key)?);
        }
    }
    Ok(())
}
