use std::env;
use std::path::PathBuf;

use chrono::Utc;

use data::cache;
use data::config::Config;

use crate::app::{App, Restore};

mod app;
mod event;
mod format;
mod logger;
mod stream;
mod ui;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("tern: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = env::var_os("TERN_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("tern.toml"));
    let config = Config::load(&config_path)?;

    logger::setup(config.debug)?;
    log::info!("tern starting");

    let state_dir = env::var_os("TERN_STATE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let last_buffer_path = state_dir.join("lastbuffer.txt");
    let last_close_path = state_dir.join("lastclose.txt");
    let unread_path = state_dir.join("unread.json");

    let restore = Restore {
        last_buffer: cache::load_last_buffer(&last_buffer_path),
        last_close: cache::load_last_close(&last_close_path),
        unread: cache::load_unread(&unread_path),
    };

    let app = App::new(config, restore)?;
    let persist = app.run().await;

    if let Err(e) = cache::save_last_buffer(&last_buffer_path, &persist.last_buffer) {
        log::warn!("saving last buffer: {e}");
    }
    if let Err(e) = cache::save_last_close(&last_close_path, Utc::now()) {
        log::warn!("saving last close: {e}");
    }
    if let Err(e) = cache::save_unread(&unread_path, &persist.unread) {
        log::warn!("saving unread map: {e}");
    }

    Ok(())
}
