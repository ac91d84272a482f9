use std::path::PathBuf;
use std::{fs, io};

pub use log::{Level, LevelFilter, ParseLevelError};

pub fn path() -> PathBuf {
    std::env::var_os("TERN_LOG_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("tern.log"))
}

pub fn file() -> Result<fs::File, Error> {
    Ok(fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path())?)
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    ParseLevel(#[from] ParseLevelError),
    #[error(transparent)]
    SetLogger(#[from] log::SetLoggerError),
}
