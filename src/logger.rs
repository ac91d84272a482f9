use std::env;

use data::log;

/// Logs go to a file; the terminal belongs to the UI.
pub fn setup(is_debug: bool) -> Result<(), log::Error> {
    let default_level = if is_debug {
        log::Level::Debug
    } else {
        log::Level::Info
    };

    let level_filter = env::var("RUST_LOG")
        .ok()
        .as_deref()
        .map(str::parse::<log::Level>)
        .transpose()?
        .unwrap_or(default_level)
        .to_level_filter();

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}:{} -- {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                message
            ))
        })
        .level(log::LevelFilter::Off)
        .level_for("data", level_filter)
        .level_for("irc", level_filter)
        .level_for("tern", level_filter)
        .chain(log::file()?)
        .apply()?;

    Ok(())
}
