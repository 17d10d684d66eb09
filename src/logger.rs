use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};

use anyhow::Context;
use time::{format_description, OffsetDateTime};
use tracing::{subscriber::set_global_default, Level};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, FmtSubscriber};

/// Installs a global subscriber writing every event to `<dir>/<timestamp>_log.txt`.
///
/// Returns the path of the log file. Fails if another subscriber is already installed.
pub fn init_logger(dir: &Path) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("could not create log directory '{}'", dir.display()))?;
    let path = dir.join(get_log_file_name()?);
    let file = File::create(&path)
        .with_context(|| format!("could not create log file '{}'", path.display()))?;
    let writer = BoxMakeWriter::new(file);

    let local_offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = tracing_subscriber::fmt::time::OffsetTime::new(
        local_offset,
        format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]")
            .context("invalid log timestamp format")?,
    );

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::TRACE)
        .with_ansi(false)
        .with_timer(timer)
        .with_writer(writer)
        .finish();

    set_global_default(subscriber).context(
        "could not set global default tracing subscriber, disable --log if one is already set",
    )?;
    Ok(path)
}

fn get_log_file_name() -> anyhow::Result<String> {
    let format = format_description::parse("[year]-[month]-[day]_[hour]:[minute]:[second]_log.txt")
        .context("invalid log file name format")?;
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&format).context("could not format log file name")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_name_is_timestamped() {
        let name = get_log_file_name().unwrap();
        assert!(name.ends_with("_log.txt"));
        assert_eq!(name.len(), "YYYY-MM-DD_HH:MM:SS_log.txt".len());
    }
}
