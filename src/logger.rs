use chrono::{DateTime, Utc};
use std::fmt;

#[cfg(test)]
mod tests;

/// Width of the bracketed level column, so messages line up.
const LEVEL_WIDTH: usize = 7;

/// Renders one console line: colored level and timestamp, then the message.
pub(crate) fn line(color: &str, level: &str, time: DateTime<Utc>, message: fmt::Arguments<'_>) -> String {
    let level = format!("[{level}]");
    format!("\x1b[{color}m{level:<width$}[{}]\x1b[0m {message}", time.format("%H:%M:%S%.3f"), width = LEVEL_WIDTH)
}

#[doc(hidden)]
#[macro_export]
macro_rules! console_line {
    ($color:literal, $level:literal, $($arg:tt)*) => {
        $crate::logger::line($color, $level, chrono::Utc::now(), format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => { println!("{}", $crate::console_line!("32", "INFO", $($arg)*)) };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => { println!("{}", $crate::console_line!("35", "WARN", $($arg)*)) };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => { println!("{}", $crate::console_line!("31", "ERROR", $($arg)*)) };
}

#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => { panic!("{}", $crate::console_line!("1;31", "FATAL", $($arg)*)) };
}

/// Command lifecycle output (dispatch, completion, failure reasons).
#[macro_export]
macro_rules! cmd {
    ($($arg:tt)*) => { println!("{}", $crate::console_line!("1;34", "CMD", $($arg)*)) };
}

/// Verbose tracing, printed only if `LOG_FC_EVENTS` is set.
#[macro_export]
macro_rules! event {
    ($($arg:tt)*) => {
        if std::env::var("LOG_FC_EVENTS").is_ok() {
            println!("{}", $crate::console_line!("36", "EVENT", $($arg)*))
        }
    };
}
