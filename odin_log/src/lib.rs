//! Leveled, colored logging to stderr.
//!
//! The threshold comes from the `ODIN_LOG` environment variable
//! (`trace`, `debug`, `info`, `warning`, `error` or `off`) and is read
//! once. Without it only warnings and errors are printed.

use std::sync::OnceLock;

pub use colored::Colorize;

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Off,
}

impl Level {
    pub fn parse(s: &str) -> Option<Self> {
        let res = match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warn" | "warning" => Self::Warning,
            "error" => Self::Error,
            "off" | "none" => Self::Off,
            _ => return None,
        };

        Some(res)
    }
}

fn threshold() -> Level {
    static THRESHOLD: OnceLock<Level> = OnceLock::new();

    *THRESHOLD.get_or_init(|| {
        std::env::var("ODIN_LOG")
            .ok()
            .and_then(|s| Level::parse(&s))
            .unwrap_or(Level::Warning)
    })
}

/// Whether a message at `level` would be printed.
pub fn enabled(level: Level) -> bool {
    level != Level::Off && level >= threshold()
}

/// Internal macro used to deduplicate logic.
/// This is an implementation detail; use the level macros instead.
#[doc(hidden)]
#[macro_export]
macro_rules! __log {
    ($level:ident, $tag:literal, $colour:ident, $($arg:tt)+) => {{
        if $crate::enabled($crate::Level::$level) {
            use $crate::Colorize as _;

            if cfg!(debug_assertions) {
                eprintln!(
                    "{} {} {}",
                    concat!("[", $tag, "]").$colour(),
                    concat!(file!(), ":", line!(), ":").yellow(),
                    format_args!($($arg)+)
                );
            } else {
                eprintln!("{} {}", concat!("[", $tag, "]").$colour(), format_args!($($arg)+));
            }
        }
    }};
}

/// For verbose output tracking the progress of a compiler pass.
#[macro_export]
macro_rules! trace {
    ($($arg:tt)+) => {
        $crate::__log!(Trace, "trace", purple, $($arg)+)
    };
}

/// For additional information that might be helpful for debugging.
/// Compiled out of release builds.
#[macro_export]
macro_rules! debug {
    ($($arg:tt)+) => {
        if cfg!(debug_assertions) {
            $crate::__log!(Debug, "debug", cyan, $($arg)+)
        }
    };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)+) => {
        $crate::__log!(Info, "info", blue, $($arg)+)
    };
}

/// An alert that something may have gone wrong.
#[macro_export]
macro_rules! warning {
    ($($arg:tt)+) => {
        $crate::__log!(Warning, "warning", bright_yellow, $($arg)+)
    };
}

/// An alert that something has gone horribly wrong.
#[macro_export]
macro_rules! error {
    ($($arg:tt)+) => {
        $crate::__log!(Error, "error", bright_red, $($arg)+)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_works() {
        trace!("collecting {} files", 3);
        debug!("scope {}", 1);
        info!("checked");
        warning!("{} unused imports", 2);
        error!("no `main`");
    }

    #[test]
    fn parse_levels() {
        assert_eq!(Level::parse("TRACE"), Some(Level::Trace));
        assert_eq!(Level::parse(" warn "), Some(Level::Warning));
        assert_eq!(Level::parse("off"), Some(Level::Off));
        assert_eq!(Level::parse("loud"), None);
        assert!(Level::Trace < Level::Error);
    }
}
