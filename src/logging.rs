use std::fmt::Display;

use colored::{ColoredString, Colorize};
use log::{Level, SetLoggerError};

/// Logs to stdout. With `verbose`, debug output of the backseat crates is shown too.
pub fn init_logger(verbose: bool) -> Result<(), SetLoggerError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            let now = chrono::Local::now().format("%H:%M:%S").to_string();

            out.finish(format_args!(
                "{} {} {:^8} {}",
                badge(record.level()),
                now.bright_black(),
                Target::from_str(record.target()),
                message
            ))
        })
        .filter(move |meta| is_shown(meta.level(), &Target::from_str(meta.target()), verbose))
        .chain(std::io::stdout())
        .apply()
}

/// External crates only log warnings and errors, our own crates info and up
fn is_shown(level: Level, target: &Target, verbose: bool) -> bool {
    match (target, level) {
        (_, Level::Error | Level::Warn) => true,
        (Target::External(_), _) => false,
        (_, Level::Info) => true,
        (_, Level::Debug) => verbose,
        (_, Level::Trace) => false,
    }
}

enum Target {
    External(String),
    Main,
    Server,
    Collab,
    Core,
}

impl Target {
    fn from_str(str: &str) -> Self {
        match str.split("::").next().unwrap_or_default() {
            "backseat" => Self::Main,
            "backseat_core" => Self::Core,
            "backseat_server" => Self::Server,
            "backseat_collab" => Self::Collab,
            other => Self::External(other.to_string()),
        }
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label: ColoredString = match self {
            Self::External(x) => x.as_str().clear(),
            Self::Main => "MAIN".bright_white(),
            Self::Server => "SERVER".bright_green(),
            Self::Collab => "COLLAB".bright_purple(),
            Self::Core => "CORE".blue(),
        };

        Display::fmt(&label, f)
    }
}

fn badge(level: Level) -> ColoredString {
    match level {
        Level::Error => " ERR ".black().on_red().bold(),
        Level::Warn => " WRN ".black().on_yellow().bold(),
        Level::Info => " INF ".black().on_blue().bold(),
        Level::Debug => " DBG ".white().on_black(),
        Level::Trace => " TRC ".normal(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_are_resolved_by_crate() {
        assert!(matches!(Target::from_str("backseat_collab::host::session"), Target::Collab));
        assert!(matches!(Target::from_str("backseat_server"), Target::Server));
        assert!(matches!(Target::from_str("backseat"), Target::Main));
        assert!(matches!(Target::from_str("hyper::proto"), Target::External(_)));
    }

    #[test]
    fn external_crates_only_show_problems() {
        let hyper = Target::from_str("hyper::proto");

        assert!(!is_shown(Level::Info, &hyper, true));
        assert!(is_shown(Level::Warn, &hyper, false));
        assert!(is_shown(Level::Info, &Target::Core, false));
        assert!(!is_shown(Level::Debug, &Target::Core, false));
        assert!(is_shown(Level::Debug, &Target::Core, true));
    }
}
