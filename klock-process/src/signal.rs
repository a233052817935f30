//! Signal names and numbers

use std::str::FromStr;

use nix::sys::signal::Signal;

/// Parse a signal given as a name (`TERM`, `SIGTERM`, `term`) or a number (`15`)
pub fn parse_signal(input: &str) -> Option<Signal> {
    let input = input.trim();
    if let Ok(number) = input.parse::<i32>() {
        return Signal::try_from(number).ok();
    }
    let upper = input.to_ascii_uppercase();
    if upper.starts_with("SIG") {
        Signal::from_str(&upper).ok()
    } else {
        Signal::from_str(&format!("SIG{}", upper)).ok()
    }
}

/// Conventional name, e.g. `SIGTERM`
pub fn signal_name(signal: Signal) -> &'static str {
    signal.as_str()
}

pub fn signal_number(signal: Signal) -> i32 {
    signal as i32
}

/// Name for a raw signal number, falling back to the number itself
pub fn describe_signal(number: i32) -> String {
    Signal::try_from(number)
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|_| format!("signal {}", number))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_by_name() {
        assert_eq!(parse_signal("INT"), Some(Signal::SIGINT));
        assert_eq!(parse_signal("SIGINT"), Some(Signal::SIGINT));
        assert_eq!(parse_signal("hup"), Some(Signal::SIGHUP));
        assert_eq!(parse_signal(" TERM "), Some(Signal::SIGTERM));
    }

    #[test]
    fn test_parse_by_number() {
        assert_eq!(parse_signal("2"), Some(Signal::SIGINT));
        assert_eq!(parse_signal("9"), Some(Signal::SIGKILL));
        assert_eq!(parse_signal("15"), Some(Signal::SIGTERM));
    }

    #[test]
    fn test_parse_unknown() {
        for bad in ["", "0", "-1", "1000", "NOPE", "SIG"] {
            assert_eq!(parse_signal(bad), None, "{bad}");
        }
    }

    #[test]
    fn test_names_and_numbers() {
        assert_eq!(signal_name(Signal::SIGTERM), "SIGTERM");
        assert_eq!(signal_number(Signal::SIGINT), 2);
        assert_eq!(describe_signal(9), "SIGKILL");
        assert_eq!(describe_signal(1000), "signal 1000");
    }
}
