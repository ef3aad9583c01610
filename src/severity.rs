use std::fmt;

use crate::filter::Filter;
use crate::Error;

/// Syslog severity codes from RFC 5424.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Emerg,
    Alert,
    Crit,
    Err,
    Warning,
    Notice,
    Info,
    Debug,
}

const SEV_NAMES: [&str; 8] = [
    "emerg", "alert", "crit", "err", "warning", "notice", "info", "debug",
];

impl Severity {
    /// Severity part of a numeric priority value (the low three bits).
    pub fn from_priority(pri: u16) -> Severity {
        match pri & 0x07 {
            0 => Severity::Emerg,
            1 => Severity::Alert,
            2 => Severity::Crit,
            3 => Severity::Err,
            4 => Severity::Warning,
            5 => Severity::Notice,
            6 => Severity::Info,
            _ => Severity::Debug,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        SEV_NAMES[self as usize]
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for Severity {
    fn default() -> Severity {
        Severity::Emerg
    }
}

/// Accepts the canonical RFC 5424 names plus the common aliases `warn`,
/// `error` and `panic`.
pub fn parse_severity(s: &str) -> Result<Severity, Error> {
    for (i, name) in SEV_NAMES.iter().enumerate() {
        if *name == s {
            return Ok(Severity::from_priority(i as u16));
        }
    }
    match s {
        "warn" => Ok(Severity::Warning),
        "error" => Ok(Severity::Err),
        "panic" => Ok(Severity::Emerg),
        _ => Err(Error::UnknownSeverity(s.to_string())),
    }
}

/// Parses a comma-separated severity list such as `"notice,warning,err"`.
pub fn parse_severities(list: &str) -> Result<Vec<Severity>, Error> {
    list.split(',').map(parse_severity).collect()
}

/// Membership filter: accepts messages whose severity is in `list`.
pub fn severity_filter(list: Vec<Severity>) -> Filter {
    Box::new(move |m| list.contains(&m.severity))
}
