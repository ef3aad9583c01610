use std::fmt;

use crate::filter::Filter;
use crate::Error;

/// Syslog facility codes from RFC 5424. Codes above `local7` carry no
/// assigned name; they survive a priority round-trip via [`Facility::Other`]
/// and display as `"unknown"`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Facility {
    Kern,
    User,
    Mail,
    Daemon,
    Auth,
    Syslog,
    Lpr,
    News,
    Uucp,
    Cron,
    Authpriv,
    Ftp,
    Ntp,
    LogAudit,
    LogAlert,
    Clock,
    Local0,
    Local1,
    Local2,
    Local3,
    Local4,
    Local5,
    Local6,
    Local7,
    Other(u8),
}

const FAC_NAMES: [&str; 24] = [
    "kern", "user", "mail", "daemon", "auth", "syslog", "lpr", "news", "uucp", "cron", "authpriv",
    "ftp", "ntp", "logaudit", "logalert", "clock", "local0", "local1", "local2", "local3",
    "local4", "local5", "local6", "local7",
];

impl Facility {
    /// Facility part of a numeric priority value.
    pub fn from_priority(pri: u16) -> Facility {
        Facility::from_code((pri >> 3) as u8)
    }

    pub fn from_code(code: u8) -> Facility {
        match code {
            0 => Facility::Kern,
            1 => Facility::User,
            2 => Facility::Mail,
            3 => Facility::Daemon,
            4 => Facility::Auth,
            5 => Facility::Syslog,
            6 => Facility::Lpr,
            7 => Facility::News,
            8 => Facility::Uucp,
            9 => Facility::Cron,
            10 => Facility::Authpriv,
            11 => Facility::Ftp,
            12 => Facility::Ntp,
            13 => Facility::LogAudit,
            14 => Facility::LogAlert,
            15 => Facility::Clock,
            16 => Facility::Local0,
            17 => Facility::Local1,
            18 => Facility::Local2,
            19 => Facility::Local3,
            20 => Facility::Local4,
            21 => Facility::Local5,
            22 => Facility::Local6,
            23 => Facility::Local7,
            n => Facility::Other(n),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Facility::Kern => 0,
            Facility::User => 1,
            Facility::Mail => 2,
            Facility::Daemon => 3,
            Facility::Auth => 4,
            Facility::Syslog => 5,
            Facility::Lpr => 6,
            Facility::News => 7,
            Facility::Uucp => 8,
            Facility::Cron => 9,
            Facility::Authpriv => 10,
            Facility::Ftp => 11,
            Facility::Ntp => 12,
            Facility::LogAudit => 13,
            Facility::LogAlert => 14,
            Facility::Clock => 15,
            Facility::Local0 => 16,
            Facility::Local1 => 17,
            Facility::Local2 => 18,
            Facility::Local3 => 19,
            Facility::Local4 => 20,
            Facility::Local5 => 21,
            Facility::Local6 => 22,
            Facility::Local7 => 23,
            Facility::Other(n) => n,
        }
    }

    pub fn as_str(self) -> &'static str {
        FAC_NAMES.get(self.code() as usize).copied().unwrap_or("unknown")
    }
}

impl fmt::Display for Facility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for Facility {
    fn default() -> Facility {
        Facility::Kern
    }
}

pub fn parse_facility(s: &str) -> Result<Facility, Error> {
    for (i, name) in FAC_NAMES.iter().enumerate() {
        if *name == s {
            return Ok(Facility::from_code(i as u8));
        }
    }
    Err(Error::UnknownFacility(s.to_string()))
}

/// Parses a comma-separated facility list such as `"kern,auth"`.
pub fn parse_facilities(list: &str) -> Result<Vec<Facility>, Error> {
    list.split(',').map(parse_facility).collect()
}

/// Membership filter: accepts messages whose facility is in `list`.
pub fn facility_filter(list: Vec<Facility>) -> Filter {
    Box::new(move |m| list.contains(&m.facility))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Message;

    #[test]
    fn round_trip() {
        for code in 0u8..24 {
            assert_eq!(Facility::from_code(code).code(), code);
        }
        assert_eq!(Facility::from_code(25).code(), 25);
    }

    #[test]
    fn names() {
        assert_eq!(Facility::Kern.as_str(), "kern");
        assert_eq!(Facility::Local7.as_str(), "local7");
        assert_eq!(Facility::Other(42).to_string(), "unknown");
    }

    #[test]
    fn parse_list() {
        assert_eq!(parse_facilities("user").unwrap(), vec![Facility::User]);
        assert_eq!(
            parse_facilities("auth,daemon").unwrap(),
            vec![Facility::Auth, Facility::Daemon]
        );
        let err = parse_facilities("foo,bar").unwrap_err();
        assert_eq!(err.to_string(), "foo: unknown facility");
    }

    #[test]
    fn list_filter() {
        let f = facility_filter(parse_facilities("user").unwrap());
        assert!(f(&Message {
            facility: Facility::User,
            ..Message::default()
        }));
        assert!(!f(&Message {
            facility: Facility::Auth,
            ..Message::default()
        }));
    }
}
