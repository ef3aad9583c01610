use std::fmt;
use std::net::SocketAddr;
#[cfg(unix)]
use std::path::PathBuf;

use chrono::{DateTime, Datelike, FixedOffset, SecondsFormat, Utc};

use crate::{Facility, Severity};

/// Template rendering RFC-correct output for both message versions: v1
/// messages get the `1 ` version tag and an RFC 3339 timestamp, v0 messages
/// the classic `Mmm _D HH:MM:SS` header with no version tag.
pub const RFC_FORMAT: &str = "<%Z>%v %T %H %A %P %M %D %C";

/// Template behind [`Message::rfc5424`]; rendered with the version forced to
/// at least 1.
pub const RFC_5424_FORMAT: &str = "<%Z>%V %T %H %A %P %M %D %C";

/// Verbose rendering used by `Display`: source address and facility/severity
/// names instead of the numeric priority.
const STRING_FORMAT: &str = "%N <%F,%S>%V %T %H %A %P %M %D %C";

/// Network origin of a received datagram.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceAddr {
    Udp(SocketAddr),
    #[cfg(unix)]
    Unix(PathBuf),
    Tcp(SocketAddr),
}

impl SourceAddr {
    /// Only the network part of the address: the IP for UDP/TCP sources, the
    /// socket path for unix sources.
    pub fn net_src(&self) -> String {
        match self {
            SourceAddr::Udp(a) | SourceAddr::Tcp(a) => a.ip().to_string(),
            #[cfg(unix)]
            SourceAddr::Unix(p) => p.display().to_string(),
        }
    }
}

impl fmt::Display for SourceAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceAddr::Udp(a) | SourceAddr::Tcp(a) => a.fmt(f),
            #[cfg(unix)]
            SourceAddr::Unix(p) => p.display().fmt(f),
        }
    }
}

/// A syslog message.
///
/// String fields hold the empty string when the wire message omitted them;
/// the RFC 5424 NILVALUE `-` is stored verbatim. [`Message::format`] elides
/// blank fields together with their separating space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Receiver wall clock at the moment the datagram was parsed.
    pub time: DateTime<FixedOffset>,
    /// Where the datagram came from; `None` for synthesized messages.
    pub source: Option<SourceAddr>,
    pub facility: Facility,
    pub severity: Severity,
    /// 0 for RFC 3164 messages, 1 for RFC 5424.
    pub version: u8,
    /// Sender timestamp; `None` falls back to `time` when rendering.
    pub timestamp: Option<DateTime<FixedOffset>>,
    pub hostname: String,
    /// The RFC 3164 tag before `[pid]` or `:`, or the RFC 5424 APP-NAME.
    pub application: String,
    pub proc_id: String,
    pub msg_id: String,
    /// Structured data, verbatim: either `-` or concatenated
    /// `[id key="value" ...]` elements.
    pub data: String,
    /// Free-form body. For v0 messages this usually keeps its leading `": "`.
    pub content: String,
}

impl Default for Message {
    fn default() -> Message {
        Message {
            time: DateTime::<Utc>::UNIX_EPOCH.fixed_offset(),
            source: None,
            facility: Facility::default(),
            severity: Severity::default(),
            version: 0,
            timestamp: None,
            hostname: String::new(),
            application: String::new(),
            proc_id: String::new(),
            msg_id: String::new(),
            data: String::new(),
            content: String::new(),
        }
    }
}

impl Message {
    /// Combined numeric priority, `facility * 8 + severity`.
    pub fn priority(&self) -> u16 {
        (self.facility.code() as u16) << 3 | self.severity.code() as u16
    }

    /// Only the network part of the source address, or the empty string for
    /// synthesized messages.
    pub fn net_src(&self) -> String {
        self.source.as_ref().map(SourceAddr::net_src).unwrap_or_default()
    }

    fn ts(&self) -> DateTime<FixedOffset> {
        self.timestamp.unwrap_or(self.time)
    }

    /// Renders the message through a `%`-escape template.
    ///
    /// | escape | emits |
    /// |--------|-------|
    /// | `%Z`   | numeric priority |
    /// | `%F`, `%S` | facility / severity name |
    /// | `%V`   | version |
    /// | `%v`   | version, only when greater than zero |
    /// | `%T`   | timestamp: `Mmm _D HH:MM:SS` for v0, RFC 3339 for v1 |
    /// | `%Y`   | four-digit year, v0 only |
    /// | `%H`   | hostname |
    /// | `%A`   | application; for v0 with a proc id, `app[procid]` |
    /// | `%P`   | proc id, unless already fused into `%A` |
    /// | `%M`   | msg id |
    /// | `%D`   | structured data |
    /// | `%N`   | source address |
    /// | `%C`   | content |
    /// | `%%`   | a literal `%` |
    ///
    /// A blank field is omitted together with its separating space, so the
    /// output never carries doubled or dangling separators. When the content
    /// starts with `:` (common for v0 tags) the space before it is dropped as
    /// well.
    pub fn format(&self, template: &str) -> String {
        self.format_with(template, self.version)
    }

    /// The canonical RFC 5424 rendering. The version is forced to at least 1
    /// so that v0 messages come out in modern framing.
    pub fn rfc5424(&self) -> String {
        self.format_with(RFC_5424_FORMAT, self.version.max(1))
    }

    fn format_with(&self, template: &str, version: u8) -> String {
        let ts = self.ts();
        let mut out = String::with_capacity(template.len() + self.content.len() + 32);
        // One separating space is owed before the next emission; a blank
        // field eats the space that follows it.
        let mut pending_space = false;
        let mut eat_space = false;

        fn put(out: &mut String, pending: &mut bool, eat: &mut bool, text: &str) {
            if text.is_empty() {
                *eat = true;
                return;
            }
            if *pending {
                if !out.is_empty() {
                    out.push(' ');
                }
                *pending = false;
            }
            *eat = false;
            out.push_str(text);
        }

        let mut chars = template.chars();
        while let Some(c) = chars.next() {
            if c != '%' {
                if c == ' ' {
                    if eat_space {
                        eat_space = false;
                    } else {
                        pending_space = true;
                    }
                } else {
                    put(&mut out, &mut pending_space, &mut eat_space, c.encode_utf8(&mut [0; 4]));
                }
                continue;
            }
            let Some(code) = chars.next() else {
                put(&mut out, &mut pending_space, &mut eat_space, "%");
                break;
            };
            let fused = version == 0 && !self.application.is_empty() && !self.proc_id.is_empty();
            match code {
                '%' => put(&mut out, &mut pending_space, &mut eat_space, "%"),
                'Z' => put(&mut out, &mut pending_space, &mut eat_space, &self.priority().to_string()),
                'F' => put(&mut out, &mut pending_space, &mut eat_space, self.facility.as_str()),
                'S' => put(&mut out, &mut pending_space, &mut eat_space, self.severity.as_str()),
                'V' => put(&mut out, &mut pending_space, &mut eat_space, &version.to_string()),
                'v' => {
                    let v = if version > 0 { version.to_string() } else { String::new() };
                    put(&mut out, &mut pending_space, &mut eat_space, &v);
                }
                'T' => {
                    let t = if version == 0 {
                        ts.format("%b %e %H:%M:%S").to_string()
                    } else {
                        ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
                    };
                    put(&mut out, &mut pending_space, &mut eat_space, &t);
                }
                'Y' => {
                    let y = if version == 0 {
                        format!("{:04}", ts.year())
                    } else {
                        String::new()
                    };
                    put(&mut out, &mut pending_space, &mut eat_space, &y);
                }
                'H' => put(&mut out, &mut pending_space, &mut eat_space, &self.hostname),
                'A' => {
                    if fused {
                        let a = format!("{}[{}]", self.application, self.proc_id);
                        put(&mut out, &mut pending_space, &mut eat_space, &a);
                    } else {
                        put(&mut out, &mut pending_space, &mut eat_space, &self.application);
                    }
                }
                'P' => {
                    let p = if fused { "" } else { self.proc_id.as_str() };
                    put(&mut out, &mut pending_space, &mut eat_space, p);
                }
                'M' => put(&mut out, &mut pending_space, &mut eat_space, &self.msg_id),
                'D' => put(&mut out, &mut pending_space, &mut eat_space, &self.data),
                'N' => {
                    let n = self.source.as_ref().map(|s| s.to_string()).unwrap_or_default();
                    put(&mut out, &mut pending_space, &mut eat_space, &n);
                }
                'C' => {
                    if self.content.starts_with(':') {
                        pending_space = false;
                        if out.ends_with(' ') {
                            out.pop();
                        }
                    }
                    put(&mut out, &mut pending_space, &mut eat_space, &self.content);
                }
                other => {
                    put(&mut out, &mut pending_space, &mut eat_space, "%");
                    put(&mut out, &mut pending_space, &mut eat_space, other.encode_utf8(&mut [0; 4]));
                }
            }
        }
        out
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_with(STRING_FORMAT, 1))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn sample() -> Message {
        Message {
            facility: Facility::User,
            severity: Severity::Debug,
            version: 1,
            timestamp: Some(Utc.with_ymd_and_hms(2023, 10, 26, 15, 30, 0).unwrap().fixed_offset()),
            hostname: "myhost.example.com".into(),
            application: "myapp".into(),
            proc_id: "12345".into(),
            msg_id: "m1".into(),
            data: r#"[example@32473 eventSource="system"]"#.into(),
            content: "This is a sample syslog message".into(),
            ..Message::default()
        }
    }

    #[test]
    fn priority_composition() {
        let m = sample();
        assert_eq!(m.priority(), 15);
        let m = Message {
            facility: Facility::Local4,
            severity: Severity::Notice,
            ..Message::default()
        };
        assert_eq!(m.priority(), 165);
    }

    #[test]
    fn rfc5424_rendering() {
        assert_eq!(
            sample().rfc5424(),
            "<15>1 2023-10-26T15:30:00Z myhost.example.com myapp 12345 m1 \
             [example@32473 eventSource=\"system\"] This is a sample syslog message"
        );
    }

    #[test]
    fn rfc5424_forces_version() {
        let mut m = sample();
        m.version = 0;
        assert!(m.rfc5424().starts_with("<15>1 2023-10-26T15:30:00Z"));
    }

    #[test]
    fn v0_rendering_fuses_tag() {
        let m = Message {
            facility: Facility::Auth,
            severity: Severity::Crit,
            version: 0,
            timestamp: Some(Utc.with_ymd_and_hms(2023, 10, 11, 22, 14, 15).unwrap().fixed_offset()),
            hostname: "mymachine".into(),
            application: "su".into(),
            proc_id: "330".into(),
            content: ": 'su root' failed".into(),
            ..Message::default()
        };
        assert_eq!(
            m.format(RFC_FORMAT),
            "<34>Oct 11 22:14:15 mymachine su[330]: 'su root' failed"
        );
    }

    #[test]
    fn blank_fields_compact() {
        let m = Message {
            facility: Facility::User,
            severity: Severity::Notice,
            version: 1,
            timestamp: Some(Utc.with_ymd_and_hms(2023, 2, 15, 17, 32, 18).unwrap().fixed_offset()),
            content: "Use the BFG!".into(),
            ..Message::default()
        };
        let s = m.format(RFC_FORMAT);
        assert_eq!(s, "<13>1 2023-02-15T17:32:18Z Use the BFG!");
        assert!(!s.contains("  "), "doubled separator in {s:?}");
    }

    #[test]
    fn escape_literals() {
        let m = sample();
        assert_eq!(m.format("%%"), "%");
        assert_eq!(m.format("%q"), "%q");
        assert_eq!(m.format("%F.%S"), "user.debug");
        assert_eq!(m.format("%Z"), "15");
    }

    #[test]
    fn display_is_verbose() {
        let mut m = sample();
        m.source = Some(SourceAddr::Udp("127.0.0.1:5514".parse().unwrap()));
        assert_eq!(
            m.to_string(),
            "127.0.0.1:5514 <user,debug>1 2023-10-26T15:30:00Z myhost.example.com myapp \
             12345 m1 [example@32473 eventSource=\"system\"] This is a sample syslog message"
        );
    }

    #[test]
    fn timestamp_falls_back_to_receive_time() {
        let m = Message {
            time: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap().fixed_offset(),
            version: 1,
            content: "x".into(),
            ..Message::default()
        };
        assert_eq!(m.format("%T"), "2024-01-02T03:04:05Z");
    }

    #[test]
    fn net_src_strips_port() {
        let m = Message {
            source: Some(SourceAddr::Udp("192.0.2.1:514".parse().unwrap())),
            ..Message::default()
        };
        assert_eq!(m.net_src(), "192.0.2.1");
        assert_eq!(Message::default().net_src(), "");
    }
}
