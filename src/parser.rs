//! Datagram decoder for both syslog wire grammars.
//!
//! The parser is total: any input yields either a best-effort [`Message`] or
//! a diagnostic [`Error`], never a fault. Header fields are byte-oriented
//! (RFC 5424 confines them to ASCII 33..126); the free-form content is
//! decoded as UTF-8 with replacement characters for invalid sequences.

use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveDateTime};

use crate::timestamp;
use crate::{Error, Facility, Message, Severity};

/// Priority assumed when a message carries no `<PRI>` prefix (`user.notice`).
const DEFAULT_PRIORITY: u16 = 13;

/// Parses one datagram, stamping the receiver time from the wall clock.
pub fn parse_message(pkt: &[u8]) -> Result<Message, Error> {
    parse_message_at(pkt, Local::now().fixed_offset())
}

/// Parses one datagram with an explicit receiver stamp. The stamp dates
/// year-less RFC 3164 timestamps and is the fallback when the sender
/// timestamp is absent or malformed. Useful for replay and tests.
pub fn parse_message_at(pkt: &[u8], received: DateTime<FixedOffset>) -> Result<Message, Error> {
    let mut m = Message {
        time: received,
        timestamp: Some(received),
        ..Message::default()
    };

    let mut bs = trim_trailing(pkt);

    let mut has_bom = false;
    if let Some(bom) = find_bom(bs) {
        m.content = String::from_utf8_lossy(&bs[bom + 3..]).into_owned();
        bs = &bs[..bom];
        has_bom = true;
    }

    let header = String::from_utf8_lossy(bs);
    let mut s: &str = &header;

    // The PRI part is required by both RFCs but treated as optional here;
    // plenty of senders omit it.
    let mut prio = DEFAULT_PRIORITY;
    if s.starts_with('<') {
        if let Some(gt) = s[1..].find('>') {
            if (1..=3).contains(&gt) {
                let digits = &s[1..1 + gt];
                prio = digits.parse().map_err(|_| Error::InvalidPriority {
                    digits: digits.to_string(),
                    packet: crop(s, 50),
                })?;
                s = &s[gt + 2..];
            }
        }
    }
    m.severity = Severity::from_priority(prio);
    m.facility = Facility::from_priority(prio);

    if let Some(rest) = s.strip_prefix("1 ") {
        m.version = 1;
        parse_rfc5424(&mut m, rest, has_bom);
    } else {
        parse_rfc3164(&mut m, s);
    }
    Ok(m)
}

fn parse_rfc5424(m: &mut Message, s: &str, has_bom: bool) {
    let mut s = s;

    if let Some(rest) = s.strip_prefix("- ") {
        s = rest; // NILVALUE: no sender timestamp
    } else if let Some(sp) = s.find(' ') {
        if let Some(ts) = timestamp::parse_rfc3339(s[..sp].as_bytes()) {
            m.timestamp = Some(ts);
            s = &s[sp + 1..];
        }
    }

    s = next_field(s, &mut m.hostname);
    s = next_field(s, &mut m.application);
    s = next_field(s, &mut m.proc_id);
    s = next_field(s, &mut m.msg_id);

    if let Some(rest) = s.strip_prefix("- ") {
        m.data = "-".to_string();
        s = rest;
    } else if s.starts_with('[') {
        // SD-ELEMENTs concatenate only when `][`-adjacent; `\]` does not
        // close a block. An unterminated block leaves the data empty and the
        // rest becomes content.
        let mut end = 0;
        loop {
            match index_unescaped(&s[end..], b']') {
                Some(r) => end += r + 1,
                None => {
                    end = 0;
                    break;
                }
            }
            if s.as_bytes().get(end) != Some(&b'[') {
                break;
            }
        }
        if end > 0 {
            m.data = s[..end].to_string();
            s = &s[end..];
        }
    }

    if !has_bom {
        m.content = s.strip_prefix(' ').unwrap_or(s).to_string();
    }
}

fn parse_rfc3164(m: &mut Message, s: &str) {
    let mut s = s.trim_start();

    let mut naive: Option<NaiveDateTime> = None;
    let b = s.as_bytes();
    if b.get(15) == Some(&b' ') {
        if let Some(ts) = timestamp::parse_rfc3164(&b[..15], m.time.year()) {
            naive = Some(ts);
            s = &s[15..];
        }
    } else if b.get(20) == Some(&b' ') {
        if let Some(ts) = timestamp::parse_rfc3164_with_year(&b[..20]) {
            naive = Some(ts);
            s = &s[20..];
        }
    }

    s = s.trim_start();

    // Tolerated legacy: a `TZ±N` token shifts the timestamp's zone while the
    // wall-clock reading stays as written.
    let mut offset_hours = 0;
    if s.starts_with("TZ") {
        let sp = next_space(s);
        if sp > 0 {
            if let Ok(tz) = s[2..sp].parse::<i32>() {
                if (-12..=12).contains(&tz) {
                    offset_hours = tz;
                }
            }
            s = s.get(sp + 1..).unwrap_or("");
        }
    }

    if let Some(naive) = naive {
        let zone = FixedOffset::east_opt(offset_hours * 3600);
        if let Some(ts) = zone.and_then(|z| naive.and_local_timezone(z).single()) {
            m.timestamp = Some(ts);
        }
    }

    let Some(colon) = index_unescaped(s, b':') else {
        m.content = s.to_string();
        return;
    };
    m.content = s[colon..].to_string();

    let mut words = s[..colon].split(' ');
    if let Some(first) = words.next() {
        m.hostname = first.to_string();
    }
    if let Some(last) = words.last() {
        match (last.ends_with(']'), last.find('[')) {
            (true, Some(l)) if l > 0 => {
                m.application = last[..l].to_string();
                m.proc_id = last[l + 1..last.len() - 1].to_string();
            }
            _ => m.application = last.to_string(),
        }
    }
}

/// Consumes one RFC 5424 header field. `- ` stores the NILVALUE verbatim; a
/// field is terminated by a space or by any byte outside printable ASCII
/// (in which case it is left unconsumed, like the remaining fields).
fn next_field<'a>(s: &'a str, field: &mut String) -> &'a str {
    if let Some(rest) = s.strip_prefix("- ") {
        *field = "-".to_string();
        return rest;
    }
    let sp = next_space(s);
    if sp > 0 && !s.starts_with('[') {
        *field = s[..sp].to_string();
        s.get(sp + 1..).unwrap_or("")
    } else {
        s
    }
}

/// Index of the next space, or `s.len()` if none. Returns 0 when a byte
/// outside printable ASCII 33..126 appears first.
fn next_space(s: &str) -> usize {
    for (i, b) in s.bytes().enumerate() {
        if b == b' ' {
            return i;
        }
        if !(33..=126).contains(&b) {
            return 0;
        }
    }
    s.len()
}

/// Finds `needle`, skipping occurrences escaped by an odd run of `\`.
fn index_unescaped(s: &str, needle: u8) -> Option<usize> {
    let mut esc = false;
    for (i, b) in s.bytes().enumerate() {
        match b {
            b'\\' => esc = !esc,
            _ if b == needle && !esc => return Some(i),
            _ => esc = false,
        }
    }
    None
}

fn find_bom(bs: &[u8]) -> Option<usize> {
    bs.windows(3).position(|w| w == [0xEF, 0xBB, 0xBF])
}

fn trim_trailing(mut bs: &[u8]) -> &[u8] {
    while let [rest @ .., 0 | b'\r' | b'\n'] = bs {
        bs = rest;
    }
    bs
}

fn crop(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn space_scan() {
        assert_eq!(next_space("abc def"), 3);
        assert_eq!(next_space("abc"), 3);
        assert_eq!(next_space(""), 0);
        assert_eq!(next_space(" abc"), 0);
        assert_eq!(next_space("ab\u{1}c d"), 0);
        assert_eq!(next_space("ab\u{fffd}c d"), 0);
    }

    #[test]
    fn unescaped_scan() {
        assert_eq!(index_unescaped("abc]", b']'), Some(3));
        assert_eq!(index_unescaped(r"ab\]c]", b']'), Some(5));
        assert_eq!(index_unescaped(r"ab\\]c", b']'), Some(4));
        assert_eq!(index_unescaped(r"ab\]c", b']'), None);
        assert_eq!(index_unescaped("abc", b']'), None);
    }

    #[test]
    fn bom_detection() {
        assert_eq!(find_bom(b"abc\xEF\xBB\xBFdef"), Some(3));
        assert_eq!(find_bom(b"abc"), None);
        assert_eq!(find_bom(b"ab\xEF\xBB"), None);
    }

    #[test]
    fn trailing_noise_trimmed() {
        assert_eq!(trim_trailing(b"abc\r\n\0"), b"abc");
        assert_eq!(trim_trailing(b"\n"), b"");
        assert_eq!(trim_trailing(b"abc"), b"abc");
    }

    #[test]
    fn crop_long_input() {
        assert_eq!(crop("short", 50), "short");
        let long = "x".repeat(60);
        assert_eq!(crop(&long, 50), format!("{}...", "x".repeat(50)));
    }

    #[test]
    fn invalid_priority_is_diagnosed() {
        let err = parse_message(b"<1a>something").unwrap_err();
        assert_eq!(
            err.to_string(),
            "1a: message has invalid priority (<1a>something)"
        );
    }

    #[test]
    fn missing_priority_defaults_to_user_notice() {
        let m = parse_message(b"plain text").unwrap();
        assert_eq!(m.facility, Facility::User);
        assert_eq!(m.severity, Severity::Notice);
        assert_eq!(m.content, "plain text");
    }

    #[test]
    fn unmatched_priority_bracket_kept_as_content() {
        let m = parse_message(b"<12345> hello").unwrap();
        assert_eq!(m.priority(), DEFAULT_PRIORITY);
        assert_eq!(m.content, "<12345> hello");
    }

    #[test]
    fn empty_datagram() {
        let m = parse_message(b"\r\n").unwrap();
        assert_eq!(m.priority(), DEFAULT_PRIORITY);
        assert_eq!(m.content, "");
    }

    #[test]
    fn truncated_rfc5424_header() {
        // ends right after a field, with no separator to consume
        let m = parse_message(b"<165>1 - 192.0.2.1 myproc").unwrap();
        assert_eq!(m.hostname, "192.0.2.1");
        assert_eq!(m.application, "myproc");
        assert_eq!(m.content, "");
    }

    #[test]
    fn out_of_range_facility_renders_unknown() {
        let m = parse_message(b"<250>hello").unwrap();
        assert_eq!(m.facility, Facility::Other(31));
        assert_eq!(m.facility.as_str(), "unknown");
        assert_eq!(m.priority(), 250);
    }

    #[test]
    fn sd_with_escaped_bracket() {
        let m = parse_message(br#"<165>1 - host app - - [id key="a\]b"] body"#).unwrap();
        assert_eq!(m.data, r#"[id key="a\]b"]"#);
        assert_eq!(m.content, "body");
    }

    #[test]
    fn sd_unterminated_becomes_content() {
        let m = parse_message(b"<165>1 - host app - - [id key= body").unwrap();
        assert_eq!(m.data, "");
        assert_eq!(m.content, "[id key= body");
    }

    #[test]
    fn version_other_than_one_is_legacy() {
        let m = parse_message(b"<13>2 2023-01-01T00:00:00Z host app - - - x").unwrap();
        assert_eq!(m.version, 0);
    }
}
