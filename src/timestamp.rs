//! The three sender-timestamp grammars: RFC 3339 (used by RFC 5424
//! messages) and the legacy RFC 3164 header with and without a year.
//!
//! Parsing is byte-oriented; a `None` means the field did not match, in
//! which case the caller leaves the input unconsumed and keeps the receiver
//! stamp as the timestamp.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};

const MONTHS: [&[u8; 3]; 12] = [
    b"Jan", b"Feb", b"Mar", b"Apr", b"May", b"Jun", b"Jul", b"Aug", b"Sep", b"Oct", b"Nov", b"Dec",
];

fn digit(b: u8) -> Option<u32> {
    b.is_ascii_digit().then(|| (b - b'0') as u32)
}

fn digits2(b: &[u8]) -> Option<u32> {
    Some(digit(b[0])? * 10 + digit(b[1])?)
}

fn digits4(b: &[u8]) -> Option<u32> {
    Some(digits2(&b[0..2])? * 100 + digits2(&b[2..4])?)
}

/// RFC 3339, with optional fractional seconds and a numeric or `Z` offset.
/// The whole buffer must be consumed.
pub(crate) fn parse_rfc3339(buf: &[u8]) -> Option<DateTime<FixedOffset>> {
    // "YYYY-MM-DDTHH:MM:SS" before any fraction or offset
    if buf.len() < 19 {
        return None;
    }
    let year = digits4(&buf[0..4])? as i32;
    if buf[4] != b'-' {
        return None;
    }
    let month = digits2(&buf[5..7])?;
    if buf[7] != b'-' {
        return None;
    }
    let day = digits2(&buf[8..10])?;
    if !matches!(buf[10], b'T' | b't' | b' ') {
        return None;
    }
    let hour = digits2(&buf[11..13])?;
    if buf[13] != b':' {
        return None;
    }
    let minute = digits2(&buf[14..16])?;
    if buf[16] != b':' {
        return None;
    }
    let second = digits2(&buf[17..19])?;

    let mut pos = 19;
    let mut nanos: u32 = 0;
    if buf.get(pos) == Some(&b'.') {
        pos += 1;
        let mut seen = 0usize;
        while let Some(d) = buf.get(pos).copied().and_then(digit) {
            // digits beyond nanosecond precision are read and discarded
            if seen < 9 {
                nanos = nanos * 10 + d;
            }
            seen += 1;
            pos += 1;
        }
        if seen == 0 {
            return None;
        }
        if seen < 9 {
            nanos *= 10u32.pow(9 - seen as u32);
        }
    }

    let offset_secs = match buf.get(pos).copied() {
        None => 0,
        Some(b'Z') | Some(b'z') => {
            pos += 1;
            0
        }
        Some(sign @ (b'+' | b'-')) => {
            pos += 1;
            let h = digits2(buf.get(pos..pos + 2)?)? as i32;
            pos += 2;
            if buf.get(pos) == Some(&b':') {
                pos += 1;
            }
            let m = digits2(buf.get(pos..pos + 2)?)? as i32;
            pos += 2;
            let secs = h * 3600 + m * 60;
            if sign == b'-' { -secs } else { secs }
        }
        Some(_) => return None,
    };
    if pos != buf.len() {
        return None;
    }

    let offset = FixedOffset::east_opt(offset_secs)?;
    NaiveDate::from_ymd_opt(year, month, day)?
        .and_hms_nano_opt(hour, minute, second, nanos)?
        .and_local_timezone(offset)
        .single()
}

/// The year-less RFC 3164 header `Mmm _D HH:MM:SS`, exactly 15 bytes, dated
/// with `year` (normally the receiver's current year).
pub(crate) fn parse_rfc3164(buf: &[u8], year: i32) -> Option<NaiveDateTime> {
    if buf.len() < 15 {
        return None;
    }
    let month = MONTHS.iter().position(|m| **m == buf[0..3])? as u32 + 1;
    if buf[3] != b' ' {
        return None;
    }
    let day = match buf[4] {
        b' ' => digit(buf[5])?,
        _ => digits2(&buf[4..6])?,
    };
    if buf[6] != b' ' {
        return None;
    }
    let hour = digits2(&buf[7..9])?;
    if buf[9] != b':' {
        return None;
    }
    let minute = digits2(&buf[10..12])?;
    if buf[12] != b':' {
        return None;
    }
    let second = digits2(&buf[13..15])?;

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

/// The RFC 3164 variant some senders emit with a leading year:
/// `YYYY Mmm _D HH:MM:SS`, exactly 20 bytes.
pub(crate) fn parse_rfc3164_with_year(buf: &[u8]) -> Option<NaiveDateTime> {
    if buf.len() < 20 {
        return None;
    }
    let year = digits4(&buf[0..4])? as i32;
    if buf[4] != b' ' {
        return None;
    }
    parse_rfc3164(&buf[5..20], year)
}
