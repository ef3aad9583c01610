use crate::facility::{facility_filter, parse_facilities};
use crate::severity::{parse_severities, severity_filter};
use crate::{Error, Message};

/// A message predicate. Filters gate the server's ingress path and the
/// accept/discard decisions of handlers.
pub type Filter = Box<dyn Fn(&Message) -> bool + Send + Sync>;

/// The no-op filter.
pub fn accept_everything() -> Filter {
    Box::new(|_| true)
}

/// Accepts a message only when every filter in `filters` accepts it.
pub fn all(filters: Vec<Filter>) -> Filter {
    Box::new(move |m| filters.iter().all(|f| f(m)))
}

/// Accepts a message when any filter in `filters` accepts it. The message is
/// rejected only if all of them reject it.
pub fn any(filters: Vec<Filter>) -> Filter {
    Box::new(move |m| filters.iter().any(|f| f(m)))
}

/// Parses a priority filter such as `"user.info,warn,error"`.
///
/// The grammar is `<facility-list>.<severity-list>` where either side may be
/// the wildcard `*` and lists are comma-separated: `*.*` accepts everything,
/// `kern,auth.*` matches on facility only, `*.err` on severity only.
pub fn parse_priority_filter(pri: &str) -> Result<Filter, Error> {
    let (facs, sevs) = pri
        .split_once('.')
        .filter(|(f, s)| !f.is_empty() && !s.is_empty() && !f.contains('.') && !s.contains('.'))
        .ok_or_else(|| Error::InvalidPriorityFilter(pri.to_string()))?;

    match (facs, sevs) {
        ("*", "*") => Ok(accept_everything()),
        ("*", _) => Ok(severity_filter(parse_severities(sevs)?)),
        (_, "*") => Ok(facility_filter(parse_facilities(facs)?)),
        _ => Ok(all(vec![
            facility_filter(parse_facilities(facs)?),
            severity_filter(parse_severities(sevs)?),
        ])),
    }
}
