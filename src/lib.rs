//! Syslog reception: datagram listeners, a tolerant parser for both
//! [RFC 5424](https://tools.ietf.org/html/rfc5424) and the older
//! [RFC 3164](https://tools.ietf.org/html/rfc3164) BSD grammar (plus the
//! common malformations of each), and an ordered handler pipeline for
//! filing, filtering and re-rendering what arrives.
//!
//! A [`Server`] owns one receive thread per listener (UDP or unix datagram),
//! funnels parsed [`Message`]s through a bounded queue and hands them to
//! [`Handler`]s in registration order; each handler passes the message on,
//! rewrites it, or consumes it. [`FileHandler`] files messages into
//! per-host/program/facility/severity files with built-in gzip log rotation,
//! and [`BaseHandler`] adapts the pipeline to handlers that want their own
//! worker thread.
//!
//! # Example
//!
//! A small syslog daemon writing everything of `warning` or worse to one
//! file per sending host:
//!
//! ```no_run
//! use syslogd::{parse_priority_filter, FileHandler, Server, RFC_FORMAT};
//!
//! let mut handler = FileHandler::new("/var/log/remote/%hostname%.log", RFC_FORMAT);
//! handler.set_rotate(4);
//!
//! let mut server = Server::new(100);
//! server.set_filter(parse_priority_filter("*.warning,err,crit,alert,panic").unwrap());
//! server.add_handler(handler);
//! server.listen("0.0.0.0:514").unwrap();
//!
//! // Deliver SIGHUP to server.sig_hup() and SIGTERM/SIGINT to
//! // server.shutdown(); the library installs no signal handlers itself.
//! ```
//!
//! Raw parsing works without a server:
//!
//! ```
//! let m = syslogd::parse_message(
//!     b"<34>1 2003-10-11T22:14:15.003Z mymachine.example.com su - ID47 - hi",
//! )
//! .unwrap();
//! assert_eq!(m.hostname, "mymachine.example.com");
//! assert_eq!(m.content, "hi");
//! ```
//!
//! Header fields are parsed byte-wise (the RFCs confine them to printable
//! ASCII); message content is decoded as UTF-8, with replacement characters
//! standing in for anything else.

mod error;
mod facility;
mod file_handler;
mod filter;
mod handler;
mod message;
mod parser;
mod server;
mod severity;
mod timestamp;

pub use error::Error;
pub use facility::{facility_filter, parse_facilities, parse_facility, Facility};
pub use file_handler::{ErrorSink, FileHandler};
pub use filter::{accept_everything, all, any, parse_priority_filter, Filter};
pub use handler::{BaseHandler, Handler, MessageQueue};
pub use message::{Message, SourceAddr, RFC_5424_FORMAT, RFC_FORMAT};
pub use parser::{parse_message, parse_message_at};
pub use server::Server;
pub use severity::{parse_severities, parse_severity, severity_filter, Severity};
