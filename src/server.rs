use std::io;
use std::net::UdpSocket;
#[cfg(unix)]
use std::os::unix::net::UnixDatagram;
#[cfg(unix)]
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, warn};

use crate::filter::Filter;
use crate::parser::parse_message;
use crate::{Error, Handler, Message, SourceAddr};

/// Datagrams above this size are truncated by the OS anyway.
const RECV_BUF_SIZE: usize = 64 * 1024;

/// Receive loops wake at this interval to observe the shutdown flag; std
/// datagram sockets cannot be closed out from under a blocked read.
const SHUTDOWN_POLL: Duration = Duration::from_millis(250);

type IngressFilter = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

/// A multi-listener syslog server.
///
/// Datagrams received on any listener are parsed, run through the listener's
/// ingress filter, pushed through a bounded queue and delivered to the
/// registered handlers in order. The queue applies back-pressure: a slow
/// pipeline blocks the receive loops and ultimately lets the OS drop
/// packets, which is the expected UDP failure mode.
///
/// ```no_run
/// use syslogd::{parse_priority_filter, FileHandler, Server};
///
/// let mut server = Server::new(100);
/// server.set_filter(parse_priority_filter("*.notice,warning,err").unwrap());
/// server.add_handler(FileHandler::new("/var/log/%hostname%.log", syslogd::RFC_FORMAT));
/// server.listen("0.0.0.0:514").unwrap();
/// // ... wait for SIGTERM/SIGINT ...
/// server.shutdown();
/// ```
pub struct Server {
    sender: Option<flume::Sender<Message>>,
    handlers: Arc<Mutex<Vec<Box<dyn Handler>>>>,
    accept: IngressFilter,
    shut_down: Arc<AtomicBool>,
    receivers: Vec<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl Server {
    /// Creates an idle server whose internal queue holds up to `qlen`
    /// messages. The dispatch thread starts immediately; it idles until
    /// listeners feed it.
    pub fn new(qlen: usize) -> Server {
        let (sender, receiver) = flume::bounded(qlen);
        let handlers: Arc<Mutex<Vec<Box<dyn Handler>>>> = Arc::new(Mutex::new(Vec::new()));

        let dispatch_handlers = Arc::clone(&handlers);
        let dispatcher = thread::Builder::new()
            .name("syslog-dispatch".to_string())
            .spawn(move || dispatch_loop(receiver, dispatch_handlers))
            .expect("failed to spawn dispatch thread");

        Server {
            sender: Some(sender),
            handlers,
            accept: Arc::new(|_| true),
            shut_down: Arc::new(AtomicBool::new(false)),
            receivers: Vec::new(),
            dispatcher: Some(dispatcher),
        }
    }

    /// Replaces the default ingress filter used by subsequent
    /// [`listen`](Server::listen) calls.
    pub fn set_filter(&mut self, accept: Filter) {
        self.accept = Arc::from(accept);
    }

    /// Appends a handler to the pipeline. Handlers added after listeners are
    /// already feeding the queue only see messages dispatched from then on.
    pub fn add_handler<H: Handler + 'static>(&mut self, handler: H) {
        self.handlers.lock().unwrap().push(Box::new(handler));
    }

    /// Starts a receive loop on `addr` with the server's ingress filter.
    ///
    /// An `addr` containing `:` is bound as a UDP `host:port`; anything else
    /// is taken as a filesystem path for a unix datagram socket. Several
    /// listeners may coexist.
    ///
    /// # Panics
    ///
    /// Panics when the server has already been shut down.
    pub fn listen(&mut self, addr: &str) -> Result<(), Error> {
        self.spawn_listener(addr, Arc::clone(&self.accept))
    }

    /// Like [`listen`](Server::listen), with a filter for this listener only.
    pub fn listen_filter(&mut self, addr: &str, accept: Filter) -> Result<(), Error> {
        self.spawn_listener(addr, Arc::from(accept))
    }

    fn spawn_listener(&mut self, addr: &str, accept: IngressFilter) -> Result<(), Error> {
        assert!(
            !self.shut_down.load(Ordering::SeqCst),
            "listen on a server that is already shut down"
        );
        let socket = DatagramSocket::bind(addr)?;
        socket.set_read_timeout(SHUTDOWN_POLL)?;

        let sender = self.sender.clone().expect("queue closed before shutdown");
        let shut_down = Arc::clone(&self.shut_down);
        let handle = thread::Builder::new()
            .name(format!("syslog-recv {addr}"))
            .spawn(move || receive_loop(socket, sender, accept, shut_down))
            .map_err(Error::Io)?;
        self.receivers.push(handle);
        Ok(())
    }

    /// Passes a hang-up to every handler, typically to trigger log rotation.
    /// Handlers keep running.
    pub fn sig_hup(&self) {
        for handler in self.handlers.lock().unwrap().iter_mut() {
            handler.sig_hup();
        }
    }

    /// Stops the server: closes every listener, lets the dispatch thread
    /// drain the queue, then terminates each handler exactly once and waits
    /// for it to flush. Idempotent.
    pub fn shutdown(&mut self) {
        self.shut_down.store(true, Ordering::SeqCst);
        for handle in self.receivers.drain(..) {
            let _ = handle.join();
        }
        // All senders are gone now, so the dispatcher drains and exits.
        self.sender = None;
        if let Some(dispatcher) = self.dispatcher.take() {
            let _ = dispatcher.join();
        }
        let mut handlers = self.handlers.lock().unwrap();
        for handler in handlers.iter_mut() {
            handler.terminate();
        }
        handlers.clear();
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if !self.shut_down.load(Ordering::SeqCst) {
            self.shutdown();
        }
    }
}

fn dispatch_loop(receiver: flume::Receiver<Message>, handlers: Arc<Mutex<Vec<Box<dyn Handler>>>>) {
    while let Ok(msg) = receiver.recv() {
        let mut current = Some(msg);
        let mut handlers = handlers.lock().unwrap();
        for handler in handlers.iter_mut() {
            match current.take() {
                Some(m) => current = handler.handle(m),
                None => break,
            }
        }
    }
}

fn receive_loop(
    socket: DatagramSocket,
    sender: flume::Sender<Message>,
    accept: IngressFilter,
    shut_down: Arc<AtomicBool>,
) {
    let accept = accept.as_ref();
    let mut buf = vec![0; RECV_BUF_SIZE];
    loop {
        let (n, source) = match socket.recv_from(&mut buf) {
            Ok(v) => v,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                if shut_down.load(Ordering::SeqCst) {
                    break;
                }
                continue;
            }
            Err(e) => {
                if !shut_down.load(Ordering::SeqCst) {
                    error!("socket read error: {e}");
                }
                break;
            }
        };

        let mut msg = match parse_message(&buf[..n]) {
            Ok(m) => m,
            Err(e) => {
                warn!("{e}");
                continue;
            }
        };
        if accept(&msg) {
            msg.source = Some(source);
            debug!("{msg}");
            // Blocking send: back-pressure is absorbed by the OS socket
            // buffer, which drops packets when it overflows.
            if sender.send(msg).is_err() {
                break;
            }
        }
    }
}

enum DatagramSocket {
    Udp(UdpSocket),
    #[cfg(unix)]
    Unix(UnixDatagram, PathBuf),
}

impl DatagramSocket {
    fn bind(addr: &str) -> io::Result<DatagramSocket> {
        if addr.contains(':') {
            Ok(DatagramSocket::Udp(UdpSocket::bind(addr)?))
        } else {
            DatagramSocket::bind_unix(addr)
        }
    }

    #[cfg(unix)]
    fn bind_unix(addr: &str) -> io::Result<DatagramSocket> {
        let path = PathBuf::from(addr);
        Ok(DatagramSocket::Unix(UnixDatagram::bind(&path)?, path))
    }

    #[cfg(not(unix))]
    fn bind_unix(_addr: &str) -> io::Result<DatagramSocket> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "unix datagram sockets are not available on this platform",
        ))
    }

    fn set_read_timeout(&self, timeout: Duration) -> io::Result<()> {
        match self {
            DatagramSocket::Udp(s) => s.set_read_timeout(Some(timeout)),
            #[cfg(unix)]
            DatagramSocket::Unix(s, _) => s.set_read_timeout(Some(timeout)),
        }
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SourceAddr)> {
        match self {
            DatagramSocket::Udp(s) => {
                let (n, addr) = s.recv_from(buf)?;
                Ok((n, SourceAddr::Udp(addr)))
            }
            #[cfg(unix)]
            DatagramSocket::Unix(s, _) => {
                let (n, addr) = s.recv_from(buf)?;
                let path = addr
                    .as_pathname()
                    .map(Path::to_path_buf)
                    .unwrap_or_default();
                Ok((n, SourceAddr::Unix(path)))
            }
        }
    }
}

impl Drop for DatagramSocket {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let DatagramSocket::Unix(_, path) = self {
            let _ = std::fs::remove_file(path);
        }
    }
}
