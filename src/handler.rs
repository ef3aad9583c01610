use crate::{Filter, Message};

/// A stage in the server's message pipeline.
///
/// Handlers run left to right in registration order. `handle` returns the
/// (possibly modified) message to pass it on, or `None` to consume it and
/// stop propagation.
pub trait Handler: Send {
    fn handle(&mut self, msg: Message) -> Option<Message>;

    /// Called exactly once after the last message has been delivered. The
    /// handler must flush and release its resources before returning.
    fn terminate(&mut self);

    /// Reload hook, fanned out by [`Server::sig_hup`](crate::Server::sig_hup)
    /// (log rotation and the like). Most handlers don't care.
    fn sig_hup(&mut self) {}
}

/// Building block for handlers that do their work on their own thread.
///
/// `BaseHandler` sits in the server's pipeline and feeds an internal bounded
/// queue that a worker thread drains through [`MessageQueue::get`]. The
/// enqueue is non-blocking: when the worker falls behind, messages are
/// silently dropped rather than stalling the server's dispatch. Rejected
/// messages (per the accept filter) always continue to later handlers.
///
/// ```no_run
/// use std::thread;
/// use syslogd::{BaseHandler, Server};
///
/// let handler = BaseHandler::new(64, None, false);
/// let queue = handler.queue();
/// thread::spawn(move || {
///     while let Some(m) = queue.get() {
///         println!("{m}");
///     }
///     queue.end();
/// });
///
/// let mut server = Server::new(100);
/// server.add_handler(handler);
/// ```
pub struct BaseHandler {
    sender: Option<flume::Sender<Message>>,
    receiver: flume::Receiver<Message>,
    ack_tx: Option<flume::Sender<()>>,
    ack_rx: flume::Receiver<()>,
    accept: Option<Filter>,
    forward: bool,
}

/// The worker-side end of a [`BaseHandler`].
pub struct MessageQueue {
    receiver: flume::Receiver<Message>,
    ack: flume::Sender<()>,
}

impl BaseHandler {
    /// Creates a handler with an internal queue of `qlen` messages.
    ///
    /// Messages rejected by `accept` (when given) bypass the queue and go on
    /// to the next handler unchanged. When `forward` is true, accepted
    /// messages are queued *and* passed along; otherwise they are consumed.
    pub fn new(qlen: usize, accept: Option<Filter>, forward: bool) -> BaseHandler {
        let (sender, receiver) = flume::bounded(qlen);
        let (ack_tx, ack_rx) = flume::bounded(1);
        BaseHandler {
            sender: Some(sender),
            receiver,
            ack_tx: Some(ack_tx),
            ack_rx,
            accept,
            forward,
        }
    }

    /// The consuming end, to hand to a worker thread. Take it before the
    /// handler is added to a server.
    ///
    /// # Panics
    ///
    /// Panics when called after the handler has terminated.
    pub fn queue(&self) -> MessageQueue {
        let ack = self
            .ack_tx
            .clone()
            .expect("BaseHandler::queue called after terminate");
        MessageQueue {
            receiver: self.receiver.clone(),
            ack,
        }
    }
}

impl Handler for BaseHandler {
    fn handle(&mut self, msg: Message) -> Option<Message> {
        if let Some(accept) = &self.accept {
            if !accept(&msg) {
                return Some(msg);
            }
        }
        let Some(sender) = &self.sender else {
            return Some(msg);
        };
        if self.forward {
            let _ = sender.try_send(msg.clone());
            Some(msg)
        } else {
            let _ = sender.try_send(msg);
            None
        }
    }

    fn terminate(&mut self) {
        // Closing the queue lets the worker drain the backlog; its get()
        // then returns None and end() acks. Dropping our ack sender keeps
        // the wait from hanging if the worker is already gone.
        self.sender = None;
        self.ack_tx = None;
        let _ = self.ack_rx.recv();
    }
}

impl MessageQueue {
    /// Blocking dequeue. Returns `None` once the handler has terminated and
    /// the backlog is drained; the worker should then flush and call
    /// [`end`](MessageQueue::end).
    pub fn get(&self) -> Option<Message> {
        self.receiver.recv().ok()
    }

    /// Signals that the worker has shut down, unblocking the handler's
    /// terminate call.
    pub fn end(self) {
        let _ = self.ack.send(());
    }
}
