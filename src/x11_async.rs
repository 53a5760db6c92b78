//! X11 Async Event Stream
//!
//! Wakes the async event loop when the X11 socket becomes readable. A mio
//! poller runs on a blocking thread and signals a `Notify`; the loop then
//! drains every buffered event without blocking.

use anyhow::{Context, Result};
use std::os::unix::io::AsRawFd;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, oneshot};
use tracing::{info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

const X11_TOKEN: mio::Token = mio::Token(0);

/// Poll interval of the watcher thread, bounding how long it takes to
/// notice the stream was dropped
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

pub struct X11EventStream {
    conn: Arc<RustConnection>,
    notify: Arc<Notify>,
    _task_guard: oneshot::Receiver<()>,
}

impl X11EventStream {
    pub fn new(conn: Arc<RustConnection>) -> Result<Self> {
        let fd = conn.stream().as_raw_fd();
        let notify = Arc::new(Notify::new());
        let task_notify = notify.clone();

        // The watcher exits once the receiver half is dropped with the stream
        let (guard, task_guard) = oneshot::channel::<()>();
        let mut poll = mio::Poll::new().context("Failed to create mio Poll")?;
        let mut events = mio::Events::with_capacity(1);
        poll.registry()
            .register(&mut mio::unix::SourceFd(&fd), X11_TOKEN, mio::Interest::READABLE)
            .context("Failed to register X11 FD with mio")?;

        tokio::task::spawn_blocking(move || {
            loop {
                if guard.is_closed() {
                    info!("X11 socket watcher shutting down");
                    return;
                }
                if let Err(err) = poll.poll(&mut events, Some(POLL_TIMEOUT)) {
                    warn!("X11 socket poll failed: {:?}", err);
                    continue;
                }
                if events.iter().any(|event| event.token() == X11_TOKEN) {
                    task_notify.notify_one();
                }
            }
        });

        Ok(Self {
            conn,
            notify,
            _task_guard: task_guard,
        })
    }

    /// Next already-received event, `None` once the buffer is empty
    pub fn poll_next_event(&self) -> Result<Option<Event>> {
        Ok(self.conn.poll_for_event()?)
    }

    /// Resolve when the socket has data to read
    pub async fn wait_readable(&self) {
        self.notify.notified().await;
    }

    pub fn flush(&self) -> Result<()> {
        self.conn.flush()?;
        Ok(())
    }
}
