//! Ingestion pipeline: decode workers reading conntrack notifications, a
//! bounded queue, and the consumer that applies events to the tracker.

mod pipeline;
#[cfg(target_os = "linux")]
mod socket;

pub use pipeline::*;
#[cfg(target_os = "linux")]
pub use socket::*;

use std::future::Future;
use std::io;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::export::TrackerMetrics;
use crate::netfilter::{DecodeError, NetlinkMessage};
use crate::state::ConnectionTracker;

/// A stream of received netlink message batches.
pub trait MessageSource: Send + Sync + 'static {
    /// Wait for the next batch. `Ok(None)` means the source is closed.
    fn receive(&self) -> impl Future<Output = io::Result<Option<Vec<NetlinkMessage>>>> + Send;
}

/// Why one worker stopped.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("recvmsg: {0}")]
    Receive(#[from] io::Error),

    #[error("expected exactly one message per notification, got {0}")]
    Batch(usize),

    #[error("decoding conntrack event: {0}")]
    Decode(#[from] DecodeError),
}

impl WorkerError {
    /// The kernel overran the socket receive buffer and dropped events.
    pub fn is_buffer_overrun(&self) -> bool {
        let WorkerError::Receive(e) = self else {
            return false;
        };
        if e.raw_os_error() == Some(libc::ENOBUFS) {
            return true;
        }
        e.to_string().contains("no buffer space available")
    }
}

/// Aggregated outcome of a listener run.
#[derive(Error, Debug)]
pub enum ListenError {
    #[error("receive buffer is full, some events lost")]
    BufferFull,

    #[error("listener cancelled")]
    Cancelled,

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error("unable to listen to events: {}", .0.join(", "))]
    Multiple(Vec<String>),

    #[error("conntrack is not supported on non-Linux platforms")]
    Unsupported,

    #[error("{context}: {source}")]
    Setup {
        context: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Open the conntrack netlink socket and run the pipeline until every worker
/// stops or `cancel` fires.
#[cfg(target_os = "linux")]
pub async fn listen(
    tracker: Arc<ConnectionTracker>,
    metrics: TrackerMetrics,
    config: &Config,
    cancel: CancellationToken,
) -> Result<(), ListenError> {
    let socket = NetfilterSocket::open().map_err(setup("opening netlink socket"))?;

    let size = config.read_buffer_size;
    if let Err(e) = socket.set_read_buffer(size, true) {
        tracing::debug!(error = %e, size, "forced read buffer rejected, retrying unforced");
        if let Err(e) = socket.set_read_buffer(size, false) {
            tracing::warn!(error = %e, size, "unable to set read buffer size");
        }
    }

    socket
        .join_groups(&[NetlinkGroup::Destroy, NetlinkGroup::Update])
        .map_err(setup("joining conntrack groups"))?;

    tracing::info!(
        workers = config.workers,
        interval = ?config.interval,
        "listening for conntrack events"
    );

    Pipeline::new(tracker, metrics, config, cancel)
        .run(Arc::new(socket))
        .await
}

#[cfg(target_os = "linux")]
fn setup(context: &'static str) -> impl FnOnce(io::Error) -> ListenError {
    move |source| ListenError::Setup { context, source }
}

#[cfg(not(target_os = "linux"))]
pub async fn listen(
    _tracker: Arc<ConnectionTracker>,
    _metrics: TrackerMetrics,
    _config: &Config,
    _cancel: CancellationToken,
) -> Result<(), ListenError> {
    Err(ListenError::Unsupported)
}
