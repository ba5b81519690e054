/*!
 # Connection lifecycle

 [`ConnectionManager`] owns the BLE session for one device. Commands are
 serialized through a single lock, the link is established on demand and
 reused, failed writes are retried over a fresh link, and the link is
 dropped after a period without commands.
*/

use std::sync::{Arc, Weak};

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::DeviceConfig;
use crate::protocol::Frame;
use crate::transport::{DeviceResolver, Link};
use crate::{Error, Result};

/// Lifecycle state of a device session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

struct Session<L> {
    link: Option<L>,
    idle_timer: Option<JoinHandle<()>>,
    /// Bumped whenever the idle timer is cancelled or rearmed
    generation: u64,
}

impl<L> Session<L> {
    fn cancel_idle_timer(&mut self) {
        if let Some(timer) = self.idle_timer.take() {
            timer.abort();
        }
        self.generation = self.generation.wrapping_add(1);
    }
}

struct Inner<R: DeviceResolver> {
    address: String,
    resolver: R,
    config: DeviceConfig,
    session: Mutex<Session<R::Link>>,
    state: watch::Sender<SessionState>,
}

/// Manages the BLE session of a single device
///
/// Cloning is cheap and clones share the session, so commands from several
/// tasks queue on the same link. Dropping the last clone closes an open link
/// in the background when a tokio runtime is available; call
/// [`ConnectionManager::disconnect`] to wait for the close.
pub struct ConnectionManager<R: DeviceResolver> {
    inner: Arc<Inner<R>>,
}

impl<R: DeviceResolver> Clone for ConnectionManager<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: DeviceResolver> ConnectionManager<R> {
    /// Creates a manager; nothing is connected until the first command
    pub fn new(address: impl Into<String>, resolver: R, config: DeviceConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                address: address.into(),
                resolver,
                config,
                session: Mutex::new(Session {
                    link: None,
                    idle_timer: None,
                    generation: 0,
                }),
                state,
            }),
        }
    }

    pub fn address(&self) -> &str {
        &self.inner.address
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Watches session state transitions
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Writes one frame, connecting first if needed
    ///
    /// Transport failures are retried over a fresh link up to the configured
    /// number of attempts; the last failure is returned. `DeviceNotFound` is
    /// returned immediately.
    pub async fn send_command(&self, frame: &Frame) -> Result<()> {
        self.send_frames(std::slice::from_ref(frame)).await
    }

    /// Writes a frame sequence in order under one lock hold
    ///
    /// A failed write aborts the rest of the sequence. Each retry starts over
    /// from the first frame.
    #[instrument(skip(self, frames), fields(address = %self.inner.address, frames = frames.len()))]
    pub async fn send_frames(&self, frames: &[Frame]) -> Result<()> {
        let inner = &self.inner;
        let mut session = inner.session.lock().await;
        session.cancel_idle_timer();

        let attempts = inner.config.attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            trace!("Sending BLE command (attempt {}/{})", attempt, attempts);

            match inner.write_all(&mut session, frames).await {
                Ok(()) => {
                    trace!("Command sent successfully");
                    inner.arm_idle_timer(&mut session);
                    return Ok(());
                }
                Err(e) if e.is_transport() => {
                    inner.invalidate(&mut session).await;
                    if attempt >= attempts {
                        error!(
                            "Failed to send command to {} after {} attempts: {}",
                            inner.address, attempts, e
                        );
                        return Err(e);
                    }
                    warn!(
                        "Command failed (attempt {}/{}): {}, retrying",
                        attempt, attempts, e
                    );
                }
                Err(e) => {
                    error!("Command to {} failed: {}", inner.address, e);
                    if session.link.is_some() {
                        inner.arm_idle_timer(&mut session);
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Connects if the current link is missing or dead
    #[instrument(skip(self), fields(address = %self.inner.address))]
    pub async fn ensure_connected(&self) -> Result<()> {
        let inner = &self.inner;
        let mut session = inner.session.lock().await;
        session.cancel_idle_timer();
        inner.ensure_connected(&mut session).await?;
        inner.arm_idle_timer(&mut session);
        Ok(())
    }

    /// Cancels the idle timer and closes the link
    ///
    /// Errors while closing are logged and dropped.
    #[instrument(skip(self), fields(address = %self.inner.address))]
    pub async fn disconnect(&self) {
        let mut session = self.inner.session.lock().await;
        session.cancel_idle_timer();
        self.inner.close(&mut session).await;
    }
}

impl<R: DeviceResolver> Drop for Inner<R> {
    fn drop(&mut self) {
        let session = self.session.get_mut();
        if let Some(timer) = session.idle_timer.take() {
            timer.abort();
        }
        let Some(link) = session.link.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let address = self.address.clone();
                runtime.spawn(async move {
                    if let Err(e) = link.disconnect().await {
                        debug!("Error disconnecting from {} on drop: {}", address, e);
                    }
                });
            }
            Err(_) => warn!("Dropping link to {} without a runtime to close it", self.address),
        }
    }
}

impl<R: DeviceResolver> Inner<R> {
    async fn write_all(&self, session: &mut Session<R::Link>, frames: &[Frame]) -> Result<()> {
        let link = self.ensure_connected(session).await?;
        for frame in frames {
            trace!("Writing {:?}", frame);
            link.write(frame).await?;
        }
        Ok(())
    }

    async fn ensure_connected<'s>(&self, session: &'s mut Session<R::Link>) -> Result<&'s R::Link> {
        let live = match &session.link {
            Some(link) => link.is_connected().await,
            None => false,
        };

        if !live {
            if session.link.take().is_some() {
                debug!("Dropping stale link to {}", self.address);
            }
            self.state.send_replace(SessionState::Connecting);
            match self.connect().await {
                Ok(link) => {
                    session.link = Some(link);
                    self.state.send_replace(SessionState::Connected);
                    info!("Connected to {} ({})", self.address, self.config.model);
                }
                Err(e) => {
                    self.state.send_replace(SessionState::Disconnected);
                    return Err(e);
                }
            }
        }

        session
            .link
            .as_ref()
            .ok_or_else(|| Error::Transport(format!("no link to {}", self.address)))
    }

    async fn connect(&self) -> Result<R::Link> {
        debug!("Resolving {}", self.address);
        let link = self
            .resolver
            .resolve(&self.address)
            .await?
            .ok_or_else(|| Error::DeviceNotFound(self.address.clone()))?;

        debug!("Connecting to {}", self.address);
        if let Err(e) = link.connect().await {
            // The radio may be up even though discovery failed
            if let Err(close_err) = link.disconnect().await {
                debug!("Error closing half-open link to {}: {}", self.address, close_err);
            }
            return Err(e);
        }
        Ok(link)
    }

    /// Drops the cached link after a failed attempt
    async fn invalidate(&self, session: &mut Session<R::Link>) {
        if let Some(link) = session.link.take() {
            if let Err(e) = link.disconnect().await {
                debug!("Error dropping failed link to {}: {}", self.address, e);
            }
        }
        self.state.send_replace(SessionState::Disconnected);
    }

    async fn close(&self, session: &mut Session<R::Link>) {
        if let Some(link) = session.link.take() {
            if link.is_connected().await {
                debug!("Disconnecting from {}", self.address);
                if let Err(e) = link.disconnect().await {
                    debug!("Error disconnecting from {}: {}", self.address, e);
                }
            }
        }
        self.state.send_replace(SessionState::Disconnected);
    }

    fn arm_idle_timer(self: &Arc<Self>, session: &mut Session<R::Link>) {
        session.cancel_idle_timer();
        let generation = session.generation;
        let idle_timeout = self.config.idle_timeout;
        let inner: Weak<Self> = Arc::downgrade(self);

        trace!("Idle disconnect armed for {:?}", idle_timeout);
        session.idle_timer = Some(tokio::spawn(async move {
            time::sleep(idle_timeout).await;
            if let Some(inner) = inner.upgrade() {
                inner.expire(generation).await;
            }
        }));
    }

    async fn expire(&self, generation: u64) {
        let mut session = self.session.lock().await;
        if session.generation != generation {
            trace!("Idle timer superseded");
            return;
        }
        // Detach rather than abort: this is the timer's own task
        session.idle_timer.take();
        info!(
            "No commands for {:?}, disconnecting from {}",
            self.config.idle_timeout, self.address
        );
        self.close(&mut session).await;
    }
}
