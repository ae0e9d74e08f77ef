//! Push-channel connection manager.
//!
//! Owns the single live link to the server:
//!
//! - `connect()` is idempotent: while a link is up (or being opened) it does
//!   nothing.
//! - On link up: `connected = true`, any pending reconnect is cancelled, a
//!   `connection {connected: true}` message is published and server-side
//!   registrations (`subscribe-events`, joined rooms) are replayed.
//! - On link down or a failed attempt: `connected = false`, `connection
//!   {connected: false}` is published and exactly one reconnect is scheduled
//!   after the fixed delay. Overlapping failures never stack timers.
//! - Retries are unconditional and never back off.
//! - Sends while disconnected fail with [`TransportError::NotConnected`]; they
//!   are logged, never queued or retried.
//!
//! Messages are published to the bus from the session task, one frame at a
//! time, in arrival order.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use pantry_core::ProductId;
use pantry_events::DispatchBus;

use crate::transport::{Connector, PushChannel, TransportError};
use crate::wire::{self, ConnectionStatus, EventKind, Frame, Message, Outbound, WireError};

struct Session {
    epoch: u64,
    outbound: mpsc::UnboundedSender<Frame>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct LinkState {
    connected: bool,
    connecting: bool,
    closed: bool,
    epoch: u64,
    session: Option<Session>,
    reconnect: Option<JoinHandle<()>>,
    rooms: BTreeSet<String>,
}

struct Inner {
    connector: Arc<dyn Connector>,
    bus: DispatchBus<Message>,
    reconnect_delay: Duration,
    state: Mutex<LinkState>,
}

/// Handle to the shared connection. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl core::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("ConnectionManager")
            .field("connected", &state.connected)
            .field("reconnect_pending", &state.reconnect.is_some())
            .field("rooms", &state.rooms)
            .finish()
    }
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, bus: DispatchBus<Message>, reconnect_delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector,
                bus,
                reconnect_delay,
                state: Mutex::new(LinkState::default()),
            }),
        }
    }

    pub fn bus(&self) -> &DispatchBus<Message> {
        &self.inner.bus
    }

    /// Open the link unless one is already up or opening.
    ///
    /// A failed attempt schedules a reconnect before returning the error.
    pub async fn connect(&self) -> Result<(), TransportError> {
        Inner::connect(&self.inner).await
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }

    /// Whether a reconnect timer is armed.
    pub fn reconnect_pending(&self) -> bool {
        self.inner.lock().reconnect.is_some()
    }

    /// Send a request over the live link.
    pub fn emit(&self, request: Outbound) -> Result<(), TransportError> {
        let state = self.inner.lock();
        Inner::send_locked(&state, request)
    }

    /// Tell the server which streams have subscribers. Pages call this after
    /// registering handlers; the same request is replayed on every link up.
    pub fn sync_streams(&self) {
        let state = self.inner.lock();
        if state.connected {
            self.inner.send_streams(&state);
        }
    }

    /// Join the detail room of `id`; remembered and replayed on reconnect.
    pub fn join_product_room(&self, id: &ProductId) {
        let room = wire::product_room(id);
        let mut state = self.inner.lock();
        if state.rooms.insert(room.clone()) && state.connected {
            // Failure is logged; the room is replayed on the next link.
            let _ = Inner::send_locked(&state, Outbound::Join(room));
        }
    }

    pub fn leave_product_room(&self, id: &ProductId) {
        let room = wire::product_room(id);
        let mut state = self.inner.lock();
        if state.rooms.remove(&room) && state.connected {
            let _ = Inner::send_locked(&state, Outbound::Leave(room));
        }
    }

    pub fn rooms(&self) -> Vec<String> {
        self.inner.lock().rooms.iter().cloned().collect()
    }

    /// Close the link for good: cancels any reconnect and stops the session.
    pub fn disconnect(&self) {
        let was_connected = {
            let mut state = self.inner.lock();
            state.closed = true;
            if let Some(timer) = state.reconnect.take() {
                timer.abort();
            }
            if let Some(session) = state.session.take() {
                session.task.abort();
            }
            std::mem::replace(&mut state.connected, false)
        };
        tracing::info!("push channel closed");
        if was_connected {
            self.inner
                .bus
                .publish(&Message::Connection(ConnectionStatus { connected: false }));
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn connect(this: &Arc<Self>) -> Result<(), TransportError> {
        {
            let mut state = this.lock();
            if state.closed {
                return Err(TransportError::Closed);
            }
            if state.session.is_some() || state.connecting {
                return Ok(());
            }
            state.connecting = true;
        }

        match this.connector.connect().await {
            Ok(channel) => {
                Self::link_up(this, channel);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "push channel connect failed");
                this.lock().connecting = false;
                Self::link_down(this, None);
                Err(err)
            }
        }
    }

    fn link_up(this: &Arc<Self>, channel: Box<dyn PushChannel>) {
        {
            let mut state = this.lock();
            state.connecting = false;
            if state.closed {
                return;
            }
            state.epoch += 1;
            let epoch = state.epoch;
            let (tx, rx) = mpsc::unbounded_channel();
            let task = tokio::spawn(run_session(Arc::downgrade(this), this.bus.clone(), channel, rx, epoch));
            state.session = Some(Session {
                epoch,
                outbound: tx,
                task,
            });
            state.connected = true;
            if let Some(timer) = state.reconnect.take() {
                timer.abort();
            }
        }
        tracing::info!("push channel connected");

        this.bus
            .publish(&Message::Connection(ConnectionStatus { connected: true }));

        // Replay after publishing so handlers registered on `connection` are
        // counted too.
        let state = this.lock();
        this.send_streams(&state);
        for room in &state.rooms {
            let _ = Self::send_locked(&state, Outbound::Join(room.clone()));
        }
    }

    /// Mark the link down. `epoch` names the session that ended; a stale
    /// session's report is ignored.
    fn link_down(this: &Arc<Self>, epoch: Option<u64>) {
        {
            let mut state = this.lock();
            if let Some(epoch) = epoch {
                match &state.session {
                    Some(session) if session.epoch == epoch => {}
                    _ => return,
                }
            }
            state.session = None;
            state.connected = false;
            if state.closed {
                return;
            }
            Self::schedule_reconnect(this, &mut state);
        }
        this.bus
            .publish(&Message::Connection(ConnectionStatus { connected: false }));
    }

    fn schedule_reconnect(this: &Arc<Self>, state: &mut LinkState) {
        if state.reconnect.is_some() {
            tracing::debug!("reconnect already pending");
            return;
        }
        let delay = this.reconnect_delay;
        let weak = Arc::downgrade(this);
        tracing::info!(delay_ms = delay.as_millis() as u64, "scheduling reconnect");

        state.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            // Release the slot first so a failed attempt can arm the next timer.
            inner.lock().reconnect = None;
            tracing::info!("attempting to reconnect");
            if let Err(err) = Inner::connect(&inner).await {
                tracing::debug!(error = %err, "reconnect attempt failed");
            }
        }));
    }

    fn send_streams(&self, state: &LinkState) {
        let products = self.bus.has_subscribers(EventKind::ProductUpdate);
        let events = self.bus.has_subscribers(EventKind::NewEvent);
        if products || events {
            let _ = Self::send_locked(state, Outbound::SubscribeEvents { products, events });
        }
    }

    fn send_locked(state: &LinkState, request: Outbound) -> Result<(), TransportError> {
        let name = request.name();
        let session = match &state.session {
            Some(session) if state.connected => session,
            _ => {
                tracing::warn!(event = name, "dropping outbound message: not connected");
                return Err(TransportError::NotConnected);
            }
        };
        session.outbound.send(request.into_frame()).map_err(|_| {
            tracing::warn!(event = name, "dropping outbound message: session closed");
            TransportError::Closed
        })
    }
}

async fn run_session(
    manager: Weak<Inner>,
    bus: DispatchBus<Message>,
    mut channel: Box<dyn PushChannel>,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    epoch: u64,
) {
    loop {
        tokio::select! {
            request = outbound.recv() => match request {
                Some(frame) => {
                    let event = frame.event.clone();
                    if let Err(err) = channel.send(frame).await {
                        tracing::warn!(event = %event, error = %err, "push send failed");
                        break;
                    }
                }
                // Manager dropped.
                None => return,
            },
            incoming = channel.recv() => match incoming {
                Some(Ok(frame)) => dispatch(&bus, frame),
                Some(Err(err)) => {
                    tracing::warn!(error = %err, "push channel error");
                    break;
                }
                None => {
                    tracing::info!("push channel disconnected");
                    break;
                }
            },
        }
    }

    if let Some(inner) = manager.upgrade() {
        Inner::link_down(&inner, Some(epoch));
    }
}

fn dispatch(bus: &DispatchBus<Message>, frame: Frame) {
    match wire::decode(frame) {
        Ok(messages) => {
            for message in &messages {
                bus.publish(message);
            }
        }
        Err(WireError::UnknownEvent(name)) => {
            tracing::debug!(event = %name, "ignoring unknown push event");
        }
        Err(err) => {
            tracing::warn!(error = %err, "dropping malformed push frame");
        }
    }
}
