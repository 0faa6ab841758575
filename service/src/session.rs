//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Server-side record of one connected client

use crate::{ChatError, Result, SessionId, SessionState, protocol};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Items queued for a session's writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Write one line to the client
    Line(String),
    /// Flush everything queued before this and close the write half
    Close,
}

/// A connected client
///
/// Sessions are shared as `Arc<Session>` between the registry, the
/// broadcaster and the session's own handler. Only the handler drives state
/// transitions; everyone else may deliver lines or flag the session for
/// teardown.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    peer_addr: SocketAddr,
    connected_at: Instant,
    display_name: RwLock<String>,
    outbound: mpsc::Sender<Outbound>,
    state: AtomicU8,
    shutdown: CancellationToken,
    lines_queued: AtomicU64,
}

impl Session {
    /// Create a session in the `Connecting` state
    ///
    /// The display name starts out as `User<id>`. Cancelling `shutdown`
    /// (or its parent) drives the session's handler into teardown.
    pub fn new(
        id: SessionId,
        peer_addr: SocketAddr,
        outbound: mpsc::Sender<Outbound>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id,
            peer_addr,
            connected_at: Instant::now(),
            display_name: RwLock::new(protocol::default_name(id)),
            outbound,
            state: AtomicU8::new(SessionState::Connecting.as_u8()),
            shutdown,
            lines_queued: AtomicU64::new(0),
        }
    }

    /// Create a session together with the receiving end of its outbound queue
    pub fn channel(
        id: SessionId,
        peer_addr: SocketAddr,
        capacity: usize,
        shutdown: CancellationToken,
    ) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(id, peer_addr, tx, shutdown), rx)
    }

    /// Get the session ID
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Get the peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Get when the connection was accepted
    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Number of lines queued for this client so far
    pub fn lines_queued(&self) -> u64 {
        self.lines_queued.load(Ordering::Relaxed)
    }

    /// Current display name
    pub fn display_name(&self) -> String {
        self.display_name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the display name, returning the previous one
    ///
    /// Callers must pass a non-empty, trimmed name.
    pub fn rename(&self, new_name: impl Into<String>) -> String {
        let mut name = self
            .display_name
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *name, new_name.into())
    }

    /// Get the current state
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move from `from` to `to` if the session is still in `from`
    ///
    /// Returns `true` for exactly one caller per transition.
    pub(crate) fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Force the state, used for terminal transitions only
    pub(crate) fn set_state(&self, state: SessionState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Queue one line for the client without waiting
    ///
    /// Fails with [`ChatError::OutboundFull`] when the client is not draining
    /// its queue, and with [`ChatError::ConnectionClosed`] once the writer
    /// has gone away or the session is closed.
    pub fn deliver(&self, line: impl Into<String>) -> Result<()> {
        if self.state() == SessionState::Closed {
            return Err(ChatError::ConnectionClosed);
        }
        match self.outbound.try_send(Outbound::Line(line.into())) {
            Ok(()) => {
                self.lines_queued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(ChatError::OutboundFull(self.id)),
            Err(TrySendError::Closed(_)) => Err(ChatError::ConnectionClosed),
        }
    }

    /// Queue one line for the client, waiting up to `wait` for room
    ///
    /// Used for replies produced by the session's own handler, which may
    /// exceed the queue capacity in one go (a long `/users` roster). Fails
    /// with [`ChatError::WriteTimeout`] if the client stops draining.
    pub async fn reply(&self, line: impl Into<String>, wait: Duration) -> Result<()> {
        if self.state() == SessionState::Closed {
            return Err(ChatError::ConnectionClosed);
        }
        match timeout(wait, self.outbound.send(Outbound::Line(line.into()))).await {
            Ok(Ok(())) => {
                self.lines_queued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Ok(Err(_)) => Err(ChatError::ConnectionClosed),
            Err(_) => Err(ChatError::WriteTimeout),
        }
    }

    /// Ask the writer to flush everything queued and close the connection
    ///
    /// Waits for room behind lines already queued. Returns `false` once the
    /// writer has gone away.
    pub(crate) async fn close_outbound(&self) -> bool {
        self.outbound.send(Outbound::Close).await.is_ok()
    }

    /// Mark the session for teardown by its own handler
    pub fn flag_for_teardown(&self) {
        if !self.shutdown.is_cancelled() {
            trace!(session_id = %self.id, "Session flagged for teardown");
        }
        self.shutdown.cancel();
    }

    /// Check if the session has been flagged for teardown
    pub fn is_flagged(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolve once the session is flagged for teardown
    pub async fn flagged(&self) {
        self.shutdown.cancelled().await
    }
}
