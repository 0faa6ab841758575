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

//! Lock-free metrics for the chat server

use metrics::{counter, gauge, histogram};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free server metrics
///
/// All metrics are stored as atomics and can be updated from every session
/// task without locks. Each update is mirrored to the `metrics` facade so an
/// installed recorder sees the same numbers.
#[derive(Debug)]
pub struct ServerMetrics {
    // Session counts
    total_sessions: AtomicU64,
    active_sessions: AtomicU64,

    // Traffic
    messages_broadcast: AtomicU64,
    deliveries_failed: AtomicU64,
    commands_processed: AtomicU64,

    // Errors
    protocol_errors: AtomicU64,
    accept_errors: AtomicU64,
    rejected_connections: AtomicU64,

    // Timing (stored as nanoseconds)
    total_session_duration_ns: AtomicU64,

    started_at: Instant,
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            total_sessions: AtomicU64::new(0),
            active_sessions: AtomicU64::new(0),
            messages_broadcast: AtomicU64::new(0),
            deliveries_failed: AtomicU64::new(0),
            commands_processed: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            accept_errors: AtomicU64::new(0),
            rejected_connections: AtomicU64::new(0),
            total_session_duration_ns: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    // Session tracking

    /// Record a session completing its handshake
    pub fn session_opened(&self) {
        self.total_sessions.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
        counter!("confab.sessions.total").increment(1);
        gauge!("confab.sessions.active").increment(1.0);
    }

    /// Record a session finishing teardown
    pub fn session_closed(&self, duration: Duration) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
        self.total_session_duration_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        gauge!("confab.sessions.active").decrement(1.0);
        histogram!("confab.session.duration").record(duration.as_secs_f64());
    }

    /// Get the current number of registered sessions
    pub fn active_sessions(&self) -> u64 {
        self.active_sessions.load(Ordering::Relaxed)
    }

    /// Get the total number of sessions since server start
    pub fn total_sessions(&self) -> u64 {
        self.total_sessions.load(Ordering::Relaxed)
    }

    // Traffic tracking

    /// Record one broadcast call
    pub fn message_broadcast(&self) {
        self.messages_broadcast.fetch_add(1, Ordering::Relaxed);
        counter!("confab.messages.broadcast").increment(1);
    }

    /// Record a delivery that could not be enqueued for a recipient
    pub fn delivery_failed(&self) {
        self.deliveries_failed.fetch_add(1, Ordering::Relaxed);
        counter!("confab.deliveries.failed").increment(1);
    }

    /// Record a processed slash command
    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
        counter!("confab.commands.processed").increment(1);
    }

    // Error tracking

    /// Record malformed client input
    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
        counter!("confab.errors.protocol").increment(1);
    }

    /// Record a failed accept call
    pub fn accept_error(&self) {
        self.accept_errors.fetch_add(1, Ordering::Relaxed);
        counter!("confab.errors.accept").increment(1);
    }

    /// Record a connection turned away at the connection limit
    pub fn connection_rejected(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);
        counter!("confab.connections.rejected").increment(1);
    }

    // Snapshot

    /// Get a point-in-time view of all metrics
    ///
    /// Counters are read individually, so a snapshot taken while sessions are
    /// busy may be off by the updates that raced with it.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_sessions: self.total_sessions.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            messages_broadcast: self.messages_broadcast.load(Ordering::Relaxed),
            deliveries_failed: self.deliveries_failed.load(Ordering::Relaxed),
            commands_processed: self.commands_processed.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            accept_errors: self.accept_errors.load(Ordering::Relaxed),
            rejected_connections: self.rejected_connections.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
            avg_session_duration: self.average_session_duration(),
        }
    }

    fn average_session_duration(&self) -> Duration {
        let closed = self
            .total_sessions
            .load(Ordering::Relaxed)
            .saturating_sub(self.active_sessions.load(Ordering::Relaxed));
        if closed == 0 {
            return Duration::ZERO;
        }
        let total_ns = self.total_session_duration_ns.load(Ordering::Relaxed);
        Duration::from_nanos(total_ns / closed)
    }
}

/// A snapshot of server metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Total sessions since server start
    pub total_sessions: u64,
    /// Currently registered sessions
    pub active_sessions: u64,
    /// Broadcast calls made
    pub messages_broadcast: u64,
    /// Per-recipient deliveries that failed
    pub deliveries_failed: u64,
    /// Slash commands processed
    pub commands_processed: u64,
    /// Malformed input lines
    pub protocol_errors: u64,
    /// Failed accept calls
    pub accept_errors: u64,
    /// Connections refused at the connection limit
    pub rejected_connections: u64,
    /// Server uptime
    pub uptime: Duration,
    /// Average duration of closed sessions
    pub avg_session_duration: Duration,
}

impl MetricsSnapshot {
    /// Calculate total error count
    pub fn total_errors(&self) -> u64 {
        self.protocol_errors + self.accept_errors + self.deliveries_failed
    }

    /// Calculate broadcasts per second
    pub fn broadcasts_per_sec(&self) -> f64 {
        if self.uptime.is_zero() {
            return 0.0;
        }
        self.messages_broadcast as f64 / self.uptime.as_secs_f64()
    }
}
