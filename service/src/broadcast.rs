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

//! Fan-out of one line to every registered session

use crate::{Registry, ServerMetrics, SessionId};
use std::sync::Arc;
use tracing::{trace, warn};

/// Result of a broadcast operation
#[derive(Debug, Clone, Default)]
pub struct BroadcastResult {
    /// Number of recipients attempted (excluded sender not counted)
    pub total: usize,
    /// Number of lines queued successfully
    pub succeeded: usize,
    /// Number of recipients that could not take the line
    pub failed: usize,
    /// Failing recipients and the reason
    pub errors: Vec<(SessionId, String)>,
}

impl BroadcastResult {
    /// Check if all deliveries succeeded
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// Get the success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.succeeded as f64 / self.total as f64) * 100.0
        }
    }
}

/// Delivers lines to every registered session but one
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<Registry>,
    metrics: Arc<ServerMetrics>,
}

impl Broadcaster {
    /// Create a broadcaster over the given registry
    pub fn new(registry: Arc<Registry>, metrics: Arc<ServerMetrics>) -> Self {
        Self { registry, metrics }
    }

    /// Queue `message` for every registered session except `exclude`
    ///
    /// Membership is copied first and the copy is walked without holding
    /// any registry lock. Enqueueing never waits: a recipient whose queue is
    /// full or closed is flagged for its own teardown and skipped.
    pub fn send_to_all(&self, message: &str, exclude: Option<SessionId>) -> BroadcastResult {
        let mut result = BroadcastResult::default();
        self.metrics.message_broadcast();

        for session in self.registry.snapshot() {
            if Some(session.id()) == exclude {
                continue;
            }
            result.total += 1;

            match session.deliver(message) {
                Ok(()) => result.succeeded += 1,
                Err(e) => {
                    warn!(
                        session_id = %session.id(),
                        error = %e,
                        "Delivery failed, flagging recipient"
                    );
                    self.metrics.delivery_failed();
                    session.flag_for_teardown();
                    result.failed += 1;
                    result.errors.push((session.id(), e.to_string()));
                }
            }
        }

        trace!(
            total = result.total,
            failed = result.failed,
            "Broadcast complete"
        );
        result
    }
}
