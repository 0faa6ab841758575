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

//! Slash command parsing and execution

use crate::protocol::{self, COMMAND_MARKER, ChatMessage};
use crate::{Broadcaster, Registry, Result, ServerMetrics, Session};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// A parsed command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// `/name <new>`, argument already trimmed and possibly empty
    Name(&'a str),
    /// `/users`
    Users,
    /// `/quit`
    Quit,
    /// Anything else starting with the command marker
    Unknown(&'a str),
}

impl<'a> Command<'a> {
    /// Parse a line, returning `None` if it is not a command
    ///
    /// The command word is everything up to the first space and is matched
    /// case-insensitively.
    pub fn parse(line: &'a str) -> Option<Self> {
        if !line.starts_with(COMMAND_MARKER) {
            return None;
        }
        let (word, argument) = line.split_once(' ').unwrap_or((line, ""));

        let command = if word.eq_ignore_ascii_case("/name") {
            Command::Name(argument.trim())
        } else if word.eq_ignore_ascii_case("/users") {
            Command::Users
        } else if word.eq_ignore_ascii_case("/quit") {
            Command::Quit
        } else {
            Command::Unknown(word)
        };
        Some(command)
    }
}

/// What the connection handler should do after a command ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Keep reading lines
    Continue,
    /// Tear the session down
    Disconnect,
}

/// Executes commands on behalf of one session
#[derive(Debug, Clone)]
pub struct CommandProcessor {
    registry: Arc<Registry>,
    broadcaster: Broadcaster,
    metrics: Arc<ServerMetrics>,
    reply_timeout: Duration,
}

impl CommandProcessor {
    /// Create a processor sharing the server's registry
    ///
    /// Replies wait up to `reply_timeout` for room in the caller's queue.
    pub fn new(
        registry: Arc<Registry>,
        broadcaster: Broadcaster,
        metrics: Arc<ServerMetrics>,
        reply_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            metrics,
            reply_timeout,
        }
    }

    /// Run `command` for `session`
    ///
    /// Replies go to `session` only. Broadcast side effects always exclude
    /// it. An error means the caller stopped draining its replies.
    pub async fn execute(&self, session: &Session, command: Command<'_>) -> Result<CommandOutcome> {
        self.metrics.command_processed();
        debug!(session_id = %session.id(), ?command, "Processing command");

        match command {
            Command::Name(new_name) => self.rename(session, new_name).await?,
            Command::Users => self.list_users(session).await?,
            Command::Quit => {
                self.reply(session, protocol::GOODBYE).await?;
                return Ok(CommandOutcome::Disconnect);
            }
            Command::Unknown(_) => {
                self.metrics.protocol_error();
                self.reply(session, protocol::UNKNOWN_COMMAND).await?;
            }
        }
        Ok(CommandOutcome::Continue)
    }

    async fn reply(&self, session: &Session, line: impl Into<String>) -> Result<()> {
        session.reply(line, self.reply_timeout).await
    }

    async fn rename(&self, session: &Session, new_name: &str) -> Result<()> {
        if new_name.is_empty() {
            return self.reply(session, protocol::NAME_USAGE).await;
        }

        let old_name = session.rename(new_name);
        info!(session_id = %session.id(), %old_name, %new_name, "Session renamed");

        let notice = ChatMessage::renamed(&old_name, new_name).to_string();
        self.broadcaster.send_to_all(&notice, Some(session.id()));
        self.reply(session, protocol::name_changed(new_name)).await
    }

    /// One snapshot feeds both the count and the entries
    async fn list_users(&self, session: &Session) -> Result<()> {
        let roster = self.registry.snapshot();
        self.reply(session, protocol::roster_header(roster.len()))
            .await?;
        for member in &roster {
            let entry = protocol::roster_entry(&member.display_name(), member.id() == session.id());
            self.reply(session, entry).await?;
        }
        Ok(())
    }
}
