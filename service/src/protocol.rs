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

//! Server to client line catalogue
//!
//! Every line the server writes is produced here. Lines never carry their
//! terminating newline; the outbound codec appends it.

use crate::SessionId;
use chrono::{DateTime, Local};
use std::fmt;

/// First character of every command line
pub const COMMAND_MARKER: char = '/';

/// Acknowledgement sent to the author of a chat line
pub const SENT: &str = "Sent";
/// Reply to `/quit`
pub const GOODBYE: &str = "Goodbye!";
/// Reply to an unrecognized command
pub const UNKNOWN_COMMAND: &str = "Unknown command";
/// Reply to `/name` without a usable argument
pub const NAME_USAGE: &str = "Usage: /name <newname>";
/// Reply to an inbound line longer than the configured limit
pub const LINE_TOO_LONG: &str = "Line too long";
/// Sent before closing a connection refused at the connection limit
pub const SERVER_FULL: &str = "Server is full";
/// Sent to every session when the server shuts down
pub const SHUTTING_DOWN: &str = "Server shutting down";

const TIMESTAMP_FORMAT: &str = "%H:%M:%S";

/// Lines sent once when a session is accepted
pub fn welcome_block(id: SessionId) -> [String; 4] {
    [
        "Welcome to the chat!".to_string(),
        format!("Your ID: {}", id.as_u64()),
        "Commands: /name <newname>, /users, /quit".to_string(),
        String::new(),
    ]
}

/// Display name given to a session before it renames itself
pub fn default_name(id: SessionId) -> String {
    format!("User{}", id.as_u64())
}

/// A chat line or presence notice, stamped when it is created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    timestamp: DateTime<Local>,
    kind: MessageKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum MessageKind {
    Chat { sender: String, body: String },
    Joined { name: String },
    Left { name: String },
    Renamed { old: String, new: String },
}

impl ChatMessage {
    fn now(kind: MessageKind) -> Self {
        Self {
            timestamp: Local::now(),
            kind,
        }
    }

    /// A line of chat from `sender`
    pub fn chat(sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self::now(MessageKind::Chat {
            sender: sender.into(),
            body: body.into(),
        })
    }

    /// Presence notice for a session that finished its handshake
    pub fn joined(name: impl Into<String>) -> Self {
        Self::now(MessageKind::Joined { name: name.into() })
    }

    /// Presence notice for a session that tore down
    pub fn left(name: impl Into<String>) -> Self {
        Self::now(MessageKind::Left { name: name.into() })
    }

    /// Presence notice for a display name change
    pub fn renamed(old: impl Into<String>, new: impl Into<String>) -> Self {
        Self::now(MessageKind::Renamed {
            old: old.into(),
            new: new.into(),
        })
    }

    /// Override the creation time
    pub fn with_timestamp(mut self, timestamp: DateTime<Local>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// When the message was created
    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.timestamp.format(TIMESTAMP_FORMAT))?;
        match &self.kind {
            MessageKind::Chat { sender, body } => write!(f, "{sender}: {body}"),
            MessageKind::Joined { name } => write!(f, "{name} joined"),
            MessageKind::Left { name } => write!(f, "{name} left"),
            MessageKind::Renamed { old, new } => write!(f, "{old} is now {new}"),
        }
    }
}

/// Confirmation sent to a session that renamed itself
pub fn name_changed(new: &str) -> String {
    format!("Name changed to: {new}")
}

/// Header of the `/users` reply
pub fn roster_header(count: usize) -> String {
    format!("Active users: {count}")
}

/// One entry of the `/users` reply
pub fn roster_entry(name: &str, is_caller: bool) -> String {
    if is_caller {
        format!("  {name} (you)")
    } else {
        format!("  {name}")
    }
}
