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

//! Newline-delimited UTF-8 codec
//!
//! Wraps [`LinesCodec`] so that an overlong line surfaces as an item instead
//! of a stream error. `FramedRead` ends the stream after the first error, while
//! an overlong line is something a session survives.

use crate::ChatError;
use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

/// One decoded inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A complete line, without its terminator
    Line(String),
    /// A line exceeded the length limit and is being discarded
    TooLong,
}

/// Line codec used on both directions of a chat connection
#[derive(Debug, Clone)]
pub struct ChatCodec {
    lines: LinesCodec,
}

impl ChatCodec {
    /// Codec with no inbound length limit
    pub fn new() -> Self {
        Self {
            lines: LinesCodec::new(),
        }
    }

    /// Codec that reports lines longer than `max_length` bytes as [`Inbound::TooLong`]
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_length),
        }
    }

    fn map(result: Result<Option<String>, LinesCodecError>) -> Result<Option<Inbound>, ChatError> {
        match result {
            Ok(line) => Ok(line.map(Inbound::Line)),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Inbound::TooLong)),
            Err(e) => Err(e.into()),
        }
    }
}

impl Default for ChatCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ChatCodec {
    type Item = Inbound;
    type Error = ChatError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Inbound>, ChatError> {
        Self::map(self.lines.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Inbound>, ChatError> {
        Self::map(self.lines.decode_eof(src))
    }
}

impl<T: AsRef<str>> Encoder<T> for ChatCodec {
    type Error = ChatError;

    fn encode(&mut self, line: T, dst: &mut BytesMut) -> Result<(), ChatError> {
        self.lines.encode(line, dst).map_err(Into::into)
    }
}
