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

//! Connection handler implementation
//!
//! The ConnectionHandler is responsible for the lifecycle of a single
//! client connection:
//! - Handshake (ID assignment, welcome block, registration, join notice)
//! - Line processing loop (commands vs. chat)
//! - Outbound writer task with write timeouts
//! - Exactly-once teardown (removal, departure notice, socket release)

use crate::codec::{ChatCodec, Inbound};
use crate::command::{Command, CommandOutcome, CommandProcessor};
use crate::protocol::{self, ChatMessage};
use crate::session::Outbound;
use crate::{
    Broadcaster, ChatError, Registry, Result, ServerConfig, ServerMetrics, Session, SessionState,
};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

/// Per-connection settings derived from the server configuration
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// Capacity of each session's outbound queue
    pub outbound_buffer: usize,
    /// Max time for a single socket write
    pub write_timeout: Duration,
    /// Longest accepted inbound line
    pub max_line_length: usize,
    /// Max time to flush remaining output during teardown
    pub shutdown_timeout: Duration,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for HandlerConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            outbound_buffer: config.outbound_buffer,
            write_timeout: config.write_timeout,
            max_line_length: config.max_line_length,
            shutdown_timeout: config.shutdown_timeout,
        }
    }
}

/// State shared by every connection handler of one server
#[derive(Debug)]
pub struct HandlerContext {
    registry: Arc<Registry>,
    broadcaster: Broadcaster,
    commands: CommandProcessor,
    metrics: Arc<ServerMetrics>,
    config: HandlerConfig,
    shutdown: CancellationToken,
}

impl HandlerContext {
    /// Wire up the broadcaster and command processor around `registry`
    ///
    /// Every session gets a child of `shutdown`, so cancelling it drives all
    /// sessions into teardown.
    pub fn new(
        registry: Arc<Registry>,
        metrics: Arc<ServerMetrics>,
        config: HandlerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let broadcaster = Broadcaster::new(registry.clone(), metrics.clone());
        let commands = CommandProcessor::new(
            registry.clone(),
            broadcaster.clone(),
            metrics.clone(),
            config.write_timeout,
        );
        Self {
            registry,
            broadcaster,
            commands,
            metrics,
            config,
            shutdown,
        }
    }

    /// Get the session registry
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Get the broadcaster
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Get the metrics
    pub fn metrics(&self) -> &Arc<ServerMetrics> {
        &self.metrics
    }
}

/// Drives one client connection from handshake to close
pub struct ConnectionHandler {
    session: Arc<Session>,
    context: Arc<HandlerContext>,
    writer: Option<JoinHandle<()>>,
}

impl ConnectionHandler {
    /// Serve `stream` until the client leaves or the session is flagged
    ///
    /// This is the entry point the listener spawns for every accepted
    /// connection. It never returns an error; failures are scoped to this
    /// session and end in its teardown.
    pub async fn serve<S>(context: Arc<HandlerContext>, stream: S, peer_addr: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);

        let id = context.registry.next_id();
        let (session, outbound) = Session::channel(
            id,
            peer_addr,
            context.config.outbound_buffer,
            context.shutdown.child_token(),
        );
        let session = Arc::new(session);

        let sink = FramedWrite::new(writer, ChatCodec::new());
        let writer = tokio::spawn(write_loop(
            session.clone(),
            outbound,
            sink,
            context.config.write_timeout,
        ));

        let lines = FramedRead::new(
            reader,
            ChatCodec::with_max_length(context.config.max_line_length),
        );

        let handler = Self {
            session,
            context,
            writer: Some(writer),
        };
        handler.run(lines).await;
    }

    /// Get the session this handler drives
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    #[instrument(
        name = "session",
        skip_all,
        fields(session_id = %self.session.id(), peer_addr = %self.session.peer_addr())
    )]
    async fn run<R>(mut self, mut lines: FramedRead<R, ChatCodec>)
    where
        R: AsyncRead + Unpin,
    {
        match self.handshake() {
            Ok(()) => {
                if let Err(e) = self.read_loop(&mut lines).await {
                    debug!(error = %e, "Session ended with error");
                }
            }
            Err(e) => warn!(error = %e, "Handshake failed"),
        }

        self.teardown().await;
    }

    /// `Connecting -> Active`
    fn handshake(&self) -> Result<()> {
        let session = &self.session;
        for line in protocol::welcome_block(session.id()) {
            session.deliver(line)?;
        }

        if !session.transition(SessionState::Connecting, SessionState::Active) {
            return Err(ChatError::ConnectionClosed);
        }
        self.context.registry.add(session.clone());
        self.context.metrics.session_opened();

        let name = session.display_name();
        info!(%name, "Session joined");
        let notice = ChatMessage::joined(&name).to_string();
        self.context.broadcaster.send_to_all(&notice, Some(session.id()));
        Ok(())
    }

    /// Read lines until EOF, an I/O fault, `/quit` or a teardown flag
    async fn read_loop<R>(&self, lines: &mut FramedRead<R, ChatCodec>) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            let next = tokio::select! {
                _ = self.session.flagged() => {
                    debug!("Session flagged, disconnecting");
                    return Ok(());
                }
                next = lines.next() => next,
            };

            match next {
                Some(Ok(Inbound::Line(line))) => {
                    if self.process_line(&line).await? == CommandOutcome::Disconnect {
                        return Ok(());
                    }
                }
                Some(Ok(Inbound::TooLong)) => {
                    self.context.metrics.protocol_error();
                    self.reply(protocol::LINE_TOO_LONG).await?;
                }
                Some(Err(e)) => return Err(e),
                None => {
                    debug!("Peer closed connection");
                    return Ok(());
                }
            }
        }
    }

    async fn process_line(&self, line: &str) -> Result<CommandOutcome> {
        if line.trim().is_empty() {
            return Ok(CommandOutcome::Continue);
        }

        if let Some(command) = Command::parse(line) {
            return self.context.commands.execute(&self.session, command).await;
        }

        let message = ChatMessage::chat(self.session.display_name(), line).to_string();
        trace!(%message, "Chat message");
        self.context
            .broadcaster
            .send_to_all(&message, Some(self.session.id()));
        self.reply(protocol::SENT).await?;
        Ok(CommandOutcome::Continue)
    }

    /// Queue a line for this session's own client, waiting for room
    async fn reply(&self, line: &str) -> Result<()> {
        self.session
            .reply(line, self.context.config.write_timeout)
            .await
    }

    /// `Active | Connecting -> Disconnecting -> Closed`
    ///
    /// Only the caller that wins the state transition does any work, so
    /// repeated invocations are no-ops.
    async fn teardown(&mut self) {
        let session = self.session.clone();

        if session.transition(SessionState::Active, SessionState::Disconnecting) {
            self.context.registry.remove(session.id());

            let name = session.display_name();
            info!(%name, "Session left");
            let notice = ChatMessage::left(&name).to_string();
            self.context.broadcaster.send_to_all(&notice, Some(session.id()));
            self.context
                .metrics
                .session_closed(session.connected_at().elapsed());
        } else if !session.transition(SessionState::Connecting, SessionState::Disconnecting) {
            return;
        }

        self.release().await;
        session.set_state(SessionState::Closed);
        debug!("Session closed");
    }

    /// Let the writer flush what is queued, then drop the write half
    ///
    /// The writer is aborted only if the flush overruns `shutdown_timeout`.
    async fn release(&mut self) {
        let Some(mut writer) = self.writer.take() else {
            return;
        };

        // The close marker queues behind every pending line
        let session = self.session.clone();
        let flushed = timeout(self.context.config.shutdown_timeout, async {
            if !session.close_outbound().await {
                trace!("Writer already gone");
            }
            let _ = (&mut writer).await;
        })
        .await;

        if flushed.is_err() {
            warn!("Writer did not finish in time, aborting it");
            writer.abort();
        }
    }
}

impl std::fmt::Debug for ConnectionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandler")
            .field("id", &self.session.id())
            .field("state", &self.session.state())
            .finish()
    }
}

/// Drain the session's outbound queue onto the socket
///
/// Runs until a close marker arrives or a write fails. A failed or stalled
/// write flags the session so its handler tears it down.
async fn write_loop<W>(
    session: Arc<Session>,
    mut outbound: mpsc::Receiver<Outbound>,
    mut sink: FramedWrite<W, ChatCodec>,
    write_timeout: Duration,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Line(line) => {
                let result = match timeout(write_timeout, sink.send(line)).await {
                    Ok(result) => result,
                    Err(_) => Err(ChatError::WriteTimeout),
                };
                if let Err(e) = result {
                    debug!(session_id = %session.id(), error = %e, "Write failed");
                    session.flag_for_teardown();
                    return;
                }
            }
            Outbound::Close => {
                let close = SinkExt::<String>::close(&mut sink);
                if let Ok(Err(e)) = timeout(write_timeout, close).await {
                    trace!(session_id = %session.id(), error = %e, "Close failed");
                }
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
    use tracing_test::traced_test;

    fn context() -> Arc<HandlerContext> {
        Arc::new(HandlerContext::new(
            Arc::new(Registry::new()),
            Arc::new(ServerMetrics::new()),
            HandlerConfig {
                outbound_buffer: 16,
                write_timeout: Duration::from_secs(1),
                max_line_length: 64,
                shutdown_timeout: Duration::from_secs(1),
            },
            CancellationToken::new(),
        ))
    }

    fn spawn_client(
        context: &Arc<HandlerContext>,
        port: u16,
    ) -> (BufReader<DuplexStream>, JoinHandle<()>) {
        spawn_client_with_buffer(context, port, 4096)
    }

    fn spawn_client_with_buffer(
        context: &Arc<HandlerContext>,
        port: u16,
        buffer: usize,
    ) -> (BufReader<DuplexStream>, JoinHandle<()>) {
        let (client, server) = tokio::io::duplex(buffer);
        let addr: SocketAddr = ([127, 0, 0, 1], port).into();
        let task = tokio::spawn(ConnectionHandler::serve(context.clone(), server, addr));
        (BufReader::new(client), task)
    }

    async fn read_line(reader: &mut BufReader<DuplexStream>) -> Option<String> {
        let mut line = String::new();
        let read = timeout(Duration::from_secs(2), reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a line")
            .unwrap();
        (read > 0).then(|| line.trim_end_matches('\n').to_string())
    }

    async fn read_welcome(reader: &mut BufReader<DuplexStream>) -> Vec<String> {
        let mut lines = Vec::new();
        for _ in 0..4 {
            lines.push(read_line(reader).await.unwrap());
        }
        lines
    }

    async fn wait_for_sessions(context: &HandlerContext, count: usize) {
        for _ in 0..200 {
            if context.registry().len() == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("registry never reached {count} sessions");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_handshake_registers_session() {
        let context = context();
        let (mut client, _task) = spawn_client(&context, 4000);

        let welcome = read_welcome(&mut client).await;
        assert_eq!(welcome[0], "Welcome to the chat!");
        assert_eq!(welcome[1], "Your ID: 1");
        assert_eq!(welcome[3], "");

        wait_for_sessions(&context, 1).await;
        assert_eq!(context.metrics().active_sessions(), 1);
        assert!(logs_contain("Session joined"));
    }

    #[tokio::test]
    async fn test_blank_lines_are_ignored() {
        let context = context();
        let (mut client, _task) = spawn_client(&context, 4001);
        read_welcome(&mut client).await;

        client.get_mut().write_all(b"   \n\t\n/users\n").await.unwrap();
        assert_eq!(read_line(&mut client).await.unwrap(), "Active users: 1");
        assert_eq!(read_line(&mut client).await.unwrap(), "  User1 (you)");
    }

    #[tokio::test]
    async fn test_overlong_line_keeps_session() {
        let context = context();
        let (mut client, _task) = spawn_client(&context, 4002);
        read_welcome(&mut client).await;

        let long = "x".repeat(200);
        client
            .get_mut()
            .write_all(format!("{long}\nhi\n").as_bytes())
            .await
            .unwrap();
        assert_eq!(read_line(&mut client).await.unwrap(), "Line too long");
        assert_eq!(read_line(&mut client).await.unwrap(), "Sent");
        assert_eq!(context.metrics().snapshot().protocol_errors, 1);
    }

    #[tokio::test]
    async fn test_quit_tears_down_once() {
        let context = context();
        let (mut alice, _alice_task) = spawn_client(&context, 4003);
        read_welcome(&mut alice).await;
        wait_for_sessions(&context, 1).await;

        let (mut bob, bob_task) = spawn_client(&context, 4004);
        read_welcome(&mut bob).await;
        wait_for_sessions(&context, 2).await;
        assert!(read_line(&mut alice).await.unwrap().ends_with("User2 joined"));

        bob.get_mut().write_all(b"/quit\n").await.unwrap();
        assert_eq!(read_line(&mut bob).await.unwrap(), "Goodbye!");
        assert_eq!(read_line(&mut bob).await, None);
        bob_task.await.unwrap();

        assert!(read_line(&mut alice).await.unwrap().ends_with("User2 left"));
        assert_eq!(context.registry().len(), 1);
        assert_eq!(context.metrics().active_sessions(), 1);

        // Nothing else is pending for alice
        alice.get_mut().write_all(b"/users\n").await.unwrap();
        assert_eq!(read_line(&mut alice).await.unwrap(), "Active users: 1");
    }

    #[tokio::test]
    async fn test_peer_close_tears_down() {
        let context = context();
        let (mut client, task) = spawn_client(&context, 4005);
        read_welcome(&mut client).await;
        wait_for_sessions(&context, 1).await;

        drop(client);
        task.await.unwrap();
        assert!(context.registry().is_empty());
        assert_eq!(context.metrics().active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_flagged_session_tears_down() {
        let context = context();
        let (mut client, task) = spawn_client(&context, 4006);
        read_welcome(&mut client).await;
        wait_for_sessions(&context, 1).await;

        let session = context.registry().snapshot().remove(0);
        session.flag_for_teardown();

        task.await.unwrap();
        assert_eq!(read_line(&mut client).await, None);
        assert_eq!(session.state(), SessionState::Closed);
        assert!(context.registry().is_empty());
    }

    #[tokio::test]
    async fn test_stalled_reader_does_not_block_others() {
        let context = context();
        // Never read from; its writer stalls almost immediately
        let (_stalled, stalled_task) = spawn_client_with_buffer(&context, 4007, 32);
        wait_for_sessions(&context, 1).await;

        let (mut talker, _talker_task) = spawn_client(&context, 4008);
        read_welcome(&mut talker).await;
        wait_for_sessions(&context, 2).await;

        for i in 0..40 {
            talker
                .get_mut()
                .write_all(format!("message {i}\n").as_bytes())
                .await
                .unwrap();
        }

        let mut acks = 0;
        let mut departed = false;
        while acks < 40 || !departed {
            let line = read_line(&mut talker).await.unwrap();
            if line == protocol::SENT {
                acks += 1;
            } else if line.ends_with("User1 left") {
                departed = true;
            }
        }

        stalled_task.await.unwrap();
        assert_eq!(context.registry().len(), 1);
        assert!(context.metrics().snapshot().deliveries_failed > 0);
    }

    /// Register `count` idle sessions directly, keeping their queues open
    fn add_idle_sessions(context: &HandlerContext, count: usize) -> Vec<mpsc::Receiver<Outbound>> {
        let peer: SocketAddr = ([127, 0, 0, 1], 5000).into();
        (0..count)
            .map(|_| {
                let (session, rx) = Session::channel(
                    context.registry().next_id(),
                    peer,
                    64,
                    CancellationToken::new(),
                );
                context.registry().add(Arc::new(session));
                rx
            })
            .collect()
    }

    #[tokio::test]
    async fn test_roster_larger_than_queue() {
        let context = context();
        let _idle = add_idle_sessions(&context, 20);

        let (mut client, _task) = spawn_client(&context, 4009);
        let welcome = read_welcome(&mut client).await;
        assert_eq!(welcome[1], "Your ID: 21");
        wait_for_sessions(&context, 21).await;

        // 22 reply lines against a 16 line queue
        client.get_mut().write_all(b"/users
").await.unwrap();
        assert_eq!(read_line(&mut client).await.unwrap(), "Active users: 21");
        for id in 1..=20 {
            assert_eq!(read_line(&mut client).await.unwrap(), format!("  User{id}"));
        }
        assert_eq!(read_line(&mut client).await.unwrap(), "  User21 (you)");

        client.get_mut().write_all(b"still here\n").await.unwrap();
        assert_eq!(read_line(&mut client).await.unwrap(), "Sent");
        assert_eq!(context.registry().len(), 21);
    }

    #[tokio::test]
    async fn test_quit_flushes_pending_replies() {
        let context = context();
        let _idle = add_idle_sessions(&context, 20);

        // A small pipe keeps the writer backed up while the handler quits
        let (mut client, task) = spawn_client_with_buffer(&context, 4010, 64);
        read_welcome(&mut client).await;
        wait_for_sessions(&context, 21).await;

        client
            .get_mut()
            .write_all(b"/users\n/quit\n")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut lines = Vec::new();
        while let Some(line) = read_line(&mut client).await {
            lines.push(line);
        }
        assert_eq!(lines.len(), 23);
        assert_eq!(lines[0], "Active users: 21");
        assert_eq!(lines[21], "  User21 (you)");
        assert_eq!(lines[22], "Goodbye!");

        task.await.unwrap();
        assert_eq!(context.registry().len(), 20);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_invalid_utf8_tears_down_once() {
        let context = context();
        let (mut alice, _alice_task) = spawn_client(&context, 4011);
        read_welcome(&mut alice).await;
        wait_for_sessions(&context, 1).await;

        let (mut bob, bob_task) = spawn_client(&context, 4012);
        read_welcome(&mut bob).await;
        wait_for_sessions(&context, 2).await;
        assert!(read_line(&mut alice).await.unwrap().ends_with("User2 joined"));

        bob.get_mut().write_all(b"\xff\xfe\n").await.unwrap();
        assert_eq!(read_line(&mut bob).await, None);
        bob_task.await.unwrap();

        assert!(read_line(&mut alice).await.unwrap().ends_with("User2 left"));
        assert_eq!(context.registry().len(), 1);
        assert_eq!(context.metrics().active_sessions(), 1);

        // No second departure is queued ahead of the roster
        alice.get_mut().write_all(b"/users\n").await.unwrap();
        assert_eq!(read_line(&mut alice).await.unwrap(), "Active users: 1");
        assert_eq!(read_line(&mut alice).await.unwrap(), "  User1 (you)");
        assert!(logs_contain("Session ended with error"));
    }
}
