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

//! Many clients joining, talking and leaving at once

use confab_service::{ChatServer, ServerConfig};
use futures::future::join_all;
use std::collections::HashSet;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

const CLIENTS: usize = 20;

async fn start_server() -> ChatServer {
    let config = ServerConfig::new("127.0.0.1:0".parse().unwrap())
        .with_shutdown_timeout(Duration::from_secs(2));
    let server = ChatServer::new(config).await.unwrap();
    server.start().await.unwrap();
    server
}

async fn wait_for_sessions(server: &ChatServer, count: usize) {
    for _ in 0..600 {
        if server.session_count() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "expected {count} sessions, found {}",
        server.session_count()
    );
}

async fn read_line(reader: &mut BufReader<TcpStream>) -> Option<String> {
    let mut line = String::new();
    let read = timeout(Duration::from_secs(5), reader.read_line(&mut line))
        .await
        .expect("timed out waiting for a line")
        .ok()?;
    (read > 0).then(|| line.trim_end_matches(['\r', '\n']).to_string())
}

/// Connect and return the stream along with the ID from the welcome block
async fn join(server: &ChatServer) -> (BufReader<TcpStream>, u64) {
    let stream = TcpStream::connect(server.bind_address()).await.unwrap();
    let mut reader = BufReader::new(stream);
    read_line(&mut reader).await.unwrap();
    let id = read_line(&mut reader)
        .await
        .unwrap()
        .strip_prefix("Your ID: ")
        .expect("id line")
        .parse()
        .unwrap();
    read_line(&mut reader).await.unwrap();
    read_line(&mut reader).await.unwrap();
    (reader, id)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_get_unique_ids() {
    let server = start_server().await;

    let joined = join_all((0..CLIENTS).map(|_| join(&server))).await;
    wait_for_sessions(&server, CLIENTS).await;

    let ids: HashSet<u64> = joined.iter().map(|(_, id)| *id).collect();
    assert_eq!(ids.len(), CLIENTS);
    assert_eq!(ids, (1..=CLIENTS as u64).collect());

    let mut clients: Vec<_> = joined.into_iter().map(|(client, _)| client).collect();

    // Everyone but the last one leaves, half politely and half abruptly
    let mut survivor = clients.pop().unwrap();
    let leaving = clients.into_iter().enumerate().map(|(i, mut client)| async move {
        if i % 2 == 0 {
            client.get_mut().write_all(b"/quit\n").await.unwrap();
            while read_line(&mut client).await.is_some() {}
        }
    });
    join_all(leaving).await;
    wait_for_sessions(&server, 1).await;
    // Sessions are counted closed only after their departure is announced
    while server.metrics().active_sessions() > 1 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // The survivor sees exactly one departure per leaver
    let mut departures = 0;
    survivor.get_mut().write_all(b"/users\n").await.unwrap();
    loop {
        let line = read_line(&mut survivor).await.unwrap();
        if line == "Active users: 1" {
            break;
        }
        if line.ends_with(" left") {
            departures += 1;
        }
    }
    assert_eq!(departures, CLIENTS - 1);

    let metrics = server.metrics().snapshot();
    assert_eq!(metrics.total_sessions, CLIENTS as u64);
    assert_eq!(metrics.active_sessions, 1);

    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_chat_reaches_everyone_else() {
    let server = start_server().await;

    let mut clients = Vec::new();
    for expected in 1..=5 {
        let (client, _) = join(&server).await;
        clients.push(client);
        wait_for_sessions(&server, expected).await;
    }

    // Each client should see four chats and one ack for its own line
    let talkers = clients.into_iter().enumerate().map(|(i, mut client)| async move {
        client
            .get_mut()
            .write_all(format!("hello from {i}\n").as_bytes())
            .await
            .unwrap();

        let mut chats = HashSet::new();
        let mut acks = 0;
        while chats.len() < 4 || acks < 1 {
            let line = read_line(&mut client).await.unwrap();
            if line == "Sent" {
                acks += 1;
            } else if !line.ends_with(" joined") {
                assert!(!line.ends_with(&format!("hello from {i}")), "echoed: {line}");
                chats.insert(line[11..].to_string());
            }
        }
        (client, chats)
    });

    let results = join_all(talkers).await;
    for (_, chats) in &results {
        assert_eq!(chats.len(), 4);
    }

    server.shutdown().await.unwrap();
}
