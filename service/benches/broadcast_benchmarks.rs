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

//! Benchmarks for the chat hot paths

use confab_service::{
    Broadcaster, ChatMessage, Command, Outbound, Registry, ServerMetrics, Session, SessionId,
};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Registry with `count` sessions and the receiving ends of their queues
fn populated_registry(count: u64) -> (Arc<Registry>, Vec<mpsc::Receiver<Outbound>>) {
    let registry = Arc::new(Registry::new());
    let peer: SocketAddr = ([127, 0, 0, 1], 9000).into();
    let mut receivers = Vec::new();
    for _ in 0..count {
        let (session, rx) =
            Session::channel(registry.next_id(), peer, 1024, CancellationToken::new());
        registry.add(Arc::new(session));
        receivers.push(rx);
    }
    (registry, receivers)
}

fn bench_broadcast_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast_scaling");

    for count in [10u64, 100, 1000] {
        let (registry, mut receivers) = populated_registry(count);
        let broadcaster = Broadcaster::new(registry, Arc::new(ServerMetrics::new()));
        let message = ChatMessage::chat("User1", "hello everyone").to_string();

        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                let result = broadcaster.send_to_all(black_box(&message), Some(SessionId::new(1)));
                for rx in receivers.iter_mut() {
                    while rx.try_recv().is_ok() {}
                }
                black_box(result)
            })
        });
    }
    group.finish();
}

fn bench_registry_snapshot(c: &mut Criterion) {
    let (registry, _receivers) = populated_registry(500);

    c.bench_function("registry_snapshot_500", |b| {
        b.iter(|| black_box(registry.snapshot()))
    });
}

fn bench_line_handling(c: &mut Criterion) {
    let mut group = c.benchmark_group("line_handling");

    group.bench_function("parse_command", |b| {
        b.iter(|| black_box(Command::parse(black_box("/name Somebody Else"))))
    });

    group.bench_function("parse_chat", |b| {
        b.iter(|| black_box(Command::parse(black_box("just chatting here"))))
    });

    group.bench_function("format_chat_message", |b| {
        b.iter(|| black_box(ChatMessage::chat("User42", black_box("hello there")).to_string()))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_broadcast_scaling,
    bench_registry_snapshot,
    bench_line_handling
);
criterion_main!(benches);
