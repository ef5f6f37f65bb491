use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use relaynet_core::{
    MAX_RELAYS, Packet, RelayPingStats, RelayPingTarget, RelayUpdateRequest, RelayUpdateResponse,
    TrafficStats,
};

fn update_request(ping_count: usize) -> RelayUpdateRequest {
    RelayUpdateRequest {
        version: 1,
        address: "10.0.0.1:40000".parse().unwrap(),
        token: [7u8; 32],
        ping_stats: (0..ping_count as u64)
            .map(|relay_id| RelayPingStats {
                relay_id,
                rtt: 20.0,
                jitter: 1.0,
                packet_loss: 0.0,
            })
            .collect(),
        traffic_stats: TrafficStats::default(),
        shutting_down: false,
        cpu_usage: 10.0,
        mem_usage: 20.0,
        relay_version: "2.0.0".to_string(),
    }
}

fn bench_update_request_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("relay_update_request_decode");

    for (count, name) in [(0, "0_peers"), (64, "64_peers"), (MAX_RELAYS, "1024_peers")] {
        let bytes = update_request(count).encode().unwrap();
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_function(name, |b| {
            b.iter(|| RelayUpdateRequest::decode(black_box(&bytes)))
        });
    }

    group.finish();
}

fn bench_update_response_encode(c: &mut Criterion) {
    let response = RelayUpdateResponse {
        version: 0,
        timestamp: 1_700_000_000,
        relays_to_ping: (0..MAX_RELAYS as u64 - 1)
            .map(|id| RelayPingTarget {
                id,
                address: format!("10.0.{}.{}:40000", id / 256, id % 256)
                    .parse()
                    .unwrap(),
            })
            .collect(),
    };

    c.bench_function("relay_update_response_encode_1023", |b| {
        b.iter(|| black_box(&response).encode())
    });
}

criterion_group!(
    benches,
    bench_update_request_decode,
    bench_update_response_encode
);
criterion_main!(benches);
