//! # Event Core Benchmarks
//!
//! | Path | What is measured |
//! |------|------------------|
//! | Notify dispatch | `raise` through N local subscribers |
//! | Policy filter | dispatch with policies on every subscriber |
//! | Request-response | `query` with one answering subscriber |
//! | Codec | encode and decode of a packet-in record |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nos_bus::codec::{decode_event, encode_event};
use nos_bus::{EventRecord, InfraEngine};
use nos_tests::fixtures::{local_infra, Quiet};
use nos_types::{component_id, EventPayload, InfraEvent, PktIn, Status, SubscriberConfig, Switch};
use std::sync::Arc;

fn engine(subscribers: usize, policy: Option<&str>) -> Arc<InfraEngine> {
    let engine = local_infra();
    let mut configs = Vec::with_capacity(subscribers + 1);
    for i in 0..subscribers {
        let name = format!("sub{i}");
        engine.register_handler(name.clone(), Arc::new(Quiet));
        let mut cfg = SubscriberConfig::new(name)
            .with_status(Status::Enabled)
            .with_priority(i as i32)
            .inbound("DP_RECEIVE_PACKET")
            .inbound("SW_GET_DPID");
        if let Some(policy) = policy {
            cfg.policies = vec![policy.to_string()];
        }
        configs.push(cfg);
    }
    engine.register_handler("ofp", Arc::new(Quiet));
    configs.push(
        SubscriberConfig::new("ofp")
            .with_status(Status::Enabled)
            .outbound("DP_RECEIVE_PACKET")
            .outbound("SW_GET_DPID"),
    );
    engine.reload(&configs).unwrap();
    engine.start_all();
    engine
}

fn packet() -> PktIn {
    PktIn {
        dpid: 1,
        port: 2,
        proto: 0x0800,
        src_ip: 0x0a00_0001,
        dst_ip: 0x0a00_0002,
        dst_port: 80,
        data: vec![0u8; 128],
        ..PktIn::default()
    }
}

fn bench_notify(c: &mut Criterion) {
    let mut group = c.benchmark_group("notify-dispatch");
    let ofp = component_id("ofp");
    for size in [1, 8, 32] {
        let engine = engine(size, None);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("raise", size), &size, |b, _| {
            b.iter(|| black_box(engine.dp_receive_packet(ofp, packet()).unwrap()))
        });
    }
    group.finish();
}

fn bench_policy(c: &mut Criterion) {
    let mut group = c.benchmark_group("policy-filter");
    let ofp = component_id("ofp");
    for (label, policy) in [("match", "dpid:1;port:2"), ("miss", "dpid:7")] {
        let engine = engine(8, Some(policy));
        group.bench_function(label, |b| {
            b.iter(|| black_box(engine.dp_receive_packet(ofp, packet()).unwrap()))
        });
    }
    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let engine = engine(1, None);
    let ofp = component_id("ofp");
    c.bench_function("request-response/query", |b| {
        b.iter(|| {
            let mut sw = Switch::default();
            black_box(engine.sw_get_dpid(ofp, &mut sw).unwrap())
        })
    });
}

fn bench_codec(c: &mut Criterion) {
    let payload = EventPayload::PktIn(packet());
    let line = encode_event(1, InfraEvent::DpReceivePacket, &payload).unwrap();
    let mut group = c.benchmark_group("codec");
    group.bench_function("encode-pktin", |b| {
        b.iter(|| black_box(encode_event(1, InfraEvent::DpReceivePacket, &payload).unwrap()))
    });
    group.bench_function("decode-pktin", |b| {
        b.iter(|| {
            let record: EventRecord<InfraEvent> = decode_event(black_box(&line)).unwrap();
            black_box(record)
        })
    });
    group.finish();
}

criterion_group!(benches, bench_notify, bench_policy, bench_query, bench_codec);
criterion_main!(benches);
