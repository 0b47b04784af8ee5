use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mesh_swarm::mesh::{
    decode, encode, tally, ElectionSettings, Envelope, MasterCandidate, Message, NodeCore,
    NodeState,
};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::collections::HashMap;

fn codec_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    let heartbeat = Message::heartbeat(NodeState::new("a1b2c3d4", 1_700_000_000.25));
    group.bench_function("encode_heartbeat", |b| {
        b.iter(|| black_box(encode("a1b2c3d4", &heartbeat).unwrap().to_bytes()))
    });

    let raw = encode("a1b2c3d4", &heartbeat).unwrap().to_bytes();
    group.bench_function("decode_heartbeat", |b| {
        b.iter(|| {
            let envelope = Envelope::parse(black_box(&raw)).unwrap();
            black_box(decode(&envelope).unwrap())
        })
    });

    group.finish();
}

fn election_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("election");

    let votes: Vec<String> = (0..1000).map(|i| format!("node-{}", i % 7)).collect();
    group.bench_function("tally_1000_votes", |b| {
        b.iter(|| black_box(tally(votes.iter())))
    });

    group.bench_function("full_round_64_nodes", |b| {
        b.iter(|| {
            let mut node = NodeCore::new("local", 0.0, ElectionSettings::default());
            let mut rng = SmallRng::seed_from_u64(1);
            let peers: Vec<String> = (0..63).map(|i| format!("peer-{}", i)).collect();
            let mut choices = HashMap::new();

            for peer in &peers {
                node.handle(peer, Message::heartbeat(NodeState::new(peer.clone(), 0.0)))
                    .unwrap();
                node.handle(peer, Message::MasterCandidate(MasterCandidate::new(peer.clone(), 0.0)))
                    .unwrap();
                choices.insert(peer.clone(), "peer-0".to_string());
            }
            for (voter, candidate) in choices {
                node.handle(&voter, Message::vote(candidate)).unwrap();
            }
            black_box(node.tick(10.0, &mut rng))
        })
    });

    group.finish();
}

criterion_group!(benches, codec_benchmark, election_benchmark);
criterion_main!(benches);
