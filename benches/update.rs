//! Benchmarks for `GameState::update`, the per-wake hot path.

#![allow(missing_docs)]

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use lockstep_server::game::orders::pack_unit_ids;
use lockstep_server::game::UnitIds;
use lockstep_server::network::OrderRequest;
use lockstep_server::{
    required_memory, ChunkQueue, ClientId, ClientMessage, GameConfig, GameState, LockstepSimulation,
    NetEvent, Simulation, Target,
};

const PLAYERS: usize = 4;
const TICK_US: u64 = LockstepSimulation::TICK_DURATION_MS * 1000;

/// Encoded order events from random players.
fn random_orders(rng: &mut StdRng, count: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|_| {
            let units: Vec<u16> = (0..rng.gen_range(1..=16)).map(|_| rng.gen()).collect();
            let packed = pack_unit_ids(&units);
            let payload = ClientMessage::Order(OrderRequest {
                unit_ids: UnitIds::from_bytes(&packed),
                target: Target::new(rng.gen_range(-1000..1000), rng.gen_range(-1000..1000)),
            })
            .to_bytes()
            .unwrap();
            NetEvent::Message {
                client_id: ClientId(rng.gen_range(1..=PLAYERS as u64)),
                payload: &payload,
            }
            .to_bytes()
            .unwrap()
        })
        .collect()
}

fn bench_tick_with_orders(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_tick");

    for orders_per_tick in [0usize, 16, 64] {
        let mut rng = StdRng::seed_from_u64(42);
        let batch = random_orders(&mut rng, orders_per_tick);

        let mut memory = vec![0u8; required_memory(PLAYERS)];
        let mut event_storage = vec![0u8; 64 * 1024];
        let mut command_storage = vec![0u8; 64 * 1024];
        let mut game =
            GameState::<_, PLAYERS>::new(&mut memory, LockstepSimulation::new(), GameConfig::default(), 0).unwrap();
        let mut events = ChunkQueue::new(&mut event_storage);
        let mut commands = ChunkQueue::new(&mut command_storage);

        for id in 1..=PLAYERS as u64 {
            events.write(&NetEvent::Connect { client_id: ClientId(id) }.to_bytes().unwrap()).unwrap();
        }
        game.update(0, false, &mut events, &mut commands).unwrap();
        commands.reset();

        let mut time = 0;
        group.bench_with_input(BenchmarkId::from_parameter(orders_per_tick), &batch, |b, batch| {
            b.iter(|| {
                for record in batch {
                    events.write(record).unwrap();
                }
                time += TICK_US;
                let update = game.update(black_box(time), false, &mut events, &mut commands).unwrap();
                commands.reset();
                black_box(update)
            });
        });
    }

    group.finish();
}

fn bench_idle_poll(c: &mut Criterion) {
    let mut memory = vec![0u8; required_memory(1)];
    let mut event_storage = vec![0u8; 4096];
    let mut command_storage = vec![0u8; 64 * 1024];
    let mut game =
        GameState::<_, 1>::new(&mut memory, LockstepSimulation::new(), GameConfig::default(), 0).unwrap();
    let mut events = ChunkQueue::new(&mut event_storage);
    let mut commands = ChunkQueue::new(&mut command_storage);

    events.write(&NetEvent::Connect { client_id: ClientId(1) }.to_bytes().unwrap()).unwrap();
    game.update(0, false, &mut events, &mut commands).unwrap();
    commands.reset();

    c.bench_function("update_idle_before_deadline", |b| {
        b.iter(|| {
            let update = game.update(black_box(1), false, &mut events, &mut commands).unwrap();
            black_box(update)
        });
    });
}

criterion_group!(benches, bench_tick_with_orders, bench_idle_poll);
criterion_main!(benches);
