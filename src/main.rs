//! Convergence driver for the Mindmesh engine.
//!
//! Spins up several replicas of one mind map, hammers them with random
//! concurrent edits, delivers the resulting deltas shuffled and duplicated,
//! and verifies that every replica converges to the same single-rooted
//! tree. A second phase runs two live sessions over the in-memory
//! transport to exercise the async path end to end.

use mindmesh_core::node::{NodeId, NodeKind};
use mindmesh_core::stamp::ReplicaId;
use mindmesh_sdk::clock::SystemClock;
use mindmesh_sdk::document::{DocumentId, MindMap};
use mindmesh_sdk::presence::ParticipantId;
use mindmesh_sdk::session::{Session, SessionConfig};
use mindmesh_sdk::transport::{create_mesh, MemoryTransport};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn main() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async_main());
}

async fn async_main() {
    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║          MINDMESH CONVERGENCE DRIVER                       ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let stats = chaos_run(4, 20, 8, 42);
    stats.print();

    let stats = chaos_run(8, 40, 12, 1337);
    stats.print();

    session_demo().await;

    println!("\n✓ All runs completed successfully!");
}

/// Statistics collected during a chaos run.
struct ChaosStats {
    replicas: usize,
    rounds: usize,
    edits_applied: usize,
    deltas_delivered: usize,
    duplicates_injected: usize,
    final_nodes: usize,
    total_time: Duration,
}

impl ChaosStats {
    fn print(&self) {
        println!("\n╔════════════════════════════════════════════════════════════╗");
        println!("║              Chaos Run Statistics                          ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║  Replicas:              {:>34} ║", self.replicas);
        println!("║  Rounds:                {:>34} ║", self.rounds);
        println!("║  Edits Applied:         {:>34} ║", self.edits_applied);
        println!("║  Deltas Delivered:      {:>34} ║", self.deltas_delivered);
        println!("║  Duplicates Injected:   {:>34} ║", self.duplicates_injected);
        println!("║  Final Live Nodes:      {:>34} ║", self.final_nodes);
        println!(
            "║  Total Time:            {:>33}s ║",
            format!("{:.3}", self.total_time.as_secs_f64())
        );
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

/// Random concurrent editing with shuffled, duplicated delta delivery.
fn chaos_run(num_replicas: usize, rounds: usize, edits_per_round: usize, seed: u64) -> ChaosStats {
    println!(
        "\n[chaos] replicas: {} | rounds: {} | edits/round: {} | seed: {}",
        num_replicas, rounds, edits_per_round, seed
    );

    let start = Instant::now();
    let mut rng = StdRng::seed_from_u64(seed);
    let document_id = DocumentId::new();
    let clock = Arc::new(SystemClock);

    let mut replicas: Vec<MindMap> = (0..num_replicas)
        .map(|i| {
            MindMap::new(
                document_id.clone(),
                ReplicaId::new(format!("replica-{}", i)),
                clock.clone(),
            )
        })
        .collect();

    // Seed a shared root so edits have somewhere to land.
    let root = replicas[0].create_root("chaos").unwrap();
    let seed_delta = replicas[0].take_delta().unwrap();
    for replica in replicas.iter_mut().skip(1) {
        replica.apply_remote(&seed_delta);
    }

    let mut edits_applied = 0usize;
    let mut deltas_delivered = 0usize;
    let mut duplicates_injected = 0usize;

    for _ in 0..rounds {
        // Every replica edits blind, then broadcasts.
        let mut deltas = Vec::new();
        for replica in replicas.iter_mut() {
            for _ in 0..edits_per_round {
                if random_edit(replica, &root, &mut rng) {
                    edits_applied += 1;
                }
            }
            if let Some(delta) = replica.take_delta() {
                deltas.push(delta);
            }
        }

        // Deliver in a different order to every replica, sometimes twice.
        for replica in replicas.iter_mut() {
            let mut order: Vec<usize> = (0..deltas.len()).collect();
            order.shuffle(&mut rng);
            for idx in order {
                replica.apply_remote(&deltas[idx]);
                deltas_delivered += 1;
                if rng.gen_bool(0.2) {
                    replica.apply_remote(&deltas[idx]);
                    duplicates_injected += 1;
                }
            }
        }
    }

    // Convergence: every replica must hold the identical record set and
    // reconstruct the same single-rooted tree.
    let reference = replicas[0].snapshot();
    for replica in &replicas[1..] {
        assert_eq!(replica.snapshot(), reference, "replicas diverged");
        assert_eq!(replica.root(), replicas[0].root());
        assert_eq!(replica.tree().len(), replicas[0].tree().len());
    }
    println!(
        "[chaos] converged: {} live nodes, root {}",
        replicas[0].len(),
        replicas[0].root().unwrap()
    );

    ChaosStats {
        replicas: num_replicas,
        rounds,
        edits_applied,
        deltas_delivered,
        duplicates_injected,
        final_nodes: replicas[0].len(),
        total_time: start.elapsed(),
    }
}

/// Apply one random edit; returns whether it took effect.
fn random_edit(replica: &mut MindMap, root: &NodeId, rng: &mut StdRng) -> bool {
    let mut nodes: Vec<NodeId> = replica.tree().subtree_ids(root);
    if nodes.is_empty() {
        return false;
    }
    nodes.sort();

    match rng.gen_range(0..10) {
        // Mostly grow the map.
        0..=4 => {
            let parent = &nodes[rng.gen_range(0..nodes.len())];
            replica
                .add_node(parent, format!("n{}", rng.gen::<u16>()), NodeKind::Detail)
                .is_ok()
        }
        5..=6 => {
            let target = &nodes[rng.gen_range(0..nodes.len())];
            replica
                .rename(target, format!("renamed-{}", rng.gen::<u16>()))
                .is_ok()
        }
        7..=8 => {
            let target = &nodes[rng.gen_range(0..nodes.len())];
            let new_parent = &nodes[rng.gen_range(0..nodes.len())];
            if target == root {
                return false;
            }
            // Cycle-forming picks are rejected by the document; that
            // counts as no edit.
            replica.reparent(target, new_parent).is_ok()
        }
        _ => {
            let target = &nodes[rng.gen_range(0..nodes.len())];
            if target == root {
                return false;
            }
            replica.remove(target).is_ok()
        }
    }
}

/// Two live sessions over the in-memory transport.
async fn session_demo() {
    println!("\n[session] two live sessions over the in-memory mesh");

    let clock = Arc::new(SystemClock);
    let document_id = DocumentId::new();
    let transports: Vec<Arc<MemoryTransport>> = create_mesh(2).into_iter().map(Arc::new).collect();

    let alice = Arc::new(Session::new(
        MindMap::new(document_id.clone(), ReplicaId::new("r1"), clock.clone()),
        ParticipantId::new("alice"),
        Arc::clone(&transports[0]),
        clock.clone(),
        SessionConfig::default(),
    ));
    let bob = Arc::new(Session::new(
        MindMap::new(document_id, ReplicaId::new("r2"), clock.clone()),
        ParticipantId::new("bob"),
        Arc::clone(&transports[1]),
        clock.clone(),
        SessionConfig::default(),
    ));

    let _alice_loop = alice.spawn_message_loop();
    let _bob_loop = bob.spawn_message_loop();

    let root = alice
        .edit(|doc| doc.create_root("Shared board"))
        .await
        .unwrap();
    alice.begin_editing(root.clone()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    bob.edit(|doc| doc.add_node(&root, "Bob's idea", NodeKind::Category))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let alice_snapshot = alice.read(|doc| doc.snapshot());
    let bob_snapshot = bob.read(|doc| doc.snapshot());
    assert_eq!(alice_snapshot, bob_snapshot, "sessions diverged");

    println!(
        "[session] converged on {} nodes; editors on root: {:?}",
        alice.read(|doc| doc.len()),
        bob.active_editors(&root)
    );
}
