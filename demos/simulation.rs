//! End-to-end demo: particle emission through the SoA buffer and spatial
//! grid, lifecycle events through the emitter, and a snapshot codec on
//! top of the pooled byte buffers.
//!
//! Run with: cargo run --example simulation

use sim_core::buffer::{BufferPool, ByteBuffer, ByteOrder};
use sim_core::core::Vec3;
use sim_core::event::{EventEmitter, EventPriority, SubscribeOptions};
use sim_core::infrastructure::{init_logging, LogOptions};
use sim_core::particle::{Aabb, ParticleBuffer, ParticleId, UniformSpatialGrid};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Payload for particle lifecycle events
#[derive(Debug)]
enum SimEvent {
    Spawned(ParticleId),
    Killed(ParticleId),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> sim_core::Result<()> {
    let _log_guards = init_logging(&LogOptions::default())?;
    tracing::info!(target: "main", "simulation demo starting");

    let spawned = Arc::new(AtomicU64::new(0));
    let killed = Arc::new(AtomicU64::new(0));

    let emitter: EventEmitter<SimEvent> = EventEmitter::with_defaults();
    let s = Arc::clone(&spawned);
    emitter.on(
        "particle",
        move |event| {
            match *event {
                SimEvent::Spawned(_) => {
                    s.fetch_add(1, Ordering::Relaxed);
                }
                SimEvent::Killed(_) => {}
            }
            Ok(())
        },
        SubscribeOptions::priority(EventPriority::High),
    );
    let k = Arc::clone(&killed);
    emitter.on(
        "particle",
        move |event| {
            if let SimEvent::Killed(_) = *event {
                k.fetch_add(1, Ordering::Relaxed);
            }
            Ok(())
        },
        SubscribeOptions::default(),
    );

    // World: 100^3 units, 10-unit cells
    let mut particles = ParticleBuffer::new();
    particles.allocate(256).map_err(sim_core::SimError::Particle)?;
    let mut grid = UniformSpatialGrid::new(
        Aabb::new(Vec3::ZERO, Vec3::splat(100.0)),
        Vec3::splat(10.0),
    )
    .map_err(sim_core::SimError::Particle)?;

    // Spawn a shell of particles and index them
    for i in 0..200u32 {
        let position = Vec3::new(
            (i % 10) as f32 * 9.7 + 1.0,
            ((i / 10) % 10) as f32 * 9.7 + 1.0,
            ((i / 100) % 10) as f32 * 9.7 + 1.0,
        );
        let id = particles
            .add_particle(position, Vec3::new(0.0, 1.0, 0.0), 60.0, 0.5, 0xFF80_40FF)
            .expect("buffer sized for the spawn burst");
        grid.insert(id, position);
        emitter.emit("particle", SimEvent::Spawned(id)).await?;
    }

    // Advance one tick: integrate velocity and re-index moved particles
    let dt = 0.1f32;
    let moves: Vec<(ParticleId, usize, Vec3, Vec3)> = particles
        .iter_alive()
        .map(|(id, idx)| {
            let old = particles.get_position(idx).expect("alive slot");
            let vel = particles.get_velocity(idx).expect("alive slot");
            (id, idx, old, old + vel * dt)
        })
        .collect();
    for (id, idx, old, new) in moves {
        particles
            .set_position(idx, new)
            .map_err(sim_core::SimError::Particle)?;
        grid.update(id, old, new);
    }

    // Cull a neighborhood and publish the kills
    let near_origin = grid.query_radius(Vec3::splat(5.0), 12.0);
    for id in &near_origin {
        particles
            .kill_particle(*id)
            .map_err(sim_core::SimError::Particle)?;
        grid.remove(*id).map_err(sim_core::SimError::Particle)?;
        emitter.emit("particle", SimEvent::Killed(*id)).await?;
    }
    particles.compact();

    // Serialize a survivor snapshot through a pooled buffer
    let mut snapshot = ByteBuffer::alloc(4096, ByteOrder::BigEndian)?;
    snapshot.put_string("sim-core snapshot")?;
    snapshot.put_var_int(particles.count() as u32)?;
    for (id, idx) in particles.iter_alive() {
        let p = particles.get_position(idx).expect("alive slot");
        snapshot.put_u32(id.as_raw())?;
        snapshot.put_f32(p.x)?;
        snapshot.put_f32(p.y)?;
        snapshot.put_f32(p.z)?;
    }
    snapshot.flip()?;
    let checksum = snapshot.crc32()?;

    println!(
        "spawned={} killed={} alive={} cells={} snapshot_bytes={} crc32={:08x}",
        spawned.load(Ordering::Relaxed),
        killed.load(Ordering::Relaxed),
        particles.count(),
        grid.cell_count(),
        snapshot.remaining(),
        checksum,
    );
    println!(
        "buffer pool: {} allocations across {} buckets",
        BufferPool::global().get_stats().total_allocations,
        BufferPool::global().get_stats().buckets.len(),
    );

    snapshot.release()?;
    emitter.dispose();
    Ok(())
}
