//! Revisit Demo: drift learned during idle replay
//!
//! A simulated axis tracks a fixed target at place A while a constant
//! thermal drift pushes it off. The axis then moves to place B, comes back
//! to A, and the tracking error on the second visit is compared between a
//! controller whose memory replays during idle gaps and one that never does.
//!
//! Run: cargo run --example revisit_demo

use grid_memory::kernel::vector::{norm, sub};
use grid_memory::{
    CerebellumConfig, CerebellumEngine, Context, Kinematics, MemoryConfig, Observation,
    UniversalMemory,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde_json::json;

const PLACE_A: [f64; 5] = [1.0, 0.5, 0.3, 10.0, 5.0];
const PLACE_B: [f64; 5] = [1.2, 0.3, 0.4, 12.0, 6.0];
const DRIFT_A: [f64; 5] = [2e-4, 0.0, 0.0, 0.0, 0.0];
const STILL: [f64; 5] = [0.0; 5];
const KP: f64 = 0.5;
const IDLE_GAP: f64 = 2.5;

struct Axis {
    memory: UniversalMemory,
    cerebellum: CerebellumEngine,
    rng: ChaCha8Rng,
    clock: f64,
    replay: bool,
}

impl Axis {
    fn new(replay: bool) -> grid_memory::Result<Self> {
        let cerebellum = CerebellumConfig {
            memory_gain: 1.0,
            ..Default::default()
        };
        Ok(Self {
            memory: UniversalMemory::new(MemoryConfig::default())?,
            cerebellum: CerebellumEngine::new(5, &cerebellum)?,
            rng: ChaCha8Rng::seed_from_u64(2024),
            clock: 0.0,
            replay,
        })
    }

    /// Hold `target` for `steps` control cycles; returns the mean ‖target - x‖.
    fn visit(
        &mut self,
        target: &[f64; 5],
        drift: &[f64; 5],
        steps: usize,
        context: &Context,
    ) -> grid_memory::Result<f64> {
        self.cerebellum.reset();
        let mut x = target.to_vec();
        let mut v = vec![0.0; 5];
        let mut a = vec![0.0; 5];
        let mut total = 0.0;

        for _ in 0..steps {
            let obs = Observation::new(&x, target, 1.0)
                .with_velocity(&v)
                .with_acceleration(&a)
                .with_memory_query(target);
            let correction =
                self.cerebellum
                    .compute_correction(&obs, Some(&self.memory), Some(context))?;
            let reference = sub(target, &correction.total);

            let next: Vec<f64> = (0..5)
                .map(|i| {
                    let u = KP * (reference[i] - x[i]);
                    x[i] + drift[i] + self.rng.gen_range(-1e-6..1e-6) + 0.1 * u
                })
                .collect();
            let next_v = sub(&next, &x);
            a = sub(&next_v, &v);
            v = next_v;
            x = next;

            let kinematics = Kinematics {
                current: &x,
                target,
                velocity: &v,
                acceleration: &a,
            };
            self.memory
                .observe(target, kinematics, Some(context), Some(self.clock))?;
            total += norm(&sub(target, &x));
            self.clock += 1.0;
        }
        Ok(total / steps as f64)
    }

    fn idle(&mut self) -> grid_memory::Result<()> {
        self.clock += IDLE_GAP;
        if self.replay {
            if let Some(stats) = self.memory.replay(Some(self.clock))? {
                println!(
                    "    replay @ t={:.1}: {} points, {} segments, {} places, {} contexts updated",
                    self.clock,
                    stats.points_reviewed,
                    stats.stable_segments,
                    stats.places_updated,
                    stats.contexts_updated
                );
            }
        }
        self.clock += 1.0;
        Ok(())
    }
}

fn operation(name: &str) -> Context {
    let mut context = Context::new();
    context.insert("op".into(), json!(name));
    context
}

fn run(replay: bool) -> grid_memory::Result<(f64, f64, Axis)> {
    let mut axis = Axis::new(replay)?;
    let (at_a, at_b) = (operation("A"), operation("B"));

    let first = axis.visit(&PLACE_A, &DRIFT_A, 120, &at_a)?;
    axis.idle()?;
    axis.visit(&PLACE_B, &STILL, 80, &at_b)?;
    axis.idle()?;
    let second = axis.visit(&PLACE_A, &DRIFT_A, 120, &at_a)?;
    Ok((first, second, axis))
}

fn header(title: &str) {
    println!();
    println!("{}", "=".repeat(70));
    println!("  {}", title);
    println!("{}", "=".repeat(70));
}

fn main() -> grid_memory::Result<()> {
    header("REVISIT: A (drift) -> idle -> B -> idle -> A (drift)");

    println!("\n  --- without replay ---");
    let (base_first, base_second, _) = run(false)?;
    println!("    first visit to A:  {:.6}", base_first);
    println!("    second visit to A: {:.6}", base_second);

    println!("\n  --- with replay ---");
    let (first, second, axis) = run(true)?;
    println!("    first visit to A:  {:.6}", first);
    println!("    second visit to A: {:.6}", second);

    let learned = axis.memory.memory_bias(&PLACE_A, Some(&operation("A")))?;
    let stats = axis.memory.stats();

    header("RESULT");
    println!(
        "  second-visit error: {:.6} -> {:.6} ({:.0}% lower)",
        base_second,
        second,
        100.0 * (1.0 - second / base_second)
    );
    println!("  learned bias at A:  {:?}", learned);
    println!(
        "  places: {}, contexts: {}, replay passes: {}, consolidations: {}",
        stats.places.num_places,
        stats.contexts.num_contexts,
        stats.replay_passes,
        stats.consolidations
    );
    Ok(())
}
