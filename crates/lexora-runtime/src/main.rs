// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tick-driving host for the Lexora threading core.
//!
//! Plays the role of the external collaborator the core is designed
//! around: it installs the process-wide pool, hands background work to it
//! every frame, and drains the main-thread queue exactly once per tick.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use lexora_threading::{parallel, PoolConfig, ThreadPool};

const TICKS: usize = 8;
const JOBS_PER_TICK: u64 = 4;
const FRAME: Duration = Duration::from_millis(16);

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    parallel::install(ThreadPool::with_config(PoolConfig::default()))?;
    let pool = parallel::global();
    log::info!(
        "threading mode {:?}, {} worker threads",
        pool.threading_mode(),
        pool.thread_count()
    );

    // Frame loop: gameplay systems hand expensive work to the pool each
    // tick, and results are marshaled back onto the main context where the
    // next tick picks them up.
    let jobs_completed = Arc::new(AtomicUsize::new(0));
    for tick in 0..TICKS {
        for job in 0..JOBS_PER_TICK {
            let jobs_completed = Arc::clone(&jobs_completed);
            parallel::run_in_background(move || {
                let checksum = (0..1_000u64).sum::<u64>() + job;
                parallel::run_on_main_thread(move || {
                    log::debug!("job {job} finished with checksum {checksum}");
                    jobs_completed.fetch_add(1, Ordering::SeqCst);
                });
            });
        }

        parallel::drain_main_thread();
        log::info!(
            "tick {tick}: {} jobs completed so far",
            jobs_completed.load(Ordering::SeqCst)
        );
        thread::sleep(FRAME);
    }
    // One last drain picks up results that landed after the final tick.
    parallel::drain_main_thread();
    log::info!(
        "{} of {} jobs completed",
        jobs_completed.load(Ordering::SeqCst),
        TICKS as u64 * JOBS_PER_TICK
    );

    // Chunked parallel loop over a shared accumulator.
    let sum = Arc::new(AtomicU64::new(0));
    let inner = Arc::clone(&sum);
    parallel::parallel_for(10_000, move |index| {
        inner.fetch_add((index * index) as u64, Ordering::SeqCst);
    });
    log::info!("parallel sum of squares: {}", sum.load(Ordering::SeqCst));

    parallel::global().dispose();
    Ok(())
}
