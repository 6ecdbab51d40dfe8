//! Iteration timing for the shard ingestion progress bars.
//!
//! The per-shard loops of `from_feature_files` report how long the last
//! shard took and a smoothed average, so slow shards stand out while the
//! bar is running. This module holds the two helpers behind that message.
//!
//! Components
//! -----------------
//! * [`IterTimer`] – Per-iteration stopwatch with an **exponential moving
//!   average** (EMA), stable against single outlier shards.
//! * [`fmt_dur`] – Compact [`Duration`] formatter producing `"253µs"`,
//!   `"42ms"` or `"3.14s"` depending on scale.
//!
//! Usage
//! -----------------
//! ```rust, ignore
//! let mut timer = IterTimer::new(0.2); // smoothing factor α = 0.2
//!
//! for shard in shards {
//!     ingest(shard);
//!
//!     let dt = timer.tick();
//!     pb.set_message(format!("last: {}, avg: {}", fmt_dur(dt), fmt_dur(timer.avg())));
//! }
//! ```
//!
//! Design notes
//! -----------------
//! * The EMA update rule is `ema ← α·dt + (1−α)·ema` with `α ∈ (0,1]`;
//!   `α = 1.0` disables smoothing, small `α` smooths harder.
//! * The first [`IterTimer::tick`] seeds the average with the first
//!   sample, so [`IterTimer::avg`] is meaningful from iteration one.
//! * Compiled only with the `progress` feature, alongside the bars
//!   themselves.
use std::time::{Duration, Instant};

pub struct IterTimer {
    last: Instant,
    ema_ns: f64,
    alpha: f64,
    count: u64,
}

impl IterTimer {
    pub fn new(alpha: f64) -> Self {
        Self {
            last: Instant::now(),
            ema_ns: 0.0,
            alpha,
            count: 0,
        }
    }

    /// Close the current iteration: returns its duration and folds it
    /// into the running average.
    #[inline]
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let dt = now.duration_since(self.last);
        self.last = now;
        self.count += 1;

        let dt_ns = dt.as_nanos() as f64;
        self.ema_ns = if self.count == 1 {
            dt_ns
        } else {
            self.alpha * dt_ns + (1.0 - self.alpha) * self.ema_ns
        };

        dt
    }

    /// Smoothed per-iteration duration, zero before the first tick.
    #[inline]
    pub fn avg(&self) -> Duration {
        if self.count == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(self.ema_ns as u64)
        }
    }
}

#[inline]
pub fn fmt_dur(d: Duration) -> String {
    let us = d.as_micros();
    if us < 1_000 {
        format!("{us}µs")
    } else {
        let ms = d.as_millis();
        if ms < 1_000 {
            format!("{ms}ms")
        } else {
            let s = d.as_secs_f32();
            format!("{s:.2}s")
        }
    }
}
