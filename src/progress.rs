//! Terminal progress line fed by the sync event stream.
//!
//! Tracks per-mailbox totals from the most recent progress event (values
//! are absolute, so lossy delivery is harmless) and renders an overall
//! counter with an ETA derived from an exponentially smoothed throughput.

use std::collections::HashMap;
use std::io::Write;
use std::time::{Duration, Instant};

use crate::sync::{EventKind, SyncEvent};

const TICK: Duration = Duration::from_millis(200);
const HALF_LIFE_SECS: f64 = 3.0;

/// Exponential moving average of messages/second, with a fixed half-life
/// so the smoothing is independent of the tick cadence.
#[derive(Debug)]
struct SmoothedRate {
    rate: f64,
    last_done: usize,
    last_at: Instant,
}

impl SmoothedRate {
    fn new(now: Instant) -> Self {
        SmoothedRate {
            rate: 0.0,
            last_done: 0,
            last_at: now,
        }
    }

    fn update(&mut self, done: usize, now: Instant) {
        let dt = now.duration_since(self.last_at).as_secs_f64();
        if dt <= 0.0 {
            return;
        }
        let inst = (done.saturating_sub(self.last_done)) as f64 / dt;
        let alpha = 1.0 - (-std::f64::consts::LN_2 * dt / HALF_LIFE_SECS).exp();
        self.rate = if self.rate == 0.0 {
            inst
        } else {
            alpha * inst + (1.0 - alpha) * self.rate
        };
        self.last_done = done;
        self.last_at = now;
    }
}

fn format_eta(total: usize, done: usize, rate: f64, elapsed: Duration) -> String {
    if total == 0 {
        return "ETA --".to_string();
    }
    let remaining = total.saturating_sub(done);
    if remaining == 0 {
        return "ETA 0s".to_string();
    }
    // Prefer the smoothed rate, fall back to the average since start.
    let mut rate = rate;
    if rate <= 0.01 {
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            rate = done as f64 / secs;
        }
    }
    if rate <= 0.01 {
        return "ETA --".to_string();
    }
    let secs = remaining as f64 / rate;
    if secs < 1.0 {
        return "ETA <1s".to_string();
    }
    let secs = secs as u64;
    if secs > 99 * 3600 {
        return "ETA >99h".to_string();
    }
    if secs >= 3600 {
        return format!("ETA {}h{}m", secs / 3600, (secs % 3600) / 60);
    }
    if secs >= 60 {
        return format!("ETA {}m{}s", secs / 60, secs % 60);
    }
    format!("ETA {}s", secs)
}

/// Consume events until the producing run finishes; returns the final
/// `(done, total)` so the caller can decide on a closing hint.
pub async fn render(events: flume::Receiver<SyncEvent>) -> (usize, usize) {
    let mut per_mailbox: HashMap<String, (usize, usize)> = HashMap::new();
    let started = Instant::now();
    let mut rate = SmoothedRate::new(started);
    let mut interval = tokio::time::interval(TICK);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let totals = |per_mailbox: &HashMap<String, (usize, usize)>| {
        per_mailbox.values().fold((0usize, 0usize), |acc, (t, d)| {
            (acc.0 + t, acc.1 + d)
        })
    };

    loop {
        tokio::select! {
            event = events.recv_async() => match event {
                Ok(event) => {
                    if event.kind == EventKind::MailboxProgress {
                        per_mailbox.insert(event.mailbox.clone(), (event.total, event.done));
                        let (total, done) = totals(&per_mailbox);
                        draw(done, total, rate.rate, started);
                    }
                }
                Err(_) => break,
            },
            _ = interval.tick() => {
                let (total, done) = totals(&per_mailbox);
                rate.update(done, Instant::now());
                draw(done, total, rate.rate, started);
            }
        }
    }

    let (total, done) = totals(&per_mailbox);
    draw(done, total, rate.rate, started);
    eprintln!();
    (done, total)
}

fn draw(done: usize, total: usize, rate: f64, started: Instant) {
    let eta = format_eta(total, done, rate, started.elapsed());
    eprint!("\r{}/{}   {}\x1b[K", done, total, eta);
    let _ = std::io::stderr().flush();
}
