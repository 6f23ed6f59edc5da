//! Drive-Profile Simulator
//!
//! Synthetic producer cycling idle, accelerate, cruise and decelerate phases.
//! Frames go straight to the registry, bypassing the rate limiter, and the
//! simulator may run alongside a real Frame Source.

use crate::frame::{Frame, MonotonicClock};
use crate::registry::SubscriptionRegistry;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Steps in one full profile cycle
pub const PROFILE_STEPS: u32 = 400;

const BATTERY_ID: u32 = 0x132;
const SPEED_ID: u32 = 0x257;
const REPORT_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Tick period in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

fn default_tick_ms() -> u64 {
    100
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
        }
    }
}

/// Battery current (A) and vehicle speed (km/h) at a profile step
fn profile_point(step: u32) -> (f32, f32) {
    let step = step % PROFILE_STEPS;
    let phase_pos = (step % 100) as f32;
    match step / 100 {
        0 => (3.0, 0.0),
        1 => (30.0, phase_pos),
        2 => (30.0, 100.0),
        _ => (-20.0, 100.0 - phase_pos),
    }
}

/// The two frames published at `step`: HV battery current and UI speed
pub fn drive_profile_frames(step: u32) -> [Frame; 2] {
    let (amps, kph) = profile_point(step);

    let current = (-(amps * 10.0)) as i16;
    let [lo, hi] = current.to_le_bytes();
    let battery = [0x40, 0x9C, lo, hi, 0x00, 0x00, 0xFF, 0x0F];

    let raw = ((kph + 40.0) / 0.08 + 0.5) as u16;
    let speed = [0x00, (raw << 4) as u8, (raw >> 4) as u8, 0x00, 0x02, 0x00, 0x00, 0x00];

    [
        Frame::new(BATTERY_ID, &battery).unwrap_or_default(),
        Frame::new(SPEED_ID, &speed).unwrap_or_default(),
    ]
}

struct SimulatorInner {
    config: SimulatorConfig,
    registry: SubscriptionRegistry,
    clock: MonotonicClock,
    running: Mutex<Option<Arc<AtomicBool>>>,
}

/// Handle controlling the simulator task.
#[derive(Clone)]
pub struct Simulator {
    inner: Arc<SimulatorInner>,
}

impl Simulator {
    pub fn new(
        config: SimulatorConfig,
        registry: SubscriptionRegistry,
        clock: MonotonicClock,
    ) -> Self {
        Self {
            inner: Arc::new(SimulatorInner {
                config,
                registry,
                clock,
                running: Mutex::new(None),
            }),
        }
    }

    /// Start the generator task. Returns `false` if it was already running.
    pub fn start(&self) -> bool {
        let mut running = self
            .inner
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            return false;
        }
        let flag = Arc::new(AtomicBool::new(true));
        *running = Some(Arc::clone(&flag));
        drop(running);

        let registry = self.inner.registry.clone();
        let clock = self.inner.clock;
        let tick = Duration::from_millis(self.inner.config.tick_ms.max(1));
        tokio::spawn(generate(registry, clock, tick, flag));
        info!("Simulator started ({} ms tick)", tick.as_millis());
        true
    }

    /// Ask the generator to stop at its next tick. Returns `false` if idle.
    pub fn stop(&self) -> bool {
        let mut running = self
            .inner
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match running.take() {
            Some(flag) => {
                flag.store(false, Ordering::Release);
                info!("Simulator stop requested");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

async fn generate(
    registry: SubscriptionRegistry,
    clock: MonotonicClock,
    tick: Duration,
    running: Arc<AtomicBool>,
) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut step = 0u32;
    let mut sent = 0u64;
    let mut last_report = Instant::now();

    loop {
        interval.tick().await;
        if !running.load(Ordering::Acquire) {
            break;
        }

        for frame in drive_profile_frames(step) {
            registry.publish(clock.stamp(frame));
            sent += 1;
        }
        metrics::counter!("can_simulated_frames_total").increment(2);
        step = (step + 1) % PROFILE_STEPS;

        let elapsed = last_report.elapsed();
        if elapsed >= REPORT_INTERVAL {
            info!(
                "Simulator: {:.1} msg/s",
                sent as f64 / elapsed.as_secs_f64()
            );
            sent = 0;
            last_report = Instant::now();
        }
    }
    debug!("Simulator task exited at step {}", step);
}
