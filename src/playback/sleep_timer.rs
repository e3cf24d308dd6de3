//! Sleep-timer worker (spec §4.7): fades the master volume to zero and
//! stops playback after a delay, restoring the pre-fade level afterwards.

use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const FADE_DURATION: Duration = Duration::from_secs(30);
const FADE_STEPS: u32 = 20;
const CANCEL_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Anything that can report and set the master output level. Implemented by
/// `VolumeManager`; kept as a trait here so this module has no upward
/// dependency on it.
pub trait VolumeSink: Send + Sync {
    fn current_level(&self) -> u8;
    fn set_level(&self, level: u8);
}

/// Anything the timer can stop playback on. Implemented by
/// `PlaybackController`.
pub trait StopTarget: Send + Sync {
    fn stop(&self);
}

struct RunningTimer {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Single worker slot (spec §5 "a sleep-timer worker of size at most one").
pub struct SleepTimer {
    running: Mutex<Option<RunningTimer>>,
}

impl Default for SleepTimer {
    fn default() -> Self {
        Self {
            running: Mutex::new(None),
        }
    }
}

impl SleepTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel any existing timer, then start a new one for `minutes`.
    pub fn start(
        &self,
        minutes: u32,
        volume: Arc<dyn VolumeSink>,
        stop_target: Arc<dyn StopTarget>,
    ) {
        let mut guard = self.running.lock().unwrap();
        Self::cancel_locked(&mut guard);

        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_for_thread = cancel.clone();
        let sleep_before_fade = (minutes as u64).saturating_mul(60).saturating_sub(30);

        let handle = thread::spawn(move || {
            run_fade_cycle(sleep_before_fade, cancel_for_thread, volume, stop_target);
        });

        *guard = Some(RunningTimer { cancel, handle });
        info!("sleep timer armed for {minutes} minutes");
    }

    /// Cancel any running timer (spec §4.7 "cancel any existing sleep thread
    /// atomically under a single lock acquisition").
    pub fn cancel(&self) {
        let mut guard = self.running.lock().unwrap();
        Self::cancel_locked(&mut guard);
    }

    fn cancel_locked(guard: &mut Option<RunningTimer>) {
        if let Some(timer) = guard.take() {
            timer.cancel.store(true, Ordering::SeqCst);
            let start = Instant::now();
            while !timer.handle.is_finished() && start.elapsed() < CANCEL_JOIN_TIMEOUT {
                thread::sleep(Duration::from_millis(20));
            }
            if !timer.handle.is_finished() {
                warn!("sleep timer thread did not terminate within {CANCEL_JOIN_TIMEOUT:?}");
            }
        }
    }
}

fn run_fade_cycle(
    sleep_before_fade: u64,
    cancel: Arc<AtomicBool>,
    volume: Arc<dyn VolumeSink>,
    stop_target: Arc<dyn StopTarget>,
) {
    if !sleep_cancellable(Duration::from_secs(sleep_before_fade), &cancel) {
        return;
    }

    let pre_fade_level = volume.current_level();
    let step_duration = FADE_DURATION / FADE_STEPS;

    for step in 1..=FADE_STEPS {
        if cancel.load(Ordering::SeqCst) {
            return;
        }
        let remaining_fraction = 1.0 - (step as f32 / FADE_STEPS as f32);
        let level = (pre_fade_level as f32 * remaining_fraction).round() as u8;
        volume.set_level(level);
        if !sleep_cancellable(step_duration, &cancel) {
            return;
        }
    }

    if cancel.load(Ordering::SeqCst) {
        return;
    }

    volume.set_level(0);
    stop_target.stop();
    volume.set_level(pre_fade_level);
    info!("sleep timer fired: playback stopped, volume restored to {pre_fade_level}");
}

/// Sleeps in small increments so cancellation is observed promptly; returns
/// `false` if cancelled mid-sleep.
fn sleep_cancellable(total: Duration, cancel: &AtomicBool) -> bool {
    let step = Duration::from_millis(50);
    let mut elapsed = Duration::ZERO;
    while elapsed < total {
        if cancel.load(Ordering::SeqCst) {
            return false;
        }
        let remaining = total - elapsed;
        thread::sleep(remaining.min(step));
        elapsed += step;
    }
    !cancel.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU8;

    struct TestVolume {
        level: AtomicU8,
        history: Mutex<Vec<u8>>,
    }

    impl VolumeSink for TestVolume {
        fn current_level(&self) -> u8 {
            self.level.load(Ordering::SeqCst)
        }
        fn set_level(&self, level: u8) {
            self.level.store(level, Ordering::SeqCst);
            self.history.lock().unwrap().push(level);
        }
    }

    struct TestStop {
        stopped: AtomicBool,
    }

    impl StopTarget for TestStop {
        fn stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn cancel_before_fire_prevents_fade() {
        let volume = Arc::new(TestVolume {
            level: AtomicU8::new(50),
            history: Mutex::new(Vec::new()),
        });
        let stop = Arc::new(TestStop {
            stopped: AtomicBool::new(false),
        });
        let timer = SleepTimer::new();
        timer.start(60, volume.clone(), stop.clone());
        timer.cancel();
        thread::sleep(Duration::from_millis(100));
        assert!(!stop.stopped.load(Ordering::SeqCst));
        assert_eq!(volume.current_level(), 50);
    }

    #[test]
    fn starting_a_new_timer_cancels_the_previous_one() {
        let volume = Arc::new(TestVolume {
            level: AtomicU8::new(40),
            history: Mutex::new(Vec::new()),
        });
        let stop = Arc::new(TestStop {
            stopped: AtomicBool::new(false),
        });
        let timer = SleepTimer::new();
        timer.start(120, volume.clone(), stop.clone());
        timer.start(120, volume.clone(), stop.clone());
        timer.cancel();
        thread::sleep(Duration::from_millis(100));
        assert!(!stop.stopped.load(Ordering::SeqCst));
    }
}
