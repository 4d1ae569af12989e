//! Dedicated simulation thread stepping a shared [`PhysicsEngine`] at the
//! fixed rate of its configuration.

use std::any::Any;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::{
    debug::DebugContext,
    error::{FatalInvariantViolation, PhysicsError, PhysicsResult},
    utils::logging::warn_if_frame_budget_exceeded,
    world::PhysicsEngine,
};

struct Shared {
    exit: AtomicBool,
    paused: AtomicBool,
    error: Mutex<Option<PhysicsError>>,
}

/// Handle of the running simulation thread.
///
/// The engine is write-locked for one fixed step at a time; readers take
/// the shared lock in between to copy poses.
pub struct PhysicsLoop {
    engine: Arc<RwLock<PhysicsEngine>>,
    debug: Arc<Mutex<DebugContext>>,
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl PhysicsLoop {
    pub fn spawn(engine: Arc<RwLock<PhysicsEngine>>) -> std::io::Result<Self> {
        let debug = Arc::new(Mutex::new(DebugContext::new()));
        let shared = Arc::new(Shared {
            exit: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            error: Mutex::new(None),
        });
        let thread = {
            let engine = Arc::clone(&engine);
            let debug = Arc::clone(&debug);
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("physics".into())
                .spawn(move || run(&engine, &debug, &shared))?
        };
        Ok(Self {
            engine,
            debug,
            shared,
            thread: Some(thread),
        })
    }

    pub fn engine(&self) -> &Arc<RwLock<PhysicsEngine>> {
        &self.engine
    }

    /// Beacons of the last frames; the renderer drains them.
    pub fn debug(&self) -> &Arc<Mutex<DebugContext>> {
        &self.debug
    }

    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }

    /// Whether the thread has left its loop, either stopped or failed.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Requests the loop to exit after the current step and waits for it.
    pub fn stop_and_join(mut self) -> PhysicsResult<()> {
        self.shared.exit.store(true, Ordering::Release);
        self.join_thread()
    }

    /// Waits for the loop to exit on its own, which only happens after a
    /// fatal error.
    pub fn join(mut self) -> PhysicsResult<()> {
        self.join_thread()
    }

    fn join_thread(&mut self) -> PhysicsResult<()> {
        let panicked = match self.thread.take().map(JoinHandle::join) {
            Some(Err(payload)) => Some(panic_message(payload.as_ref())),
            _ => None,
        };
        if let Some(err) = self.shared.error.lock().take() {
            return Err(err);
        }
        match panicked {
            Some(message) => {
                log::error!("physics thread panicked: {message}");
                Err(FatalInvariantViolation::ThreadPanicked { message }.into())
            }
            None => Ok(()),
        }
    }
}

impl Drop for PhysicsLoop {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.shared.exit.store(true, Ordering::Release);
            let _ = self.join_thread();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn run(engine: &RwLock<PhysicsEngine>, debug: &Mutex<DebugContext>, shared: &Shared) {
    let (dt, fps_control, max_residual) = {
        let engine = engine.read();
        let config = engine.config();
        (
            config.dt,
            config.fps_control,
            Duration::from_secs_f32(config.max_residual_time),
        )
    };
    let period = Duration::from_secs_f32(dt);
    log::info!("physics loop started at {:.1} Hz", 1.0 / dt);

    let mut time = engine.read().static_world().time;
    let mut reference = Instant::now();
    let mut frames: u32 = 0;

    while !shared.exit.load(Ordering::Acquire) {
        if shared.paused.load(Ordering::Acquire) {
            thread::sleep(period);
            reference = Instant::now();
            frames = 0;
            continue;
        }

        let started = Instant::now();
        let result = {
            let mut engine = engine.write();
            let mut debug = debug.lock();
            engine.advance_time(dt, time, Some(&mut *debug))
        };
        if let Err(err) = result {
            log::error!("physics loop stopped: {err}");
            *shared.error.lock() = Some(err);
            break;
        }
        time += f64::from(dt);
        warn_if_frame_budget_exceeded(started.elapsed(), period);

        if !fps_control {
            continue;
        }
        frames += 1;
        let target = reference + period * frames;
        let now = Instant::now();
        if now < target {
            thread::sleep(target - now);
        } else if now - target > max_residual {
            // Too far behind; drop the backlog instead of catching up.
            log::debug!("physics loop dropped {:?} of backlog", now - target);
            reference = now;
            frames = 0;
        }
    }
    log::info!("physics loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhysicsEngineConfig;

    #[test]
    fn loop_advances_and_stops() {
        let engine = PhysicsEngine::new(PhysicsEngineConfig {
            burn_in_duration: 0.0,
            ..Default::default()
        })
        .unwrap();
        let engine = Arc::new(RwLock::new(engine));
        let physics = PhysicsLoop::spawn(Arc::clone(&engine)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while engine.read().frame() < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        physics.stop_and_join().unwrap();
        assert!(engine.read().frame() >= 3);
    }
}
