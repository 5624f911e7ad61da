// crates/mediaplex-engine/src/seeker.rs
//
// Idle → Scheduled → Running → Idle state machine. The actual
// `av_seek_frame` call happens under the pipeline's shared producer mutex,
// since the format context is also touched by the packet producer and the
// frame decoder and these must not run concurrently; that exclusion is
// enforced by the caller's stop_decoder → wait_seek_done → start_decoder
// protocol rather than by any locking done in here.

use std::sync::{Arc, Condvar, Mutex};

use mediaplex_core::PipelineError;

use crate::packet_producer::PipelineShared;
use crate::task::Task;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Phase {
    Idle,
    Scheduled,
    Running,
}

struct State {
    phase: Phase,
    target_pts: i64,
    error: Option<PipelineError>,
}

pub struct Seeker {
    producer: Arc<PipelineShared>,
    state: Arc<Mutex<State>>,
    cond: Arc<Condvar>,
    task: Option<Task>,
}

impl Seeker {
    pub fn new(producer: Arc<PipelineShared>) -> Self {
        Self {
            producer,
            state: Arc::new(Mutex::new(State {
                phase: Phase::Idle,
                target_pts: 0,
                error: None,
            })),
            cond: Arc::new(Condvar::new()),
            task: None,
        }
    }

    /// Stage a target position. Callers must be Idle first — `wait()` first
    /// if a seek is already outstanding.
    pub fn set_position(&self, pts_us: i64) {
        let mut state = self.state.lock().unwrap();
        debug_assert_eq!(state.phase, Phase::Idle, "seek already outstanding");
        state.target_pts = pts_us;
        state.phase = Phase::Scheduled;
    }

    /// Scheduled → Running: spins up the background seek.
    pub fn start(&mut self) {
        let target_pts = {
            let mut state = self.state.lock().unwrap();
            debug_assert_eq!(state.phase, Phase::Scheduled, "start() without set_position()");
            state.phase = Phase::Running;
            state.target_pts
        };

        if let Some(mut task) = self.task.take() {
            task.join();
        }

        let producer = Arc::clone(&self.producer);
        let state = Arc::clone(&self.state);
        let cond = Arc::clone(&self.cond);
        self.task = Some(Task::spawn("seeker", move || {
            let result = {
                let mut pstate = producer.state.lock().unwrap();
                pstate.demux.seek(target_pts)
            };
            let mut state = state.lock().unwrap();
            state.error = result.err();
            state.phase = Phase::Idle;
            cond.notify_all();
        }));
    }

    /// Blocks until Idle; returns the seek's error, if any.
    pub fn wait(&mut self) -> Option<PipelineError> {
        let mut state = self.state.lock().unwrap();
        while state.phase != Phase::Idle {
            state = self.cond.wait(state).unwrap();
        }
        let error = state.error.take();
        drop(state);
        if let Some(mut task) = self.task.take() {
            task.join();
        }
        error
    }

    pub fn is_idle(&self) -> bool {
        self.state.lock().unwrap().phase == Phase::Idle
    }
}
