// crates/mediaplex-engine/src/task.rs
//
// Every background worker here is a join-able handle kept separate from the
// mutex-guarded record it shares with its caller, rather than a thread
// object that also carries that state itself.

use std::thread::JoinHandle;

/// A background worker's join handle, nothing else. The shared state it
/// operates on lives in an `Arc` held independently by both the task and
/// whoever constructed it.
pub struct Task {
    handle: Option<JoinHandle<()>>,
}

impl Task {
    pub fn spawn<F>(name: &str, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(f)
            .expect("failed to spawn background task");
        Self {
            handle: Some(handle),
        }
    }

    /// Blocks until the task exits. Idempotent — a second call is a no-op.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_spawned(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        self.join();
    }
}
