// crates/mediaplex-engine/src/packet_producer.rs
//
// Background demux fill-loop. `PipelineShared` is a jointly owned value:
// FrameDecoder locks the same mutex for its drain pass instead of reaching
// through a pointer to this struct.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use mediaplex_core::PipelineError;

use crate::ffi::demux::DemuxContext;
use crate::packet_queue::PacketQueue;
use crate::task::Task;

pub struct ProducerState {
    pub(crate) demux: DemuxContext,
    queues: HashMap<usize, PacketQueue>,
    queue_size: usize,
    pub(crate) fully_started: bool,
    /// True while the fill-loop thread is alive; distinct from
    /// `fully_started`: the two cycle independently, since a fully-started
    /// producer can still stop running on EOF or error.
    pub(crate) running: bool,
    interrupted: bool,
    error: Option<PipelineError>,
}

impl ProducerState {
    fn min_queue_len(&self) -> usize {
        self.queues.values().map(PacketQueue::len).min().unwrap_or(0)
    }
}

pub struct PipelineShared {
    pub(crate) state: Mutex<ProducerState>,
    pub(crate) cond: Condvar,
}

impl PipelineShared {
    pub fn new(demux: DemuxContext, stream_indices: &[usize], queue_size: usize) -> Arc<Self> {
        let queues = stream_indices
            .iter()
            .map(|&i| (i, PacketQueue::new()))
            .collect();
        Arc::new(Self {
            state: Mutex::new(ProducerState {
                demux,
                queues,
                queue_size,
                fully_started: false,
                running: false,
                interrupted: false,
                error: None,
            }),
            cond: Condvar::new(),
        })
    }
}

/// Blocking packet pull, called by FrameDecoder while already holding
/// `shared.state`'s lock. Takes and returns the guard because a wait has to
/// release and reacquire it.
pub(crate) fn get_packet<'a>(
    shared: &'a PipelineShared,
    mut state: MutexGuard<'a, ProducerState>,
    stream: usize,
) -> (MutexGuard<'a, ProducerState>, Option<crate::ffi::demux::RawPacket>) {
    loop {
        if let Some(q) = state.queues.get_mut(&stream) {
            if !q.is_empty() {
                return (state, q.dequeue().unwrap());
            }
        }
        if state.running {
            shared.cond.notify_all();
            state = shared.cond.wait(state).unwrap();
            continue;
        }
        return (state, None);
    }
}

pub(crate) fn return_packet(
    state: &mut ProducerState,
    stream: usize,
    pkt: Option<crate::ffi::demux::RawPacket>,
) {
    if let Some(q) = state.queues.get_mut(&stream) {
        q.push_back(pkt);
    }
}

pub(crate) fn clear(state: &mut ProducerState) {
    for q in state.queues.values_mut() {
        q.drain();
    }
}

pub struct PacketProducer {
    shared: Arc<PipelineShared>,
    task: Option<Task>,
}

impl PacketProducer {
    pub fn new(shared: Arc<PipelineShared>) -> Self {
        Self { shared, task: None }
    }

    pub fn shared(&self) -> &Arc<PipelineShared> {
        &self.shared
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub fn start(&mut self) {
        if self.task.is_some() {
            log::error!("packet producer already running");
            return;
        }
        {
            let mut state = self.shared.state.lock().unwrap();
            state.interrupted = false;
        }
        let shared = Arc::clone(&self.shared);
        self.task = Some(Task::spawn("packet-producer", move || run(shared)));
    }

    pub fn wait_fully_started(&self) {
        let mut state = self.shared.state.lock().unwrap();
        while !state.fully_started && state.running {
            state = self.shared.cond.wait(state).unwrap();
        }
    }

    pub fn request_interruption(&self) {
        let mut state = self.shared.state.lock().unwrap();
        state.interrupted = true;
        self.shared.cond.notify_all();
    }

    pub fn clear(&self) {
        let mut state = self.shared.state.lock().unwrap();
        clear(&mut state);
    }

    pub fn join(&mut self) {
        if let Some(mut task) = self.task.take() {
            task.join();
        }
    }

    pub fn take_error(&self) -> Option<PipelineError> {
        self.shared.state.lock().unwrap().error.clone()
    }
}

impl Drop for PacketProducer {
    fn drop(&mut self) {
        self.request_interruption();
        self.join();
    }
}

fn run(shared: Arc<PipelineShared>) {
    let mut state = shared.state.lock().unwrap();
    state.running = true;
    state.fully_started = false;

    loop {
        if state.interrupted {
            break;
        }

        while state.min_queue_len() < state.queue_size && !state.interrupted {
            match state.demux.read_packet() {
                Ok(None) => {
                    let indices: Vec<usize> = state.queues.keys().copied().collect();
                    for idx in indices {
                        state.queues.get_mut(&idx).unwrap().enqueue(None);
                    }
                    state.running = false;
                    state.fully_started = true;
                    shared.cond.notify_all();
                    return;
                }
                Ok(Some(packet)) => {
                    let idx = packet.stream_index();
                    if let Some(q) = state.queues.get_mut(&idx) {
                        q.enqueue(Some(packet));
                    }
                    // else: packet belongs to an unselected stream, released by drop.
                }
                Err(e) => {
                    log::error!("packet producer: demux error: {e}");
                    state.error = Some(e);
                    state.running = false;
                    shared.cond.notify_all();
                    return;
                }
            }
        }

        if state.interrupted {
            break;
        }

        state.fully_started = true;
        shared.cond.notify_all();

        while !state.interrupted && state.min_queue_len() >= state.queue_size {
            state = shared.cond.wait(state).unwrap();
        }
    }

    state.running = false;
    shared.cond.notify_all();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_queue_len_is_zero_with_no_streams() {
        // Locks in the empty-map edge case: a selection with neither an
        // audio nor a video stream must not make the fill loop spin.
        let queues: HashMap<usize, PacketQueue> = HashMap::new();
        assert_eq!(queues.values().map(PacketQueue::len).min(), None);
    }
}
