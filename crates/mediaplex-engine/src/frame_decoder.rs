// crates/mediaplex-engine/src/frame_decoder.rs
//
// Background decode-drain-loop. The drain pass locks its own state
// (decoders) and nests a lock on the PacketProducer's shared state (queues)
// for the duration of that pass, then releases the producer lock before
// sleeping on its own condition.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

use mediaplex_core::PipelineError;

use crate::ffi::decoder::{RawDecoder, ReceiveOutcome, SendOutcome};
use crate::ffi::frame::RawFrame;
use crate::packet_producer::{self, PipelineShared};
use crate::task::Task;

pub struct DecoderState {
    decoders: HashMap<usize, RawDecoder>,
    pub(crate) fully_started: bool,
    pub(crate) running: bool,
    interrupted: bool,
    error: Option<PipelineError>,
}

pub struct FrameDecoderShared {
    state: Mutex<DecoderState>,
    cond: Condvar,
    producer: Arc<PipelineShared>,
}

pub struct FrameDecoder {
    shared: Arc<FrameDecoderShared>,
    task: Option<Task>,
}

impl FrameDecoder {
    pub fn new(producer: Arc<PipelineShared>, decoders: HashMap<usize, RawDecoder>) -> Self {
        let shared = Arc::new(FrameDecoderShared {
            state: Mutex::new(DecoderState {
                decoders,
                fully_started: false,
                running: false,
                interrupted: false,
                error: None,
            }),
            cond: Condvar::new(),
            producer,
        });
        Self { shared, task: None }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub fn start(&mut self) {
        if self.task.is_some() {
            log::error!("frame decoder already running");
            return;
        }
        {
            let mut state = self.shared.state.lock().unwrap();
            state.interrupted = false;
        }
        let shared = Arc::clone(&self.shared);
        self.task = Some(Task::spawn("frame-decoder", move || run(shared)));
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

    pub fn join(&mut self) {
        if let Some(mut task) = self.task.take() {
            task.join();
        }
    }

    pub fn take_error(&self) -> Option<PipelineError> {
        self.shared.state.lock().unwrap().error.clone()
    }

    /// Blocking frame pull. `Ok(None)` is EOF.
    pub fn get_frame(&self, stream: usize) -> Result<Option<RawFrame>, PipelineError> {
        loop {
            let mut state = self.shared.state.lock().unwrap();
            while !state.fully_started && state.running {
                state = self.shared.cond.wait(state).unwrap();
            }

            let outcome = match state.decoders.get_mut(&stream) {
                Some(dec) => dec.receive_frame(),
                None => return Ok(None),
            };

            match outcome {
                ReceiveOutcome::Frame(frame) => {
                    drop(state);
                    self.shared.cond.notify_all();
                    return Ok(Some(frame));
                }
                ReceiveOutcome::Eof => return Ok(None),
                ReceiveOutcome::TryAgain => {
                    if !state.running {
                        log::warn!(
                            "stream {stream}: decoder task terminated while a frame was pending"
                        );
                        return Ok(None);
                    }
                    let _ = self.shared.cond.wait(state).unwrap();
                }
                ReceiveOutcome::Error(e) => return Err(e),
            }
        }
    }
}

impl Drop for FrameDecoder {
    fn drop(&mut self) {
        self.request_interruption();
        self.join();
    }
}

fn run(shared: Arc<FrameDecoderShared>) {
    {
        let mut state = shared.state.lock().unwrap();
        for dec in state.decoders.values_mut() {
            dec.flush();
        }
        state.running = true;
    }

    {
        let mut pstate = shared.producer.state.lock().unwrap();
        while !pstate.fully_started && pstate.running {
            pstate = shared.producer.cond.wait(pstate).unwrap();
        }
    }

    loop {
        let mut state = shared.state.lock().unwrap();
        if state.interrupted {
            break;
        }

        let stream_count = state.decoders.len();
        let mut eof_count = 0usize;

        {
            let mut pstate = shared.producer.state.lock().unwrap();
            let indices: Vec<usize> = state.decoders.keys().copied().collect();

            for idx in indices {
                loop {
                    let (new_pstate, pkt) =
                        packet_producer::get_packet(&shared.producer, pstate, idx);
                    pstate = new_pstate;

                    match pkt {
                        None => {
                            if let Some(dec) = state.decoders.get_mut(&idx) {
                                let _ = dec.send_packet(None);
                            }
                            eof_count += 1;
                            break;
                        }
                        Some(packet) => {
                            let dec = state.decoders.get_mut(&idx).unwrap();
                            match dec.send_packet(Some(&packet)) {
                                SendOutcome::Sent => {}
                                SendOutcome::TryAgain => {
                                    packet_producer::return_packet(
                                        &mut pstate,
                                        idx,
                                        Some(packet),
                                    );
                                    break;
                                }
                                SendOutcome::UnexpectedEof => {
                                    log::warn!("stream {idx}: decoder returned EOF on send_packet");
                                }
                                SendOutcome::Error(e) => {
                                    log::error!("stream {idx}: send_packet failed: {e}");
                                    state.error = Some(e);
                                }
                            }
                        }
                    }
                }
            }

            shared.producer.cond.notify_all();
        }

        if eof_count == stream_count {
            state.running = false;
            state.fully_started = true;
            shared.cond.notify_all();
            return;
        }

        state.fully_started = true;
        shared.cond.notify_all();
        let _ = shared.cond.wait(state).unwrap();
    }

    state_cleanup(&shared);
}

fn state_cleanup(shared: &FrameDecoderShared) {
    let mut state = shared.state.lock().unwrap();
    state.running = false;
    shared.cond.notify_all();
}
