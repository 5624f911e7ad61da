// crates/mediaplex-engine/src/preloader.rs
//
// Playlist lifecycle manager. TicketProducer/TicketDeleter are
// single-threaded workers fed through crossbeam channels — the same
// bounded/unbounded-queue-plus-background-thread idiom velocut_media::worker
// uses for its playback and probe pipelines, generalized here to ticket
// construction/destruction instead of frame requests.
//
// `Ticket` is a plain Mutex+Condvar one-shot rather than an unsynchronized
// flag a reader would have to spin-probe: there is no lock-free peek at
// `provider` anywhere, only `ensure()`, which blocks under the lock until
// the producer has published a result.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};

use crossbeam_channel::{unbounded, Sender};

use mediaplex_core::OpenError;

use crate::config::PipelineConfig;
use crate::frame_provider::FrameProvider;
use crate::task::Task;

type TicketResult = Result<FrameProvider, OpenError>;

/// A placeholder for a not-yet-constructed pipeline that becomes realized
/// asynchronously.
pub struct Ticket {
    path: PathBuf,
    slot: Mutex<Option<TicketResult>>,
    cond: Condvar,
}

impl Ticket {
    fn new(path: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            path,
            slot: Mutex::new(None),
            cond: Condvar::new(),
        })
    }

    fn fill(&self, result: TicketResult) {
        let mut slot = self.slot.lock().unwrap();
        *slot = Some(result);
        self.cond.notify_all();
    }

    /// Blocks until the producer has published a result, successful or not.
    pub fn ensure(&self) {
        let mut slot = self.slot.lock().unwrap();
        while slot.is_none() {
            slot = self.cond.wait(slot).unwrap();
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.slot.lock().unwrap(), Some(Ok(_)))
    }
}

struct PlayEntry {
    path: PathBuf,
    ticket_queue: VecDeque<Arc<Ticket>>,
    available_count: usize,
}

impl PlayEntry {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            ticket_queue: VecDeque::new(),
            available_count: 0,
        }
    }
}

pub struct Preloader {
    entries: Vec<PlayEntry>,
    current_index: usize,
    max_preload_count: usize,
    config: PipelineConfig,
    to_producer: Sender<Arc<Ticket>>,
    to_deleter: Sender<Arc<Ticket>>,
    _producer_task: Task,
    _deleter_task: Task,
}

impl Preloader {
    pub fn new(config: PipelineConfig) -> Self {
        let (to_producer, from_preloader) = unbounded::<Arc<Ticket>>();
        let (to_deleter, for_deletion) = unbounded::<Arc<Ticket>>();

        let producer_config = config.clone();
        let producer_task = Task::spawn("ticket-producer", move || {
            for ticket in from_preloader {
                let result = FrameProvider::open(&ticket.path, &producer_config).map(|mut p| {
                    p.start_decoder(true);
                    p
                });
                ticket.fill(result);
            }
        });

        let deleter_task = Task::spawn("ticket-deleter", move || {
            for ticket in for_deletion {
                ticket.ensure();
                // Dropping the realized FrameProvider here (if any) runs its
                // own interrupt+join — blocking this dedicated thread, never
                // the consumer.
            }
        });

        Self {
            entries: Vec::new(),
            current_index: 0,
            max_preload_count: 3,
            config,
            to_producer,
            to_deleter,
            _producer_task: producer_task,
            _deleter_task: deleter_task,
        }
    }

    pub fn set_max_preload_count(&mut self, n: usize) {
        self.max_preload_count = n;
        self.preload();
    }

    pub fn max_preload_count(&self) -> usize {
        self.max_preload_count
    }

    /// The enable_audio/enable_video pair applied to every entry — one pair
    /// for the whole playlist, set at construction, not per-`add()`.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn add(&mut self, path: PathBuf) {
        self.entries.push(PlayEntry::new(path));
        self.preload();
    }

    pub fn insert(&mut self, index: usize, path: PathBuf) {
        self.entries.insert(index, PlayEntry::new(path));
        if index <= self.current_index && self.entries.len() > 1 {
            self.current_index += 1;
        }
        self.preload();
    }

    pub fn delete(&mut self, index: usize) {
        if index >= self.entries.len() {
            return;
        }
        let mut entry = self.entries.remove(index);
        while let Some(ticket) = entry.ticket_queue.pop_front() {
            let _ = self.to_deleter.send(ticket);
        }
        if self.entries.is_empty() {
            self.current_index = 0;
        } else if index < self.current_index {
            self.current_index -= 1;
        } else if self.current_index >= self.entries.len() {
            self.current_index = self.entries.len() - 1;
        }
        self.preload();
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn path_at(&self, index: usize) -> Option<&Path> {
        self.entries.get(index).map(|e| e.path.as_path())
    }

    /// Number of tickets currently scheduled (realized or in-flight) across
    /// the whole playlist. Should equal `min(max_preload_count,
    /// play_queue_size)` whenever the playlist is at least that long.
    pub fn scheduled_ticket_count(&self) -> usize {
        self.entries.iter().map(|e| e.ticket_queue.len()).sum()
    }

    /// Recomputes the preload window starting at the current track.
    /// Intentionally revisits the same entry more than once (and schedules a
    /// second ticket for it) when the playlist is shorter than
    /// `max_preload_count` — see DESIGN.md for why that duplication is kept
    /// rather than capped.
    fn preload(&mut self) {
        for entry in &mut self.entries {
            entry.available_count = 0;
        }
        let n = self.entries.len();
        if n == 0 {
            return;
        }

        let mut idx = self.current_index % n;
        for _ in 0..self.max_preload_count {
            let entry = &mut self.entries[idx];
            entry.available_count += 1;
            if entry.ticket_queue.len() < entry.available_count {
                let ticket = Ticket::new(entry.path.clone());
                entry.ticket_queue.push_back(Arc::clone(&ticket));
                let _ = self.to_producer.send(ticket);
            }
            idx = (idx + 1) % n;
        }

        for entry in &mut self.entries {
            while entry.ticket_queue.len() > entry.available_count {
                if let Some(ticket) = entry.ticket_queue.pop_back() {
                    let _ = self.to_deleter.send(ticket);
                }
            }
        }
    }

    fn advance_on_eof(&mut self) {
        if let Some(entry) = self.entries.get_mut(self.current_index) {
            if let Some(ticket) = entry.ticket_queue.pop_front() {
                let _ = self.to_deleter.send(ticket);
            }
        }
        if !self.entries.is_empty() {
            self.current_index = (self.current_index + 1) % self.entries.len();
        }
        self.preload();
    }

    /// Access the current entry's realized `FrameProvider`, skipping past
    /// entries whose open failed. Takes a closure rather than returning a
    /// reference directly: the provider lives behind a ticket's mutex, and
    /// that guard can't outlive this call.
    pub fn with_current_provider<R>(&mut self, f: impl FnOnce(&mut FrameProvider) -> R) -> Option<R> {
        let attempts = self.entries.len().max(1);
        for _ in 0..attempts {
            let ticket = self.entries.get(self.current_index)?.ticket_queue.front().cloned();
            let Some(ticket) = ticket else {
                self.advance_on_eof();
                continue;
            };
            ticket.ensure();
            let mut slot = ticket.slot.lock().unwrap();
            match slot.as_mut() {
                Some(Ok(provider)) => return Some(f(provider)),
                _ => {
                    drop(slot);
                    self.advance_on_eof();
                }
            }
        }
        None
    }

    /// `preloader.next_frame()`: pulls from the current track, advancing the
    /// playlist on EOF or on a ticket that never opened.
    pub fn next_frame(&mut self) -> bool {
        let attempts = self.entries.len().max(1);
        for _ in 0..attempts {
            if self.entries.is_empty() {
                return false;
            }
            let ticket = self.entries[self.current_index].ticket_queue.front().cloned();
            let Some(ticket) = ticket else {
                self.advance_on_eof();
                continue;
            };
            ticket.ensure();
            let advanced = {
                let mut slot = ticket.slot.lock().unwrap();
                match slot.as_mut() {
                    Some(Ok(provider)) => {
                        if provider.next_frame() {
                            return true;
                        }
                        true
                    }
                    _ => true,
                }
            };
            if advanced {
                self.advance_on_eof();
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_ensure_waits_for_fill() {
        let ticket = Ticket::new(PathBuf::from("clip.mkv"));
        let t2 = Arc::clone(&ticket);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(10));
            t2.fill(Err(OpenError::NoStream {
                path: PathBuf::from("clip.mkv"),
            }));
        });
        ticket.ensure();
        assert!(!ticket.is_open());
        handle.join().unwrap();
    }

    #[test]
    fn preload_window_sizing_without_ffmpeg_io() {
        // Exercises the preload window's bookkeeping without constructing a
        // real FrameProvider, which needs a real media file to open.
        let mut preloader = Preloader::new(PipelineConfig::default());
        for i in 0..5 {
            preloader.entries.push(PlayEntry::new(PathBuf::from(format!("{i}.mkv"))));
        }
        preloader.max_preload_count = 3;
        preloader.preload();
        let scheduled: usize = preloader.entries.iter().map(|e| e.ticket_queue.len()).sum();
        assert_eq!(scheduled, 3);
        assert_eq!(preloader.entries[0].ticket_queue.len(), 1);
        assert_eq!(preloader.entries[3].ticket_queue.len(), 0);
    }

    #[test]
    fn preload_window_duplicates_when_queue_smaller_than_window() {
        let mut preloader = Preloader::new(PipelineConfig::default());
        preloader.entries.push(PlayEntry::new(PathBuf::from("only.mkv")));
        preloader.max_preload_count = 3;
        preloader.preload();
        // Single entry, window of 3: available_count reaches 3, so the one
        // entry schedules three tickets — the intentional duplication
        // documented on `preload()` above.
        assert_eq!(preloader.entries[0].ticket_queue.len(), 3);
    }

    #[test]
    fn advance_on_eof_shifts_the_window_by_one() {
        let mut preloader = Preloader::new(PipelineConfig::default());
        for i in 0..5 {
            preloader.entries.push(PlayEntry::new(PathBuf::from(format!("{i}.mkv"))));
        }
        preloader.max_preload_count = 3;
        preloader.preload();
        assert_eq!(preloader.current_index(), 0);

        preloader.advance_on_eof();

        assert_eq!(preloader.current_index(), 1);
        assert_eq!(preloader.entries[0].ticket_queue.len(), 0);
        assert_eq!(preloader.entries[1].ticket_queue.len(), 1);
        assert_eq!(preloader.entries[2].ticket_queue.len(), 1);
        assert_eq!(preloader.entries[3].ticket_queue.len(), 1);
        assert_eq!(preloader.entries[4].ticket_queue.len(), 0);
    }

    #[test]
    fn delete_removes_only_the_targeted_entrys_tickets() {
        let mut preloader = Preloader::new(PipelineConfig::default());
        for i in 0..5 {
            preloader.entries.push(PlayEntry::new(PathBuf::from(format!("{i}.mkv"))));
        }
        preloader.max_preload_count = 3;
        preloader.preload();

        preloader.delete(1);

        assert_eq!(preloader.size(), 4);
        assert_eq!(preloader.path_at(1), Some(Path::new("2.mkv")));
        // entry that was index 2 (now index 1) keeps a scheduled ticket.
        assert_eq!(preloader.entries[1].ticket_queue.len(), 1);
    }
}
