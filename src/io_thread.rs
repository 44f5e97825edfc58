//! `IoThread`: a worker thread with active/launched flags and join
//! semantics (spec section 2/5). `Player` owns exactly two of these
//! (input, output).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Flags shared between the owning `Player` and the worker thread's
/// closure, so the thread can observe `active` going false without a
/// message queue.
#[derive(Default)]
pub struct IoFlags {
    active: AtomicBool,
}

impl IoFlags {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }
}

/// Owns a worker thread's join handle and its shared active flag.
/// `launch` spawns, `stop` clears `active`, `finish` joins. Stopping an
/// already-stopped thread, or finishing an already-joined one, is a no-op
/// (spec section 5's "double-finish is idempotent").
pub struct IoThread {
    flags: Arc<IoFlags>,
    handle: Option<JoinHandle<()>>,
    launched: bool,
}

impl Default for IoThread {
    fn default() -> Self {
        Self {
            flags: Arc::new(IoFlags::default()),
            handle: None,
            launched: false,
        }
    }
}

impl IoThread {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_launched(&self) -> bool {
        self.launched
    }

    pub fn is_active(&self) -> bool {
        self.flags.is_active()
    }

    pub fn flags(&self) -> Arc<IoFlags> {
        Arc::clone(&self.flags)
    }

    /// Spawn `body`, which should loop while `flags.is_active()`.
    pub fn launch(&mut self, body: impl FnOnce(Arc<IoFlags>) + Send + 'static) {
        if self.launched {
            return;
        }
        self.flags.set_active(true);
        let flags = Arc::clone(&self.flags);
        self.handle = Some(std::thread::spawn(move || body(flags)));
        self.launched = true;
    }

    /// Clear the active flag; the worker observes it on its next check.
    pub fn stop(&self) {
        self.flags.set_active(false);
    }

    /// Join the worker, if any, and mark this `IoThread` ready to relaunch.
    pub fn finish(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.launched = false;
    }
}

impl Drop for IoThread {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn launch_runs_until_stop_then_finish_joins() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut io = IoThread::new();
        let counter_clone = Arc::clone(&counter);
        io.launch(move |flags| {
            while flags.is_active() {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(1));
            }
        });
        std::thread::sleep(Duration::from_millis(20));
        io.finish();
        assert!(counter.load(Ordering::SeqCst) > 0);
        assert!(!io.is_launched());
    }

    #[test]
    fn double_finish_is_idempotent() {
        let mut io = IoThread::new();
        io.launch(|flags| {
            while flags.is_active() {
                std::thread::sleep(Duration::from_millis(1));
            }
        });
        io.finish();
        io.finish();
    }
}
