//! Worker-thread contract (§5) for the parallel-threads scheduling model.
//!
//! Grounded in `port_thread.h`'s `thread_new`/`thread_del`/`thread_kill`
//! shape; `thread_sleep`/`thread_exit` have no Rust counterpart since the
//! hosted implementation uses `std::thread` directly and a `running` flag
//! rather than a cooperative kill signal.

use std::io;
use std::thread::JoinHandle;

/// Contract for spawning and joining the single worker thread a threaded
/// [`crate::gateway::Gateway`] owns. Exists mainly so the Gateway's
/// lifecycle code does not reach for `std::thread` directly, matching the
/// original's `thread_t` indirection.
pub trait Thread: Send {
    fn join(self: Box<Self>) -> std::thread::Result<()>;
}

/// A `std::thread`-backed [`Thread`].
pub struct StdThread {
    handle: JoinHandle<()>,
}

impl StdThread {
    pub fn spawn<F>(name: &str, f: F) -> io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = std::thread::Builder::new().name(name.to_string()).spawn(f)?;
        Ok(StdThread { handle })
    }
}

impl Thread for StdThread {
    fn join(self: Box<Self>) -> std::thread::Result<()> {
        self.handle.join()
    }
}
