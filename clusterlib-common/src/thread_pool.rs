//! Fixed-size worker pool used for timer expirations (§5: "a
//! `ThreadPool`... sized by `ClusterConfig::timer_pool_size` services
//! timer expirations... without spawning one thread per call").
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::{JoinHandle, panicking, spawn};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    NewJob(Job),
    Terminate,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ThreadPoolError {
    SendError,
}

impl std::fmt::Display for ThreadPoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThreadPoolError::SendError => write!(f, "failed to send job to worker thread"),
        }
    }
}

impl std::error::Error for ThreadPoolError {}

/// Lives for the duration of one worker thread. On drop it decrements
/// the live-worker count, and if the thread is unwinding from a panic
/// it immediately spawns a replacement so the pool never shrinks.
struct Sentinel {
    shared: Arc<Shared>,
}

impl Drop for Sentinel {
    fn drop(&mut self) {
        self.shared.live.fetch_sub(1, Ordering::SeqCst);
        if panicking() {
            self.shared.spawn_worker();
        }
    }
}

struct Shared {
    receiver: Mutex<Receiver<Message>>,
    live: AtomicUsize,
    size: usize,
}

impl Shared {
    fn spawn_worker(self: &Arc<Self>) -> JoinHandle<()> {
        self.live.fetch_add(1, Ordering::SeqCst);
        let shared = Arc::clone(self);

        spawn(move || {
            let _sentinel = Sentinel {
                shared: Arc::clone(&shared),
            };

            loop {
                let msg = {
                    let rx = match shared.receiver.lock() {
                        Ok(guard) => guard,
                        Err(_) => break,
                    };
                    rx.recv()
                };

                match msg {
                    Ok(Message::NewJob(job)) => job(),
                    Ok(Message::Terminate) | Err(_) => break,
                }
            }
        })
    }
}

/// A pool that keeps `size` worker threads alive, respawning any that
/// panic while running a job.
pub struct ThreadPool {
    handles: Vec<Option<JoinHandle<()>>>,
    sender: Sender<Message>,
    shared: Arc<Shared>,
}

impl ThreadPool {
    pub fn new(size: usize) -> ThreadPool {
        let size = size.max(1);
        let (tx, rx) = mpsc::channel();
        let shared = Arc::new(Shared {
            receiver: Mutex::new(rx),
            live: AtomicUsize::new(0),
            size,
        });

        let mut handles = Vec::with_capacity(size);
        for _ in 0..size {
            handles.push(Some(shared.spawn_worker()));
        }

        ThreadPool {
            handles,
            sender: tx,
            shared,
        }
    }

    pub fn execute<F>(&self, job: F) -> Result<(), ThreadPoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender
            .send(Message::NewJob(Box::new(job)))
            .map_err(|_| ThreadPoolError::SendError)
    }

    pub fn size(&self) -> usize {
        self.shared.size
    }

    pub fn live_workers(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        for _ in 0..self.shared.size {
            let _ = self.sender.send(Message::Terminate);
        }
        for handle in self.handles.iter_mut().filter_map(Option::take) {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("size", &self.shared.size)
            .field("live", &self.live_workers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn runs_a_job() {
        let pool = ThreadPool::new(4);
        let counter = Arc::new(Mutex::new(0));
        let c = Arc::clone(&counter);
        pool.execute(move || *c.lock().unwrap() += 1).unwrap();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(*counter.lock().unwrap(), 1);
    }

    #[test]
    fn respawns_after_panic() {
        let pool = ThreadPool::new(4);
        pool.execute(|| panic!("boom")).unwrap();
        thread::sleep(Duration::from_millis(100));
        pool.execute(|| {}).unwrap();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(pool.size(), 4);
        assert_eq!(pool.live_workers(), 4);
    }

    #[test]
    fn zero_size_becomes_one() {
        let pool = ThreadPool::new(0);
        assert_eq!(pool.size(), 1);
    }
}
