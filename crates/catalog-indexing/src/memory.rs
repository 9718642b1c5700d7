//! Per-batch memory discipline.
//!
//! Asset bytes are read into buffers drawn from a [`BufferPool`]. A buffer
//! goes back to the pool when its [`PooledBuffer`] is dropped, so every
//! allocation made for a batch is scoped to that batch. Between batches the
//! engine calls [`BufferPool::trim`] to cap what the pool retains; at the end
//! of a run [`BufferPool::release`] frees everything.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

use sysinfo::{Pid, ProcessesToUpdate, System};

/// Pool of reusable byte buffers.
#[derive(Debug)]
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
    /// Buffers kept across batches
    max_retained: usize,
    /// Capacity a retained buffer is shrunk to
    retained_capacity: usize,
}

impl BufferPool {
    /// Create a pool that keeps at most `max_retained` buffers of
    /// `retained_capacity` bytes between batches.
    pub fn new(max_retained: usize, retained_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            free: Mutex::new(Vec::with_capacity(max_retained)),
            max_retained,
            retained_capacity,
        })
    }

    /// Take an empty buffer, reusing a pooled one if available.
    pub fn acquire(self: &Arc<Self>) -> PooledBuffer {
        let buf = match self.free.lock() {
            Ok(mut free) => free.pop().unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        PooledBuffer {
            buf,
            pool: Arc::clone(self),
        }
    }

    fn give_back(&self, mut buf: Vec<u8>) {
        buf.clear();
        if let Ok(mut free) = self.free.lock() {
            free.push(buf);
        }
    }

    /// Drop surplus buffers and shrink oversized ones.
    ///
    /// Returns the number of bytes of capacity released.
    pub fn trim(&self) -> u64 {
        let Ok(mut free) = self.free.lock() else {
            return 0;
        };
        let before = capacity_of(&free);
        free.truncate(self.max_retained);
        for buf in free.iter_mut() {
            buf.shrink_to(self.retained_capacity);
        }
        before.saturating_sub(capacity_of(&free))
    }

    /// Free every pooled buffer. Returns the bytes of capacity released.
    pub fn release(&self) -> u64 {
        let Ok(mut free) = self.free.lock() else {
            return 0;
        };
        let released = capacity_of(&free);
        *free = Vec::new();
        released
    }

    /// Capacity currently held by idle buffers.
    pub fn retained_bytes(&self) -> u64 {
        self.free.lock().map(|free| capacity_of(&free)).unwrap_or(0)
    }
}

fn capacity_of(bufs: &[Vec<u8>]) -> u64 {
    bufs.iter().map(|b| b.capacity() as u64).sum()
}

/// A buffer on loan from a [`BufferPool`]; returned on drop.
#[derive(Debug)]
pub struct PooledBuffer {
    buf: Vec<u8>,
    pool: Arc<BufferPool>,
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.give_back(std::mem::take(&mut self.buf));
    }
}

/// Resident memory sampler for batch logging.
pub struct MemoryProbe {
    system: System,
    pid: Option<Pid>,
}

impl MemoryProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    /// Resident set size of this process in bytes.
    pub fn resident_bytes(&mut self) -> Option<u64> {
        let pid = self.pid?;
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        self.system.process(pid).map(|p| p.memory())
    }
}

impl Default for MemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}
