//! Heap-backed leaser
//!
//! Keeps lease contents in memory. The leaser never evicts on its own;
//! [`MemoryLeaser::revoke_all`] lets the owner reclaim every outstanding
//! read lease at once, which is how the CLI and the tests simulate space
//! pressure.

use crate::error::{LeaseError, LeaseResult};
use crate::lease::{LeaseRead, Leaser, ReadLease, WriteLease};
use serde::Serialize;
use std::collections::HashMap;
use std::io::{self, SeekFrom};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Counters describing leaser activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LeaserStats {
    /// Read/write leases handed out by `new_file`
    pub allocated: u64,
    /// Read/write leases turned into read leases
    pub downgraded: u64,
    /// Read leases turned back into read/write leases
    pub upgraded: u64,
    /// Read leases revoked, voluntarily or via `revoke_all`
    pub revoked: u64,
    /// Read leases currently registered with the leaser
    pub outstanding: u64,
    /// Bytes held by outstanding read leases
    pub outstanding_bytes: u64,
}

#[derive(Default)]
struct Inner {
    next_id: AtomicU64,
    allocated: AtomicU64,
    downgraded: AtomicU64,
    upgraded: AtomicU64,
    revoked: AtomicU64,
    outstanding: Mutex<HashMap<u64, Arc<Slot>>>,
}

impl Inner {
    fn register(&self, slot: Arc<Slot>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.outstanding).insert(id, slot);
        id
    }

    fn unregister(&self, id: u64) {
        lock(&self.outstanding).remove(&id);
    }
}

/// Contents of a read lease; `None` once revoked
struct Slot {
    data: Mutex<Option<Vec<u8>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Leaser keeping all contents on the heap
#[derive(Clone, Default)]
pub struct MemoryLeaser {
    inner: Arc<Inner>,
}

impl MemoryLeaser {
    /// Create a leaser with no outstanding leases
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke every outstanding read lease, returning how many were revoked
    pub fn revoke_all(&self) -> usize {
        let drained: Vec<Arc<Slot>> = lock(&self.inner.outstanding)
            .drain()
            .map(|(_, slot)| slot)
            .collect();

        let mut count = 0;
        for slot in drained {
            if lock(&slot.data).take().is_some() {
                count += 1;
            }
        }

        self.inner
            .revoked
            .fetch_add(count as u64, Ordering::Relaxed);
        debug!(count, "Revoked outstanding read leases");
        count
    }

    /// Snapshot of the leaser counters
    pub fn stats(&self) -> LeaserStats {
        let outstanding = lock(&self.inner.outstanding);
        let outstanding_bytes = outstanding
            .values()
            .map(|slot| lock(&slot.data).as_ref().map_or(0, |d| d.len() as u64))
            .sum();

        LeaserStats {
            allocated: self.inner.allocated.load(Ordering::Relaxed),
            downgraded: self.inner.downgraded.load(Ordering::Relaxed),
            upgraded: self.inner.upgraded.load(Ordering::Relaxed),
            revoked: self.inner.revoked.load(Ordering::Relaxed),
            outstanding: outstanding.len() as u64,
            outstanding_bytes,
        }
    }
}

impl Leaser for MemoryLeaser {
    fn new_file(&self) -> LeaseResult<Box<dyn WriteLease>> {
        self.inner.allocated.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MemoryWriteLease {
            data: Vec::new(),
            pos: 0,
            inner: Arc::clone(&self.inner),
        }))
    }
}

/// Compute the target of a seek, rejecting positions before the start
fn seek_target(pos: SeekFrom, current: u64, len: u64) -> LeaseResult<u64> {
    let (base, delta) = match pos {
        SeekFrom::Start(n) => return Ok(n),
        SeekFrom::End(d) => (len, d),
        SeekFrom::Current(d) => (current, d),
    };

    base.checked_add_signed(delta).ok_or_else(|| {
        LeaseError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid seek to a negative or overflowing position",
        ))
    })
}

/// Copy from `data` at `offset` into `buf`, returning the byte count
fn copy_out(data: &[u8], buf: &mut [u8], offset: u64) -> usize {
    let Ok(start) = usize::try_from(offset) else {
        return 0;
    };
    if start >= data.len() {
        return 0;
    }

    let n = buf.len().min(data.len() - start);
    buf[..n].copy_from_slice(&data[start..start + n]);
    n
}

/// Read/write lease over an owned buffer
pub struct MemoryWriteLease {
    data: Vec<u8>,
    pos: u64,
    inner: Arc<Inner>,
}

impl LeaseRead for MemoryWriteLease {
    fn read(&mut self, buf: &mut [u8]) -> LeaseResult<usize> {
        let n = copy_out(&self.data, buf, self.pos);
        self.pos += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> LeaseResult<u64> {
        self.pos = seek_target(pos, self.pos, self.data.len() as u64)?;
        Ok(self.pos)
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> LeaseResult<usize> {
        Ok(copy_out(&self.data, buf, offset))
    }
}

impl WriteLease for MemoryWriteLease {
    fn write(&mut self, buf: &[u8]) -> LeaseResult<usize> {
        let start = usize::try_from(self.pos).map_err(|_| {
            LeaseError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "write position exceeds addressable memory",
            ))
        })?;
        let end = start + buf.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }

        self.data[start..end].copy_from_slice(buf);
        self.pos = end as u64;
        Ok(buf.len())
    }

    fn size(&self) -> LeaseResult<u64> {
        Ok(self.data.len() as u64)
    }

    fn truncate(&mut self, size: u64) -> LeaseResult<()> {
        let size = usize::try_from(size).map_err(|_| {
            LeaseError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "truncate size exceeds addressable memory",
            ))
        })?;
        self.data.resize(size, 0);
        Ok(())
    }

    fn downgrade(self: Box<Self>) -> LeaseResult<Box<dyn ReadLease>> {
        let MemoryWriteLease { data, pos, inner } = *self;
        let size = data.len() as u64;
        let slot = Arc::new(Slot {
            data: Mutex::new(Some(data)),
        });
        let id = inner.register(Arc::clone(&slot));
        inner.downgraded.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(MemoryReadLease {
            id,
            size,
            pos,
            slot,
            inner,
        }))
    }
}

/// Read lease registered with a [`MemoryLeaser`]
pub struct MemoryReadLease {
    id: u64,
    size: u64,
    pos: u64,
    slot: Arc<Slot>,
    inner: Arc<Inner>,
}

impl MemoryReadLease {
    fn with_data<T>(&self, f: impl FnOnce(&[u8]) -> T) -> LeaseResult<T> {
        match lock(&self.slot.data).as_deref() {
            Some(data) => Ok(f(data)),
            None => Err(LeaseError::Invalidated),
        }
    }
}

impl LeaseRead for MemoryReadLease {
    fn read(&mut self, buf: &mut [u8]) -> LeaseResult<usize> {
        let pos = self.pos;
        let n = self.with_data(|data| copy_out(data, buf, pos))?;
        self.pos += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> LeaseResult<u64> {
        let target = self.with_data(|data| seek_target(pos, self.pos, data.len() as u64))??;
        self.pos = target;
        Ok(target)
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> LeaseResult<usize> {
        self.with_data(|data| copy_out(data, buf, offset))
    }
}

impl ReadLease for MemoryReadLease {
    fn size(&self) -> u64 {
        self.size
    }

    fn revoked(&self) -> bool {
        lock(&self.slot.data).is_none()
    }

    fn upgrade(self: Box<Self>) -> LeaseResult<Box<dyn WriteLease>> {
        let data = lock(&self.slot.data)
            .take()
            .ok_or(LeaseError::Invalidated)?;
        self.inner.unregister(self.id);
        self.inner.upgraded.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(MemoryWriteLease {
            data,
            pos: self.pos,
            inner: Arc::clone(&self.inner),
        }))
    }

    fn revoke(self: Box<Self>) {
        if lock(&self.slot.data).take().is_some() {
            self.inner.revoked.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.unregister(self.id);
    }
}
