//! Auto-refreshing read proxy
//!
//! A [`ReadProxy`] wraps a read lease over content that can be derived again
//! at will from a [`ContentSource`]. Whenever the wrapped lease is missing or
//! has been revoked by the leaser, the proxy fetches the contents again into
//! a new lease, so callers never observe eviction.
//!
//! # Proxy States
//!
//! | State | Held lease | Description |
//! |-------|------------|-------------|
//! | Fresh | none | Nothing fetched yet, or the last attempt failed |
//! | Cached | read lease | Serving from the held lease |
//! | Revoked | none | Upgraded or destroyed; every call fails |
//!
//! All state lives behind a single mutex that is held for the whole of each
//! call, including any refetch. At most one derivation runs at a time and a
//! revoked lease triggers exactly one derivation.

mod refresh;

use crate::error::{LeaseError, ProxyError, ProxyResult};
use crate::lease::{LeaseRead, Leaser, ReadLease, WriteLease};
use crate::source::ContentSource;
use std::io::{self, SeekFrom};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Default)]
struct State {
    /// Set once the proxy has been upgraded or destroyed
    revoked: bool,

    /// The current wrapped lease, if any
    wrapped: Option<Box<dyn ReadLease>>,

    /// Logical stream position, restored on freshly derived leases
    offset: u64,
}

/// Read access to remotely sourced content that survives lease eviction
///
/// Reading and seeking may involve fetching the contents, so those calls
/// take a cancellation token which is forwarded to the content source.
pub struct ReadProxy {
    size: u64,
    leaser: Arc<dyn Leaser>,
    source: Arc<dyn ContentSource>,
    refreshes: AtomicU64,
    state: Mutex<State>,
}

impl ReadProxy {
    /// Create a proxy for `size` bytes of content produced by `source`
    ///
    /// The source is used the first time the contents are needed and again
    /// whenever the leaser revokes the copy obtained earlier. It must return
    /// the same contents every time, and exactly `size` bytes of them.
    pub fn new(leaser: Arc<dyn Leaser>, size: u64, source: Arc<dyn ContentSource>) -> Self {
        Self {
            size,
            leaser,
            source,
            refreshes: AtomicU64::new(0),
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `op` against the held lease, deriving the contents again if the
    /// lease is missing or revoked
    ///
    /// `track` maps the previous logical offset and the result of a
    /// successful call to the new logical offset.
    fn serve<T>(
        &self,
        cancel: &CancellationToken,
        name: &'static str,
        mut op: impl FnMut(&mut dyn LeaseRead) -> Result<T, LeaseError>,
        track: impl Fn(u64, &T) -> u64,
    ) -> ProxyResult<T> {
        let mut state = self.lock();

        if state.revoked {
            return Err(ProxyError::Revoked);
        }

        // Common case: is the existing lease still valid?
        if let Some(mut wrapped) = state.wrapped.take() {
            match op(&mut wrapped) {
                Err(LeaseError::Invalidated) => {
                    debug!(op = name, "Wrapped lease revoked; refreshing contents");
                    wrapped.revoke();
                }
                result => {
                    state.wrapped = Some(wrapped);
                    return Self::finish(&mut state, name, result, track);
                }
            }
        }

        let mut rwl = self.refresh(cancel)?;

        // Serve from the read/write lease, picking up where the old one left off.
        let offset = state.offset;
        let result = match rwl.seek(SeekFrom::Start(offset)) {
            Ok(_) => op(&mut rwl),
            Err(e) => Err(e),
        };

        state.wrapped = refresh::save(rwl);
        Self::finish(&mut state, name, result, track)
    }

    fn finish<T>(
        state: &mut State,
        name: &'static str,
        result: Result<T, LeaseError>,
        track: impl Fn(u64, &T) -> u64,
    ) -> ProxyResult<T> {
        let value = result.map_err(|e| ProxyError::lease(name, e))?;
        state.offset = track(state.offset, &value);
        Ok(value)
    }

    fn refresh(&self, cancel: &CancellationToken) -> ProxyResult<Box<dyn WriteLease>> {
        let rwl = refresh::obtain(self.leaser.as_ref(), self.source.as_ref(), self.size, cancel)?;
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        Ok(rwl)
    }

    /// Semantics matching [`std::io::Read::read`]
    pub fn read(&self, cancel: &CancellationToken, buf: &mut [u8]) -> ProxyResult<usize> {
        self.serve(cancel, "read", |lease| lease.read(buf), |offset, n| {
            offset + *n as u64
        })
    }

    /// Semantics matching [`std::io::Seek::seek`]
    pub fn seek(&self, cancel: &CancellationToken, pos: SeekFrom) -> ProxyResult<u64> {
        self.serve(cancel, "seek", |lease| lease.seek(pos), |_, offset| *offset)
    }

    /// Read at an absolute offset without moving the stream position
    pub fn read_at(
        &self,
        cancel: &CancellationToken,
        buf: &mut [u8],
        offset: u64,
    ) -> ProxyResult<usize> {
        self.serve(
            cancel,
            "read_at",
            |lease| lease.read_at(buf, offset),
            |current, _| current,
        )
    }

    /// Size of the proxied content. Never blocks.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of times the contents have been derived from the source
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    /// Whether the proxy has been retired by [`upgrade`](Self::upgrade) or
    /// [`destroy`](Self::destroy)
    ///
    /// A retired proxy holds no lease.
    pub fn is_revoked(&self) -> bool {
        self.lock().revoked
    }

    /// Return a read/write lease over the proxied contents
    ///
    /// On success the proxy is retired and every later call fails with
    /// [`ProxyError::Revoked`]. A failed upgrade leaves the proxy usable.
    /// The position of the returned lease is unspecified; seek before
    /// reading from it.
    pub fn upgrade(&self, cancel: &CancellationToken) -> ProxyResult<Box<dyn WriteLease>> {
        let mut state = self.lock();

        if state.revoked {
            return Err(ProxyError::Revoked);
        }

        if let Some(wrapped) = state.wrapped.take() {
            match wrapped.upgrade() {
                Ok(rwl) => {
                    state.revoked = true;
                    info!(size = self.size, "Upgraded wrapped lease; proxy retired");
                    return Ok(rwl);
                }
                Err(LeaseError::Invalidated) => {
                    debug!("Wrapped lease revoked before upgrade; refreshing contents");
                }
                Err(e) => return Err(ProxyError::lease("upgrade", e)),
            }
        }

        // Build the read/write lease anew.
        let rwl = self.refresh(cancel)?;

        state.revoked = true;
        info!(size = self.size, "Upgraded fresh contents; proxy retired");
        Ok(rwl)
    }

    /// Release any resources held by the proxy. It must not be used further.
    ///
    /// Safe to call repeatedly, and after a successful upgrade.
    pub fn destroy(&self) {
        let mut state = self.lock();

        if !state.revoked {
            debug!(size = self.size, "Destroying read proxy");
        }
        state.revoked = true;
        if let Some(wrapped) = state.wrapped.take() {
            wrapped.revoke();
        }
    }

    /// Borrow the proxy as a [`std::io::Read`] + [`std::io::Seek`] stream
    pub fn reader<'a>(&'a self, cancel: &'a CancellationToken) -> ProxyReader<'a> {
        ProxyReader {
            proxy: self,
            cancel,
        }
    }
}

impl Drop for ReadProxy {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(wrapped) = state.wrapped.take() {
            wrapped.revoke();
        }
    }
}

/// Standard I/O view of a [`ReadProxy`] bound to one cancellation token
pub struct ProxyReader<'a> {
    proxy: &'a ReadProxy,
    cancel: &'a CancellationToken,
}

impl io::Read for ProxyReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.proxy.read(self.cancel, buf)?)
    }
}

impl io::Seek for ProxyReader<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(self.proxy.seek(self.cancel, pos)?)
    }
}
