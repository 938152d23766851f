//! Lease capability contracts
//!
//! A leaser hands out space-bounded, evictable storage units. Read/write
//! leases are exclusively owned by their holder; read leases may be revoked
//! by the leaser at any time to reclaim space, after which every operation
//! on them fails with [`LeaseError::Invalidated`].
//!
//! # Conversions
//!
//! | From | Call | To | Effect |
//! |------|------|----|--------|
//! | Read/write | `downgrade` | Read | Gives up write access, becomes revocable |
//! | Read | `upgrade` | Read/write | Reclaims exclusive ownership |
//! | Read | `revoke` | - | Releases the space |
//!
//! Conversions consume the source lease, so a converted lease cannot be
//! used again.

pub mod memory;

pub use memory::{LeaserStats, MemoryLeaser};

use crate::error::{LeaseError, LeaseResult};
use std::io::SeekFrom;

/// Read access shared by both lease flavours
pub trait LeaseRead: Send {
    /// Read from the current position, advancing it
    fn read(&mut self, buf: &mut [u8]) -> LeaseResult<usize>;

    /// Move the current position, returning the new offset from the start
    fn seek(&mut self, pos: SeekFrom) -> LeaseResult<u64>;

    /// Read at an absolute offset without moving the current position
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> LeaseResult<usize>;
}

/// A revocable, read-only view of cached content
pub trait ReadLease: LeaseRead {
    /// Size of the content in bytes
    fn size(&self) -> u64;

    /// Whether the leaser has revoked this lease
    fn revoked(&self) -> bool;

    /// Trade this lease for a read/write lease over the same content
    ///
    /// Fails with [`LeaseError::Invalidated`] if the lease was revoked first.
    fn upgrade(self: Box<Self>) -> LeaseResult<Box<dyn WriteLease>>;

    /// Give the space back to the leaser
    fn revoke(self: Box<Self>);
}

/// An exclusively owned, writable storage unit
pub trait WriteLease: LeaseRead {
    /// Write at the current position, advancing it
    fn write(&mut self, buf: &[u8]) -> LeaseResult<usize>;

    /// Current size of the content in bytes
    fn size(&self) -> LeaseResult<u64>;

    /// Truncate or zero-extend the content
    fn truncate(&mut self, size: u64) -> LeaseResult<()>;

    /// Give up write access, making the content revocable by the leaser
    fn downgrade(self: Box<Self>) -> LeaseResult<Box<dyn ReadLease>>;

    /// Destroy the lease by downgrading it and revoking the result
    fn revoke(self: Box<Self>) -> LeaseResult<()> {
        let downgraded = self.downgrade()?;
        downgraded.revoke();
        Ok(())
    }
}

/// Source of fresh read/write leases
pub trait Leaser: Send + Sync {
    /// Allocate an empty read/write lease positioned at offset zero
    fn new_file(&self) -> LeaseResult<Box<dyn WriteLease>>;
}

impl LeaseRead for Box<dyn ReadLease> {
    fn read(&mut self, buf: &mut [u8]) -> LeaseResult<usize> {
        (**self).read(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> LeaseResult<u64> {
        (**self).seek(pos)
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> LeaseResult<usize> {
        (**self).read_at(buf, offset)
    }
}

impl LeaseRead for Box<dyn WriteLease> {
    fn read(&mut self, buf: &mut [u8]) -> LeaseResult<usize> {
        (**self).read(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> LeaseResult<u64> {
        (**self).seek(pos)
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> LeaseResult<usize> {
        (**self).read_at(buf, offset)
    }
}

/// Write the whole buffer, retrying short writes
pub fn write_all(lease: &mut dyn WriteLease, mut buf: &[u8]) -> LeaseResult<()> {
    while !buf.is_empty() {
        match lease.write(buf)? {
            0 => {
                return Err(LeaseError::Io(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "lease accepted no bytes",
                )))
            }
            n => buf = &buf[n..],
        }
    }
    Ok(())
}
