//! Filling, saving and destroying read/write leases on behalf of a proxy

use crate::error::{LeaseError, ProxyError, ProxyResult};
use crate::lease::{write_all, Leaser, ReadLease, WriteLease};
use crate::source::{ContentSource, ContentStream};
use std::io::{self, Read};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const COPY_BUF_SIZE: usize = 32 * 1024;

/// Set up a read/write lease holding exactly `size` bytes of fresh content
///
/// On failure the allocated lease has already been destroyed.
pub(crate) fn obtain(
    leaser: &dyn Leaser,
    source: &dyn ContentSource,
    size: u64,
    cancel: &CancellationToken,
) -> ProxyResult<Box<dyn WriteLease>> {
    let mut rwl = leaser.new_file().map_err(ProxyError::Allocation)?;

    match fill(rwl.as_mut(), source, size, cancel) {
        Ok(()) => {
            debug!(size, "Obtained fresh contents");
            Ok(rwl)
        }
        Err(e) => {
            destroy(rwl);
            Err(e)
        }
    }
}

fn fill(
    rwl: &mut dyn WriteLease,
    source: &dyn ContentSource,
    size: u64,
    cancel: &CancellationToken,
) -> ProxyResult<()> {
    let mut stream = source.open(cancel).map_err(ProxyError::Source)?;

    let copied = copy(stream.as_mut(), rwl).and_then(|copied| {
        if copied == size {
            Ok(())
        } else {
            Err(ProxyError::LengthMismatch {
                copied,
                expected: size,
            })
        }
    });

    // A close failure only matters if nothing went wrong before it.
    copied.and(stream.close().map_err(ProxyError::Close))
}

fn copy(stream: &mut dyn ContentStream, rwl: &mut dyn WriteLease) -> ProxyResult<u64> {
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut copied = 0u64;

    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) => return Ok(copied),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ProxyError::Copy(LeaseError::Io(e))),
        };

        write_all(rwl, &buf[..n]).map_err(ProxyError::Copy)?;
        copied += n as u64;
    }
}

/// Downgrade a read/write lease obtained with [`obtain`] for later use
///
/// A lease that cannot be downgraded is abandoned; the next access simply
/// derives the contents again.
pub(crate) fn save(rwl: Box<dyn WriteLease>) -> Option<Box<dyn ReadLease>> {
    match rwl.downgrade() {
        Ok(rl) => Some(rl),
        Err(e) => {
            warn!(error = %e, "Failed to downgrade read/write lease; abandoning");
            None
        }
    }
}

/// Best-effort destruction of a read/write lease
pub(crate) fn destroy(rwl: Box<dyn WriteLease>) {
    if let Err(e) = rwl.revoke() {
        warn!(error = %e, "Error destroying read/write lease");
    }
}
