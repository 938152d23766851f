//! lease-proxy - Auto-refreshing read proxies over evictable cached content
//!
//! A leaser hands out space-bounded temporary storage that it may reclaim
//! at any time. A [`ReadProxy`] hides that eviction from its caller by
//! fetching the content again from its source whenever the cached copy
//! has been revoked, until the caller either destroys the proxy or takes
//! ownership of the bytes with [`ReadProxy::upgrade`].

pub mod cli;
pub mod config;
pub mod error;
pub mod lease;
pub mod proxy;
pub mod source;
pub mod ui;

pub use error::{AppError, AppResult, LeaseError, LeaseResult, ProxyError, ProxyResult};
pub use lease::{LeaseRead, Leaser, MemoryLeaser, ReadLease, WriteLease};
pub use proxy::{ProxyReader, ReadProxy};
pub use source::{ContentSource, ContentStream, FileSource, ReaderStream};
pub use tokio_util::sync::CancellationToken;
