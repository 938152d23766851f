//! Cat command - read a file through a read proxy

use crate::cli::args::CatArgs;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::lease::{LeaserStats, MemoryLeaser};
use crate::proxy::ReadProxy;
use crate::source::FileSource;
use crate::ui::{self, UiContext};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::{self, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// What to read and how
#[derive(Debug, Clone)]
pub struct CatPlan {
    /// Byte offset to start from
    pub offset: u64,
    /// Maximum number of bytes to read
    pub length: Option<u64>,
    /// Bytes requested per read
    pub chunk_size: usize,
    /// Revoke all leases after every N reads (0 = never)
    pub revoke_every: u64,
    /// Hash the content instead of writing it out
    pub digest: bool,
}

/// Outcome of a cat run
#[derive(Debug, Clone, Serialize)]
pub struct CatSummary {
    /// Path of the served file
    pub path: PathBuf,
    /// Declared size of the content
    pub size: u64,
    /// Offset reading started from
    pub offset: u64,
    /// Bytes read through the proxy
    pub bytes: u64,
    /// Reads issued against the proxy
    pub reads: u64,
    /// Times the proxy fetched the content from the file
    pub refreshes: u64,
    /// Hex SHA-256 of the bytes read, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// Leaser counters after the proxy was destroyed
    pub leaser: LeaserStats,
}

/// Execute the cat command
pub async fn execute(args: CatArgs, config: &Config) -> AppResult<()> {
    let ctx = UiContext::detect();

    let source = FileSource::new(&args.path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => AppError::PathNotFound(args.path.clone()),
        _ => AppError::io(format!("reading {}", args.path.display()), e),
    })?;

    let plan = CatPlan {
        offset: args.offset,
        length: args.length,
        chunk_size: args.chunk_size.unwrap_or(config.read.chunk_size).max(1),
        revoke_every: args.revoke_every.unwrap_or(config.read.revoke_every),
        digest: args.digest || args.json,
    };
    debug!(?plan, "Serving {}", args.path.display());

    let leaser = MemoryLeaser::new();
    let proxy = ReadProxy::new(Arc::new(leaser.clone()), source.len(), Arc::new(source));
    let cancel = CancellationToken::new();

    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let worker = tokio::task::spawn_blocking({
        let cancel = cancel.clone();
        let path = args.path.clone();
        move || {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            let summary = copy_through(&proxy, &leaser, &cancel, &plan, &mut out)?;
            out.flush()
                .map_err(|e| AppError::io("flushing stdout", e))?;
            Ok::<_, AppError>(CatSummary { path, ..summary })
        }
    });

    let joined = worker.await;
    watcher.abort();

    let summary = match joined {
        Ok(result) => result?,
        Err(e) => return Err(AppError::Internal(format!("read task failed: {}", e))),
    };

    info!(
        bytes = summary.bytes,
        reads = summary.reads,
        refreshes = summary.refreshes,
        "Finished reading {}",
        summary.path.display()
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if let Some(ref sha) = summary.sha256 {
        println!("{}  {}", sha, summary.path.display());
        ui::stat(&ctx, "bytes", &summary.bytes.to_string());
        ui::stat(&ctx, "refreshes", &summary.refreshes.to_string());
        ui::stat(&ctx, "revoked leases", &summary.leaser.revoked.to_string());
    }

    Ok(())
}

/// Read through `proxy` according to `plan`, then destroy it
///
/// Content goes to `out` unless the plan asks for a digest.
pub fn copy_through(
    proxy: &ReadProxy,
    leaser: &MemoryLeaser,
    cancel: &CancellationToken,
    plan: &CatPlan,
    out: &mut dyn Write,
) -> AppResult<CatSummary> {
    let result = copy_chunks(proxy, leaser, cancel, plan, out);
    let refreshes = proxy.refresh_count();
    proxy.destroy();

    let (bytes, reads, sha256) = result?;
    Ok(CatSummary {
        path: PathBuf::new(),
        size: proxy.size(),
        offset: plan.offset,
        bytes,
        reads,
        refreshes,
        sha256,
        leaser: leaser.stats(),
    })
}

fn copy_chunks(
    proxy: &ReadProxy,
    leaser: &MemoryLeaser,
    cancel: &CancellationToken,
    plan: &CatPlan,
    out: &mut dyn Write,
) -> AppResult<(u64, u64, Option<String>)> {
    if plan.offset > 0 {
        proxy.seek(cancel, SeekFrom::Start(plan.offset))?;
    }

    let mut hasher = plan.digest.then(Sha256::new);
    let mut buf = vec![0u8; plan.chunk_size];
    let mut remaining = plan.length.unwrap_or(u64::MAX);
    let mut bytes = 0u64;
    let mut reads = 0u64;

    while remaining > 0 {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let want = remaining.min(buf.len() as u64) as usize;
        let n = match proxy.read(cancel, &mut buf[..want]) {
            Ok(n) => n,
            Err(_) if cancel.is_cancelled() => return Err(AppError::Cancelled),
            Err(e) => return Err(e.into()),
        };
        if n == 0 {
            break;
        }

        match hasher {
            Some(ref mut hasher) => hasher.update(&buf[..n]),
            None => out
                .write_all(&buf[..n])
                .map_err(|e| AppError::io("writing content", e))?,
        }

        bytes += n as u64;
        remaining -= n as u64;
        reads += 1;

        if plan.revoke_every > 0 && reads % plan.revoke_every == 0 {
            let revoked = leaser.revoke_all();
            debug!(reads, revoked, "Revoked cached leases");
        }
    }

    Ok((bytes, reads, hasher.map(|h| hex::encode(h.finalize()))))
}
