//! Scanning off the caller's thread.
//! The scan runs on tokio's blocking pool; a watchdog on the async side
//! reports a stall when no frame arrives in time, which also covers reads
//! blocked inside the decoder library.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::decode::decoder::LoadError;
use crate::decode::scanner::{ContainerScanner, ScanOptions, ScanResult, ScanStatus};
use crate::events::VideoEvent;
use crate::media::container::MediaSource;
use crate::media::location::MediaLocation;

/// Scan a container on a blocking worker, reporting a stall at most once
pub async fn scan_in_background(
    source: Arc<dyn MediaSource>,
    location: MediaLocation,
    options: ScanOptions,
) -> Result<ScanResult, LoadError> {
    let (progress_tx, mut progress_rx) = watch::channel(0usize);
    let stall_timeout = options.stall_timeout;
    let events = options.events.clone();
    let name = location.to_string();

    let mut worker = tokio::task::spawn_blocking(move || {
        let mut scanner = ContainerScanner::new(source, &location, options)?.without_stall_check();
        while scanner.scan_chunk(1)? == ScanStatus::Pending {
            let _ = progress_tx.send(scanner.frames());
        }
        scanner.finish()
    });

    let mut watching = true;
    loop {
        tokio::select! {
            joined = &mut worker => {
                return match joined {
                    Ok(result) => result,
                    Err(e) => Err(LoadError::Worker(e.to_string())),
                };
            }
            changed = tokio::time::timeout(stall_timeout, progress_rx.changed()), if watching => {
                match changed {
                    Ok(Ok(())) => {}
                    // Worker dropped its sender and is about to return
                    Ok(Err(_)) => watching = false,
                    Err(_) => {
                        watching = false;
                        warn!(location = %name, "no new frame within {:?}", stall_timeout);
                        events.emit(VideoEvent::Stalled { location: name.clone() });
                    }
                }
            }
        }
        debug!(location = %name, frames = *progress_rx.borrow(), "scan progress");
    }
}
