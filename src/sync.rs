//! Write path: change-aware document/vector synchronization.
//!
//! `Synchronizer::sync` drives one talent through synthesize → compare →
//! embed → store. `SyncWorker` polls the durable queue and fans the
//! batch out on scoped threads; queue entries are deleted per item, so a
//! failing talent never blocks its siblings from being dequeued.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::ChunkingConfig;
use crate::document;
use crate::error::{CoreError, Result};
use crate::provider::{embedding::embed_chunked, EmbeddingProvider};
use crate::store::Store;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct CycleStats {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub struct Synchronizer {
    store: Arc<Store>,
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    chunking: ChunkingConfig,
}

impl Synchronizer {
    pub fn new(
        store: Arc<Store>,
        embedder: Arc<dyn EmbeddingProvider>,
        batch_size: usize,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            batch_size,
            chunking,
        }
    }

    /// Embed a summary, chunking when it exceeds the configured maximum
    /// length. Chunk vectors are mean-pooled into one talent vector.
    fn embed_summary(&self, summary: &str) -> Result<Vec<f32>> {
        if summary.chars().count() <= self.chunking.max_len {
            return Ok(self.embedder.embed(summary)?);
        }

        log::debug!(
            "summary exceeds {} chars, embedding in chunks",
            self.chunking.max_len
        );
        let pieces = embed_chunked(
            self.embedder.as_ref(),
            summary,
            self.chunking.max_len,
            self.chunking.overlap,
        )?;

        let dims = self.embedder.dimensions();
        let mut pooled = vec![0f32; dims];
        for (_, vector) in &pieces {
            for (slot, value) in pooled.iter_mut().zip(vector) {
                *slot += value;
            }
        }
        let n = pieces.len().max(1) as f32;
        for slot in &mut pooled {
            *slot /= n;
        }
        Ok(pooled)
    }

    /// Resynchronize one talent. Returns true when the summary changed
    /// and a fresh vector was stored.
    ///
    /// When the synthesized summary equals the stored one, no embedding
    /// call is made — redundant provider calls cost money.
    pub fn sync(&self, talent_id: i64) -> Result<bool> {
        let profile = self
            .store
            .fetch_profile(talent_id)?
            .ok_or(CoreError::NotFound(talent_id))?;

        let summary = document::synthesize(&profile);
        let changed = self.store.upsert_document(talent_id, &summary)?;
        if !changed {
            log::debug!("talent {talent_id}: summary unchanged, skipping embedding");
            return Ok(false);
        }

        let vector = self.embed_summary(&summary)?;
        self.store.upsert_vector(talent_id, &vector)?;
        log::info!("talent {talent_id}: document and vector updated");
        Ok(true)
    }

    /// Resynchronize every known talent. Returns how many changed.
    pub fn sync_all(&self) -> Result<usize> {
        let ids = self.store.all_talent_ids()?;
        let mut changed = 0;
        for id in ids {
            if self.sync(id)? {
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Run one queue cycle: read a bounded batch, sync each entry on its
    /// own scoped thread, then delete exactly the entries that
    /// succeeded. Failures stay queued for the next cycle.
    pub fn process_queue(&self) -> CycleStats {
        let entries = match self.store.pending(self.batch_size) {
            Ok(entries) => entries,
            Err(err) => {
                log::error!("reading sync queue failed: {err}");
                return CycleStats::default();
            }
        };
        if entries.is_empty() {
            return CycleStats::default();
        }

        let results: Vec<(i64, Result<bool>)> = std::thread::scope(|scope| {
            let handles: Vec<_> = entries
                .iter()
                .map(|entry| {
                    let id = entry.talent_id;
                    (id, scope.spawn(move || self.sync(id)))
                })
                .collect();
            handles
                .into_iter()
                .map(|(id, handle)| {
                    let result = handle.join().unwrap_or_else(|_| {
                        Err(CoreError::InvalidInput(format!(
                            "sync for talent {id} panicked"
                        )))
                    });
                    (id, result)
                })
                .collect()
        });

        let mut stats = CycleStats {
            processed: results.len(),
            ..CycleStats::default()
        };
        let mut succeeded = Vec::with_capacity(results.len());
        for (id, result) in results {
            match result {
                Ok(_) => {
                    stats.succeeded += 1;
                    succeeded.push(id);
                }
                Err(err) => {
                    stats.failed += 1;
                    log::error!("talent {id}: sync failed, will retry next cycle: {err}");
                }
            }
        }

        if let Err(err) = self.store.remove_queued(&succeeded) {
            log::error!("removing processed queue entries failed: {err}");
        }
        stats
    }
}

/// Background worker driving `process_queue` at a fixed poll interval.
///
/// The loop blocks on the shutdown channel with a timeout, so `stop()`
/// (or dropping the worker) halts it deterministically — no sleeping
/// thread to wait out in tests.
pub struct SyncWorker {
    shutdown_tx: mpsc::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl SyncWorker {
    pub fn start(synchronizer: Arc<Synchronizer>, poll_interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel();
        let handle = std::thread::spawn(move || {
            log::info!("sync worker started (poll interval {poll_interval:?})");
            loop {
                match shutdown_rx.recv_timeout(poll_interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        log::info!("sync worker stopping");
                        return;
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        let stats = synchronizer.process_queue();
                        if stats.processed > 0 {
                            log::info!(
                                "sync cycle: {} processed, {} succeeded, {} failed",
                                stats.processed,
                                stats.succeeded,
                                stats.failed
                            );
                        }
                    }
                }
            }
        });
        Self {
            shutdown_tx,
            handle: Some(handle),
        }
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SyncWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
