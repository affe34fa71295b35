use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

mod cli;
mod config;
mod document;
mod error;
mod profile;
mod provider;
mod search;
mod store;
mod sync;
#[cfg(test)]
mod tests;
mod web;

use config::Config;
use provider::{EmbeddingProvider, GenerativeProvider, OpenAiChat, OpenAiEmbeddings};
use search::{RelevanceFilter, SimilaritySearcher};
use store::Store;
use sync::{SyncWorker, Synchronizer};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = cli::Args::parse();
    let config = Config::load_with(&args.config);

    let store = Arc::new(Store::open(
        &config.database.path,
        config.provider.dimensions,
    )?);

    let api_key = config.api_key()?;
    let timeout = Duration::from_secs(config.provider.timeout_secs);
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(OpenAiEmbeddings::new(
        &config.provider.base_url,
        api_key.clone(),
        &config.provider.embedding_model,
        config.provider.dimensions,
        timeout,
        config.provider.max_retries,
    )?);
    let chat: Arc<dyn GenerativeProvider> = Arc::new(OpenAiChat::new(
        &config.provider.base_url,
        api_key,
        &config.provider.chat_model,
        timeout,
        config.provider.max_retries,
    )?);

    let searcher = Arc::new(SimilaritySearcher::new(
        store.clone(),
        embedder.clone(),
        config.search.limit,
        config.search.min_similarity,
    ));
    let relevance = Arc::new(RelevanceFilter::new(chat));
    let synchronizer = Arc::new(Synchronizer::new(
        store.clone(),
        embedder.clone(),
        config.worker.batch_size,
        config.chunking.clone(),
    ));

    match args.command {
        cli::Command::Daemon {} => {
            let worker = SyncWorker::start(
                synchronizer,
                Duration::from_secs(config.worker.poll_interval_secs),
            );
            let state = web::AppState {
                store,
                embedder,
                searcher,
                relevance,
            };
            web::start_daemon(state, &config.listen)?;
            worker.stop();
            Ok(())
        }

        cli::Command::Sync { id } => {
            match id {
                Some(id) => {
                    let changed = synchronizer.sync(id)?;
                    if changed {
                        println!("talent {id}: document and vector updated");
                    } else {
                        println!("talent {id}: unchanged");
                    }
                }
                None => {
                    let changed = synchronizer.sync_all()?;
                    println!("{changed} talent(s) re-embedded");
                }
            }
            Ok(())
        }

        cli::Command::Enqueue { id } => {
            store.enqueue(id)?;
            println!("talent {id} queued for resync");
            Ok(())
        }

        cli::Command::Search { query, candidates } => {
            let hits = searcher.search(&query, candidates.as_deref())?;
            if hits.is_empty() {
                println!("[]");
                return Ok(());
            }
            let ids = relevance.filter(&query, &hits);
            println!("{}", serde_json::to_string_pretty(&ids)?);
            Ok(())
        }
    }
}
