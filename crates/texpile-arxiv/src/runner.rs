//! Main execution logic for arXiv ingestion

use std::time::Instant;

use anyhow::Context;
use texpile_core::fsutil::cleanup_tmp_files;
use texpile_core::{Semaphore, SharedProgress, is_shutdown_requested};

use crate::config::Config;
use crate::era::{Era, classify_era};
use crate::index::MetadataIndex;
use crate::journal::Journal;
use crate::manifest::{fetch_manifest, read_manifest};
use crate::oai::{HttpListing, build_index};
use crate::postpass::{FilterStats, filter_corpus};
use crate::repair::Repairer;
use crate::source::source_for;
use crate::split::{Splits, assign_splits};
use crate::stats::RunSummary;
use crate::worker::{ShardContext, process_shards};

/// Prepare the output tree: corpus and a fresh staging directory.
///
/// Staging left by a killed run is discarded, as are stray `.tmp` files.
pub fn prepare_output(config: &Config) -> anyhow::Result<()> {
    std::fs::create_dir_all(config.corpus_dir()).context("Cannot create corpus directory")?;
    let staging = config.staging_dir();
    if staging.exists() {
        std::fs::remove_dir_all(&staging)
            .with_context(|| format!("Cannot clear {}", staging.display()))?;
    }
    std::fs::create_dir_all(&staging).context("Cannot create staging directory")?;
    let removed = cleanup_tmp_files(&config.output_dir).context("Failed to clean stale tmp files")?;
    if removed > 0 {
        log::info!("Removed {removed} stale tmp files");
    }
    Ok(())
}

/// Load `index.txt`, or harvest the listing and save it.
pub fn load_or_build_index(config: &Config, progress: &SharedProgress) -> anyhow::Result<MetadataIndex> {
    let path = config.index_path();
    if path.exists() && !config.refresh_index {
        let index = MetadataIndex::load(&path)
            .with_context(|| format!("Cannot read {}", path.display()))?;
        log::info!("Loaded metadata index: {} ids", index.len());
        return Ok(index);
    }

    log::info!(
        "Harvesting set {:?} from {}",
        config.listing_set,
        config.listing_url
    );
    let pb = progress.stage_line("index");
    let listing = HttpListing::new(&config.listing_url, &config.listing_set);
    let index = build_index(&listing, &config.harvest, &pb);
    pb.finish_and_clear();
    let index = index.context("Cannot build metadata index")?;
    index
        .save(&path)
        .with_context(|| format!("Cannot write {}", path.display()))?;
    Ok(index)
}

/// Filter the promoted corpus.
pub fn run_postpass(config: &Config) -> FilterStats {
    log::info!("Post-pass over {}", config.corpus_dir().display());
    filter_corpus(&config.corpus_dir(), &config.postpass)
}

/// Assign period directories to splits and write `splits.json`.
pub fn write_splits(config: &Config) -> anyhow::Result<Splits> {
    let splits = assign_splits(&config.corpus_dir(), "corpus")
        .context("Cannot list corpus periods")?;
    splits
        .save(&config.splits_path())
        .context("Cannot write splits")?;
    Ok(splits)
}

/// Main entry point: index → manifest → shards → post-pass → splits.
pub fn run(config: &Config, progress: SharedProgress) -> anyhow::Result<RunSummary> {
    let start = Instant::now();
    prepare_output(config)?;
    log::info!(
        "texpile starting: source={}, workers={}, downloads={}",
        config.shard_base,
        config.workers,
        config.max_downloads
    );

    let source = source_for(&config.shard_base);
    let pb = progress.stage_line("manifest");
    let fetched = fetch_manifest(source.as_ref(), &config.manifest_path(), &pb);
    pb.finish_and_clear();
    fetched?;
    let mut shards = read_manifest(&config.manifest_path())?;
    if let Some(limit) = config.max_shards {
        shards.truncate(limit);
    }
    log::info!("Manifest lists {} shards", shards.len());

    let journal = Journal::open(&config.journal_path())
        .with_context(|| format!("Cannot open {}", config.journal_path().display()))?;
    let completed = Journal::completed(journal.path()).context("Cannot read journal")?;

    // The listing is only needed when a modern shard is still pending
    let needs_index = shards.iter().any(|s| {
        !completed.contains(s.stem()) && matches!(classify_era(&s.period), Ok(Era::Modern))
    });
    let index = if needs_index {
        load_or_build_index(config, &progress)?
    } else {
        log::info!("No pending modern shards, skipping metadata index");
        MetadataIndex::new()
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers.max(1))
        .build()
        .context("Failed to create thread pool")?;
    let downloads = Semaphore::new(config.max_downloads.clamp(1, config.workers.max(1)));
    let repairer = Repairer::default();
    let ctx = ShardContext {
        config,
        source: source.as_ref(),
        index: &index,
        repairer: &repairer,
        downloads: &downloads,
    };

    let ingest = pool.install(|| process_shards(shards, &completed, &ctx, &journal, &progress));
    let mut summary = RunSummary {
        index_size: index.len(),
        ingest,
        ..Default::default()
    };
    if is_shutdown_requested() {
        log::warn!("Shutdown requested, skipping post-pass");
        summary.interrupted = true;
        return Ok(summary);
    }
    if summary.ingest.failed_shards > 0 {
        log::warn!(
            "{} shards failed; they will be retried on the next run",
            summary.ingest.failed_shards
        );
    }

    if config.skip_postpass {
        log::info!("Post-pass skipped");
    } else {
        summary.postpass = Some(pool.install(|| run_postpass(config)));
        let splits = write_splits(config)?;
        summary.train_periods = splits.train.len();
        summary.valid_periods = splits.valid.len();
    }

    log::info!("texpile finished in {:.1}s", start.elapsed().as_secs_f64());
    Ok(summary)
}
