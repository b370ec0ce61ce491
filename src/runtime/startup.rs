use std::path::Path;

use tracing::{info, warn};

use decksync::config::Settings;
use decksync::library::{CompatibilityQuery, LibraryIndex, LibrarySource, TrackRecord};
use decksync::scoring::Scorer;
use decksync::{Error, Result};

/// Build the index from `source`, refreshing the cache when one is configured.
///
/// An unreadable source falls back to the cache, if there is one.
pub fn open_index(source: &Path, settings: &Settings) -> Result<LibraryIndex> {
    let src = LibrarySource::detect(source);
    let cache = settings.library.cache_path.as_deref();

    let index = match LibraryIndex::build(&src, &settings.library) {
        Ok(index) => index,
        Err(e @ Error::Io { .. }) => match cache.filter(|c| c.is_file()) {
            Some(c) => {
                warn!(error = %e, cache = %c.display(), "source unreadable; using index cache");
                return LibraryIndex::load_cache(c);
            }
            None => return Err(e),
        },
        Err(e) => return Err(e),
    };

    if let Some(c) = cache {
        if !matches!(src, LibrarySource::Cache(_)) {
            match index.save_cache(c) {
                Ok(()) => info!(cache = %c.display(), "index cache refreshed"),
                Err(e) => warn!(error = %e, "could not write index cache"),
            }
        }
    }
    Ok(index)
}

pub fn print_summary(index: &LibraryIndex) {
    let with_tempo = index.iter().filter(|t| t.tempo.is_some()).count();
    let with_key = index.iter().filter(|t| t.key.is_some()).count();
    let source = index
        .source()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_string());
    println!("source:  {source}");
    println!("tracks:  {}", index.len());
    println!("tempo:   {with_tempo}");
    println!("key:     {with_key}");
}

pub fn print_suggestions(
    index: &LibraryIndex,
    seed: &TrackRecord,
    scorer: &Scorer,
    query: &CompatibilityQuery,
) {
    println!();
    println!("after {} [{}]:", seed.display(), describe(seed));
    let matches = index.compatible(seed, query, scorer);
    if matches.is_empty() {
        println!("  (no compatible tracks)");
    }
    for m in matches {
        let b = scorer.breakdown(seed, m.track);
        println!(
            "  {:>5.3}  #{:<5} {} [{}] key {:.1} tempo {:.1}",
            m.score,
            m.track.position,
            m.track.display(),
            describe(m.track),
            b.key,
            b.tempo
        );
    }
}

fn describe(t: &TrackRecord) -> String {
    let tempo = t
        .tempo
        .map(|b| format!("{b:.1} bpm"))
        .unwrap_or_else(|| "? bpm".to_string());
    let key = t
        .key
        .map(|k| k.to_string())
        .unwrap_or_else(|| "?".to_string());
    format!("{tempo}, {key}")
}
