//! Result ranking.
//!
//! Selection is by confidence only. Equal top scores are broken uniformly at
//! random so that equally plausible providers share the traffic.

use crate::aggregator::ReplyBatch;
use core_media::{MediaItem, MediaType, PlaybackType};
use core_runtime::config::SearchConfig;
use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::debug;

/// Flatten per-provider batches into one result list, keeping arrival order.
pub fn flatten_batches(batches: Vec<ReplyBatch>) -> Vec<MediaItem> {
    batches
        .into_iter()
        .flat_map(|batch| batch.results)
        .collect()
}

/// Pick the best result, breaking ties at random.
pub fn search_best(results: &[MediaItem]) -> Option<MediaItem> {
    search_best_with(results, &mut rand::rng())
}

/// [`search_best`] with an explicit random source.
pub fn search_best_with<R: Rng + ?Sized>(results: &[MediaItem], rng: &mut R) -> Option<MediaItem> {
    let mut best: Option<&MediaItem> = None;
    let mut ties: Vec<&MediaItem> = Vec::new();

    for result in results {
        match best {
            Some(current) if result.confidence() < current.confidence() => {}
            Some(current) if result.confidence() == current.confidence() => ties.push(result),
            _ => {
                best = Some(result);
                ties.clear();
            }
        }
    }

    let best = best?;
    if ties.is_empty() {
        return Some(best.clone());
    }

    ties.push(best);
    debug!(
        candidates = ties.len(),
        confidence = best.confidence(),
        "Breaking confidence tie at random"
    );
    ties.choose(rng).map(|item| (*item).clone())
}

/// Drop results that cannot or should not be played.
///
/// - confidence below `min_score`
/// - video and web results when no GUI is available
/// - other media types, when media type filtering is on and the query was
///   not generic
pub fn filter_results(
    results: Vec<MediaItem>,
    media_type: MediaType,
    config: &SearchConfig,
    has_gui: bool,
) -> Vec<MediaItem> {
    let before = results.len();
    let filtered: Vec<MediaItem> = results
        .into_iter()
        .filter(|item| item.confidence() >= config.min_score)
        .filter(|item| {
            has_gui || !matches!(item.playback_type(), PlaybackType::Video | PlaybackType::Webview)
        })
        .filter(|item| {
            !config.filter_media_type
                || media_type == MediaType::Generic
                || item.media_type() == media_type
        })
        .collect();

    if filtered.len() != before {
        debug!(before, after = filtered.len(), "Filtered search results");
    }
    filtered
}

/// Sort by descending confidence; equal scores keep arrival order.
pub fn sort_results(results: &mut [MediaItem]) {
    results.sort_by(|a, b| b.confidence().cmp(&a.confidence()));
}
