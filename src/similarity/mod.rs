//! "Find similar artwork" search.
//!
//! Given one query image and a working set of candidate images drawn from
//! recent records, scores every candidate independently and returns a
//! ranked top-K list. Purely read + compute + return: nothing is cached or
//! persisted, and every search is recomputed from source images.
//!
//! This is a heuristic approximate-match tool, not a calibrated vision
//! system. The weights and thresholds in [`SimilarityConfig`] were tuned by
//! trial and error against real studio photos.

pub mod raster;
pub mod signals;

use rayon::prelude::*;

use crate::config::{SignalWeights, SimilarityConfig};
use crate::models::{MatchType, SimilarityMatch};
use raster::Raster;

/// A signal is only allowed to rescue the combined score when it is this
/// strong on its own. Without the floor, a mediocre luminance-only
/// structure score between two unrelated flat glazes sneaks past the
/// minimum threshold.
const RESCUE_FLOOR: f64 = 0.85;
/// Fraction of the best signal used by the rescue rule.
const RESCUE_FACTOR: f64 = 0.7;

/// One comparison candidate: image bytes plus enough record metadata for
/// the caller to display the match without re-querying.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub record_id: i64,
    pub business_id: String,
    pub customer_name: String,
    pub match_type: MatchType,
    /// Stored name of the candidate image.
    pub image: String,
    pub bytes: Vec<u8>,
}

/// Score the query against every candidate and return the ranked matches.
///
/// - An empty or undecodable query yields an empty result, not an error.
/// - A candidate that fails to decode is scored 0 and excluded; the rest of
///   the batch proceeds.
/// - Results are sorted by descending score, except that scores at or above
///   `promote_cutoff` are promoted ahead of all others so near-exact
///   duplicates surface first. Ordering is non-increasing within each group.
/// - Candidates are independent, so scoring fans out over a rayon pool.
pub fn search(
    query_bytes: &[u8],
    candidates: Vec<Candidate>,
    config: &SimilarityConfig,
) -> Vec<SimilarityMatch> {
    if query_bytes.is_empty() || candidates.is_empty() {
        return Vec::new();
    }

    let query = match Raster::decode(query_bytes, config.resolution) {
        Ok(raster) => raster,
        Err(_) => return Vec::new(),
    };

    let mut matches: Vec<(usize, SimilarityMatch)> = candidates
        .par_iter()
        .enumerate()
        .filter_map(|(index, candidate)| {
            let raster = Raster::decode(&candidate.bytes, config.resolution).ok()?;
            let score = score_pair(&query, &raster, &config.weights);
            if score < config.min_score {
                return None;
            }
            Some((
                index,
                SimilarityMatch {
                    record_id: candidate.record_id,
                    business_id: candidate.business_id.clone(),
                    customer_name: candidate.customer_name.clone(),
                    match_type: candidate.match_type,
                    image: candidate.image.clone(),
                    score,
                },
            ))
        })
        .collect();

    // Promote near-duplicates, then score descending; the original candidate
    // index keeps ties stable within one invocation.
    matches.sort_by(|(ia, a), (ib, b)| {
        let promoted_a = a.score >= config.promote_cutoff;
        let promoted_b = b.score >= config.promote_cutoff;
        promoted_b
            .cmp(&promoted_a)
            .then(b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal))
            .then(ia.cmp(ib))
    });
    matches.truncate(config.top_k);

    matches.into_iter().map(|(_, m)| m).collect()
}

/// Combine the per-signal scores for one (query, candidate) pair.
///
/// Signals that are uninformative for this pair are dropped and the
/// remaining weights renormalized. The rescue rule then keeps a single very
/// strong signal from being diluted below threshold by several weak,
/// irrelevant ones. Result is clamped to `[0, 1]`.
pub fn score_pair(query: &Raster, candidate: &Raster, weights: &SignalWeights) -> f64 {
    let scored: Vec<(f64, f64)> = [
        (weights.histogram, Some(signals::histogram(query, candidate))),
        (weights.structure, Some(signals::structure(query, candidate))),
        (weights.mean_color, Some(signals::mean_color(query, candidate))),
        (weights.color_sweep, Some(signals::color_sweep(query, candidate))),
        (weights.contour, signals::contour(query, candidate)),
        (weights.pattern, signals::pattern(query, candidate)),
        (weights.texture, signals::texture(query, candidate)),
        (weights.symmetry, signals::symmetry(query, candidate)),
    ]
    .into_iter()
    .filter_map(|(weight, value)| value.map(|v| (weight, v)))
    .collect();

    let weight_sum: f64 = scored.iter().map(|(w, _)| w).sum();
    if weight_sum <= 0.0 {
        return 0.0;
    }

    let weighted: f64 = scored.iter().map(|(w, v)| w * v).sum::<f64>() / weight_sum;
    let best = scored.iter().map(|(_, v)| *v).fold(0.0, f64::max);

    let score = if best >= RESCUE_FLOOR {
        weighted.max(RESCUE_FACTOR * best)
    } else {
        weighted
    };

    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes(w: u32, h: u32, r: u8, g: u8, b: u8) -> Vec<u8> {
        let img = RgbaImage::from_pixel(w, h, Rgba([r, g, b, 255]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    /// A busier fixture: white canvas with a dark disc.
    fn disc_bytes(radius: i32) -> Vec<u8> {
        let img = RgbaImage::from_fn(128, 128, |x, y| {
            let dx = x as i32 - 64;
            let dy = y as i32 - 64;
            if dx * dx + dy * dy <= radius * radius {
                Rgba([50, 45, 40, 255])
            } else {
                Rgba([235, 235, 230, 255])
            }
        });
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn candidate(id: i64, bytes: Vec<u8>) -> Candidate {
        Candidate {
            record_id: id,
            business_id: format!("240101-W-{:03}", id),
            customer_name: format!("customer {}", id),
            match_type: MatchType::Work,
            image: format!("work-{:016}.png", id),
            bytes,
        }
    }

    fn config() -> SimilarityConfig {
        SimilarityConfig::default()
    }

    fn decode(bytes: &[u8]) -> Raster {
        Raster::decode(bytes, 96).unwrap()
    }

    #[test]
    fn test_self_similarity_near_maximal() {
        let weights = SignalWeights::default();
        for bytes in [png_bytes(128, 128, 200, 40, 40), disc_bytes(40)] {
            let raster = decode(&bytes);
            let score = score_pair(&raster, &raster, &weights);
            assert!(score >= 0.95, "self-similarity was {}", score);
        }
    }

    #[test]
    fn test_black_vs_white_below_threshold() {
        let weights = SignalWeights::default();
        let black = decode(&png_bytes(96, 96, 0, 0, 0));
        let white = decode(&png_bytes(96, 96, 255, 255, 255));
        let score = score_pair(&black, &white, &weights);
        assert!(
            score < config().min_score,
            "black/white scored {} >= threshold",
            score
        );
        // The mean-color signal itself must be ~0
        assert!(signals::mean_color(&black, &white) < 1e-6);
    }

    #[test]
    fn test_score_always_in_unit_interval() {
        let weights = SignalWeights::default();
        let rasters = [
            decode(&png_bytes(96, 96, 0, 0, 0)),
            decode(&png_bytes(96, 96, 255, 255, 255)),
            decode(&disc_bytes(30)),
            decode(&png_bytes(40, 200, 17, 99, 230)),
        ];
        for a in &rasters {
            for b in &rasters {
                let score = score_pair(a, b, &weights);
                assert!((0.0..=1.0).contains(&score), "score out of range: {}", score);
            }
        }
    }

    #[test]
    fn test_red_blue_resized_scenario() {
        let query = png_bytes(128, 128, 220, 20, 20);
        let red = candidate(1, png_bytes(128, 128, 220, 20, 20));
        let blue = candidate(2, png_bytes(128, 128, 20, 20, 220));
        let red_resized = candidate(3, png_bytes(500, 500, 220, 20, 20));

        let results = search(&query, vec![red, blue, red_resized], &config());

        // Blue is filtered out under the default threshold
        assert!(results.iter().all(|m| m.record_id != 2));
        let exact = results.iter().find(|m| m.record_id == 1).unwrap();
        assert!(exact.score >= 0.9, "exact red scored {}", exact.score);
        let resized = results.iter().find(|m| m.record_id == 3).unwrap();
        assert!(resized.score >= 0.85, "resized red scored {}", resized.score);
    }

    #[test]
    fn test_empty_candidates_yield_empty_result() {
        let results = search(&png_bytes(64, 64, 1, 2, 3), Vec::new(), &config());
        assert!(results.is_empty());
    }

    #[test]
    fn test_empty_query_yields_empty_result() {
        let results = search(&[], vec![candidate(1, disc_bytes(20))], &config());
        assert!(results.is_empty());
    }

    #[test]
    fn test_undecodable_query_yields_empty_result() {
        let results = search(
            b"not an image",
            vec![candidate(1, disc_bytes(20))],
            &config(),
        );
        assert!(results.is_empty());
    }

    #[test]
    fn test_undecodable_candidate_skipped_not_fatal() {
        let query = disc_bytes(30);
        let mut candidates = vec![candidate(99, b"corrupt bytes".to_vec())];
        for id in 1..=9 {
            candidates.push(candidate(id, disc_bytes(30)));
        }

        let results = search(&query, candidates, &config());
        assert!(!results.is_empty());
        assert!(results.len() <= 9);
        assert!(results.iter().all(|m| m.record_id != 99));
    }

    #[test]
    fn test_threshold_zero_admits_every_decodable_candidate() {
        let mut cfg = config();
        cfg.min_score = 0.0;
        cfg.top_k = 100;

        let query = png_bytes(96, 96, 220, 20, 20);
        let candidates = vec![
            candidate(1, png_bytes(96, 96, 220, 20, 20)),
            candidate(2, png_bytes(96, 96, 20, 20, 220)),
            candidate(3, png_bytes(96, 96, 0, 0, 0)),
        ];

        let results = search(&query, candidates, &cfg);
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_result_capped_at_top_k() {
        let mut cfg = config();
        cfg.min_score = 0.0;
        cfg.top_k = 4;

        let query = disc_bytes(30);
        let candidates: Vec<Candidate> =
            (1..=10).map(|id| candidate(id, disc_bytes(30))).collect();

        let results = search(&query, candidates, &cfg);
        assert_eq!(results.len(), 4);
    }

    #[test]
    fn test_ordering_non_increasing_with_promotion() {
        let mut cfg = config();
        cfg.min_score = 0.0;
        cfg.top_k = 100;

        let query = disc_bytes(30);
        let candidates = vec![
            candidate(1, png_bytes(96, 96, 20, 20, 220)),
            candidate(2, disc_bytes(30)),
            candidate(3, disc_bytes(24)),
            candidate(4, png_bytes(96, 96, 0, 0, 0)),
            candidate(5, disc_bytes(30)),
        ];

        let results = search(&query, candidates, &cfg);

        let split = results
            .iter()
            .position(|m| m.score < cfg.promote_cutoff)
            .unwrap_or(results.len());
        let (promoted, rest) = results.split_at(split);
        for group in [promoted, rest] {
            for window in group.windows(2) {
                assert!(
                    window[0].score >= window[1].score,
                    "group not non-increasing: {} then {}",
                    window[0].score,
                    window[1].score
                );
            }
        }
        // Everything promoted sits at or above the cutoff
        assert!(promoted.iter().all(|m| m.score >= cfg.promote_cutoff));
    }

    #[test]
    fn test_search_deterministic_within_invocation_shape() {
        let query = disc_bytes(28);
        let candidates: Vec<Candidate> =
            (1..=6).map(|id| candidate(id, disc_bytes(28))).collect();

        let first = search(&query, candidates.clone(), &config());
        let second = search(&query, candidates, &config());
        let ids_first: Vec<i64> = first.iter().map(|m| m.record_id).collect();
        let ids_second: Vec<i64> = second.iter().map(|m| m.record_id).collect();
        assert_eq!(ids_first, ids_second);
    }
}
