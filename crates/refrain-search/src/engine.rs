//! The similarity search engine.
//!
//! Scores are cosine similarities (`1 - cosine distance`) and are not
//! clipped, so a song pointing away from the query gets a negative score.
//! Results are ordered by score, best first, with ties broken by ascending
//! song id so the same query always yields the same list.

use std::cmp::Ordering;

use serde::Serialize;

use refrain_core::store::{DistanceMetric, RecordStore, ScanFilter, SongFilter};
use refrain_core::{vector, ModelSpec, Song};

use crate::error::{SearchError, SearchResult};

/// Absorbs rounding in the `1 - threshold` distance bound handed to the
/// store; the exact threshold is re-applied to the returned scores.
const DISTANCE_SLACK: f64 = 1e-9;

/// A song and its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub song: Song,
    #[serde(rename = "similarity")]
    pub score: f64,
}

/// Read-only ranking over the songs embedded with one model.
#[derive(Debug)]
pub struct SimilaritySearch<'a, S: ?Sized> {
    store: &'a S,
    model: ModelSpec,
}

impl<'a, S: RecordStore + ?Sized> SimilaritySearch<'a, S> {
    #[must_use]
    pub fn new(store: &'a S, model: ModelSpec) -> Self {
        Self { store, model }
    }

    /// Songs that are search candidates.
    ///
    /// # Errors
    /// Returns [`SearchError::Store`] if the store cannot be queried.
    pub fn embedded_count(&self) -> SearchResult<u64> {
        Ok(self.store.count(&SongFilter::current(&self.model))?)
    }

    /// Check that at least one song can be searched. Call this before
    /// embedding the query.
    ///
    /// # Errors
    /// Returns [`SearchError::NoEmbeddingsAvailable`] iff no song has an
    /// embedding for the model.
    pub fn ensure_ready(&self) -> SearchResult<()> {
        if self.embedded_count()? == 0 {
            return Err(SearchError::NoEmbeddingsAvailable);
        }
        Ok(())
    }

    /// Rank embedded songs against `query`.
    ///
    /// Returns at most `limit` hits with `score >= threshold`. A threshold
    /// of exactly `0.0` disables filtering altogether, so zero and negative
    /// scores are returned too. An empty result is not an error.
    ///
    /// # Errors
    /// Returns [`SearchError::InvalidQuery`] for a zero limit, a non-finite
    /// threshold, or a query vector of the wrong shape, and
    /// [`SearchError::Store`] if the scan fails.
    pub fn search(&self, query: &[f32], limit: usize, threshold: f64) -> SearchResult<Vec<SearchHit>> {
        if limit == 0 {
            return Err(SearchError::InvalidQuery("limit must be at least 1".to_string()));
        }
        if !threshold.is_finite() {
            return Err(SearchError::InvalidQuery(format!(
                "threshold must be a finite number, got {threshold}"
            )));
        }
        self.check_query(query)?;

        let filter_by_threshold = threshold != 0.0;
        let filter = ScanFilter {
            model: self.model.clone(),
            max_distance: filter_by_threshold.then(|| 1.0 - threshold + DISTANCE_SLACK),
        };

        let scored = self
            .store
            .scan_with_distance(query, DistanceMetric::Cosine, &filter, limit)?;

        let mut hits: Vec<SearchHit> = scored
            .into_iter()
            .map(|scored| SearchHit {
                score: 1.0 - scored.distance,
                song: scored.song,
            })
            .filter(|hit| !filter_by_threshold || hit.score >= threshold)
            .collect();

        hits.sort_by(rank);
        hits.truncate(limit);

        log::debug!(
            "Search over {} returned {} hits (limit {}, threshold {})",
            self.model,
            hits.len(),
            limit,
            threshold
        );
        Ok(hits)
    }

    fn check_query(&self, query: &[f32]) -> SearchResult<()> {
        if query.len() != self.model.dimensions {
            return Err(SearchError::InvalidQuery(format!(
                "query vector has {} dims, expected {}",
                query.len(),
                self.model.dimensions
            )));
        }
        if query.iter().any(|v| !v.is_finite()) {
            return Err(SearchError::InvalidQuery(
                "query vector contains non-finite values".to_string(),
            ));
        }
        if vector::norm(query) == 0.0 {
            return Err(SearchError::InvalidQuery("query vector is all zeros".to_string()));
        }
        Ok(())
    }
}

/// Best score first, then lowest id.
fn rank(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.song.id.cmp(&b.song.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use refrain_core::model::NewSong;
    use refrain_core::store::EmbeddingUpdate;
    use refrain_core::{Database, Embedding, SongId};

    fn model() -> ModelSpec {
        ModelSpec::new("test-model", 2)
    }

    fn corpus(vectors: &[[f32; 2]]) -> (Database, Vec<SongId>) {
        let mut db = Database::open_in_memory().unwrap();
        let songs: Vec<NewSong> = (0..vectors.len())
            .map(|i| NewSong::new(format!("Song {i}"), "Artist", "la la la"))
            .collect();
        let ids = db.insert_songs(&songs).unwrap();
        let updates: Vec<EmbeddingUpdate> = ids
            .iter()
            .zip(vectors)
            .map(|(id, v)| EmbeddingUpdate::new(*id, Embedding::new("test-model", v.to_vec())))
            .collect();
        db.set_embeddings(&updates).unwrap();
        (db, ids)
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_threshold_excludes_and_result_is_not_padded() {
        let (db, ids) = corpus(&[[0.9, 0.43589], [0.4, 0.916_515], [-0.1, 0.994_987]]);
        let engine = SimilaritySearch::new(&db, model());

        let hits = engine.search(&[1.0, 0.0], 2, 0.3).unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].song.id, ids[0]);
        assert!(approx(hits[0].score, 0.9));
    }

    #[test]
    fn test_zero_threshold_returns_negative_scores() {
        let (db, ids) = corpus(&[[0.9, 0.43589], [0.4, 0.916_515], [-0.1, 0.994_987]]);
        let engine = SimilaritySearch::new(&db, model());

        let hits = engine.search(&[1.0, 0.0], 10, 0.0).unwrap();

        let order: Vec<SongId> = hits.iter().map(|h| h.song.id).collect();
        assert_eq!(order, ids);
        assert!(approx(hits[2].score, -0.1));
    }

    #[test]
    fn test_zero_threshold_keeps_orthogonal_songs() {
        let (db, _) = corpus(&[[0.0, 1.0], [0.0, 2.0]]);
        let engine = SimilaritySearch::new(&db, model());

        let hits = engine.search(&[1.0, 0.0], 10, 0.0).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.score.abs() < 1e-12));
    }

    #[test]
    fn test_ties_break_by_ascending_id() {
        let (db, ids) = corpus(&[[0.0, 1.0], [2.0, 0.0], [1.0, 0.0], [3.0, 0.0]]);
        let engine = SimilaritySearch::new(&db, model());

        let hits = engine.search(&[1.0, 0.0], 10, 0.5).unwrap();

        let order: Vec<SongId> = hits.iter().map(|h| h.song.id).collect();
        assert_eq!(order, vec![ids[1], ids[2], ids[3]]);
    }

    #[test]
    fn test_limit_keeps_a_prefix_of_the_full_ranking() {
        let mut vectors: Vec<[f32; 2]> = (0..12u8)
            .map(|i| {
                let angle = f32::from(i) * 0.25;
                [angle.cos(), angle.sin()]
            })
            .collect();
        vectors.extend([[2.0, 0.0], [0.5, 0.0], [3.0, 0.0]]);
        let (db, _) = corpus(&vectors);
        let engine = SimilaritySearch::new(&db, model());

        let full: Vec<SongId> = engine
            .search(&[1.0, 0.0], 50, 0.0)
            .unwrap()
            .iter()
            .map(|h| h.song.id)
            .collect();
        assert_eq!(full.len(), vectors.len());

        for limit in 1..=vectors.len() {
            let cut: Vec<SongId> = engine
                .search(&[1.0, 0.0], limit, 0.0)
                .unwrap()
                .iter()
                .map(|h| h.song.id)
                .collect();
            assert_eq!(cut, full[..limit], "limit {limit}");
        }
    }

    #[test]
    fn test_scores_are_non_increasing_and_bounded_by_limit() {
        let vectors: Vec<[f32; 2]> = (0..20u8)
            .map(|i| {
                let angle = f32::from(i) * 0.3;
                [angle.cos(), angle.sin()]
            })
            .collect();
        let (db, _) = corpus(&vectors);
        let engine = SimilaritySearch::new(&db, model());

        for limit in [1, 5, 20, 50] {
            let hits = engine.search(&[0.6, 0.8], limit, 0.0).unwrap();
            assert_eq!(hits.len(), limit.min(20));
            for pair in hits.windows(2) {
                assert!(
                    pair[0].score > pair[1].score
                        || (pair[0].score == pair[1].score && pair[0].song.id < pair[1].song.id)
                );
            }
        }

        let filtered = engine.search(&[0.6, 0.8], 50, 0.7).unwrap();
        assert!(filtered.iter().all(|h| h.score >= 0.7));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let (db, _) = corpus(&[[1.0, 0.0]]);
        let engine = SimilaritySearch::new(&db, model());
        let hits = engine.search(&[1.0, 0.0], 1, 1.0).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_no_candidates_is_empty_not_error() {
        let (db, _) = corpus(&[[0.0, 1.0]]);
        let engine = SimilaritySearch::new(&db, model());
        assert!(engine.search(&[1.0, 0.0], 5, 0.9).unwrap().is_empty());
    }

    #[test]
    fn test_unembedded_and_stale_songs_are_not_candidates() {
        let (mut db, _) = corpus(&[[1.0, 0.0]]);
        db.insert_song(&NewSong::new("Pending", "Artist", "no vector"))
            .unwrap();
        let stale = db
            .insert_song(&NewSong::new("Stale", "Artist", "old vector"))
            .unwrap();
        db.set_embedding(stale, &Embedding::new("old-model", vec![1.0, 0.0]))
            .unwrap();

        let engine = SimilaritySearch::new(&db, model());
        assert_eq!(engine.embedded_count().unwrap(), 1);
        assert_eq!(engine.search(&[1.0, 0.0], 10, 0.0).unwrap().len(), 1);
    }

    #[test]
    fn test_no_embeddings_available_iff_zero() {
        let mut db = Database::open_in_memory().unwrap();
        let id = db.insert_song(&NewSong::new("A", "B", "c")).unwrap();
        let engine = SimilaritySearch::new(&db, model());
        assert!(matches!(
            engine.ensure_ready(),
            Err(SearchError::NoEmbeddingsAvailable)
        ));

        db.set_embedding(id, &Embedding::new("test-model", vec![0.0, 1.0]))
            .unwrap();
        let engine = SimilaritySearch::new(&db, model());
        assert!(engine.ensure_ready().is_ok());
        // Ready even though this query matches nothing.
        assert!(engine.search(&[1.0, 0.0], 5, 0.5).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_parameters() {
        let (db, _) = corpus(&[[1.0, 0.0]]);
        let engine = SimilaritySearch::new(&db, model());

        for result in [
            engine.search(&[1.0, 0.0], 0, 0.5),
            engine.search(&[1.0, 0.0], 5, f64::NAN),
            engine.search(&[1.0, 0.0, 0.0], 5, 0.5),
            engine.search(&[0.0, 0.0], 5, 0.5),
            engine.search(&[f32::INFINITY, 0.0], 5, 0.5),
        ] {
            assert!(matches!(result, Err(SearchError::InvalidQuery(_))));
        }
    }

    #[test]
    fn test_rank_orders_by_score_then_id() {
        let song = |id: i64| Song {
            id: SongId::new(id),
            ..sample_song()
        };
        let mut hits = vec![
            SearchHit { song: song(3), score: 0.5 },
            SearchHit { song: song(1), score: 0.5 },
            SearchHit { song: song(2), score: 0.9 },
            SearchHit { song: song(4), score: -0.2 },
        ];
        hits.sort_by(rank);
        let ids: Vec<i64> = hits.iter().map(|h| h.song.id.get()).collect();
        assert_eq!(ids, vec![2, 1, 3, 4]);
    }

    fn sample_song() -> Song {
        let db = Database::open_in_memory().unwrap();
        let id = db.insert_song(&NewSong::new("A", "B", "c")).unwrap();
        db.get_song(id).unwrap().unwrap()
    }
}
