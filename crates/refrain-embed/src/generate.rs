//! The embedding generation pipeline.
//!
//! Walks the backlog of songs that have no embedding for the configured
//! model, in ascending id order and one bounded page at a time. Each page
//! is split into batches; a batch is embedded with one provider call and
//! committed atomically. When the provider fails a whole batch, its songs
//! are retried one by one and each success is persisted on its own. When
//! a batch commit fails, its embeddings are saved one song at a time
//! instead. Songs that still fail are reported and left for a later run.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use refrain_core::model::truncate_chars;
use refrain_core::store::{EmbeddingUpdate, RecordStore, SongFilter};
use refrain_core::{Song, SongId};

use crate::error::{EmbedError, EmbedResult};
use crate::provider::{check_response, EmbeddingProvider};
use crate::resilience::{Pacer, StopSignal};

/// Batching and pacing knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Songs per provider call.
    pub batch_size: usize,
    /// Batches per backlog page.
    pub working_set_batches: usize,
    /// Pause between successful batch calls.
    pub batch_delay: Duration,
    /// Pause between per-song fallback calls.
    pub individual_delay: Duration,
    /// Composite texts are cut to this many characters before embedding.
    pub max_input_chars: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            batch_size: 50,
            working_set_batches: 10,
            batch_delay: Duration::from_secs(1),
            individual_delay: Duration::from_millis(500),
            max_input_chars: 8000,
        }
    }
}

impl PipelineOptions {
    /// Songs loaded per backlog page.
    #[must_use]
    pub fn working_set_size(&self) -> usize {
        self.batch_size.max(1) * self.working_set_batches.max(1)
    }
}

/// Why a song could not be embedded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ProviderUnavailable,
    ProviderRejected,
    Persistence,
}

impl From<&EmbedError> for FailureKind {
    fn from(err: &EmbedError) -> Self {
        match err {
            EmbedError::ProviderUnavailable { .. } => Self::ProviderUnavailable,
            EmbedError::Persistence(_) => Self::Persistence,
            _ => Self::ProviderRejected,
        }
    }
}

/// A song left without an embedding by this run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordFailure {
    pub id: SongId,
    pub kind: FailureKind,
    pub message: String,
}

/// What a pipeline run did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineReport {
    /// Backlog pages processed.
    pub rounds: usize,
    pub batches_committed: usize,
    /// Batches whose provider call failed and were retried song by song.
    pub batches_fallen_back: usize,
    /// Batches whose commit failed and were saved again song by song.
    pub commits_split: usize,
    /// Songs embedded, whether by batch or individually.
    pub embedded: usize,
    pub embedded_individually: usize,
    pub failures: Vec<RecordFailure>,
    /// The run ended early because a stop was requested.
    pub stopped: bool,
    /// Backlog size when the run ended.
    pub remaining: u64,
}

impl PipelineReport {
    /// Nothing failed, nothing was left behind.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && !self.stopped && self.remaining == 0
    }

    fn fail(&mut self, id: SongId, err: &EmbedError) {
        log::warn!("Song {id} left without an embedding: {err}");
        self.failures.push(RecordFailure {
            id,
            kind: FailureKind::from(err),
            message: err.to_string(),
        });
    }
}

/// Drives every pending song to an embedded state.
///
/// Running it again with no new songs is a no-op, so an interrupted run
/// can simply be restarted. It should not run concurrently with itself.
#[derive(Debug)]
pub struct EmbeddingPipeline<P: ?Sized> {
    options: PipelineOptions,
    provider: Arc<P>,
}

impl<P: EmbeddingProvider + ?Sized> EmbeddingPipeline<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, options: PipelineOptions) -> Self {
        Self { options, provider }
    }

    #[must_use]
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Songs that still need an embedding from the provider's model.
    ///
    /// # Errors
    /// Returns [`EmbedError::Persistence`] if the store cannot be queried.
    pub fn backlog<S: RecordStore>(&self, store: &S) -> EmbedResult<u64> {
        Ok(store.count(&SongFilter::pending(self.provider.model()))?)
    }

    /// Embed the whole backlog.
    ///
    /// Provider failures and commit failures are recorded in the report
    /// and do not end the run. `stop` is checked between batches; the batch
    /// in flight is always finished.
    ///
    /// # Errors
    /// Returns [`EmbedError::Persistence`] only if the backlog itself cannot
    /// be read.
    pub async fn run<S: RecordStore + Send>(
        &self,
        store: &mut S,
        stop: &StopSignal,
    ) -> EmbedResult<PipelineReport> {
        let model = self.provider.model().clone();
        let batch_size = self.options.batch_size.max(1);
        let pacer = Pacer::new(self.options.batch_delay);
        let mut report = PipelineReport::default();
        let mut cursor: Option<SongId> = None;
        let mut pace_next = false;

        let backlog = self.backlog(store)?;
        log::info!("Embedding backlog: {backlog} songs for {model}");

        'rounds: loop {
            if stop.is_stopped() {
                report.stopped = true;
                break;
            }

            let mut filter = SongFilter::pending(&model).with_limit(self.options.working_set_size());
            if let Some(last) = cursor {
                filter = filter.after(last);
            }
            let page = store.find(&filter)?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(last.id);
            report.rounds += 1;
            log::debug!("Round {}: {} songs", report.rounds, page.len());

            for batch in page.chunks(batch_size) {
                if pace_next && !pacer.pause(stop).await {
                    report.stopped = true;
                    break 'rounds;
                }
                if stop.is_stopped() {
                    report.stopped = true;
                    break 'rounds;
                }
                pace_next = self.process_batch(store, batch, &mut report).await;
            }

            let backlog = self.backlog(store)?;
            log::info!(
                "Round {} done: {} embedded so far, {} pending",
                report.rounds,
                report.embedded,
                backlog
            );
        }

        report.remaining = self.backlog(store)?;
        if report.stopped {
            log::info!("Embedding stopped with {} songs pending", report.remaining);
        }
        Ok(report)
    }

    /// Embed and commit one batch. Returns `true` when the batch was
    /// embedded by a single provider call.
    async fn process_batch<S: RecordStore + Send>(
        &self,
        store: &mut S,
        batch: &[Song],
        report: &mut PipelineReport,
    ) -> bool {
        let texts: Vec<String> = batch
            .iter()
            .map(|song| self.input_for(song).to_string())
            .collect();
        let result = match self.provider.embed(&texts).await {
            Ok(embeddings) => {
                check_response(self.provider.model(), batch.len(), &embeddings).map(|()| embeddings)
            }
            Err(err) => Err(err),
        };

        let embeddings = match result {
            Ok(embeddings) => embeddings,
            Err(err) => {
                log::warn!(
                    "Batch of {} songs failed ({err}); retrying individually",
                    batch.len()
                );
                report.batches_fallen_back += 1;
                self.embed_individually(store, batch, report).await;
                return false;
            }
        };

        let updates: Vec<EmbeddingUpdate> = batch
            .iter()
            .zip(embeddings)
            .map(|(song, embedding)| EmbeddingUpdate::new(song.id, embedding))
            .collect();

        match store.commit_batch(&updates) {
            Ok(()) => {
                report.batches_committed += 1;
                report.embedded += batch.len();
                log::debug!("Committed batch of {} songs", batch.len());
                true
            }
            Err(err) => {
                log::error!("Batch commit rolled back ({err}); saving songs one at a time");
                report.commits_split += 1;
                for update in &updates {
                    match store.update_embedding(update.id, &update.embedding) {
                        Ok(()) => {
                            report.embedded += 1;
                            report.embedded_individually += 1;
                        }
                        Err(err) => report.fail(update.id, &EmbedError::Persistence(err)),
                    }
                }
                true
            }
        }
    }

    /// The provider input for `song`, cut to the configured length.
    fn input_for<'s>(&self, song: &'s Song) -> &'s str {
        let text = truncate_chars(&song.full_text, self.options.max_input_chars);
        if text.len() < song.full_text.len() {
            log::debug!(
                "Song {} text cut to {} characters",
                song.id,
                self.options.max_input_chars
            );
        }
        text
    }

    async fn embed_individually<S: RecordStore + Send>(
        &self,
        store: &mut S,
        batch: &[Song],
        report: &mut PipelineReport,
    ) {
        for (i, song) in batch.iter().enumerate() {
            if i > 0 && !self.options.individual_delay.is_zero() {
                tokio::time::sleep(self.options.individual_delay).await;
            }

            let embedding = match self.embed_song(song).await {
                Ok(embedding) => embedding,
                Err(err) => {
                    report.fail(song.id, &err);
                    continue;
                }
            };

            match store.update_embedding(song.id, &embedding) {
                Ok(()) => {
                    report.embedded += 1;
                    report.embedded_individually += 1;
                }
                Err(err) => report.fail(song.id, &EmbedError::Persistence(err)),
            }
        }
    }

    async fn embed_song(&self, song: &Song) -> EmbedResult<refrain_core::Embedding> {
        let mut embeddings = self
            .provider
            .embed(&[self.input_for(song).to_string()])
            .await?;
        check_response(self.provider.model(), 1, &embeddings)?;
        embeddings.pop().ok_or_else(|| EmbedError::ProviderRejected {
            message: "provider returned no embedding".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockProvider;
    use refrain_core::model::NewSong;
    use refrain_core::store::{DistanceMetric, EmbeddingStats, ScanFilter, ScoredSong};
    use refrain_core::{Database, Embedding, ModelSpec};

    /// Wraps a database; fails the first `failing_commits` batch commits
    /// and every single write to a song in `failing_updates`.
    struct FlakyStore {
        db: Database,
        failing_commits: usize,
        failing_updates: Vec<SongId>,
    }

    impl FlakyStore {
        fn new(db: Database) -> Self {
            Self {
                db,
                failing_commits: 0,
                failing_updates: Vec::new(),
            }
        }

        fn disk_full() -> refrain_core::Error {
            refrain_core::Error::InvalidData("disk full".to_string())
        }
    }

    impl RecordStore for FlakyStore {
        fn find(&self, filter: &SongFilter) -> refrain_core::Result<Vec<Song>> {
            self.db.find(filter)
        }

        fn count(&self, filter: &SongFilter) -> refrain_core::Result<u64> {
            self.db.count(filter)
        }

        fn get(&self, id: SongId) -> refrain_core::Result<Option<Song>> {
            RecordStore::get(&self.db, id)
        }

        fn scan_with_distance(
            &self,
            query: &[f32],
            metric: DistanceMetric,
            filter: &ScanFilter,
            limit: usize,
        ) -> refrain_core::Result<Vec<ScoredSong>> {
            self.db.scan_with_distance(query, metric, filter, limit)
        }

        fn update_embedding(&mut self, id: SongId, embedding: &Embedding) -> refrain_core::Result<()> {
            if self.failing_updates.contains(&id) {
                return Err(Self::disk_full());
            }
            self.db.update_embedding(id, embedding)
        }

        fn commit_batch(&mut self, updates: &[EmbeddingUpdate]) -> refrain_core::Result<()> {
            if self.failing_commits > 0 {
                self.failing_commits -= 1;
                return Err(Self::disk_full());
            }
            self.db.commit_batch(updates)
        }

        fn embedding_stats(&self, model: &ModelSpec) -> refrain_core::Result<EmbeddingStats> {
            RecordStore::embedding_stats(&self.db, model)
        }
    }

    fn model() -> ModelSpec {
        ModelSpec::new("mock", 4)
    }

    fn options(batch_size: usize, working_set_batches: usize) -> PipelineOptions {
        PipelineOptions {
            batch_size,
            working_set_batches,
            batch_delay: Duration::ZERO,
            individual_delay: Duration::ZERO,
            max_input_chars: 8000,
        }
    }

    fn seed(db: &mut Database, n: usize) -> Vec<SongId> {
        let songs: Vec<NewSong> = (0..n)
            .map(|i| NewSong::new(format!("Song {i}"), "Artist", format!("lyrics number {i}")))
            .collect();
        db.insert_songs(&songs).unwrap()
    }

    #[test]
    fn test_working_set_size() {
        assert_eq!(options(50, 10).working_set_size(), 500);
        assert_eq!(options(0, 0).working_set_size(), 1);
    }

    #[tokio::test]
    async fn test_embeds_backlog_in_batches() {
        let mut db = Database::open_in_memory().unwrap();
        seed(&mut db, 7);
        let provider = Arc::new(MockProvider::new(model()));
        let pipeline = EmbeddingPipeline::new(Arc::clone(&provider), options(3, 1));

        let report = pipeline.run(&mut db, &StopSignal::new()).await.unwrap();

        assert_eq!(report.rounds, 3);
        assert_eq!(report.batches_committed, 3);
        assert_eq!(report.embedded, 7);
        assert_eq!(report.embedded_individually, 0);
        assert!(report.is_complete());
        assert_eq!(provider.batch_sizes(), vec![3, 3, 1]);
    }

    #[tokio::test]
    async fn test_page_is_split_into_batches() {
        let mut db = Database::open_in_memory().unwrap();
        seed(&mut db, 5);
        let provider = Arc::new(MockProvider::new(model()));
        let pipeline = EmbeddingPipeline::new(Arc::clone(&provider), options(2, 10));

        let report = pipeline.run(&mut db, &StopSignal::new()).await.unwrap();

        assert_eq!(report.rounds, 1);
        assert_eq!(provider.batch_sizes(), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let mut db = Database::open_in_memory().unwrap();
        seed(&mut db, 4);
        let provider = Arc::new(MockProvider::new(model()));
        let pipeline = EmbeddingPipeline::new(Arc::clone(&provider), options(2, 2));

        pipeline.run(&mut db, &StopSignal::new()).await.unwrap();
        let calls = provider.call_count();
        let second = pipeline.run(&mut db, &StopSignal::new()).await.unwrap();

        assert_eq!(second.rounds, 0);
        assert_eq!(second.embedded, 0);
        assert_eq!(provider.call_count(), calls);
    }

    #[tokio::test]
    async fn test_batch_failure_falls_back_to_individual() {
        let mut db = Database::open_in_memory().unwrap();
        let ids = seed(&mut db, 5);
        let provider = Arc::new(MockProvider::new(model()).failing_batches());
        let pipeline = EmbeddingPipeline::new(Arc::clone(&provider), options(3, 10));

        let report = pipeline.run(&mut db, &StopSignal::new()).await.unwrap();

        assert_eq!(report.batches_committed, 0);
        assert_eq!(report.batches_fallen_back, 2);
        assert_eq!(report.embedded, 5);
        assert_eq!(report.embedded_individually, 5);
        assert!(report.is_complete());
        assert_eq!(provider.batch_sizes(), vec![3, 1, 1, 1, 2, 1, 1]);

        let stored = db.get_embedding(ids[0]).unwrap().unwrap();
        assert_eq!(stored.values, provider.vector_for(&db.get_song(ids[0]).unwrap().unwrap().full_text));
    }

    #[tokio::test]
    async fn test_individual_failures_are_reported_not_fatal() {
        let mut db = Database::open_in_memory().unwrap();
        db.insert_songs(&[
            NewSong::new("Fine", "A", "all good"),
            NewSong::new("Bad", "A", "poison inside"),
            NewSong::new("Also Fine", "A", "still good"),
        ])
        .unwrap();
        let provider = Arc::new(MockProvider::new(model()).rejecting("poison"));
        let pipeline = EmbeddingPipeline::new(Arc::clone(&provider), options(3, 1));

        let report = pipeline.run(&mut db, &StopSignal::new()).await.unwrap();

        assert_eq!(report.embedded, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, FailureKind::ProviderRejected);
        assert_eq!(report.remaining, 1);
        assert!(!report.is_complete());

        // The failed song is retried by the next run, once.
        let calls = provider.call_count();
        let second = pipeline.run(&mut db, &StopSignal::new()).await.unwrap();
        assert_eq!(second.failures.len(), 1);
        assert_eq!(provider.call_count(), calls + 2);
    }

    #[tokio::test]
    async fn test_stale_embeddings_are_replaced() {
        let mut db = Database::open_in_memory().unwrap();
        let ids = seed(&mut db, 2);
        db.set_embedding(ids[0], &Embedding::new("old-model", vec![1.0, 0.0]))
            .unwrap();

        let provider = Arc::new(MockProvider::new(model()));
        let pipeline = EmbeddingPipeline::new(provider, options(10, 1));
        assert_eq!(pipeline.backlog(&db).unwrap(), 2);

        let report = pipeline.run(&mut db, &StopSignal::new()).await.unwrap();
        assert_eq!(report.embedded, 2);

        let stored = db.get_embedding(ids[0]).unwrap().unwrap();
        assert!(stored.matches(&model()));
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let mut db = Database::open_in_memory().unwrap();
        seed(&mut db, 3);
        let provider = Arc::new(MockProvider::new(model()));
        let pipeline = EmbeddingPipeline::new(Arc::clone(&provider), options(1, 1));

        let stop = StopSignal::new();
        stop.stop();
        let report = pipeline.run(&mut db, &stop).await.unwrap();

        assert!(report.stopped);
        assert_eq!(report.remaining, 3);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_between_batches() {
        let mut db = Database::open_in_memory().unwrap();
        seed(&mut db, 6);
        let provider = Arc::new(MockProvider::new(model()));
        let pipeline = EmbeddingPipeline::new(
            Arc::clone(&provider),
            PipelineOptions {
                batch_delay: Duration::from_secs(60),
                ..options(2, 10)
            },
        );

        let stop = StopSignal::new();
        let stopper = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            stopper.stop();
        });

        let report = pipeline.run(&mut db, &stop).await.unwrap();

        assert!(report.stopped);
        assert_eq!(report.embedded, 2);
        assert_eq!(report.remaining, 4);
    }

    #[tokio::test]
    async fn test_failed_commit_is_saved_song_by_song() {
        let mut db = Database::open_in_memory().unwrap();
        seed(&mut db, 4);
        let mut store = FlakyStore::new(db);
        store.failing_commits = 1;
        let provider = Arc::new(MockProvider::new(model()));
        let pipeline = EmbeddingPipeline::new(Arc::clone(&provider), options(2, 1));

        let report = pipeline.run(&mut store, &StopSignal::new()).await.unwrap();

        assert_eq!(report.rounds, 2);
        assert_eq!(report.batches_committed, 1);
        assert_eq!(report.commits_split, 1);
        assert_eq!(report.embedded, 4);
        assert_eq!(report.embedded_individually, 2);
        assert!(report.is_complete());
        // The rolled-back embeddings are reused, not requested again.
        assert_eq!(provider.batch_sizes(), vec![2, 2]);
    }

    #[tokio::test]
    async fn test_store_failures_are_reported_and_run_continues() {
        let mut db = Database::open_in_memory().unwrap();
        let ids = seed(&mut db, 4);
        let mut store = FlakyStore::new(db);
        store.failing_commits = usize::MAX;
        store.failing_updates = vec![ids[1]];
        let provider = Arc::new(MockProvider::new(model()));
        let pipeline = EmbeddingPipeline::new(Arc::clone(&provider), options(2, 1));

        let report = pipeline.run(&mut store, &StopSignal::new()).await.unwrap();

        assert_eq!(report.rounds, 2);
        assert_eq!(report.batches_committed, 0);
        assert_eq!(report.commits_split, 2);
        assert_eq!(report.embedded, 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].id, ids[1]);
        assert_eq!(report.failures[0].kind, FailureKind::Persistence);
        assert_eq!(report.remaining, 1);
    }

    #[tokio::test]
    async fn test_fallback_write_failure_is_persistence() {
        let mut db = Database::open_in_memory().unwrap();
        let ids = seed(&mut db, 3);
        let mut store = FlakyStore::new(db);
        store.failing_updates = vec![ids[0]];
        let provider = Arc::new(MockProvider::new(model()).failing_batches());
        let pipeline = EmbeddingPipeline::new(Arc::clone(&provider), options(3, 1));

        let report = pipeline.run(&mut store, &StopSignal::new()).await.unwrap();

        assert_eq!(report.batches_fallen_back, 1);
        assert_eq!(report.embedded, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, FailureKind::Persistence);
        assert_eq!(report.remaining, 1);
    }

    #[tokio::test]
    async fn test_long_song_is_cut_to_input_limit() {
        let mut db = Database::open_in_memory().unwrap();
        let ids = db
            .insert_songs(&[
                NewSong::new("Long", "Artist", "la ".repeat(3000)),
                NewSong::new("Short", "Artist", "la la"),
            ])
            .unwrap();
        assert!(db.get_song(ids[0]).unwrap().unwrap().full_text.chars().count() > 8000);

        let provider = Arc::new(MockProvider::new(model()));
        let pipeline = EmbeddingPipeline::new(Arc::clone(&provider), options(10, 1));

        let report = pipeline.run(&mut db, &StopSignal::new()).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.embedded, 2);
        assert_eq!(provider.batch_sizes(), vec![2]);
        let texts = provider.texts_seen();
        assert_eq!(texts[0].chars().count(), 8000);
        assert!(texts[0].starts_with("Title: Long. Artist: Artist. Lyrics: la la"));
        assert_eq!(texts[1], "Title: Short. Artist: Artist. Lyrics: la la");
    }
}
