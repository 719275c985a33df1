use crate::error::{Result, ShortenerError};
use burrow_batcher::{DeleteIntake, EnqueueError};
use burrow_core::{DeleteRequest, Repository, ShortCode, StorageError, UrlRecord, UserId};
use burrow_generator::Generator;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How many codes are drawn for one request before giving up on collisions.
pub const MAX_CODE_ATTEMPTS: usize = 5;

/// Outcome of [`ShortenerService::shorten`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shortened {
    /// A new record was stored under this code.
    Created(ShortCode),
    /// The URL was already shortened; this is the code it was stored under.
    Existing(ShortCode),
}

impl Shortened {
    pub fn code(&self) -> &ShortCode {
        match self {
            Shortened::Created(code) | Shortened::Existing(code) => code,
        }
    }

    pub fn into_code(self) -> ShortCode {
        match self {
            Shortened::Created(code) | Shortened::Existing(code) => code,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Shortened::Created(_))
    }
}

/// Composition of a repository, a code generator and the delete pipeline.
///
/// This is the surface an HTTP layer calls into. The repository is shared
/// with the [`DeleteBatcher`](burrow_batcher::DeleteBatcher) that owns the
/// other end of `deletes`.
pub struct ShortenerService<R: ?Sized, G> {
    repository: Arc<R>,
    generator: Arc<G>,
    deletes: DeleteIntake,
}

impl<R: ?Sized, G> Clone for ShortenerService<R, G> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            generator: Arc::clone(&self.generator),
            deletes: self.deletes.clone(),
        }
    }
}

impl<R, G> ShortenerService<R, G>
where
    R: Repository + ?Sized,
    G: Generator,
{
    pub fn new(repository: Arc<R>, generator: G, deletes: DeleteIntake) -> Self {
        Self {
            repository,
            generator: Arc::new(generator),
            deletes,
        }
    }

    fn validate_url(url: &str) -> Result<&str> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ShortenerError::InvalidUrl(
                "URL cannot be empty".to_string(),
            ));
        }
        Ok(url)
    }

    fn generate_code(&self) -> ShortCode {
        self.generator.generate().into()
    }

    /// Shortens `original` on behalf of `owner`.
    ///
    /// A URL that is already stored is not stored again; its existing code is
    /// returned as [`Shortened::Existing`], whoever owns it.
    pub async fn shorten(&self, owner: &UserId, original: &str) -> Result<Shortened> {
        let original = Self::validate_url(original)?;

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let record = UrlRecord::new(owner.clone(), original, self.generate_code());

            match self.repository.save_one(record).await {
                Ok(code) => {
                    info!(owner = %owner, code = %code, "url shortened");
                    return Ok(Shortened::Created(code));
                }
                Err(StorageError::AlreadyExists(code)) => {
                    debug!(owner = %owner, code = %code, "url already shortened");
                    return Ok(Shortened::Existing(code));
                }
                Err(StorageError::CodeTaken(code)) => {
                    warn!(attempt, code = %code, "generated code already taken");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(ShortenerError::CodesExhausted(MAX_CODE_ATTEMPTS))
    }

    /// Shortens every URL in `originals` and returns one code per input, in
    /// input order.
    ///
    /// How an already stored URL inside the batch is handled depends on the
    /// backend: the memory and file stores hand back its existing code, the
    /// relational store rejects the whole batch.
    pub async fn shorten_batch(
        &self,
        owner: &UserId,
        originals: &[String],
    ) -> Result<Vec<ShortCode>> {
        let originals = originals
            .iter()
            .map(|url| Self::validate_url(url))
            .collect::<Result<Vec<_>>>()?;

        if originals.is_empty() {
            return Ok(Vec::new());
        }

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let records = originals
                .iter()
                .map(|url| UrlRecord::new(owner.clone(), *url, self.generate_code()))
                .collect();

            match self.repository.save_many(records).await {
                Ok(saved) => {
                    info!(owner = %owner, batch = saved.len(), "url batch shortened");
                    return Ok(saved.into_iter().map(|record| record.code).collect());
                }
                Err(StorageError::CodeTaken(code)) => {
                    warn!(attempt, code = %code, "generated code already taken, redrawing batch");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(ShortenerError::CodesExhausted(MAX_CODE_ATTEMPTS))
    }

    /// Resolves a code to its original URL.
    ///
    /// A malformed code cannot have been issued, so it is `NotFound` without
    /// a storage round trip.
    pub async fn resolve(&self, code: &str) -> Result<String> {
        let code = match ShortCode::new(code) {
            Ok(code) => code,
            Err(err) => {
                debug!(code, error = %err, "malformed short code");
                return Err(ShortenerError::NotFound(ShortCode::new_unchecked(code)));
            }
        };
        let original = self.repository.resolve(&code).await?;
        debug!(code = %code, "short code resolved");
        Ok(original)
    }

    /// Every record `owner` created, tombstoned ones included.
    pub async fn urls_for(&self, owner: &UserId) -> Result<Vec<UrlRecord>> {
        Ok(self.repository.list_by_owner(owner).await?)
    }

    /// Queues soft deletes of `codes` for `owner` and returns how many were
    /// accepted.
    ///
    /// Acceptance only means the request reached the delete pipeline; the
    /// records stay resolvable until the next flush. When the intake stays
    /// full past its timeout the remaining codes are dropped and the count
    /// reflects that.
    pub async fn request_deletes(&self, owner: &UserId, codes: Vec<ShortCode>) -> Result<usize> {
        let requested = codes.len();
        let mut accepted = 0;

        for code in codes {
            match self
                .deletes
                .enqueue(DeleteRequest::new(owner.clone(), code))
                .await
            {
                Ok(()) => accepted += 1,
                Err(EnqueueError::Closed) => return Err(ShortenerError::DeletesClosed),
                Err(err) => {
                    warn!(
                        owner = %owner,
                        accepted,
                        rejected = requested - accepted,
                        error = %err,
                        "delete intake saturated"
                    );
                    break;
                }
            }
        }

        debug!(owner = %owner, requested, accepted, "delete requests queued");
        Ok(accepted)
    }

    pub async fn ping(&self) -> Result<()> {
        Ok(self.repository.health_check().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_batcher::{BatcherSettings, DeleteBatcher};
    use burrow_generator::RandomGenerator;
    use burrow_storage::InMemoryRepository;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Hands out a fixed sequence of codes, then repeats the last one.
    struct ScriptedGenerator {
        codes: Mutex<VecDeque<&'static str>>,
        last: Mutex<&'static str>,
    }

    impl ScriptedGenerator {
        fn new(codes: &[&'static str]) -> Self {
            Self {
                codes: Mutex::new(codes.iter().copied().collect()),
                last: Mutex::new(codes[0]),
            }
        }
    }

    impl Generator for ScriptedGenerator {
        type Output = ShortCode;

        fn generate(&self) -> ShortCode {
            let mut last = self.last.lock();
            if let Some(next) = self.codes.lock().pop_front() {
                *last = next;
            }
            ShortCode::new_unchecked(*last)
        }
    }

    struct Harness<G> {
        service: ShortenerService<InMemoryRepository, G>,
        repository: Arc<InMemoryRepository>,
        batcher: DeleteBatcher,
    }

    fn harness<G: Generator>(generator: G) -> Harness<G> {
        let repository = Arc::new(InMemoryRepository::new());
        let batcher = DeleteBatcher::spawn(
            Arc::clone(&repository),
            BatcherSettings::builder()
                .flush_interval(Duration::from_secs(1))
                .build(),
        );
        let service = ShortenerService::new(Arc::clone(&repository), generator, batcher.intake());

        Harness {
            service,
            repository,
            batcher,
        }
    }

    fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    #[tokio::test]
    async fn shorten_creates_then_reports_existing() {
        let h = harness(RandomGenerator::seeded(7));

        let first = h.service.shorten(&user("u1"), "http://a.com").await.unwrap();
        assert!(first.is_created());
        assert_eq!(first.code().as_str().len(), 8);

        let second = h.service.shorten(&user("u2"), "http://a.com").await.unwrap();
        assert_eq!(second, Shortened::Existing(first.code().clone()));
        assert_eq!(h.repository.len(), 1);
    }

    #[tokio::test]
    async fn shorten_redraws_taken_codes() {
        let h = harness(ScriptedGenerator::new(&["TAKENAAA", "TAKENAAA", "FRESHBBB"]));

        let first = h.service.shorten(&user("u1"), "http://a.com").await.unwrap();
        assert_eq!(first, Shortened::Created(ShortCode::new_unchecked("TAKENAAA")));

        let second = h.service.shorten(&user("u1"), "http://b.com").await.unwrap();
        assert_eq!(second, Shortened::Created(ShortCode::new_unchecked("FRESHBBB")));
    }

    #[tokio::test]
    async fn shorten_gives_up_after_repeated_collisions() {
        let h = harness(ScriptedGenerator::new(&["SAMECODE"]));

        h.service.shorten(&user("u1"), "http://a.com").await.unwrap();
        let err = h
            .service
            .shorten(&user("u1"), "http://b.com")
            .await
            .unwrap_err();

        assert_eq!(err, ShortenerError::CodesExhausted(MAX_CODE_ATTEMPTS));
        assert_eq!(h.repository.len(), 1);
    }

    #[tokio::test]
    async fn shorten_rejects_blank_url() {
        let h = harness(RandomGenerator::seeded(1));

        let err = h.service.shorten(&user("u1"), "   ").await.unwrap_err();
        assert!(matches!(err, ShortenerError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn shorten_batch_returns_codes_in_input_order() {
        let h = harness(RandomGenerator::seeded(3));
        let existing = h
            .service
            .shorten(&user("u1"), "http://known.com")
            .await
            .unwrap()
            .into_code();

        let urls = vec![
            "http://x.com".to_string(),
            "http://known.com".to_string(),
            "http://x.com".to_string(),
        ];
        let codes = h.service.shorten_batch(&user("u1"), &urls).await.unwrap();

        assert_eq!(codes.len(), 3);
        assert_eq!(codes[1], existing);
        assert_eq!(codes[0], codes[2]);
        assert_eq!(h.service.resolve(codes[0].as_str()).await.unwrap(), "http://x.com");
    }

    #[tokio::test]
    async fn shorten_batch_redraws_after_collision() {
        let h = harness(ScriptedGenerator::new(&[
            "TAKENAAA", "TAKENAAA", "OTHERBBB", "FRESHCCC", "FRESHDDD",
        ]));
        h.service.shorten(&user("u1"), "http://a.com").await.unwrap();

        let urls = vec!["http://b.com".to_string(), "http://c.com".to_string()];
        let codes = h.service.shorten_batch(&user("u1"), &urls).await.unwrap();

        assert_eq!(
            codes,
            vec![
                ShortCode::new_unchecked("FRESHCCC"),
                ShortCode::new_unchecked("FRESHDDD"),
            ]
        );
        // The rejected attempt left nothing behind.
        assert!(matches!(
            h.service.resolve("OTHERBBB").await,
            Err(ShortenerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn shorten_batch_of_nothing() {
        let h = harness(RandomGenerator::seeded(3));
        assert!(h.service.shorten_batch(&user("u1"), &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn resolve_maps_outcomes() {
        let h = harness(RandomGenerator::seeded(5));

        assert_eq!(
            h.service.resolve("no").await,
            Err(ShortenerError::NotFound(ShortCode::new_unchecked("no")))
        );
        assert_eq!(
            h.service.resolve(&"x".repeat(40)).await,
            Err(ShortenerError::NotFound(ShortCode::new_unchecked("x".repeat(40))))
        );
        assert_eq!(
            h.service.resolve("MISSINGG").await,
            Err(ShortenerError::NotFound(ShortCode::new_unchecked("MISSINGG")))
        );
    }

    #[tokio::test]
    async fn urls_for_unknown_owner() {
        let h = harness(RandomGenerator::seeded(5));

        assert_eq!(
            h.service.urls_for(&user("nobody")).await,
            Err(ShortenerError::NoUrls(user("nobody")))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn requested_deletes_apply_on_next_flush() {
        let h = harness(RandomGenerator::seeded(11));
        let owner = user("u1");

        let mut codes = Vec::new();
        for i in 0..5 {
            let shortened = h
                .service
                .shorten(&owner, &format!("http://site{i}.com"))
                .await
                .unwrap();
            codes.push(shortened.into_code());
        }

        let accepted = h
            .service
            .request_deletes(&owner, codes.clone())
            .await
            .unwrap();
        assert_eq!(accepted, 5);

        // Still live until the batcher flushes.
        assert_eq!(
            h.service.resolve(codes[0].as_str()).await.unwrap(),
            "http://site0.com"
        );

        tokio::time::sleep(Duration::from_millis(1100)).await;

        for code in &codes {
            assert_eq!(
                h.service.resolve(code.as_str()).await,
                Err(ShortenerError::Deleted(code.clone()))
            );
        }
        let listed = h.service.urls_for(&owner).await.unwrap();
        assert!(listed.iter().all(|record| record.deleted));

        h.batcher.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn deletes_by_another_owner_are_ignored() {
        let h = harness(RandomGenerator::seeded(13));
        let code = h
            .service
            .shorten(&user("u1"), "http://mine.com")
            .await
            .unwrap()
            .into_code();

        h.service
            .request_deletes(&user("u2"), vec![code.clone()])
            .await
            .unwrap();
        h.batcher.shutdown().await;

        assert_eq!(
            h.service.resolve(code.as_str()).await.unwrap(),
            "http://mine.com"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn request_deletes_after_shutdown() {
        let h = harness(RandomGenerator::seeded(17));
        h.batcher.shutdown().await;

        let err = h
            .service
            .request_deletes(&user("u1"), vec![ShortCode::new_unchecked("AAAAAAAA")])
            .await
            .unwrap_err();
        assert_eq!(err, ShortenerError::DeletesClosed);
    }

    #[tokio::test]
    async fn ping_checks_repository() {
        let h = harness(RandomGenerator::seeded(19));
        h.service.ping().await.unwrap();
    }
}
