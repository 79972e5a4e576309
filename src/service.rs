//! Resource registry operations exposed to request glue (HTTP and chat).

use bytes::Bytes;
use std::sync::Arc;

use crate::access::{evaluate, is_expired, Decision};
use crate::blob::BlobStore;
use crate::config::AccessPolicy;
use crate::error::{CoreError, CoreResult};
use crate::id::{generate, link_salt, random_salt};
use crate::model::{
    FieldOutcome, Locator, MediaRecord, MediaType, Mutation, Page, Record, ResourceKind,
    ShortLinkRecord, Status, UpdateReq,
};
use crate::reaper::Reaper;
use crate::registry::{InsertOutcome, Registry};
use crate::transform::MediaTransform;
use crate::util::{valid_target, Clock};

#[derive(Clone)]
pub struct ResourceRegistry {
    registry: Arc<dyn Registry>,
    blobs: Arc<dyn BlobStore>,
    transform: Arc<dyn MediaTransform>,
    clock: Arc<dyn Clock>,
    reaper: Reaper,
    policy: AccessPolicy,
}

impl ResourceRegistry {
    pub fn new(
        registry: Arc<dyn Registry>,
        blobs: Arc<dyn BlobStore>,
        transform: Arc<dyn MediaTransform>,
        clock: Arc<dyn Clock>,
        policy: AccessPolicy,
    ) -> Self {
        let reaper = Reaper::new(registry.clone(), blobs.clone(), clock.clone());
        Self {
            registry,
            blobs,
            transform,
            clock,
            reaper,
            policy,
        }
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    pub fn reaper(&self) -> &Reaper {
        &self.reaper
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Shorten `lead_url`. Idempotent while an active record for the same
    /// `(owner, url)` sits in one of the deterministic slots.
    ///
    /// The first `max_collision_attempts` tries derive their code from the
    /// URL (and owner); they either hit the caller's existing link or a free
    /// slot. When every deterministic slot is held by someone else, or by
    /// retired records, the same number of random-salted tries follows.
    #[tracing::instrument(skip(self))]
    pub async fn create_link(&self, owner: Option<&str>, lead_url: &str) -> CoreResult<ShortLinkRecord> {
        if !valid_target(lead_url) {
            return Err(CoreError::validation("leadUrl must be an absolute http(s) URL"));
        }
        let now = self.clock.now();
        let per_phase = self.policy.max_collision_attempts;

        for attempt in 0..per_phase.saturating_mul(2) {
            let code = if attempt < per_phase {
                generate(lead_url.as_bytes(), link_salt(owner, attempt).as_deref())
            } else {
                generate(lead_url.as_bytes(), Some(&random_salt()))
            };
            let candidate = Record::Link(ShortLinkRecord {
                code,
                owner_id: owner.map(str::to_string),
                lead_url: lead_url.to_string(),
                status: Status::Active,
                display_name: None,
                created_at: now,
            });

            match self.registry.insert(&candidate).await? {
                InsertOutcome::Inserted => {
                    if let Record::Link(link) = candidate {
                        tracing::info!(code = %link.code, "link created");
                        return Ok(link);
                    }
                }
                InsertOutcome::Occupied(existing) if existing.is_same_link(&candidate) => {
                    if let Record::Link(link) = existing {
                        tracing::debug!(code = %link.code, "reusing existing link");
                        return Ok(link);
                    }
                }
                InsertOutcome::Occupied(existing) => {
                    tracing::debug!(code = %existing.code(), attempt, "code collision, retrying");
                }
            }
        }
        Err(CoreError::CollisionExhausted {
            attempts: per_phase.saturating_mul(2),
        })
    }

    /// Register already-stored media. Never deduplicated: every call gets a
    /// fresh salted code.
    #[tracing::instrument(skip(self, password))]
    pub async fn create_media(
        &self,
        owner: Option<&str>,
        media_type: MediaType,
        storage_key: &str,
        password: &str,
        expiration_secs: u64,
    ) -> CoreResult<MediaRecord> {
        self.validate_media_input(owner.is_some(), password, expiration_secs)?;
        let now = self.clock.now();
        let expires_at = now
            .checked_add(expiration_secs)
            .ok_or_else(|| CoreError::validation("expiration overflows"))?;
        let attempts = self.policy.max_collision_attempts;

        for attempt in 0..attempts {
            let code = generate(storage_key.as_bytes(), Some(&random_salt()));
            let candidate = MediaRecord {
                code,
                owner_id: owner.map(str::to_string),
                media_type,
                storage_key: storage_key.to_string(),
                password: password.to_string(),
                expires_at,
                display_name: None,
                status: Status::Active,
                created_at: now,
            };
            match self.registry.insert(&Record::Media(candidate.clone())).await? {
                InsertOutcome::Inserted => {
                    tracing::info!(code = %candidate.code, media_type = %media_type, "media created");
                    return Ok(candidate);
                }
                InsertOutcome::Occupied(_) => {
                    tracing::debug!(code = %candidate.code, attempt, "code collision, retrying");
                }
            }
        }
        Err(CoreError::CollisionExhausted { attempts })
    }

    /// Transform (images only), store the blob, then register it. If the
    /// registry refuses the record the blob is released again.
    pub async fn upload_media(
        &self,
        owner: Option<&str>,
        media_type: MediaType,
        bytes: Bytes,
        password: &str,
        expiration_secs: u64,
    ) -> CoreResult<MediaRecord> {
        self.validate_media_input(owner.is_some(), password, expiration_secs)?;
        if bytes.is_empty() {
            return Err(CoreError::validation("media body is empty"));
        }

        let bytes = match media_type {
            MediaType::Image => {
                let (dims, out) = self.transform.downscale(bytes).await.map_err(|e| {
                    tracing::error!(error = %e, "image transform failed");
                    CoreError::internal(format!("transform: {e}"))
                })?;
                tracing::debug!(?dims, size_bytes = out.len(), "image downscaled");
                out
            }
            MediaType::Video => bytes,
        };

        let storage_key = self.blobs.put(media_type, bytes).await?;
        match self
            .create_media(owner, media_type, &storage_key, password, expiration_secs)
            .await
        {
            Ok(rec) => Ok(rec),
            Err(e) => {
                self.reaper.release(&storage_key).await;
                Err(e)
            }
        }
    }

    /// Lookup without access control: terminal records are returned too. An
    /// active record past its expiry is flipped and returned as `expired`.
    pub async fn get_by_code(&self, kind: ResourceKind, code: &str) -> CoreResult<Record> {
        let mut record = self.registry.get(kind, code).await?.ok_or(CoreError::NotFound)?;
        if record.status() == Status::Active && self.expire_if_due(&record, self.clock.now()).await {
            record.set_status(Status::Expired);
        }
        Ok(record)
    }

    /// Fetch + access decision. An active record found past its expiry is
    /// flipped to `expired` on the way out.
    pub async fn resolve(
        &self,
        kind: ResourceKind,
        code: &str,
        password: &str,
        caller: Option<&str>,
    ) -> CoreResult<Locator> {
        let record = self.get_by_code(kind, code).await?;
        let now = self.clock.now();

        match evaluate(&record, now, password, caller) {
            Decision::Allow(locator) => Ok(locator),
            Decision::NotFound => Err(CoreError::NotFound),
            Decision::Forbidden => Err(CoreError::Forbidden),
        }
    }

    pub async fn fetch_blob(&self, storage_key: &str) -> CoreResult<Bytes> {
        self.blobs.fetch(storage_key).await
    }

    /// Apply one owner mutation. Deleting media also releases its blob.
    #[tracing::instrument(skip(self, mutation), fields(field = mutation.field()))]
    pub async fn update_owned(
        &self,
        kind: ResourceKind,
        code: &str,
        caller: &str,
        mutation: Mutation,
    ) -> CoreResult<Record> {
        self.validate_mutation(kind, &mutation)?;
        let now = self.clock.now();

        if let Some(current) = self.registry.get(kind, code).await? {
            if self.expire_if_due(&current, now).await {
                return Err(CoreError::NotFound);
            }
        }

        let updated = self
            .registry
            .update_owned(kind, code, caller, &mutation, now)
            .await?;
        if let (Mutation::Delete, Record::Media(m)) = (&mutation, &updated) {
            self.reaper.release(&m.storage_key).await;
        }
        Ok(updated)
    }

    /// Apply every present field as its own mutation. Earlier successes are
    /// kept when a later field fails.
    pub async fn update_fields(
        &self,
        kind: ResourceKind,
        code: &str,
        caller: &str,
        req: &UpdateReq,
    ) -> CoreResult<Vec<FieldOutcome>> {
        let mut mutations = Vec::new();
        if let Some(name) = &req.name {
            mutations.push(Mutation::Rename(name.clone()));
        }
        if let Some(secs) = req.expiration {
            mutations.push(Mutation::SetExpiry {
                expires_at: self.clock.now().saturating_add(secs),
            });
        }
        if let Some(password) = &req.password {
            mutations.push(Mutation::SetPassword(password.clone()));
        }
        if mutations.is_empty() {
            return Err(CoreError::validation("no updates"));
        }

        let mut outcomes = Vec::with_capacity(mutations.len());
        for mutation in mutations {
            let field = mutation.field();
            let outcome = match self.update_owned(kind, code, caller, mutation).await {
                Ok(_) => FieldOutcome {
                    field,
                    ok: true,
                    error: None,
                },
                Err(e) => FieldOutcome {
                    field,
                    ok: false,
                    error: Some(e.public_message()),
                },
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    pub async fn list_owned(
        &self,
        kind: ResourceKind,
        owner: &str,
        page: u32,
        limit: u32,
    ) -> CoreResult<Page> {
        if page == 0 {
            return Err(CoreError::validation("page starts at 1"));
        }
        if limit == 0 {
            return Err(CoreError::validation("limit must be at least 1"));
        }
        self.registry
            .list_owned(kind, owner, page, limit, self.clock.now())
            .await
    }

    /// Lazy expiry trigger. Returns true when `record` is past its expiry
    /// (whether or not this call won the flip).
    async fn expire_if_due(&self, record: &Record, now: u64) -> bool {
        let Record::Media(media) = record else {
            return false;
        };
        if !is_expired(record, now) {
            return false;
        }
        if media.status == Status::Active {
            if let Err(e) = self.reaper.expire_one(media).await {
                tracing::warn!(code = %media.code, error = %e, "lazy expiry flip failed");
            }
        }
        true
    }

    fn validate_media_input(
        &self,
        authenticated: bool,
        password: &str,
        expiration_secs: u64,
    ) -> CoreResult<()> {
        let max = self.policy.max_expiration_for(authenticated);
        if expiration_secs == 0 || expiration_secs > max {
            return Err(CoreError::validation(format!(
                "expirationSeconds must be between 1 and {max}"
            )));
        }
        self.validate_password(password)
    }

    fn validate_password(&self, password: &str) -> CoreResult<()> {
        if password.chars().count() > self.policy.max_password_len {
            return Err(CoreError::validation(format!(
                "password must be at most {} characters",
                self.policy.max_password_len
            )));
        }
        Ok(())
    }

    fn validate_mutation(&self, kind: ResourceKind, mutation: &Mutation) -> CoreResult<()> {
        match (kind, mutation) {
            (_, Mutation::Rename(name)) => {
                let len = name.chars().count();
                if len == 0 || len > self.policy.max_display_name_len {
                    return Err(CoreError::validation(format!(
                        "name must be 1 to {} characters",
                        self.policy.max_display_name_len
                    )));
                }
                Ok(())
            }
            (ResourceKind::Link, Mutation::SetPassword(_) | Mutation::SetExpiry { .. }) => Err(
                CoreError::validation("links have no password or expiration"),
            ),
            (ResourceKind::Media, Mutation::SetPassword(p)) => self.validate_password(p),
            (ResourceKind::Media, Mutation::SetExpiry { expires_at }) => {
                let now = self.clock.now();
                let max = self.policy.owner_max_expiration_secs;
                if *expires_at <= now || *expires_at - now > max {
                    return Err(CoreError::validation(format!(
                        "expiration must be between 1 and {max} seconds from now"
                    )));
                }
                Ok(())
            }
            (_, Mutation::Delete) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::ObjectBlobStore;
    use crate::registry::MemoryRegistry;
    use crate::transform::{Dimensions, Passthrough};
    use crate::util::ManualClock;
    use async_trait::async_trait;
    use object_store::memory::InMemory;

    struct Harness {
        svc: ResourceRegistry,
        clock: Arc<ManualClock>,
        blobs: Arc<ObjectBlobStore>,
        registry: Arc<MemoryRegistry>,
    }

    fn harness_with(transform: Arc<dyn MediaTransform>) -> Harness {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let blobs = Arc::new(ObjectBlobStore::new(Arc::new(InMemory::new()), "media"));
        let registry = Arc::new(MemoryRegistry::new());
        let svc = ResourceRegistry::new(
            registry.clone(),
            blobs.clone(),
            transform,
            clock.clone(),
            AccessPolicy::default(),
        );
        Harness {
            svc,
            clock,
            blobs,
            registry,
        }
    }

    fn harness() -> Harness {
        harness_with(Arc::new(Passthrough))
    }

    struct BrokenTransform;

    #[async_trait]
    impl MediaTransform for BrokenTransform {
        async fn downscale(&self, _: Bytes) -> CoreResult<(Option<Dimensions>, Bytes)> {
            Err(CoreError::internal("decoder crashed"))
        }
    }

    /// Registry whose every code is already held by someone else.
    struct AlwaysOccupied;

    #[async_trait]
    impl Registry for AlwaysOccupied {
        async fn insert(&self, record: &Record) -> CoreResult<InsertOutcome> {
            let mut other = record.clone();
            if let Record::Link(l) = &mut other {
                l.lead_url = "https://elsewhere.example".into();
            }
            Ok(InsertOutcome::Occupied(other))
        }
        async fn get(&self, _: ResourceKind, _: &str) -> CoreResult<Option<Record>> {
            Ok(None)
        }
        async fn update_owned(
            &self,
            _: ResourceKind,
            _: &str,
            _: &str,
            _: &Mutation,
            _: u64,
        ) -> CoreResult<Record> {
            Err(CoreError::NotFound)
        }
        async fn transition(&self, _: ResourceKind, _: &str, _: Status, _: Status) -> CoreResult<bool> {
            Ok(false)
        }
        async fn list_owned(&self, _: ResourceKind, _: &str, _: u32, _: u32, _: u64) -> CoreResult<Page> {
            Ok(Page {
                items: vec![],
                total: 0,
            })
        }
        async fn expired_media(&self, _: u64, _: usize) -> CoreResult<Vec<MediaRecord>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn anonymous_link_creation_is_idempotent() {
        let h = harness();
        let a = h.svc.create_link(None, "https://example.com/a").await.unwrap();
        let b = h.svc.create_link(None, "https://example.com/a").await.unwrap();
        assert_eq!(a.code, b.code);
        assert_eq!(a.created_at, b.created_at);
    }

    #[tokio::test]
    async fn different_owner_gets_a_different_code() {
        let h = harness();
        let anon = h.svc.create_link(None, "https://example.com/a").await.unwrap();
        let mine = h.svc.create_link(Some("u1"), "https://example.com/a").await.unwrap();
        assert_ne!(anon.code, mine.code);
        assert_eq!(mine.owner_id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn deleted_link_code_is_not_reused() {
        let h = harness();
        let first = h.svc.create_link(Some("u1"), "https://example.com/a").await.unwrap();
        h.svc
            .update_owned(ResourceKind::Link, &first.code, "u1", Mutation::Delete)
            .await
            .unwrap();
        let second = h.svc.create_link(Some("u1"), "https://example.com/a").await.unwrap();
        assert_ne!(first.code, second.code);
        assert_eq!(second.status, Status::Active);
    }

    #[tokio::test]
    async fn many_owners_can_shorten_the_same_url() {
        let h = harness();
        let url = "https://example.com/popular";
        let anon = h.svc.create_link(None, url).await.unwrap();
        let mut codes = vec![anon.code];
        for i in 0..6 {
            let owner = format!("user-{i}");
            let link = h.svc.create_link(Some(&owner), url).await.unwrap();
            assert_eq!(link.owner_id.as_deref(), Some(owner.as_str()));
            // still idempotent per owner
            let again = h.svc.create_link(Some(&owner), url).await.unwrap();
            assert_eq!(again.code, link.code);
            codes.push(link.code);
        }
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), 7);
    }

    #[tokio::test]
    async fn delete_and_recreate_never_runs_out_of_codes() {
        let h = harness();
        let url = "https://example.com/churn";
        let mut seen = Vec::new();
        for _ in 0..12 {
            let link = h.svc.create_link(Some("u1"), url).await.unwrap();
            assert!(!seen.contains(&link.code));
            seen.push(link.code.clone());
            h.svc
                .update_owned(ResourceKind::Link, &link.code, "u1", Mutation::Delete)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn rejects_malformed_lead_url() {
        let h = harness();
        let err = h.svc.create_link(None, "not a url").await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn collisions_exhaust() {
        let h = harness();
        let svc = ResourceRegistry::new(
            Arc::new(AlwaysOccupied),
            h.blobs.clone(),
            Arc::new(Passthrough),
            h.clock.clone(),
            AccessPolicy::default(),
        );
        let err = svc.create_link(None, "https://example.com/a").await.unwrap_err();
        assert!(matches!(err, CoreError::CollisionExhausted { attempts: 10 }));
        let err = svc
            .create_media(None, MediaType::Image, "k", "", 60)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::CollisionExhausted { .. }));
    }

    #[tokio::test]
    async fn identical_media_gets_distinct_codes() {
        let h = harness();
        let body = Bytes::from_static(b"same bytes");
        let a = h
            .svc
            .upload_media(None, MediaType::Image, body.clone(), "", 60)
            .await
            .unwrap();
        let b = h
            .svc
            .upload_media(Some("u1"), MediaType::Image, body, "", 60)
            .await
            .unwrap();
        assert_ne!(a.code, b.code);
        assert_ne!(a.storage_key, b.storage_key);
    }

    #[tokio::test]
    async fn expiration_bounds_depend_on_authentication() {
        let h = harness();
        let week = 7 * 86_400;
        let err = h
            .svc
            .create_media(None, MediaType::Video, "k", "", week)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        h.svc
            .create_media(Some("u1"), MediaType::Video, "k", "", week)
            .await
            .unwrap();
        assert!(h
            .svc
            .create_media(Some("u1"), MediaType::Video, "k", "", 0)
            .await
            .is_err());
        assert!(h
            .svc
            .create_media(None, MediaType::Video, "k", "01234567890", 60)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn end_to_end_expiry() {
        let h = harness();
        let rec = h
            .svc
            .upload_media(None, MediaType::Image, Bytes::from_static(b"img"), "", 60)
            .await
            .unwrap();

        let loc = h.svc.resolve(ResourceKind::Media, &rec.code, "", None).await.unwrap();
        assert_eq!(
            loc,
            Locator::Blob {
                storage_key: rec.storage_key.clone(),
                media_type: MediaType::Image
            }
        );

        h.clock.advance(61);
        let err = h.svc.resolve(ResourceKind::Media, &rec.code, "", None).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound));

        // lazy trigger flipped the status and reclaimed the blob
        let stored = h.svc.get_by_code(ResourceKind::Media, &rec.code).await.unwrap();
        assert_eq!(stored.status(), Status::Expired);
        assert!(matches!(h.blobs.fetch(&rec.storage_key).await, Err(CoreError::NotFound)));

        // and it stays gone
        h.clock.advance(1);
        assert!(h.svc.resolve(ResourceKind::Media, &rec.code, "", None).await.is_err());
    }

    #[tokio::test]
    async fn password_gate_with_owner_bypass() {
        let h = harness();
        let rec = h
            .svc
            .upload_media(Some("u1"), MediaType::Video, Bytes::from_static(b"vid"), "1234", 600)
            .await
            .unwrap();
        let code = rec.code.as_str();
        assert!(matches!(
            h.svc.resolve(ResourceKind::Media, code, "", None).await,
            Err(CoreError::Forbidden)
        ));
        assert!(h.svc.resolve(ResourceKind::Media, code, "1234", None).await.is_ok());
        assert!(h.svc.resolve(ResourceKind::Media, code, "", Some("u1")).await.is_ok());
    }

    #[tokio::test]
    async fn delete_is_not_repeatable_and_releases_blob() {
        let h = harness();
        let rec = h
            .svc
            .upload_media(Some("u1"), MediaType::Image, Bytes::from_static(b"img"), "", 600)
            .await
            .unwrap();

        h.svc
            .update_owned(ResourceKind::Media, &rec.code, "u1", Mutation::Delete)
            .await
            .unwrap();
        let again = h
            .svc
            .update_owned(ResourceKind::Media, &rec.code, "u1", Mutation::Delete)
            .await
            .unwrap_err();
        assert!(matches!(again, CoreError::NotFound));
        assert!(matches!(
            h.svc.resolve(ResourceKind::Media, &rec.code, "", Some("u1")).await,
            Err(CoreError::NotFound)
        ));
        assert!(h.blobs.fetch(&rec.storage_key).await.is_err());
    }

    #[tokio::test]
    async fn anonymous_records_cannot_be_mutated() {
        let h = harness();
        let link = h.svc.create_link(None, "https://example.com/x").await.unwrap();
        let err = h
            .svc
            .update_owned(ResourceKind::Link, &link.code, "u1", Mutation::Rename("mine".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden));
    }

    #[tokio::test]
    async fn foreign_owner_is_forbidden_unknown_code_not_found() {
        let h = harness();
        let link = h.svc.create_link(Some("u1"), "https://example.com/x").await.unwrap();
        assert!(matches!(
            h.svc
                .update_owned(ResourceKind::Link, &link.code, "u2", Mutation::Delete)
                .await,
            Err(CoreError::Forbidden)
        ));
        assert!(matches!(
            h.svc
                .update_owned(ResourceKind::Link, "zzzzzzzz", "u1", Mutation::Delete)
                .await,
            Err(CoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn extending_expiry_after_lapse_is_refused() {
        let h = harness();
        let rec = h
            .svc
            .create_media(Some("u1"), MediaType::Image, "k", "", 10)
            .await
            .unwrap();
        h.clock.advance(10);
        let err = h
            .svc
            .update_owned(
                ResourceKind::Media,
                &rec.code,
                "u1",
                Mutation::SetExpiry {
                    expires_at: h.clock.now() + 600,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound));
        let stored = h.registry.get(ResourceKind::Media, &rec.code).await.unwrap().unwrap();
        assert_eq!(stored.status(), Status::Expired);
    }

    #[tokio::test]
    async fn update_fields_reports_per_field() {
        let h = harness();
        let rec = h
            .svc
            .create_media(Some("u1"), MediaType::Image, "k", "", 60)
            .await
            .unwrap();
        let req = UpdateReq {
            name: Some("holiday".into()),
            expiration: Some(3_600),
            password: Some("this-is-far-too-long".into()),
        };
        let outcomes = h
            .svc
            .update_fields(ResourceKind::Media, &rec.code, "u1", &req)
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].ok && outcomes[1].ok);
        assert_eq!(outcomes[2].field, "password");
        assert!(!outcomes[2].ok);

        // name and expiry stuck even though the password change failed
        match h.svc.get_by_code(ResourceKind::Media, &rec.code).await.unwrap() {
            Record::Media(m) => {
                assert_eq!(m.display_name.as_deref(), Some("holiday"));
                assert_eq!(m.expires_at, h.clock.now() + 3_600);
                assert!(m.password.is_empty());
            }
            Record::Link(_) => panic!("wrong kind"),
        }

        let empty = h
            .svc
            .update_fields(ResourceKind::Media, &rec.code, "u1", &UpdateReq::default())
            .await;
        assert!(matches!(empty, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn links_reject_media_only_mutations() {
        let h = harness();
        let link = h.svc.create_link(Some("u1"), "https://example.com/x").await.unwrap();
        let err = h
            .svc
            .update_owned(ResourceKind::Link, &link.code, "u1", Mutation::SetPassword("1".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn listing_is_newest_first_and_counts_active_only() {
        let h = harness();
        let mut codes = Vec::new();
        for i in 0..12 {
            let rec = h
                .svc
                .create_link(Some("u1"), &format!("https://example.com/{i}"))
                .await
                .unwrap();
            codes.push(rec.code);
            h.clock.advance(1);
        }
        h.svc.create_link(Some("u2"), "https://example.com/other").await.unwrap();
        h.svc
            .update_owned(ResourceKind::Link, &codes[0], "u1", Mutation::Delete)
            .await
            .unwrap();

        let page = h.svc.list_owned(ResourceKind::Link, "u1", 1, 10).await.unwrap();
        assert_eq!(page.total, 11);
        assert_eq!(page.items.len(), 10);
        assert_eq!(page.items[0].code(), codes[11]);
        assert!(page
            .items
            .windows(2)
            .all(|w| w[0].created_at() >= w[1].created_at()));

        let page2 = h.svc.list_owned(ResourceKind::Link, "u1", 2, 10).await.unwrap();
        assert_eq!(page2.items.len(), 1);
        assert_eq!(page2.items[0].code(), codes[1]);

        assert!(h.svc.list_owned(ResourceKind::Link, "u1", 0, 10).await.is_err());
    }

    #[tokio::test]
    async fn lapsed_media_drops_out_of_listing_before_the_sweep() {
        let h = harness();
        let short = h
            .svc
            .create_media(Some("u1"), MediaType::Image, "k1", "", 10)
            .await
            .unwrap();
        let long = h
            .svc
            .create_media(Some("u1"), MediaType::Image, "k2", "", 600)
            .await
            .unwrap();
        assert_eq!(h.svc.list_owned(ResourceKind::Media, "u1", 1, 10).await.unwrap().total, 2);

        h.clock.advance(20);
        // no reaper has run: the stored status is still active
        let stored = h.registry.get(ResourceKind::Media, &short.code).await.unwrap().unwrap();
        assert_eq!(stored.status(), Status::Active);

        let page = h.svc.list_owned(ResourceKind::Media, "u1", 1, 10).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].code(), long.code);
    }

    #[tokio::test]
    async fn transform_failure_is_internal_and_stores_nothing() {
        let h = harness_with(Arc::new(BrokenTransform));
        let err = h
            .svc
            .upload_media(None, MediaType::Image, Bytes::from_static(b"img"), "", 60)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Internal(_)));

        // videos bypass the transform
        h.svc
            .upload_media(None, MediaType::Video, Bytes::from_static(b"vid"), "", 60)
            .await
            .unwrap();
    }
}
