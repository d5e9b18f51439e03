//! Resume cursor resolution - decides which single lot this run targets

use crate::{
    model::{Lot, Platform},
    ports::{LotStore, StoreError},
};

/// Inputs for one resolution
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    /// Platform whose posted history drives the cursor
    pub platform: Platform,
    /// Explicit lot id, bypasses the cursor entirely
    pub override_id: Option<String>,
    /// Id at or below which lots count as already covered, used only
    /// when the platform has no posted history yet
    pub start_pin: Option<String>,
}

impl ResolveRequest {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            override_id: None,
            start_pin: None,
        }
    }

    pub fn with_override(mut self, id: Option<String>) -> Self {
        self.override_id = non_blank(id);
        self
    }

    pub fn with_start_pin(mut self, pin: Option<String>) -> Self {
        self.start_pin = non_blank(pin);
        self
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Outcome of cursor resolution, one variant per decision path
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Explicit id requested and found (may already be posted)
    ExplicitOverride(Lot),
    /// Explicit id requested but not in the store
    OverrideNotFound { id: String },
    /// Next unposted lot after the last posted one
    ResumeFromHistory { last_posted_id: String, lot: Lot },
    /// No history; the start pin is already posted so resume after it.
    /// A posted pin is itself history, so only an inconsistent store gets here.
    ResumeFromPinPosted { pin: String, lot: Lot },
    /// No history; the start pin itself was never posted
    ResumeFromPinUnposted(Lot),
    /// No history and no start pin; smallest unposted lot overall
    ResumeFromStart(Lot),
    /// Nothing left to post after the boundary
    Exhausted { after: Option<String> },
    /// The configured start pin does not exist in the store
    PinNotFound { pin: String },
}

impl Resolution {
    /// The resolved lot, if any
    pub fn lot(&self) -> Option<&Lot> {
        match self {
            Resolution::ExplicitOverride(lot)
            | Resolution::ResumeFromHistory { lot, .. }
            | Resolution::ResumeFromPinPosted { lot, .. }
            | Resolution::ResumeFromPinUnposted(lot)
            | Resolution::ResumeFromStart(lot) => Some(lot),
            Resolution::OverrideNotFound { .. }
            | Resolution::Exhausted { .. }
            | Resolution::PinNotFound { .. } => None,
        }
    }

    pub fn into_lot(self) -> Option<Lot> {
        match self {
            Resolution::ExplicitOverride(lot)
            | Resolution::ResumeFromHistory { lot, .. }
            | Resolution::ResumeFromPinPosted { lot, .. }
            | Resolution::ResumeFromPinUnposted(lot)
            | Resolution::ResumeFromStart(lot) => Some(lot),
            _ => None,
        }
    }

    /// Short name of the decision path, for logs and reports
    pub fn case(&self) -> &'static str {
        match self {
            Resolution::ExplicitOverride(_) => "explicit_override",
            Resolution::OverrideNotFound { .. } => "override_not_found",
            Resolution::ResumeFromHistory { .. } => "resume_from_history",
            Resolution::ResumeFromPinPosted { .. } => "resume_from_pin_posted",
            Resolution::ResumeFromPinUnposted(_) => "resume_from_pin_unposted",
            Resolution::ResumeFromStart(_) => "resume_from_start",
            Resolution::Exhausted { .. } => "exhausted",
            Resolution::PinNotFound { .. } => "pin_not_found",
        }
    }
}

/// Resolves the target lot from persisted state alone
pub struct CursorResolver<'a, S: LotStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: LotStore + ?Sized> CursorResolver<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, request: &ResolveRequest) -> Result<Resolution, StoreError> {
        let platform = request.platform;

        if let Some(id) = &request.override_id {
            let resolution = match self.store.get(id).await? {
                Some(lot) => Resolution::ExplicitOverride(lot),
                None => Resolution::OverrideNotFound { id: id.clone() },
            };
            return Ok(resolution);
        }

        if let Some(last) = self.store.get_last_posted(platform).await? {
            tracing::debug!(
                platform = %platform,
                last_posted_id = %last.id,
                "Resuming from history"
            );
            let next = self
                .store
                .get_next_unposted_after(Some(&last.id), platform)
                .await?;
            return Ok(match next {
                Some(lot) => Resolution::ResumeFromHistory {
                    last_posted_id: last.id,
                    lot,
                },
                None => Resolution::Exhausted {
                    after: Some(last.id),
                },
            });
        }

        let Some(pin) = &request.start_pin else {
            let next = self.store.get_next_unposted_after(None, platform).await?;
            return Ok(match next {
                Some(lot) => Resolution::ResumeFromStart(lot),
                None => Resolution::Exhausted { after: None },
            });
        };

        let Some(pinned) = self.store.get(pin).await? else {
            tracing::warn!(platform = %platform, start_pin = %pin, "Start pin not found in store");
            return Ok(Resolution::PinNotFound { pin: pin.clone() });
        };

        if !pinned.is_posted(platform) {
            return Ok(Resolution::ResumeFromPinUnposted(pinned));
        }

        let next = self
            .store
            .get_next_unposted_after(Some(pin), platform)
            .await?;
        Ok(match next {
            Some(lot) => Resolution::ResumeFromPinPosted {
                pin: pin.clone(),
                lot,
            },
            None => Resolution::Exhausted {
                after: Some(pin.clone()),
            },
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Ordered in-memory store used by the use case tests
    pub(crate) struct FakeLotStore {
        pub lots: Mutex<BTreeMap<String, Lot>>,
    }

    impl FakeLotStore {
        pub(crate) fn with_lots(lots: Vec<Lot>) -> Self {
            Self {
                lots: Mutex::new(lots.into_iter().map(|l| (l.id.clone(), l)).collect()),
            }
        }

        pub(crate) fn lot(&self, id: &str) -> Lot {
            self.lots.lock().unwrap().get(id).cloned().unwrap()
        }
    }

    #[async_trait]
    impl LotStore for FakeLotStore {
        async fn get(&self, id: &str) -> Result<Option<Lot>, StoreError> {
            Ok(self.lots.lock().unwrap().get(id).cloned())
        }

        async fn get_last_posted(&self, platform: Platform) -> Result<Option<Lot>, StoreError> {
            Ok(self
                .lots
                .lock()
                .unwrap()
                .values()
                .rev()
                .find(|l| l.is_posted(platform))
                .cloned())
        }

        async fn get_next_unposted_after(
            &self,
            after: Option<&str>,
            platform: Platform,
        ) -> Result<Option<Lot>, StoreError> {
            Ok(self
                .lots
                .lock()
                .unwrap()
                .values()
                .filter(|l| after.is_none_or(|a| l.id.as_str() > a))
                .find(|l| !l.is_posted(platform))
                .cloned())
        }

        async fn mark_posted(
            &self,
            id: &str,
            platform: Platform,
            post_id: &str,
        ) -> Result<(), StoreError> {
            let mut lots = self.lots.lock().unwrap();
            let lot = lots
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            if lot.is_posted(platform) {
                return Err(StoreError::AlreadyPosted {
                    id: id.to_string(),
                    platform,
                });
            }
            lot.posted.insert(platform, post_id.to_string());
            Ok(())
        }
    }

    const P: Platform = Platform::Bluesky;

    fn lots(ids: &[&str]) -> Vec<Lot> {
        ids.iter()
            .map(|id| Lot::new(*id, format!("{} Main St", id), 0.0, 0.0))
            .collect()
    }

    async fn resolve(store: &FakeLotStore, request: ResolveRequest) -> Resolution {
        CursorResolver::new(store).resolve(&request).await.unwrap()
    }

    #[tokio::test]
    async fn test_resume_from_start_picks_smallest_unposted() {
        let store = FakeLotStore::with_lots(lots(&["30", "10", "20"]));

        let resolution = resolve(&store, ResolveRequest::new(P)).await;

        assert_eq!(resolution.case(), "resume_from_start");
        assert_eq!(resolution.lot().unwrap().id, "10");
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent_without_marking() {
        let store = FakeLotStore::with_lots(lots(&["10", "20", "30"]));

        let first = resolve(&store, ResolveRequest::new(P)).await;
        let second = resolve(&store, ResolveRequest::new(P)).await;

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_marking_advances_cursor_monotonically() {
        let store = FakeLotStore::with_lots(lots(&["10", "20", "30"]));

        store.mark_posted("20", P, "post-20").await.unwrap();
        let resolution = resolve(&store, ResolveRequest::new(P)).await;

        assert_eq!(
            resolution,
            Resolution::ResumeFromHistory {
                last_posted_id: "20".to_string(),
                lot: store.lot("30"),
            }
        );
    }

    #[tokio::test]
    async fn test_history_is_per_platform() {
        let store = FakeLotStore::with_lots(lots(&["10", "20", "30"]));
        store
            .mark_posted("20", Platform::Twitter, "tweet-20")
            .await
            .unwrap();

        let resolution = resolve(&store, ResolveRequest::new(P)).await;

        assert_eq!(resolution.lot().unwrap().id, "10");
    }

    #[tokio::test]
    async fn test_start_pin_unposted_returns_pin_itself() {
        let store = FakeLotStore::with_lots(lots(&["10", "20", "30"]));

        let request = ResolveRequest::new(P).with_start_pin(Some("20".to_string()));
        let resolution = resolve(&store, request).await;

        assert_eq!(resolution, Resolution::ResumeFromPinUnposted(store.lot("20")));
    }

    #[tokio::test]
    async fn test_start_pin_posted_resumes_after_pin() {
        let mut seeded = lots(&["10", "20", "30"]);
        seeded[1] = seeded[1].clone().with_posted(P, "1");
        let store = FakeLotStore::with_lots(seeded);

        let request = ResolveRequest::new(P).with_start_pin(Some("20".to_string()));
        let resolution = resolve(&store, request).await;

        // "20" carries a marker, so it is also the last posted lot
        assert_eq!(resolution.case(), "resume_from_history");
        assert_eq!(resolution.lot().unwrap().id, "30");
    }

    #[tokio::test]
    async fn test_start_pin_posted_for_other_platform_only() {
        let mut seeded = lots(&["10", "20", "30"]);
        seeded[1] = seeded[1].clone().with_posted(Platform::Twitter, "1");
        let store = FakeLotStore::with_lots(seeded);

        let request = ResolveRequest::new(Platform::Twitter).with_start_pin(Some("20".into()));
        let resolution = resolve(&store, request).await;
        assert_eq!(resolution.lot().unwrap().id, "30");

        let request = ResolveRequest::new(P).with_start_pin(Some("20".into()));
        let resolution = resolve(&store, request).await;
        assert_eq!(resolution.case(), "resume_from_pin_unposted");
    }

    #[tokio::test]
    async fn test_start_pin_missing_is_reported() {
        let store = FakeLotStore::with_lots(lots(&["10", "20", "30"]));

        let request = ResolveRequest::new(P).with_start_pin(Some("25".to_string()));
        let resolution = resolve(&store, request).await;

        assert_eq!(
            resolution,
            Resolution::PinNotFound {
                pin: "25".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_blank_start_pin_is_ignored() {
        let store = FakeLotStore::with_lots(lots(&["10", "20"]));

        let request = ResolveRequest::new(P).with_start_pin(Some("  ".to_string()));
        let resolution = resolve(&store, request).await;

        assert_eq!(resolution.case(), "resume_from_start");
    }

    #[tokio::test]
    async fn test_exhausted_when_everything_posted() {
        let all_posted = lots(&["10", "20"])
            .into_iter()
            .map(|l| {
                let id = l.id.clone();
                l.with_posted(P, id)
            })
            .collect();
        let store = FakeLotStore::with_lots(all_posted);

        let resolution = resolve(&store, ResolveRequest::new(P)).await;

        assert_eq!(
            resolution,
            Resolution::Exhausted {
                after: Some("20".to_string())
            }
        );
        assert!(resolution.lot().is_none());
    }

    #[tokio::test]
    async fn test_empty_store_is_exhausted() {
        let store = FakeLotStore::with_lots(vec![]);

        let resolution = resolve(&store, ResolveRequest::new(P)).await;

        assert_eq!(resolution, Resolution::Exhausted { after: None });
    }

    #[tokio::test]
    async fn test_explicit_override_bypasses_cursor() {
        let mut seeded = lots(&["10", "20", "30"]);
        seeded[0] = seeded[0].clone().with_posted(P, "post-10");
        let store = FakeLotStore::with_lots(seeded);

        let request = ResolveRequest::new(P).with_override(Some("10".to_string()));
        let resolution = resolve(&store, request).await;

        assert_eq!(resolution, Resolution::ExplicitOverride(store.lot("10")));
        assert!(resolution.lot().unwrap().is_posted(P));
    }

    #[tokio::test]
    async fn test_explicit_override_missing() {
        let store = FakeLotStore::with_lots(lots(&["10"]));

        let request = ResolveRequest::new(P).with_override(Some("99".to_string()));
        let resolution = resolve(&store, request).await;

        assert_eq!(
            resolution,
            Resolution::OverrideNotFound {
                id: "99".to_string()
            }
        );
    }
}
