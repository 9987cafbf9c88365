use crate::domain_model::*;
use crate::domain_port::ProfileRepo;
use crate::resilience::DispatchError;
use dashmap::DashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct OwnerData {
    reviews: Vec<Review>,
    lists: Vec<RestaurantList>,
    restaurants: Vec<Restaurant>,
    settings: Option<ProfileSettings>,
}

#[derive(Default)]
pub struct InMemoryProfileRepo {
    profiles: DashMap<UserId, Profile>,
    data: DashMap<UserId, OwnerData>,
    failure: Mutex<Option<DispatchError>>,
    reads: AtomicU64,
}

impl InMemoryProfileRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_profile(&self, profile: Profile) {
        self.profiles.insert(profile.id, profile);
    }

    pub fn insert_review(&self, owner: UserId, review: Review) {
        self.data.entry(owner).or_default().reviews.push(review);
    }

    pub fn insert_list(&self, owner: UserId, list: RestaurantList) {
        self.data.entry(owner).or_default().lists.push(list);
    }

    pub fn insert_restaurant(&self, owner: UserId, restaurant: Restaurant) {
        self.data.entry(owner).or_default().restaurants.push(restaurant);
    }

    pub fn set_settings(&self, owner: UserId, settings: ProfileSettings) {
        self.data.entry(owner).or_default().settings = Some(settings);
    }

    /// Every subsequent read fails with `error` until cleared with `None`.
    pub fn fail_with(&self, error: Option<DispatchError>) {
        if let Ok(mut slot) = self.failure.lock() {
            *slot = error;
        }
    }

    /// Number of collection reads served, profile lookups excluded.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), DispatchError> {
        match self.failure.lock().ok().and_then(|f| f.clone()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn collect<T: Clone>(
        &self,
        owner: UserId,
        page: Option<PageRequest>,
        pick: impl Fn(&OwnerData) -> Vec<T>,
    ) -> Result<Vec<T>, DispatchError> {
        self.check()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        let all = self.data.get(&owner).map(|d| pick(&d)).unwrap_or_default();
        Ok(match page {
            Some(page) => all
                .into_iter()
                .skip(page.offset as usize)
                .take(page.size.0 as usize)
                .collect(),
            None => all,
        })
    }
}

#[async_trait::async_trait]
impl ProfileRepo for InMemoryProfileRepo {
    async fn find_profile(
        &self,
        identifier: &ProfileIdentifier,
    ) -> Result<Option<Profile>, DispatchError> {
        self.check()?;
        let found = match identifier {
            ProfileIdentifier::Id(id) => self.profiles.get(id).map(|p| p.value().clone()),
            ProfileIdentifier::ShortCode(code) => self
                .profiles
                .iter()
                .find(|p| p.short_code.eq_ignore_ascii_case(code))
                .map(|p| p.value().clone()),
        };
        Ok(found)
    }

    async fn counts(
        &self,
        owner: UserId,
        level: AccessLevel,
    ) -> Result<ProfileCounts, DispatchError> {
        self.check()?;
        let counts = self
            .data
            .get(&owner)
            .map(|d| ProfileCounts {
                reviews: d.reviews.len() as u32,
                lists: d
                    .lists
                    .iter()
                    .filter(|l| level == AccessLevel::Owner || l.is_public)
                    .count() as u32,
                restaurants: d.restaurants.len() as u32,
            })
            .unwrap_or_default();
        Ok(counts)
    }

    async fn list_reviews(
        &self,
        owner: UserId,
        _level: AccessLevel,
        page: Option<PageRequest>,
    ) -> Result<Vec<Review>, DispatchError> {
        self.collect(owner, page, |d| d.reviews.clone())
    }

    async fn list_lists(
        &self,
        owner: UserId,
        level: AccessLevel,
        page: Option<PageRequest>,
    ) -> Result<Vec<RestaurantList>, DispatchError> {
        self.collect(owner, page, |d| {
            d.lists
                .iter()
                .filter(|l| level == AccessLevel::Owner || l.is_public)
                .cloned()
                .collect()
        })
    }

    async fn list_restaurants(
        &self,
        owner: UserId,
        _level: AccessLevel,
        page: Option<PageRequest>,
    ) -> Result<Vec<Restaurant>, DispatchError> {
        self.collect(owner, page, |d| d.restaurants.clone())
    }

    async fn get_settings(&self, owner: UserId) -> Result<Option<ProfileSettings>, DispatchError> {
        self.check()?;
        Ok(self.data.get(&owner).and_then(|d| d.settings.clone()))
    }
}
