use crate::application_impl::{AccessLevelResolver, UserAggregateCache};
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::ProfileRepo;
use std::sync::Arc;

pub const DEFAULT_PUBLIC_PAGE_SIZE: PageSize = PageSize(10);

pub struct RealProfileService {
    resolver: AccessLevelResolver,
    profile_repo: Arc<dyn ProfileRepo>,
    cache: Arc<UserAggregateCache>,
    public_page_size: PageSize,
}

impl RealProfileService {
    pub fn new(
        profile_repo: Arc<dyn ProfileRepo>,
        cache: Arc<UserAggregateCache>,
        public_page_size: PageSize,
    ) -> Self {
        Self {
            resolver: AccessLevelResolver::new(profile_repo.clone()),
            profile_repo,
            cache,
            public_page_size,
        }
    }

    // owners read everything, public viewers a bounded first page
    fn page_for(&self, level: AccessLevel) -> Option<PageRequest> {
        match level {
            AccessLevel::Owner => None,
            _ => Some(PageRequest::first(self.public_page_size)),
        }
    }

    /// Resolves access and hides private or missing profiles behind NotFound.
    async fn visible_profile(
        &self,
        viewer: Option<UserId>,
        target: &ProfileIdentifier,
    ) -> Result<(AccessLevel, Profile), ProfileError> {
        let (resolution, profile) = self.resolver.resolve(viewer, target).await?;
        match profile {
            Some(profile) if resolution.level.is_visible() => Ok((resolution.level, profile)),
            _ => {
                tracing::debug!(
                    target_profile = %target,
                    level = resolution.level.as_str(),
                    "profile hidden from viewer"
                );
                Err(ProfileError::NotFound)
            }
        }
    }

    async fn load_and_cache(
        &self,
        profile: Profile,
        level: AccessLevel,
    ) -> Result<ProfileView, ProfileError> {
        let profile_id = profile.id;
        let view = self.load(profile, level).await?;
        self.cache.put(profile_id, view.clone());
        Ok(view)
    }

    async fn load(&self, profile: Profile, level: AccessLevel) -> Result<ProfileView, ProfileError> {
        let owner = profile.owner_id;
        let page = self.page_for(level);
        let (counts, reviews, lists, restaurants) = tokio::try_join!(
            self.profile_repo.counts(owner, level),
            self.profile_repo.list_reviews(owner, level, page),
            self.profile_repo.list_lists(owner, level, page),
            self.profile_repo.list_restaurants(owner, level, page),
        )?;
        let settings = match level {
            AccessLevel::Owner => self.profile_repo.get_settings(owner).await?,
            _ => None,
        };
        Ok(ProfileView {
            access: level,
            profile,
            counts,
            reviews,
            lists,
            restaurants,
            settings,
        })
    }
}

#[async_trait::async_trait]
impl ProfileService for RealProfileService {
    async fn resolve_access(
        &self,
        viewer: Option<UserId>,
        target: &ProfileIdentifier,
    ) -> Result<AccessResolution, ProfileError> {
        let (resolution, _) = self.resolver.resolve(viewer, target).await?;
        Ok(resolution)
    }

    async fn view_profile(
        &self,
        viewer: Option<UserId>,
        target: &ProfileIdentifier,
    ) -> Result<ProfileView, ProfileError> {
        let (level, profile) = self.visible_profile(viewer, target).await?;
        if let Some(view) = self.cache.get(profile.id, level) {
            return Ok(view);
        }
        self.load_and_cache(profile, level).await
    }

    async fn refresh_profile(
        &self,
        viewer: Option<UserId>,
        target: &ProfileIdentifier,
        section: Option<ProfileSection>,
    ) -> Result<ProfileView, ProfileError> {
        let (level, profile) = self.visible_profile(viewer, target).await?;
        let profile_id = profile.id;
        let section = match section {
            Some(section) if self.cache.get(profile_id, level).is_some() => section,
            _ => {
                self.cache.invalidate(profile_id);
                return self.load_and_cache(profile, level).await;
            }
        };

        let owner = profile.owner_id;
        let page = self.page_for(level);
        let updated = match section {
            ProfileSection::Profile => self.cache.update_profile(profile_id, level, profile.clone()),
            ProfileSection::Reviews => {
                let reviews = self.profile_repo.list_reviews(owner, level, page).await?;
                self.cache.update_reviews(profile_id, level, reviews)
            }
            ProfileSection::Lists => {
                let lists = self.profile_repo.list_lists(owner, level, page).await?;
                self.cache.update_lists(profile_id, level, lists)
            }
            ProfileSection::Restaurants => {
                let restaurants = self.profile_repo.list_restaurants(owner, level, page).await?;
                self.cache.update_restaurants(profile_id, level, restaurants)
            }
        };
        match self.cache.get(profile_id, level) {
            Some(view) if updated => Ok(view),
            // swept or replaced while the section was being read
            _ => self.load_and_cache(profile, level).await,
        }
    }
}
