use bitebook::application_impl::*;
use bitebook::application_port::*;
use bitebook::domain_model::*;
use bitebook::infra_memory::InMemoryProfileRepo;
use bitebook::resilience::DispatchError;
use chrono::Utc;
use std::sync::Arc;

fn user(n: u128) -> UserId {
    UserId(uuid::Uuid::from_u128(n))
}

fn owner() -> UserId {
    user(1)
}

fn stranger() -> UserId {
    user(2)
}

fn review(n: u128) -> Review {
    Review {
        id: uuid::Uuid::from_u128(1_000 + n),
        restaurant_id: uuid::Uuid::from_u128(n),
        rating: 4,
        body: format!("review {}", n),
        created_at: Utc::now(),
    }
}

fn seeded_repo(is_public: bool) -> Arc<InMemoryProfileRepo> {
    let repo = Arc::new(InMemoryProfileRepo::new());
    repo.insert_profile(Profile {
        id: owner(),
        owner_id: owner(),
        short_code: "ada".into(),
        display_name: "Ada".into(),
        is_public,
    });
    for n in 0..15 {
        repo.insert_review(owner(), review(n));
    }
    repo.insert_list(
        owner(),
        RestaurantList {
            id: uuid::Uuid::from_u128(500),
            name: "Favourites".into(),
            is_public: true,
            restaurant_count: 3,
        },
    );
    repo.insert_list(
        owner(),
        RestaurantList {
            id: uuid::Uuid::from_u128(501),
            name: "Secret spots".into(),
            is_public: false,
            restaurant_count: 1,
        },
    );
    repo.set_settings(
        owner(),
        ProfileSettings {
            email: Some("ada@example.com".into()),
            notifications_enabled: true,
        },
    );
    repo
}

fn service(repo: &Arc<InMemoryProfileRepo>) -> (RealProfileService, Arc<UserAggregateCache>) {
    let cache = Arc::new(UserAggregateCache::new(DEFAULT_AGGREGATE_TTL));
    let service = RealProfileService::new(repo.clone(), cache.clone(), DEFAULT_PUBLIC_PAGE_SIZE);
    (service, cache)
}

fn by_code() -> ProfileIdentifier {
    ProfileIdentifier::ShortCode("ada".into())
}

#[tokio::test]
async fn private_profiles_are_indistinguishable_from_missing_ones() {
    let repo = seeded_repo(false);
    let (service, cache) = service(&repo);

    for viewer in [None, Some(stranger())] {
        let result = service.view_profile(viewer, &by_code()).await;
        assert!(matches!(result, Err(ProfileError::NotFound)));
    }
    let missing = service
        .view_profile(None, &ProfileIdentifier::ShortCode("nobody".into()))
        .await;
    assert!(matches!(missing, Err(ProfileError::NotFound)));

    // no content was read for hidden profiles
    assert_eq!(repo.read_count(), 0);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn resolution_reports_the_internal_level() {
    let repo = seeded_repo(false);
    let (service, _) = service(&repo);

    let resolution = service
        .resolve_access(Some(stranger()), &by_code())
        .await
        .unwrap();
    assert_eq!(resolution.level, AccessLevel::Private);
    assert_eq!(resolution.target_user_id, Some(owner()));

    let resolution = service
        .resolve_access(None, &ProfileIdentifier::Id(user(99)))
        .await
        .unwrap();
    assert_eq!(resolution, AccessResolution::none());
}

#[tokio::test]
async fn owners_see_everything_including_settings() {
    let repo = seeded_repo(false);
    let (service, _) = service(&repo);

    let view = service
        .view_profile(Some(owner()), &ProfileIdentifier::Id(owner()))
        .await
        .unwrap();
    assert_eq!(view.access, AccessLevel::Owner);
    assert_eq!(view.reviews.len(), 15);
    assert_eq!(view.lists.len(), 2);
    assert_eq!(view.counts.lists, 2);
    assert_eq!(
        view.settings.and_then(|s| s.email),
        Some("ada@example.com".to_string())
    );
}

#[tokio::test]
async fn public_viewers_get_a_bounded_page_and_no_settings() {
    let repo = seeded_repo(true);
    let (service, _) = service(&repo);

    let view = service.view_profile(None, &by_code()).await.unwrap();
    assert_eq!(view.access, AccessLevel::Public);
    assert_eq!(view.reviews.len(), 10);
    assert_eq!(view.counts.reviews, 15);
    assert_eq!(view.lists.len(), 1);
    assert_eq!(view.counts.lists, 1);
    assert!(view.settings.is_none());
}

#[tokio::test]
async fn cached_views_are_only_served_to_the_same_access_level() {
    let repo = seeded_repo(true);
    let (service, cache) = service(&repo);

    service
        .view_profile(Some(owner()), &by_code())
        .await
        .unwrap();
    let reads_after_owner = repo.read_count();

    let owner_again = service
        .view_profile(Some(owner()), &by_code())
        .await
        .unwrap();
    assert_eq!(repo.read_count(), reads_after_owner);
    assert!(owner_again.settings.is_some());

    let public = service
        .view_profile(Some(stranger()), &by_code())
        .await
        .unwrap();
    assert!(repo.read_count() > reads_after_owner);
    assert!(public.settings.is_none());
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn upstream_outages_surface_as_unavailable() {
    let repo = seeded_repo(true);
    let (service, _) = service(&repo);
    repo.fail_with(Some(DispatchError::CircuitOpen));

    let result = service.view_profile(None, &by_code()).await;
    assert!(matches!(result, Err(ProfileError::Unavailable(_))));
}

#[tokio::test]
async fn a_section_refresh_replaces_only_that_section() {
    let repo = seeded_repo(true);
    let (service, cache) = service(&repo);
    let before = service.view_profile(Some(owner()), &by_code()).await.unwrap();
    assert_eq!(before.reviews.len(), 15);

    repo.insert_review(owner(), review(99));
    repo.insert_restaurant(
        owner(),
        Restaurant {
            id: uuid::Uuid::from_u128(700),
            name: "Noodle Bar".into(),
            city: None,
        },
    );
    let reads = repo.read_count();

    let after = service
        .refresh_profile(Some(owner()), &by_code(), Some(ProfileSection::Reviews))
        .await
        .unwrap();
    assert_eq!(after.reviews.len(), 16);
    assert!(after.restaurants.is_empty());
    assert_eq!(repo.read_count(), reads + 1);
    assert_eq!(
        cache.get(owner(), AccessLevel::Owner).unwrap().reviews.len(),
        16
    );
}

#[tokio::test]
async fn a_full_refresh_reloads_the_view() {
    let repo = seeded_repo(true);
    let (service, _cache) = service(&repo);
    service.view_profile(Some(owner()), &by_code()).await.unwrap();
    repo.insert_restaurant(
        owner(),
        Restaurant {
            id: uuid::Uuid::from_u128(700),
            name: "Noodle Bar".into(),
            city: None,
        },
    );

    let after = service
        .refresh_profile(Some(owner()), &by_code(), None)
        .await
        .unwrap();
    assert_eq!(after.restaurants.len(), 1);
    assert_eq!(after.counts.restaurants, 1);
}

#[tokio::test]
async fn refreshing_a_private_profile_is_still_not_found() {
    let repo = seeded_repo(false);
    let (service, cache) = service(&repo);
    let result = service
        .refresh_profile(Some(stranger()), &by_code(), Some(ProfileSection::Reviews))
        .await;
    assert!(matches!(result, Err(ProfileError::NotFound)));
    assert!(cache.is_empty());
    assert_eq!(repo.read_count(), 0);
}
