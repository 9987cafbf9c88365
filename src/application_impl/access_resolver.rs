use crate::domain_model::*;
use crate::domain_port::ProfileRepo;
use crate::resilience::DispatchError;
use std::sync::Arc;

/// Owner sees everything regardless of the public flag, anyone else sees a
/// public profile in limited form, and a private profile does not exist
/// as far as they can tell.
pub fn resolve_access(viewer: Option<UserId>, target: Option<&Profile>) -> AccessResolution {
    let Some(profile) = target else {
        return AccessResolution::none();
    };
    let level = if viewer == Some(profile.owner_id) {
        AccessLevel::Owner
    } else if profile.is_public {
        AccessLevel::Public
    } else {
        AccessLevel::Private
    };
    AccessResolution {
        level,
        target_user_id: Some(profile.owner_id),
    }
}

pub struct AccessLevelResolver {
    profile_repo: Arc<dyn ProfileRepo>,
}

impl AccessLevelResolver {
    pub fn new(profile_repo: Arc<dyn ProfileRepo>) -> Self {
        Self { profile_repo }
    }

    pub async fn resolve(
        &self,
        viewer: Option<UserId>,
        target: &ProfileIdentifier,
    ) -> Result<(AccessResolution, Option<Profile>), DispatchError> {
        let profile = self.profile_repo.find_profile(target).await?;
        let resolution = resolve_access(viewer, profile.as_ref());
        Ok((resolution, profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(n: u128) -> UserId {
        UserId(uuid::Uuid::from_u128(n))
    }

    fn profile(owner: UserId, is_public: bool) -> Profile {
        Profile {
            id: owner,
            owner_id: owner,
            short_code: "u1".into(),
            display_name: "U1".into(),
            is_public,
        }
    }

    #[test]
    fn anonymous_viewer_of_private_profile_gets_nothing_visible() {
        let target = profile(user(1), false);
        let resolution = resolve_access(None, Some(&target));
        assert_eq!(resolution.level, AccessLevel::Private);
        assert!(!resolution.level.is_visible());
    }

    #[test]
    fn owner_gets_full_access_even_when_private() {
        let target = profile(user(1), false);
        let resolution = resolve_access(Some(user(1)), Some(&target));
        assert_eq!(resolution.level, AccessLevel::Owner);
        assert_eq!(resolution.target_user_id, Some(user(1)));
    }

    #[test]
    fn other_viewers_of_public_profiles_get_public() {
        let target = profile(user(1), true);
        assert_eq!(
            resolve_access(Some(user(2)), Some(&target)).level,
            AccessLevel::Public
        );
        assert_eq!(resolve_access(None, Some(&target)).level, AccessLevel::Public);
    }

    #[test]
    fn missing_profile_is_none() {
        assert_eq!(resolve_access(Some(user(2)), None), AccessResolution::none());
    }
}
