use uuid::Uuid;

use super::repo::UserRepo;
use super::repo_types::{DemoProfile, Profile, UpsertUser, User, UserRole};
use crate::{auth::AuthUser, error::AppError};

const MAX_DISPLAY_NAME: usize = 100;

pub async fn load_profile(repo: &dyn UserRepo, caller: &AuthUser) -> Result<Profile, AppError> {
    match repo.get(caller.id).await? {
        Some(user) => Ok(Profile::Registered(user)),
        None => Ok(Profile::Demo(DemoProfile {
            id: caller.id,
            email: caller.email.clone(),
            display_name: caller
                .email
                .as_deref()
                .and_then(|e| e.split('@').next())
                .filter(|s| !s.is_empty())
                .unwrap_or("Guest")
                .to_string(),
        })),
    }
}

pub async fn save_profile(
    repo: &dyn UserRepo,
    caller: &AuthUser,
    display_name: &str,
    phone: Option<String>,
    role: UserRole,
) -> Result<User, AppError> {
    let display_name = display_name.trim();
    if display_name.is_empty() {
        return Err(AppError::invalid("display_name is required"));
    }
    if display_name.chars().count() > MAX_DISPLAY_NAME {
        return Err(AppError::invalid("display_name is too long"));
    }
    let phone = phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty());

    let user = repo
        .upsert(UpsertUser {
            id: caller.id,
            email: caller.email.clone(),
            display_name: display_name.to_string(),
            phone,
            role,
        })
        .await?;
    Ok(user)
}

/// Only registered restaurant admins may own restaurants.
pub async fn require_restaurant_admin(repo: &dyn UserRepo, user_id: Uuid) -> Result<User, AppError> {
    match repo.get(user_id).await? {
        Some(user) if user.role == UserRole::RestaurantAdmin => Ok(user),
        Some(_) => Err(AppError::Forbidden("restaurant_admin role required")),
        None => Err(AppError::Forbidden("complete your profile first")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo::memory::MemoryUserRepo;

    fn caller(email: Option<&str>) -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            email: email.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn unknown_user_gets_demo_profile() {
        let repo = MemoryUserRepo::default();
        let c = caller(Some("sam@example.com"));
        let profile = load_profile(&repo, &c).await.unwrap();
        assert!(matches!(profile, Profile::Demo(_)));
        assert_eq!(profile.display_name(), "sam");
        assert_eq!(profile.role(), UserRole::User);
        assert_eq!(profile.id(), c.id);
    }

    #[tokio::test]
    async fn saved_profile_becomes_registered() {
        let repo = MemoryUserRepo::default();
        let c = caller(None);
        save_profile(&repo, &c, "  Corner Bistro ", Some(" ".into()), UserRole::RestaurantAdmin)
            .await
            .unwrap();
        let profile = load_profile(&repo, &c).await.unwrap();
        match profile {
            Profile::Registered(u) => {
                assert_eq!(u.display_name, "Corner Bistro");
                assert!(u.phone.is_none());
                assert_eq!(u.role, UserRole::RestaurantAdmin);
            }
            other => panic!("expected registered, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn blank_display_name_is_invalid() {
        let repo = MemoryUserRepo::default();
        let err = save_profile(&repo, &caller(None), "   ", None, UserRole::User)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn restaurant_admin_gate() {
        let repo = MemoryUserRepo::default();
        let c = caller(None);
        assert!(matches!(
            require_restaurant_admin(&repo, c.id).await,
            Err(AppError::Forbidden(_))
        ));
        save_profile(&repo, &c, "Diner", None, UserRole::User).await.unwrap();
        assert!(matches!(
            require_restaurant_admin(&repo, c.id).await,
            Err(AppError::Forbidden(_))
        ));
        save_profile(&repo, &c, "Diner", None, UserRole::RestaurantAdmin)
            .await
            .unwrap();
        assert!(require_restaurant_admin(&repo, c.id).await.is_ok());
    }
}
