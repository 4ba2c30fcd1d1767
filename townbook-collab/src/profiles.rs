use log::info;
use townbook_core::Role;

use crate::{
    ensure_owner_or_staff, ensure_role, ensure_staff, ChangeEvent, ChangeKind, Forbidden,
    LibraryContext, LibraryError, NewProfile, PrimaryKey, ProfileData, Table,
};

/// The profiles of people using TownBook.
/// Profiles are created by the sign-up flow of the authentication gateway.
#[derive(Clone)]
pub struct Profiles {
    context: LibraryContext,
}

impl Profiles {
    pub fn new(context: &LibraryContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Looks up the profile of a caller, without any access check
    pub async fn resolve(&self, profile_id: PrimaryKey) -> crate::Result<ProfileData> {
        self.context.database.profile_by_id(profile_id).await
    }

    /// Creates a profile. Only admins may create staff profiles.
    pub async fn create(
        &self,
        actor: Option<&ProfileData>,
        new_profile: NewProfile,
    ) -> Result<ProfileData, LibraryError> {
        if new_profile.role != Role::Member {
            match actor {
                Some(actor) => ensure_role(actor, Role::Admin, "create staff profiles")?,
                None => {
                    return Err(Forbidden {
                        action: "create staff profiles",
                    }
                    .into())
                }
            }
        }

        if new_profile.name.trim().is_empty() {
            return Err(LibraryError::Validation("Name must not be empty".to_string()));
        }

        if !new_profile.email.contains('@') {
            return Err(LibraryError::Validation(format!(
                "{} is not an email address",
                new_profile.email
            )));
        }

        let profile = self.context.database.create_profile(new_profile).await?;

        self.context
            .emit(ChangeEvent::new(Table::Profiles, ChangeKind::Insert, profile.id));

        Ok(profile)
    }

    pub async fn profile(
        &self,
        actor: &ProfileData,
        profile_id: PrimaryKey,
    ) -> Result<ProfileData, LibraryError> {
        ensure_owner_or_staff(actor, profile_id, "view other profiles")?;

        Ok(self.context.database.profile_by_id(profile_id).await?)
    }

    pub async fn list(&self, actor: &ProfileData) -> Result<Vec<ProfileData>, LibraryError> {
        ensure_staff(actor, "list profiles")?;

        Ok(self.context.database.list_profiles().await?)
    }

    pub async fn set_role(
        &self,
        actor: &ProfileData,
        profile_id: PrimaryKey,
        role: Role,
    ) -> Result<ProfileData, LibraryError> {
        ensure_role(actor, Role::Admin, "change roles")?;

        let profile = self
            .context
            .database
            .update_profile_role(profile_id, role)
            .await?;

        info!("{} made {} a {}", actor.name, profile.name, role);
        self.context
            .emit(ChangeEvent::new(Table::Profiles, ChangeKind::Update, profile.id));

        Ok(profile)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{test_util::Fixture, DatabaseError};

    fn new_profile(email: &str, role: Role) -> NewProfile {
        NewProfile {
            name: "Pia".to_string(),
            email: email.to_string(),
            role,
        }
    }

    #[tokio::test]
    async fn test_create_profile() {
        let fixture = Fixture::new().await;
        let profiles = &fixture.library.profiles;

        let pia = profiles
            .create(None, new_profile("pia@townbook.test", Role::Member))
            .await
            .unwrap();
        assert_eq!(pia.role, Role::Member);

        assert!(matches!(
            profiles
                .create(None, new_profile("PIA@townbook.test", Role::Member))
                .await,
            Err(LibraryError::Db(DatabaseError::Conflict { .. }))
        ));

        assert!(matches!(
            profiles
                .create(Some(&fixture.librarian), new_profile("boss@townbook.test", Role::Admin))
                .await,
            Err(LibraryError::Forbidden(_))
        ));

        assert!(profiles
            .create(Some(&fixture.admin), new_profile("boss@townbook.test", Role::Admin))
            .await
            .is_ok());

        assert!(matches!(
            profiles.create(None, new_profile("nobody", Role::Member)).await,
            Err(LibraryError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_role_changes_and_visibility() {
        let fixture = Fixture::new().await;
        let profiles = &fixture.library.profiles;

        assert!(profiles.list(&fixture.member).await.is_err());
        assert_eq!(profiles.list(&fixture.librarian).await.unwrap().len(), 4);

        assert!(profiles
            .profile(&fixture.member, fixture.other_member.id)
            .await
            .is_err());
        assert!(profiles.profile(&fixture.member, fixture.member.id).await.is_ok());

        assert!(profiles
            .set_role(&fixture.librarian, fixture.member.id, Role::Librarian)
            .await
            .is_err());

        let promoted = profiles
            .set_role(&fixture.admin, fixture.member.id, Role::Librarian)
            .await
            .unwrap();
        assert_eq!(promoted.role, Role::Librarian);
    }
}
