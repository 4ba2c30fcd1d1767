mod activity;
mod availability;
mod catalog;
mod db;
mod events;
mod lifecycle;
mod notifications;
mod profiles;
mod reconcile;

use std::sync::Arc;

pub use activity::*;
pub use availability::*;
pub use catalog::*;
pub use db::*;
pub use events::*;
pub use lifecycle::*;
pub use notifications::*;
pub use profiles::*;
pub use reconcile::*;

use chrono::{NaiveDate, Utc};
use crossbeam::channel::unbounded;
use log::warn;
use thiserror::Error;
use townbook_core::{Config, Role};

/// The TownBook library system, coordinating reservations, inventory and the catalog.
pub struct Library {
    context: LibraryContext,
    event_receiver: EventReceiver,

    pub lifecycle: Lifecycle,
    pub catalog: Catalog,
    pub availability: Availability,
    pub activity: ActivityLog,
    pub profiles: Profiles,
    pub notifications: Notifications,
    pub reconciler: Reconciler,
}

/// A type passed to the components of the library, to access state and emit change events.
#[derive(Clone)]
pub struct LibraryContext {
    pub config: Arc<Config>,
    pub database: Arc<dyn Database>,
    event_sender: EventSender,
}

impl LibraryContext {
    /// Announces a committed write to subscribers
    pub fn emit(&self, event: ChangeEvent) {
        if let Err(e) = self.event_sender.send(event) {
            warn!("Change event was dropped: {}", e);
        }
    }
}

impl Library {
    pub fn new(config: Config, database: Arc<dyn Database>) -> Self {
        let (event_sender, event_receiver) = unbounded();

        let context = LibraryContext {
            config: Arc::new(config),
            database,
            event_sender,
        };

        Self {
            lifecycle: Lifecycle::new(&context),
            catalog: Catalog::new(&context),
            availability: Availability::new(&context),
            activity: ActivityLog::new(&context),
            profiles: Profiles::new(&context),
            notifications: Notifications::new(&context),
            reconciler: Reconciler::new(&context),
            event_receiver,
            context,
        }
    }

    /// Creates a library backed by an in-process database
    pub fn in_memory(config: Config) -> Self {
        Self::new(config, Arc::new(MemoryDatabase::new()))
    }

    /// Returns a receiver of every change committed from now on.
    /// Receivers share one queue, so each event is delivered to one of them.
    pub fn events(&self) -> EventReceiver {
        self.event_receiver.clone()
    }

    pub fn config(&self) -> &Config {
        &self.context.config
    }
}

/// The acting profile lacks the role an operation requires
#[derive(Debug, Error)]
#[error("Not allowed to {action}")]
pub struct Forbidden {
    pub action: &'static str,
}

/// Ensures the actor has at least the given role
pub fn ensure_role(
    actor: &ProfileData,
    required: Role,
    action: &'static str,
) -> std::result::Result<(), Forbidden> {
    if actor.role >= required {
        return Ok(());
    }

    Err(Forbidden { action })
}

/// Ensures the actor is a librarian or an admin
pub fn ensure_staff(
    actor: &ProfileData,
    action: &'static str,
) -> std::result::Result<(), Forbidden> {
    ensure_role(actor, Role::Librarian, action)
}

/// Ensures the actor owns the row, or is staff
pub fn ensure_owner_or_staff(
    actor: &ProfileData,
    owner_id: PrimaryKey,
    action: &'static str,
) -> std::result::Result<(), Forbidden> {
    if actor.id == owner_id {
        return Ok(());
    }

    ensure_staff(actor, action)
}

/// Errors of the catalog, profile and notification managers
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error(transparent)]
    Forbidden(#[from] Forbidden),
    #[error("{0}")]
    Validation(String),
    /// The row is still referenced by an active reservation
    #[error("{resource}:{id} is in use by an active reservation")]
    InUse { resource: &'static str, id: PrimaryKey },
    #[error(transparent)]
    Db(DatabaseError),
}

impl From<DatabaseError> for LibraryError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::InUse { resource, id } => Self::InUse { resource, id },
            e => Self::Db(e),
        }
    }
}

/// The current date, as used for validation and derived statuses
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::sync::Arc;

    use chrono::{Days, NaiveDate, NaiveTime};
    use townbook_core::{Config, Role, TimeSlot};

    use crate::{
        Library, MemoryDatabase, NewBook, NewBookCopy, NewProfile, NewRoom, PrimaryKey,
        ProfileData, RoomScheduleData,
    };

    pub struct Fixture {
        pub library: Library,
        pub database: Arc<MemoryDatabase>,
        pub member: ProfileData,
        pub other_member: ProfileData,
        pub librarian: ProfileData,
        pub admin: ProfileData,
    }

    /// A date safely in the future
    pub fn future(days: u64) -> NaiveDate {
        crate::today() + Days::new(days)
    }

    pub fn time(hour: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, 0, 0).unwrap()
    }

    impl Fixture {
        pub async fn new() -> Self {
            let database = Arc::new(MemoryDatabase::new());
            let library = Library::new(Config::default(), database.clone());

            let profile = |name: &str, role| NewProfile {
                name: name.to_string(),
                email: format!("{}@townbook.test", name.to_lowercase()),
                role,
            };

            let profiles = &library.context.database;
            let member = profiles.create_profile(profile("Mina", Role::Member)).await.unwrap();
            let other_member = profiles.create_profile(profile("Otto", Role::Member)).await.unwrap();
            let librarian = profiles.create_profile(profile("Lena", Role::Librarian)).await.unwrap();
            let admin = profiles.create_profile(profile("Ada", Role::Admin)).await.unwrap();

            Self {
                library,
                database,
                member,
                other_member,
                librarian,
                admin,
            }
        }

        /// Creates a book with the given number of available copies
        pub async fn book(&self, title: &str, copies: usize) -> (PrimaryKey, Vec<PrimaryKey>) {
            let db = &self.library.context.database;

            let book = db
                .create_book(NewBook {
                    title: title.to_string(),
                    author: "Tove Jansson".to_string(),
                    genres: vec!["Fantasy".to_string()],
                    language: "en".to_string(),
                    page_count: 160,
                    rating: 4.5,
                    description: None,
                    cover_url: None,
                })
                .await
                .unwrap();

            let mut copy_ids = vec![];
            for shelf in 0..copies {
                let copy = db
                    .create_copy(NewBookCopy {
                        book_id: book.id,
                        location: format!("A{shelf}"),
                        condition: "good".to_string(),
                    })
                    .await
                    .unwrap();

                copy_ids.push(copy.id);
            }

            (book.id, copy_ids)
        }

        /// Creates a room with hourly slots from 9 to 12 on the given date
        pub async fn room(&self, name: &str, date: NaiveDate) -> PrimaryKey {
            let db = &self.library.context.database;

            let room = db
                .create_room(NewRoom {
                    name: name.to_string(),
                    capacity: 6,
                    amenities: vec!["whiteboard".to_string()],
                    description: None,
                })
                .await
                .unwrap();

            db.put_room_schedule(RoomScheduleData {
                room_id: room.id,
                date,
                slots: (9..12).map(|h| TimeSlot::new(time(h), time(h + 1))).collect(),
            })
            .await
            .unwrap();

            room.id
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::Fixture;

    #[tokio::test]
    async fn test_role_gate() {
        let fixture = Fixture::new().await;

        assert!(ensure_staff(&fixture.member, "approve reservations").is_err());
        assert!(ensure_staff(&fixture.librarian, "approve reservations").is_ok());
        assert!(ensure_role(&fixture.librarian, Role::Admin, "change roles").is_err());
        assert!(ensure_owner_or_staff(&fixture.member, fixture.member.id, "cancel").is_ok());
        assert!(ensure_owner_or_staff(&fixture.member, fixture.other_member.id, "cancel").is_err());

        let refused = ensure_staff(&fixture.member, "delete rooms").unwrap_err();
        assert_eq!(refused.action, "delete rooms");
        assert!(matches!(LibraryError::from(refused), LibraryError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_events_reach_subscribers() {
        let fixture = Fixture::new().await;
        let events = fixture.library.events();

        fixture
            .library
            .context
            .emit(ChangeEvent::new(Table::Books, ChangeKind::Insert, 1));

        assert_eq!(
            events.try_recv().unwrap(),
            ChangeEvent::new(Table::Books, ChangeKind::Insert, 1)
        );
    }
}
