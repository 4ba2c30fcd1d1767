use std::{collections::BTreeMap, fmt::Display};

use log::warn;
use townbook_core::{ItemType, Role};

use crate::{
    ensure_role, ActivityData, ActivityFilter, ChangeEvent, ChangeKind, LibraryContext,
    LibraryError, NewActivity, PrimaryKey, ProfileData, Table,
};

/// What an activity entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityAction {
    Reservation,
    Approval,
    Decline,
    Checkout,
    Return,
    Cancellation,
    Reconcile,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reservation => "reservation",
            Self::Approval => "approval",
            Self::Decline => "decline",
            Self::Checkout => "checkout",
            Self::Return => "return",
            Self::Cancellation => "cancellation",
            Self::Reconcile => "reconcile",
        }
    }
}

impl Display for ActivityAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The audit trail of lifecycle transitions
#[derive(Clone)]
pub struct ActivityLog {
    context: LibraryContext,
}

/// The result of draining unprocessed activity entries
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ProcessedActivities {
    pub processed: usize,
    /// How many entries of each action were processed
    pub counts: BTreeMap<String, usize>,
}

impl ActivityLog {
    pub fn new(context: &LibraryContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Appends an entry describing a transition that already committed.
    /// A failure is logged and otherwise ignored.
    pub async fn record(
        &self,
        actor: Option<&ProfileData>,
        action: ActivityAction,
        description: String,
        item: Option<(ItemType, PrimaryKey)>,
    ) -> Option<ActivityData> {
        let new_activity = NewActivity {
            user_id: actor.map(|a| a.id),
            user_name: actor.map_or_else(|| "System".to_string(), |a| a.name.clone()),
            action: action.as_str().to_string(),
            description,
            item_type: item.map(|(t, _)| t),
            item_id: item.map(|(_, id)| id),
        };

        match self.context.database.create_activity(new_activity).await {
            Ok(activity) => {
                let event = ChangeEvent::new(Table::Activities, ChangeKind::Insert, activity.id);
                let event = match activity.user_id {
                    Some(user_id) => event.owned_by(user_id),
                    None => event,
                };

                self.context.emit(event);
                Some(activity)
            }
            Err(e) => {
                warn!("Failed to record {} activity: {}", action, e);
                None
            }
        }
    }

    /// Lists entries newest first. Members only see their own.
    pub async fn list(
        &self,
        actor: &ProfileData,
        user_id: Option<PrimaryKey>,
        limit: Option<usize>,
    ) -> Result<Vec<ActivityData>, LibraryError> {
        let user_id = if actor.role.is_staff() {
            user_id
        } else {
            Some(actor.id)
        };

        let filter = ActivityFilter {
            user_id,
            unprocessed_only: false,
            limit: Some(limit.unwrap_or(self.context.config.default_activity_limit)),
        };

        Ok(self.context.database.list_activities(filter).await?)
    }

    /// Marks up to `limit` unprocessed entries as processed, counting them per action
    pub async fn process_pending(
        &self,
        actor: &ProfileData,
        limit: usize,
    ) -> Result<ProcessedActivities, LibraryError> {
        ensure_role(actor, Role::Admin, "process activities")?;

        let pending = self
            .context
            .database
            .list_activities(ActivityFilter {
                user_id: None,
                unprocessed_only: true,
                limit: Some(limit),
            })
            .await?;

        let mut result = ProcessedActivities::default();
        for activity in &pending {
            *result.counts.entry(activity.action.clone()).or_default() += 1;
        }

        let ids: Vec<_> = pending.iter().map(|a| a.id).collect();
        self.context.database.mark_activities_processed(&ids).await?;

        result.processed = ids.len();
        Ok(result)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::Fixture;

    async fn record(fixture: &Fixture, actor: &ProfileData, action: ActivityAction) {
        fixture
            .library
            .activity
            .record(Some(actor), action, format!("{} did {}", actor.name, action), None)
            .await
            .expect("activity is recorded");
    }

    #[tokio::test]
    async fn test_members_only_see_their_own() {
        let fixture = Fixture::new().await;
        let activity = &fixture.library.activity;

        record(&fixture, &fixture.member, ActivityAction::Reservation).await;
        record(&fixture, &fixture.other_member, ActivityAction::Reservation).await;
        record(&fixture, &fixture.librarian, ActivityAction::Approval).await;

        let own = activity
            .list(&fixture.member, Some(fixture.other_member.id), None)
            .await
            .unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].user_id, Some(fixture.member.id));

        let everything = activity.list(&fixture.librarian, None, None).await.unwrap();
        assert_eq!(everything.len(), 3);
        assert_eq!(everything[0].action, "approval", "newest entries come first");

        let limited = activity.list(&fixture.librarian, None, Some(2)).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn test_process_pending_counts_actions_once() {
        let fixture = Fixture::new().await;
        let activity = &fixture.library.activity;

        record(&fixture, &fixture.member, ActivityAction::Reservation).await;
        record(&fixture, &fixture.other_member, ActivityAction::Reservation).await;
        record(&fixture, &fixture.librarian, ActivityAction::Approval).await;

        assert!(matches!(
            activity.process_pending(&fixture.librarian, 10).await,
            Err(LibraryError::Forbidden(_))
        ));

        let result = activity.process_pending(&fixture.admin, 10).await.unwrap();
        assert_eq!(result.processed, 3);
        assert_eq!(result.counts.get("reservation"), Some(&2));
        assert_eq!(result.counts.get("approval"), Some(&1));

        let again = activity.process_pending(&fixture.admin, 10).await.unwrap();
        assert_eq!(again, ProcessedActivities::default());
    }

    #[tokio::test]
    async fn test_record_failure_is_swallowed() {
        let fixture = Fixture::new().await;
        fixture.database.reject_writes_to(Table::Activities);

        let recorded = fixture
            .library
            .activity
            .record(None, ActivityAction::Reconcile, "sweep".to_string(), None)
            .await;

        assert!(recorded.is_none());
    }
}
