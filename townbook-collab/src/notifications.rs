use log::warn;

use crate::{
    ChangeEvent, ChangeKind, Forbidden, LibraryContext, LibraryError, NewNotification,
    NotificationData, PrimaryKey, ProfileData, Table,
};

/// Informational messages to members about their reservations
#[derive(Clone)]
pub struct Notifications {
    context: LibraryContext,
}

impl Notifications {
    pub fn new(context: &LibraryContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Sends a notification. A failure is logged and otherwise ignored.
    pub async fn notify(
        &self,
        user_id: PrimaryKey,
        title: &str,
        message: String,
        related_reservation_id: Option<PrimaryKey>,
    ) -> Option<NotificationData> {
        let new_notification = NewNotification {
            user_id,
            title: title.to_string(),
            message,
            related_reservation_id,
        };

        match self.context.database.create_notification(new_notification).await {
            Ok(notification) => {
                self.context.emit(
                    ChangeEvent::new(Table::Notifications, ChangeKind::Insert, notification.id)
                        .owned_by(user_id),
                );

                Some(notification)
            }
            Err(e) => {
                warn!("Failed to notify profile {}: {}", user_id, e);
                None
            }
        }
    }

    pub async fn list(&self, actor: &ProfileData) -> Result<Vec<NotificationData>, LibraryError> {
        Ok(self.context.database.list_notifications(actor.id).await?)
    }

    /// Marks one of the actor's own notifications as read
    pub async fn mark_read(
        &self,
        actor: &ProfileData,
        notification_id: PrimaryKey,
    ) -> Result<NotificationData, LibraryError> {
        let notification = self
            .context
            .database
            .notification_by_id(notification_id)
            .await?;

        if notification.user_id != actor.id {
            return Err(Forbidden {
                action: "read the notifications of others",
            }
            .into());
        }

        let notification = self
            .context
            .database
            .mark_notification_read(notification_id)
            .await?;

        self.context.emit(
            ChangeEvent::new(Table::Notifications, ChangeKind::Update, notification.id)
                .owned_by(actor.id),
        );

        Ok(notification)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::Fixture;

    #[tokio::test]
    async fn test_only_the_recipient_marks_read() {
        let fixture = Fixture::new().await;
        let notifications = &fixture.library.notifications;

        let sent = notifications
            .notify(fixture.member.id, "Hello", "Welcome to TownBook".to_string(), None)
            .await
            .unwrap();

        assert!(matches!(
            notifications.mark_read(&fixture.other_member, sent.id).await,
            Err(LibraryError::Forbidden(_))
        ));

        let read = notifications.mark_read(&fixture.member, sent.id).await.unwrap();
        assert!(read.is_read);

        let listed = notifications.list(&fixture.member).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(notifications.list(&fixture.other_member).await.unwrap().is_empty());
    }
}
