use std::collections::HashMap;

use log::{debug, info, warn};
use townbook_core::{CopyStatus, ItemType, ReservationStatus, Role};

use crate::{
    ensure_role, ActivityAction, ActivityLog, ChangeEvent, ChangeKind, DatabaseError,
    LibraryContext, LibraryError, PrimaryKey, ProfileData, ReservationFilter, Result, Table,
};

/// Repairs book copies whose status disagrees with the approved reservations.
///
/// Transitions already commit copies and reservations together. The sweep covers
/// rows written by other tools and anything a crash left behind.
#[derive(Clone)]
pub struct Reconciler {
    context: LibraryContext,
    activity: ActivityLog,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Copies that were held without an approved reservation and are available again
    pub freed: Vec<PrimaryKey>,
    /// Copies bound to an approved reservation that are held again
    pub held: Vec<PrimaryKey>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.freed.is_empty() && self.held.is_empty()
    }
}

impl Reconciler {
    pub fn new(context: &LibraryContext) -> Self {
        Self {
            context: context.clone(),
            activity: ActivityLog::new(context),
        }
    }

    /// Runs a sweep on behalf of an admin
    pub async fn run(&self, actor: &ProfileData) -> std::result::Result<ReconcileReport, LibraryError> {
        ensure_role(actor, Role::Admin, "reconcile inventory")?;

        Ok(self.sweep(Some(actor)).await?)
    }

    /// Compares every copy with the approved reservations and fixes the mismatches.
    /// Each fix only applies if the copy is still in the status it was read in.
    pub async fn sweep(&self, actor: Option<&ProfileData>) -> Result<ReconcileReport> {
        let db = &self.context.database;

        // Copies are read first, so a transition committing in between shows up as
        // a stale fix rather than a wrong one
        let copies = db.list_copies(None).await?;
        let approved = db
            .list_reservations(ReservationFilter {
                status: Some(ReservationStatus::Approved),
                item_type: Some(ItemType::Book),
                ..Default::default()
            })
            .await?;

        let holders: HashMap<PrimaryKey, PrimaryKey> = approved
            .iter()
            .filter_map(|r| r.copy_id.map(|copy_id| (copy_id, r.id)))
            .collect();

        let mut report = ReconcileReport::default();

        for copy in copies {
            let holder = holders.get(&copy.id);

            let (new, description) = match (copy.status.is_held(), holder) {
                (true, None) => (
                    CopyStatus::Available,
                    format!("Freed copy {} held without an approved reservation", copy.id),
                ),
                (false, Some(reservation_id)) => (
                    CopyStatus::Reserved,
                    format!(
                        "Held copy {} again for approved reservation {}",
                        copy.id, reservation_id
                    ),
                ),
                _ => continue,
            };

            // The holder may have been cancelled or returned since it was listed.
            // A cancel landing after this check leaves the copy to the next sweep.
            if let Some(reservation_id) = holder {
                if !self.still_holds(*reservation_id, copy.id).await? {
                    debug!("Reservation {} let go of copy {}, skipping", reservation_id, copy.id);
                    continue;
                }
            }

            match db.update_copy_status(copy.id, copy.status, new).await {
                Ok(_) => {}
                Err(DatabaseError::Stale { .. } | DatabaseError::NotFound { .. }) => {
                    debug!("Copy {} changed during the sweep, skipping", copy.id);
                    continue;
                }
                Err(e) => return Err(e),
            }

            warn!("{}", description);
            self.context
                .emit(ChangeEvent::new(Table::BookCopies, ChangeKind::Update, copy.id));

            self.activity
                .record(
                    actor,
                    ActivityAction::Reconcile,
                    description,
                    Some((ItemType::Book, copy.book_id)),
                )
                .await;

            match new {
                CopyStatus::Available => report.freed.push(copy.id),
                _ => report.held.push(copy.id),
            }
        }

        if !report.is_empty() {
            info!(
                "Reconciled {} freed and {} held copies",
                report.freed.len(),
                report.held.len()
            );
        }

        Ok(report)
    }

    async fn still_holds(&self, reservation_id: PrimaryKey, copy_id: PrimaryKey) -> Result<bool> {
        match self.context.database.reservation_by_id(reservation_id).await {
            Ok(r) => Ok(r.status == ReservationStatus::Approved && r.copy_id == Some(copy_id)),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        test_util::{future, Fixture},
        ActivityFilter, Database, ReservationRequest, ReservationTarget,
    };

    #[tokio::test]
    async fn test_sweep_repairs_drifted_copies() {
        let fixture = Fixture::new().await;
        let (book_id, copies) = fixture.book("Drifted", 3).await;
        let lifecycle = &fixture.library.lifecycle;

        let reservation = lifecycle
            .request(
                &fixture.member,
                ReservationRequest {
                    user_id: None,
                    target: ReservationTarget::Book { book_id },
                    start_date: future(1),
                    end_date: None,
                    notes: None,
                },
            )
            .await
            .unwrap();
        let approved = lifecycle.approve(&fixture.librarian, reservation.id).await.unwrap();
        let held_copy = approved.copy_id.unwrap();

        // Drift behind the coordinator's back
        fixture
            .database
            .update_copy_status(held_copy, CopyStatus::Reserved, CopyStatus::Available)
            .await
            .unwrap();
        fixture
            .database
            .update_copy_status(copies[2], CopyStatus::Available, CopyStatus::CheckedOut)
            .await
            .unwrap();

        let report = fixture.library.reconciler.sweep(None).await.unwrap();

        assert_eq!(report.freed, vec![copies[2]]);
        assert_eq!(report.held, vec![held_copy]);

        let status = |id| {
            let db = fixture.database.clone();
            async move { db.copy_by_id(id).await.unwrap().status }
        };
        assert_eq!(status(held_copy).await, CopyStatus::Reserved);
        assert_eq!(status(copies[2]).await, CopyStatus::Available);
        assert_eq!(status(copies[1]).await, CopyStatus::Available);

        let reconciled = fixture
            .database
            .list_activities(ActivityFilter::default())
            .await
            .unwrap()
            .into_iter()
            .filter(|a| a.action == "reconcile")
            .count();
        assert_eq!(reconciled, 2);

        let again = fixture.library.reconciler.sweep(None).await.unwrap();
        assert!(again.is_empty(), "a consistent library needs no fixes");
    }

    #[tokio::test]
    async fn test_only_admins_run_the_sweep() {
        let fixture = Fixture::new().await;

        assert!(matches!(
            fixture.library.reconciler.run(&fixture.librarian).await,
            Err(LibraryError::Forbidden(_))
        ));
        assert!(fixture.library.reconciler.run(&fixture.admin).await.is_ok());
    }

    #[tokio::test]
    async fn test_released_holder_is_not_held_again() {
        let fixture = Fixture::new().await;
        let (book_id, _) = fixture.book("Let Go", 1).await;
        let lifecycle = &fixture.library.lifecycle;
        let reconciler = &fixture.library.reconciler;

        let reservation = lifecycle
            .request(
                &fixture.member,
                ReservationRequest {
                    user_id: None,
                    target: ReservationTarget::Book { book_id },
                    start_date: future(1),
                    end_date: None,
                    notes: None,
                },
            )
            .await
            .unwrap();
        let approved = lifecycle.approve(&fixture.librarian, reservation.id).await.unwrap();
        let copy_id = approved.copy_id.unwrap();

        assert!(reconciler.still_holds(reservation.id, copy_id).await.unwrap());

        lifecycle.cancel(&fixture.member, reservation.id).await.unwrap();

        assert!(!reconciler.still_holds(reservation.id, copy_id).await.unwrap());
        assert!(reconciler.sweep(None).await.unwrap().is_empty());
    }
}
