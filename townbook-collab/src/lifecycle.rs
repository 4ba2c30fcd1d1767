use chrono::{Days, NaiveDate};
use log::{info, warn};
use thiserror::Error;
use townbook_core::{
    days_overdue, CopyStatus, DisplayStatus, ItemType, ReservationStatus, SlotRange, SlotsExt,
};

use crate::{
    ensure_owner_or_staff, ensure_staff, today, ActivityAction, ActivityLog, ChangeEvent,
    ChangeKind, DatabaseError, Forbidden, InventoryWrite, LibraryContext, NewReservation,
    Notifications, PrimaryKey, ProfileData, ReservationData, ReservationFilter,
    ReservationOutcome, ReservationWrite, Table,
};

/// Coordinates every reservation transition with the inventory unit it binds.
///
/// Each transition is committed as a single [ReservationWrite], guarded by the
/// status the reservation was read in. Audit entries and notifications are
/// written afterwards and never fail the transition.
#[derive(Clone)]
pub struct Lifecycle {
    context: LibraryContext,
    activity: ActivityLog,
    notifications: Notifications,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Forbidden(#[from] Forbidden),
    #[error("Reservation {id} is {from} and cannot be {action}")]
    InvalidTransition {
        id: PrimaryKey,
        from: ReservationStatus,
        action: &'static str,
    },
    #[error("{item_type} {item_id} is unavailable: {reason}")]
    Unavailable {
        item_type: ItemType,
        item_id: PrimaryKey,
        reason: String,
    },
    #[error("{0}")]
    Validation(String),
    /// Includes stale writes, where another actor changed the rows first
    #[error(transparent)]
    Db(#[from] DatabaseError),
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// What a reservation request is for
#[derive(Debug, Clone)]
pub enum ReservationTarget {
    Book { book_id: PrimaryKey },
    /// Rooms are reserved for a range of slots on the start date
    Room { room_id: PrimaryKey, slots: SlotRange },
}

#[derive(Debug, Clone)]
pub struct ReservationRequest {
    /// The member the reservation is for. Defaults to the actor.
    pub user_id: Option<PrimaryKey>,
    pub target: ReservationTarget,
    pub start_date: NaiveDate,
    /// Defaults to the loan period for books and to the start date for rooms
    pub end_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// The result of one reservation in a batch
#[derive(Debug)]
pub struct BatchOutcome {
    pub reservation_id: PrimaryKey,
    pub result: LifecycleResult<ReservationData>,
}

/// A reservation together with its status as of today
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub reservation: ReservationData,
    pub display_status: DisplayStatus,
    pub days_overdue: i64,
}

impl HistoryEntry {
    pub fn new(reservation: ReservationData, today: NaiveDate) -> Self {
        Self {
            display_status: reservation.display_status(today),
            days_overdue: days_overdue(reservation.status, reservation.end_date, today),
            reservation,
        }
    }
}

impl Lifecycle {
    pub fn new(context: &LibraryContext) -> Self {
        Self {
            context: context.clone(),
            activity: ActivityLog::new(context),
            notifications: Notifications::new(context),
        }
    }

    /// Creates a pending reservation, if the target is available right now
    pub async fn request(
        &self,
        actor: &ProfileData,
        request: ReservationRequest,
    ) -> LifecycleResult<ReservationData> {
        let db = &self.context.database;
        let user_id = request.user_id.unwrap_or(actor.id);

        ensure_owner_or_staff(actor, user_id, "reserve for other members")?;

        if request.start_date < today() {
            return Err(LifecycleError::Validation(
                "Start date must not be in the past".to_string(),
            ));
        }

        let new_reservation = match request.target {
            ReservationTarget::Book { book_id } => {
                let book = db.book_by_id(book_id).await?;
                let loan_period = Days::new(self.context.config.loan_period_in_days.into());
                let end_date = request.end_date.unwrap_or(request.start_date + loan_period);

                let copy = db
                    .list_copies(Some(book_id))
                    .await?
                    .into_iter()
                    .find(|c| c.status == CopyStatus::Available)
                    .ok_or_else(|| LifecycleError::Unavailable {
                        item_type: ItemType::Book,
                        item_id: book_id,
                        reason: "no copy is available".to_string(),
                    })?;

                NewReservation {
                    user_id,
                    item_type: ItemType::Book,
                    item_id: book_id,
                    copy_id: Some(copy.id),
                    title: book.title,
                    start_date: request.start_date,
                    end_date,
                    slots: None,
                    notes: request.notes,
                }
            }
            ReservationTarget::Room { room_id, slots } => {
                let room = db.room_by_id(room_id).await?;
                let end_date = request.end_date.unwrap_or(request.start_date);

                if end_date != request.start_date {
                    return Err(LifecycleError::Validation(
                        "Room reservations must start and end on the same date".to_string(),
                    ));
                }

                let unavailable = |reason: String| LifecycleError::Unavailable {
                    item_type: ItemType::Room,
                    item_id: room_id,
                    reason,
                };

                let schedule = match db.room_schedule(room_id, request.start_date).await {
                    Ok(schedule) => schedule,
                    Err(e) if e.is_not_found() => {
                        return Err(unavailable(format!(
                            "no slots are scheduled on {}",
                            request.start_date
                        )))
                    }
                    Err(e) => return Err(e.into()),
                };

                let is_free = schedule
                    .slots
                    .is_range_free(slots)
                    .map_err(|e| LifecycleError::Validation(e.to_string()))?;

                if !is_free {
                    return Err(unavailable(format!("slots {} are taken", slots)));
                }

                NewReservation {
                    user_id,
                    item_type: ItemType::Room,
                    item_id: room_id,
                    copy_id: None,
                    title: room.name,
                    start_date: request.start_date,
                    end_date,
                    slots: Some(slots),
                    notes: request.notes,
                }
            }
        };

        if new_reservation.end_date < new_reservation.start_date {
            return Err(LifecycleError::Validation(
                "End date must not be before the start date".to_string(),
            ));
        }

        let reservation = db.create_reservation(new_reservation).await?;

        info!(
            "{} requested {} {} as reservation {}",
            actor.name, reservation.item_type, reservation.item_id, reservation.id
        );
        self.emit_reservation(&reservation, ChangeKind::Insert);

        self.activity
            .record(
                Some(actor),
                ActivityAction::Reservation,
                format!("{} requested \"{}\"", actor.name, reservation.title),
                Some((reservation.item_type, reservation.item_id)),
            )
            .await;

        Ok(reservation)
    }

    /// Approves a pending reservation and holds its inventory unit
    pub async fn approve(
        &self,
        actor: &ProfileData,
        reservation_id: PrimaryKey,
    ) -> LifecycleResult<ReservationData> {
        ensure_staff(actor, "approve reservations")?;

        let reservation = self
            .transitionable(reservation_id, ReservationStatus::Approved, "approved")
            .await?;

        let (inventory, bind_copy) = match reservation.item_type {
            ItemType::Book => {
                let copy_id = self.pick_copy(&reservation).await?;
                let inventory = InventoryWrite::Copy {
                    copy_id,
                    expected: CopyStatus::Available,
                    new: CopyStatus::Reserved,
                };

                (inventory, Some(copy_id))
            }
            ItemType::Room => {
                let inventory = InventoryWrite::ClaimSlots {
                    room_id: reservation.item_id,
                    date: reservation.start_date,
                    slots: room_slots(&reservation)?,
                };

                (inventory, None)
            }
        };

        let updated = self
            .commit(ReservationWrite {
                reservation_id,
                expected: ReservationStatus::Pending,
                outcome: ReservationOutcome::Transition {
                    status: ReservationStatus::Approved,
                    bind_copy,
                },
                inventory: Some(inventory.clone()),
            })
            .await?;

        info!("{} approved reservation {}", actor.name, reservation_id);
        self.emit_reservation(&updated, ChangeKind::Update);
        self.emit_inventory(&inventory);

        self.activity
            .record(
                Some(actor),
                ActivityAction::Approval,
                format!("{} approved \"{}\"", actor.name, updated.title),
                Some((updated.item_type, updated.item_id)),
            )
            .await;

        self.notifications
            .notify(
                updated.user_id,
                "Reservation approved",
                format!("Your reservation of \"{}\" was approved", updated.title),
                Some(updated.id),
            )
            .await;

        Ok(updated)
    }

    /// Declines a pending reservation. The inventory is never touched.
    pub async fn decline(
        &self,
        actor: &ProfileData,
        reservation_id: PrimaryKey,
    ) -> LifecycleResult<ReservationData> {
        ensure_staff(actor, "decline reservations")?;

        self.transitionable(reservation_id, ReservationStatus::Declined, "declined")
            .await?;

        let updated = self
            .commit(ReservationWrite {
                reservation_id,
                expected: ReservationStatus::Pending,
                outcome: ReservationOutcome::Transition {
                    status: ReservationStatus::Declined,
                    bind_copy: None,
                },
                inventory: None,
            })
            .await?;

        info!("{} declined reservation {}", actor.name, reservation_id);
        self.emit_reservation(&updated, ChangeKind::Update);

        self.activity
            .record(
                Some(actor),
                ActivityAction::Decline,
                format!("{} declined \"{}\"", actor.name, updated.title),
                Some((updated.item_type, updated.item_id)),
            )
            .await;

        self.notifications
            .notify(
                updated.user_id,
                "Reservation declined",
                format!("Your reservation of \"{}\" was declined", updated.title),
                Some(updated.id),
            )
            .await;

        Ok(updated)
    }

    /// Hands the reserved copy of an approved book reservation to the member
    pub async fn check_out(
        &self,
        actor: &ProfileData,
        reservation_id: PrimaryKey,
    ) -> LifecycleResult<ReservationData> {
        ensure_staff(actor, "check out books")?;

        let reservation = self.context.database.reservation_by_id(reservation_id).await?;

        if reservation.status != ReservationStatus::Approved
            || reservation.item_type != ItemType::Book
        {
            return Err(LifecycleError::InvalidTransition {
                id: reservation_id,
                from: reservation.status,
                action: "checked out",
            });
        }

        let copy_id = bound_copy(&reservation)?;
        let inventory = InventoryWrite::Copy {
            copy_id,
            expected: CopyStatus::Reserved,
            new: CopyStatus::CheckedOut,
        };

        let updated = self
            .commit(ReservationWrite {
                reservation_id,
                expected: ReservationStatus::Approved,
                outcome: ReservationOutcome::Transition {
                    status: ReservationStatus::Approved,
                    bind_copy: None,
                },
                inventory: Some(inventory.clone()),
            })
            .await?;

        info!("{} checked out copy {} for reservation {}", actor.name, copy_id, reservation_id);
        self.emit_reservation(&updated, ChangeKind::Update);
        self.emit_inventory(&inventory);

        self.activity
            .record(
                Some(actor),
                ActivityAction::Checkout,
                format!("{} checked out \"{}\"", actor.name, updated.title),
                Some((updated.item_type, updated.item_id)),
            )
            .await;

        Ok(updated)
    }

    /// Completes an approved reservation, freeing whatever it holds
    pub async fn complete_return(
        &self,
        actor: &ProfileData,
        reservation_id: PrimaryKey,
    ) -> LifecycleResult<ReservationData> {
        let reservation = self.context.database.reservation_by_id(reservation_id).await?;
        let item_type = reservation.item_type;

        match item_type {
            ItemType::Book => self.complete_book_return(actor, reservation).await,
            ItemType::Room => self.complete_room_return(actor, reservation).await,
        }
    }

    /// Marks the copy available and the reservation completed, as one write
    pub async fn complete_book_return(
        &self,
        actor: &ProfileData,
        reservation: ReservationData,
    ) -> LifecycleResult<ReservationData> {
        self.check_return(actor, &reservation)?;

        let inventory = self.free_copy(&reservation).await?;
        self.finish_return(actor, reservation, inventory).await
    }

    /// Frees exactly the slots the reservation claimed and marks it completed
    pub async fn complete_room_return(
        &self,
        actor: &ProfileData,
        reservation: ReservationData,
    ) -> LifecycleResult<ReservationData> {
        self.check_return(actor, &reservation)?;

        let inventory = InventoryWrite::ReleaseSlots {
            room_id: reservation.item_id,
            date: reservation.start_date,
            slots: room_slots(&reservation)?,
        };

        self.finish_return(actor, reservation, Some(inventory)).await
    }

    /// Deletes an active reservation, freeing held inventory in the same write
    pub async fn cancel(&self, actor: &ProfileData, reservation_id: PrimaryKey) -> LifecycleResult<()> {
        let reservation = self.context.database.reservation_by_id(reservation_id).await?;

        ensure_owner_or_staff(actor, reservation.user_id, "cancel reservations of others")?;

        if !reservation.status.is_active() {
            return Err(LifecycleError::InvalidTransition {
                id: reservation_id,
                from: reservation.status,
                action: "cancelled",
            });
        }

        // Pending reservations don't hold anything yet
        let inventory = match (reservation.status, reservation.item_type) {
            (ReservationStatus::Approved, ItemType::Book) => self.free_copy(&reservation).await?,
            (ReservationStatus::Approved, ItemType::Room) => Some(InventoryWrite::ReleaseSlots {
                room_id: reservation.item_id,
                date: reservation.start_date,
                slots: room_slots(&reservation)?,
            }),
            _ => None,
        };

        self.context
            .database
            .commit_reservation_write(ReservationWrite {
                reservation_id,
                expected: reservation.status,
                outcome: ReservationOutcome::Delete,
                inventory: inventory.clone(),
            })
            .await?;

        info!("{} cancelled reservation {}", actor.name, reservation_id);
        self.emit_reservation(&reservation, ChangeKind::Delete);
        if let Some(inventory) = &inventory {
            self.emit_inventory(inventory);
        }

        self.activity
            .record(
                Some(actor),
                ActivityAction::Cancellation,
                format!("{} cancelled \"{}\"", actor.name, reservation.title),
                Some((reservation.item_type, reservation.item_id)),
            )
            .await;

        Ok(())
    }

    /// Approves each reservation in order, reporting the result of every one
    pub async fn batch_approve(
        &self,
        actor: &ProfileData,
        reservation_ids: &[PrimaryKey],
    ) -> LifecycleResult<Vec<BatchOutcome>> {
        self.check_batch(actor, reservation_ids)?;

        let mut outcomes = Vec::with_capacity(reservation_ids.len());
        for &reservation_id in reservation_ids {
            outcomes.push(BatchOutcome {
                reservation_id,
                result: self.approve(actor, reservation_id).await,
            });
        }

        log_batch("approved", &outcomes);
        Ok(outcomes)
    }

    /// Declines each reservation in order, reporting the result of every one
    pub async fn batch_decline(
        &self,
        actor: &ProfileData,
        reservation_ids: &[PrimaryKey],
    ) -> LifecycleResult<Vec<BatchOutcome>> {
        self.check_batch(actor, reservation_ids)?;

        let mut outcomes = Vec::with_capacity(reservation_ids.len());
        for &reservation_id in reservation_ids {
            outcomes.push(BatchOutcome {
                reservation_id,
                result: self.decline(actor, reservation_id).await,
            });
        }

        log_batch("declined", &outcomes);
        Ok(outcomes)
    }

    pub async fn reservation(
        &self,
        actor: &ProfileData,
        reservation_id: PrimaryKey,
    ) -> LifecycleResult<ReservationData> {
        let reservation = self.context.database.reservation_by_id(reservation_id).await?;
        ensure_owner_or_staff(actor, reservation.user_id, "view reservations of others")?;

        Ok(reservation)
    }

    /// Lists reservations. Members only see their own.
    pub async fn list(
        &self,
        actor: &ProfileData,
        mut filter: ReservationFilter,
    ) -> LifecycleResult<Vec<ReservationData>> {
        if !actor.role.is_staff() {
            filter.user_id = Some(actor.id);
        }

        Ok(self.context.database.list_reservations(filter).await?)
    }

    /// The reservations of a member, newest first, with their derived status
    pub async fn history(
        &self,
        actor: &ProfileData,
        user_id: PrimaryKey,
    ) -> LifecycleResult<Vec<HistoryEntry>> {
        ensure_owner_or_staff(actor, user_id, "view the history of others")?;

        let today = today();
        let mut reservations = self
            .context
            .database
            .list_reservations(ReservationFilter {
                user_id: Some(user_id),
                ..Default::default()
            })
            .await?;

        reservations.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(reservations
            .into_iter()
            .map(|r| HistoryEntry::new(r, today))
            .collect())
    }

    /// Reads the reservation and ensures it may become `next`
    async fn transitionable(
        &self,
        reservation_id: PrimaryKey,
        next: ReservationStatus,
        action: &'static str,
    ) -> LifecycleResult<ReservationData> {
        let reservation = self.context.database.reservation_by_id(reservation_id).await?;

        if !reservation.status.can_become(next) {
            return Err(LifecycleError::InvalidTransition {
                id: reservation_id,
                from: reservation.status,
                action,
            });
        }

        Ok(reservation)
    }

    /// Commits a write that keeps the reservation
    async fn commit(&self, write: ReservationWrite) -> LifecycleResult<ReservationData> {
        self.context
            .database
            .commit_reservation_write(write)
            .await?
            .ok_or_else(|| {
                DatabaseError::NotFound {
                    resource: "reservation",
                    identifier: "id",
                }
                .into()
            })
    }

    /// The bound copy if it's still available, or else any available copy of the book
    async fn pick_copy(&self, reservation: &ReservationData) -> LifecycleResult<PrimaryKey> {
        let copies = self
            .context
            .database
            .list_copies(Some(reservation.item_id))
            .await?;

        let bound = copies
            .iter()
            .find(|c| Some(c.id) == reservation.copy_id && c.status == CopyStatus::Available);

        bound
            .or_else(|| copies.iter().find(|c| c.status == CopyStatus::Available))
            .map(|c| c.id)
            .ok_or_else(|| LifecycleError::Unavailable {
                item_type: ItemType::Book,
                item_id: reservation.item_id,
                reason: "no copy is available".to_string(),
            })
    }

    /// The write that puts a held copy back on the shelf, if the copy is held
    async fn free_copy(
        &self,
        reservation: &ReservationData,
    ) -> LifecycleResult<Option<InventoryWrite>> {
        let Some(copy_id) = reservation.copy_id else {
            warn!("Reservation {} has no copy bound to free", reservation.id);
            return Ok(None);
        };

        let copy = match self.context.database.copy_by_id(copy_id).await {
            Ok(copy) => copy,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if !copy.status.is_held() {
            warn!(
                "Copy {} of reservation {} was already available",
                copy_id, reservation.id
            );
            return Ok(None);
        }

        Ok(Some(InventoryWrite::Copy {
            copy_id,
            expected: copy.status,
            new: CopyStatus::Available,
        }))
    }

    fn check_return(&self, actor: &ProfileData, reservation: &ReservationData) -> LifecycleResult<()> {
        ensure_owner_or_staff(actor, reservation.user_id, "return reservations of others")?;

        if !reservation.status.can_become(ReservationStatus::Completed) {
            return Err(LifecycleError::InvalidTransition {
                id: reservation.id,
                from: reservation.status,
                action: "returned",
            });
        }

        Ok(())
    }

    async fn finish_return(
        &self,
        actor: &ProfileData,
        reservation: ReservationData,
        inventory: Option<InventoryWrite>,
    ) -> LifecycleResult<ReservationData> {
        let updated = self
            .commit(ReservationWrite {
                reservation_id: reservation.id,
                expected: ReservationStatus::Approved,
                outcome: ReservationOutcome::Transition {
                    status: ReservationStatus::Completed,
                    bind_copy: None,
                },
                inventory: inventory.clone(),
            })
            .await?;

        info!("{} completed the return of reservation {}", actor.name, updated.id);
        self.emit_reservation(&updated, ChangeKind::Update);
        if let Some(inventory) = &inventory {
            self.emit_inventory(inventory);
        }

        self.activity
            .record(
                Some(actor),
                ActivityAction::Return,
                format!("{} returned \"{}\"", actor.name, updated.title),
                Some((updated.item_type, updated.item_id)),
            )
            .await;

        self.notifications
            .notify(
                updated.user_id,
                "Return completed",
                format!("The return of \"{}\" was registered", updated.title),
                Some(updated.id),
            )
            .await;

        Ok(updated)
    }

    fn check_batch(&self, actor: &ProfileData, reservation_ids: &[PrimaryKey]) -> LifecycleResult<()> {
        ensure_staff(actor, "process reservations")?;

        let max = self.context.config.max_batch_size;
        if reservation_ids.len() > max {
            return Err(LifecycleError::Validation(format!(
                "A batch may contain at most {} reservations",
                max
            )));
        }

        Ok(())
    }

    fn emit_reservation(&self, reservation: &ReservationData, kind: ChangeKind) {
        self.context.emit(
            ChangeEvent::new(Table::Reservations, kind, reservation.id).owned_by(reservation.user_id),
        );
    }

    fn emit_inventory(&self, inventory: &InventoryWrite) {
        let event = match inventory {
            InventoryWrite::Copy { copy_id, .. } => {
                ChangeEvent::new(Table::BookCopies, ChangeKind::Update, *copy_id)
            }
            InventoryWrite::ClaimSlots { room_id, .. }
            | InventoryWrite::ReleaseSlots { room_id, .. } => {
                ChangeEvent::new(Table::RoomAvailability, ChangeKind::Update, *room_id)
            }
        };

        self.context.emit(event);
    }
}

fn room_slots(reservation: &ReservationData) -> LifecycleResult<SlotRange> {
    reservation.slots.ok_or_else(|| {
        LifecycleError::Validation(format!("Reservation {} has no slots", reservation.id))
    })
}

fn bound_copy(reservation: &ReservationData) -> LifecycleResult<PrimaryKey> {
    reservation.copy_id.ok_or_else(|| LifecycleError::Unavailable {
        item_type: ItemType::Book,
        item_id: reservation.item_id,
        reason: format!("reservation {} has no copy bound", reservation.id),
    })
}

fn log_batch(action: &str, outcomes: &[BatchOutcome]) {
    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();

    if failed > 0 {
        warn!(
            "{} of {} reservations could not be {}",
            failed,
            outcomes.len(),
            action
        );
    }
}
