use axum::{
    extract::{Query, State},
    response::{
        sse::{Event, KeepAlive},
        Sse,
    },
    routing::get,
};
use futures_util::Stream;
use log::{debug, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    collections::VecDeque,
    convert::Infallible,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Weak,
    },
    task::{Context, Poll, Waker},
    thread,
};
use townbook_collab::{ChangeEvent, ChangeKind, PrimaryKey, Table};
use utoipa::ToSchema;

use crate::{
    auth::Actor,
    context::ServerContext,
    errors::{ServerError, ServerResult},
    schemas::EventQuerySchema,
    Router,
};

type ConnectionId = usize;

static NEXT_CONNECTION_ID: AtomicUsize = AtomicUsize::new(0);

/// A committed change to a TownBook table
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServerEvent {
    /// The table that changed, for example `reservations`
    #[schema(value_type = String, example = "reservations")]
    table: Table,
    #[schema(value_type = String, example = "update")]
    kind: ChangeKind,
    /// The id of the changed row. Room schedules use the room id.
    row_id: i32,
    /// The profile owning the row, if any
    user_id: Option<i32>,
}

impl From<ChangeEvent> for ServerEvent {
    fn from(value: ChangeEvent) -> Self {
        Self {
            table: value.table,
            kind: value.kind,
            row_id: value.row_id,
            user_id: value.user_id,
        }
    }
}

/// Which events a connection receives
#[derive(Debug, Clone, Copy, Default)]
struct Subscription {
    table: Option<Table>,
    user_id: Option<PrimaryKey>,
    /// Members never receive rows owned by other profiles
    viewer: Option<PrimaryKey>,
}

impl Subscription {
    fn accepts(&self, event: &ChangeEvent) -> bool {
        let visible = match (self.viewer, event.user_id) {
            (Some(viewer), Some(owner)) => viewer == owner,
            _ => true,
        };

        visible && event.matches(self.table, self.user_id)
    }
}

/// Manages server sent event connections
pub struct ServerSentEvents {
    me: Weak<Self>,
    connections: Mutex<Vec<Connection>>,
}

struct Connection {
    id: ConnectionId,
    subscription: Subscription,
    pending_messages: Arc<Mutex<VecDeque<ServerEvent>>>,
    waker: Arc<Mutex<Option<Waker>>>,
}

struct ConnectionHandle {
    id: ConnectionId,
    /// A reference to [Connection]'s pending messages
    pending_messages: Arc<Mutex<VecDeque<ServerEvent>>>,
    /// A reference to [Connection]'s stored [Waker]
    waker: Arc<Mutex<Option<Waker>>>,
    /// Required to remove connection when dropped
    manager: Weak<ServerSentEvents>,
}

impl ServerSentEvents {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            connections: Default::default(),
        })
    }

    pub fn broadcast(&self, event: ChangeEvent) {
        let connections = self.connections.lock();

        for connection in connections.iter() {
            if connection.subscription.accepts(&event) {
                connection.send(event.clone().into())
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    fn connect(&self, subscription: Subscription) -> ConnectionHandle {
        let connection = Connection::new(subscription);
        let handle = connection.handle(self.me.clone());

        self.connections.lock().push(connection);
        handle
    }

    fn disconnect(&self, id: ConnectionId) {
        self.connections.lock().retain(|c| c.id != id)
    }
}

impl Connection {
    fn new(subscription: Subscription) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            subscription,
            pending_messages: Default::default(),
            waker: Default::default(),
        }
    }

    fn send(&self, message: ServerEvent) {
        self.pending_messages.lock().push_back(message);

        if let Some(waker) = self.waker.lock().take() {
            waker.wake()
        }
    }

    fn handle(&self, manager: Weak<ServerSentEvents>) -> ConnectionHandle {
        ConnectionHandle {
            id: self.id,
            pending_messages: self.pending_messages.clone(),
            waker: self.waker.clone(),
            manager,
        }
    }
}

impl Stream for ConnectionHandle {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut pending_messages = self.pending_messages.lock();

        while let Some(message) = pending_messages.pop_front() {
            match serde_json::to_string(&message) {
                Ok(data) => return Poll::Ready(Some(Ok(Event::default().data(data)))),
                Err(e) => warn!("Dropped an event that failed to serialize: {}", e),
            }
        }

        *self.waker.lock() = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.disconnect(self.id)
        }
    }
}

/// Forwards library change events to connected clients on a dedicated thread,
/// so writes never wait on slow subscribers.
pub fn forward_events(context: &ServerContext) {
    let events = context.library.events();
    let sse = Arc::downgrade(&context.sse);

    thread::spawn(move || {
        for event in events.iter() {
            let Some(sse) = sse.upgrade() else {
                break;
            };

            sse.broadcast(event);
        }

        debug!("Stopped forwarding change events");
    });
}

#[utoipa::path(
    get,
    path = "/v1/events",
    tag = "events",
    params(EventQuerySchema),
    security(("profile_id" = [])),
    responses(
        (
            status = 200,
            content_type = "text/event-stream",
            description = "A stream of committed changes",
            body = ServerEvent
        ),
        (status = 400, description = "Unknown table"),
        (status = 403, description = "Members may only follow their own rows")
    )
)]
async fn event_stream(
    State(context): State<ServerContext>,
    Actor(actor): Actor,
    Query(query): Query<EventQuerySchema>,
) -> ServerResult<Sse<ConnectionHandle>> {
    let table = query
        .table
        .map(|t| t.parse::<Table>())
        .transpose()
        .map_err(ServerError::BadRequest)?;

    let viewer = (!actor.role.is_staff()).then_some(actor.id);

    if let (Some(viewer), Some(user_id)) = (viewer, query.user_id) {
        if viewer != user_id {
            return Err(ServerError::Forbidden(
                "Not allowed to follow the changes of others".to_string(),
            ));
        }
    }

    let subscription = Subscription {
        table,
        user_id: query.user_id,
        viewer,
    };

    Ok(Sse::new(context.sse.connect(subscription)).keep_alive(KeepAlive::default()))
}

pub fn router() -> Router {
    Router::new().route("/", get(event_stream))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_members_only_see_their_own_rows() {
        let member = Subscription {
            viewer: Some(7),
            ..Default::default()
        };

        let own = ChangeEvent::new(Table::Reservations, ChangeKind::Update, 1).owned_by(7);
        let other = ChangeEvent::new(Table::Reservations, ChangeKind::Update, 2).owned_by(8);
        let public = ChangeEvent::new(Table::BookCopies, ChangeKind::Update, 3);

        assert!(member.accepts(&own));
        assert!(!member.accepts(&other));
        assert!(member.accepts(&public));

        let staff = Subscription {
            table: Some(Table::Reservations),
            ..Default::default()
        };

        assert!(staff.accepts(&other));
        assert!(!staff.accepts(&public));
    }

    #[test]
    fn test_broadcast_respects_subscriptions() {
        let sse = ServerSentEvents::new();

        let reservations = sse.connect(Subscription {
            table: Some(Table::Reservations),
            ..Default::default()
        });
        let everything = sse.connect(Subscription::default());
        assert_eq!(sse.connection_count(), 2);

        sse.broadcast(ChangeEvent::new(Table::Books, ChangeKind::Insert, 1));
        sse.broadcast(ChangeEvent::new(Table::Reservations, ChangeKind::Insert, 2));

        assert_eq!(reservations.pending_messages.lock().len(), 1);

        let pending = everything.pending_messages.lock();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].row_id, 1, "events are delivered in order");
        drop(pending);

        drop(reservations);
        assert_eq!(sse.connection_count(), 1);
    }
}
