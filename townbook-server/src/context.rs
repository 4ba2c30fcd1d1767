use std::sync::Arc;

use axum::extract::FromRef;
use townbook_collab::Library;

use crate::sse::ServerSentEvents;

#[derive(Clone, FromRef)]
pub struct ServerContext {
    pub library: Arc<Library>,
    pub sse: Arc<ServerSentEvents>,
}

impl ServerContext {
    pub fn new(library: Arc<Library>) -> Self {
        Self {
            library,
            sse: ServerSentEvents::new(),
        }
    }
}
