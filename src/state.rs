//! Application state shared across request handlers.

use std::sync::Arc;

use crate::portal::Portal;
use crate::query::QueryService;

#[derive(Clone)]
pub struct AppState {
    pub queries: Arc<QueryService>,
}

impl AppState {
    pub fn new(queries: QueryService) -> Self {
        Self {
            queries: Arc::new(queries),
        }
    }

    pub fn portal(&self) -> &Portal {
        self.queries.portal()
    }
}
