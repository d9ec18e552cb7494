//! relmap record API gateway.
//!
//! A dispatcher over the generic record and relationship operations: incoming
//! requests are matched against registered wildcard route patterns (scored so
//! specific routes outrank generic ones), the target entity and relationship
//! are resolved against loaded metadata, and the relationship engine and
//! record store do the rest.

pub mod config;
pub mod error;
pub mod request;
pub mod router;
pub mod routes;

pub use config::GatewayConfig;
pub use error::{ApiError, ErrorKind};
pub use request::{Request, Response};
pub use router::{Handler, Method, PathParams, Router};

use relmap_core::{EngineConfig, Error as CoreError, Metadata, Store};

/// Application state shared across all routes.
///
/// Everything a handler needs is injected here explicitly; there is no
/// ambient lookup of the store or the acting user.
pub struct AppState {
    /// Backing record store.
    pub store: Store,
    /// Entity/relationship metadata, read-only after startup.
    pub metadata: Metadata,
    /// Relationship engine configuration.
    pub engine_config: EngineConfig,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

/// The record API gateway.
pub struct Gateway {
    state: AppState,
    router: Router,
}

impl Gateway {
    /// Create a gateway with the generic record routes registered.
    ///
    /// Fails fast if the metadata bundle is invalid.
    pub fn new(store: Store, metadata: Metadata, config: GatewayConfig) -> Result<Self, CoreError> {
        metadata.validate()?;

        let mut router = Router::new();
        routes::records::register(&mut router);

        Ok(Self {
            state: AppState {
                store,
                metadata,
                engine_config: EngineConfig::default(),
                config,
            },
            router,
        })
    }

    /// Register an additional route.
    ///
    /// Literal segments outrank wildcards, so a route registered for one
    /// entity type automatically wins over the generic handlers.
    pub fn register(&mut self, method: Method, pattern: &str, handler: Handler) {
        self.router.register(method, pattern, handler);
    }

    /// Dispatch a request to the most specific matching route.
    pub fn dispatch(&self, request: &Request) -> Response {
        match self.router.resolve(request.method, &request.path) {
            Some((route, params)) => match route.handle(&self.state, request, &params) {
                Ok(response) => response,
                Err(error) => error.into_response(),
            },
            None => ApiError::not_found(format!(
                "no route matches {} {}",
                request.method, request.path
            ))
            .into_response(),
        }
    }

    /// Shared state (store, metadata, configuration).
    pub fn state(&self) -> &AppState {
        &self.state
    }
}
