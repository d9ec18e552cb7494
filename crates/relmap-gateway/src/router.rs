//! Scored wildcard route dispatch.
//!
//! Routes are `{method, pattern, handler}` tuples. Patterns are `/`-segmented
//! with `{name}` wildcards; each pattern's specificity score is computed at
//! registration and the table is kept sorted, so dispatch is a linear scan
//! stopping at the first match. Literal segments outrank wildcard segments,
//! which makes a route registered for one entity type win over the generic
//! handlers without any special casing.

use std::collections::HashMap;
use std::fmt;

use crate::error::ApiError;
use crate::request::{Request, Response};
use crate::AppState;

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Read operations.
    Get,
    /// Create operations.
    Post,
    /// Update operations.
    Put,
    /// Delete operations.
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        write!(f, "{}", name)
    }
}

/// Path parameters captured by wildcard segments.
#[derive(Debug, Clone, Default)]
pub struct PathParams {
    values: HashMap<String, String>,
}

impl PathParams {
    /// Get a captured parameter by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Get a captured parameter, or a BadRequest error.
    pub fn require(&self, name: &str) -> Result<&str, ApiError> {
        self.get(name)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ApiError::bad_request(format!("missing path parameter '{}'", name)))
    }
}

/// A route handler.
pub type Handler = fn(&AppState, &Request, &PathParams) -> Result<Response, ApiError>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A registered route.
pub struct Route {
    method: Method,
    segments: Vec<Segment>,
    score: u32,
    handler: Handler,
}

impl Route {
    fn new(method: Method, pattern: &str, handler: Handler) -> Self {
        let segments: Vec<Segment> = split_path(pattern)
            .into_iter()
            .map(|segment| {
                if segment.starts_with('{') && segment.ends_with('}') && segment.len() > 2 {
                    Segment::Param(segment[1..segment.len() - 1].to_string())
                } else {
                    Segment::Literal(segment.to_string())
                }
            })
            .collect();
        let score = segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count() as u32;
        Self {
            method,
            segments,
            score,
            handler,
        }
    }

    /// The pattern this route was registered with.
    pub fn pattern(&self) -> String {
        let rendered: Vec<String> = self
            .segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(text) => text.clone(),
                Segment::Param(name) => format!("{{{}}}", name),
            })
            .collect();
        format!("/{}", rendered.join("/"))
    }

    fn matches(&self, method: Method, path_segments: &[&str]) -> Option<PathParams> {
        if method != self.method || path_segments.len() != self.segments.len() {
            return None;
        }
        let mut params = PathParams::default();
        for (segment, value) in self.segments.iter().zip(path_segments) {
            match segment {
                Segment::Literal(text) => {
                    if text != value {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    params.values.insert(name.clone(), (*value).to_string());
                }
            }
        }
        Some(params)
    }

    /// Invoke the route's handler.
    pub fn handle(
        &self,
        state: &AppState,
        request: &Request,
        params: &PathParams,
    ) -> Result<Response, ApiError> {
        (self.handler)(state, request, params)
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// The dispatch table.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route.
    ///
    /// The table stays sorted by descending score; routes with equal scores
    /// keep registration order, so dispatch is deterministic.
    pub fn register(&mut self, method: Method, pattern: &str, handler: Handler) {
        self.routes.push(Route::new(method, pattern, handler));
        self.routes.sort_by(|a, b| b.score.cmp(&a.score));
    }

    /// Resolve the most specific route matching the request.
    pub fn resolve(&self, method: Method, path: &str) -> Option<(&Route, PathParams)> {
        let segments = split_path(path);
        self.routes
            .iter()
            .find_map(|route| route.matches(method, &segments).map(|params| (route, params)))
    }
}
