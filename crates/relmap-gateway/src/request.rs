//! Request and response values.
//!
//! The gateway is transport-agnostic: a request is a plain value carrying the
//! method, path, query parameters, an optional JSON body, and the acting
//! user. Responses are JSON bodies of the shape `{data, message?}`, with list
//! responses additionally carrying pagination, filter, and sort metadata.

use std::collections::HashMap;

use relmap_core::{ListQuery, ListResult};

use crate::error::ApiError;
use crate::router::Method;

/// An incoming request.
#[derive(Debug, Clone)]
pub struct Request {
    /// Request method.
    pub method: Method,
    /// Request path, `/`-segmented.
    pub path: String,
    /// Query parameters.
    pub query: HashMap<String, String>,
    /// Optional JSON body.
    pub body: Option<serde_json::Value>,
    /// The acting user, recorded in audit columns. Always passed explicitly.
    pub actor: String,
}

impl Request {
    /// Create a request.
    pub fn new(method: Method, path: impl Into<String>, actor: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: HashMap::new(),
            body: None,
            actor: actor.into(),
        }
    }

    /// Add a query parameter.
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Set the JSON body.
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Get a query parameter by name.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

/// Response shape negotiated by list requests through the `format` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    /// `{data, pagination, ...}`.
    #[default]
    Plain,
    /// Grid-widget-oriented shape exposing `total`/`rowCount` aliases.
    Grid,
}

impl ResponseFormat {
    /// Resolve the format requested by a list request.
    pub fn from_request(request: &Request) -> Result<Self, ApiError> {
        match request.query_param("format") {
            None | Some("plain") => Ok(ResponseFormat::Plain),
            Some("grid") => Ok(ResponseFormat::Grid),
            Some(other) => Err(ApiError::bad_request(format!(
                "unknown response format '{}'",
                other
            ))),
        }
    }
}

/// An outgoing response.
#[derive(Debug, Clone)]
pub struct Response {
    /// Response status code.
    pub status: u16,
    /// JSON body.
    pub body: serde_json::Value,
}

impl Response {
    /// A 200 response with `{data}`.
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: 200,
            body: serde_json::json!({ "data": data }),
        }
    }

    /// A 200 response with `{data, message}`.
    pub fn ok_with_message(data: serde_json::Value, message: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: serde_json::json!({ "data": data, "message": message.into() }),
        }
    }

    /// A 201 response with `{data, message}`.
    pub fn created(data: serde_json::Value, message: impl Into<String>) -> Self {
        Self {
            status: 201,
            body: serde_json::json!({ "data": data, "message": message.into() }),
        }
    }

    /// A 200 list response in the negotiated shape.
    pub fn list(result: &ListResult, query: &ListQuery, format: ResponseFormat) -> Self {
        let rows: Vec<serde_json::Value> = result.records.iter().map(|r| r.to_json()).collect();
        let body = match format {
            ResponseFormat::Plain => {
                let mut body = serde_json::json!({
                    "data": rows,
                    "pagination": {
                        "page": result.page,
                        "per_page": result.per_page,
                        "total": result.total,
                        "has_more": result.has_more(),
                        "total_pages": result.total_pages(),
                    },
                });
                if !query.filters.is_empty() {
                    let filters: serde_json::Map<String, serde_json::Value> = query
                        .filters
                        .iter()
                        .map(|(name, value)| (name.clone(), value.to_json()))
                        .collect();
                    body["filters"] = serde_json::Value::Object(filters);
                }
                if let Some(sort) = &query.sort {
                    body["sort"] = serde_json::json!({
                        "field": sort,
                        "order": match query.order {
                            relmap_core::OrderDirection::Asc => "asc",
                            relmap_core::OrderDirection::Desc => "desc",
                        },
                    });
                }
                if let Some(search) = &query.search {
                    body["search"] = serde_json::json!(search);
                }
                body
            }
            ResponseFormat::Grid => serde_json::json!({
                "data": rows,
                "total": result.total,
                "rowCount": rows.len(),
                "page": result.page,
                "perPage": result.per_page,
                "totalPages": result.total_pages(),
            }),
        };
        Self { status: 200, body }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmap_core::{OrderDirection, Record, Value};
    use std::collections::BTreeMap;

    fn sample_result() -> ListResult {
        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), Value::Text("Alien".to_string()));
        ListResult {
            records: vec![Record {
                entity: "Movie".to_string(),
                id: "m1".to_string(),
                fields,
                created_at: 1,
                updated_at: 1,
                created_by: Some("tester".to_string()),
                updated_by: Some("tester".to_string()),
                deleted_at: None,
                deleted_by: None,
            }],
            total: 7,
            page: 2,
            per_page: 3,
        }
    }

    #[test]
    fn test_request_builder() {
        let request = Request::new(Method::Get, "/movie", "alice")
            .with_query("page", "2")
            .with_body(serde_json::json!({"title": "Alien"}));

        assert_eq!(request.query_param("page"), Some("2"));
        assert_eq!(request.query_param("missing"), None);
        assert_eq!(request.actor, "alice");
    }

    #[test]
    fn test_format_negotiation() {
        let plain = Request::new(Method::Get, "/movie", "alice");
        assert_eq!(
            ResponseFormat::from_request(&plain).unwrap(),
            ResponseFormat::Plain
        );

        let grid = Request::new(Method::Get, "/movie", "alice").with_query("format", "grid");
        assert_eq!(
            ResponseFormat::from_request(&grid).unwrap(),
            ResponseFormat::Grid
        );

        let bogus = Request::new(Method::Get, "/movie", "alice").with_query("format", "xml");
        assert!(ResponseFormat::from_request(&bogus).is_err());
    }

    #[test]
    fn test_plain_list_shape() {
        let query = ListQuery::default()
            .with_filter("year", Value::Int(1979))
            .with_sort("title", OrderDirection::Desc)
            .with_search("Ali");
        let response = Response::list(&sample_result(), &query, ResponseFormat::Plain);

        assert_eq!(response.status, 200);
        assert_eq!(response.body["data"][0]["title"], "Alien");
        assert_eq!(response.body["pagination"]["total"], 7);
        assert_eq!(response.body["pagination"]["total_pages"], 3);
        assert_eq!(response.body["pagination"]["has_more"], true);
        assert_eq!(response.body["filters"]["year"], 1979);
        assert_eq!(response.body["sort"]["order"], "desc");
        assert_eq!(response.body["search"], "Ali");
    }

    #[test]
    fn test_grid_list_shape() {
        let response = Response::list(
            &sample_result(),
            &ListQuery::default(),
            ResponseFormat::Grid,
        );

        assert_eq!(response.body["total"], 7);
        assert_eq!(response.body["rowCount"], 1);
        assert_eq!(response.body["perPage"], 3);
        assert_eq!(response.body["totalPages"], 3);
        assert!(response.body.get("pagination").is_none());
    }

    #[test]
    fn test_created_shape() {
        let response = Response::created(serde_json::json!({"id": "m1"}), "Movie created");
        assert_eq!(response.status, 201);
        assert_eq!(response.body["message"], "Movie created");
    }
}
