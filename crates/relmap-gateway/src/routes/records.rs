//! Generic record and relationship handlers.
//!
//! Every handler resolves its target entity and relationship by name against
//! the loaded metadata, then delegates to the record store and the
//! relationship engine. Bodies of `create`/`update` are processed in two
//! phases: plain entity fields are persisted first, then relationship
//! selections are applied.

use std::collections::BTreeMap;

use tracing::debug;

use relmap_core::catalog::is_valid_name;
use relmap_core::{
    CascadeAction, EntityDef, FieldDef, ListQuery, ManyToManyRelationship, OrderDirection, Record,
    RelationshipDef, RelationshipEngine, RelationshipKind, ScalarType, Value,
};

use relmap_core::FieldViolation;

use crate::error::ApiError;
use crate::request::{Request, Response, ResponseFormat};
use crate::router::{Method, PathParams, Router};
use crate::AppState;

/// Query parameters with meaning to `list`; everything else is a filter.
const RESERVED_PARAMS: [&str; 6] = ["page", "per_page", "sort", "order", "search", "format"];

/// Register the generic record routes.
pub fn register(router: &mut Router) {
    router.register(Method::Get, "/{entity}", list);
    router.register(Method::Get, "/{entity}/deleted", list_deleted);
    router.register(Method::Get, "/{entity}/{id}", retrieve);
    router.register(Method::Get, "/{entity}/{id}/link/{rel}", list_related);
    router.register(Method::Post, "/{entity}", create);
    router.register(Method::Post, "/{entity}/{id}/link/{rel}", create_and_link);
    router.register(Method::Put, "/{entity}/{id}", update);
    router.register(Method::Put, "/{entity}/{id}/restore", restore);
    router.register(Method::Put, "/{entity}/{id}/link/{rel}/{other_id}", link);
    router.register(Method::Delete, "/{entity}/{id}", delete);
    router.register(Method::Delete, "/{entity}/{id}/link/{rel}/{other_id}", unlink);
}

fn entity_from<'a>(state: &'a AppState, params: &PathParams) -> Result<&'a EntityDef, ApiError> {
    let name = params.require("entity")?;
    if !is_valid_name(name) {
        return Err(ApiError::bad_request(format!(
            "malformed entity name '{}'",
            name
        )));
    }
    state
        .metadata
        .find_entity(name)
        .ok_or_else(|| ApiError::not_found(format!("unknown entity type '{}'", name)))
}

fn relationship_from<'a>(
    state: &'a AppState,
    params: &PathParams,
) -> Result<&'a RelationshipDef, ApiError> {
    let name = params.require("rel")?;
    if !is_valid_name(name) {
        return Err(ApiError::bad_request(format!(
            "malformed relationship name '{}'",
            name
        )));
    }
    state
        .metadata
        .find_relationship(name)
        .ok_or_else(|| ApiError::not_found(format!("unknown relationship '{}'", name)))
}

fn record_from(
    state: &AppState,
    entity: &EntityDef,
    params: &PathParams,
) -> Result<Record, ApiError> {
    let id = params.require("id")?;
    state.store.get(entity, id)?.ok_or_else(|| {
        ApiError::not_found(format!("no active {} record with id '{}'", entity.name, id))
    })
}

fn engine<'a>(state: &'a AppState, rel: &'a RelationshipDef) -> RelationshipEngine<'a> {
    RelationshipEngine::new(&state.store, &state.metadata, rel)
        .with_config(state.engine_config.clone())
}

fn body_object(request: &Request) -> Result<&serde_json::Map<String, serde_json::Value>, ApiError> {
    request
        .body
        .as_ref()
        .and_then(|body| body.as_object())
        .ok_or_else(|| ApiError::bad_request("request body must be a JSON object"))
}

/// A relationship selection carried in a request body.
#[derive(Debug)]
struct Selection<'a> {
    field: String,
    rel: &'a RelationshipDef,
    partner_id: Option<String>,
}

/// Separate a request body into plain entity fields and relationship
/// selections.
///
/// Selection fields are identified through metadata, never by naming
/// convention; their values must be partner ids (or null to clear).
fn split_fields<'a>(
    state: &'a AppState,
    entity: &EntityDef,
    body: &serde_json::Map<String, serde_json::Value>,
) -> Result<(BTreeMap<String, Value>, Vec<Selection<'a>>), ApiError> {
    let selection_fields = state.metadata.selection_fields(&entity.name);
    let mut fields = BTreeMap::new();
    let mut selections = Vec::new();
    let mut violations = Vec::new();

    for (name, raw) in body {
        if let Some((field, rel)) = selection_fields.iter().find(|(field, _)| field == name) {
            match raw {
                serde_json::Value::Null => selections.push(Selection {
                    field: field.clone(),
                    rel: *rel,
                    partner_id: None,
                }),
                serde_json::Value::String(id) => selections.push(Selection {
                    field: field.clone(),
                    rel: *rel,
                    partner_id: Some(id.clone()),
                }),
                _ => violations.push(FieldViolation::new(name, "must be an id string or null")),
            }
            continue;
        }
        match Value::from_json(raw) {
            Ok(value) => {
                fields.insert(name.clone(), value);
            }
            Err(message) => violations.push(FieldViolation::new(name, message)),
        }
    }

    if violations.is_empty() {
        Ok((fields, selections))
    } else {
        Err(ApiError::unprocessable(violations))
    }
}

/// Apply one relationship selection for a record.
///
/// Prior rows with a different partner are removed first, then the new link
/// is created; when the target partner already holds the active row, the
/// write is skipped entirely.
fn apply_selection(
    state: &AppState,
    record: &Record,
    selection: &Selection<'_>,
    actor: &str,
) -> Result<(), ApiError> {
    let rel = selection.rel;
    let engine = engine(state, rel);
    let partner_name = rel
        .partner_of(&record.entity)
        .ok_or_else(|| ApiError::internal("relationship participants out of sync"))?;
    let partner_column = rel
        .column_for(partner_name)
        .ok_or_else(|| ApiError::internal("relationship participants out of sync"))?;

    let current = engine.get_related_records(record)?;
    let target = match &selection.partner_id {
        None => {
            if !current.is_empty() {
                engine.remove_all(record, actor)?;
            }
            return Ok(());
        }
        Some(target) => target,
    };

    if current
        .iter()
        .any(|row| row.get(&partner_column).and_then(Value::as_str) == Some(target))
    {
        debug!(
            relationship = %rel.name,
            field = %selection.field,
            "selection unchanged, skipping"
        );
        return Ok(());
    }

    let partner_def = state.metadata.entity(partner_name)?;
    let partner = state.store.get(partner_def, target)?.ok_or_else(|| {
        ApiError::not_found(format!(
            "no active {} record with id '{}'",
            partner_name, target
        ))
    })?;

    if !current.is_empty() {
        engine.remove_all(record, actor)?;
    }
    engine.add(record, &partner, &BTreeMap::new(), actor)?;
    Ok(())
}

fn parse_u64(raw: &str, name: &str) -> Result<u64, ApiError> {
    raw.parse::<u64>()
        .map_err(|_| ApiError::bad_request(format!("invalid value '{}' for parameter '{}'", raw, name)))
}

fn filter_value(field: &FieldDef, raw: &str) -> Result<Value, ApiError> {
    let parsed = match field.field_type {
        ScalarType::Bool => match raw {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        ScalarType::Int => raw.parse::<i64>().ok().map(Value::Int),
        ScalarType::Timestamp => raw.parse::<i64>().ok().map(Value::Timestamp),
        ScalarType::Float => raw.parse::<f64>().ok().map(Value::Float),
        ScalarType::Text | ScalarType::Uuid => Some(Value::Text(raw.to_string())),
    };
    parsed.ok_or_else(|| {
        ApiError::bad_request(format!(
            "invalid value '{}' for filter '{}'",
            raw, field.name
        ))
    })
}

fn list_query_from(
    state: &AppState,
    entity: &EntityDef,
    request: &Request,
) -> Result<ListQuery, ApiError> {
    let mut query = ListQuery::default().with_per_page(state.config.default_per_page);

    if let Some(raw) = request.query_param("page") {
        query.page = parse_u64(raw, "page")?;
    }
    if let Some(raw) = request.query_param("per_page") {
        query.per_page = parse_u64(raw, "per_page")?.min(state.config.max_per_page);
    }
    if let Some(sort) = request.query_param("sort") {
        query.sort = Some(sort.to_string());
    }
    match request.query_param("order") {
        None | Some("asc") => {}
        Some("desc") => query.order = OrderDirection::Desc,
        Some(other) => {
            return Err(ApiError::bad_request(format!(
                "invalid sort order '{}'",
                other
            )))
        }
    }
    if let Some(search) = request.query_param("search") {
        query.search = Some(search.to_string());
    }

    for (name, raw) in &request.query {
        if RESERVED_PARAMS.contains(&name.as_str()) {
            continue;
        }
        let field = entity
            .get_field(name)
            .ok_or_else(|| ApiError::bad_request(format!("unknown filter field '{}'", name)))?;
        query.filters.push((name.clone(), filter_value(field, raw)?));
    }

    Ok(query)
}

fn list(state: &AppState, request: &Request, params: &PathParams) -> Result<Response, ApiError> {
    let entity = entity_from(state, params)?;
    let query = list_query_from(state, entity, request)?;
    let format = ResponseFormat::from_request(request)?;
    let result = state.store.list(entity, &query)?;
    Ok(Response::list(&result, &query, format))
}

fn list_deleted(
    state: &AppState,
    request: &Request,
    params: &PathParams,
) -> Result<Response, ApiError> {
    let entity = entity_from(state, params)?;
    let query = list_query_from(state, entity, request)?;
    let format = ResponseFormat::from_request(request)?;
    let result = state.store.list_deleted(entity, &query)?;
    Ok(Response::list(&result, &query, format))
}

fn retrieve(state: &AppState, _: &Request, params: &PathParams) -> Result<Response, ApiError> {
    let entity = entity_from(state, params)?;
    let record = record_from(state, entity, params)?;
    Ok(Response::ok(record.to_json()))
}

fn list_related(
    state: &AppState,
    request: &Request,
    params: &PathParams,
) -> Result<Response, ApiError> {
    let entity = entity_from(state, params)?;
    let rel = relationship_from(state, params)?;
    if !rel.involves(&entity.name) {
        return Err(ApiError::bad_request(format!(
            "entity '{}' does not participate in relationship '{}'",
            entity.name, rel.name
        )));
    }
    let record = record_from(state, entity, params)?;

    if matches!(rel.kind, RelationshipKind::ManyToMany { .. }) {
        let page = match request.query_param("page") {
            Some(raw) => parse_u64(raw, "page")?,
            None => 1,
        };
        let per_page = match request.query_param("per_page") {
            Some(raw) => parse_u64(raw, "per_page")?.min(state.config.max_per_page),
            None => state.config.default_per_page,
        };
        let related = ManyToManyRelationship::new(engine(state, rel))?
            .get_related_paginated(&record, page, per_page)?;
        let rows: Vec<serde_json::Value> = related.records.iter().map(|r| r.to_json()).collect();
        return Ok(Response {
            status: 200,
            body: serde_json::json!({
                "data": rows,
                "pagination": related.pagination,
            }),
        });
    }

    let rows: Vec<serde_json::Value> = engine(state, rel)
        .get_related_records(&record)?
        .iter()
        .map(|r| r.to_json())
        .collect();
    Ok(Response::ok(serde_json::json!(rows)))
}

fn create(state: &AppState, request: &Request, params: &PathParams) -> Result<Response, ApiError> {
    let entity = entity_from(state, params)?;
    let body = body_object(request)?;
    let (fields, selections) = split_fields(state, entity, body)?;

    let record = state.store.insert(entity, &fields, &request.actor)?;
    for selection in &selections {
        apply_selection(state, &record, selection, &request.actor)?;
    }

    Ok(Response::created(
        record.to_json(),
        format!("{} created", entity.name),
    ))
}

fn update(state: &AppState, request: &Request, params: &PathParams) -> Result<Response, ApiError> {
    let entity = entity_from(state, params)?;
    let id = params.require("id")?;
    let body = body_object(request)?;
    let (fields, selections) = split_fields(state, entity, body)?;

    // A body carrying only selections leaves the entity row untouched
    let record = if fields.is_empty() {
        state.store.get(entity, id)?.ok_or_else(|| {
            ApiError::not_found(format!("no active {} record with id '{}'", entity.name, id))
        })?
    } else {
        state.store.update(entity, id, &fields, &request.actor)?
    };
    for selection in &selections {
        apply_selection(state, &record, selection, &request.actor)?;
    }

    Ok(Response::ok_with_message(
        record.to_json(),
        format!("{} updated", entity.name),
    ))
}

fn delete(state: &AppState, request: &Request, params: &PathParams) -> Result<Response, ApiError> {
    let entity = entity_from(state, params)?;
    let record = record_from(state, entity, params)?;

    // Restrict conflicts surface before any relationship rows are touched
    let relationships = state.metadata.relationships_for(&entity.name);
    for rel in relationships
        .iter()
        .filter(|r| r.on_delete == CascadeAction::Restrict)
    {
        engine(state, rel).handle_model_deletion(&record, rel.on_delete, &request.actor)?;
    }
    for rel in relationships
        .iter()
        .filter(|r| r.on_delete != CascadeAction::Restrict)
    {
        engine(state, rel).handle_model_deletion(&record, rel.on_delete, &request.actor)?;
    }

    state.store.soft_delete(entity, &record.id, &request.actor)?;
    Ok(Response::ok_with_message(
        serde_json::json!({ "id": record.id }),
        format!("{} deleted", entity.name),
    ))
}

fn restore(state: &AppState, request: &Request, params: &PathParams) -> Result<Response, ApiError> {
    let entity = entity_from(state, params)?;
    let id = params.require("id")?;

    if !state.store.restore(entity, id, &request.actor)? {
        return Err(ApiError::not_found(format!(
            "no deleted {} record with id '{}'",
            entity.name, id
        )));
    }
    let record = state.store.get(entity, id)?.ok_or_else(|| {
        ApiError::not_found(format!("no active {} record with id '{}'", entity.name, id))
    })?;
    Ok(Response::ok_with_message(
        record.to_json(),
        format!("{} restored", entity.name),
    ))
}

fn create_and_link(
    state: &AppState,
    request: &Request,
    params: &PathParams,
) -> Result<Response, ApiError> {
    let entity = entity_from(state, params)?;
    let rel = relationship_from(state, params)?;
    let parent = record_from(state, entity, params)?;
    let child_name = rel.partner_of(&entity.name).ok_or_else(|| {
        ApiError::bad_request(format!(
            "entity '{}' does not participate in relationship '{}'",
            entity.name, rel.name
        ))
    })?;
    let child_entity = state.metadata.entity(child_name)?;

    let body = body_object(request)?;
    let (fields, selections) = split_fields(state, child_entity, body)?;

    // Two logical steps: the child is created first, then linked. A failure
    // between them leaves the child unlinked.
    let child = state.store.insert(child_entity, &fields, &request.actor)?;
    let linked = engine(state, rel).add(&parent, &child, &BTreeMap::new(), &request.actor)?;
    // Selections in the body are applied last and win over the path parent
    for selection in &selections {
        apply_selection(state, &child, selection, &request.actor)?;
    }

    let mut data = child.to_json();
    data["linked"] = serde_json::json!(linked);
    Ok(Response::created(
        data,
        format!("{} created and linked", child_entity.name),
    ))
}

fn link(state: &AppState, request: &Request, params: &PathParams) -> Result<Response, ApiError> {
    let entity = entity_from(state, params)?;
    let rel = relationship_from(state, params)?;
    let record = record_from(state, entity, params)?;
    let partner_name = rel.partner_of(&entity.name).ok_or_else(|| {
        ApiError::bad_request(format!(
            "entity '{}' does not participate in relationship '{}'",
            entity.name, rel.name
        ))
    })?;
    let partner_def = state.metadata.entity(partner_name)?;
    let other_id = params.require("other_id")?;
    let other = state.store.get(partner_def, other_id)?.ok_or_else(|| {
        ApiError::not_found(format!(
            "no active {} record with id '{}'",
            partner_name, other_id
        ))
    })?;

    let linked = engine(state, rel).add(&record, &other, &BTreeMap::new(), &request.actor)?;
    let message = if linked { "linked" } else { "already linked" };
    Ok(Response::ok_with_message(
        serde_json::json!({ "linked": linked }),
        message,
    ))
}

fn unlink(state: &AppState, request: &Request, params: &PathParams) -> Result<Response, ApiError> {
    let entity = entity_from(state, params)?;
    let rel = relationship_from(state, params)?;
    let record = record_from(state, entity, params)?;
    let partner_name = rel.partner_of(&entity.name).ok_or_else(|| {
        ApiError::bad_request(format!(
            "entity '{}' does not participate in relationship '{}'",
            entity.name, rel.name
        ))
    })?;
    let partner_def = state.metadata.entity(partner_name)?;
    let other_id = params.require("other_id")?;
    let other = state.store.get(partner_def, other_id)?.ok_or_else(|| {
        ApiError::not_found(format!(
            "no active {} record with id '{}'",
            partner_name, other_id
        ))
    })?;

    if !engine(state, rel).remove(&record, &other, &request.actor)? {
        return Err(ApiError::not_found(format!(
            "no active relationship '{}' between '{}' and '{}'",
            rel.name, record.id, other.id
        )));
    }
    Ok(Response::ok_with_message(
        serde_json::json!({ "unlinked": true }),
        "unlinked",
    ))
}
