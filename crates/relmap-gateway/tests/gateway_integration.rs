//! End-to-end tests for the record API gateway.

use relmap_core::{
    synth, CascadeAction, EntityDef, FieldDef, Metadata, RelationshipDef, RelationshipEngine,
    Record, ScalarType, Store, Value,
};
use relmap_gateway::{Gateway, GatewayConfig, Method, Request, Response};

fn metadata() -> Metadata {
    Metadata::new()
        .with_entity(
            EntityDef::new("Movie")
                .with_field(FieldDef::new("title", ScalarType::Text).with_index())
                .with_field(FieldDef::optional("year", ScalarType::Int)),
        )
        .with_entity(EntityDef::new("Quote").with_field(FieldDef::new("text", ScalarType::Text)))
        .with_entity(EntityDef::new("Tag").with_field(FieldDef::new("label", ScalarType::Text)))
        .with_entity(EntityDef::new("Poster").with_field(FieldDef::new("url", ScalarType::Text)))
        .with_relationship(
            RelationshipDef::one_to_many("movie_quotes", "Movie", "Quote")
                .with_on_delete(CascadeAction::SoftDelete),
        )
        .with_relationship(RelationshipDef::many_to_many("movie_tags", "Movie", "Tag"))
        .with_relationship(RelationshipDef::one_to_one("movie_poster", "Movie", "Poster"))
}

fn gateway() -> Gateway {
    let store = Store::open_in_memory().unwrap();
    let metadata = metadata();
    synth::sync(&store, &metadata).unwrap();
    Gateway::new(store, metadata, GatewayConfig::default()).unwrap()
}

fn create(gateway: &Gateway, entity: &str, body: serde_json::Value) -> String {
    let response = gateway.dispatch(
        &Request::new(Method::Post, format!("/{}", entity), "tester").with_body(body),
    );
    assert_eq!(response.status, 201, "create failed: {}", response.body);
    response.body["data"]["id"].as_str().unwrap().to_string()
}

fn fetch_record(gateway: &Gateway, entity: &str, id: &str) -> Record {
    let state = gateway.state();
    let def = state.metadata.get_entity(entity).unwrap();
    state.store.get(def, id).unwrap().unwrap()
}

fn join_rows(gateway: &Gateway, relationship: &str, record: &Record) -> (Vec<Record>, Vec<Record>) {
    let state = gateway.state();
    let rel = state.metadata.get_relationship(relationship).unwrap();
    let engine = RelationshipEngine::new(&state.store, &state.metadata, rel);
    (
        engine.get_related_records(record).unwrap(),
        engine.get_deleted_relationship_records(record).unwrap(),
    )
}

fn error_code(response: &Response) -> &str {
    response.body["error"]["code"].as_str().unwrap()
}

#[test]
fn test_crud_flow() {
    let gateway = gateway();
    let id = create(
        &gateway,
        "movie",
        serde_json::json!({"title": "Alien", "year": 1979}),
    );

    let response = gateway.dispatch(&Request::new(Method::Get, format!("/movie/{}", id), "tester"));
    assert_eq!(response.status, 200);
    assert_eq!(response.body["data"]["title"], "Alien");
    assert_eq!(response.body["data"]["created_by"], "tester");

    let response = gateway.dispatch(
        &Request::new(Method::Put, format!("/movie/{}", id), "editor")
            .with_body(serde_json::json!({"year": 1986})),
    );
    assert_eq!(response.status, 200);
    assert_eq!(response.body["data"]["year"], 1986);
    assert_eq!(response.body["data"]["updated_by"], "editor");
    assert_eq!(response.body["message"], "Movie updated");

    let response =
        gateway.dispatch(&Request::new(Method::Delete, format!("/movie/{}", id), "remover"));
    assert_eq!(response.status, 200);

    let response = gateway.dispatch(&Request::new(Method::Get, format!("/movie/{}", id), "tester"));
    assert_eq!(response.status, 404);

    // The deleted record shows up in the deleted listing
    let response = gateway.dispatch(&Request::new(Method::Get, "/movie/deleted", "tester"));
    assert_eq!(response.status, 200);
    assert_eq!(response.body["data"][0]["id"], id.as_str());

    let response = gateway.dispatch(&Request::new(
        Method::Put,
        format!("/movie/{}/restore", id),
        "restorer",
    ));
    assert_eq!(response.status, 200);
    assert_eq!(response.body["message"], "Movie restored");

    let response = gateway.dispatch(&Request::new(Method::Get, format!("/movie/{}", id), "tester"));
    assert_eq!(response.status, 200);
}

#[test]
fn test_list_with_filters_sort_and_grid_shape() {
    let gateway = gateway();
    for (title, year) in [("Alien", 1979), ("Aliens", 1986), ("Blade Runner", 1982)] {
        create(&gateway, "movie", serde_json::json!({"title": title, "year": year}));
    }

    let response = gateway.dispatch(
        &Request::new(Method::Get, "/movie", "tester")
            .with_query("year", "1986")
            .with_query("sort", "title")
            .with_query("order", "desc"),
    );
    assert_eq!(response.status, 200);
    assert_eq!(response.body["pagination"]["total"], 1);
    assert_eq!(response.body["data"][0]["title"], "Aliens");
    assert_eq!(response.body["filters"]["year"], 1986);
    assert_eq!(response.body["sort"]["order"], "desc");

    let response = gateway.dispatch(
        &Request::new(Method::Get, "/movie", "tester").with_query("search", "lien"),
    );
    assert_eq!(response.body["pagination"]["total"], 2);

    let response = gateway.dispatch(
        &Request::new(Method::Get, "/movie", "tester")
            .with_query("format", "grid")
            .with_query("per_page", "2"),
    );
    assert_eq!(response.body["total"], 3);
    assert_eq!(response.body["rowCount"], 2);
    assert_eq!(response.body["totalPages"], 2);

    let response = gateway.dispatch(
        &Request::new(Method::Get, "/movie", "tester").with_query("director", "Scott"),
    );
    assert_eq!(response.status, 400);
}

#[test]
fn test_error_taxonomy() {
    let gateway = gateway();

    let response = gateway.dispatch(&Request::new(Method::Get, "/starship", "tester"));
    assert_eq!(response.status, 404);
    assert_eq!(error_code(&response), "NOT_FOUND");

    let response = gateway.dispatch(&Request::new(Method::Get, "/bad-name", "tester"));
    assert_eq!(response.status, 400);
    assert_eq!(error_code(&response), "BAD_REQUEST");

    let response = gateway.dispatch(&Request::new(Method::Get, "/", "tester"));
    assert_eq!(response.status, 404);

    // Field-level failures come back as a structured violation list
    let response = gateway.dispatch(
        &Request::new(Method::Post, "/movie", "tester")
            .with_body(serde_json::json!({"year": "nineteen"})),
    );
    assert_eq!(response.status, 422);
    assert_eq!(error_code(&response), "UNPROCESSABLE_ENTITY");
    let violations = response.body["error"]["violations"].as_array().unwrap();
    let fields: Vec<&str> = violations
        .iter()
        .map(|v| v["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"title"));
    assert!(fields.contains(&"year"));

    let response = gateway.dispatch(&Request::new(Method::Post, "/movie", "tester"));
    assert_eq!(response.status, 400);
}

#[test]
fn test_quote_selection_field_scenario() {
    let gateway = gateway();
    let first = create(&gateway, "movie", serde_json::json!({"title": "Alien"}));
    let second = create(&gateway, "movie", serde_json::json!({"title": "Aliens"}));

    // Creating a quote with a movie_id selection populates the join table
    let quote_id = create(
        &gateway,
        "quote",
        serde_json::json!({
            "text": "In space no one can hear you scream.",
            "movie_id": first,
        }),
    );
    let quote = fetch_record(&gateway, "Quote", &quote_id);
    let (active, deleted) = join_rows(&gateway, "movie_quotes", &quote);
    assert_eq!(active.len(), 1);
    assert!(deleted.is_empty());
    assert_eq!(
        active[0].get("one_movie_id").and_then(Value::as_str),
        Some(first.as_str())
    );
    assert_eq!(
        active[0].get("many_quote_id").and_then(Value::as_str),
        Some(quote_id.as_str())
    );
    let row_id = active[0].id.clone();

    // Re-submitting the same movie_id is a no-op: same row, still exactly one
    let response = gateway.dispatch(
        &Request::new(Method::Put, format!("/quote/{}", quote_id), "tester")
            .with_body(serde_json::json!({"movie_id": first})),
    );
    assert_eq!(response.status, 200);
    let (active, deleted) = join_rows(&gateway, "movie_quotes", &quote);
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, row_id);
    assert!(deleted.is_empty());

    // Re-pointing at another movie retires the old row and creates one new one
    let response = gateway.dispatch(
        &Request::new(Method::Put, format!("/quote/{}", quote_id), "tester")
            .with_body(serde_json::json!({"movie_id": second})),
    );
    assert_eq!(response.status, 200);
    let (active, deleted) = join_rows(&gateway, "movie_quotes", &quote);
    assert_eq!(active.len(), 1);
    assert_eq!(
        active[0].get("one_movie_id").and_then(Value::as_str),
        Some(second.as_str())
    );
    assert_eq!(deleted.len(), 1);

    // Null clears the selection
    let response = gateway.dispatch(
        &Request::new(Method::Put, format!("/quote/{}", quote_id), "tester")
            .with_body(serde_json::json!({"movie_id": null})),
    );
    assert_eq!(response.status, 200);
    let (active, deleted) = join_rows(&gateway, "movie_quotes", &quote);
    assert!(active.is_empty());
    assert_eq!(deleted.len(), 2);

    // An unknown partner id is rejected
    let response = gateway.dispatch(
        &Request::new(Method::Put, format!("/quote/{}", quote_id), "tester")
            .with_body(serde_json::json!({"movie_id": "no-such-movie"})),
    );
    assert_eq!(response.status, 404);
}

#[test]
fn test_link_unlink_round_trip() {
    let gateway = gateway();
    let movie = create(&gateway, "movie", serde_json::json!({"title": "Alien"}));
    let tag = create(&gateway, "tag", serde_json::json!({"label": "horror"}));

    let path = format!("/movie/{}/link/movie_tags/{}", movie, tag);
    let response = gateway.dispatch(&Request::new(Method::Put, &path, "tester"));
    assert_eq!(response.status, 200);
    assert_eq!(response.body["data"]["linked"], true);

    // A duplicate link is a defined false-return, not an error
    let response = gateway.dispatch(&Request::new(Method::Put, &path, "tester"));
    assert_eq!(response.status, 200);
    assert_eq!(response.body["data"]["linked"], false);
    assert_eq!(response.body["message"], "already linked");

    let response = gateway.dispatch(&Request::new(
        Method::Get,
        format!("/movie/{}/link/movie_tags", movie),
        "tester",
    ));
    assert_eq!(response.status, 200);
    assert_eq!(response.body["pagination"]["total"], 1);
    assert_eq!(
        response.body["data"][0]["tag_id"].as_str(),
        Some(tag.as_str())
    );

    let response = gateway.dispatch(&Request::new(Method::Delete, &path, "tester"));
    assert_eq!(response.status, 200);
    assert_eq!(response.body["data"]["unlinked"], true);

    // Unlinking an absent pair is NotFound
    let response = gateway.dispatch(&Request::new(Method::Delete, &path, "tester"));
    assert_eq!(response.status, 404);

    let response = gateway.dispatch(&Request::new(
        Method::Put,
        format!("/movie/{}/link/nonsense/{}", movie, tag),
        "tester",
    ));
    assert_eq!(response.status, 404);
}

#[test]
fn test_create_and_link() {
    let gateway = gateway();
    let movie = create(&gateway, "movie", serde_json::json!({"title": "Alien"}));

    let response = gateway.dispatch(
        &Request::new(
            Method::Post,
            format!("/movie/{}/link/movie_quotes", movie),
            "tester",
        )
        .with_body(serde_json::json!({"text": "Game over, man!"})),
    );
    assert_eq!(response.status, 201);
    assert_eq!(response.body["data"]["linked"], true);
    let quote_id = response.body["data"]["id"].as_str().unwrap().to_string();

    let quote = fetch_record(&gateway, "Quote", &quote_id);
    let (active, _) = join_rows(&gateway, "movie_quotes", &quote);
    assert_eq!(active.len(), 1);
    assert_eq!(
        active[0].get("one_movie_id").and_then(Value::as_str),
        Some(movie.as_str())
    );
}

#[test]
fn test_delete_runs_cascade_actions() {
    let gateway = gateway();
    let movie = create(&gateway, "movie", serde_json::json!({"title": "Alien"}));
    let poster = create(&gateway, "poster", serde_json::json!({"url": "alien.png"}));
    let quote = create(
        &gateway,
        "quote",
        serde_json::json!({"text": "scream", "movie_id": movie}),
    );

    // The one-to-one poster link restricts deletion
    let response = gateway.dispatch(&Request::new(
        Method::Put,
        format!("/movie/{}/link/movie_poster/{}", movie, poster),
        "tester",
    ));
    assert_eq!(response.status, 200);

    let response =
        gateway.dispatch(&Request::new(Method::Delete, format!("/movie/{}", movie), "tester"));
    assert_eq!(response.status, 409);
    assert_eq!(error_code(&response), "CONFLICT");

    // Nothing was touched: the movie and its quote rows are still active
    let movie_record = fetch_record(&gateway, "Movie", &movie);
    let (active, _) = join_rows(&gateway, "movie_quotes", &movie_record);
    assert_eq!(active.len(), 1);

    // After unlinking the poster, deletion proceeds; the quote relationship's
    // SoftDelete action clears its rows without touching the quote itself
    let response = gateway.dispatch(&Request::new(
        Method::Delete,
        format!("/movie/{}/link/movie_poster/{}", movie, poster),
        "tester",
    ));
    assert_eq!(response.status, 200);

    let response =
        gateway.dispatch(&Request::new(Method::Delete, format!("/movie/{}", movie), "tester"));
    assert_eq!(response.status, 200);

    let (active, deleted) = join_rows(&gateway, "movie_quotes", &movie_record);
    assert!(active.is_empty());
    assert_eq!(deleted.len(), 1);
    let response =
        gateway.dispatch(&Request::new(Method::Get, format!("/quote/{}", quote), "tester"));
    assert_eq!(response.status, 200);
}

#[test]
fn test_one_to_one_selection_replaces_partner() {
    let gateway = gateway();
    let movie = create(&gateway, "movie", serde_json::json!({"title": "Alien"}));
    let other = create(&gateway, "movie", serde_json::json!({"title": "Aliens"}));

    let poster = create(
        &gateway,
        "poster",
        serde_json::json!({"url": "alien.png", "movie_id": movie}),
    );
    let poster_record = fetch_record(&gateway, "Poster", &poster);
    let (active, _) = join_rows(&gateway, "movie_poster", &poster_record);
    assert_eq!(active.len(), 1);

    // Re-pointing the poster replaces the partner, keeping one active row
    let response = gateway.dispatch(
        &Request::new(Method::Put, format!("/poster/{}", poster), "tester")
            .with_body(serde_json::json!({"movie_id": other})),
    );
    assert_eq!(response.status, 200);
    let (active, deleted) = join_rows(&gateway, "movie_poster", &poster_record);
    assert_eq!(active.len(), 1);
    assert_eq!(
        active[0].get("movie_id").and_then(Value::as_str),
        Some(other.as_str())
    );
    assert_eq!(deleted.len(), 1);
}

#[test]
fn test_custom_route_overrides_generic() {
    let mut gateway = gateway();
    gateway.register(Method::Get, "/movie/count", |state, _, _| {
        let movie = state.metadata.entity("Movie")?;
        let result = state.store.list(movie, &relmap_core::ListQuery::default())?;
        Ok(relmap_gateway::Response::ok(serde_json::json!({
            "count": result.total
        })))
    });
    create(&gateway, "movie", serde_json::json!({"title": "Alien"}));

    // The literal route wins over the generic retrieve wildcard
    let response = gateway.dispatch(&Request::new(Method::Get, "/movie/count", "tester"));
    assert_eq!(response.status, 200);
    assert_eq!(response.body["data"]["count"], 1);
}
