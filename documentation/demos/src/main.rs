//! relmap walkthrough.
//!
//! Declares a small Movie/Quote/Tag metadata bundle, synthesizes the physical
//! schema from it, and drives the record gateway through the generic route
//! surface: CRUD, relationship selections, link/unlink, and cascade deletion.
//!
//! Run with: cargo run

use relmap_core::{
    synth, CascadeAction, EntityDef, FieldDef, Metadata, RelationshipDef, ScalarType, Store,
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
        .with_relationship(
            RelationshipDef::one_to_many("movie_quotes", "Movie", "Quote")
                .with_on_delete(CascadeAction::SoftDelete),
        )
        .with_relationship(RelationshipDef::many_to_many("movie_tags", "Movie", "Tag"))
}

fn show(step: &str, response: &Response) {
    println!("== {} -> {}", step, response.status);
    println!("{}\n", serde_json::to_string_pretty(&response.body).unwrap());
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open_in_memory()?;
    let metadata = metadata();

    // The synthesizer derives the join tables from the same descriptors the
    // engine will use for column naming
    let report = synth::sync(&store, &metadata)?;
    println!("schema sync applied {} statement(s)", report.statements.len());
    for statement in &report.statements {
        println!("  {}", statement);
    }
    println!();

    let gateway = Gateway::new(store, metadata, GatewayConfig::default())?;

    let response = gateway.dispatch(
        &Request::new(Method::Post, "/movie", "demo")
            .with_body(serde_json::json!({"title": "Alien", "year": 1979})),
    );
    show("POST /movie", &response);
    let movie_id = response.body["data"]["id"].as_str().unwrap_or_default().to_string();

    // A movie_id selection field in the body links the quote on creation
    let response = gateway.dispatch(
        &Request::new(Method::Post, "/quote", "demo").with_body(serde_json::json!({
            "text": "In space no one can hear you scream.",
            "movie_id": movie_id,
        })),
    );
    show("POST /quote (with movie_id selection)", &response);

    let response = gateway.dispatch(&Request::new(
        Method::Get,
        format!("/movie/{}/link/movie_quotes", movie_id),
        "demo",
    ));
    show("GET /movie/{id}/link/movie_quotes", &response);

    let response = gateway.dispatch(
        &Request::new(Method::Post, "/tag", "demo")
            .with_body(serde_json::json!({"label": "horror"})),
    );
    let tag_id = response.body["data"]["id"].as_str().unwrap_or_default().to_string();
    let response = gateway.dispatch(&Request::new(
        Method::Put,
        format!("/movie/{}/link/movie_tags/{}", movie_id, tag_id),
        "demo",
    ));
    show("PUT /movie/{id}/link/movie_tags/{tagId}", &response);

    let response = gateway.dispatch(
        &Request::new(Method::Get, "/movie", "demo")
            .with_query("search", "alien")
            .with_query("format", "grid"),
    );
    show("GET /movie?search=alien&format=grid", &response);

    // Deleting the movie soft-deletes its quote links and hard-deletes the
    // tag join rows, per each relationship's cascade action
    let response =
        gateway.dispatch(&Request::new(Method::Delete, format!("/movie/{}", movie_id), "demo"));
    show("DELETE /movie/{id}", &response);

    let response = gateway.dispatch(&Request::new(Method::Get, "/movie/deleted", "demo"));
    show("GET /movie/deleted", &response);

    let response = gateway.dispatch(&Request::new(
        Method::Put,
        format!("/movie/{}/restore", movie_id),
        "demo",
    ));
    show("PUT /movie/{id}/restore", &response);

    Ok(())
}
