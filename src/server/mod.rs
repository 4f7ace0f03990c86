use async_graphql::http::GraphiQLSource;
use async_graphql::{EmptySubscription, Request, Response, Schema};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::Router;
use axum::extract::State;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

use crate::store::Db;

pub mod dataloader;
pub mod loaders;
mod schema;

use loaders::Loaders;
use schema::{Mutation, Query};

pub type FullSchema = Schema<Query, Mutation, EmptySubscription>;

#[derive(Clone)]
struct AppState {
    schema: FullSchema,
    db: Db,
}

/// `depth_limit` counts nesting below the root fields, so `{ users { id } }`
/// has depth 1. async-graphql counts the root fields too.
pub fn build_schema(db: Db, depth_limit: usize) -> FullSchema {
    Schema::build(Query, Mutation, EmptySubscription)
        .data(db)
        .limit_depth(depth_limit + 1)
        .finish()
}

/// Executes one request with its own, freshly built [`Loaders`].
///
/// The loaders live exactly as long as the execution: once the response is
/// produced they are dropped together with every cached row and pending key.
pub async fn execute(schema: &FullSchema, db: &Db, request: impl Into<Request>) -> Response {
    let loaders = Loaders::new(db);
    let request = request.into().data(loaders.clone());

    let span = tracing::info_span!("graphql", request = %Uuid::new_v4());
    async move {
        let response = loaders.wrap(schema.execute(request)).await;
        if response.is_err() {
            tracing::debug!(errors = response.errors.len(), "query finished with errors");
        }
        response
    }
    .instrument(span)
    .await
}

async fn graphiql() -> impl IntoResponse {
    Html(GraphiQLSource::build().finish())
}

#[axum::debug_handler]
async fn graphql_handler(State(state): State<AppState>, req: GraphQLRequest) -> GraphQLResponse {
    execute(&state.schema, &state.db, req.into_inner())
        .await
        .into()
}

pub fn make_app(db: Db, depth_limit: usize) -> Router {
    let schema = build_schema(db.clone(), depth_limit);

    Router::new()
        .route("/", get(graphiql).post(graphql_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { schema, db })
}
