use crate::{
    error::EscolaError,
    routes::students::{
        create_student, destroy_student, list_students, options_student, options_students,
        partial_update_student, retrieve_student, student_method_not_allowed,
        students_method_not_allowed, update_student,
    },
    state::EscolaState,
};
use axum::{Json, Router, routing::get};
use serde_json::{Value, json};
use tower_http::{compression::CompressionLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

pub mod pagination;
pub mod students;

pub const BODY_LIMIT: usize = 1024 * 1024;

pub async fn get_api_root() -> Json<Value> {
    Json(json!({"students": "/students/"}))
}

pub async fn unknown_route() -> EscolaError {
    EscolaError::UnknownRoute
}

pub fn escola_router(state: EscolaState) -> Router {
    let collection = get(list_students)
        .post(create_student)
        .options(options_students)
        .fallback(students_method_not_allowed);
    let detail = get(retrieve_student)
        .put(update_student)
        .patch(partial_update_student)
        .delete(destroy_student)
        .options(options_student)
        .fallback(student_method_not_allowed);

    Router::new()
        .route("/", get(get_api_root))
        .route("/students", collection.clone())
        .route("/students/", collection)
        .route("/students/{id}", detail.clone())
        .route("/students/{id}/", detail)
        .fallback(unknown_route)
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
