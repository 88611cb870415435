use crate::{
    data::student::{Student, StudentQuery},
    error::{BadJsonSnafu, BadQuerySnafu, EscolaError, EscolaResult, MissingStudentSnafu},
    routes::pagination::PageRequest,
    serializer::{validate_create, validate_partial, validate_update},
    state::EscolaState,
};
use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{Method, StatusCode, Uri, header::ALLOW},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};
use snafu::{OptionExt, ResultExt};

pub const COLLECTION_METHODS: &str = "GET, POST, HEAD, OPTIONS";
pub const DETAIL_METHODS: &str = "GET, PUT, PATCH, DELETE, HEAD, OPTIONS";

type JsonBody = Result<Json<Value>, JsonRejection>;
type IdPath = Result<Path<String>, PathRejection>;
type ListQuery = Result<Query<ListParams>, QueryRejection>;

#[derive(Deserialize, Debug, Default)]
pub struct ListParams {
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
}

fn parse_id(raw: &str) -> EscolaResult<i64> {
    raw.parse::<i64>().ok().context(MissingStudentSnafu { id: raw })
}

async fn existing_student(state: &EscolaState, raw_id: &str) -> EscolaResult<Student> {
    let id = parse_id(raw_id)?;
    state
        .get(id)
        .await?
        .context(MissingStudentSnafu { id: raw_id })
}

/// Any id axum can't even decode (bad percent-encoding, invalid UTF-8) can't name a student either.
fn path_id(path: IdPath) -> EscolaResult<String> {
    path.map(|Path(id)| id).map_err(|rejection| {
        debug!(?rejection, "Undecodable student id");
        EscolaError::MissingStudent {
            id: String::from("<undecodable>"),
        }
    })
}

fn body_value(body: JsonBody) -> EscolaResult<Value> {
    body.map(|Json(value)| value).context(BadJsonSnafu)
}

pub async fn list_students(
    State(state): State<EscolaState>,
    uri: Uri,
    params: ListQuery,
) -> EscolaResult<Response> {
    let Query(params) = params.context(BadQuerySnafu)?;
    let page = PageRequest::from_params(
        params.page.as_deref(),
        params.page_size.as_deref(),
        state.config().default_page_size(),
    )?;

    let query = StudentQuery {
        search: params.search,
        ordering: params
            .ordering
            .as_deref()
            .map(StudentQuery::parse_ordering)
            .unwrap_or_default(),
        window: page.map(PageRequest::window),
    };
    let (count, students) = state.list(&query).await?;

    Ok(match page {
        Some(page) => Json(page.envelope(&uri, count, students)?).into_response(),
        None => Json(students).into_response(),
    })
}

pub async fn create_student(
    State(state): State<EscolaState>,
    body: JsonBody,
) -> EscolaResult<(StatusCode, Json<Student>)> {
    let body = body_value(body)?;
    let fields = validate_create(&body).map_err(|errors| EscolaError::Validation { errors })?;

    let student = state.insert(fields).await?;
    debug!(id = student.id, "Created student");
    Ok((StatusCode::CREATED, Json(student)))
}

pub async fn retrieve_student(
    State(state): State<EscolaState>,
    id: IdPath,
) -> EscolaResult<Json<Student>> {
    let id = path_id(id)?;
    existing_student(&state, &id).await.map(Json)
}

pub async fn update_student(
    State(state): State<EscolaState>,
    id: IdPath,
    body: JsonBody,
) -> EscolaResult<Json<Student>> {
    let id = path_id(id)?;
    let numeric_id = existing_student(&state, &id).await?.id;
    let body = body_value(body)?;
    let fields = validate_update(&body).map_err(|errors| EscolaError::Validation { errors })?;

    state
        .update(numeric_id, fields)
        .await?
        .context(MissingStudentSnafu { id })
        .map(Json)
}

pub async fn partial_update_student(
    State(state): State<EscolaState>,
    id: IdPath,
    body: JsonBody,
) -> EscolaResult<Json<Student>> {
    let id = path_id(id)?;
    let existing = existing_student(&state, &id).await?;
    let body = body_value(body)?;
    let fields =
        validate_partial(&body, &existing).map_err(|errors| EscolaError::Validation { errors })?;

    state
        .update(existing.id, fields)
        .await?
        .context(MissingStudentSnafu { id })
        .map(Json)
}

pub async fn destroy_student(
    State(state): State<EscolaState>,
    id: IdPath,
) -> EscolaResult<StatusCode> {
    let id = path_id(id)?;
    let numeric_id = parse_id(&id)?;
    if state.remove(numeric_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        MissingStudentSnafu { id }.fail()
    }
}

fn options_response(name: &str, allowed: &'static str) -> Response {
    (
        [(ALLOW, allowed)],
        Json(json!({
            "name": name,
            "description": "",
            "renders": ["application/json"],
            "parses": ["application/json"],
        })),
    )
        .into_response()
}

pub async fn options_students() -> Response {
    options_response("Student List", COLLECTION_METHODS)
}

pub async fn options_student() -> Response {
    options_response("Student Instance", DETAIL_METHODS)
}

pub async fn students_method_not_allowed(method: Method) -> EscolaError {
    EscolaError::MethodNotAllowed {
        method,
        allowed: COLLECTION_METHODS,
    }
}

pub async fn student_method_not_allowed(method: Method) -> EscolaError {
    EscolaError::MethodNotAllowed {
        method,
        allowed: DETAIL_METHODS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::RuntimeConfiguration,
        data::memory::MemoryStudentStore,
        routes::escola_router,
    };
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{HeaderMap, Request, header::CONTENT_TYPE},
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(default_page_size: Option<u64>) -> Router {
        escola_router(EscolaState::with_store(
            Arc::new(MemoryStudentStore::new()),
            RuntimeConfiguration::in_memory(default_page_size),
        ))
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, HeaderMap, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(body) => {
                request = request.header(CONTENT_TYPE, "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };

        let response = app
            .clone()
            .oneshot(request.body(body).expect("failed to build request"))
            .await
            .expect("request failed");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("failed to read response body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("response body was not json")
        };

        (status, headers, json)
    }

    fn student_body(first_name: &str, surname: &str, date_of_birth: &str) -> Value {
        json!({
            "first_name": first_name,
            "surname": surname,
            "email": format!("{}.{}@escola.test", first_name.to_lowercase(), surname.to_lowercase()),
            "date_of_birth": date_of_birth,
        })
    }

    async fn create(app: &Router, first_name: &str, surname: &str, date_of_birth: &str) -> Value {
        let (status, _, body) = send(
            app,
            Method::POST,
            "/students/",
            Some(student_body(first_name, surname, date_of_birth)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }

    fn first_names(list: &Value) -> Vec<&str> {
        list.as_array()
            .expect("expected a list")
            .iter()
            .map(|student| student["first_name"].as_str().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn full_lifecycle() {
        let app = app(None);

        let (status, _, list) = send(&app, Method::GET, "/students/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list, json!([]));

        let created = create(&app, "Ana", "Silva", "2010-04-01").await;
        assert_eq!(
            created,
            json!({
                "id": 1,
                "first_name": "Ana",
                "preferred_name": null,
                "surname": "Silva",
                "email": "ana.silva@escola.test",
                "date_of_birth": "2010-04-01",
            })
        );

        let (status, _, fetched) = send(&app, Method::GET, "/students/1/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched, created);

        let (status, _, updated) = send(
            &app,
            Method::PUT,
            "/students/1",
            Some(json!({
                "first_name": "Ana Paula",
                "preferred_name": "Paulinha",
                "surname": "Silva",
                "email": "ana.paula@escola.test",
                "date_of_birth": "2010-04-02",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["preferred_name"], "Paulinha");
        assert_eq!(updated["date_of_birth"], "2010-04-02");

        let (status, _, patched) = send(
            &app,
            Method::PATCH,
            "/students/1/",
            Some(json!({"surname": "Souza"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(patched["surname"], "Souza");
        assert_eq!(patched["first_name"], "Ana Paula");
        assert_eq!(patched["email"], "ana.paula@escola.test");

        let (status, _, body) = send(&app, Method::DELETE, "/students/1/", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);

        let (status, _, body) = send(&app, Method::GET, "/students/1/", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"detail": "Not found."}));
    }

    #[tokio::test]
    async fn undecodable_ids_are_not_found() {
        let app = app(None);

        for method in [Method::GET, Method::PUT, Method::PATCH, Method::DELETE] {
            let body = (method == Method::PUT || method == Method::PATCH)
                .then(|| student_body("Ana", "Silva", "2010-04-01"));
            let (status, _, body) = send(&app, method.clone(), "/students/%FF/", body).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{method}");
            assert_eq!(body, json!({"detail": "Not found."}));
        }
    }

    #[tokio::test]
    async fn repeated_query_params_are_json_errors() {
        let app = app(Some(2));

        let (status, _, body) = send(&app, Method::GET, "/students/?page=1&page=2", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let detail = body["detail"].as_str().expect("detail should be a string");
        assert!(detail.contains("page"), "{detail}");
    }

    #[tokio::test]
    async fn unknown_and_malformed_ids_are_not_found() {
        let app = app(None);
        create(&app, "Ana", "Silva", "2010-04-01").await;

        for (method, uri) in [
            (Method::GET, "/students/2/"),
            (Method::GET, "/students/abc/"),
            (Method::DELETE, "/students/2/"),
            (Method::DELETE, "/students/-x/"),
        ] {
            let (status, _, body) = send(&app, method, uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(body, json!({"detail": "Not found."}));
        }

        let (status, _, _) = send(
            &app,
            Method::PUT,
            "/students/9/",
            Some(student_body("Bia", "Lima", "2011-01-01")),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, _) = send(
            &app,
            Method::PATCH,
            "/students/9/",
            Some(json!({"surname": "Lima"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn validation_errors_are_reported_per_field() {
        let app = app(None);

        let (status, _, body) = send(
            &app,
            Method::POST,
            "/students/",
            Some(json!({"first_name": "", "email": "nope", "date_of_birth": "2010-13-01"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({
                "date_of_birth": ["Date has wrong format. Use one of these formats instead: YYYY-MM-DD."],
                "email": ["Enter a valid email address."],
                "first_name": ["This field may not be blank."],
                "surname": ["This field is required."],
            })
        );

        create(&app, "Ana", "Silva", "2010-04-01").await;
        let (status, _, body) = send(
            &app,
            Method::PUT,
            "/students/1/",
            Some(json!({"first_name": "Ana"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["surname"], json!(["This field is required."]));
    }

    #[tokio::test]
    async fn duplicate_emails_are_rejected() {
        let app = app(None);
        create(&app, "Ana", "Silva", "2010-04-01").await;
        create(&app, "Bia", "Lima", "2011-02-03").await;

        let expected = json!({"email": ["student with this email already exists."]});

        let (status, _, body) = send(
            &app,
            Method::POST,
            "/students/",
            Some(student_body("Ana", "Silva", "2012-01-01")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, expected);

        let (status, _, body) = send(
            &app,
            Method::PATCH,
            "/students/2/",
            Some(json!({"email": "ana.silva@escola.test"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, expected);

        let (status, _, _) = send(
            &app,
            Method::PUT,
            "/students/1/",
            Some(student_body("Ana", "Silva", "2010-04-05")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_json_is_a_client_error() {
        let app = app(None);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/students/")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from("{\"first_name\": "))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/students/")
                    .body(Body::from("first_name=Ana"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let (status, _, body) =
            send(&app, Method::POST, "/students/", Some(json!("Ana"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({"non_field_errors": ["Invalid data. Expected a dictionary, but got str."]})
        );
    }

    #[tokio::test]
    async fn wrong_methods_list_what_is_allowed() {
        let app = app(None);

        let (status, headers, body) = send(&app, Method::DELETE, "/students/", None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(headers[ALLOW], COLLECTION_METHODS);
        assert_eq!(body, json!({"detail": "Method \"DELETE\" not allowed."}));

        let (status, headers, _) = send(&app, Method::POST, "/students/1/", None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(headers[ALLOW], DETAIL_METHODS);

        let (status, headers, body) = send(&app, Method::OPTIONS, "/students/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[ALLOW], COLLECTION_METHODS);
        assert_eq!(body["name"], "Student List");
    }

    #[tokio::test]
    async fn list_searches_and_orders() {
        let app = app(None);
        create(&app, "Carla", "Souza", "2009-01-01").await;
        create(&app, "Ana", "Silva", "2011-01-01").await;
        create(&app, "Bruno", "Souza", "2010-01-01").await;

        let (_, _, list) = send(&app, Method::GET, "/students/", None).await;
        assert_eq!(first_names(&list), ["Carla", "Ana", "Bruno"]);

        let (_, _, list) = send(&app, Method::GET, "/students/?ordering=first_name", None).await;
        assert_eq!(first_names(&list), ["Ana", "Bruno", "Carla"]);

        let (_, _, list) =
            send(&app, Method::GET, "/students/?ordering=-date_of_birth", None).await;
        assert_eq!(first_names(&list), ["Ana", "Bruno", "Carla"]);

        let (_, _, list) = send(
            &app,
            Method::GET,
            "/students/?search=SOUZA&ordering=-first_name,bogus",
            None,
        )
        .await;
        assert_eq!(first_names(&list), ["Carla", "Bruno"]);
    }

    #[tokio::test]
    async fn list_paginates_when_configured() {
        let app = app(Some(2));
        for (name, dob) in [
            ("Ana", "2010-01-01"),
            ("Bia", "2010-01-02"),
            ("Caio", "2010-01-03"),
        ] {
            create(&app, name, "Rocha", dob).await;
        }

        let (status, _, first) = send(&app, Method::GET, "/students/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["count"], 3);
        assert_eq!(first["next"], "/students/?page=2");
        assert_eq!(first["previous"], Value::Null);
        assert_eq!(first_names(&first["results"]), ["Ana", "Bia"]);

        let (_, _, second) = send(&app, Method::GET, "/students/?page=2", None).await;
        assert_eq!(second["next"], Value::Null);
        assert_eq!(second["previous"], "/students/");
        assert_eq!(first_names(&second["results"]), ["Caio"]);

        let (_, _, sized) = send(&app, Method::GET, "/students/?page_size=3", None).await;
        assert_eq!(first_names(&sized["results"]), ["Ana", "Bia", "Caio"]);

        let (status, _, body) = send(&app, Method::GET, "/students/?page=3", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"detail": "Invalid page."}));
    }

    #[tokio::test]
    async fn page_size_param_turns_pagination_on() {
        let app = app(None);
        create(&app, "Ana", "Silva", "2010-04-01").await;

        let (_, _, list) = send(&app, Method::GET, "/students?page_size=1", None).await;
        assert_eq!(list["count"], 1);
        assert_eq!(first_names(&list["results"]), ["Ana"]);
    }
}
