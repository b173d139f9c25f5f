/**
 * Admin Routes
 * Generic list/create/update/delete handlers, one instantiation per record
 */
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use crate::crud::{self, Deletable, Insertable, Patchable, Record};
use crate::routes::{crud_error_response, require_admin};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub count: usize,
}

impl<T> ListResponse<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            count: items.len(),
            items,
        }
    }
}

/// GET /api/admin/{collection}
pub async fn list<R: Record>(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(e) = require_admin(&state, &headers) {
        return e.into_response();
    }
    match crud::list_page::<R>(state.gateway.as_ref()).await {
        Ok(items) => Json(ListResponse::new(items)).into_response(),
        Err(e) => crud_error_response(e, R::TABLE.label()),
    }
}

/// POST /api/admin/{collection}
pub async fn create<R>(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(new): Json<R::New>,
) -> Response
where
    R: Insertable,
    R::New: DeserializeOwned,
{
    if let Err(e) = require_admin(&state, &headers) {
        return e.into_response();
    }
    match crud::create::<R>(state.gateway.as_ref(), &new).await {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(e) => crud_error_response(e, R::TABLE.label()),
    }
}

/// PATCH /api/admin/{collection}/{id}
pub async fn update<R>(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(patch): Json<R::Patch>,
) -> Response
where
    R: Patchable,
    R::Patch: DeserializeOwned,
{
    if let Err(e) = require_admin(&state, &headers) {
        return e.into_response();
    }
    match crud::update::<R>(state.gateway.as_ref(), id, &patch).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => crud_error_response(e, R::TABLE.label()),
    }
}

/// DELETE /api/admin/{collection}/{id}
pub async fn delete<R: Deletable>(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Response {
    if let Err(e) = require_admin(&state, &headers) {
        return e.into_response();
    }
    match crud::delete::<R>(state.gateway.as_ref(), id).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => crud_error_response(e, R::TABLE.label()),
    }
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::{admin_token, app, json, send, test_state};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_requires_admin_token() {
        let (state, _) = test_state();
        let (status, body) = send(
            app(state.clone()),
            Method::GET,
            "/api/admin/projects",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json(&body)["error"], "Authorization required");

        let (status, _) = send(
            app(state),
            Method::GET,
            "/api/admin/projects",
            Some("nope"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_create_then_list_shows_record_once() {
        let (state, _) = test_state();
        let token = admin_token(&state).await;

        let (status, body) = send(
            app(state.clone()),
            Method::POST,
            "/api/admin/projects",
            Some(&token),
            Some(json!({ "title": "Harbor wedding", "client_name": "Ana", "budget": 2400.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let created = json(&body);
        assert_eq!(created["status"], "Planning");

        let (status, body) = send(
            app(state),
            Method::GET,
            "/api/admin/projects",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body = json(&body);
        assert_eq!(body["count"], 1);
        assert_eq!(body["items"][0]["id"], created["id"]);
    }

    #[tokio::test]
    async fn test_validation_fails_before_write() {
        let (state, gw) = test_state();
        let token = admin_token(&state).await;

        let (status, body) = send(
            app(state),
            Method::POST,
            "/api/admin/posts",
            Some(&token),
            Some(json!({ "title": "Spring", "slug": "Not A Slug" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json(&body)["message"], "slug");

        use crate::gateway::{Gateway, Select, Table};
        assert!(gw.select(Table::BlogPosts, &Select::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_slug_is_conflict() {
        let (state, _) = test_state();
        let token = admin_token(&state).await;
        let post = json!({ "title": "Spring", "slug": "spring-sessions" });

        let (status, _) = send(
            app(state.clone()),
            Method::POST,
            "/api/admin/posts",
            Some(&token),
            Some(post.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = send(
            app(state),
            Method::POST,
            "/api/admin/posts",
            Some(&token),
            Some(post),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_update_and_delete_by_id() {
        let (state, _) = test_state();
        let token = admin_token(&state).await;

        let mut ids = Vec::new();
        for url in ["a.jpg", "b.jpg", "c.jpg"] {
            let (_, body) = send(
                app(state.clone()),
                Method::POST,
                "/api/admin/images",
                Some(&token),
                Some(json!({ "url": url, "category": "Portraits" })),
            )
            .await;
            ids.push(json(&body)["id"].as_str().unwrap().to_string());
        }

        let (status, body) = send(
            app(state.clone()),
            Method::PATCH,
            &format!("/api/admin/images/{}", ids[1]),
            Some(&token),
            Some(json!({ "caption": "Golden hour" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["caption"], "Golden hour");

        let (status, _) = send(
            app(state.clone()),
            Method::DELETE,
            &format!("/api/admin/images/{}", ids[0]),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(
            app(state.clone()),
            Method::GET,
            "/api/admin/images",
            Some(&token),
            None,
        )
        .await;
        let body = json(&body);
        let remaining: Vec<&str> = body["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["id"].as_str().unwrap())
            .collect();
        assert_eq!(remaining, vec![ids[1].as_str(), ids[2].as_str()]);

        let (status, _) = send(
            app(state),
            Method::DELETE,
            &format!("/api/admin/images/{}", ids[0]),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
