/**
 * Gallery Routes
 * Contact details in exchange for the full image collection
 */
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::crud;
use crate::db::models::PortfolioImage;
use crate::gate::{self, UnlockForm};
use crate::routes::portfolio::{present, PublicImage};
use crate::routes::{crud_error_response, error_response, validation_response};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockResponse {
    pub unlocked: bool,
    /// False when the visitor's details could not be stored.
    pub lead_saved: bool,
    pub categories: Vec<String>,
    pub images: Vec<PublicImage>,
}

/// POST /api/gallery/unlock
pub async fn unlock(State(state): State<AppState>, Json(form): Json<UnlockForm>) -> Response {
    if !state.config.features.gated_gallery {
        return error_response(StatusCode::NOT_FOUND, "Gallery is not enabled").into_response();
    }

    let lead = match gate::record_visitor(state.gateway.as_ref(), &form).await {
        Ok(lead) => lead,
        Err(e) => return validation_response(&e).into_response(),
    };

    match crud::list_page::<PortfolioImage>(state.gateway.as_ref()).await {
        Ok(images) => Json(UnlockResponse {
            unlocked: true,
            lead_saved: lead.is_some(),
            categories: gate::categories(&images),
            images: present(images, &state.config.features),
        })
        .into_response(),
        Err(e) => crud_error_response(e, "gallery"),
    }
}

#[cfg(test)]
mod tests {
    use crate::gateway::{Gateway, Select, Table};
    use crate::routes::test_support::{app, json, send, test_state};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_email_is_rejected_without_a_lead() {
        let (state, gw) = test_state();
        let (status, body) = send(
            app(state),
            Method::POST,
            "/api/gallery/unlock",
            None,
            Some(json!({ "name": "Jane", "email": "" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json(&body)["error"], "Email is required");
        assert!(gw.select(Table::Leads, &Select::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unlock_saves_lead_and_returns_images() {
        let (state, gw) = test_state();
        gw.insert(
            Table::PortfolioImages,
            vec![json!({
                "url": "https://img.test/a.jpg",
                "category": "Weddings",
                "order_index": 0
            })
            .as_object()
            .cloned()
            .unwrap()],
        )
        .await
        .unwrap();

        let (status, body) = send(
            app(state),
            Method::POST,
            "/api/gallery/unlock",
            None,
            Some(json!({ "name": "Jane", "email": "jane@x.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body = json(&body);
        assert_eq!(body["unlocked"], true);
        assert_eq!(body["leadSaved"], true);
        assert_eq!(body["categories"], json!(["All", "Weddings"]));
        assert_eq!(body["images"].as_array().unwrap().len(), 1);

        let leads = gw.select(Table::Leads, &Select::new()).await.unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0]["status"], "New");
    }

    #[tokio::test]
    async fn test_unlock_survives_lead_failure() {
        let (state, gw) = test_state();
        gw.set_failing(Table::Leads, true).await;
        let (status, body) = send(
            app(state),
            Method::POST,
            "/api/gallery/unlock",
            None,
            Some(json!({ "name": "Jane", "email": "jane@x.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["leadSaved"], false);
    }
}
