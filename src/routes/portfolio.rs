/**
 * Portfolio Routes
 * Public image listing and the admin bulk re-order
 */
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cdn::{self, Preset};
use crate::config::FeatureFlags;
use crate::crud::{self, Record};
use crate::db::models::PortfolioImage;
use crate::gate::{self, ALL_CATEGORIES};
use crate::portfolio;
use crate::routes::admin::ListResponse;
use crate::routes::{crud_error_response, require_admin};
use crate::state::AppState;

pub const PUBLIC_PORTFOLIO_LIMIT: usize = 24;
const SRCSET_WIDTHS: [u32; 3] = [400, 800, 1200];

/// An image as the public site renders it.
#[derive(Debug, Serialize)]
pub struct PublicImage {
    #[serde(flatten)]
    pub image: PortfolioImage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub srcset: Option<String>,
}

/// Applies the CDN presets when image optimization is on.
pub fn present(images: Vec<PortfolioImage>, features: &FeatureFlags) -> Vec<PublicImage> {
    images
        .into_iter()
        .map(|mut image| {
            if !features.image_optimization {
                return PublicImage {
                    image,
                    thumbnail_url: None,
                    srcset: None,
                };
            }
            let thumbnail_url = cdn::is_cdn_url(&image.url)
                .then(|| cdn::preset_url(&image.url, Preset::Thumbnail));
            let srcset = cdn::srcset(&image.url, &SRCSET_WIDTHS);
            image.url = cdn::preset_url(&image.url, Preset::Gallery);
            PublicImage {
                image,
                thumbnail_url,
                srcset,
            }
        })
        .collect()
}

#[derive(Debug, Deserialize)]
pub struct PortfolioQuery {
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PortfolioResponse {
    pub categories: Vec<String>,
    pub images: Vec<PublicImage>,
}

/// GET /api/portfolio?category=...
pub async fn list_public(
    State(state): State<AppState>,
    Query(query): Query<PortfolioQuery>,
) -> Response {
    let mut select = PortfolioImage::list_query().limit(PUBLIC_PORTFOLIO_LIMIT);
    if let Some(category) = query
        .category
        .as_deref()
        .filter(|c| !c.is_empty() && *c != ALL_CATEGORIES)
    {
        select = select.eq("category", category);
    }

    match crud::list::<PortfolioImage>(state.gateway.as_ref(), &select).await {
        Ok(images) => Json(PortfolioResponse {
            categories: gate::categories(&images),
            images: present(images, &state.config.features),
        })
        .into_response(),
        Err(e) => crud_error_response(e, "portfolio"),
    }
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub category: String,
    pub ids: Vec<Uuid>,
}

/// POST /api/admin/images/reorder
pub async fn reorder(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ReorderRequest>,
) -> Response {
    if let Err(e) = require_admin(&state, &headers) {
        return e.into_response();
    }
    let reordered =
        portfolio::reorder_category(state.gateway.as_ref(), &payload.category, &payload.ids).await;
    match reordered {
        Ok(images) => Json(ListResponse::new(images)).into_response(),
        Err(e) => crud_error_response(e, "portfolio images"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crud;
    use crate::db::models::NewPortfolioImage;
    use crate::routes::test_support::{admin_token, app, json, send, test_state};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    const CDN_URL: &str = "https://res.cloudinary.com/studio/image/upload/v1/portraits/a.jpg";

    async fn add(
        gw: &crate::gateway::MemoryGateway,
        url: &str,
        category: &str,
        order_index: i32,
    ) -> PortfolioImage {
        crud::create::<PortfolioImage>(
            gw,
            &NewPortfolioImage {
                url: url.into(),
                category: category.into(),
                order_index: Some(order_index),
                ..NewPortfolioImage::default()
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_public_list_orders_by_index_and_filters() {
        let (state, gw) = test_state();
        add(&gw, "https://img.test/p2.jpg", "Portraits", 2).await;
        add(&gw, "https://img.test/p0.jpg", "Portraits", 0).await;
        add(&gw, "https://img.test/p1.jpg", "Portraits", 1).await;
        add(&gw, "https://img.test/e5.jpg", "Events", 5).await;

        let (status, body) = send(
            app(state.clone()),
            Method::GET,
            "/api/portfolio",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body = json(&body);
        let indexes: Vec<(String, i64)> = body["images"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| {
                (
                    i["category"].as_str().unwrap().to_string(),
                    i["order_index"].as_i64().unwrap(),
                )
            })
            .collect();
        assert_eq!(&indexes[..3], &[
            ("Portraits".to_string(), 0),
            ("Portraits".to_string(), 1),
            ("Portraits".to_string(), 2),
        ]);
        assert_eq!(indexes[3], ("Events".to_string(), 5));

        let (_, body) = send(
            app(state),
            Method::GET,
            "/api/portfolio?category=Events",
            None,
            None,
        )
        .await;
        let body = json(&body);
        assert_eq!(body["images"].as_array().unwrap().len(), 1);
        assert_eq!(body["categories"], json!(["All", "Events"]));
    }

    #[tokio::test]
    async fn test_cdn_presets_follow_feature_flag() {
        let (state, gw) = test_state();
        add(&gw, CDN_URL, "Portraits", 0).await;

        let (_, body) = send(app(state.clone()), Method::GET, "/api/portfolio", None, None).await;
        let image = &json(&body)["images"][0];
        assert!(image["url"].as_str().unwrap().contains("/upload/f_auto,q_auto,w_1200,c_limit/"));
        assert!(image["thumbnail_url"].as_str().unwrap().contains("w_400,c_fill"));
        assert!(image["srcset"].as_str().unwrap().ends_with("1200w"));

        let id = image["id"].as_str().unwrap().parse().unwrap();
        let images = present(
            vec![crud::find::<PortfolioImage>(gw.as_ref(), id).await.unwrap()],
            &FeatureFlags {
                image_optimization: false,
                ..FeatureFlags::default()
            },
        );
        assert_eq!(images[0].image.url, CDN_URL);
        assert!(images[0].srcset.is_none());
    }

    #[tokio::test]
    async fn test_reorder_endpoint() {
        let (state, gw) = test_state();
        let a = add(&gw, "https://img.test/a.jpg", "Portraits", 0).await;
        let b = add(&gw, "https://img.test/b.jpg", "Portraits", 1).await;
        let token = admin_token(&state).await;

        let (status, body) = send(
            app(state.clone()),
            Method::POST,
            "/api/admin/images/reorder",
            Some(&token),
            Some(json!({ "category": "Portraits", "ids": [b.id, a.id] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["count"], 2);

        let b = crud::find::<PortfolioImage>(gw.as_ref(), b.id).await.unwrap();
        assert_eq!(b.order_index, 0);

        let (status, _) = send(
            app(state),
            Method::POST,
            "/api/admin/images/reorder",
            Some(&token),
            Some(json!({ "category": "Events", "ids": [a.id] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
