//! Portfolio image ordering within a category.
//!
//! Indexes are plain overwrites; two admins re-ordering the same category at
//! once can interleave and the last write wins.

use std::collections::HashSet;

use serde_json::Value;
use uuid::Uuid;

use crate::crud;
use crate::db::models::{PortfolioImage, PortfolioImagePatch};
use crate::error::{CrudError, ValidationError};
use crate::gateway::{Gateway, GatewayError, Select, Table};

/// One past the highest `order_index` in `category`, or 0 for an empty one.
pub async fn next_order_index(gateway: &dyn Gateway, category: &str) -> Result<i64, GatewayError> {
    let query = Select::new()
        .columns(&["order_index"])
        .eq("category", category)
        .order_desc("order_index")
        .limit(1);
    let rows = gateway.select(Table::PortfolioImages, &query).await?;

    Ok(rows
        .first()
        .and_then(|row| row.get("order_index"))
        .and_then(Value::as_i64)
        .map_or(0, |max| max + 1))
}

pub async fn move_to(
    gateway: &dyn Gateway,
    id: Uuid,
    order_index: i32,
) -> Result<PortfolioImage, CrudError> {
    let patch = PortfolioImagePatch {
        order_index: Some(order_index),
        ..PortfolioImagePatch::default()
    };
    crud::update::<PortfolioImage>(gateway, id, &patch).await
}

/// Rewrites the indexes of `ids` to 0..n in the given order. `ids` must list
/// every image of `category` exactly once.
pub async fn reorder_category(
    gateway: &dyn Gateway,
    category: &str,
    ids: &[Uuid],
) -> Result<Vec<PortfolioImage>, CrudError> {
    if ids.is_empty() {
        return Err(ValidationError::required("ids", "Image order").into());
    }

    if ids.iter().collect::<HashSet<_>>().len() != ids.len() {
        return Err(ValidationError::new("ids", "Image order lists an image twice").into());
    }

    let query = Select::new().eq("category", category);
    let current: Vec<PortfolioImage> = crud::list(gateway, &query).await?;
    if let Some(stray) = ids.iter().find(|id| !current.iter().any(|img| img.id == **id)) {
        return Err(ValidationError::new(
            "ids",
            format!("Image {} is not in category {}", stray, category),
        )
        .into());
    }
    if ids.len() != current.len() {
        return Err(ValidationError::new(
            "ids",
            format!(
                "Image order must list all {} images in category {}",
                current.len(),
                category
            ),
        )
        .into());
    }

    let mut reordered = Vec::with_capacity(ids.len());
    for (index, id) in ids.iter().enumerate() {
        let index = i32::try_from(index)
            .map_err(|_| ValidationError::new("ids", "Too many images to reorder"))?;
        reordered.push(move_to(gateway, *id, index).await?);
    }

    tracing::info!(category, count = reordered.len(), "portfolio category reordered");
    Ok(reordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::NewPortfolioImage;
    use crate::gateway::MemoryGateway;

    async fn add(gw: &MemoryGateway, category: &str, order_index: i32) -> PortfolioImage {
        crud::create::<PortfolioImage>(
            gw,
            &NewPortfolioImage {
                url: format!("https://img.test/{category}-{order_index}.jpg"),
                category: category.into(),
                order_index: Some(order_index),
                ..NewPortfolioImage::default()
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_next_order_index() {
        let gw = MemoryGateway::new();
        assert_eq!(next_order_index(&gw, "Portraits").await.unwrap(), 0);
        add(&gw, "Portraits", 4).await;
        add(&gw, "Portraits", 2).await;
        add(&gw, "Events", 9).await;
        assert_eq!(next_order_index(&gw, "Portraits").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_reorder_category_rewrites_indexes() {
        let gw = MemoryGateway::new();
        let a = add(&gw, "Portraits", 0).await;
        let b = add(&gw, "Portraits", 1).await;
        let c = add(&gw, "Portraits", 2).await;

        reorder_category(&gw, "Portraits", &[c.id, a.id, b.id])
            .await
            .unwrap();

        let listed = crud::list_page::<PortfolioImage>(&gw).await.unwrap();
        let order: Vec<Uuid> = listed.iter().map(|img| img.id).collect();
        assert_eq!(order, vec![c.id, a.id, b.id]);
    }

    #[tokio::test]
    async fn test_reorder_rejects_foreign_image() {
        let gw = MemoryGateway::new();
        let a = add(&gw, "Portraits", 0).await;
        let e = add(&gw, "Events", 0).await;
        let err = reorder_category(&gw, "Portraits", &[a.id, e.id])
            .await
            .unwrap_err();
        assert!(matches!(err, CrudError::Validation(_)));

        let untouched: PortfolioImage = crud::find(&gw, a.id).await.unwrap();
        assert_eq!(untouched.order_index, 0);
    }

    #[tokio::test]
    async fn test_reorder_rejects_repeated_image() {
        let gw = MemoryGateway::new();
        let a = add(&gw, "Portraits", 0).await;
        add(&gw, "Portraits", 1).await;
        let c = add(&gw, "Portraits", 2).await;

        let err = reorder_category(&gw, "Portraits", &[c.id, c.id, a.id])
            .await
            .unwrap_err();
        assert!(matches!(err, CrudError::Validation(ref v) if v.field == "ids"));

        let listed = crud::list_page::<PortfolioImage>(&gw).await.unwrap();
        let indexes: Vec<i32> = listed.iter().map(|img| img.order_index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_reorder_requires_the_whole_category() {
        let gw = MemoryGateway::new();
        let a = add(&gw, "Portraits", 0).await;
        let b = add(&gw, "Portraits", 1).await;
        add(&gw, "Portraits", 2).await;

        let err = reorder_category(&gw, "Portraits", &[b.id, a.id])
            .await
            .unwrap_err();
        assert!(matches!(err, CrudError::Validation(_)));

        let untouched: PortfolioImage = crud::find(&gw, b.id).await.unwrap();
        assert_eq!(untouched.order_index, 1);
    }
}
