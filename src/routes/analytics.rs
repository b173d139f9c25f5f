/**
 * Analytics Route
 * Dashboard counts computed from the stored records
 */
use std::collections::BTreeMap;

use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::crud;
use crate::db::models::{
    BlogPost, Lead, LeadStatus, PlanningSession, PortfolioImage, Project, ProjectStatus,
};
use crate::error::CrudError;
use crate::gateway::{Gateway, Select};
use crate::routes::{crud_error_response, require_admin};
use crate::state::AppState;

/// Upper bound on rows read per table for one summary.
const SCAN_LIMIT: usize = 5_000;
const RECENT_DAYS: i64 = 30;

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeadStats {
    pub total: usize,
    pub by_status: BTreeMap<&'static str, usize>,
    pub last_30_days: usize,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStats {
    pub total: usize,
    pub by_status: BTreeMap<&'static str, usize>,
    pub active: usize,
    pub active_budget: f64,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub leads: LeadStats,
    pub projects: ProjectStats,
    pub images_by_category: BTreeMap<String, usize>,
    pub blog_posts: usize,
    pub planning_sessions: usize,
    pub generated_at: DateTime<Utc>,
}

pub fn lead_stats(leads: &[Lead], now: DateTime<Utc>) -> LeadStats {
    let mut by_status: BTreeMap<&'static str, usize> =
        LeadStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect();
    for lead in leads {
        *by_status.entry(lead.status.as_str()).or_default() += 1;
    }
    let since = now - Duration::days(RECENT_DAYS);
    LeadStats {
        total: leads.len(),
        by_status,
        last_30_days: leads.iter().filter(|l| l.created_at >= since).count(),
    }
}

pub fn project_stats(projects: &[Project]) -> ProjectStats {
    let mut by_status: BTreeMap<&'static str, usize> =
        ProjectStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect();
    for project in projects {
        *by_status.entry(project.status.as_str()).or_default() += 1;
    }
    let active: Vec<&Project> = projects.iter().filter(|p| p.status.is_active()).collect();
    ProjectStats {
        total: projects.len(),
        by_status,
        active: active.len(),
        active_budget: active.iter().filter_map(|p| p.budget).sum(),
    }
}

pub async fn summarize(gateway: &dyn Gateway) -> Result<AnalyticsSummary, CrudError> {
    let all = Select::new().limit(SCAN_LIMIT);
    let leads: Vec<Lead> = crud::list(gateway, &all).await?;
    let projects: Vec<Project> = crud::list(gateway, &all).await?;
    let images: Vec<PortfolioImage> = crud::list(gateway, &all).await?;
    let posts: Vec<BlogPost> = crud::list(gateway, &all).await?;
    let sessions: Vec<PlanningSession> = crud::list(gateway, &all).await?;

    let mut images_by_category: BTreeMap<String, usize> = BTreeMap::new();
    for image in &images {
        *images_by_category.entry(image.category.clone()).or_default() += 1;
    }

    let now = Utc::now();
    Ok(AnalyticsSummary {
        leads: lead_stats(&leads, now),
        projects: project_stats(&projects),
        images_by_category,
        blog_posts: posts.len(),
        planning_sessions: sessions.len(),
        generated_at: now,
    })
}

/// GET /api/admin/analytics
pub async fn summary(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(e) = require_admin(&state, &headers) {
        return e.into_response();
    }
    match summarize(state.gateway.as_ref()).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => crud_error_response(e, "analytics"),
    }
}
