/**
 * Blog Routes
 * Public reading endpoints; writes go through the admin handlers
 */
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use pulldown_cmark::{html, Options, Parser};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crud::{self, Record};
use crate::db::models::{is_valid_slug, BlogPost};
use crate::gateway::Select;
use crate::routes::{crud_error_response, error_response};
use crate::state::AppState;

pub const PUBLIC_BLOG_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
pub struct BlogListQuery {
    pub category: Option<String>,
    pub tag: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BlogPostSummary {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub author: Option<String>,
    pub tags: Vec<String>,
    pub category: Option<String>,
    pub date: DateTime<Utc>,
}

impl From<BlogPost> for BlogPostSummary {
    fn from(post: BlogPost) -> Self {
        Self {
            date: post.display_date(),
            id: post.id,
            title: post.title,
            slug: post.slug,
            excerpt: post.excerpt,
            author: post.author,
            tags: post.tags,
            category: post.category,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BlogListResponse {
    pub items: Vec<BlogPostSummary>,
}

#[derive(Debug, Serialize)]
pub struct BlogPostResponse {
    #[serde(flatten)]
    pub post: BlogPost,
    pub content_html: String,
}

/// Markdown to HTML, then sanitized with ammonia
pub fn render_markdown(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_TASKLISTS;
    let mut rendered = String::new();
    html::push_html(&mut rendered, Parser::new_ext(markdown, options));
    ammonia::clean(&rendered)
}

/// GET /api/blog?category=&tag=
/// Newest first. Tags are matched after the fetch since they are a list.
pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<BlogListQuery>,
) -> Response {
    let mut select = Select::new()
        .order_desc("created_at")
        .limit(BlogPost::LIST_LIMIT);
    if let Some(category) = query.category.as_deref().filter(|c| !c.is_empty()) {
        select = select.eq("category", category);
    }
    if query.tag.is_none() {
        select = select.limit(PUBLIC_BLOG_LIMIT);
    }

    match crud::list::<BlogPost>(state.gateway.as_ref(), &select).await {
        Ok(posts) => {
            let items = posts
                .into_iter()
                .filter(|post| match query.tag.as_deref() {
                    Some(tag) => post.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)),
                    None => true,
                })
                .take(PUBLIC_BLOG_LIMIT)
                .map(BlogPostSummary::from)
                .collect();
            Json(BlogListResponse { items }).into_response()
        }
        Err(e) => crud_error_response(e, "blog posts"),
    }
}

/// GET /api/blog/{slug}
pub async fn get_post(State(state): State<AppState>, Path(slug): Path<String>) -> Response {
    if !is_valid_slug(&slug) {
        return error_response(StatusCode::NOT_FOUND, "Post not found").into_response();
    }

    let select = Select::new().eq("slug", slug.as_str()).limit(1);
    match crud::list::<BlogPost>(state.gateway.as_ref(), &select).await {
        Ok(posts) => match posts.into_iter().next() {
            Some(post) => {
                let content_html = render_markdown(&post.content);
                Json(BlogPostResponse { post, content_html }).into_response()
            }
            None => error_response(StatusCode::NOT_FOUND, "Post not found").into_response(),
        },
        Err(e) => crud_error_response(e, "blog post"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::NewBlogPost;
    use crate::gateway::MemoryGateway;
    use crate::routes::test_support::{app, json, send, test_state};
    use axum::http::Method;

    async fn post(gw: &MemoryGateway, slug: &str, category: &str, tags: &[&str]) {
        crud::create::<BlogPost>(
            gw,
            &NewBlogPost {
                title: slug.replace('-', " "),
                slug: slug.into(),
                content: "# Hello\n\nSome **bold** words.\n\n<script>alert(1)</script>\n".into(),
                category: Some(category.into()),
                tags: tags.iter().map(|t| t.to_string()).collect(),
                ..NewBlogPost::default()
            },
        )
        .await
        .unwrap();
    }

    #[test]
    fn test_render_markdown_strips_scripts() {
        let html = render_markdown("# Title\n\n*hi*\n\n<script>alert(1)</script>\n");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<em>hi</em>"));
        assert!(!html.contains("<script>"));
    }

    #[tokio::test]
    async fn test_list_is_limited_and_filterable() {
        let (state, gw) = test_state();
        for i in 0..12 {
            post(&gw, &format!("post-{i}"), "Weddings", &[]).await;
        }
        post(&gw, "lake-portraits", "Portraits", &["Outdoor"]).await;

        let (status, body) = send(app(state.clone()), Method::GET, "/api/blog", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["items"].as_array().unwrap().len(), PUBLIC_BLOG_LIMIT);

        let (_, body) = send(
            app(state.clone()),
            Method::GET,
            "/api/blog?category=Portraits",
            None,
            None,
        )
        .await;
        assert_eq!(json(&body)["items"][0]["slug"], "lake-portraits");

        let (_, body) = send(app(state), Method::GET, "/api/blog?tag=outdoor", None, None).await;
        let body = json(&body);
        assert_eq!(body["items"].as_array().unwrap().len(), 1);
        assert_eq!(body["items"][0]["tags"][0], "Outdoor");
    }

    #[tokio::test]
    async fn test_post_detail_renders_html() {
        let (state, gw) = test_state();
        post(&gw, "first-look", "Weddings", &[]).await;

        let (status, body) = send(
            app(state.clone()),
            Method::GET,
            "/api/blog/first-look",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body = json(&body);
        assert_eq!(body["slug"], "first-look");
        let html = body["content_html"].as_str().unwrap();
        assert!(html.contains("<strong>bold</strong>"));
        assert!(!html.contains("<script"));

        let (status, _) = send(app(state), Method::GET, "/api/blog/missing-post", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
