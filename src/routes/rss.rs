use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};

use crate::config::SiteConfig;
use crate::crud;
use crate::db::models::BlogPost;
use crate::gateway::Select;
use crate::state::AppState;

pub const FEED_LIMIT: usize = 50;

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn rfc822(dt: &DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S +0000").to_string()
}

pub fn render_feed(site: &SiteConfig, posts: &[BlogPost]) -> String {
    let base_url = site.url.trim_end_matches('/');

    let mut items = String::new();
    for post in posts {
        let post_url = format!("{}/blog/{}", base_url, post.slug);
        let desc = post.excerpt.as_deref().unwrap_or("");
        items.push_str(&format!(
            "    <item>\n\
                   <title>{}</title>\n\
                   <link>{}</link>\n\
                   <description>{}</description>\n\
                   <pubDate>{}</pubDate>\n\
                   <guid isPermaLink=\"true\">{}</guid>\n\
                 </item>\n",
            escape_xml(&post.title),
            escape_xml(&post_url),
            escape_xml(desc),
            rfc822(&post.display_date()),
            escape_xml(&post_url),
        ));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>{}</title>
    <link>{}</link>
    <description>{}</description>
    <language>en-us</language>
    <atom:link href="{}" rel="self" type="application/rss+xml"/>
    <lastBuildDate>{}</lastBuildDate>
{}  </channel>
</rss>"#,
        escape_xml(&site.title),
        escape_xml(&format!("{base_url}/blog")),
        escape_xml(&site.description),
        escape_xml(&format!("{base_url}/rss.xml")),
        posts
            .iter()
            .map(BlogPost::display_date)
            .max()
            .map(|dt| rfc822(&dt))
            .unwrap_or_default(),
        items,
    )
}

/// GET /rss.xml
pub async fn rss_feed(State(state): State<AppState>) -> Response {
    let select = Select::new().order_desc("created_at").limit(FEED_LIMIT);
    let posts = match crud::list::<BlogPost>(state.gateway.as_ref(), &select).await {
        Ok(posts) => posts,
        Err(e) => {
            tracing::error!(error = %e, "rss: could not load posts");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::CONTENT_TYPE, "text/plain")],
                "Service unavailable",
            )
                .into_response();
        }
    };

    (
        [
            (header::CONTENT_TYPE, "application/rss+xml; charset=utf-8"),
            (header::CACHE_CONTROL, "public, max-age=3600, stale-while-revalidate=600"),
        ],
        render_feed(&state.config.site, &posts),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn site() -> SiteConfig {
        SiteConfig {
            url: "https://studio.test/".into(),
            title: "Studio & Co".into(),
            description: "Sessions".into(),
        }
    }

    fn post(slug: &str, created: DateTime<Utc>) -> BlogPost {
        BlogPost {
            id: Uuid::new_v4(),
            title: format!("<{slug}>"),
            slug: slug.into(),
            excerpt: Some("A \"quiet\" morning".into()),
            content: String::new(),
            author: None,
            tags: vec![],
            category: None,
            publish_date: None,
            created_at: created,
        }
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a & b"), "a &amp; b");
        assert_eq!(escape_xml("<title>"), "&lt;title&gt;");
        assert_eq!(escape_xml("\"quote\""), "&quot;quote&quot;");
    }

    #[test]
    fn test_rfc822_format() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        assert_eq!(rfc822(&dt), "Mon, 15 Jan 2024 12:00:00 +0000");
    }

    #[test]
    fn test_feed_items_and_escaping() {
        let older = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let xml = render_feed(&site(), &[post("spring-light", newer), post("winter-coats", older)]);

        assert!(xml.contains("<title>Studio &amp; Co</title>"));
        assert!(xml.contains("<link>https://studio.test/blog/spring-light</link>"));
        assert!(xml.contains("<title>&lt;spring-light&gt;</title>"));
        assert!(xml.contains("A &quot;quiet&quot; morning"));
        assert!(xml.contains("<lastBuildDate>Fri, 01 Mar 2024 09:30:00 +0000</lastBuildDate>"));
        assert_eq!(xml.matches("<item>").count(), 2);
    }
}
