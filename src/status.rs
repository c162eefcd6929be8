// Distributor ring status page

use async_trait::async_trait;
use axum::{
    extract::Request,
    response::{Html, IntoResponse, Response},
};
use logpush_config::{RateLimitStrategy, RingConfig};

/// Served when the ingestion rate strategy is local.
pub const NO_RING_PAGE: &str = r#"
			<!DOCTYPE html>
			<html>
				<head>
					<meta charset="UTF-8">
					<title>Distributor Ring Status</title>
				</head>
				<body>
					<h1>Distributor Ring Status</h1>
					<p>Not running with Global Rating Limit - ring not being used by the Distributor.</p>
				</body>
			</html>"#;

/// Renders ring membership. Gets the request untouched.
#[async_trait]
pub trait RingStatusPage: Send + Sync {
    async fn render(&self, request: Request) -> Response;
}

/// Ring view built from the configured members
#[derive(Debug, Clone)]
pub struct StaticRingStatus {
    instance_id: String,
    members: Vec<String>,
}

impl StaticRingStatus {
    pub fn new(instance_id: impl Into<String>, members: Vec<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            members,
        }
    }

    pub fn from_config(config: &RingConfig) -> Self {
        Self::new(config.instance_id.clone(), config.members.clone())
    }

    fn page(&self) -> String {
        let mut rows = String::new();
        let mut members: Vec<&str> = self.members.iter().map(String::as_str).collect();
        if !members.contains(&self.instance_id.as_str()) {
            members.insert(0, &self.instance_id);
        }
        for member in members {
            let state = if member == self.instance_id {
                "ACTIVE (this instance)"
            } else {
                "ACTIVE"
            };
            rows.push_str(&format!(
                "<tr><td>{}</td><td>{}</td></tr>",
                escape_html(member),
                state
            ));
        }

        format!(
            "<!DOCTYPE html>\n<html>\n<head><meta charset=\"UTF-8\"><title>Distributor Ring Status</title></head>\n<body>\n<h1>Distributor Ring Status</h1>\n<table>\n<thead><tr><th>Instance ID</th><th>State</th></tr></thead>\n<tbody>{}</tbody>\n</table>\n</body>\n</html>",
            rows
        )
    }
}

#[async_trait]
impl RingStatusPage for StaticRingStatus {
    async fn render(&self, _request: Request) -> Response {
        Html(self.page()).into_response()
    }
}

/// Delegate to the ring under the global strategy, else serve the static page.
pub async fn render_ring_status(
    strategy: RateLimitStrategy,
    ring: &dyn RingStatusPage,
    request: Request,
) -> Response {
    match strategy {
        RateLimitStrategy::Global => ring.render(request).await,
        RateLimitStrategy::Local => Html(NO_RING_PAGE).into_response(),
    }
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header::CONTENT_TYPE, StatusCode};

    struct FixedPage(&'static str);

    #[async_trait]
    impl RingStatusPage for FixedPage {
        async fn render(&self, request: Request) -> Response {
            let body = format!("{} {}", self.0, request.uri().path());
            (StatusCode::ACCEPTED, body).into_response()
        }
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn request() -> Request {
        axum::http::Request::builder()
            .uri("/distributor/ring")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_global_strategy_delegates() {
        let response =
            render_ring_status(RateLimitStrategy::Global, &FixedPage("ring"), request()).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(body_string(response).await, "ring /distributor/ring");
    }

    #[tokio::test]
    async fn test_local_strategy_serves_static_page() {
        let response =
            render_ring_status(RateLimitStrategy::Local, &FixedPage("ring"), request()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html"));
        assert_eq!(body_string(response).await, NO_RING_PAGE);
    }

    #[tokio::test]
    async fn test_static_ring_lists_members() {
        let ring = StaticRingStatus::new(
            "distributor-1",
            vec!["distributor-0".to_string(), "<odd>".to_string()],
        );
        let body = body_string(ring.render(request()).await).await;
        assert!(body.contains("<td>distributor-1</td><td>ACTIVE (this instance)</td>"));
        assert!(body.contains("<td>distributor-0</td><td>ACTIVE</td>"));
        assert!(body.contains("&lt;odd&gt;"));
    }
}
