#![allow(dead_code)]

use std::sync::Arc;

use enricher::enrich::{Enricher, HttpGraphQueryClient, QueryTemplate, TemplatePolicy};
use enricher::settings::{AuthScheme, EnrichmentSettings};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const GRAPHQL_PATH: &str = "/graphql/";
pub const TOKEN: &str = "0123456789abcdef";

pub const WIDGET_QUERY: &str = "query($id: String) { __root_element: item(id: $id) { __tag_name: name } }";

pub const DEVICE_QUERY: &str = r#"
  query ($url: String) {
    device_list(filters: {name: {exact: $url}}) {
      __tag_status: status
      site {
        __tag_site: name
        __tag_latitude: latitude
      }
    }
  }
"#;

pub fn settings_for(server: &MockServer, query: &str) -> EnrichmentSettings {
    let url = Url::parse(&format!("{}{}", server.uri(), GRAPHQL_PATH)).expect("valid mock server url");
    settings_with_url(url, query)
}

pub fn settings_with_url(url: Url, query: &str) -> EnrichmentSettings {
    EnrichmentSettings {
        query: query.to_string(),
        url,
        token: TOKEN.to_string(),
        auth_scheme: AuthScheme::Token,
        root_element: "__root_element".to_string(),
        max_parallel: 10,
        timeout: None,
        template_policy: TemplatePolicy::Cached,
    }
}

pub fn make_enricher(settings: &EnrichmentSettings) -> Enricher {
    let client = HttpGraphQueryClient::from_settings(settings).expect("failed to build graph query client");
    let template = QueryTemplate::parse(settings.query.as_str());
    Enricher::new("test_enricher", Arc::new(template), Arc::new(client))
}

/// Mounts a responder answering the widget query for `id` with a `name` of `widget-<id>`.
pub async fn mount_widget_for(server: &MockServer, id: &str) {
    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .and(body_partial_json(json!({ "variables": { "id": id } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "__root_element": { "__tag_name": format!("widget-{}", id) } }
        })))
        .mount(server)
        .await;
}
