use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, Uri},
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;

use crate::{config::ProxyConfig, error::ProxyError};

pub const BODY_ENCODING_HEADER: &str = "x-body-encoding";

// Only these request headers reach the bot.
const FORWARDED_HEADERS: [HeaderName; 2] = [header::CONTENT_TYPE, header::AUTHORIZATION];

#[derive(Clone)]
pub struct ProxyState {
    pub http: Client,
    pub cfg: Arc<ProxyConfig>,
}

impl ProxyState {
    pub fn new(cfg: ProxyConfig) -> Result<Self, ProxyError> {
        let http = Client::builder()
            .timeout(cfg.upstream_timeout)
            .build()
            .map_err(|e| ProxyError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            cfg: Arc::new(cfg),
        })
    }
}

/// Forward one request to the bot and relay its answer.
pub async fn relay(
    State(state): State<ProxyState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    if method == Method::OPTIONS {
        return Ok(().into_response());
    }

    let base = state.cfg.base_url.as_deref().ok_or(ProxyError::NotConfigured)?;
    let path = state.cfg.upstream_path(uri.path());
    let mut url = format!("{}{}", base.trim_end_matches('/'), path);
    if let Some(query) = uri.query() {
        url.push('?');
        url.push_str(query);
    }

    let mut upstream = state.http.request(method.clone(), &url);
    for name in FORWARDED_HEADERS {
        if let Some(value) = headers.get(&name) {
            upstream = upstream.header(name, value.clone());
        }
    }
    if let Some(body) = outbound_body(&method, &headers, body)? {
        upstream = upstream.body(body);
    }

    let resp = upstream.send().await.map_err(|e| {
        tracing::warn!(%method, path, error = %e, "upstream request failed");
        ProxyError::from(e)
    })?;

    let status = resp.status();
    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/json"));
    let bytes = resp.bytes().await?;

    tracing::info!(%method, path, status = status.as_u16(), bytes = bytes.len(), "relayed");
    Ok((status, [(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

fn outbound_body(method: &Method, headers: &HeaderMap, body: Bytes) -> Result<Option<Bytes>, ProxyError> {
    if *method == Method::GET || *method == Method::HEAD {
        return Ok(None);
    }
    let base64_encoded = headers
        .get(BODY_ENCODING_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("base64"));
    if base64_encoded {
        let decoded = STANDARD.decode(body.trim_ascii())?;
        return Ok(Some(Bytes::from(decoded)));
    }
    Ok(Some(body))
}

pub async fn with_cors(mut res: Response) -> Response {
    let h = res.headers_mut();
    h.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    h.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    h.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json_headers() -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        h
    }

    #[test]
    fn get_and_head_never_carry_a_body() {
        let body = Bytes::from_static(b"{\"x\":1}");
        assert_eq!(outbound_body(&Method::GET, &json_headers(), body.clone()).unwrap(), None);
        assert_eq!(outbound_body(&Method::HEAD, &json_headers(), body.clone()).unwrap(), None);
        assert_eq!(outbound_body(&Method::POST, &json_headers(), body.clone()).unwrap(), Some(body));
    }

    #[test]
    fn base64_bodies_are_decoded() {
        let mut h = json_headers();
        h.insert(BODY_ENCODING_HEADER, HeaderValue::from_static("base64"));
        let body = Bytes::from(STANDARD.encode("{\"ok\":true}"));
        assert_eq!(
            outbound_body(&Method::POST, &h, body).unwrap(),
            Some(Bytes::from_static(b"{\"ok\":true}"))
        );
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let mut h = json_headers();
        h.insert(BODY_ENCODING_HEADER, HeaderValue::from_static("base64"));
        let err = outbound_body(&Method::POST, &h, Bytes::from_static(b"%%%")).unwrap_err();
        assert!(matches!(err, ProxyError::InvalidBody(_)));
    }
}
