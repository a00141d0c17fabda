use std::collections::HashSet;
use std::marker::PhantomData;

use headers::authorization::{Bearer, Credentials};
use http::{header, HeaderMap, Request, Response, StatusCode};
use tower_http::validate_request::ValidateRequest;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Token from an `Authorization: Bearer` header.
pub fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(Bearer::decode)
        .map(|bearer| bearer.token().to_string())
}

/// Device credential from the bearer token, else the `X-API-Key` header.
pub fn api_key(headers: &HeaderMap) -> Option<String> {
    bearer(headers).or_else(|| {
        headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    })
}

/// Admin API guard. Any one of the configured tokens is accepted, no tokens
/// leaves the API open.
pub struct ManyValidate<ResBody> {
    tokens: HashSet<String>,
    _ty: PhantomData<ResBody>,
}

impl<ResBody> ManyValidate<ResBody> {
    pub fn new(tokens: Vec<String>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
            _ty: PhantomData,
        }
    }
}

impl<ResBody> Clone for ManyValidate<ResBody> {
    fn clone(&self) -> Self {
        Self {
            tokens: self.tokens.clone(),
            _ty: PhantomData,
        }
    }
}

impl<B, ResBody: Default> ValidateRequest<B> for ManyValidate<ResBody> {
    type ResponseBody = ResBody;

    fn validate(&mut self, request: &mut Request<B>) -> Result<(), Response<Self::ResponseBody>> {
        if self.tokens.is_empty() {
            return Ok(());
        }
        match bearer(request.headers()) {
            Some(token) if self.tokens.contains(&token) => Ok(()),
            _ => {
                let mut res = Response::new(ResBody::default());
                *res.status_mut() = StatusCode::UNAUTHORIZED;
                Err(res)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn request(token: Option<&str>) -> Request<()> {
        let mut builder = Request::builder().uri("/api/devices");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_open_without_tokens() {
        let mut v = ManyValidate::<String>::new(vec![]);
        assert!(v.validate(&mut request(None)).is_ok());
    }

    #[test]
    fn test_token_required() {
        let mut v = ManyValidate::<String>::new(vec!["a".to_string(), "b".to_string()]);
        assert!(v.validate(&mut request(Some("b"))).is_ok());
        let res = v.validate(&mut request(Some("c"))).unwrap_err();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert!(v.validate(&mut request(None)).is_err());
    }

    #[test]
    fn test_api_key_sources() {
        let mut headers = HeaderMap::new();
        assert_eq!(api_key(&headers), None);

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("k1"));
        assert_eq!(api_key(&headers).as_deref(), Some("k1"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer k2"));
        assert_eq!(api_key(&headers).as_deref(), Some("k2"));
    }
}
