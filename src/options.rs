//! Request options: deferred, fallible request mutations.
//!
//! Options are applied in order to a freshly built request; the first
//! failure aborts the call with that option's error wrapped.

use crate::error::BoxError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Body, Request};
use serde::Serialize;

/// A single deferred mutation of an outgoing request.
pub struct RequestOption {
    apply: Box<dyn FnOnce(&mut Request) -> Result<(), BoxError> + Send>,
}

impl RequestOption {
    pub fn new<F>(apply: F) -> Self
    where
        F: FnOnce(&mut Request) -> Result<(), BoxError> + Send + 'static,
    {
        Self { apply: Box::new(apply) }
    }

    pub(crate) fn apply(self, request: &mut Request) -> Result<(), BoxError> {
        (self.apply)(request)
    }
}

/// Set each `(name, value)` pair as a header.
pub fn with_headers<I>(headers: I) -> RequestOption
where
    I: IntoIterator<Item = (String, String)> + Send + 'static,
{
    RequestOption::new(move |request| {
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())?;
            let value = HeaderValue::from_str(&value)?;
            request.headers_mut().insert(name, value);
        }
        Ok(())
    })
}

/// Set an HTTP basic `Authorization` header.
pub fn with_basic_auth(
    username: impl Into<String>,
    password: impl Into<String>,
) -> RequestOption {
    let username = username.into();
    let password = password.into();
    RequestOption::new(move |request| {
        let encoded = BASE64.encode(format!("{}:{}", username, password));
        let mut value = HeaderValue::from_str(&format!("Basic {}", encoded))?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    })
}

/// Set a bearer-token `Authorization` header.
pub fn with_bearer_token(token: impl Into<String>) -> RequestOption {
    let token = token.into();
    RequestOption::new(move |request| {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token))?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    })
}

/// JSON-encode `value` as the request body and set the content type.
/// Serialization happens eagerly; a failure surfaces when the option is
/// applied.
pub fn body_json<T: Serialize + ?Sized>(value: &T) -> RequestOption {
    let payload = serde_json::to_vec(value);
    RequestOption::new(move |request| {
        let payload = payload?;
        request
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        *request.body_mut() = Some(Body::from(payload));
        Ok(())
    })
}

/// URL-encode `data` as an `application/x-www-form-urlencoded` body.
pub fn form_data<I>(data: I) -> RequestOption
where
    I: IntoIterator<Item = (String, String)> + Send + 'static,
{
    RequestOption::new(move |request| {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(data)
            .finish();
        request.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        *request.body_mut() = Some(Body::from(encoded));
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::{Method, Url};
    use serde::Serialize;

    fn request() -> Request {
        Request::new(Method::POST, Url::parse("http://service.test/resource").unwrap())
    }

    fn body_bytes(request: &Request) -> &[u8] {
        request.body().and_then(|body| body.as_bytes()).unwrap()
    }

    #[test]
    fn headers_are_set_in_order() {
        let mut req = request();
        with_headers(vec![
            ("x-first".to_string(), "1".to_string()),
            ("x-second".to_string(), "2".to_string()),
        ])
        .apply(&mut req)
        .unwrap();
        assert_eq!(req.headers().get("x-first").unwrap(), "1");
        assert_eq!(req.headers().get("x-second").unwrap(), "2");
    }

    #[test]
    fn invalid_header_name_is_the_options_error() {
        let mut req = request();
        let err = with_headers(vec![("bad name".to_string(), "v".to_string())])
            .apply(&mut req)
            .unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn basic_auth_encodes_credentials() {
        let mut req = request();
        with_basic_auth("user", "pass").apply(&mut req).unwrap();
        let value = req.headers().get(AUTHORIZATION).unwrap();
        assert_eq!(value.to_str().unwrap(), "Basic dXNlcjpwYXNz");
        assert!(value.is_sensitive());
    }

    #[test]
    fn bearer_token_sets_authorization() {
        let mut req = request();
        with_bearer_token("t0ken").apply(&mut req).unwrap();
        assert_eq!(
            req.headers().get(AUTHORIZATION).unwrap().to_str().unwrap(),
            "Bearer t0ken"
        );
    }

    #[test]
    fn json_body_sets_payload_and_content_type() {
        #[derive(Serialize)]
        struct Payload {
            k: &'static str,
        }

        let mut req = request();
        body_json(&Payload { k: "v" }).apply(&mut req).unwrap();
        assert_eq!(req.headers().get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(body_bytes(&req), br#"{"k":"v"}"#);
    }

    #[test]
    fn form_data_url_encodes_pairs() {
        let mut req = request();
        form_data(vec![("a".to_string(), "1 2".to_string())]).apply(&mut req).unwrap();
        assert_eq!(
            req.headers().get(CONTENT_TYPE).unwrap(),
            "application/x-www-form-urlencoded"
        );
        assert_eq!(body_bytes(&req), b"a=1+2");
    }
}
