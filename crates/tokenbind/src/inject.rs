//! Writes a formatted token into an outgoing request.
//!
//! The input request is borrowed and never modified; on failure the caller
//! still holds the original and forwards it as-is.

use tokenbind_common::{HttpRequest, InjectionLocation, TokenFormat};
use url::form_urlencoded;

use crate::error::InjectError;

/// Returns a copy of `request` carrying `format` rendered with `token` at
/// `location` under `key`.
///
/// - `Header`: every header named `key` (any case) is replaced by one header.
/// - `QueryParam`: a parameter is appended; existing ones are kept.
/// - `BodyJson`: a string member is appended to a bare JSON object body.
/// - `BodyForm`: a form-encoded field is appended to the body.
///
/// ```
/// use tokenbind::inject::inject;
/// use tokenbind_common::{HttpRequest, InjectionLocation, TokenFormat};
///
/// let request = HttpRequest::new("POST", "https://api.example.com/items").with_body(r#"{"a":1}"#);
/// let injected = inject(&request, "T", InjectionLocation::BodyJson, "tok", &TokenFormat::default())?;
///
/// assert_eq!(injected.body, r#"{"a":1,"tok":"Bearer T"}"#);
/// # Ok::<(), tokenbind::error::InjectError>(())
/// ```
///
/// # Errors
///
/// Returns an error if the URL cannot take a query parameter or the body is
/// not a bare JSON object for `BodyJson`.
pub fn inject(
    request: &HttpRequest,
    token: &str,
    location: InjectionLocation,
    key: &str,
    format: &TokenFormat,
) -> Result<HttpRequest, InjectError> {
    let formatted = format.render(token);

    match location {
        InjectionLocation::Header => Ok(request
            .clone()
            .with_removed_header(key)
            .with_added_header(key, formatted)),
        InjectionLocation::QueryParam => request
            .clone()
            .with_added_query_param(key, &formatted)
            .map_err(|e| InjectError::InvalidUrl {
                url: request.url.clone(),
                reason: e.to_string(),
            }),
        InjectionLocation::BodyJson => {
            let body = append_json_member(&request.body, key, &formatted)?;
            Ok(request.clone().with_body(body))
        }
        InjectionLocation::BodyForm => {
            let body = append_form_field(&request.body, key, &formatted);
            Ok(request.clone().with_body(body))
        }
    }
}

fn append_json_member(body: &str, key: &str, value: &str) -> Result<String, InjectError> {
    let trimmed = body.trim();
    let Some(inner) = trimmed
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
    else {
        return Err(InjectError::UnsupportedBody {
            location: InjectionLocation::BodyJson,
            reason: "body is not a JSON object",
        });
    };

    let inner = inner.trim_end();
    let mut out = String::with_capacity(trimmed.len() + key.len() + value.len() + 8);
    out.push('{');
    out.push_str(inner);
    if !inner.trim_start().is_empty() && !inner.ends_with(',') {
        out.push(',');
    }
    out.push_str(&json_string(key));
    out.push(':');
    out.push_str(&json_string(value));
    out.push('}');
    Ok(out)
}

fn json_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn append_form_field(body: &str, key: &str, value: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(value.as_bytes()).collect();
    if body.is_empty() {
        return format!("{key}={encoded}");
    }
    let separator = if body.ends_with('&') { "" } else { "&" };
    format!("{body}{separator}{key}={encoded}")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    fn bearer() -> TokenFormat {
        TokenFormat::default()
    }

    fn post(body: &str) -> HttpRequest {
        HttpRequest::new("POST", "https://api.example.com/items").with_body(body)
    }

    #[test]
    fn test_header_replaces_existing_any_case() {
        let request = post("")
            .with_added_header("authorization", "Bearer stale")
            .with_added_header("Accept", "*/*");

        let injected = inject(&request, "abc", InjectionLocation::Header, "Authorization", &bearer())
            .unwrap();

        let values: Vec<&str> = injected
            .headers_named("Authorization")
            .map(|h| h.value.as_str())
            .collect();
        assert_eq!(values, vec!["Bearer abc"]);
        assert_eq!(injected.header("Accept"), Some("*/*"));
        assert_eq!(request.header("authorization"), Some("Bearer stale"));
    }

    #[test]
    fn test_header_injection_is_idempotent() {
        let request = post("");
        let once = inject(&request, "abc", InjectionLocation::Header, "X-Token", &bearer()).unwrap();
        let twice = inject(&once, "def", InjectionLocation::Header, "X-Token", &bearer()).unwrap();

        assert_eq!(twice.headers_named("x-token").count(), 1);
        assert_eq!(twice.header("X-Token"), Some("Bearer def"));
    }

    #[test]
    fn test_query_param_appends() {
        let request = HttpRequest::new("GET", "https://api.example.com/items?access_token=old");
        let injected = inject(
            &request,
            "new",
            InjectionLocation::QueryParam,
            "access_token",
            &TokenFormat::new("{token}"),
        )
        .unwrap();

        assert_eq!(
            injected.url,
            "https://api.example.com/items?access_token=old&access_token=new"
        );
    }

    #[test]
    fn test_query_param_leaves_path_untouched() {
        let request = HttpRequest::new("GET", "https://api.example.com/static/../admin?x=1");
        let injected = inject(&request, "T", InjectionLocation::QueryParam, "k", &TokenFormat::new("{token}"))
            .unwrap();
        assert_eq!(injected.url, "https://api.example.com/static/../admin?x=1&k=T");

        let request = HttpRequest::new("GET", "https://API.example.com:443/v1/users");
        let injected = inject(&request, "T", InjectionLocation::QueryParam, "k", &TokenFormat::new("{token}"))
            .unwrap();
        assert_eq!(injected.url, "https://API.example.com:443/v1/users?k=T");
    }

    #[test]
    fn test_query_param_invalid_url() {
        let request = HttpRequest::new("GET", "not a url");
        let err = inject(&request, "t", InjectionLocation::QueryParam, "k", &bearer()).unwrap_err();

        assert!(matches!(err, InjectError::InvalidUrl { .. }));
    }

    #[test]
    fn test_body_json_appends_member() {
        let injected = inject(&post(r#"{"a":1}"#), "T", InjectionLocation::BodyJson, "tok", &bearer())
            .unwrap();
        assert_eq!(injected.body, r#"{"a":1,"tok":"Bearer T"}"#);
    }

    #[test]
    fn test_body_json_empty_object() {
        let injected = inject(&post(" { } "), "T", InjectionLocation::BodyJson, "tok", &bearer())
            .unwrap();
        assert_eq!(injected.body, r#"{"tok":"Bearer T"}"#);
    }

    #[test]
    fn test_body_json_escapes_value() {
        let injected = inject(
            &post(r#"{"a":1}"#),
            r#"x"y\z"#,
            InjectionLocation::BodyJson,
            "tok",
            &TokenFormat::new("{token}"),
        )
        .unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&injected.body).unwrap();
        assert_eq!(parsed["tok"], r#"x"y\z"#);
        assert_eq!(parsed["a"], 1);
    }

    #[test]
    fn test_body_json_trailing_comma_not_doubled() {
        let injected = inject(&post(r#"{"a":1,}"#), "T", InjectionLocation::BodyJson, "tok", &bearer())
            .unwrap();
        assert_eq!(injected.body, r#"{"a":1,"tok":"Bearer T"}"#);
    }

    #[test]
    fn test_body_json_rejects_non_object() {
        for body in ["[1,2,3]", "", "plain text", "{\"a\":1", "\"{}\""] {
            let request = post(body);
            let err = inject(&request, "T", InjectionLocation::BodyJson, "tok", &bearer())
                .unwrap_err();
            assert!(matches!(err, InjectError::UnsupportedBody { .. }), "{body}");
            assert_eq!(request.body, body);
        }
    }

    #[test]
    fn test_body_form_empty_body() {
        let injected = inject(&post(""), "a b&c", InjectionLocation::BodyForm, "token", &bearer())
            .unwrap();
        assert_eq!(injected.body, "token=Bearer+a+b%26c");
    }

    #[test]
    fn test_body_form_appends_separator() {
        let injected = inject(&post("user=alice"), "t", InjectionLocation::BodyForm, "token", &bearer())
            .unwrap();
        assert_eq!(injected.body, "user=alice&token=Bearer+t");

        let injected = inject(&post("user=alice&"), "t", InjectionLocation::BodyForm, "token", &bearer())
            .unwrap();
        assert_eq!(injected.body, "user=alice&token=Bearer+t");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn fuzz_inject_never_panics(
            body in ".*",
            token in ".*",
            key in "[A-Za-z-]{1,16}",
            url in ".*",
        ) {
            let request = HttpRequest::new("POST", url).with_body(body);
            for location in [
                InjectionLocation::Header,
                InjectionLocation::QueryParam,
                InjectionLocation::BodyJson,
                InjectionLocation::BodyForm,
            ] {
                let _ = inject(&request, &token, location, &key, &TokenFormat::default());
            }
        }

        #[test]
        fn fuzz_body_json_result_parses(
            pairs in prop::collection::btree_map("[a-z]{1,6}", any::<i32>(), 0..5),
            token in ".*",
        ) {
            let body = serde_json::to_string(&pairs).unwrap_or_default();
            let request = HttpRequest::new("POST", "https://x.test/").with_body(body);
            let injected = inject(&request, &token, InjectionLocation::BodyJson, "zz_token", &TokenFormat::default());
            prop_assert!(injected.is_ok());
            if let Ok(injected) = injected {
                let parsed: serde_json::Value = serde_json::from_str(&injected.body)
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                let expected = format!("Bearer {token}");
                prop_assert_eq!(parsed["zz_token"].as_str(), Some(expected.as_str()));
            }
        }
    }
}
