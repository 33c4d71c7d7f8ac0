//! `$batch` response splitting
//!
//! Both wire formats are decoded into [`BatchItem`]s:
//! - `multipart/mixed` bodies (V2 and V4), including nested changesets
//! - JSON batch bodies (`{"responses": [...]}`, V4 only)
//!
//! The format is chosen from the declared content type, never from the
//! protocol version, because V4 services may answer with either.

use odr_edm::ODataVersion;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

static BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"boundary=([^;\r\n]+)").expect("valid boundary regex"));

static CHANGESET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)content-type:\s*multipart/mixed[^\r\n]*?boundary=([^;\r\n]+)")
        .expect("valid changeset regex")
});

static STATUS_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"HTTP/\d\.\d\s+(\d+)").expect("valid status line regex"));

static JSON_BODY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\r?\n\r?\n(\{.*\})").expect("valid body regex"));

static CONTEXT_SET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#([^(]+)").expect("valid context regex"));

static METADATA_URI_SET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/([^(/]+)(?:\(|$)").expect("valid metadata uri regex"));

static REQUEST_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:GET|POST)\s+(\S+)\s+HTTP").expect("valid request line regex"));

static CONTENT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Content-ID:\s*([^\r\n]+)").expect("valid content id regex"));

/// One decoded sub-response of a `$batch` exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    /// Entity set name or request path; empty when unresolved
    pub url: String,
    /// Sub-response body text
    pub body: String,
    /// Sub-response HTTP status
    pub status_code: u16,
}

/// Split a `$batch` response body into sub-responses
///
/// Unresolvable parts are dropped; the result is best-effort and never fails.
#[must_use]
pub fn split(body: &str, content_type: &str, version: ODataVersion) -> Vec<BatchItem> {
    let items = if content_type.contains("multipart/mixed") {
        split_multipart(body, content_type)
    } else if content_type.contains("application/json") {
        split_json(body)
    } else {
        let items = split_json(body);
        if items.is_empty() {
            split_multipart(body, content_type)
        } else {
            items
        }
    };

    debug!(%version, content_type, items = items.len(), "split batch response");
    items
}

fn split_multipart(body: &str, content_type: &str) -> Vec<BatchItem> {
    let Some(boundary) = BOUNDARY
        .captures(content_type)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().trim_matches('"'))
    else {
        debug!(content_type, "no boundary in batch content type");
        return Vec::new();
    };

    let mut items = Vec::new();
    decode_parts(body, boundary, &mut items);
    items
}

fn decode_parts(body: &str, boundary: &str, items: &mut Vec<BatchItem>) {
    let delimiter = format!("--{boundary}");

    for part in body.split(delimiter.as_str()) {
        let trimmed = part.trim();
        if trimmed.is_empty() || trimmed == "--" {
            continue;
        }

        if let Some(inner) = changeset_boundary(part) {
            if inner != boundary && part.contains(&format!("--{inner}")) {
                decode_parts(part, &inner, items);
                continue;
            }
        }

        let Some(status_code) = STATUS_LINE
            .captures(part)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u16>().ok())
        else {
            debug!("batch part without HTTP status line");
            continue;
        };

        let Some(json_body) = JSON_BODY.captures(part).and_then(|caps| caps.get(1)) else {
            debug!(status_code, "batch part without JSON body");
            continue;
        };
        let json_body = json_body.as_str().trim();

        let url = serde_json::from_str::<Value>(json_body)
            .ok()
            .and_then(|parsed| entity_set_from_body(&parsed))
            .or_else(|| entity_set_from_headers(part))
            .unwrap_or_default();

        items.push(BatchItem {
            url,
            body: json_body.to_string(),
            status_code,
        });
    }
}

/// Inner boundary of a changeset part, read from the part's own headers
fn changeset_boundary(part: &str) -> Option<String> {
    let headers = part
        .trim_start_matches(['\r', '\n'])
        .split("\r\n\r\n")
        .next()
        .and_then(|head| head.split("\n\n").next())?;

    CHANGESET
        .captures(headers)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().trim_matches('"').to_string())
}

/// Entity set named by a sub-response body
///
/// Tries the V4 `@odata.context` fragment, then the V2 `__metadata.uri` of
/// the first record.
fn entity_set_from_body(body: &Value) -> Option<String> {
    if let Some(context) = body.get("@odata.context").and_then(Value::as_str) {
        if let Some(set) = CONTEXT_SET.captures(context).and_then(|caps| caps.get(1)) {
            return Some(set.as_str().to_string());
        }
    }

    let d = body.get("d")?;
    let metadata = d
        .get("results")
        .and_then(|results| results.get(0))
        .and_then(|first| first.get("__metadata"))
        .or_else(|| d.get("__metadata"))?;
    let uri = metadata.get("uri").and_then(Value::as_str)?;

    METADATA_URI_SET
        .captures(uri)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn entity_set_from_headers(part: &str) -> Option<String> {
    REQUEST_LINE
        .captures(part)
        .or_else(|| CONTENT_ID.captures(part))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn split_json(body: &str) -> Vec<BatchItem> {
    let Ok(parsed) = serde_json::from_str::<Value>(body) else {
        return Vec::new();
    };
    let Some(responses) = parsed.get("responses").and_then(Value::as_array) else {
        return Vec::new();
    };

    responses
        .iter()
        .map(|response| {
            let body = match response.get("body") {
                Some(Value::String(text)) => text.clone(),
                Some(Value::Null) | None => String::new(),
                Some(structured) => structured.to_string(),
            };
            let status_code = response
                .get("status")
                .and_then(Value::as_u64)
                .and_then(|status| u16::try_from(status).ok())
                .filter(|status| *status != 0)
                .unwrap_or(200);
            let url = response
                .get("body")
                .and_then(|b| match b {
                    Value::String(text) => serde_json::from_str::<Value>(text).ok(),
                    other => Some(other.clone()),
                })
                .and_then(|b| entity_set_from_body(&b))
                .or_else(|| response.get("id").map(id_text))
                .unwrap_or_default();

            BatchItem {
                url,
                body,
                status_code,
            }
        })
        .collect()
}

fn id_text(id: &Value) -> String {
    match id {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TWO_PART: &str = "--b1\r\n\
Content-Type: application/http\r\n\
Content-Transfer-Encoding: binary\r\n\
\r\n\
HTTP/1.1 200 OK\r\n\
Content-Type: application/json\r\n\
\r\n\
{\"d\":{\"results\":[{\"__metadata\":{\"uri\":\"https://host/sap/opu/odata/sap/ZSRV/Orders(1)\"},\"ID\":1}]}}\r\n\
--b1\r\n\
Content-Type: application/http\r\n\
Content-Transfer-Encoding: binary\r\n\
\r\n\
HTTP/1.1 200 OK\r\n\
Content-Type: application/json\r\n\
\r\n\
{\"@odata.context\":\"$metadata#Customers\",\"value\":[{\"ID\":9}]}\r\n\
--b1--\r\n";

    #[test]
    fn multipart_two_parts() {
        let items = split(TWO_PART, "multipart/mixed; boundary=b1", ODataVersion::V2);

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].url, "Orders");
        assert_eq!(items[0].status_code, 200);
        assert_eq!(items[1].url, "Customers");
        assert_eq!(items[1].status_code, 200);
        assert!(items[1].body.starts_with('{') && items[1].body.ends_with('}'));
    }

    #[test]
    fn multipart_without_boundary_is_empty() {
        assert!(split(TWO_PART, "multipart/mixed", ODataVersion::V4).is_empty());
    }

    #[test]
    fn multipart_drops_parts_without_status() {
        let body = "--b1\r\nContent-Type: application/http\r\n\r\n{\"value\":[]}\r\n--b1--";
        assert!(split(body, "multipart/mixed; boundary=b1", ODataVersion::V4).is_empty());
    }

    #[test]
    fn multipart_falls_back_to_request_line() {
        let body = "--b1\n\
Content-Type: application/http\n\
\n\
GET Products?$top=2 HTTP/1.1\n\
\n\
HTTP/1.1 200 OK\n\
Content-Type: application/json\n\
\n\
{\"d\":{\"results\":[]}}\n\
--b1--";
        let items = split(body, "multipart/mixed; boundary=b1", ODataVersion::V2);

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url, "Products?$top=2");
    }

    #[test]
    fn multipart_keeps_error_status() {
        let body = "--b1\r\nContent-Type: application/http\r\n\r\n\
HTTP/1.1 404 Not Found\r\nContent-Type: application/json\r\n\r\n\
{\"error\":{\"code\":\"404\"}}\r\n--b1--";
        let items = split(body, "multipart/mixed; boundary=b1", ODataVersion::V4);

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status_code, 404);
        assert_eq!(items[0].url, "");
    }

    #[test]
    fn multipart_nested_changeset() {
        let body = "--batch_1\r\n\
Content-Type: multipart/mixed; boundary=changeset_1\r\n\
\r\n\
--changeset_1\r\n\
Content-Type: application/http\r\n\
\r\n\
HTTP/1.1 201 Created\r\n\
Content-Type: application/json\r\n\
\r\n\
{\"@odata.context\":\"$metadata#Orders/$entity\",\"ID\":5}\r\n\
--changeset_1--\r\n\
--batch_1\r\n\
Content-Type: application/http\r\n\
\r\n\
HTTP/1.1 200 OK\r\n\
Content-Type: application/json\r\n\
\r\n\
{\"@odata.context\":\"$metadata#Customers\",\"value\":[]}\r\n\
--batch_1--";
        let items = split(body, "multipart/mixed;boundary=batch_1", ODataVersion::V4);

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].url, "Orders/$entity");
        assert_eq!(items[0].status_code, 201);
        assert_eq!(items[1].url, "Customers");
    }

    #[test]
    fn json_batch() {
        let body = r#"{"responses":[
            {"id":"0","status":200,"body":{"@odata.context":"$metadata#Orders","value":[{"ID":1}]}},
            {"id":"Customers","body":"{\"value\":[]}"}
        ]}"#;
        let items = split(body, "application/json", ODataVersion::V4);

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].url, "Orders");
        assert_eq!(items[0].status_code, 200);
        assert!(items[0].body.contains("\"ID\":1"));
        assert_eq!(items[1].url, "Customers");
        assert_eq!(items[1].status_code, 200);
        assert_eq!(items[1].body, "{\"value\":[]}");
    }

    #[test]
    fn unknown_content_type_tries_json_then_multipart() {
        let json = r#"{"responses":[{"id":"Orders","status":200,"body":{}}]}"#;
        assert_eq!(split(json, "", ODataVersion::V4).len(), 1);

        let items = split(TWO_PART, "text/plain; boundary=b1", ODataVersion::V2);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn invalid_json_batch_is_empty() {
        assert!(split("not json", "application/json", ODataVersion::V4).is_empty());
        assert!(split("{\"value\":[]}", "application/json", ODataVersion::V4).is_empty());
    }
}
