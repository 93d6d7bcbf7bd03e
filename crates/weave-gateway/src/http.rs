//! Minimal HTTP/1.1 handling for the method API.
//!
//! | Path | Answer |
//! |---|---|
//! | `/api/v1/services` | registry snapshot |
//! | `/api/v1/services/{name}` | result of `broadcastState` on `name` |
//! | `/api/v1/services/{name}/{method}/{arg}...` | result of `method(arg, ...)` |
//!
//! Each `arg` segment is percent-decoded and parsed as JSON; a segment that
//! is not valid JSON is passed as a string, so `/clock01/startClock/500` and
//! `/runtime/getService/clock01` both work.

use percent_encoding::percent_decode_str;
use serde_json::Value;

pub const API_PREFIX: &str = "/api/v1/services";

#[derive(Debug, Clone, PartialEq)]
pub enum ApiRequest {
    Registry,
    State {
        name: String,
    },
    Invoke {
        name: String,
        method: String,
        args: Vec<Value>,
    },
}

/// `(method, target)` from the request line.
pub fn request_line(head: &str) -> Option<(&str, &str)> {
    let mut parts = head.lines().next()?.split_whitespace();
    let method = parts.next()?;
    let target = parts.next()?;
    Some((method, target))
}

pub fn is_websocket_upgrade(head: &str) -> bool {
    head.lines().any(|line| {
        let line = line.to_ascii_lowercase();
        line.starts_with("upgrade:") && line.contains("websocket")
    })
}

/// Value of `key` in the query string of `target`, percent-decoded.
pub fn query_param(target: &str, key: &str) -> Option<String> {
    let (_, query) = target.split_once('?')?;
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        (k == key && !v.is_empty()).then(|| decode(v))
    })
}

/// Map a request target onto the method API.  `None` for other paths.
pub fn parse_api(target: &str) -> Option<ApiRequest> {
    let path = target.split(['?', '#']).next().unwrap_or_default();
    let rest = path.strip_prefix(API_PREFIX)?;
    if !(rest.is_empty() || rest.starts_with('/')) {
        return None;
    }
    let mut segments = rest.split('/').filter(|s| !s.is_empty()).map(decode);

    let Some(name) = segments.next() else {
        return Some(ApiRequest::Registry);
    };
    let Some(method) = segments.next() else {
        return Some(ApiRequest::State { name });
    };
    let args = segments.map(|s| decode_arg(&s)).collect();
    Some(ApiRequest::Invoke { name, method, args })
}

/// A decoded path segment as a JSON argument.
pub fn decode_arg(segment: &str) -> Value {
    serde_json::from_str(segment).unwrap_or_else(|_| Value::String(segment.to_string()))
}

/// A complete `Connection: close` response carrying `body` as JSON.
pub fn response(status: u16, body: &Value) -> String {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Internal Server Error",
    };
    let body = body.to_string();
    format!(
        "HTTP/1.1 {status} {reason}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    )
}

fn decode(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}
