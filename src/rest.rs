//! Shared plumbing for the hosted service's REST endpoints.

use reqwest::Response;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;

use crate::error::AppError;

pub(crate) const APIKEY_HEADER: &str = "apikey";

/// Ask PostgREST to echo the written rows back.
pub(crate) const PREFER_REPRESENTATION: &str = "return=representation";

/// Ask PostgREST to update on primary key conflict instead of failing.
pub(crate) const PREFER_UPSERT: &str = "resolution=merge-duplicates,return=minimal";

pub(crate) fn service_headers(anon_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(anon_key) {
        headers.insert(APIKEY_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("Bearer {anon_key}")) {
        headers.insert(AUTHORIZATION, value);
    }
    headers
}

/// Collaborator-reported failures become `RemoteRejected`, carrying the
/// service's own message when one can be decoded from the body.
pub(crate) async fn ok_or_reject(resp: Response) -> Result<Response, AppError> {
    if resp.status().is_success() {
        return Ok(resp);
    }

    let status = resp.status();
    let message = resp
        .json::<WireError>()
        .await
        .ok()
        .and_then(WireError::into_message)
        .unwrap_or_else(|| format!("request failed with status {status}"));

    Err(AppError::RemoteRejected(message))
}

/// The auth endpoints and PostgREST disagree on the error field name, so all
/// known spellings are collected and the most descriptive one wins.
#[derive(Deserialize)]
struct WireError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl WireError {
    fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.message)
            .or(self.msg)
            .or(self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_headers_carry_key_and_bearer() {
        let headers = service_headers("anon-123");

        assert_eq!(headers.get(APIKEY_HEADER).unwrap(), "anon-123");
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer anon-123");
    }

    #[test]
    fn wire_error_prefers_description() {
        let err: WireError =
            serde_json::from_str(r#"{"error":"invalid_grant","error_description":"bad password"}"#)
                .unwrap();

        assert_eq!(err.into_message().unwrap(), "bad password");
    }

    #[test]
    fn wire_error_reads_postgrest_message() {
        let err: WireError =
            serde_json::from_str(r#"{"message":"violates row-level security"}"#).unwrap();

        assert_eq!(err.into_message().unwrap(), "violates row-level security");
    }
}
