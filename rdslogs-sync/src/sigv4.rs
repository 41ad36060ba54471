//! AWS Signature Version 4 request signing.
//!
//! Produces header-authenticated requests for the log download endpoint and
//! query-authenticated (presigned) URLs. Signing is pure: the same request,
//! credentials and timestamp always give the same output, so callers must
//! sign immediately before sending.

use crate::credentials::Credentials;
use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Hex SHA-256 of an empty body.
pub const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Presigned URLs may not outlive seven days.
pub const MAX_PRESIGN_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Everything except the unreserved characters `A-Z a-z 0-9 - _ . ~`.
const URI_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const URI_ENCODE_PATH: &AsciiSet = &URI_ENCODE.remove(b'/');

/// An unsigned HTTP request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestDescription {
    pub method: String,
    pub scheme: String,
    /// Host as sent in the `Host` header, including a non-default port.
    pub host: String,
    /// Decoded path, starting with `/`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub payload_sha256: String,
}

impl RequestDescription {
    pub fn get(scheme: impl Into<String>, host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            scheme: scheme.into(),
            host: host.into(),
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            payload_sha256: EMPTY_PAYLOAD_SHA256.to_string(),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Path as it appears on the wire.
    pub fn encoded_path(&self) -> String {
        utf8_percent_encode(&self.path, URI_ENCODE_PATH).to_string()
    }

    fn validate(&self) -> SyncResult<()> {
        if self.method.is_empty() || !self.method.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(SyncError::Signing(format!("invalid method {:?}", self.method)));
        }
        if self.host.is_empty() {
            return Err(SyncError::Signing("request host is empty".into()));
        }
        if !self.path.starts_with('/') {
            return Err(SyncError::Signing(format!(
                "request path must be absolute: {:?}",
                self.path
            )));
        }
        Ok(())
    }
}

/// A request carrying SigV4 authentication headers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedRequest {
    pub method: String,
    pub url: String,
    /// Lowercased header names in canonical order, `authorization` last.
    pub headers: Vec<(String, String)>,
    pub canonical_query: String,
    pub signature: String,
}

impl SignedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Intermediate signing artifacts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigningOutput {
    pub canonical_request: String,
    pub string_to_sign: String,
    pub signed_headers: String,
    pub signature: String,
}

/// Signs requests for one region/service with a fixed set of credentials.
#[derive(Clone, Debug)]
pub struct RequestSigner {
    credentials: Credentials,
    region: String,
    service: String,
}

impl RequestSigner {
    pub fn new(
        credentials: Credentials,
        region: impl Into<String>,
        service: impl Into<String>,
    ) -> SyncResult<Self> {
        let region = region.into();
        let service = service.into();
        if region.is_empty() {
            return Err(SyncError::Signing("region is empty".into()));
        }
        if service.is_empty() {
            return Err(SyncError::Signing("service is empty".into()));
        }
        Ok(Self {
            credentials,
            region,
            service,
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Signs `request` with an `Authorization` header.
    pub fn sign(
        &self,
        request: &RequestDescription,
        timestamp: DateTime<Utc>,
    ) -> SyncResult<SignedRequest> {
        request.validate()?;

        let headers = self.authenticated_headers(request, timestamp);
        let canonical_query = canonical_query_string(&request.query);
        let output = self.compute(request, &canonical_query, &headers, timestamp);

        let authorization = format!(
            "{ALGORITHM} Credential={}/{}, SignedHeaders={}, Signature={}",
            self.credentials.access_key_id(),
            self.credential_scope(timestamp),
            output.signed_headers,
            output.signature
        );

        let mut signed_headers: Vec<(String, String)> = headers.into_iter().collect();
        signed_headers.push(("authorization".to_string(), authorization));

        debug!(
            "signed {} {} for scope {}",
            request.method,
            request.path,
            self.credential_scope(timestamp)
        );

        Ok(SignedRequest {
            method: request.method.clone(),
            url: build_url(request, &canonical_query),
            headers: signed_headers,
            canonical_query,
            signature: output.signature,
        })
    }

    /// Produces a URL authenticated through query parameters, valid for `expires`.
    pub fn presign(
        &self,
        request: &RequestDescription,
        timestamp: DateTime<Utc>,
        expires: Duration,
    ) -> SyncResult<String> {
        request.validate()?;
        if expires.is_zero() || expires > MAX_PRESIGN_EXPIRY {
            return Err(SyncError::Signing(format!(
                "presign expiry must be between 1s and {}s",
                MAX_PRESIGN_EXPIRY.as_secs()
            )));
        }

        let mut headers = canonical_header_map(&request.headers);
        headers.insert("host".to_string(), request.host.clone());
        let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");

        let mut query = request.query.clone();
        query.extend([
            ("X-Amz-Algorithm".to_string(), ALGORITHM.to_string()),
            (
                "X-Amz-Credential".to_string(),
                format!(
                    "{}/{}",
                    self.credentials.access_key_id(),
                    self.credential_scope(timestamp)
                ),
            ),
            ("X-Amz-Date".to_string(), amz_date(timestamp)),
            ("X-Amz-Expires".to_string(), expires.as_secs().to_string()),
            (
                "X-Amz-Security-Token".to_string(),
                self.credentials.session_token().to_string(),
            ),
            ("X-Amz-SignedHeaders".to_string(), signed_headers),
        ]);

        let canonical_query = canonical_query_string(&query);
        let output = self.compute(request, &canonical_query, &headers, timestamp);

        let full_query = format!("{canonical_query}&X-Amz-Signature={}", output.signature);
        Ok(build_url(request, &full_query))
    }

    /// Runs the canonical request / string-to-sign / signature steps.
    pub fn signing_output(
        &self,
        request: &RequestDescription,
        timestamp: DateTime<Utc>,
    ) -> SyncResult<SigningOutput> {
        request.validate()?;
        let headers = self.authenticated_headers(request, timestamp);
        let canonical_query = canonical_query_string(&request.query);
        Ok(self.compute(request, &canonical_query, &headers, timestamp))
    }

    /// Caller headers plus `host`, `x-amz-date` and `x-amz-security-token`.
    fn authenticated_headers(
        &self,
        request: &RequestDescription,
        timestamp: DateTime<Utc>,
    ) -> BTreeMap<String, String> {
        let mut headers = canonical_header_map(&request.headers);
        headers.insert("host".to_string(), request.host.clone());
        headers.insert("x-amz-date".to_string(), amz_date(timestamp));
        headers.insert(
            "x-amz-security-token".to_string(),
            self.credentials.session_token().to_string(),
        );
        headers
    }

    fn compute(
        &self,
        request: &RequestDescription,
        canonical_query: &str,
        headers: &BTreeMap<String, String>,
        timestamp: DateTime<Utc>,
    ) -> SigningOutput {
        let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(name, value)| format!("{name}:{value}\n"))
            .collect();

        let canonical_uri = self.canonical_uri(request);
        let canonical_request = [
            request.method.as_str(),
            canonical_uri.as_str(),
            canonical_query,
            canonical_headers.as_str(),
            signed_headers.as_str(),
            request.payload_sha256.as_str(),
        ]
        .join("\n");

        let amz_date = amz_date(timestamp);
        let scope = self.credential_scope(timestamp);
        let request_digest = sha256_hex(canonical_request.as_bytes());
        let string_to_sign = [
            ALGORITHM,
            amz_date.as_str(),
            scope.as_str(),
            request_digest.as_str(),
        ]
        .join("\n");

        let signing_key = derive_signing_key(
            self.credentials.secret_access_key(),
            &date_stamp(timestamp),
            &self.region,
            &self.service,
        );
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        SigningOutput {
            canonical_request,
            string_to_sign,
            signed_headers,
            signature,
        }
    }

    /// S3 encodes the path once; every other service signs the wire path encoded again.
    fn canonical_uri(&self, request: &RequestDescription) -> String {
        let encoded = request.encoded_path();
        if self.service == "s3" {
            encoded
        } else {
            utf8_percent_encode(&encoded, URI_ENCODE_PATH).to_string()
        }
    }

    fn credential_scope(&self, timestamp: DateTime<Utc>) -> String {
        format!(
            "{}/{}/{}/aws4_request",
            date_stamp(timestamp),
            self.region,
            self.service
        )
    }
}

/// Derives the date/region/service scoped signing key.
pub fn derive_signing_key(secret: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// Sorted, encoded `key=value` pairs joined by `&`.
pub fn canonical_query_string(params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (uri_encode(k), uri_encode(v)))
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn uri_encode(value: &str) -> String {
    utf8_percent_encode(value, URI_ENCODE).to_string()
}

pub fn amz_date(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y%m%dT%H%M%SZ").to_string()
}

pub fn date_stamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y%m%d").to_string()
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Lowercases names, trims values and collapses inner whitespace runs.
/// Repeated headers are joined with commas in their original order.
fn canonical_header_map(headers: &[(String, String)]) -> BTreeMap<String, String> {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let name = name.trim().to_ascii_lowercase();
        if name == "authorization" {
            continue;
        }
        let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
        map.entry(name)
            .and_modify(|existing| {
                existing.push(',');
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    map
}

fn build_url(request: &RequestDescription, query: &str) -> String {
    let mut url = format!("{}://{}{}", request.scheme, request.host, request.encoded_path());
    if !query.is_empty() {
        url.push('?');
        url.push_str(query);
    }
    url
}
