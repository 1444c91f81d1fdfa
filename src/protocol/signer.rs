//! Canonical request/response strings and HMAC-SHA1 signatures.
//!
//! Everything in this module is pure: no clock, no I/O. The same inputs always
//! produce the same canonical string and therefore the same signature.

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use thiserror::Error;

use super::Headers;

type HmacSha1 = Hmac<Sha1>;

pub const OTS_HEADER_PREFIX: &str = "x-ots-";
pub const SIGNATURE_HEADER: &str = "x-ots-signature";
pub const AUTHORIZATION_HEADER: &str = "authorization";

const AUTHORIZATION_SCHEME: &str = "OTS ";

/// Reasons a response `Authorization` header fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    #[error("\"Authorization\" is missing in response header")]
    Missing,
    #[error("Invalid Authorization in response")]
    Malformed,
    #[error("Invalid accesskeyid in response")]
    AccessIdMismatch,
    #[error("Invalid signature in response")]
    SignatureMismatch,
}

/// Signs `canonical` with `secret_key`: base64(HMAC-SHA1(key, canonical)).
pub fn sign(secret_key: &str, canonical: &str) -> Result<String, InvalidLength> {
    let mut mac = HmacSha1::new_from_slice(secret_key.as_bytes())?;
    mac.update(canonical.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Renders the `x-ots-*` headers (minus the signature) as sorted
/// `key:value` lines joined by `\n`.
///
/// Returns `"\n"` when no header qualifies.
pub fn canonical_headers<I, K, V>(headers: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut lines: Vec<String> = headers
        .into_iter()
        .filter_map(|(key, value)| {
            let key = key.as_ref().to_lowercase();
            if key.starts_with(OTS_HEADER_PREFIX) && key != SIGNATURE_HEADER {
                Some(format!("{}:{}", key, value.as_ref().trim()))
            } else {
                None
            }
        })
        .collect();

    if lines.is_empty() {
        return "\n".to_string();
    }

    lines.sort();
    lines.join("\n")
}

/// Canonical string signed by the client for a request to `uri`.
///
/// `uri` is the request path, optionally followed by `?query`.
pub fn request_canonical_string(uri: &str, headers: &Headers) -> String {
    let (path, query) = uri.split_once('?').unwrap_or((uri, ""));

    // Only the first value of a repeated query key takes part in the signature.
    let mut params = BTreeMap::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        params.entry(key.into_owned()).or_insert_with(|| value.into_owned());
    }
    let mut pairs: Vec<String> = params.into_iter().map(|(k, v)| format!("{}:{}", k, v)).collect();
    pairs.sort();
    let sorted_query = percent_encode_all(&pairs.join("&"));

    format!("{}\nPOST\n{}\n{}\n", path, sorted_query, canonical_headers(headers))
}

/// Canonical string the service signs for its response to `uri`.
pub fn response_canonical_string(uri: &str, headers: &Headers) -> String {
    let path = uri.split_once('?').map_or(uri, |(path, _)| path);
    format!("{}\n{}", canonical_headers(headers), path)
}

/// Encodes every byte of the UTF-8 representation as `%XX`.
fn percent_encode_all(input: &str) -> String {
    let mut out = String::with_capacity(input.len() * 3);
    for byte in input.as_bytes() {
        let _ = write!(out, "%{:02X}", byte);
    }
    out
}

/// Signs requests and verifies responses for one access key pair.
///
/// The HMAC key is set up once at construction; every signature afterwards is
/// infallible.
#[derive(Clone)]
pub struct Signer {
    access_id: String,
    mac: HmacSha1,
}

impl Signer {
    pub fn new(access_id: impl Into<String>, access_key: &str) -> Result<Self, InvalidLength> {
        Ok(Self {
            access_id: access_id.into(),
            mac: HmacSha1::new_from_slice(access_key.as_bytes())?,
        })
    }

    pub fn access_id(&self) -> &str {
        &self.access_id
    }

    fn sign(&self, canonical: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(canonical.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }

    pub fn request_signature(&self, uri: &str, headers: &Headers) -> String {
        self.sign(&request_canonical_string(uri, headers))
    }

    pub fn response_signature(&self, uri: &str, headers: &Headers) -> String {
        self.sign(&response_canonical_string(uri, headers))
    }

    /// Validates the `Authorization: OTS {access_id}:{signature}` header of a
    /// response. `headers` must use lower-cased keys.
    pub fn check_authorization(&self, uri: &str, headers: &Headers) -> Result<(), AuthorizationError> {
        let auth = headers.get(AUTHORIZATION_HEADER).ok_or(AuthorizationError::Missing)?;
        let credentials = auth
            .strip_prefix(AUTHORIZATION_SCHEME)
            .ok_or(AuthorizationError::Malformed)?;

        let mut parts = credentials.split(':');
        let (access_id, signature) = match (parts.next(), parts.next(), parts.next()) {
            (Some(id), Some(sig), None) => (id, sig),
            _ => return Err(AuthorizationError::Malformed),
        };

        if access_id != self.access_id {
            return Err(AuthorizationError::AccessIdMismatch);
        }
        if signature != self.response_signature(uri, headers) {
            return Err(AuthorizationError::SignatureMismatch);
        }
        Ok(())
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("access_id", &self.access_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCESS_ID: &str = "29j2NtzlUr8hjP8b";
    const ACCESS_KEY: &str = "8AKqXmNBkl85QK70cAOuH4bBd3gS0J";

    fn headers(pairs: &[(&str, &str)]) -> Headers {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn list_table_request_headers() -> Headers {
        headers(&[
            ("x-ots-date", "Tue, 12 Aug 2014 10:23:03 GMT"),
            ("x-ots-apiversion", "2014-08-08"),
            ("x-ots-accesskeyid", ACCESS_ID),
            ("x-ots-instancename", "naketest"),
            ("x-ots-contentmd5", "1B2M2Y8AsgTpgAmY7PhCfg=="),
            ("x-ots-signature", "testforx-ots-signature"),
        ])
    }

    fn list_table_response_headers() -> Headers {
        headers(&[
            ("x-ots-date", "Tue, 12 Aug 2014 10:23:03 GMT"),
            ("x-ots-requestid", "0005006c-0e81-db74-4a34-ce0a5df229a1"),
            ("x-ots-contenttype", "protocol buffer"),
            ("x-ots-contentmd5", "1B2M2Y8AsgTpgAmY7PhCfg=="),
        ])
    }

    #[test]
    fn canonical_headers_are_sorted_and_skip_signature() {
        let expected = "x-ots-accesskeyid:29j2NtzlUr8hjP8b\n\
                        x-ots-apiversion:2014-08-08\n\
                        x-ots-contentmd5:1B2M2Y8AsgTpgAmY7PhCfg==\n\
                        x-ots-date:Tue, 12 Aug 2014 10:23:03 GMT\n\
                        x-ots-instancename:naketest";
        assert_eq!(canonical_headers(&list_table_request_headers()), expected);
    }

    #[test]
    fn canonical_headers_without_ots_headers_is_newline() {
        assert_eq!(canonical_headers(&Headers::new()), "\n");
        assert_eq!(canonical_headers(&headers(&[("content-type", "text/plain")])), "\n");
    }

    #[test]
    fn canonical_headers_trim_values_and_lowercase_keys() {
        let h = headers(&[("X-OTS-Date", "  Tue, 12 Aug 2014 10:23:03 GMT  ")]);
        assert_eq!(canonical_headers(&h), "x-ots-date:Tue, 12 Aug 2014 10:23:03 GMT");
    }

    #[test]
    fn list_table_request_signature_matches_known_vector() {
        let canonical = request_canonical_string("/ListTable", &list_table_request_headers());
        assert!(canonical.starts_with("/ListTable\nPOST\n\nx-ots-accesskeyid:"));
        assert!(canonical.ends_with("x-ots-instancename:naketest\n"));

        assert_eq!(sign(ACCESS_KEY, &canonical).unwrap(), "4xap392B7EBpN+RmlHgNowjoG1w=");

        let signer = Signer::new(ACCESS_ID, ACCESS_KEY).unwrap();
        assert_eq!(
            signer.request_signature("/ListTable", &list_table_request_headers()),
            "4xap392B7EBpN+RmlHgNowjoG1w="
        );
    }

    #[test]
    fn response_signature_matches_known_vector() {
        let signer = Signer::new(ACCESS_ID, ACCESS_KEY).unwrap();
        assert_eq!(
            signer.response_signature("/ListTable", &list_table_response_headers()),
            "Y24MHhVti5UhSCW5qsUSDvT9SOk="
        );
    }

    #[test]
    fn authorization_header_validates() {
        let signer = Signer::new(ACCESS_ID, ACCESS_KEY).unwrap();
        let mut h = list_table_response_headers();
        h.insert(
            "authorization".to_string(),
            "OTS 29j2NtzlUr8hjP8b:Y24MHhVti5UhSCW5qsUSDvT9SOk=".to_string(),
        );
        assert_eq!(signer.check_authorization("/ListTable", &h), Ok(()));
    }

    #[test]
    fn authorization_failures_are_distinguished() {
        let signer = Signer::new(ACCESS_ID, ACCESS_KEY).unwrap();
        let mut h = list_table_response_headers();
        assert_eq!(signer.check_authorization("/ListTable", &h), Err(AuthorizationError::Missing));

        h.insert("authorization".into(), "Basic abc".into());
        assert_eq!(signer.check_authorization("/ListTable", &h), Err(AuthorizationError::Malformed));

        h.insert("authorization".into(), "OTS a:b:c".into());
        assert_eq!(signer.check_authorization("/ListTable", &h), Err(AuthorizationError::Malformed));

        h.insert("authorization".into(), "OTS someoneelse:Y24MHhVti5UhSCW5qsUSDvT9SOk=".into());
        assert_eq!(
            signer.check_authorization("/ListTable", &h),
            Err(AuthorizationError::AccessIdMismatch)
        );

        h.insert("authorization".into(), "OTS 29j2NtzlUr8hjP8b:AAAAHhVti5UhSCW5qsUSDvT9SOk=".into());
        assert_eq!(
            signer.check_authorization("/ListTable", &h),
            Err(AuthorizationError::SignatureMismatch)
        );
    }

    #[test]
    fn mixed_case_response_headers_sign_like_lowercase() {
        let signer = Signer::new("0AkCEeXUWXeviDP6", "W8foPaZ53CB61C5H8JnTURsdXekWua").unwrap();
        let h = headers(&[
            ("Date", "Sat, 01 Nov 2014 08:49:24 GMT"),
            ("Connection", "keep-alive"),
            ("X-Ots-Contentmd5", "IjpgaUwGKkfuEgyLaDq1mg=="),
            ("X-Ots-Contenttype", "protocol buffer"),
            ("X-Ots-Date", "Sat, 01 Nov 2014 08:49:24 GMT"),
            ("X-Ots-requestid", "000506c8-30ac-5974-1388-990a05bf1034"),
        ]);
        assert_eq!(signer.response_signature("/ListTable", &h), "LQ1pIcPfC9NHZWMR9vrydXG4U4A=");
    }

    #[test]
    fn query_parameters_are_sorted_and_fully_escaped() {
        let canonical = request_canonical_string("/GetRow?b=2&a=1", &Headers::new());
        // "a:1&b:2" with every byte escaped
        assert_eq!(canonical, "/GetRow\nPOST\n%61%3A%31%26%62%3A%32\n\n\n");
    }

    #[test]
    fn signer_debug_hides_key() {
        let signer = Signer::new(ACCESS_ID, ACCESS_KEY).unwrap();
        let dbg = format!("{:?}", signer);
        assert!(dbg.contains(ACCESS_ID));
        assert!(!dbg.contains(ACCESS_KEY));
    }
}
