use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

use super::Headers;
use super::signer::{SIGNATURE_HEADER, Signer};

pub const API_VERSION: &str = "2014-08-08";

pub const DATE_HEADER: &str = "x-ots-date";
pub const API_VERSION_HEADER: &str = "x-ots-apiversion";
pub const ACCESS_ID_HEADER: &str = "x-ots-accesskeyid";
pub const INSTANCE_NAME_HEADER: &str = "x-ots-instancename";
pub const CONTENT_MD5_HEADER: &str = "x-ots-contentmd5";
pub const REQUEST_ID_HEADER: &str = "x-ots-requestid";
pub const CONTENT_TYPE_HEADER: &str = "x-ots-contenttype";

/// RFC 1123 date, always rendered in GMT.
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

const MAX_CLOCK_SKEW_SECS: i64 = 15 * 60;

const REQUIRED_SUCCESS_HEADERS: [&str; 4] = [CONTENT_MD5_HEADER, REQUEST_ID_HEADER, DATE_HEADER, CONTENT_TYPE_HEADER];

/// Response header violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("\"{0}\" is missing in response header")]
    Missing(&'static str),
    #[error("MD5 mismatch in response")]
    Md5Mismatch,
    #[error("Invalid date format in response: {0}")]
    InvalidDate(String),
    #[error("The difference between date in response and system time is more than 15 minutes")]
    ClockSkew,
}

/// base64 of the MD5 digest of `body`.
pub fn content_md5(body: &[u8]) -> String {
    BASE64.encode(md5::compute(body).0)
}

pub fn format_http_date(time: DateTime<Utc>) -> String {
    time.format(HTTP_DATE_FORMAT).to_string()
}

pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), HTTP_DATE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Builds the signed header set for a request to `uri` carrying `body`.
pub fn request_headers(signer: &Signer, instance_name: &str, uri: &str, body: &[u8], now: DateTime<Utc>) -> Headers {
    let mut headers = Headers::new();
    headers.insert(DATE_HEADER.to_string(), format_http_date(now));
    headers.insert(API_VERSION_HEADER.to_string(), API_VERSION.to_string());
    headers.insert(ACCESS_ID_HEADER.to_string(), signer.access_id().to_string());
    headers.insert(INSTANCE_NAME_HEADER.to_string(), instance_name.to_string());
    headers.insert(CONTENT_MD5_HEADER.to_string(), content_md5(body));

    let signature = signer.request_signature(uri, &headers);
    headers.insert(SIGNATURE_HEADER.to_string(), signature);
    headers
}

/// Checks the integrity headers of a response. `headers` must use lower-cased keys.
///
/// The four `x-ots-*` headers are mandatory only for 2xx responses, but the
/// MD5 and date are verified whenever they are present.
pub fn check_response_headers(status: u16, headers: &Headers, body: &[u8], now: DateTime<Utc>) -> Result<(), HeaderError> {
    if (200..300).contains(&status) {
        if let Some(name) = REQUIRED_SUCCESS_HEADERS.iter().find(|name| !headers.contains_key(**name)) {
            return Err(HeaderError::Missing(name));
        }
    }

    if let Some(md5) = headers.get(CONTENT_MD5_HEADER) {
        if md5.trim() != content_md5(body) {
            return Err(HeaderError::Md5Mismatch);
        }
    }

    if let Some(date) = headers.get(DATE_HEADER) {
        let server_time = parse_http_date(date).ok_or_else(|| HeaderError::InvalidDate(date.clone()))?;
        if (now - server_time).num_seconds().abs() > MAX_CLOCK_SKEW_SECS {
            return Err(HeaderError::ClockSkew);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2014, 8, 12, 10, 23, 3).unwrap()
    }

    fn valid_headers(body: &[u8]) -> Headers {
        [
            (CONTENT_MD5_HEADER, content_md5(body)),
            (REQUEST_ID_HEADER, "0005006c-0e81-db74-4a34-ce0a5df229a1".to_string()),
            (DATE_HEADER, "Tue, 12 Aug 2014 10:23:03 GMT".to_string()),
            (CONTENT_TYPE_HEADER, "protocol buffer".to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    #[test]
    fn md5_of_empty_body() {
        assert_eq!(content_md5(b""), "1B2M2Y8AsgTpgAmY7PhCfg==");
    }

    #[test]
    fn http_date_round_trips_in_gmt() {
        let formatted = format_http_date(now());
        assert_eq!(formatted, "Tue, 12 Aug 2014 10:23:03 GMT");
        assert_eq!(parse_http_date(&formatted), Some(now()));
        assert_eq!(parse_http_date("2014-08-12T10:23:03Z"), None);
    }

    #[test]
    fn request_headers_are_signed() {
        let signer = Signer::new("29j2NtzlUr8hjP8b", "8AKqXmNBkl85QK70cAOuH4bBd3gS0J").unwrap();
        let headers = request_headers(&signer, "naketest", "/ListTable", b"", now());

        assert_eq!(headers[API_VERSION_HEADER], API_VERSION);
        assert_eq!(headers[CONTENT_MD5_HEADER], "1B2M2Y8AsgTpgAmY7PhCfg==");
        assert_eq!(headers[DATE_HEADER], "Tue, 12 Aug 2014 10:23:03 GMT");
        assert_eq!(headers[SIGNATURE_HEADER], "4xap392B7EBpN+RmlHgNowjoG1w=");
    }

    #[test]
    fn success_requires_all_integrity_headers() {
        let mut headers = valid_headers(b"");
        assert_eq!(check_response_headers(200, &headers, b"", now()), Ok(()));

        headers.remove(CONTENT_TYPE_HEADER);
        assert_eq!(
            check_response_headers(200, &headers, b"", now()),
            Err(HeaderError::Missing(CONTENT_TYPE_HEADER))
        );
        // Not required on error responses
        assert_eq!(check_response_headers(500, &headers, b"", now()), Ok(()));
    }

    #[test]
    fn md5_mismatch_is_detected_for_any_status() {
        let headers = valid_headers(b"");
        assert_eq!(check_response_headers(200, &headers, b"x", now()), Err(HeaderError::Md5Mismatch));
        assert_eq!(check_response_headers(503, &headers, b"x", now()), Err(HeaderError::Md5Mismatch));
    }

    #[test]
    fn clock_skew_beyond_fifteen_minutes_is_rejected() {
        let headers = valid_headers(b"");
        let later = now() + Duration::minutes(14);
        assert_eq!(check_response_headers(200, &headers, b"", later), Ok(()));

        let much_later = now() + Duration::minutes(16);
        assert_eq!(check_response_headers(200, &headers, b"", much_later), Err(HeaderError::ClockSkew));
    }

    #[test]
    fn unparseable_date_is_rejected() {
        let mut headers = valid_headers(b"");
        headers.insert(DATE_HEADER.to_string(), "yesterday".to_string());
        assert!(matches!(
            check_response_headers(200, &headers, b"", now()),
            Err(HeaderError::InvalidDate(_))
        ));
    }
}
