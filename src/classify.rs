//! Turns the outcome of one HTTP exchange into either the response to decode
//! or a classified [`ServiceError`].
//!
//! Checks run in a fixed order: transport failure, integrity headers,
//! response authorization, then the service error payload.

use chrono::{DateTime, Utc};
use prost::Message;

use crate::codec::Operation;
use crate::error::{ServiceError, ServiceErrorKind};
use crate::protocol::headers::{REQUEST_ID_HEADER, check_response_headers};
use crate::protocol::signer::{AuthorizationError, Signer};
use crate::protocol::wire;
use crate::transport::{ResponseEnvelope, TransportError};

const AUTH_FAILED_CODE: &str = "OTSAuthFailed";

/// Classifies `outcome`, passing successful responses through untouched.
pub fn classify(
    operation: Operation,
    uri: &str,
    signer: &Signer,
    outcome: Result<ResponseEnvelope, TransportError>,
    now: DateTime<Utc>,
) -> Result<ResponseEnvelope, ServiceError> {
    let response = outcome.map_err(|e| classify_transport_error(operation, &e))?;
    match classify_response(operation, uri, signer, &response, now) {
        Some(error) => Err(error),
        None => Ok(response),
    }
}

pub fn classify_transport_error(operation: Operation, error: &TransportError) -> ServiceError {
    let kind = match error {
        TransportError::BodyRead(_) => ServiceErrorKind::ResponseBodyRead,
        TransportError::Timeout(_) | TransportError::Connect(_) | TransportError::Request(_) => {
            ServiceErrorKind::Network
        },
    };
    ServiceError::new(kind, operation, error.to_string())
}

/// Returns `None` for a valid 2xx response, otherwise the classified error.
pub fn classify_response(
    operation: Operation,
    uri: &str,
    signer: &Signer,
    response: &ResponseEnvelope,
    now: DateTime<Utc>,
) -> Option<ServiceError> {
    let status = response.status;
    let request_id = response.headers.get(REQUEST_ID_HEADER).cloned().unwrap_or_default();
    let annotate = |error: ServiceError| error.with_status(status).with_request_id(request_id.clone());

    if let Err(e) = check_response_headers(status, &response.headers, &response.body, now) {
        return Some(annotate(ServiceError::new(
            ServiceErrorKind::Protocol,
            operation,
            e.to_string(),
        )));
    }

    let authentication =
        |e: AuthorizationError| annotate(ServiceError::new(ServiceErrorKind::Authentication, operation, e.to_string()));

    if status != 403 {
        match signer.check_authorization(uri, &response.headers) {
            Ok(()) => {},
            // unsigned error responses are accepted
            Err(AuthorizationError::Missing) if !response.is_success() => {},
            Err(e) => return Some(authentication(e)),
        }
    }

    if response.is_success() {
        return None;
    }

    let payload = wire::Error::decode(response.body.as_slice())
        .ok()
        .filter(|error| !error.code.is_empty());
    let Some(payload) = payload else {
        return Some(annotate(ServiceError::new(
            ServiceErrorKind::Protocol,
            operation,
            format!("HTTP status: {}, reason: {}.", status, response.reason),
        )));
    };

    if status == 403 && payload.code != AUTH_FAILED_CODE {
        match signer.check_authorization(uri, &response.headers) {
            Ok(()) | Err(AuthorizationError::Missing) => {},
            Err(e) => return Some(authentication(e)),
        }
    }

    Some(ServiceError::from_service(
        operation,
        status,
        payload.code,
        payload.message.unwrap_or_default(),
        request_id,
    ))
}
