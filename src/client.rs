//! The request orchestrator.
//!
//! [`OtsClient`] drives a call through encode, sign, send, classify and
//! decode, consulting its retry policy after every failed attempt. Every
//! attempt is signed afresh so retries carry a current `x-ots-date`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::time::Instant;
use url::Url;

use crate::classify::classify;
use crate::codec::{
    BatchGetRowRequest, BatchWriteRowRequest, CapacityUnit, CreateTableRequest, DeleteRowRequest, DeleteTableRequest,
    DescribeTableRequest, DescribeTableResponse, GetRangeRequest, GetRangeResponse, GetRowRequest, GetRowResponse,
    ListTableRequest, Operation, OtsRequest, PutRowRequest, Request, ReservedThroughputDetails, Response,
    TableInBatchGetRowResponse, TableInBatchWriteRowResponse, UpdateRowRequest, UpdateTableRequest, ensure_supported,
};
use crate::config::ClientConfig;
use crate::error::{ClientError, OtsResult, ServiceError};
use crate::protocol::Signer;
use crate::protocol::headers::{REQUEST_ID_HEADER, request_headers};
use crate::retry::{RetryDecision, RetryPolicy, RetryState};
use crate::transport::{ReqwestTransport, ResponseEnvelope, Transport, TransportError, TransportRequest};

/// Client for one OTS instance.
///
/// Immutable after construction and safe to share between tasks.
///
/// # Example
///
/// ```rust,no_run
/// use ots_client::{ClientConfig, OtsClient};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ClientConfig::new("https://inst.cn-hangzhou.ots.aliyuncs.com", "id", "key", "inst");
/// let client = OtsClient::new(&config)?;
/// for table in client.list_table().await? {
///     println!("{}", table);
/// }
/// # Ok(())
/// # }
/// ```
pub struct OtsClient<T: Transport = ReqwestTransport> {
    endpoint: Url,
    instance_name: String,
    signer: Signer,
    retry_policy: Arc<dyn RetryPolicy>,
    total_timeout: Option<Duration>,
    transport: T,
}

impl OtsClient<ReqwestTransport> {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let transport = ReqwestTransport::new(config.socket_timeout(), &config.user_agent)?;
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> OtsClient<T> {
    pub fn with_transport(config: &ClientConfig, transport: T) -> Result<Self, ClientError> {
        let endpoint = config.validate()?;
        let signer = config
            .credentials()
            .signer()
            .map_err(|e| ClientError::InvalidConfig(format!("unusable access key: {}", e)))?;
        let retry_policy = config.retry.build()?;

        debug!(
            endpoint = endpoint.as_str(),
            instance = config.instance_name.as_str(),
            retry_policy:? = retry_policy;
            "OTS client created"
        );

        Ok(Self {
            endpoint,
            instance_name: config.instance_name.clone(),
            signer,
            retry_policy,
            total_timeout: config.total_timeout(),
            transport,
        })
    }

    pub fn with_retry_policy(mut self, retry_policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends a typed request and decodes its response.
    pub async fn call<R: OtsRequest>(&self, request: &R) -> OtsResult<R::Response> {
        self.call_until(request, self.default_deadline()).await
    }

    /// Like [`call`](Self::call), but no retry is started that would end
    /// after `deadline`. The last classified error is returned in that case.
    pub async fn call_with_deadline<R: OtsRequest>(&self, request: &R, deadline: Instant) -> OtsResult<R::Response> {
        self.call_until(request, Some(deadline)).await
    }

    /// Sends a request whose operation is only known at runtime.
    pub async fn dispatch(&self, request: &Request) -> OtsResult<Response> {
        let operation = request.operation();
        let body = request.encode()?;
        let response = self.execute(operation, body, self.default_deadline()).await?;
        Ok(Response::decode(operation, &response.body)?)
    }

    /// Sends an already encoded body to the operation called `name` and
    /// returns the raw response body. Unknown names fail without any request.
    pub async fn call_raw(&self, name: &str, body: Vec<u8>) -> OtsResult<Vec<u8>> {
        let operation = ensure_supported(name)?;
        let response = self.execute(operation, body, self.default_deadline()).await?;
        Ok(response.body)
    }

    pub async fn create_table(&self, request: &CreateTableRequest) -> OtsResult<()> {
        self.call(request).await
    }

    pub async fn delete_table(&self, table_name: &str) -> OtsResult<()> {
        self.call(&DeleteTableRequest::new(table_name)).await
    }

    pub async fn list_table(&self) -> OtsResult<Vec<String>> {
        self.call(&ListTableRequest).await
    }

    pub async fn update_table(&self, request: &UpdateTableRequest) -> OtsResult<ReservedThroughputDetails> {
        self.call(request).await
    }

    pub async fn describe_table(&self, table_name: &str) -> OtsResult<DescribeTableResponse> {
        self.call(&DescribeTableRequest::new(table_name)).await
    }

    pub async fn get_row(&self, request: &GetRowRequest) -> OtsResult<GetRowResponse> {
        self.call(request).await
    }

    pub async fn put_row(&self, request: &PutRowRequest) -> OtsResult<CapacityUnit> {
        self.call(request).await
    }

    pub async fn update_row(&self, request: &UpdateRowRequest) -> OtsResult<CapacityUnit> {
        self.call(request).await
    }

    pub async fn delete_row(&self, request: &DeleteRowRequest) -> OtsResult<CapacityUnit> {
        self.call(request).await
    }

    pub async fn batch_get_row(&self, request: &BatchGetRowRequest) -> OtsResult<Vec<TableInBatchGetRowResponse>> {
        self.call(request).await
    }

    pub async fn batch_write_row(&self, request: &BatchWriteRowRequest) -> OtsResult<Vec<TableInBatchWriteRowResponse>> {
        self.call(request).await
    }

    pub async fn get_range(&self, request: &GetRangeRequest) -> OtsResult<GetRangeResponse> {
        self.call(request).await
    }

    /// Reads a range page by page until it is exhausted or `max_rows` rows
    /// were collected.
    ///
    /// The returned `consumed` is the sum over all pages. When the read stops
    /// early, `next_start_primary_key` is where a follow-up read resumes.
    pub async fn get_range_all(&self, request: &GetRangeRequest, max_rows: Option<usize>) -> OtsResult<GetRangeResponse> {
        let mut page = request.clone();
        let mut total = GetRangeResponse {
            consumed: CapacityUnit::default(),
            next_start_primary_key: None,
            rows: Vec::new(),
        };

        if max_rows == Some(0) {
            total.next_start_primary_key = Some(page.inclusive_start_primary_key);
            return Ok(total);
        }

        loop {
            if let Some(max) = max_rows {
                let remaining = i32::try_from(max - total.rows.len()).unwrap_or(i32::MAX);
                page.limit = Some(request.limit.map_or(remaining, |limit| limit.min(remaining)));
            }

            let response = self.call(&page).await?;
            total.consumed += response.consumed;
            total.rows.extend(response.rows);

            if let Some(max) = max_rows {
                if total.rows.len() >= max {
                    total.next_start_primary_key = match total.rows.get(max) {
                        Some(first_dropped) => Some(first_dropped.primary_key.clone()),
                        None => response.next_start_primary_key,
                    };
                    total.rows.truncate(max);
                    return Ok(total);
                }
            }

            match response.next_start_primary_key {
                Some(next_start) => {
                    debug!(
                        table = page.table_name.as_str(),
                        rows = total.rows.len();
                        "Range read continues on next page"
                    );
                    page.inclusive_start_primary_key = next_start;
                },
                None => return Ok(total),
            }
        }
    }

    fn default_deadline(&self) -> Option<Instant> {
        self.total_timeout.map(|timeout| Instant::now() + timeout)
    }

    async fn call_until<R: OtsRequest>(&self, request: &R, deadline: Option<Instant>) -> OtsResult<R::Response> {
        let body = request.encode()?;
        let response = self.execute(R::OPERATION, body, deadline).await?;
        Ok(R::decode(&response.body)?)
    }

    fn operation_url(&self, operation: Operation) -> Result<Url, ClientError> {
        let base = self.endpoint.as_str().trim_end_matches('/');
        Url::parse(&format!("{}{}", base, operation.path()))
            .map_err(|e| ClientError::InvalidConfig(format!("cannot build URL for {}: {}", operation, e)))
    }

    async fn send_once(&self, request: TransportRequest, deadline: Option<Instant>) -> Result<ResponseEnvelope, TransportError> {
        match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, self.transport.send(request))
                .await
                .unwrap_or_else(|_| Err(TransportError::Timeout("total timeout of the call elapsed".to_string()))),
            None => self.transport.send(request).await,
        }
    }

    async fn execute(&self, operation: Operation, body: Vec<u8>, deadline: Option<Instant>) -> OtsResult<ResponseEnvelope> {
        let uri = operation.path();
        let url = self.operation_url(operation)?;
        let mut state = RetryState::new(operation);

        loop {
            state.begin_attempt();
            let headers = request_headers(&self.signer, &self.instance_name, &uri, &body, Utc::now());
            debug!(
                operation = operation.name(),
                retry = state.attempt_count(),
                body_len = body.len();
                "Sending request"
            );

            let outcome = self
                .send_once(
                    TransportRequest {
                        url: url.clone(),
                        headers,
                        body: body.clone(),
                    },
                    deadline,
                )
                .await;

            let error = match classify(operation, &uri, &self.signer, outcome, Utc::now()) {
                Ok(response) => {
                    state.on_success();
                    self.log_success(operation, &response, state.attempt_count());
                    return Ok(response);
                },
                Err(error) => error,
            };

            match state.on_error(error, self.retry_policy.as_ref(), deadline) {
                RetryDecision::Retry(delay) => {
                    let last_error = state.last_error().map(ServiceError::to_string).unwrap_or_default();
                    warn!(
                        operation = operation.name(),
                        retry = state.attempt_count(),
                        delay_ms = delay.as_millis() as u64,
                        error:% = last_error;
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                },
                RetryDecision::Fail(error) => {
                    error!(
                        operation = operation.name(),
                        retries = state.attempt_count(),
                        error:% = error;
                        "Request failed"
                    );
                    return Err(error.into());
                },
            }
        }
    }

    fn log_success(&self, operation: Operation, response: &ResponseEnvelope, retries: u32) {
        let request_id = response.headers.get(REQUEST_ID_HEADER).map(String::as_str).unwrap_or_default();
        debug!(
            operation = operation.name(),
            request_id = request_id,
            retries = retries;
            "Request succeeded"
        );
        if operation.is_write() {
            info!(
                target: "audit",
                operation = operation.name(),
                instance = self.instance_name.as_str(),
                request_id = request_id;
                "Write operation applied"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use prost::Message;

    use super::*;
    use crate::codec::{ColumnMap, Direction, Row, RowExistence};
    use crate::config::{RetryConfig, RetryPolicyKind};
    use crate::error::{OtsError, ServiceErrorKind};
    use crate::protocol::Headers;
    use crate::protocol::headers::{CONTENT_MD5_HEADER, CONTENT_TYPE_HEADER, DATE_HEADER, content_md5, format_http_date};
    use crate::protocol::signer::{AUTHORIZATION_HEADER, SIGNATURE_HEADER};
    use crate::protocol::wire;
    use crate::retry::DefaultRetryPolicy;

    const ACCESS_ID: &str = "29j2NtzlUr8hjP8b";
    const ACCESS_KEY: &str = "8AKqXmNBkl85QK70cAOuH4bBd3gS0J";

    enum Reply {
        Ok(u16, Vec<u8>),
        Fail(TransportError),
    }

    /// Replays scripted replies, signing them like the service would.
    struct ScriptedTransport {
        signer: Signer,
        replies: Mutex<VecDeque<Reply>>,
        requests: Mutex<Vec<TransportRequest>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Reply>) -> Self {
            Self {
                signer: Signer::new(ACCESS_ID, ACCESS_KEY).unwrap(),
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<TransportRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl Transport for ScriptedTransport {
        async fn send(&self, request: TransportRequest) -> Result<ResponseEnvelope, TransportError> {
            let uri = request.url.path().to_string();
            self.requests.lock().unwrap().push(request);
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("no scripted reply left");

            let (status, body) = match reply {
                Reply::Ok(status, body) => (status, body),
                Reply::Fail(error) => return Err(error),
            };

            let mut headers = Headers::new();
            headers.insert(CONTENT_MD5_HEADER.into(), content_md5(&body));
            headers.insert(REQUEST_ID_HEADER.into(), "req-1".into());
            headers.insert(DATE_HEADER.into(), format_http_date(Utc::now()));
            headers.insert(CONTENT_TYPE_HEADER.into(), "protocol buffer".into());
            let signature = self.signer.response_signature(&uri, &headers);
            headers.insert(AUTHORIZATION_HEADER.into(), format!("OTS {}:{}", ACCESS_ID, signature));

            Ok(ResponseEnvelope {
                status,
                reason: String::new(),
                headers,
                body,
            })
        }
    }

    fn config(policy: RetryPolicyKind) -> ClientConfig {
        ClientConfig::new("http://naketest.ots.local", ACCESS_ID, ACCESS_KEY, "naketest")
            .with_retry(RetryConfig::policy(policy))
    }

    fn client(policy: RetryPolicyKind, replies: Vec<Reply>) -> OtsClient<ScriptedTransport> {
        OtsClient::with_transport(&config(policy), ScriptedTransport::new(replies)).unwrap()
    }

    fn error_body(code: &str) -> Vec<u8> {
        wire::Error {
            code: code.into(),
            message: Some("scripted".into()),
        }
        .encode_to_vec()
    }

    fn list_body(names: &[&str]) -> Vec<u8> {
        wire::ListTableResponse {
            table_names: names.iter().map(|n| n.to_string()).collect(),
        }
        .encode_to_vec()
    }

    fn network_failure() -> Reply {
        Reply::Fail(TransportError::Connect("connection reset by peer".into()))
    }

    #[tokio::test]
    async fn list_table_signs_and_decodes() {
        let client = client(RetryPolicyKind::Default, vec![Reply::Ok(200, list_body(&["a", "b"]))]);

        let tables = client.list_table().await.unwrap();
        assert_eq!(tables, vec!["a".to_string(), "b".to_string()]);

        let requests = client.transport().requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.url.as_str(), "http://naketest.ots.local/ListTable");
        assert_eq!(request.headers.get("x-ots-instancename").map(String::as_str), Some("naketest"));
        assert_eq!(request.headers.get("x-ots-accesskeyid").map(String::as_str), Some(ACCESS_ID));

        let mut unsigned = request.headers.clone();
        let signature = unsigned.remove(SIGNATURE_HEADER).unwrap();
        assert_eq!(signature, client.signer.request_signature("/ListTable", &unsigned));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_throttling_then_succeeds() {
        let client = client(
            RetryPolicyKind::Default,
            vec![
                Reply::Ok(503, error_body("OTSServerBusy")),
                Reply::Ok(503, error_body("OTSServerBusy")),
                Reply::Ok(200, list_body(&["t"])),
            ],
        );

        assert_eq!(client.list_table().await.unwrap(), vec!["t".to_string()]);
        assert_eq!(client.transport().requests().len(), 3);
    }

    #[tokio::test]
    async fn idempotent_network_failure_is_retried_until_exhausted() {
        let replies = (0..4).map(|_| network_failure()).collect();
        let client = client(RetryPolicyKind::NoDelay, replies);

        let err = client
            .get_row(&GetRowRequest::new("t", ColumnMap::new().with("id", 1)))
            .await
            .unwrap_err();

        let service = err.as_service().unwrap();
        assert_eq!(service.kind, ServiceErrorKind::Network);
        assert_eq!(service.operation, Operation::GetRow);
        // first attempt plus three retries
        assert_eq!(client.transport().requests().len(), 4);
    }

    #[tokio::test]
    async fn write_is_not_retried_after_network_failure() {
        let client = client(RetryPolicyKind::NoDelay, vec![network_failure()]);

        let request = PutRowRequest::new(
            "t",
            RowExistence::Ignore,
            ColumnMap::new().with("id", 1),
            ColumnMap::new().with("name", "x"),
        );
        let err = client.put_row(&request).await.unwrap_err();

        assert_eq!(err.as_service().unwrap().kind, ServiceErrorKind::Network);
        assert_eq!(client.transport().requests().len(), 1);
    }

    #[tokio::test]
    async fn service_error_is_surfaced_unchanged() {
        let client = client(RetryPolicyKind::Default, vec![Reply::Ok(404, error_body("OTSObjectNotExist"))]);

        let err = client.describe_table("missing").await.unwrap_err();
        let OtsError::Service(service) = err else {
            panic!("expected a service error, got {:?}", err);
        };
        assert_eq!(service.kind, ServiceErrorKind::Service);
        assert_eq!(service.code, "OTSObjectNotExist");
        assert_eq!(service.http_status, Some(404));
        assert_eq!(service.request_id, "req-1");
    }

    #[tokio::test]
    async fn unknown_operation_never_reaches_the_transport() {
        let client = client(RetryPolicyKind::Default, Vec::new());

        let err = client.call_raw("DropDatabase", Vec::new()).await.unwrap_err();
        assert_eq!(
            err,
            OtsError::Client(ClientError::UnsupportedOperation("DropDatabase".into()))
        );
        assert!(client.transport().requests().is_empty());
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_the_transport() {
        let client = client(RetryPolicyKind::Default, Vec::new());

        let err = client.delete_table("").await.unwrap_err();
        assert!(matches!(err, OtsError::Client(ClientError::InvalidArgument { .. })));
        assert!(client.transport().requests().is_empty());
    }

    #[tokio::test]
    async fn undecodable_success_body_is_a_client_error() {
        let client = client(RetryPolicyKind::Default, vec![Reply::Ok(200, vec![0xff, 0xff])]);

        let err = client.list_table().await.unwrap_err();
        assert!(matches!(err, OtsError::Client(ClientError::Decode { .. })));
        assert_eq!(client.transport().requests().len(), 1);
    }

    #[tokio::test]
    async fn dispatch_routes_by_operation() {
        let client = client(RetryPolicyKind::Default, vec![Reply::Ok(200, list_body(&["x"]))]);

        let response = client.dispatch(&Request::from(ListTableRequest)).await.unwrap();
        assert_eq!(response, Response::ListTable(vec!["x".to_string()]));
    }

    #[tokio::test]
    async fn deadline_stops_retrying() {
        let client = client(RetryPolicyKind::Default, vec![Reply::Ok(503, error_body("OTSServerBusy"))])
            .with_retry_policy(Arc::new(DefaultRetryPolicy::default()));

        // the first back-off is at least 250ms
        let deadline = Instant::now() + Duration::from_millis(50);
        let err = client.call_with_deadline(&ListTableRequest, deadline).await.unwrap_err();

        assert_eq!(err.as_service().unwrap().code, "OTSServerBusy");
        assert_eq!(client.transport().requests().len(), 1);
    }

    fn range_page(ids: &[i64], next: Option<i64>, read: i32) -> Vec<u8> {
        let rows = ids
            .iter()
            .map(|id| wire::Row {
                primary_key_columns: ColumnMap::new().with("id", *id).to_wire(),
                attribute_columns: ColumnMap::new().with("v", "x").to_wire(),
            })
            .collect();
        wire::GetRangeResponse {
            consumed: Some(wire::ConsumedCapacity {
                capacity_unit: Some(CapacityUnit::read_only(read).to_wire()),
            }),
            next_start_primary_key: next.map(|id| ColumnMap::new().with("id", id).to_wire()).unwrap_or_default(),
            rows,
        }
        .encode_to_vec()
    }

    fn range_request() -> GetRangeRequest {
        GetRangeRequest::new(
            "t",
            Direction::Forward,
            ColumnMap::new().with("id", 0),
            ColumnMap::new().with("id", 100),
        )
    }

    #[tokio::test]
    async fn get_range_all_follows_pages() {
        let client = client(
            RetryPolicyKind::Default,
            vec![
                Reply::Ok(200, range_page(&[1, 2], Some(3), 1)),
                Reply::Ok(200, range_page(&[3], None, 2)),
            ],
        );

        let all = client.get_range_all(&range_request(), None).await.unwrap();

        let ids: Vec<_> = all.rows.iter().map(|row: &Row| row.primary_key.to_string()).collect();
        assert_eq!(ids, vec!["{id: 1}", "{id: 2}", "{id: 3}"]);
        assert_eq!(all.consumed, CapacityUnit::read_only(3));
        assert_eq!(all.next_start_primary_key, None);

        let requests = client.transport().requests();
        assert_eq!(requests.len(), 2);
        let second = wire::GetRangeRequest::decode(requests[1].body.as_slice()).unwrap();
        assert_eq!(second.inclusive_start_primary_key, ColumnMap::new().with("id", 3).to_wire());
    }

    #[tokio::test]
    async fn get_range_all_stops_at_max_rows() {
        let client = client(RetryPolicyKind::Default, vec![Reply::Ok(200, range_page(&[1, 2, 3], Some(4), 1))]);

        let some = client.get_range_all(&range_request(), Some(2)).await.unwrap();

        assert_eq!(some.rows.len(), 2);
        assert_eq!(some.next_start_primary_key, Some(ColumnMap::new().with("id", 3)));

        let requests = client.transport().requests();
        let sent = wire::GetRangeRequest::decode(requests[0].body.as_slice()).unwrap();
        assert_eq!(sent.limit, Some(2));
    }

    #[test]
    fn bad_configuration_is_rejected() {
        let mut config = config(RetryPolicyKind::Default);
        config.endpoint = "ftp://nowhere".into();
        let result = OtsClient::with_transport(&config, ScriptedTransport::new(Vec::new()));
        assert!(matches!(result, Err(ClientError::InvalidConfig(_))));
    }
}
