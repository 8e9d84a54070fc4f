//! HTTP binding of [`SyncTransport`].
//!
//! Requests are CBOR-encoded and POSTed to fixed endpoint paths; the
//! carrier itself is abstracted behind [`HttpClient`] so the crate stays
//! free of a specific HTTP stack. Status mapping follows the protocol
//! contract: 200 carries the success body, 409 a bare version conflict,
//! 403 a credential failure; everything else is a server error.

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use casebook_model::{Drawing, Event, Note, Record};
use casebook_protocol::{
    from_cbor, to_cbor, BatchSaveRequest, BatchSaveResult, PullRequest, PullResponse,
    ResolveConflictRequest, ResolveConflictResponse, ResolveRecordRequest, ResolveRecordResponse,
    UpdateRecordRequest, UpsertDrawingRequest, UpsertEventRequest, UpsertNoteRequest,
    UpsertOutcome,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A raw HTTP response: status plus body bytes.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

/// The carrier seam: one POST, bytes in, bytes out.
pub trait HttpClient: Send + Sync {
    /// POSTs a CBOR body to a path under the server root.
    fn post(&self, path: &str, body: &[u8]) -> SyncResult<HttpResponse>;

    /// Whether the carrier currently believes it can reach the server.
    fn is_connected(&self) -> bool {
        true
    }
}

/// [`SyncTransport`] over any [`HttpClient`].
pub struct HttpTransport<C> {
    client: C,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Wraps a client.
    pub fn new(client: C) -> Self {
        Self { client }
    }

    fn call<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        path: &str,
        request: &Req,
    ) -> SyncResult<Resp> {
        let response = self.client.post(path, &to_cbor(request)?)?;
        match response.status {
            200 => Ok(from_cbor(&response.body)?),
            status => Err(status_error(status, &response.body)),
        }
    }

    /// Upsert calls additionally accept a bare conflict riding a 409.
    fn upsert<Req: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        request: &Req,
    ) -> SyncResult<UpsertOutcome<T>> {
        let response = self.client.post(path, &to_cbor(request)?)?;
        match response.status {
            200 => Ok(from_cbor(&response.body)?),
            409 => Ok(UpsertOutcome::Conflict(from_cbor(&response.body)?)),
            status => Err(status_error(status, &response.body)),
        }
    }
}

fn status_error(status: u16, body: &[u8]) -> SyncError {
    let message = String::from_utf8_lossy(body).into_owned();
    match status {
        403 => SyncError::Forbidden(message),
        _ => SyncError::Server { status, message },
    }
}

impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        self.call("/sync/pull", request)
    }

    fn resolve_record(&self, request: &ResolveRecordRequest) -> SyncResult<ResolveRecordResponse> {
        self.call("/records/resolve", request)
    }

    fn update_record(&self, request: &UpdateRecordRequest) -> SyncResult<UpsertOutcome<Record>> {
        self.upsert("/records/update", request)
    }

    fn upsert_event(&self, request: &UpsertEventRequest) -> SyncResult<UpsertOutcome<Event>> {
        self.upsert("/events/upsert", request)
    }

    fn upsert_note(&self, request: &UpsertNoteRequest) -> SyncResult<UpsertOutcome<Note>> {
        self.upsert("/notes/upsert", request)
    }

    fn upsert_drawing(
        &self,
        request: &UpsertDrawingRequest,
    ) -> SyncResult<UpsertOutcome<Drawing>> {
        self.upsert("/drawings/upsert", request)
    }

    fn batch_save(&self, request: &BatchSaveRequest) -> SyncResult<BatchSaveResult> {
        self.call("/batch/save", request)
    }

    fn resolve_conflict(
        &self,
        request: &ResolveConflictRequest,
    ) -> SyncResult<ResolveConflictResponse> {
        self.call("/conflicts/resolve", request)
    }

    fn is_connected(&self) -> bool {
        self.client.is_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casebook_model::{DeviceId, RecordId, Version};
    use casebook_protocol::{DeviceCredentials, VersionConflict};
    use parking_lot::Mutex;

    struct FakeClient {
        responses: Mutex<Vec<(String, HttpResponse)>>,
        paths: Mutex<Vec<String>>,
    }

    impl FakeClient {
        fn new() -> Self {
            Self {
                responses: Mutex::new(Vec::new()),
                paths: Mutex::new(Vec::new()),
            }
        }

        fn respond(&self, path: &str, status: u16, body: Vec<u8>) {
            self.responses
                .lock()
                .push((path.to_string(), HttpResponse { status, body }));
        }
    }

    impl HttpClient for &FakeClient {
        fn post(&self, path: &str, _body: &[u8]) -> SyncResult<HttpResponse> {
            self.paths.lock().push(path.to_string());
            let mut responses = self.responses.lock();
            let position = responses
                .iter()
                .position(|(p, _)| p == path)
                .ok_or_else(|| SyncError::transport(format!("no response for {path}")))?;
            Ok(responses.remove(position).1)
        }
    }

    fn creds() -> DeviceCredentials {
        DeviceCredentials::new(DeviceId::new(), Vec::new())
    }

    #[test]
    fn pull_decodes_a_200_body() {
        let client = FakeClient::new();
        let page = PullResponse {
            rows: vec![],
            new_cursor: 3,
            has_more: false,
        };
        client.respond("/sync/pull", 200, to_cbor(&page).unwrap());

        let transport = HttpTransport::new(&client);
        let response = transport
            .pull(&PullRequest {
                credentials: creds(),
                cursor: 0,
                limit: 10,
            })
            .unwrap();
        assert_eq!(response, page);
        assert_eq!(client.paths.lock().as_slice(), ["/sync/pull"]);
    }

    #[test]
    fn upsert_maps_409_to_a_conflict_outcome() {
        let client = FakeClient::new();
        let record_id = RecordId::new();
        let conflict: VersionConflict<Note> = VersionConflict {
            server_version: Version::new(4),
            server_entity: Note::new(record_id, vec![]),
        };
        client.respond("/notes/upsert", 409, to_cbor(&conflict).unwrap());

        let transport = HttpTransport::new(&client);
        let outcome = transport
            .upsert_note(&UpsertNoteRequest {
                credentials: creds(),
                record_id,
                pages: vec![],
                expected_version: Some(Version::FIRST),
            })
            .unwrap();
        assert_eq!(outcome.into_conflict().unwrap(), conflict);
    }

    #[test]
    fn status_403_becomes_forbidden() {
        let client = FakeClient::new();
        client.respond("/sync/pull", 403, b"bad token".to_vec());

        let transport = HttpTransport::new(&client);
        let err = transport
            .pull(&PullRequest {
                credentials: creds(),
                cursor: 0,
                limit: 10,
            })
            .unwrap_err();
        assert!(matches!(err, SyncError::Forbidden(m) if m == "bad token"));
    }

    #[test]
    fn status_500_is_a_retryable_server_error() {
        let client = FakeClient::new();
        client.respond("/sync/pull", 500, b"boom".to_vec());

        let transport = HttpTransport::new(&client);
        let err = transport
            .pull(&PullRequest {
                credentials: creds(),
                cursor: 0,
                limit: 10,
            })
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
