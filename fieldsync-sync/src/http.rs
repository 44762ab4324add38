//! HTTP remote record store.
//!
//! Wire contract, relative to the partition's endpoint:
//!
//! | call     | request                               | success body     |
//! |----------|---------------------------------------|------------------|
//! | `list`   | `GET /records?since=<rfc3339>`        | `[Record, ...]`  |
//! | `upsert` | `PUT /records` with a `Record` body   | `{"id": "..."}`  |
//! | `delete` | `DELETE /records/<id>`                | ignored          |
//!
//! Every request carries `X-Partition: <partition>`. A response whose own
//! `X-Partition` header names another partition fails with
//! [`RemoteError::PartitionMismatch`].

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

use fieldsync_core::{PartitionId, Record, RemoteId};

use crate::error::RemoteError;
use crate::store::RemoteStore;

pub const PARTITION_HEADER: &str = "X-Partition";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct UpsertResponse {
    id: RemoteId,
}

#[derive(Debug, Clone)]
pub struct HttpRemote {
    agent: ureq::Agent,
    endpoint: String,
    partition: PartitionId,
}

impl HttpRemote {
    pub fn new(partition: PartitionId, endpoint: &str) -> Self {
        Self::with_timeout(partition, endpoint, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(partition: PartitionId, endpoint: &str, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            partition,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn check_partition(&self, response: &ureq::Response) -> Result<(), RemoteError> {
        match response.header(PARTITION_HEADER) {
            Some(served) if served != self.partition.as_str() => {
                Err(RemoteError::PartitionMismatch(PartitionId::from(served)))
            }
            _ => Ok(()),
        }
    }

    /// Send `request`, mapping failures onto [`RemoteError`].
    ///
    /// `ok_statuses` are error statuses the caller treats as success.
    fn send(
        &self,
        request: ureq::Request,
        body: Option<&Record>,
        ok_statuses: &[u16],
    ) -> Result<ureq::Response, RemoteError> {
        let request = request.set(PARTITION_HEADER, self.partition.as_str());
        let result = match body {
            Some(record) => request.send_json(record),
            None => request.call(),
        };
        match result {
            Ok(response) => {
                self.check_partition(&response)?;
                Ok(response)
            }
            Err(ureq::Error::Status(code, response)) => {
                self.check_partition(&response)?;
                if ok_statuses.contains(&code) {
                    return Ok(response);
                }
                Err(classify_status(code))
            }
            Err(ureq::Error::Transport(transport)) => {
                Err(RemoteError::Transient(transport.to_string()))
            }
        }
    }
}

/// 5xx and 429 are worth retrying; any other failure status is final.
fn classify_status(code: u16) -> RemoteError {
    if code >= 500 || code == 429 {
        RemoteError::Transient(format!("HTTP {code}"))
    } else {
        RemoteError::Rejected(format!("HTTP {code}"))
    }
}

fn invalid_body(err: std::io::Error) -> RemoteError {
    RemoteError::Rejected(format!("invalid response body: {err}"))
}

impl RemoteStore for HttpRemote {
    fn partition(&self) -> &PartitionId {
        &self.partition
    }

    fn list(&mut self, since: DateTime<Utc>) -> Result<Vec<Record>, RemoteError> {
        let url = format!("{}/records", self.endpoint);
        let request = self
            .agent
            .get(&url)
            .query("since", &since.to_rfc3339_opts(SecondsFormat::Millis, true));
        self.send(request, None, &[])?
            .into_json::<Vec<Record>>()
            .map_err(invalid_body)
    }

    fn upsert(&mut self, record: &Record) -> Result<RemoteId, RemoteError> {
        let url = format!("{}/records", self.endpoint);
        let request = self.agent.put(&url);
        let response = self.send(request, Some(record), &[])?;
        Ok(response
            .into_json::<UpsertResponse>()
            .map_err(invalid_body)?
            .id)
    }

    fn delete(&mut self, id: &RemoteId) -> Result<(), RemoteError> {
        let url = format!("{}/records/{}", self.endpoint, id);
        let request = self.agent.delete(&url);
        self.send(request, None, &[404])?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
