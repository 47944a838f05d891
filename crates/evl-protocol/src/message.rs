use serde::{Deserialize, Serialize};

use evl_ledger::{
    AuditReport, AuditScope, Backup, BackupFormat, LedgerStatus, ObserveOptions, RawPrecondition,
    StreamOptions,
};
use evl_types::{Event, EventInput};

use crate::error::ServiceError;

/// Unary ledger operations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Request {
    Ping,
    Commit {
        events: Vec<EventInput>,
        #[serde(default)]
        preconditions: Vec<RawPrecondition>,
    },
    Stream {
        subject: String,
        #[serde(default)]
        options: StreamOptions,
    },
    GetEvent {
        id: u64,
    },
    GetStatus,
    GetSubjects {
        #[serde(default)]
        base: Option<String>,
    },
    GetTypes,
    CreateBackup {
        #[serde(default)]
        format: BackupFormat,
    },
    RestoreBackup {
        backup: Backup,
    },
    EraseSubject {
        subject: String,
    },
    Audit {
        scope: AuditScope,
    },
}

impl Request {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Ping => "Ping",
            Self::Commit { .. } => "Commit",
            Self::Stream { .. } => "Stream",
            Self::GetEvent { .. } => "GetEvent",
            Self::GetStatus => "GetStatus",
            Self::GetSubjects { .. } => "GetSubjects",
            Self::GetTypes => "GetTypes",
            Self::CreateBackup { .. } => "CreateBackup",
            Self::RestoreBackup { .. } => "RestoreBackup",
            Self::EraseSubject { .. } => "EraseSubject",
            Self::Audit { .. } => "Audit",
        }
    }

    /// Whether the request may be served without a caller identity.
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Ping)
    }
}

/// The server-push operation: opens a subscription instead of returning a
/// single response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObserveRequest {
    pub subject: String,
    #[serde(default)]
    pub options: ObserveOptions,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Response {
    Pong,
    Committed { events: Vec<Event> },
    Events { events: Vec<Event> },
    Event { event: Event },
    Status(LedgerStatus),
    Subjects { subjects: Vec<String> },
    Types { types: Vec<String> },
    /// The encoded backup, in the requested format.
    Backup { format: BackupFormat, data: Vec<u8> },
    Restored { count: u64 },
    Erased { count: u64 },
    Audit(AuditReport),
}

/// Error shape for transports that send failures as data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl From<&ServiceError> for ErrorBody {
    fn from(err: &ServiceError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn commit_request_wire_shape() {
        let request: Request = serde_json::from_value(json!({
            "type": "Commit",
            "payload": {
                "events": [{"source": "s", "subject": "/a", "type": "t", "data": {"k": 1}}],
                "preconditions": [{"type": "isSubjectPristine", "payload": {"subject": "/a"}}]
            }
        }))
        .unwrap();
        match request {
            Request::Commit { events, preconditions } => {
                assert_eq!(events[0].subject, "/a");
                assert_eq!(preconditions[0].kind, "isSubjectPristine");
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn unit_requests_need_no_payload() {
        let request: Request = serde_json::from_value(json!({"type": "GetStatus"})).unwrap();
        assert_eq!(request, Request::GetStatus);
        assert!(!request.is_anonymous());
        assert!(Request::Ping.is_anonymous());
    }

    #[test]
    fn stream_options_default_when_absent() {
        let request: Request =
            serde_json::from_value(json!({"type": "Stream", "payload": {"subject": "/s"}})).unwrap();
        assert_eq!(
            request,
            Request::Stream {
                subject: "/s".into(),
                options: StreamOptions::default()
            }
        );
        assert_eq!(request.type_name(), "Stream");
    }

    #[test]
    fn error_body_carries_code() {
        let body = ErrorBody::from(&ServiceError::Unauthenticated);
        assert_eq!(body.code, "UNAUTHENTICATED");
    }
}
