use tracing::debug;

use evl_ledger::{Backup, Ledger, Observation, Precondition};

use crate::auth::CallerIdentity;
use crate::error::{ServiceError, ServiceResult};
use crate::message::{ObserveRequest, Request, Response};

/// Dispatches requests against one ledger.
#[derive(Clone, Debug)]
pub struct LedgerService {
    ledger: Ledger,
}

impl LedgerService {
    pub fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Serve one unary request.
    pub fn handle(
        &self,
        caller: Option<&CallerIdentity>,
        request: Request,
    ) -> ServiceResult<Response> {
        let caller = match (caller, request.is_anonymous()) {
            (Some(caller), _) => caller.name.as_str(),
            (None, true) => "anonymous",
            (None, false) => return Err(ServiceError::Unauthenticated),
        };
        debug!(caller, request = request.type_name(), "handling request");

        let ledger = &self.ledger;
        let response = match request {
            Request::Ping => Response::Pong,
            Request::Commit {
                events,
                preconditions,
            } => {
                let preconditions = preconditions
                    .into_iter()
                    .map(Precondition::try_from)
                    .collect::<Result<Vec<_>, _>>()?;
                Response::Committed {
                    events: ledger.commit(&events, &preconditions)?,
                }
            }
            Request::Stream { subject, options } => Response::Events {
                events: ledger.stream(&subject, &options)?,
            },
            Request::GetEvent { id } => Response::Event {
                event: ledger.event(id)?,
            },
            Request::GetStatus => Response::Status(ledger.status()?),
            Request::GetSubjects { base } => Response::Subjects {
                subjects: ledger.subjects(base.as_deref())?,
            },
            Request::GetTypes => Response::Types {
                types: ledger.event_types()?,
            },
            Request::CreateBackup { format } => Response::Backup {
                format,
                data: ledger.create_backup()?.encode(format)?,
            },
            Request::RestoreBackup { backup } => Response::Restored {
                count: ledger.restore_backup(backup)?,
            },
            Request::EraseSubject { subject } => Response::Erased {
                count: ledger.erase(&subject)?,
            },
            Request::Audit { scope } => Response::Audit(ledger.audit(&scope)?),
        };
        Ok(response)
    }

    /// Restore from an encoded backup, as produced by `CreateBackup`.
    pub fn restore_encoded(
        &self,
        caller: Option<&CallerIdentity>,
        bytes: &[u8],
    ) -> ServiceResult<Response> {
        if caller.is_none() {
            return Err(ServiceError::Unauthenticated);
        }
        let backup = Backup::decode(bytes)?;
        self.handle(caller, Request::RestoreBackup { backup })
    }

    /// Open a subscription. Must be called within a tokio runtime.
    pub fn observe(
        &self,
        caller: Option<&CallerIdentity>,
        request: ObserveRequest,
    ) -> ServiceResult<Observation> {
        let caller = caller.ok_or(ServiceError::Unauthenticated)?;
        debug!(caller = %caller, subject = %request.subject, "opening observation");
        Ok(self.ledger.observe(&request.subject, request.options)?)
    }
}
