//! Single-consumer attendance engine.
//!
//! One tokio task owns the presence engine (roster + ledger) and the
//! enrollment manager, and drains a request channel. That task is the
//! single admission point: concurrent ingest calls for the same id
//! resolve to exactly one check-in, and an enrollment's uniqueness check
//! cannot interleave with another enrollment's commit. D-Bus handlers
//! hold a clone-safe [`EngineHandle`].

use rollcall_core::enroll::EnrollmentRequest;
use rollcall_core::projector::{self, LiveView, StatusFilter};
use rollcall_core::types::RosterEntry;
use rollcall_core::{Admission, PresenceEngine, PresenceEvent};
use rollcall_store::{EnrollError, EnrollmentManager, StoreError, StudentWithImages};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine task exited")]
    ChannelClosed,
}

/// Aggregate counters for the status surface.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EngineStats {
    pub total: usize,
    pub present: usize,
    pub auto_enroll: bool,
}

/// Messages sent from D-Bus handlers to the engine task.
enum EngineRequest {
    Push {
        event: PresenceEvent,
        reply: oneshot::Sender<Admission>,
    },
    Enroll {
        request: EnrollmentRequest,
        reply: oneshot::Sender<Result<String, EnrollError>>,
    },
    Project {
        query: String,
        filter: StatusFilter,
        reply: oneshot::Sender<LiveView>,
    },
    ListStudents {
        reply: oneshot::Sender<Result<Vec<StudentWithImages>, StoreError>>,
    },
    GetStudent {
        student_id: String,
        reply: oneshot::Sender<Result<Option<StudentWithImages>, StoreError>>,
    },
    Stats {
        reply: oneshot::Sender<EngineStats>,
    },
}

/// Clone-safe handle to the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Admit one recognized-identity event.
    pub async fn push(&self, event: PresenceEvent) -> Result<Admission, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Push {
                event,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Run one enrollment transaction.
    pub async fn enroll(
        &self,
        request: EnrollmentRequest,
    ) -> Result<Result<String, EnrollError>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Enroll {
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Project the current ledger for display.
    pub async fn project(
        &self,
        query: String,
        filter: StatusFilter,
    ) -> Result<LiveView, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Project {
                query,
                filter,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    pub async fn list_students(&self) -> Result<Result<Vec<StudentWithImages>, StoreError>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::ListStudents { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    pub async fn get_student(
        &self,
        student_id: String,
    ) -> Result<Result<Option<StudentWithImages>, StoreError>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::GetStudent {
                student_id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    pub async fn stats(&self) -> Result<EngineStats, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Stats { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine task and return its handle.
pub fn spawn_engine(mut presence: PresenceEngine, manager: EnrollmentManager) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    tokio::spawn(async move {
        tracing::info!(
            roster = presence.total(),
            policy = ?presence.policy(),
            "engine task started"
        );
        while let Some(req) = rx.recv().await {
            match req {
                EngineRequest::Push { event, reply } => {
                    let _ = reply.send(presence.push(event));
                }
                EngineRequest::Enroll { request, reply } => {
                    let entry = RosterEntry {
                        id: request.student_id.clone(),
                        name: request.full_name.clone(),
                        email: request.school_email.clone(),
                    };
                    let result = manager.enroll(request).await;
                    if result.is_ok() {
                        // Durably enrolled students join the session roster.
                        presence.upsert_roster(entry);
                    }
                    let _ = reply.send(result);
                }
                EngineRequest::Project {
                    query,
                    filter,
                    reply,
                } => {
                    let records = projector::project(presence.ledger(), &query, filter);
                    let _ = reply.send(LiveView {
                        total: presence.total(),
                        present: presence.present_count(),
                        records,
                    });
                }
                EngineRequest::ListStudents { reply } => {
                    let _ = reply.send(manager.database().list_students().await);
                }
                EngineRequest::GetStudent { student_id, reply } => {
                    let _ = reply.send(manager.database().get_student(&student_id).await);
                }
                EngineRequest::Stats { reply } => {
                    let _ = reply.send(EngineStats {
                        total: presence.total(),
                        present: presence.present_count(),
                        auto_enroll: presence.policy() == rollcall_core::EnrollPolicy::AutoEnroll,
                    });
                }
            }
        }
        tracing::info!("engine task exiting");
    });

    EngineHandle { tx }
}
