// Copyright (c) 2025 - Cowboy AI, Inc.
//! Persisted event type names
//!
//! Requests are named `<NOUN>_<VERB>` (`WORKER_CREATE`), outcomes
//! `<NOUN>_<VERB_PAST>` (`WORKER_CREATED`) and `<NOUN>_<VERB>_FAILED`
//! (`WORKER_CREATE_FAILED`). The processor registry keys on these names, so
//! the string forms below are part of the persisted format and must not
//! drift.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! event_types {
    ($( $request:ident = $request_name:literal => $done:ident = $done_name:literal, $failed:ident = $failed_name:literal; )*) => {
        /// Every event type the fabric records
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum EventType {
            $(
                #[serde(rename = $request_name)]
                $request,
                #[serde(rename = $done_name)]
                $done,
                #[serde(rename = $failed_name)]
                $failed,
            )*
        }

        impl EventType {
            /// Request types, each of which may have a processor installed
            pub const REQUESTS: &'static [EventType] = &[$(EventType::$request,)*];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(
                        EventType::$request => $request_name,
                        EventType::$done => $done_name,
                        EventType::$failed => $failed_name,
                    )*
                }
            }

            /// Outcome recorded when a request completes; `None` for outcomes
            pub fn completed(&self) -> Option<EventType> {
                match self {
                    $(EventType::$request => Some(EventType::$done),)*
                    _ => None,
                }
            }

            /// Outcome recorded when a request is aborted; `None` for outcomes
            pub fn failed(&self) -> Option<EventType> {
                match self {
                    $(EventType::$request => Some(EventType::$failed),)*
                    _ => None,
                }
            }
        }

        impl FromStr for EventType {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(
                        $request_name => Ok(EventType::$request),
                        $done_name => Ok(EventType::$done),
                        $failed_name => Ok(EventType::$failed),
                    )*
                    other => Err(format!("unknown event type: {other}")),
                }
            }
        }
    };
}

event_types! {
    WorkerCreate = "WORKER_CREATE" => WorkerCreated = "WORKER_CREATED", WorkerCreateFailed = "WORKER_CREATE_FAILED";
    WorkerDelete = "WORKER_DELETE" => WorkerDeleted = "WORKER_DELETED", WorkerDeleteFailed = "WORKER_DELETE_FAILED";
    WorkerStart = "WORKER_START" => WorkerStarted = "WORKER_STARTED", WorkerStartFailed = "WORKER_START_FAILED";
    WorkerTerminate = "WORKER_TERMINATE" => WorkerTerminated = "WORKER_TERMINATED", WorkerTerminateFailed = "WORKER_TERMINATE_FAILED";
    WorkerImageCreate = "WORKER_IMAGE_CREATE" => WorkerImageCreated = "WORKER_IMAGE_CREATED", WorkerImageCreateFailed = "WORKER_IMAGE_CREATE_FAILED";
    NodeAssignWorker = "NODE_ASSIGN_WORKER" => NodeWorkerAssigned = "NODE_WORKER_ASSIGNED", NodeAssignWorkerFailed = "NODE_ASSIGN_WORKER_FAILED";
    NodeUnassignWorker = "NODE_UNASSIGN_WORKER" => NodeWorkerUnassigned = "NODE_WORKER_UNASSIGNED", NodeUnassignWorkerFailed = "NODE_UNASSIGN_WORKER_FAILED";
    NodeCreateFiber = "NODE_CREATE_FIBER" => NodeFiberCreated = "NODE_FIBER_CREATED", NodeCreateFiberFailed = "NODE_CREATE_FIBER_FAILED";
    NodeUpdateFiber = "NODE_UPDATE_FIBER" => NodeFiberUpdated = "NODE_FIBER_UPDATED", NodeUpdateFiberFailed = "NODE_UPDATE_FIBER_FAILED";
    NodeDeleteFiber = "NODE_DELETE_FIBER" => NodeFiberDeleted = "NODE_FIBER_DELETED", NodeDeleteFiberFailed = "NODE_DELETE_FIBER_FAILED";
    ZoneCreate = "ZONE_CREATE" => ZoneCreated = "ZONE_CREATED", ZoneCreateFailed = "ZONE_CREATE_FAILED";
    ZoneDelete = "ZONE_DELETE" => ZoneDeleted = "ZONE_DELETED", ZoneDeleteFailed = "ZONE_DELETE_FAILED";
    PortalCreate = "PORTAL_CREATE" => PortalCreated = "PORTAL_CREATED", PortalCreateFailed = "PORTAL_CREATE_FAILED";
    PortalUpdate = "PORTAL_UPDATE" => PortalUpdated = "PORTAL_UPDATED", PortalUpdateFailed = "PORTAL_UPDATE_FAILED";
    TransponderCreate = "TRANSPONDER_CREATE" => TransponderCreated = "TRANSPONDER_CREATED", TransponderCreateFailed = "TRANSPONDER_CREATE_FAILED";
    TransponderUpdate = "TRANSPONDER_UPDATE" => TransponderUpdated = "TRANSPONDER_UPDATED", TransponderUpdateFailed = "TRANSPONDER_UPDATE_FAILED";
    TransponderDelete = "TRANSPONDER_DELETE" => TransponderDeleted = "TRANSPONDER_DELETED", TransponderDeleteFailed = "TRANSPONDER_DELETE_FAILED";
    // "reset" has no distinct past tense, so the outcome carries _COMPLETED
    SystemReset = "SYSTEM_RESET" => SystemResetCompleted = "SYSTEM_RESET_COMPLETED", SystemResetFailed = "SYSTEM_RESET_FAILED";
}

impl EventType {
    pub fn is_request(&self) -> bool {
        self.completed().is_some()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
