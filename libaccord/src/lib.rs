// Copyright 2021 Cargill Incorporated
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A durable two-phase commit coordinator.
//!
//! The protocol itself lives in [`algorithm::two_phase_commit`] as synchronous state machines
//! for the coordinator and participant roles. The [`coordinator::Coordinator`] runs the
//! coordinator role over an async runtime: it fans requests out to participants through
//! [`links`], records every decision in a [`decision_log`] before announcing it, and retries
//! delivery until each participant acknowledges. [`RecoveryManager`] finishes what a previous
//! run left incomplete.

#[macro_use]
extern crate log;

#[cfg(feature = "coordinator")]
pub mod algorithm;
#[cfg(feature = "coordinator")]
pub mod coordinator;
#[cfg(feature = "coordinator")]
pub mod decision_log;
pub mod error;
#[cfg(feature = "coordinator")]
mod keyed;
#[cfg(feature = "coordinator")]
pub mod links;
mod message;
#[cfg(feature = "coordinator")]
pub mod participant;
#[cfg(feature = "coordinator")]
mod recovery;
#[cfg(feature = "coordinator")]
pub mod retry;
#[cfg(feature = "time")]
mod time;
mod transaction;

#[cfg(feature = "coordinator")]
pub use algorithm::Algorithm;
#[cfg(feature = "coordinator")]
pub use coordinator::{Coordinator, CoordinatorBuilder, FinalizeStatus, TransactionRequest};
pub use message::{IdempotencyKey, Phase};
#[cfg(feature = "coordinator")]
pub use recovery::{RecoveryManager, RecoveryReport};
#[cfg(feature = "time")]
pub use time::{ManualTimeSource, SystemTimeSource, TimeSource};
pub use transaction::{
    Acknowledgment, Decision, DecisionRecord, ParticipantId, ParticipantRef, TransactionId,
    TransactionStatus, Vote, VoteValue, MAX_TRANSACTION_ID_LEN,
};
