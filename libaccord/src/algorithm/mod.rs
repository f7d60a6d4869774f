// Copyright 2021-2022 Cargill Incorporated
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

//! Protocol state machines.
//!
//! An algorithm performs no I/O. It receives an event along with the current context and returns
//! the list of actions the caller must perform, in order. Persisting an updated context, sending
//! a message, or appending to the decision log are all actions; the caller owns the side effects
//! and feeds their results back in as further events.

pub mod two_phase_commit;

use crate::error::AlgorithmError;

pub trait Algorithm {
    type Event;
    type Action;
    type Context;

    fn event(
        &self,
        event: Self::Event,
        context: Self::Context,
    ) -> Result<Vec<Self::Action>, AlgorithmError>;
}
