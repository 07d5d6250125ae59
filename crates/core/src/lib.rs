// SPDX-License-Identifier: MIT

//! Domain types shared by every crate in the squad execution core:
//! identifiers, the event and execution data model, the agent capability
//! boundary, and the error taxonomy they're all built on.

pub mod agent;
pub mod clock;
pub mod error;
pub mod event;
pub mod event_log;
pub mod execution;
pub mod id;
pub mod ids;
#[macro_use]
mod macros;
pub mod lease;
pub mod retry;
pub mod status;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use agent::{Agent, AgentContext, AgentHandle, AgentRole, History, Message, Response};
pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use event::{AgentEvent, AgentEventDraft, EventKind};
pub use event_log::EventLog;
pub use execution::{Execution, ExecutionError, StepRecord};
pub use ids::{EventId, ExecutionId, OrgId, SquadId, StepName, SubscriptionId, TaskId, WorkerId};
pub use lease::Lease;
pub use retry::{RetryPolicy, StepRetryPolicy};
pub use status::{ExecutionStatus, StepOutcome};
