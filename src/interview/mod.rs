//! Interview engine: sessions, templating, actions, and the state machine
//! that ties them together.

pub mod actions;
pub mod interpreter;
pub mod next_step;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod template;

pub use actions::{ActionExecutor, ActionReport};
pub use interpreter::{AbortOutcome, IgnoreReason, Interviewer, StartOutcome, SubmitOutcome};
pub use next_step::{Destination, next_question};
pub use scheduler::PurgeScheduler;
pub use session::{Answer, Session, SessionPhase};
pub use store::{InMemorySessionStore, SessionStore, StoreConflict};
pub use template::Resolved;
