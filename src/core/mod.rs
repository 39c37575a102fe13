/*!
 * Workload driver: worker threads, shared run state, and stop signalling
 */

pub mod hammer;
pub mod run_state;
pub mod stop;

pub use hammer::{Hammer, HammerLimits, HammerResult};
pub use run_state::{Failure, Registered, RunState};
pub use stop::{StopHandle, StopReason, StopSignal};
