//! Alert engines and the background workers that turn inference results
//! into alert events.

mod engines;
mod polling;
mod store;
mod tracker;

pub use engines::AlertEngineService;
pub use polling::{PollingKey, PollingManager, StartOutcome};
pub use store::{AlertEngineStore, AlertEventStore};
pub use tracker::{AlertTracker, Transition};

#[cfg(test)]
pub(crate) use polling::fakes;
#[cfg(test)]
pub(crate) use store::memory;
