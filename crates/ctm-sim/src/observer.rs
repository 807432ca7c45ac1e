//! Hooks for watching a run.

use ctm_core::SimTime;
use ctm_flow::{FlowModel, StepReport};

/// Callbacks invoked by [`Sim::run`][crate::Sim::run] and friends.
///
/// Every method defaults to doing nothing.
///
/// # Example: vehicle count printer
///
/// ```rust,ignore
/// struct Printer;
///
/// impl SimObserver for Printer {
///     fn on_step_end(&mut self, time: SimTime, report: &StepReport, _flow: &FlowModel) {
///         println!("{time}: {:.1} vehicles", report.total_veh);
///     }
/// }
/// ```
pub trait SimObserver {
    /// Called after every flow-model step, once the whole network has moved.
    ///
    /// `time` is the end of the step, the instant the state in `flow`
    /// describes.
    fn on_step_end(&mut self, _time: SimTime, _report: &StepReport, _flow: &FlowModel) {}

    /// Called once when [`Sim::run`][crate::Sim::run] reaches the end time.
    fn on_sim_end(&mut self, _end: SimTime, _flow: &FlowModel) {}
}

/// Ignores every callback.
pub struct NoopObserver;

impl SimObserver for NoopObserver {}
