//! Defines the Component trait implemented by each stage of the focus
//! pipeline. Every stage takes the previous stage's output, does one step of
//! work, and hands its result to the next stage. Stages run in order on the
//! caller's thread, once per tick.

use std::fmt;

///
/// A stage in the focus pipeline: acquisition, scoring, or readiness. All
/// structs that perform a processing step must implement Component so that
/// [`crate::pipeline::FocusPipeline`] can drive them and name them in its
/// logs.
///
pub trait Component: fmt::Display {
    /// What the stage consumes.
    type InData;
    /// What the stage produces.
    type OutData;

    /// Converts an input of type InData into an output of type OutData
    fn convert(&mut self, input: Self::InData) -> Self::OutData;

    /// Releases whatever the stage holds at the end of the pipeline
    fn finalize(&mut self);
}
