//! Ordered, named pass lists that freeze once assembled

use std::fmt;

use itertools::Itertools;
use thiserror::Error;
use tracing::{debug, trace};

use crate::compiler::CompilerState;
use crate::executor::{self, RunReport};
use crate::optimization::{Pass, PassDescriptor, PassError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline `{pipeline}` has no pass named `{anchor}`")]
    UnknownAnchor { pipeline: String, anchor: String },

    #[error("pipeline `{pipeline}` already contains a pass named `{name}`")]
    DuplicateName { pipeline: String, name: &'static str },

    #[error("pipeline `{pipeline}` is finalized and can no longer be modified")]
    PipelineFinalized { pipeline: String },

    #[error("pipeline `{pipeline}` must be finalized before it can run")]
    NotFinalized { pipeline: String },

    #[error("pass `{pass}` failed in pipeline `{pipeline}`: {source}")]
    PassExecutionFailure {
        pipeline: String,
        pass: &'static str,
        #[source]
        source: PassError,
    },
}

/// `Building` accepts new passes; `Finalized` is frozen for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Building,
    Finalized,
}

pub(crate) struct PassEntry {
    pub(crate) descriptor: PassDescriptor,
    pub(crate) pass: Box<dyn Pass>,
}

enum Placement<'a> {
    End,
    After(&'a str),
    Before(&'a str),
}

/// Pass manager for one compiler configuration.
///
/// Passes run in insertion order. Relative insertion is the only way to order
/// a pass against the ones already present.
pub struct Pipeline {
    name: String,
    passes: Vec<PassEntry>,
    state: PipelineState,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passes: Vec::new(),
            state: PipelineState::Building,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn is_finalized(&self) -> bool {
        self.state == PipelineState::Finalized
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Pass names in execution order
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|entry| entry.descriptor.name).collect()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &PassDescriptor> + '_ {
        self.passes.iter().map(|entry| &entry.descriptor)
    }

    /// Append a pass at the end
    pub fn add_pass<P: Pass + 'static>(&mut self, pass: P) -> Result<(), PipelineError> {
        self.insert(Box::new(pass), Placement::End)
    }

    /// Insert a pass immediately after the pass named `anchor`
    pub fn add_pass_after<P: Pass + 'static>(
        &mut self,
        pass: P,
        anchor: &str,
    ) -> Result<(), PipelineError> {
        self.insert(Box::new(pass), Placement::After(anchor))
    }

    /// Insert a pass immediately before the pass named `anchor`
    pub fn add_pass_before<P: Pass + 'static>(
        &mut self,
        pass: P,
        anchor: &str,
    ) -> Result<(), PipelineError> {
        self.insert(Box::new(pass), Placement::Before(anchor))
    }

    /// Freeze the pass list. Calling this again has no effect.
    pub fn finalize(&mut self) {
        if self.is_finalized() {
            return;
        }
        self.state = PipelineState::Finalized;
        debug!(
            pipeline = %self.name,
            passes = %self.pass_names().iter().join(", "),
            "pipeline finalized"
        );
    }

    /// Run every pass in order over `state`.
    ///
    /// The first failing pass aborts the run. Mutations made by earlier passes
    /// stay in `state`; the pipeline itself remains usable.
    pub fn run(&self, state: &mut CompilerState) -> Result<RunReport, PipelineError> {
        executor::execute(self, state)
    }

    pub(crate) fn entries(&self) -> &[PassEntry] {
        &self.passes
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.passes
            .iter()
            .position(|entry| entry.descriptor.name == name)
    }

    fn insert(&mut self, pass: Box<dyn Pass>, placement: Placement<'_>) -> Result<(), PipelineError> {
        if self.is_finalized() {
            return Err(PipelineError::PipelineFinalized {
                pipeline: self.name.clone(),
            });
        }

        let descriptor = pass.descriptor();
        if self.contains(descriptor.name) {
            return Err(PipelineError::DuplicateName {
                pipeline: self.name.clone(),
                name: descriptor.name,
            });
        }

        let index = match placement {
            Placement::End => self.passes.len(),
            Placement::After(anchor) => self.anchor(anchor)? + 1,
            Placement::Before(anchor) => self.anchor(anchor)?,
        };

        trace!(pipeline = %self.name, pass = descriptor.name, index, "inserting pass");
        self.passes.insert(index, PassEntry { descriptor, pass });
        Ok(())
    }

    fn anchor(&self, anchor: &str) -> Result<usize, PipelineError> {
        self.position(anchor)
            .ok_or_else(|| PipelineError::UnknownAnchor {
                pipeline: self.name.clone(),
                anchor: anchor.to_string(),
            })
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("passes", &self.pass_names())
            .finish()
    }
}
