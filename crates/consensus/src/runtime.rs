//! Replay runtimes.
//!
//! A [`Runtime`] bundles a state view with the execution context of a
//! stored block, letting callers run call-style reads against the
//! state a block executed on without going through the pipeline again.

use crate::state::{BlockContext, StateView};
use thor_types::ForkConfig;

/// An execution context rebuilt from a finalized header.
pub struct Runtime<S: StateView> {
    state: S,
    context: BlockContext,
    fork_config: ForkConfig,
}

impl<S: StateView> Runtime<S> {
    pub(crate) fn new(state: S, context: BlockContext, fork_config: ForkConfig) -> Self {
        Self {
            state,
            context,
            fork_config,
        }
    }

    /// The block context the runtime executes under.
    pub fn context(&self) -> &BlockContext {
        &self.context
    }

    /// The fork configuration.
    pub fn fork_config(&self) -> &ForkConfig {
        &self.fork_config
    }

    /// The state view, for reads.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// The state view, for speculative writes the caller will discard.
    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }
}
