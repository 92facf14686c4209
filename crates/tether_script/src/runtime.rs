//! Script runtime management
//!
//! Owns the QuickJS runtime and the single context the bridge runs in.

use crate::Result;
use rquickjs::{Context, Runtime};
use tether_services::ScriptSettings;

/// Script execution context
pub struct ScriptRuntime {
    runtime: Runtime,
    context: Context,
}

impl ScriptRuntime {
    /// Failure here is fatal: there is no bridge without a heap.
    pub fn new(settings: &ScriptSettings) -> Result<Self> {
        let runtime = Runtime::new()?;
        if let Some(limit) = settings.memory_limit {
            runtime.set_memory_limit(limit);
        }
        if let Some(threshold) = settings.gc_threshold {
            runtime.set_gc_threshold(threshold);
        }
        if let Some(size) = settings.max_stack_size {
            runtime.set_max_stack_size(size);
        }
        let context = Context::full(&runtime)?;

        Ok(Self { runtime, context })
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Runs a full collection; unreachable wrappers are finalized before
    /// this returns.
    pub fn run_gc(&self) {
        self.runtime.run_gc();
    }
}
