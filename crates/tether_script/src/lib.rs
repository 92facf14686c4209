//! Tether Scripting System
//!
//! Host objects and classes exposed to JavaScript via QuickJS, with the
//! lifetime of every object reconciled across both runtimes.
//!
//! ## Architecture
//!
//! - **Wrappers:** each live host object has at most one script wrapper,
//!   found through the weak and strong pools of the wrapper registry
//! - **Lifetime:** GC finalization and host refcount transitions meet in
//!   one state machine; a collected wrapper whose object the host still
//!   references is re-created and pinned at the next safe point
//! - **Classes:** host classes are mirrored under a namespace global at
//!   startup; scripts extend them and register the result with
//!   `register_class`
//!
//! ## Example
//!
//! ```ignore
//! let objects = Rc::new(ObjectDb::new());
//! let classes = Rc::new(builtin_classes(&objects)?);
//! let bridge = Bridge::initialize(objects, classes, ScriptSettings::default())?;
//! bridge.eval_string("print(new godot.Node())")?;
//! ```

mod bridge;
mod classes;
mod error;
mod glue;
mod invoke;
mod lifecycle;
mod marshal;
mod registry;
mod runtime;
mod state;
mod subclass;
mod thunk;
mod wrapper;

#[cfg(test)]
mod test_support;

pub use bridge::Bridge;
pub use error::{BridgeError, Result};
pub use lifecycle::Finalization;
pub use runtime::ScriptRuntime;
pub use subclass::ScriptClassRecord;

// Re-export commonly used types
pub use rquickjs;
