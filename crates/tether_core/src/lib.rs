//! Tether Core
//!
//! The host object model scripts are bridged onto:
//! - Object identity, reference counting and binding data
//! - Class database (constants, enums, methods, properties, singletons)
//! - Dynamic values crossing the script boundary
//!
//! Nothing here knows about a script engine. Scripting layers plug in
//! through [`ObjectHooks`].

pub mod builtin;
pub mod class_db;
pub mod object;
pub mod object_db;
pub mod variant;

pub use class_db::{ClassDb, ClassDbError, ClassDescriptor, GlobalConstant, MethodBind, PropertySetGet};
pub use object::{HostObject, ObjectId};
pub use object_db::{ObjectDb, ObjectHooks};
pub use variant::{CallError, Variant, VariantType};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
