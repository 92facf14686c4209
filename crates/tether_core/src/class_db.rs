//! Class database: the host class hierarchy and its bound methods

use crate::{CallError, ObjectDb, ObjectId, Variant};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Native body of a bound method.
pub type MethodFn = dyn Fn(&ObjectDb, ObjectId, &[Variant]) -> Result<Variant, CallError>;

/// Allocates a new instance of a class.
pub type Factory = dyn Fn(&ObjectDb) -> ObjectId;

/// A native method descriptor.
///
/// Identity matters: script thunks are cached per descriptor, so share it
/// through `Rc` rather than cloning.
pub struct MethodBind {
    name: String,
    argument_count: usize,
    has_return: bool,
    is_virtual: bool,
    call: Option<Box<MethodFn>>,
}

impl MethodBind {
    pub fn new<F>(name: &str, argument_count: usize, call: F) -> Self
    where
        F: Fn(&ObjectDb, ObjectId, &[Variant]) -> Result<Variant, CallError> + 'static,
    {
        Self {
            name: name.to_string(),
            argument_count,
            has_return: true,
            is_virtual: false,
            call: Some(Box::new(call)),
        }
    }

    /// A method scripts are expected to override. It has no native body.
    pub fn virtual_method(name: &str, argument_count: usize) -> Self {
        Self {
            name: name.to_string(),
            argument_count,
            has_return: false,
            is_virtual: true,
            call: None,
        }
    }

    pub fn without_return(mut self) -> Self {
        self.has_return = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum number of arguments the method accepts.
    pub fn argument_count(&self) -> usize {
        self.argument_count
    }

    pub fn has_return(&self) -> bool {
        self.has_return
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    pub fn call(&self, objects: &ObjectDb, id: ObjectId, args: &[Variant]) -> Result<Variant, CallError> {
        if !objects.contains(id) {
            return Err(CallError::InstanceIsNull);
        }
        match &self.call {
            Some(call) => call(objects, id, args),
            None => Ok(Variant::Nil),
        }
    }
}

impl fmt::Debug for MethodBind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodBind")
            .field("name", &self.name)
            .field("argument_count", &self.argument_count)
            .field("has_return", &self.has_return)
            .field("is_virtual", &self.is_virtual)
            .finish()
    }
}

/// Getter/setter pair backing a property.
#[derive(Debug, Clone, Default)]
pub struct PropertySetGet {
    pub getter: Option<Rc<MethodBind>>,
    pub setter: Option<Rc<MethodBind>>,
}

enum Creation {
    Abstract,
    Default,
    Custom(Rc<Factory>),
}

/// Read-only description of a host class.
pub struct ClassDescriptor {
    name: String,
    parent: Option<String>,
    refcounted: bool,
    creation: Creation,
    constants: HashMap<String, i64>,
    enums: HashMap<String, Vec<String>>,
    methods: HashMap<String, Rc<MethodBind>>,
    properties: HashMap<String, PropertySetGet>,
}

impl ClassDescriptor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parent: None,
            refcounted: false,
            creation: Creation::Abstract,
            constants: HashMap::new(),
            enums: HashMap::new(),
            methods: HashMap::new(),
            properties: HashMap::new(),
        }
    }

    pub fn inherits(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    /// Marks the class as reference-counted. Subclasses inherit the flag.
    pub fn refcounted(mut self) -> Self {
        self.refcounted = true;
        self
    }

    /// Instances are created with the database default factory.
    pub fn instantiable(mut self) -> Self {
        self.creation = Creation::Default;
        self
    }

    pub fn factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&ObjectDb) -> ObjectId + 'static,
    {
        self.creation = Creation::Custom(Rc::new(factory));
        self
    }

    pub fn constant(mut self, name: &str, value: i64) -> Self {
        self.constants.insert(name.to_string(), value);
        self
    }

    /// Adds an enum; its members are also registered as plain constants.
    pub fn enumeration(mut self, name: &str, members: &[(&str, i64)]) -> Self {
        let mut names = Vec::with_capacity(members.len());
        for (member, value) in members {
            self.constants.insert(member.to_string(), *value);
            names.push(member.to_string());
        }
        self.enums.insert(name.to_string(), names);
        self
    }

    pub fn method(mut self, method: MethodBind) -> Self {
        self.methods.insert(method.name().to_string(), Rc::new(method));
        self
    }

    /// Adds a property. Accessors are also exposed as methods.
    pub fn property(mut self, name: &str, getter: Option<MethodBind>, setter: Option<MethodBind>) -> Self {
        let getter = getter.map(Rc::new);
        let setter = setter.map(Rc::new);
        for bind in getter.iter().chain(setter.iter()) {
            self.methods.insert(bind.name().to_string(), bind.clone());
        }
        self.properties.insert(name.to_string(), PropertySetGet { getter, setter });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn is_instantiable(&self) -> bool {
        !matches!(self.creation, Creation::Abstract)
    }

    pub fn constants(&self) -> &HashMap<String, i64> {
        &self.constants
    }

    pub fn enums(&self) -> &HashMap<String, Vec<String>> {
        &self.enums
    }

    pub fn methods(&self) -> &HashMap<String, Rc<MethodBind>> {
        &self.methods
    }

    pub fn get_method(&self, name: &str) -> Option<&Rc<MethodBind>> {
        self.methods.get(name)
    }

    pub fn properties(&self) -> &HashMap<String, PropertySetGet> {
        &self.properties
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("refcounted", &self.refcounted)
            .field("methods", &self.methods.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalConstant {
    pub name: String,
    pub enum_name: Option<String>,
    pub value: i64,
}

#[derive(Debug, Error)]
pub enum ClassDbError {
    #[error("class '{name}' is already registered")]
    DuplicateClass { name: String },

    #[error("class '{name}' inherits unknown class '{parent}'")]
    UnknownParent { name: String, parent: String },

    #[error("singleton '{name}' is already registered")]
    DuplicateSingleton { name: String },

    #[error("singleton '{name}' refers to missing object {id}")]
    MissingSingletonObject { name: String, id: ObjectId },
}

/// Registry of host classes, singletons and global constants.
#[derive(Default)]
pub struct ClassDb {
    classes: HashMap<String, ClassDescriptor>,
    singletons: Vec<(String, ObjectId)>,
    global_constants: Vec<GlobalConstant>,
}

impl ClassDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parents must be registered before their subclasses.
    pub fn register(&mut self, mut class: ClassDescriptor) -> Result<(), ClassDbError> {
        if self.classes.contains_key(class.name()) {
            return Err(ClassDbError::DuplicateClass {
                name: class.name().to_string(),
            });
        }

        if let Some(parent) = class.parent() {
            let Some(parent_class) = self.classes.get(parent) else {
                return Err(ClassDbError::UnknownParent {
                    name: class.name().to_string(),
                    parent: parent.to_string(),
                });
            };
            class.refcounted |= parent_class.refcounted;
        }

        self.classes.insert(class.name().to_string(), class);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ClassDescriptor> {
        self.classes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassDescriptor> {
        self.classes.values()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn is_refcounted(&self, name: &str) -> bool {
        self.classes.get(name).map(|c| c.refcounted).unwrap_or(false)
    }

    /// True when `name` is `ancestor` or inherits from it.
    pub fn is_parent_class(&self, name: &str, ancestor: &str) -> bool {
        let mut current = Some(name);
        while let Some(class_name) = current {
            if class_name == ancestor {
                return true;
            }
            current = self.classes.get(class_name).and_then(ClassDescriptor::parent);
        }
        false
    }

    /// Allocates an instance through the class factory. Abstract and
    /// unknown classes yield `None`.
    pub fn instantiate(&self, objects: &ObjectDb, name: &str) -> Option<ObjectId> {
        let class = self.classes.get(name)?;
        match &class.creation {
            Creation::Abstract => None,
            Creation::Default => Some(objects.create(class.name(), class.refcounted)),
            Creation::Custom(factory) => Some(factory(objects)),
        }
    }

    pub fn add_singleton(&mut self, objects: &ObjectDb, name: &str, id: ObjectId) -> Result<(), ClassDbError> {
        if self.singletons.iter().any(|(existing, _)| existing == name) {
            return Err(ClassDbError::DuplicateSingleton { name: name.to_string() });
        }
        if !objects.contains(id) {
            return Err(ClassDbError::MissingSingletonObject {
                name: name.to_string(),
                id,
            });
        }
        self.singletons.push((name.to_string(), id));
        Ok(())
    }

    pub fn singletons(&self) -> &[(String, ObjectId)] {
        &self.singletons
    }

    pub fn add_global_constant(&mut self, name: &str, enum_name: Option<&str>, value: i64) {
        self.global_constants.push(GlobalConstant {
            name: name.to_string(),
            enum_name: enum_name.map(str::to_string),
            value,
        });
    }

    pub fn global_constants(&self) -> &[GlobalConstant] {
        &self.global_constants
    }
}
