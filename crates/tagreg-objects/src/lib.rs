//! In-memory object system: a reference implementation of
//! [`ObjectSystemPort`] for tests and embedders that have no engine to bind
//! to.
//!
//! Objects are constructed from registered class templates. A template fixes
//! the property keys an object accepts; setting an unknown key or a value of
//! the wrong JSON type fails per key, which is what drives the registry's
//! partial settings application.

use std::mem;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;
use tagreg_protocol::{ObjectId, ObjectSystemPort, RegistryError, RegistryResult, fold_key};
use tracing::debug;

#[derive(Debug, Clone)]
struct ClassTemplate {
    display_name: String,
    defaults: IndexMap<String, Value>,
}

#[derive(Debug, Clone)]
struct ObjectEntry {
    name: String,
    class: String,
    properties: IndexMap<String, Value>,
    children: Vec<ObjectId>,
}

/// Process-local object store with class templates, deep clone, and
/// parent/child hierarchy.
#[derive(Debug, Default)]
pub struct InMemoryObjectSystem {
    classes: RwLock<IndexMap<String, ClassTemplate>>,
    objects: RwLock<IndexMap<ObjectId, ObjectEntry>>,
}

impl InMemoryObjectSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class template. The template's keys are the only
    /// properties instances of the class accept.
    pub fn register_class(&self, name: &str, defaults: IndexMap<String, Value>) {
        let template = ClassTemplate {
            display_name: name.trim().to_owned(),
            defaults,
        };
        self.classes.write().insert(fold_key(name), template);
    }

    /// Give an object a new display name.
    pub fn rename(&self, object: ObjectId, name: &str) -> RegistryResult<()> {
        let mut objects = self.objects.write();
        let entry = objects
            .get_mut(&object)
            .ok_or_else(|| unknown_object(object))?;
        entry.name = name.trim().to_owned();
        Ok(())
    }

    /// Attach `child` under `parent`. Both must be alive.
    pub fn add_child(&self, parent: ObjectId, child: ObjectId) -> RegistryResult<()> {
        let mut objects = self.objects.write();
        if !objects.contains_key(&child) {
            return Err(unknown_object(child));
        }
        let entry = objects
            .get_mut(&parent)
            .ok_or_else(|| unknown_object(parent))?;
        if !entry.children.contains(&child) {
            entry.children.push(child);
        }
        Ok(())
    }

    /// Destroy an object and its subtree. Returns how many objects were
    /// removed; zero when the object was already gone.
    pub fn destroy(&self, object: ObjectId) -> usize {
        let mut objects = self.objects.write();
        let mut pending = vec![object];
        let mut removed = 0;
        while let Some(id) = pending.pop() {
            if let Some(entry) = objects.shift_remove(&id) {
                removed += 1;
                pending.extend(entry.children);
            }
        }
        if removed > 0 {
            debug!(%object, removed, "object subtree destroyed");
        }
        removed
    }

    /// Current value of a property, for assertions and inspection.
    pub fn property(&self, object: ObjectId, key: &str) -> Option<Value> {
        self.objects
            .read()
            .get(&object)
            .and_then(|entry| entry.properties.get(key).cloned())
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    fn clone_subtree(
        objects: &mut IndexMap<ObjectId, ObjectEntry>,
        source: ObjectId,
    ) -> RegistryResult<ObjectId> {
        let mut entry = objects
            .get(&source)
            .cloned()
            .ok_or_else(|| unknown_object(source))?;
        let children = mem::take(&mut entry.children);
        let clone = ObjectId::new();
        objects.insert(clone, entry);
        let mut cloned_children = Vec::with_capacity(children.len());
        for child in children {
            cloned_children.push(Self::clone_subtree(objects, child)?);
        }
        if let Some(slot) = objects.get_mut(&clone) {
            slot.children = cloned_children;
        }
        Ok(clone)
    }
}

fn unknown_object(object: ObjectId) -> RegistryError {
    RegistryError::InvalidArgument(format!("unknown object: {object}"))
}

fn same_json_kind(a: &Value, b: &Value) -> bool {
    mem::discriminant(a) == mem::discriminant(b)
}

impl ObjectSystemPort for InMemoryObjectSystem {
    fn construct(&self, class_name: &str) -> RegistryResult<ObjectId> {
        let template = self
            .classes
            .read()
            .get(&fold_key(class_name))
            .cloned()
            .ok_or_else(|| RegistryError::InvalidClass(class_name.to_owned()))?;

        let id = ObjectId::new();
        self.objects.write().insert(
            id,
            ObjectEntry {
                name: template.display_name.clone(),
                class: template.display_name,
                properties: template.defaults,
                children: Vec::new(),
            },
        );
        debug!(%id, class = class_name, "object constructed");
        Ok(id)
    }

    fn clone_object(&self, object: ObjectId) -> RegistryResult<ObjectId> {
        let mut objects = self.objects.write();
        let clone = Self::clone_subtree(&mut objects, object)?;
        debug!(source = %object, %clone, "object subtree cloned");
        Ok(clone)
    }

    fn descendants(&self, object: ObjectId) -> Vec<ObjectId> {
        let objects = self.objects.read();
        let mut out = Vec::new();
        let mut pending: Vec<ObjectId> = objects
            .get(&object)
            .map(|entry| entry.children.clone())
            .unwrap_or_default();
        while let Some(id) = pending.pop() {
            if let Some(entry) = objects.get(&id) {
                pending.extend(entry.children.iter().copied());
            }
            out.push(id);
        }
        out
    }

    fn display_name(&self, object: ObjectId) -> Option<String> {
        self.objects.read().get(&object).map(|entry| entry.name.clone())
    }

    fn set_property(&self, object: ObjectId, key: &str, value: Value) -> RegistryResult<()> {
        let mut objects = self.objects.write();
        let entry = objects
            .get_mut(&object)
            .ok_or_else(|| unknown_object(object))?;
        let Some(slot) = entry.properties.get_mut(key) else {
            return Err(RegistryError::PropertyApply {
                key: key.to_owned(),
                reason: format!("unknown property on class '{}'", entry.class),
            });
        };
        if !slot.is_null() && !same_json_kind(slot, &value) {
            return Err(RegistryError::PropertyApply {
                key: key.to_owned(),
                reason: "value type does not match the class template".to_owned(),
            });
        }
        *slot = value;
        Ok(())
    }

    fn is_alive(&self, object: ObjectId) -> bool {
        self.objects.read().contains_key(&object)
    }
}
