use crate::error::{Error, Result};
use crate::value::{Object, Property, Value};
use indexmap::IndexMap;

/// Named values made available to every template an engine renders.
///
/// Helpers sit at the bottom of the context stack, so data wins over a
/// helper of the same name.
#[derive(Clone, Default)]
pub struct HelperCollection {
    helpers: IndexMap<String, Value>,
}

impl HelperCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, helper: impl Into<Value>) {
        self.helpers.insert(name.into(), helper.into());
    }

    pub fn get(&self, name: &str) -> Result<&Value> {
        self.helpers
            .get(name)
            .ok_or_else(|| Error::UnknownHelper(name.to_string()))
    }

    pub fn has(&self, name: &str) -> bool {
        self.helpers.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Result<Value> {
        self.helpers
            .shift_remove(name)
            .ok_or_else(|| Error::UnknownHelper(name.to_string()))
    }

    pub fn clear(&mut self) {
        self.helpers.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.helpers.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for HelperCollection {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut helpers = HelperCollection::new();
        for (name, helper) in iter {
            helpers.add(name, helper);
        }
        helpers
    }
}

impl Object for HelperCollection {
    fn property(&self, name: &str) -> Property {
        match self.helpers.get(name) {
            Some(helper) => Property::Public(helper.clone()),
            None => Property::Undefined,
        }
    }
}
