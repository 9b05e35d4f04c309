use tracing::trace;

use crate::behavior::{LifecycleEvent, TypecastBehavior};
use crate::datatype::Value;
use crate::detect::ValidatorRule;
use crate::error::{Result, TypecastError};
use crate::model::Model;

/// An in-memory model without storage, typed from its validation rules.
#[derive(Debug)]
pub struct Form {
    name: String,
    values: Vec<(String, Value)>,
    rules: Vec<ValidatorRule>,
    errors: Vec<String>,
    typecast: Option<TypecastBehavior>,
}

impl Form {
    /// A form with the given attributes, all null.
    pub fn new(name: impl Into<String>, attributes: &[&str]) -> Self {
        Self {
            name: name.into(),
            values: attributes
                .iter()
                .map(|attribute| ((*attribute).to_owned(), Value::Null))
                .collect(),
            rules: Vec::new(),
            errors: Vec::new(),
            typecast: None,
        }
    }
    pub fn with_rule(mut self, rule: ValidatorRule) -> Self {
        self.rules.push(rule);
        self
    }
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attach(&mut self, mut behavior: TypecastBehavior) -> Result<()> {
        behavior.attach(self)?;
        self.typecast = Some(behavior);
        Ok(())
    }
    pub fn behavior(&self) -> Option<&TypecastBehavior> {
        self.typecast.as_ref()
    }
    pub fn behavior_mut(&mut self) -> Option<&mut TypecastBehavior> {
        self.typecast.as_mut()
    }

    pub fn get(&self, name: &str) -> Value {
        self.attribute(name)
    }
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.set_attribute(name, value.into());
    }
    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }
    pub fn errors(&self) -> &[String] {
        &self.errors
    }
    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    /// Fires the after-validate hook and reports whether the form is free of errors.
    pub fn validate(&mut self) -> Result<bool> {
        if let Some(mut behavior) = self.typecast.take() {
            let outcome = behavior.handle(LifecycleEvent::AfterValidate, self);
            self.typecast = Some(behavior);
            outcome?;
        }
        trace!(form = %self.name, errors = self.errors.len(), "validated");
        Ok(!self.has_errors())
    }

    pub fn typecast_attributes(&mut self, names: Option<&[&str]>) -> Result<&mut Self> {
        let behavior = self.typecast.take().ok_or_else(|| {
            TypecastError::InvalidArgument(format!(
                "no typecast behavior is attached to the form '{}'",
                self.name
            ))
        })?;
        let outcome = behavior.typecast_attributes(self, names).map(|_| ());
        self.typecast = Some(behavior);
        outcome.map(|()| self)
    }
}

impl Model for Form {
    fn model_name(&self) -> String {
        format!("form:{}", self.name)
    }
    fn attribute(&self, name: &str) -> Value {
        self.values
            .iter()
            .find(|(kept, _)| kept == name)
            .map_or(Value::Null, |(_, value)| value.clone())
    }
    fn set_attribute(&mut self, name: &str, value: Value) {
        match self.values.iter_mut().find(|(kept, _)| kept == name) {
            Some((_, kept)) => *kept = value,
            None => self.values.push((name.to_owned(), value)),
        }
    }
    fn attributes(&self) -> Vec<(String, Value)> {
        self.values
            .iter()
            .filter(|(_, value)| !value.is_null())
            .cloned()
            .collect()
    }
    fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
    fn validators(&self) -> Vec<ValidatorRule> {
        self.rules.clone()
    }
}
