//! The typecast behavior and its hooks into a model's lifecycle.
//!
//! A behavior casts the mapped attributes of its owner after validation and
//! after a load. Around a save it replaces every value a storage driver
//! cannot take (JSON containers, date-times, custom objects) by a storable
//! scalar, and puts the original values back once the write is done:
//!
//! ```text
//! before_save: created_at = DateTime(2015-05-15 10:20:30)  -> stash, write "2015-05-15 10:20:30"
//! write
//! after_save:  created_at = "2015-05-15 10:20:30"          -> restore DateTime(...)
//! ```

use chrono::Utc;
use serde_json::Value as Json;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::coercion::{Caster, DateProvider, FixedZoneProvider};
use crate::config::BehaviorConfig;
use crate::datatype::{AttributeTypes, ConversionRule, DATETIME_FORMAT, TypeTag, Value};
use crate::detect::{AttributeTypeCache, detect_attribute_types};
use crate::error::{Result, TypecastError};
use crate::model::Model;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    AfterValidate,
    BeforeSave,
    AfterSave,
    AfterFind,
}

/// Values taken off a model for the duration of one storage write.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StashedAttributes {
    entries: Vec<(String, Value)>,
}

impl StashedAttributes {
    pub fn stash(&mut self, name: &str, value: Value) {
        match self.entries.iter_mut().find(|(kept, _)| kept == name) {
            Some((_, kept)) => *kept = value,
            None => self.entries.push((name.to_owned(), value)),
        }
    }
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(kept, _)| kept == name)
            .map(|(_, value)| value)
    }
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    pub fn clear(&mut self) {
        self.entries.clear();
    }
    fn take(&mut self) -> Vec<(String, Value)> {
        std::mem::take(&mut self.entries)
    }
}

/// Casts the attributes of one model.
///
/// Event flags take effect when the behavior is attached. `skip_on_null` is
/// read on every cast.
#[derive(Clone, Debug)]
pub struct TypecastBehavior {
    attribute_types: Option<AttributeTypes>,
    pub skip_on_null: bool,
    pub typecast_after_validate: bool,
    pub typecast_before_save: bool,
    pub typecast_after_save: bool,
    pub typecast_after_find: bool,
    caster: Caster,
    cache: Arc<AttributeTypeCache>,
    stash: StashedAttributes,
    events: Vec<LifecycleEvent>,
}

impl Default for TypecastBehavior {
    fn default() -> Self {
        Self {
            attribute_types: None,
            skip_on_null: true,
            typecast_after_validate: true,
            typecast_before_save: false,
            typecast_after_save: true,
            typecast_after_find: true,
            caster: Caster::new(),
            cache: AttributeTypeCache::global(),
            stash: StashedAttributes::default(),
            events: Vec::new(),
        }
    }
}

impl TypecastBehavior {
    pub fn new(attribute_types: AttributeTypes) -> Self {
        Self {
            attribute_types: Some(attribute_types),
            ..Self::default()
        }
    }
    /// A behavior whose types are detected from the owner when attached.
    pub fn detected() -> Self {
        Self::default()
    }
    pub fn from_config(config: &BehaviorConfig) -> Result<Self> {
        let mut behavior = Self {
            attribute_types: config.attribute_types.clone(),
            skip_on_null: config.skip_on_null,
            typecast_after_validate: config.typecast_after_validate,
            typecast_before_save: config.typecast_before_save,
            typecast_after_save: config.typecast_after_save,
            typecast_after_find: config.typecast_after_find,
            ..Self::default()
        };
        if let Some(seconds) = config.date_offset_seconds {
            let provider = FixedZoneProvider::east(seconds).ok_or_else(|| {
                TypecastError::Config(format!("date offset of {seconds} seconds is out of range"))
            })?;
            behavior = behavior.with_date_provider(Arc::new(provider));
        }
        Ok(behavior)
    }
    /// Uses another detection cache than the process wide one.
    pub fn with_cache(mut self, cache: Arc<AttributeTypeCache>) -> Self {
        self.cache = cache;
        self
    }
    pub fn with_date_provider(mut self, provider: Arc<dyn DateProvider>) -> Self {
        self.caster = self.caster.with_date_provider(provider);
        self
    }

    /// The type map, None until attached when it is to be detected.
    pub fn attribute_types(&self) -> Option<&AttributeTypes> {
        self.attribute_types.as_ref()
    }
    pub fn caster(&self) -> &Caster {
        &self.caster
    }
    pub fn cache(&self) -> &Arc<AttributeTypeCache> {
        &self.cache
    }
    pub fn stashed(&self) -> &StashedAttributes {
        &self.stash
    }
    /// Events the owner has to forward to [`TypecastBehavior::handle`].
    pub fn events(&self) -> &[LifecycleEvent] {
        &self.events
    }

    /// Resolves the type map and subscribes to the owner's events.
    pub fn attach<M: Model + ?Sized>(&mut self, owner: &M) -> Result<()> {
        let model = owner.model_name();
        if self.attribute_types.is_none() {
            let types = self
                .cache
                .get_or_detect(&model, || detect_attribute_types(owner))?;
            self.attribute_types = Some(types);
        }
        let storable = owner.as_storable().is_some();
        let mut events = Vec::new();
        if self.typecast_after_validate {
            events.push(LifecycleEvent::AfterValidate);
        }
        if storable {
            events.push(LifecycleEvent::BeforeSave);
            events.push(LifecycleEvent::AfterSave);
            if self.typecast_after_find {
                events.push(LifecycleEvent::AfterFind);
            }
        }
        debug!(model = %model, ?events, "typecast behavior attached");
        self.events = events;
        Ok(())
    }

    pub fn handle<M: Model + ?Sized>(
        &mut self,
        event: LifecycleEvent,
        owner: &mut M,
    ) -> Result<()> {
        if !self.events.contains(&event) {
            return Ok(());
        }
        match event {
            LifecycleEvent::AfterValidate => self.after_validate(owner),
            LifecycleEvent::BeforeSave => self.before_save(owner),
            LifecycleEvent::AfterSave => self.after_save(owner),
            LifecycleEvent::AfterFind => self.after_find(owner),
        }
    }

    pub fn after_validate<M: Model + ?Sized>(&mut self, owner: &mut M) -> Result<()> {
        if !owner.has_errors() {
            self.typecast_attributes(owner, None)?;
        }
        Ok(())
    }

    pub fn before_save<M: Model + ?Sized>(&mut self, owner: &mut M) -> Result<()> {
        if self.typecast_before_save {
            self.typecast_attributes(owner, None)?;
        }
        self.prepare_for_storage(owner);
        Ok(())
    }

    pub fn after_save<M: Model + ?Sized>(&mut self, owner: &mut M) -> Result<()> {
        self.restore_from_storage(owner);
        if self.typecast_after_save {
            self.typecast_attributes(owner, None)?;
        }
        Ok(())
    }

    pub fn after_find<M: Model + ?Sized>(&mut self, owner: &mut M) -> Result<()> {
        self.typecast_attributes(owner, None)?;
        Ok(())
    }

    /// Casts the named attributes, or all mapped ones when `names` is None.
    ///
    /// Every name is checked before anything is written, and attributes are
    /// cast in map order.
    pub fn typecast_attributes<'m, M: Model + ?Sized>(
        &self,
        owner: &'m mut M,
        names: Option<&[&str]>,
    ) -> Result<&'m mut M> {
        let types = self.attribute_types.as_ref().ok_or_else(|| {
            TypecastError::InvalidArgument(
                "attribute types are detected when the behavior is attached".to_owned(),
            )
        })?;
        let working: Cow<'_, AttributeTypes> = match names {
            None => Cow::Borrowed(types),
            Some(names) => Cow::Owned(types.select(names)?),
        };
        for (name, rule) in working.iter() {
            let value = owner.attribute(name);
            if self.skip_on_null && value.is_null() {
                trace!(attribute = name, "skipping null attribute");
                continue;
            }
            let cast = self.typecast_value(value, rule)?;
            trace!(attribute = name, kind = cast.kind(), "attribute cast");
            owner.set_attribute(name, cast);
        }
        Ok(owner)
    }

    pub fn typecast_value(&self, value: Value, rule: &ConversionRule) -> Result<Value> {
        self.caster.cast(value, rule)
    }

    /// Swaps every non-storable value for a storable scalar, keeping the
    /// original in the stash.
    pub fn prepare_for_storage<M: Model + ?Sized>(&mut self, owner: &mut M) {
        if !self.stash.is_empty() {
            warn!(
                stale = self.stash.len(),
                "discarding values stashed by an unfinished save"
            );
        }
        self.stash.clear();
        for (name, value) in owner.attributes() {
            if value.is_null() || value.is_storable() || matches!(value, Value::Expression(_)) {
                continue;
            }
            let scalar = self.storage_scalar(&name, &value);
            trace!(attribute = %name, kind = value.kind(), "stashing attribute for storage");
            owner.set_attribute(&name, scalar);
            self.stash.stash(&name, value);
        }
        if !self.stash.is_empty() {
            debug!(model = %owner.model_name(), stashed = self.stash.len(), "prepared for storage");
        }
    }

    /// Puts stashed values back on the owner. Calling it twice is harmless.
    pub fn restore_from_storage<M: Model + ?Sized>(&mut self, owner: &mut M) {
        for (name, value) in self.stash.take() {
            trace!(attribute = %name, "restoring stashed attribute");
            owner.set_attribute(&name, value);
        }
    }

    fn storage_scalar(&self, name: &str, value: &Value) -> Value {
        match value {
            Value::Json(json) => Value::String(json.to_string()),
            Value::Document(document) => Value::String(document.copy().to_string()),
            // Stored text has no offset, so it is written in the zone the
            // matching cast reads it back in.
            Value::DateTime(moment) => {
                let tag = self.attribute_types.as_ref().and_then(|types| types.tag_of(name));
                match tag {
                    Some(tag) if tag.reads_epoch_seconds() => Value::Integer(moment.timestamp()),
                    Some(TypeTag::DateTimeExt) => {
                        let local = self
                            .caster
                            .date_provider()
                            .and_then(|provider| provider.from_timestamp(moment.timestamp()))
                            .unwrap_or_else(|| moment.with_timezone(&Utc).fixed_offset());
                        Value::String(local.format(DATETIME_FORMAT).to_string())
                    }
                    _ => {
                        let utc = moment.with_timezone(&Utc);
                        Value::String(utc.format(DATETIME_FORMAT).to_string())
                    }
                }
            }
            Value::Object(object) => match object.to_json() {
                Some(json) => Value::String(json.to_string()),
                None => match object.items() {
                    Some(items) => Value::String(
                        Json::Array(items.iter().map(Value::to_json).collect()).to_string(),
                    ),
                    None => Value::String(object.to_string()),
                },
            },
            other => Value::String(other.to_text()),
        }
    }
}
