//! The contract between a typecast behavior and the model it is attached to.

use crate::datatype::Value;
use crate::detect::{ColumnSchema, ValidatorRule};
use crate::error::Result;

/// A model exposing named attributes.
///
/// Reading an attribute that was never set yields [`Value::Null`].
pub trait Model {
    /// Identity used to key detected type maps. Two models sharing a name
    /// share their detected types.
    fn model_name(&self) -> String {
        std::any::type_name::<Self>().to_owned()
    }
    fn attribute(&self, name: &str) -> Value;
    fn set_attribute(&mut self, name: &str, value: Value);
    /// The attributes that currently carry a value, in declaration order.
    fn attributes(&self) -> Vec<(String, Value)>;
    fn has_errors(&self) -> bool {
        false
    }
    fn validators(&self) -> Vec<ValidatorRule> {
        Vec::new()
    }
    /// Storage capability. Storable models get the save and find hooks.
    fn as_storable(&self) -> Option<&dyn Storable> {
        None
    }
}

pub trait Storable {
    /// Columns of the backing table.
    fn describe_columns(&self) -> Result<Vec<ColumnSchema>>;
}
