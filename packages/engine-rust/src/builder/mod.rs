//! Delegate construction.
//!
//! A delegate is a plain struct implementing [`OperationDelegate`]. The
//! [`operation_delegate!`](crate::operation_delegate) macro generates the
//! property descriptors and typed setters from the struct definition, so the
//! property set is fixed at compile time. [`DefaultObjectBuilder`] instantiates
//! the delegate and applies one resolver per property; [`ReflectionCache`]
//! memoizes the per-type descriptors.

pub mod object_builder;
pub mod reflection;

use opforge_core::{ConversionError, Value};

pub use object_builder::{BuildError, DefaultObjectBuilder};
pub use reflection::{ReflectionCache, TypeDescriptor};

/// Metadata for one configurable property of a delegate type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub name: &'static str,
    pub type_name: &'static str,
}

impl PropertyDescriptor {
    #[must_use]
    pub const fn new(name: &'static str, type_name: &'static str) -> Self {
        Self { name, type_name }
    }
}

/// A resolved value could not be applied to a delegate property.
#[derive(Debug, thiserror::Error)]
pub enum PropertyError {
    #[error("no property named `{property}`")]
    Unknown { property: String },
    #[error("property `{property}`: {source}")]
    Conversion {
        property: String,
        #[source]
        source: ConversionError,
    },
}

/// A type whose instances implement an operation.
///
/// Instances start from `Default` and are configured property by property.
/// Usually implemented through [`operation_delegate!`](crate::operation_delegate).
pub trait OperationDelegate: Default + Send + 'static {
    /// The configurable properties of this type.
    fn properties() -> Vec<PropertyDescriptor>;

    /// Applies a resolved value to the named property.
    ///
    /// # Errors
    ///
    /// Returns `PropertyError` if the property does not exist or the value
    /// cannot be converted to the property's type.
    fn set_property(&mut self, name: &str, value: Value) -> Result<(), PropertyError>;

    /// Called once after every property has been applied.
    ///
    /// # Errors
    ///
    /// An error aborts construction; the instance is discarded.
    fn initialise(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Declares a delegate struct and implements [`OperationDelegate`] for it.
///
/// Every field becomes a property named after the field; its type must
/// implement [`FromValue`](opforge_core::FromValue) and `Default`.
///
/// ```ignore
/// operation_delegate! {
///     #[derive(Debug, Clone)]
///     pub struct HttpRequest {
///         pub method: String,
///         pub timeout: u64,
///     }
/// }
/// ```
#[macro_export]
macro_rules! operation_delegate {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Default)]
        $vis struct $name {
            $(
                $(#[$field_meta])*
                $field_vis $field: $ty,
            )*
        }

        impl $crate::builder::OperationDelegate for $name {
            fn properties() -> ::std::vec::Vec<$crate::builder::PropertyDescriptor> {
                ::std::vec![
                    $(
                        $crate::builder::PropertyDescriptor::new(
                            stringify!($field),
                            ::std::any::type_name::<$ty>(),
                        ),
                    )*
                ]
            }

            #[allow(unused_variables)]
            fn set_property(
                &mut self,
                name: &str,
                value: $crate::__private::Value,
            ) -> ::std::result::Result<(), $crate::builder::PropertyError> {
                match name {
                    $(
                        stringify!($field) => {
                            self.$field =
                                <$ty as $crate::__private::FromValue>::from_value(value).map_err(
                                    |source| $crate::builder::PropertyError::Conversion {
                                        property: name.to_string(),
                                        source,
                                    },
                                )?;
                            Ok(())
                        }
                    )*
                    other => Err($crate::builder::PropertyError::Unknown {
                        property: other.to_string(),
                    }),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::operation_delegate! {
        #[derive(Debug)]
        struct Sample {
            method: String,
            timeout: u64,
            retries: Option<u32>,
        }
    }

    #[test]
    fn macro_lists_properties_in_declaration_order() {
        let names: Vec<_> = Sample::properties().iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["method", "timeout", "retries"]);
        assert_eq!(Sample::properties()[1].type_name, "u64");
    }

    #[test]
    fn macro_setters_convert_values() {
        let mut sample = Sample::default();
        sample.set_property("method", Value::from("GET")).unwrap();
        sample.set_property("timeout", Value::Int(5000)).unwrap();
        sample.set_property("retries", Value::Null).unwrap();
        assert_eq!(sample.method, "GET");
        assert_eq!(sample.timeout, 5000);
        assert_eq!(sample.retries, None);
    }

    #[test]
    fn macro_setters_reject_unknown_and_mistyped() {
        let mut sample = Sample::default();
        assert!(matches!(
            sample.set_property("verb", Value::from("GET")),
            Err(PropertyError::Unknown { property }) if property == "verb"
        ));
        assert!(matches!(
            sample.set_property("timeout", Value::from("soon")),
            Err(PropertyError::Conversion { property, .. }) if property == "timeout"
        ));
    }
}
