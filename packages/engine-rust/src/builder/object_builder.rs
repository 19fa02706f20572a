use std::marker::PhantomData;
use std::sync::Arc;

use tracing::trace;

use super::reflection::ReflectionCache;
use super::{OperationDelegate, PropertyError};
use crate::resolver::{ResolutionError, ValueResolver, ValueResolvingContext};

/// Delegate construction failed. The partially built instance is discarded.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("`{type_name}` has no property `{property}`")]
    UnknownProperty {
        type_name: &'static str,
        property: String,
    },
    #[error("could not resolve property `{property}`")]
    Resolution {
        property: String,
        #[source]
        source: ResolutionError,
    },
    #[error(transparent)]
    Property(#[from] PropertyError),
    #[error("initialisation failed")]
    Initialise(#[source] anyhow::Error),
}

/// Builds instances of `T` by applying one resolver per property.
///
/// Construction is fail-fast: the first unknown property, resolution failure,
/// conversion failure or `initialise` error aborts the build.
pub struct DefaultObjectBuilder<T: OperationDelegate> {
    resolvers: Vec<(String, Box<dyn ValueResolver>)>,
    cache: Arc<ReflectionCache>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: OperationDelegate> DefaultObjectBuilder<T> {
    #[must_use]
    pub fn new(cache: Arc<ReflectionCache>) -> Self {
        Self {
            resolvers: Vec::new(),
            cache,
            _marker: PhantomData,
        }
    }

    /// Registers the resolver for a property. A second registration for the
    /// same property replaces the first.
    pub fn add_property_resolver(
        &mut self,
        property: impl Into<String>,
        resolver: Box<dyn ValueResolver>,
    ) -> &mut Self {
        let property = property.into();
        match self.resolvers.iter_mut().find(|(name, _)| *name == property) {
            Some(slot) => slot.1 = resolver,
            None => self.resolvers.push((property, resolver)),
        }
        self
    }

    /// Whether any registered resolver depends on the context.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.resolvers.iter().any(|(_, r)| r.is_dynamic())
    }

    /// Builds a new instance.
    ///
    /// Property names are checked against the cached type descriptor before
    /// anything is resolved; resolvers then run in registration order.
    ///
    /// # Errors
    ///
    /// Returns `BuildError` on the first failure; no instance is returned.
    pub fn build(&self, ctx: &ValueResolvingContext<'_>) -> Result<T, BuildError> {
        let descriptor = self.cache.descriptor::<T>();
        if let Some((property, _)) = self
            .resolvers
            .iter()
            .find(|(name, _)| !descriptor.has_property(name))
        {
            return Err(BuildError::UnknownProperty {
                type_name: descriptor.type_name(),
                property: property.clone(),
            });
        }

        let mut instance = T::default();
        for (property, resolver) in &self.resolvers {
            let value = resolver
                .resolve(ctx)
                .map_err(|source| BuildError::Resolution {
                    property: property.clone(),
                    source,
                })?;
            trace!(property = %property, kind = %value.kind(), "applying property");
            instance.set_property(property, value)?;
        }

        instance.initialise().map_err(BuildError::Initialise)?;
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    use opforge_core::{Event, Expression, ExpressionError, Value};

    use super::*;
    use crate::builder::PropertyDescriptor;
    use crate::resolver::{ExpressionValueResolver, StaticValueResolver};

    crate::operation_delegate! {
        #[derive(Debug, Clone)]
        struct HttpRequest {
            method: String,
            timeout: u64,
        }
    }

    /// Counts resolutions so tests can assert fail-fast behaviour.
    #[derive(Debug)]
    struct CountingResolver {
        calls: Arc<AtomicU32>,
        value: Value,
    }

    impl ValueResolver for CountingResolver {
        fn resolve(&self, _ctx: &ValueResolvingContext<'_>) -> Result<Value, ResolutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.value.clone())
        }

        fn is_dynamic(&self) -> bool {
            false
        }
    }

    /// Delegate whose initialise hook rejects a zero port.
    #[derive(Debug, Default)]
    struct Listener {
        port: u16,
    }

    impl OperationDelegate for Listener {
        fn properties() -> Vec<PropertyDescriptor> {
            vec![PropertyDescriptor::new("port", "u16")]
        }

        fn set_property(&mut self, name: &str, value: Value) -> Result<(), PropertyError> {
            match name {
                "port" => {
                    self.port = opforge_core::FromValue::from_value(value).map_err(|source| {
                        PropertyError::Conversion {
                            property: name.to_string(),
                            source,
                        }
                    })?;
                    Ok(())
                }
                other => Err(PropertyError::Unknown {
                    property: other.to_string(),
                }),
            }
        }

        fn initialise(&mut self) -> anyhow::Result<()> {
            anyhow::ensure!(self.port != 0, "port must be non-zero");
            Ok(())
        }
    }

    fn event() -> Event {
        Event::new("c", Arc::new(BTreeMap::new())).with_variable("method", "POST")
    }

    #[test]
    fn builds_from_static_and_expression_resolvers() {
        let event = event();
        let mut builder =
            DefaultObjectBuilder::<HttpRequest>::new(Arc::new(ReflectionCache::new()));
        builder
            .add_property_resolver("timeout", Box::new(StaticValueResolver::new(5000_i64)))
            .add_property_resolver(
                "method",
                Box::new(ExpressionValueResolver::new(
                    Expression::parse("#[vars.method]").unwrap(),
                )),
            );
        assert!(builder.is_dynamic());

        let request = builder.build(&ValueResolvingContext::new(&event)).unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.timeout, 5000);
    }

    #[test]
    fn unknown_property_fails_before_resolution() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut builder =
            DefaultObjectBuilder::<HttpRequest>::new(Arc::new(ReflectionCache::new()));
        builder
            .add_property_resolver(
                "method",
                Box::new(CountingResolver {
                    calls: calls.clone(),
                    value: Value::from("GET"),
                }),
            )
            .add_property_resolver("verb", Box::new(StaticValueResolver::new("GET")));

        let event = event();
        let err = builder.build(&ValueResolvingContext::new(&event)).unwrap_err();
        assert!(
            matches!(err, BuildError::UnknownProperty { ref property, .. } if property == "verb")
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn first_resolution_failure_stops_the_build() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut builder =
            DefaultObjectBuilder::<HttpRequest>::new(Arc::new(ReflectionCache::new()));
        builder
            .add_property_resolver(
                "method",
                Box::new(ExpressionValueResolver::new(
                    Expression::parse("#[vars.absent]").unwrap(),
                )),
            )
            .add_property_resolver(
                "timeout",
                Box::new(CountingResolver {
                    calls: calls.clone(),
                    value: Value::Int(1),
                }),
            );

        let event = event();
        let err = builder.build(&ValueResolvingContext::new(&event)).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Resolution {
                ref property,
                source: ResolutionError::Expression(ExpressionError::Unresolved { .. }),
            } if property == "method"
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn conversion_failure_names_property() {
        let mut builder =
            DefaultObjectBuilder::<HttpRequest>::new(Arc::new(ReflectionCache::new()));
        builder.add_property_resolver("timeout", Box::new(StaticValueResolver::new("soon")));

        let event = event();
        let err = builder.build(&ValueResolvingContext::new(&event)).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Property(PropertyError::Conversion { ref property, .. })
                if property == "timeout"
        ));
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let mut builder =
            DefaultObjectBuilder::<HttpRequest>::new(Arc::new(ReflectionCache::new()));
        builder
            .add_property_resolver("method", Box::new(StaticValueResolver::new("GET")))
            .add_property_resolver("method", Box::new(StaticValueResolver::new("PUT")));

        let event = event();
        let request = builder.build(&ValueResolvingContext::new(&event)).unwrap();
        assert_eq!(request.method, "PUT");
    }

    #[test]
    fn initialise_failure_aborts_construction() {
        let mut builder = DefaultObjectBuilder::<Listener>::new(Arc::new(ReflectionCache::new()));
        builder.add_property_resolver("port", Box::new(StaticValueResolver::new(0_i64)));
        let event = event();
        let err = builder.build(&ValueResolvingContext::new(&event)).unwrap_err();
        assert!(matches!(err, BuildError::Initialise(_)));

        let mut builder = DefaultObjectBuilder::<Listener>::new(Arc::new(ReflectionCache::new()));
        builder.add_property_resolver("port", Box::new(StaticValueResolver::new(8081_i64)));
        let listener = builder.build(&ValueResolvingContext::new(&event)).unwrap();
        assert_eq!(listener.port, 8081);
    }

    #[test]
    fn builder_reuses_cached_descriptor() {
        let cache = Arc::new(ReflectionCache::new());
        let event = event();
        for _ in 0..3 {
            let builder = DefaultObjectBuilder::<HttpRequest>::new(cache.clone());
            builder.build(&ValueResolvingContext::new(&event)).unwrap();
        }
        assert_eq!(cache.miss_count(), 1);
    }
}
