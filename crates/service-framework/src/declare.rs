//! # Declaring Components
//!
//! Component types describe themselves through [`Component::declare`]. The
//! [`Declarer`] turns each call into an annotation tagged with the type's
//! [`OwnerToken`], and the [`Bootstrap`] context owns the registries that
//! collect them.
//!
//! ```rust
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//! use service_framework::{Bootstrap, Component, Declarer, ServiceDecl};
//!
//! #[derive(Default)]
//! struct Clock {
//!     running: AtomicBool,
//! }
//!
//! impl Component for Clock {
//!     fn construct() -> Option<Self> {
//!         Some(Self::default())
//!     }
//!
//!     fn declare(d: &mut Declarer<'_, Self>) {
//!         d.service(ServiceDecl::new("clock").priority(10));
//!         d.activate("start", |clock: Arc<Clock>| async move {
//!             clock.running.store(true, Ordering::SeqCst);
//!             Ok(())
//!         });
//!     }
//! }
//!
//! let mut bootstrap = Bootstrap::new();
//! bootstrap.scan::<Clock>();
//! let records = bootstrap.records().unwrap();
//! assert_eq!(records[0].id, "clock");
//! assert_eq!(records[0].priority, 10);
//! ```

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use crate::error::{BoxError, MetadataError};
use crate::identity::{IdentityRegistry, OwnerToken, Target};
use crate::instance::{downcast, Arguments, BoxFuture, FactoryFn, HookFn, Instance};
use crate::metadata::{Annotation, AnnotationKind, ClassAggregate, MetadataAggregator, Payload, SERVICE_PROVIDER};
use crate::record::{normalize, ServiceRecord};

/// Class-scope service declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceDecl {
    pub id: String,
    pub priority: Option<i32>,
    pub interfaces: Vec<String>,
    pub disabled: bool,
}

impl ServiceDecl {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn interface(mut self, name: impl Into<String>) -> Self {
        self.interfaces.push(name.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }
}

/// Parameter-scope dependency declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyDecl {
    /// A literal service id.
    Service(String),
    /// The implementers of an interface; `min_count` defaults to 1.
    Interface { name: String, min_count: Option<u32> },
}

/// Method-scope role descriptor, holding the callable captured at declaration.
#[derive(Clone)]
pub enum MethodRole {
    Factory(FactoryFn),
    Activate(HookFn),
    Deactivate(HookFn),
    Inject(HookFn),
}

impl fmt::Debug for MethodRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = match self {
            MethodRole::Factory(_) => "Factory",
            MethodRole::Activate(_) => "Activate",
            MethodRole::Deactivate(_) => "Deactivate",
            MethodRole::Inject(_) => "Inject",
        };
        f.write_str(role)
    }
}

/// A type that can be scanned into a service.
pub trait Component: Send + Sync + Sized + 'static {
    /// Builds the instance when the service declares no factory.
    fn construct() -> Option<Self> {
        None
    }

    /// Emits the component's annotations.
    fn declare(d: &mut Declarer<'_, Self>);
}

/// Annotation sink for one component type.
///
/// Member annotations are pushed as they are declared; the class-scope
/// declarations are held back and pushed once [`Component::declare`] returns.
pub struct Declarer<'a, T> {
    bootstrap: &'a mut Bootstrap,
    owner: OwnerToken,
    class_annotations: Vec<Annotation>,
    _component: PhantomData<fn() -> T>,
}

impl<'a, T: Component> Declarer<'a, T> {
    fn new(bootstrap: &'a mut Bootstrap) -> Self {
        Self {
            bootstrap,
            owner: OwnerToken::of::<T>(),
            class_annotations: Vec::new(),
            _component: PhantomData,
        }
    }

    /// Declares the component as a service.
    pub fn service(&mut self, decl: ServiceDecl) -> &mut Self {
        self.class_annotations.push(Annotation::new(
            AnnotationKind::Class,
            SERVICE_PROVIDER,
            "Service",
            Payload::Service(decl),
        ));
        self
    }

    /// Declares a static factory. The first argument is the configuration value
    /// named by the service's `config_id`, if any.
    pub fn factory<F, Fut>(&mut self, name: &str, factory: F) -> MethodDeclarer<'_, 'a, T>
    where
        F: Fn(Option<toml::Value>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        let call: FactoryFn = Arc::new(
            move |config: Option<toml::Value>, args: Arguments| -> BoxFuture<Result<Instance, BoxError>> {
                let built = factory(config, args);
                Box::pin(async move { built.await.map(|component| Arc::new(component) as Instance) })
            },
        );
        self.method(Target::Class(self.owner.clone()), name, "Factory", MethodRole::Factory(call))
    }

    /// Declares the activation hook.
    pub fn activate<F, Fut>(&mut self, name: &str, hook: F) -> &mut Self
    where
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let call = instance_hook::<T, _, _>(move |component, _| hook(component));
        self.method(Target::Prototype(self.owner.clone()), name, "Activate", MethodRole::Activate(call));
        self
    }

    /// Declares the deactivation hook.
    pub fn deactivate<F, Fut>(&mut self, name: &str, hook: F) -> &mut Self
    where
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let call = instance_hook::<T, _, _>(move |component, _| hook(component));
        self.method(Target::Prototype(self.owner.clone()), name, "Deactivate", MethodRole::Deactivate(call));
        self
    }

    /// Declares an injectable setter, run after instantiation and before activation.
    pub fn inject<F, Fut>(&mut self, name: &str, setter: F) -> MethodDeclarer<'_, 'a, T>
    where
        F: Fn(Arc<T>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let call = instance_hook::<T, _, _>(setter);
        self.method(Target::Prototype(self.owner.clone()), name, "Inject", MethodRole::Inject(call))
    }

    /// Attaches free-form metadata from another provider to a property.
    pub fn property(
        &mut self,
        name: &str,
        provider: &'static str,
        decorator: &'static str,
        value: toml::Value,
    ) -> &mut Self {
        let bootstrap = &mut *self.bootstrap;
        bootstrap.aggregator.push_property(
            &mut bootstrap.identities,
            &Target::Prototype(self.owner.clone()),
            name,
            Annotation::new(AnnotationKind::Property, provider, decorator, Payload::Value(value)),
        );
        self
    }

    fn method(
        &mut self,
        target: Target,
        name: &str,
        decorator: &'static str,
        role: MethodRole,
    ) -> MethodDeclarer<'_, 'a, T> {
        let bootstrap = &mut *self.bootstrap;
        bootstrap.aggregator.push_method(
            &mut bootstrap.identities,
            &target,
            name,
            Annotation::new(AnnotationKind::Method, SERVICE_PROVIDER, decorator, Payload::Method(role)),
        );
        MethodDeclarer {
            declarer: self,
            target,
            method: name.to_string(),
        }
    }

    fn finish(self) {
        let bootstrap = self.bootstrap;
        let target = Target::Class(self.owner);
        for annotation in self.class_annotations {
            bootstrap
                .aggregator
                .push_class(&mut bootstrap.identities, &target, annotation);
        }
    }
}

fn instance_hook<T, F, Fut>(hook: F) -> HookFn
where
    T: Component,
    F: Fn(Arc<T>, Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    Arc::new(
        move |instance: Instance, args: Arguments| -> BoxFuture<Result<(), BoxError>> {
            match downcast::<T>(instance) {
                Ok(component) => Box::pin(hook(component, args)),
                Err(mismatch) => Box::pin(async move { Err(BoxError::from(mismatch)) }),
            }
        },
    )
}

/// Declares the parameters of a factory or injectable setter.
pub struct MethodDeclarer<'d, 'a, T> {
    declarer: &'d mut Declarer<'a, T>,
    target: Target,
    method: String,
}

impl<T> MethodDeclarer<'_, '_, T> {
    /// The argument at `index` is the service registered as `id`.
    pub fn depends_on(self, index: usize, id: &str) -> Self {
        self.parameter(index, "Inject", DependencyDecl::Service(id.to_string()))
    }

    /// The argument at `index` is the live list of `interface` implementers;
    /// the service waits until at least `min_count` (default 1) are active.
    pub fn implementers(self, index: usize, interface: &str, min_count: Option<u32>) -> Self {
        self.parameter(
            index,
            "InjectAll",
            DependencyDecl::Interface {
                name: interface.to_string(),
                min_count,
            },
        )
    }

    fn parameter(self, index: usize, decorator: &'static str, decl: DependencyDecl) -> Self {
        let bootstrap = &mut *self.declarer.bootstrap;
        bootstrap.aggregator.push_parameter(
            &mut bootstrap.identities,
            &self.target,
            &self.method,
            index,
            Annotation::new(AnnotationKind::Parameter, SERVICE_PROVIDER, decorator, Payload::Dependency(decl)),
        );
        self
    }
}

/// Owns the registries for one scan of component types.
#[derive(Debug, Default)]
pub struct Bootstrap {
    identities: IdentityRegistry,
    aggregator: MetadataAggregator,
}

impl Bootstrap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects the annotations of `T`.
    pub fn scan<T: Component>(&mut self) -> &mut Self {
        let mut declarer = Declarer::<T>::new(self);
        T::declare(&mut declarer);
        declarer.finish();
        self
    }

    pub fn aggregates(&mut self) -> Vec<ClassAggregate> {
        self.aggregator.finalized()
    }

    /// Normalizes every scanned component that uses the service vocabulary.
    pub fn records(&mut self) -> Result<Vec<ServiceRecord>, MetadataError> {
        let aggregates = self.aggregator.finalized();
        let mut records = Vec::with_capacity(aggregates.len());
        for aggregate in aggregates.iter().filter(|a| a.has_service_metadata()) {
            let record = normalize(aggregate)?;
            debug!(service = %record.id, gid = %record.gid, "Normalized service record");
            records.push(record);
        }
        Ok(records)
    }

    pub fn identities(&self) -> &IdentityRegistry {
        &self.identities
    }

    pub fn identities_mut(&mut self) -> &mut IdentityRegistry {
        &mut self.identities
    }

    pub fn reset(&mut self) {
        self.identities.reset();
        self.aggregator.reset();
    }
}
