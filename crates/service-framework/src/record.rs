//! # Service Records
//!
//! [`normalize`] flattens a [`ClassAggregate`] into a [`ServiceRecord`]: the
//! identity, priority, interfaces, dependency set and lifecycle callables the
//! container needs to run the service.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use crate::declare::{DependencyDecl, MethodRole, ServiceDecl};
use crate::error::MetadataError;
use crate::identity::{ClassRef, Gid, IdentityRegistry, OwnerToken, Target};
use crate::instance::{FactoryFn, HookFn};
use crate::metadata::{Annotation, ClassAggregate, Payload};

const INTERFACE_PREFIX: char = '#';

/// Dependency key for the implementers of an interface.
pub fn interface_key(interface: &str) -> String {
    format!("{INTERFACE_PREFIX}{interface}")
}

/// A parsed dependency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKey<'a> {
    Service(&'a str),
    Interface(&'a str),
}

impl<'a> DependencyKey<'a> {
    pub fn parse(key: &'a str) -> Self {
        match key.strip_prefix(INTERFACE_PREFIX) {
            Some(interface) => DependencyKey::Interface(interface),
            None => DependencyKey::Service(key),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependency {
    pub min_count: Option<u32>,
}

/// What gets injected at one argument position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Injection {
    Unbound,
    Service(String),
    Interface(String),
}

#[derive(Clone)]
pub struct FactoryMethod {
    pub name: String,
    pub call: FactoryFn,
    pub args: Vec<Injection>,
}

#[derive(Clone)]
pub struct LifecycleHook {
    pub name: String,
    pub call: HookFn,
}

#[derive(Clone)]
pub struct InjectableMethod {
    pub name: String,
    pub call: HookFn,
    pub args: Vec<Injection>,
}

fn same_callable<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl PartialEq for FactoryMethod {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.args == other.args && same_callable(&self.call, &other.call)
    }
}

impl PartialEq for LifecycleHook {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && same_callable(&self.call, &other.call)
    }
}

impl PartialEq for InjectableMethod {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.args == other.args && same_callable(&self.call, &other.call)
    }
}

impl fmt::Debug for FactoryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryMethod")
            .field("name", &self.name)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for LifecycleHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LifecycleHook").field(&self.name).finish()
    }
}

impl fmt::Debug for InjectableMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectableMethod")
            .field("name", &self.name)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// Normalized description of one service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRecord {
    pub id: String,
    pub gid: Gid,
    pub class_ref: ClassRef,
    /// Higher starts earlier.
    pub priority: i32,
    pub interfaces: Vec<String>,
    /// Keyed by service id, or by `#interface` for implementer dependencies.
    pub dependencies: BTreeMap<String, Dependency>,
    pub factory: Option<FactoryMethod>,
    /// Configuration value handed to the factory as its leading argument.
    pub config_id: Option<String>,
    pub activate: Option<LifecycleHook>,
    pub deactivate: Option<LifecycleHook>,
    pub injectable_methods: Vec<InjectableMethod>,
    pub disabled: bool,
}

/// Fields that environment-specific configuration may override.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RecordOverrides {
    pub priority: Option<i32>,
    #[serde(rename = "config")]
    pub config_id: Option<String>,
    pub interfaces: Option<Vec<String>>,
    pub disabled: Option<bool>,
}

impl ServiceRecord {
    fn declared(gid: Gid, class_ref: ClassRef, decl: &ServiceDecl) -> Self {
        Self {
            id: decl.id.clone(),
            gid,
            class_ref,
            priority: decl.priority.unwrap_or(0),
            interfaces: decl.interfaces.clone(),
            dependencies: BTreeMap::new(),
            factory: None,
            config_id: None,
            activate: None,
            deactivate: None,
            injectable_methods: Vec::new(),
            disabled: decl.disabled,
        }
    }

    fn add_dependency(&mut self, decl: &DependencyDecl) {
        match decl {
            DependencyDecl::Service(id) => {
                self.dependencies.insert(id.clone(), Dependency::default());
            }
            DependencyDecl::Interface { name, min_count } => {
                self.dependencies.insert(
                    interface_key(name),
                    Dependency {
                        min_count: Some(min_count.unwrap_or(1)),
                    },
                );
            }
        }
    }

    /// A copy with the same identity and selected fields overridden.
    pub fn clone_with(&self, overrides: &RecordOverrides) -> ServiceRecord {
        let mut record = self.clone();
        if let Some(priority) = overrides.priority {
            record.priority = priority;
        }
        if let Some(config_id) = &overrides.config_id {
            record.config_id = Some(config_id.clone());
        }
        if let Some(interfaces) = &overrides.interfaces {
            record.interfaces = interfaces.clone();
        }
        if let Some(disabled) = overrides.disabled {
            record.disabled = disabled;
        }
        record
    }

    /// A copy registered under a new id and a freshly minted gid, sharing the
    /// implementation type of this record.
    pub fn clone_as_new_service(
        &self,
        identities: &mut IdentityRegistry,
        new_id: &str,
        overrides: &RecordOverrides,
    ) -> ServiceRecord {
        let owner = OwnerToken::derived(self.class_ref, new_id);
        let gid = identities.get_or_make_id(&Target::Class(owner));
        if identities.last_issued() == Some(&gid) {
            identities.swap_identity(self.class_ref);
        }
        let mut record = self.clone_with(overrides);
        record.id = new_id.to_string();
        record.gid = gid;
        record
    }
}

fn dependency_of(annotation: &Annotation) -> Option<&DependencyDecl> {
    match &annotation.payload {
        Payload::Dependency(decl) if annotation.is_service() => Some(decl),
        _ => None,
    }
}

fn role_of(annotation: &Annotation) -> Option<&MethodRole> {
    match &annotation.payload {
        Payload::Method(role) if annotation.is_service() => Some(role),
        _ => None,
    }
}

/// Builds the service record for an aggregate with exactly one service declaration.
pub fn normalize(aggregate: &ClassAggregate) -> Result<ServiceRecord, MetadataError> {
    let decls: Vec<&ServiceDecl> = aggregate
        .class_metadata
        .iter()
        .filter(|annotation| annotation.is_service())
        .filter_map(|annotation| match &annotation.payload {
            Payload::Service(decl) => Some(decl),
            _ => None,
        })
        .collect();
    let [decl] = decls.as_slice() else {
        return Err(MetadataError::Cardinality {
            gid: aggregate.gid.clone(),
            found: decls.len(),
        });
    };

    let mut record = ServiceRecord::declared(aggregate.gid.clone(), aggregate.class_ref, decl);
    for (name, method) in aggregate.methods.iter().chain(&aggregate.static_methods) {
        // First annotation per position decides what gets injected there.
        let args: Vec<Injection> = method
            .parameters
            .iter()
            .map(|position| match position.iter().find_map(dependency_of) {
                Some(DependencyDecl::Service(id)) => Injection::Service(id.clone()),
                Some(DependencyDecl::Interface { name: interface, .. }) => {
                    Injection::Interface(interface.clone())
                }
                None => Injection::Unbound,
            })
            .collect();
        for dependency in method.parameters.iter().flatten().filter_map(dependency_of) {
            record.add_dependency(dependency);
        }

        match method.metadata.iter().find_map(role_of) {
            Some(MethodRole::Factory(call)) => {
                record.factory = Some(FactoryMethod {
                    name: name.clone(),
                    call: call.clone(),
                    args,
                });
            }
            Some(MethodRole::Activate(call)) => {
                record.activate = Some(LifecycleHook {
                    name: name.clone(),
                    call: call.clone(),
                });
            }
            Some(MethodRole::Deactivate(call)) => {
                record.deactivate = Some(LifecycleHook {
                    name: name.clone(),
                    call: call.clone(),
                });
            }
            Some(MethodRole::Inject(call)) => {
                record.injectable_methods.push(InjectableMethod {
                    name: name.clone(),
                    call: call.clone(),
                    args,
                });
            }
            None if !method.parameters.is_empty() => {
                warn!(service = %record.id, method = %name, "Method has injected parameters but no callable");
            }
            None => {}
        }
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declare::{Bootstrap, Component, Declarer};
    use crate::metadata::{AnnotationKind, MetadataAggregator, SERVICE_PROVIDER};
    use std::sync::Arc;

    struct Reporter;

    impl Component for Reporter {
        fn declare(d: &mut Declarer<'_, Self>) {
            d.service(ServiceDecl::new("reporter").priority(3).interface("sink"));
            d.factory("create", |_, _| async { Ok(Reporter) })
                .depends_on(0, "clock")
                .implementers(1, "source", Some(2));
            d.inject("set_store", |_: Arc<Reporter>, _| async { Ok(()) })
                .depends_on(1, "store");
            d.activate("open", |_: Arc<Reporter>| async { Ok(()) });
            d.deactivate("close", |_: Arc<Reporter>| async { Ok(()) });
        }
    }

    struct Headless;

    impl Component for Headless {
        fn declare(d: &mut Declarer<'_, Self>) {
            d.inject("set_clock", |_: Arc<Headless>, _| async { Ok(()) })
                .depends_on(0, "clock");
        }
    }

    struct Twice;

    impl Component for Twice {
        fn declare(d: &mut Declarer<'_, Self>) {
            d.service(ServiceDecl::new("one"));
            d.service(ServiceDecl::new("two"));
        }
    }

    fn reporter() -> ServiceRecord {
        let mut bootstrap = Bootstrap::new();
        bootstrap.scan::<Reporter>();
        bootstrap.records().expect("reporter normalizes").remove(0)
    }

    #[test]
    fn normalizes_roles_and_dependencies() {
        let record = reporter();
        assert_eq!(record.id, "reporter");
        assert_eq!(record.priority, 3);
        assert_eq!(record.interfaces, ["sink"]);

        let factory = record.factory.as_ref().expect("factory");
        assert_eq!(factory.name, "create");
        assert_eq!(
            factory.args,
            [Injection::Service("clock".into()), Injection::Interface("source".into())]
        );

        let setter = &record.injectable_methods[0];
        assert_eq!(setter.name, "set_store");
        assert_eq!(setter.args, [Injection::Unbound, Injection::Service("store".into())]);

        assert_eq!(record.activate.as_ref().map(|h| h.name.as_str()), Some("open"));
        assert_eq!(record.deactivate.as_ref().map(|h| h.name.as_str()), Some("close"));

        let keys: Vec<_> = record.dependencies.keys().map(String::as_str).collect();
        assert_eq!(keys, ["#source", "clock", "store"]);
        assert_eq!(record.dependencies["#source"].min_count, Some(2));
        assert_eq!(record.dependencies["clock"].min_count, None);
    }

    #[test]
    fn missing_or_repeated_service_declaration_is_rejected() {
        let mut bootstrap = Bootstrap::new();
        bootstrap.scan::<Headless>();
        assert!(matches!(
            bootstrap.records(),
            Err(MetadataError::Cardinality { found: 0, .. })
        ));

        let mut bootstrap = Bootstrap::new();
        bootstrap.scan::<Twice>();
        assert!(matches!(
            bootstrap.records(),
            Err(MetadataError::Cardinality { found: 2, .. })
        ));
    }

    #[test]
    fn interface_dependency_defaults_to_one_implementer() {
        let mut identities = IdentityRegistry::new();
        let mut aggregator = MetadataAggregator::new();
        let target = Target::Prototype(OwnerToken::of::<Headless>());
        aggregator.push_parameter(
            &mut identities,
            &target,
            "set_sources",
            0,
            Annotation::new(
                AnnotationKind::Parameter,
                SERVICE_PROVIDER,
                "InjectAll",
                Payload::Dependency(DependencyDecl::Interface {
                    name: "source".into(),
                    min_count: None,
                }),
            ),
        );
        aggregator.push_class(
            &mut identities,
            &Target::Class(OwnerToken::of::<Headless>()),
            Annotation::new(
                AnnotationKind::Class,
                SERVICE_PROVIDER,
                "Service",
                Payload::Service(ServiceDecl::new("headless")),
            ),
        );

        let record = normalize(&aggregator.finalized()[0]).expect("normalizes");
        assert_eq!(record.dependencies["#source"].min_count, Some(1));
        assert!(record.injectable_methods.is_empty());
    }

    #[test]
    fn clone_with_only_touches_overridden_fields() {
        let record = reporter();
        let clone = record.clone_with(&RecordOverrides {
            priority: Some(5),
            ..RecordOverrides::default()
        });

        assert_eq!(clone.priority, 5);
        assert_eq!(ServiceRecord { priority: 3, ..clone.clone() }, record);
    }

    #[test]
    fn clone_as_new_service_mints_a_new_identity() {
        let mut bootstrap = Bootstrap::new();
        bootstrap.scan::<Reporter>();
        let record = bootstrap.records().expect("normalizes").remove(0);

        let copy = record.clone_as_new_service(
            bootstrap.identities_mut(),
            "reporter-2",
            &RecordOverrides {
                disabled: Some(true),
                ..RecordOverrides::default()
            },
        );
        assert_eq!(copy.id, "reporter-2");
        assert_ne!(copy.gid, record.gid);
        assert!(copy.disabled);
        assert_eq!(copy.class_ref, record.class_ref);
        assert_eq!(bootstrap.identities().class_ref(&copy.gid), Some(record.class_ref));

        // Deriving the same id again keeps the identity stable.
        let again = record.clone_as_new_service(bootstrap.identities_mut(), "reporter-2", &RecordOverrides::default());
        assert_eq!(again.gid, copy.gid);
    }

    #[test]
    fn dependency_keys_parse() {
        assert_eq!(DependencyKey::parse("#sink"), DependencyKey::Interface("sink"));
        assert_eq!(DependencyKey::parse("clock"), DependencyKey::Service("clock"));
        assert_eq!(interface_key("sink"), "#sink");
    }
}
