//! # Metadata Aggregator
//!
//! Collects the annotations emitted during a scan into one [`ClassAggregate`]
//! per component.
//!
//! The scan is single pass: annotations for one component arrive as a
//! contiguous run, and moving on to a different gid finalizes the aggregate that
//! was open. Because gids come from explicit owner tokens, a run that comes back
//! to an owner that was already finalized is merged into that owner's aggregate
//! instead of producing a second one.

use crate::declare::{DependencyDecl, MethodRole, ServiceDecl};
use crate::identity::{ClassRef, Gid, IdentityRegistry, Target};

/// Provider namespace of the service vocabulary.
pub const SERVICE_PROVIDER: &str = "service";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationKind {
    Class,
    Method,
    Property,
    Parameter,
}

/// Data carried by an annotation.
#[derive(Debug, Clone)]
pub enum Payload {
    Service(ServiceDecl),
    Method(MethodRole),
    Dependency(DependencyDecl),
    /// Free-form data for providers outside the service vocabulary.
    Value(toml::Value),
}

#[derive(Debug, Clone)]
pub struct Annotation {
    pub kind: AnnotationKind,
    pub provider: &'static str,
    pub decorator: &'static str,
    pub payload: Payload,
}

impl Annotation {
    pub fn new(
        kind: AnnotationKind,
        provider: &'static str,
        decorator: &'static str,
        payload: Payload,
    ) -> Self {
        Self {
            kind,
            provider,
            decorator,
            payload,
        }
    }

    pub fn is_service(&self) -> bool {
        self.provider == SERVICE_PROVIDER
    }
}

/// Annotations collected for one method.
#[derive(Debug, Clone, Default)]
pub struct MethodMetadata {
    pub metadata: Vec<Annotation>,
    /// Parameter annotations, indexed by position.
    pub parameters: Vec<Vec<Annotation>>,
}

/// Everything collected for one gid.
#[derive(Debug, Clone)]
pub struct ClassAggregate {
    pub gid: Gid,
    pub class_ref: ClassRef,
    pub class_metadata: Vec<Annotation>,
    pub methods: Vec<(String, MethodMetadata)>,
    pub static_methods: Vec<(String, MethodMetadata)>,
    pub properties: Vec<(String, Vec<Annotation>)>,
    pub static_properties: Vec<(String, Vec<Annotation>)>,
}

impl ClassAggregate {
    fn new(gid: Gid, class_ref: ClassRef) -> Self {
        Self {
            gid,
            class_ref,
            class_metadata: Vec::new(),
            methods: Vec::new(),
            static_methods: Vec::new(),
            properties: Vec::new(),
            static_properties: Vec::new(),
        }
    }

    pub fn method(&self, name: &str) -> Option<&MethodMetadata> {
        self.methods
            .iter()
            .chain(&self.static_methods)
            .find(|(method, _)| method == name)
            .map(|(_, metadata)| metadata)
    }

    /// Whether any annotation belongs to the service vocabulary.
    pub fn has_service_metadata(&self) -> bool {
        let methods = self.methods.iter().chain(&self.static_methods);
        self.class_metadata.iter().any(Annotation::is_service)
            || methods.clone().any(|(_, m)| m.metadata.iter().any(Annotation::is_service))
            || methods.flat_map(|(_, m)| m.parameters.iter().flatten()).any(Annotation::is_service)
    }

    fn merge(&mut self, other: ClassAggregate) {
        self.class_metadata.extend(other.class_metadata);
        for (name, method) in other.methods {
            let entry = slot(&mut self.methods, &name);
            entry.metadata.extend(method.metadata);
            merge_parameters(&mut entry.parameters, method.parameters);
        }
        for (name, method) in other.static_methods {
            let entry = slot(&mut self.static_methods, &name);
            entry.metadata.extend(method.metadata);
            merge_parameters(&mut entry.parameters, method.parameters);
        }
        for (name, annotations) in other.properties {
            slot(&mut self.properties, &name).extend(annotations);
        }
        for (name, annotations) in other.static_properties {
            slot(&mut self.static_properties, &name).extend(annotations);
        }
    }
}

fn slot<'a, V: Default>(entries: &'a mut Vec<(String, V)>, name: &str) -> &'a mut V {
    let index = match entries.iter().position(|(key, _)| key == name) {
        Some(index) => index,
        None => {
            entries.push((name.to_string(), V::default()));
            entries.len() - 1
        }
    };
    &mut entries[index].1
}

fn merge_parameters(into: &mut Vec<Vec<Annotation>>, from: Vec<Vec<Annotation>>) {
    for (index, annotations) in from.into_iter().enumerate() {
        if into.len() <= index {
            into.resize_with(index + 1, Vec::new);
        }
        into[index].extend(annotations);
    }
}

/// Single-pass aggregator of annotations into per-component records.
#[derive(Debug, Default)]
pub struct MetadataAggregator {
    current: Option<ClassAggregate>,
    finalized: Vec<ClassAggregate>,
}

impl MetadataAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_class(
        &mut self,
        identities: &mut IdentityRegistry,
        target: &Target,
        annotation: Annotation,
    ) {
        self.open(identities, target).class_metadata.push(annotation);
    }

    pub fn push_method(
        &mut self,
        identities: &mut IdentityRegistry,
        target: &Target,
        method: &str,
        annotation: Annotation,
    ) {
        let aggregate = self.open(identities, target);
        let methods = if target.is_static() {
            &mut aggregate.static_methods
        } else {
            &mut aggregate.methods
        };
        slot(methods, method).metadata.push(annotation);
    }

    pub fn push_property(
        &mut self,
        identities: &mut IdentityRegistry,
        target: &Target,
        property: &str,
        annotation: Annotation,
    ) {
        let aggregate = self.open(identities, target);
        let properties = if target.is_static() {
            &mut aggregate.static_properties
        } else {
            &mut aggregate.properties
        };
        slot(properties, property).push(annotation);
    }

    pub fn push_parameter(
        &mut self,
        identities: &mut IdentityRegistry,
        target: &Target,
        method: &str,
        index: usize,
        annotation: Annotation,
    ) {
        let aggregate = self.open(identities, target);
        let methods = if target.is_static() {
            &mut aggregate.static_methods
        } else {
            &mut aggregate.methods
        };
        let parameters = &mut slot(methods, method).parameters;
        if parameters.len() <= index {
            parameters.resize_with(index + 1, Vec::new);
        }
        parameters[index].push(annotation);
    }

    /// Flushes the open aggregate (once) and returns every finalized aggregate in scan order.
    pub fn finalized(&mut self) -> Vec<ClassAggregate> {
        self.flush();
        self.finalized.clone()
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.finalized.clear();
    }

    fn open(&mut self, identities: &mut IdentityRegistry, target: &Target) -> &mut ClassAggregate {
        let gid = identities.get_or_make_id(target);
        if self.current.as_ref().is_some_and(|open| open.gid != gid) {
            self.flush();
        }
        let class_ref = identities
            .class_ref(&gid)
            .unwrap_or_else(|| target.owner().class());
        self.current
            .get_or_insert_with(|| ClassAggregate::new(gid, class_ref))
    }

    fn flush(&mut self) {
        let Some(done) = self.current.take() else {
            return;
        };
        match self.finalized.iter_mut().find(|seen| seen.gid == done.gid) {
            Some(existing) => existing.merge(done),
            None => self.finalized.push(done),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declare::{Component, Declarer};
    use crate::identity::OwnerToken;

    struct Alpha;
    struct Beta;

    impl Component for Alpha {
        fn declare(_: &mut Declarer<'_, Self>) {}
    }

    impl Component for Beta {
        fn declare(_: &mut Declarer<'_, Self>) {}
    }

    fn value(tag: &str) -> Annotation {
        Annotation::new(
            AnnotationKind::Method,
            "route",
            "Get",
            Payload::Value(toml::Value::String(tag.to_string())),
        )
    }

    fn tag(annotation: &Annotation) -> &str {
        match &annotation.payload {
            Payload::Value(toml::Value::String(tag)) => tag,
            _ => "",
        }
    }

    #[test]
    fn groups_members_and_class_per_owner() {
        let mut identities = IdentityRegistry::new();
        let mut aggregator = MetadataAggregator::new();
        let alpha = OwnerToken::of::<Alpha>();
        let beta = OwnerToken::of::<Beta>();

        aggregator.push_method(&mut identities, &Target::Prototype(alpha.clone()), "run", value("a-run"));
        aggregator.push_parameter(&mut identities, &Target::Prototype(alpha.clone()), "run", 1, value("a-p1"));
        aggregator.push_method(&mut identities, &Target::Class(alpha.clone()), "create", value("a-create"));
        aggregator.push_class(&mut identities, &Target::Class(alpha), value("a-class"));
        aggregator.push_property(&mut identities, &Target::Prototype(beta.clone()), "name", value("b-name"));
        aggregator.push_class(&mut identities, &Target::Class(beta), value("b-class"));

        let aggregates = aggregator.finalized();
        assert_eq!(aggregates.len(), 2);

        let first = &aggregates[0];
        assert_eq!(first.class_ref.name(), "Alpha");
        assert_eq!(first.methods.len(), 1);
        assert_eq!(first.static_methods.len(), 1);
        let run = first.method("run").expect("run collected");
        assert_eq!(run.parameters.len(), 2);
        assert!(run.parameters[0].is_empty());
        assert_eq!(tag(&run.parameters[1][0]), "a-p1");
        assert_eq!(tag(&first.class_metadata[0]), "a-class");

        let second = &aggregates[1];
        assert_eq!(second.properties[0].0, "name");
        assert!(!second.has_service_metadata());
    }

    #[test]
    fn finalized_is_idempotent() {
        let mut identities = IdentityRegistry::new();
        let mut aggregator = MetadataAggregator::new();
        aggregator.push_class(
            &mut identities,
            &Target::Class(OwnerToken::of::<Alpha>()),
            value("a"),
        );

        let once = aggregator.finalized();
        let twice = aggregator.finalized();
        assert_eq!(once.len(), 1);
        assert_eq!(twice.len(), 1);
        assert_eq!(twice[0].class_metadata.len(), 1);
    }

    #[test]
    fn interleaved_runs_merge_into_the_owner() {
        let mut identities = IdentityRegistry::new();
        let mut aggregator = MetadataAggregator::new();
        let alpha = OwnerToken::of::<Alpha>();
        let beta = OwnerToken::of::<Beta>();

        aggregator.push_method(&mut identities, &Target::Prototype(alpha.clone()), "run", value("a1"));
        aggregator.push_method(&mut identities, &Target::Prototype(beta.clone()), "run", value("b1"));
        aggregator.push_method(&mut identities, &Target::Prototype(alpha.clone()), "run", value("a2"));
        aggregator.push_class(&mut identities, &Target::Class(alpha), value("a-class"));
        aggregator.push_class(&mut identities, &Target::Class(beta), value("b-class"));

        let aggregates = aggregator.finalized();
        assert_eq!(aggregates.len(), 2);
        let alpha_run = aggregates[0].method("run").expect("alpha run");
        let tags: Vec<_> = alpha_run.metadata.iter().map(tag).collect();
        assert_eq!(tags, ["a1", "a2"]);
        assert_eq!(aggregates[1].class_metadata.len(), 1);
    }
}
