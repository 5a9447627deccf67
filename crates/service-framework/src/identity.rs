//! # Identity Registry
//!
//! Every declared component gets a stable string identity (a [`Gid`]) that ties
//! together the annotations made on its members and on the type itself.
//!
//! Annotations are made against a [`Target`]: the *prototype form* for instance
//! members and the *class form* for the type itself and its static members.
//! Both forms carry the same explicit [`OwnerToken`], so the registry never has
//! to guess the owner from call order. The member-then-class hand-off is still
//! recognised and recorded as the "class form seen" transition.

use std::any::{type_name, Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::declare::Component;
use crate::instance::Instance;

/// Process-stable identity of a declared component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Gid(String);

impl Gid {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Gid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Gid {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Reference to the implementation type behind a component.
///
/// Equality and hashing only consider the type; the constructor is carried
/// along so the container can build the instance when no factory is declared.
#[derive(Clone, Copy)]
pub struct ClassRef {
    type_id: TypeId,
    type_name: &'static str,
    construct: fn() -> Option<Instance>,
}

impl ClassRef {
    pub fn of<T: Component>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            construct: construct_component::<T>,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Short type name (e.g. `Gob` instead of `service_recipe::services::actors::Gob`).
    pub fn name(&self) -> &'static str {
        self.type_name.rsplit("::").next().unwrap_or(self.type_name)
    }

    /// Builds an instance through [`Component::construct`], if the type supports it.
    pub fn construct(&self) -> Option<Instance> {
        (self.construct)()
    }
}

fn construct_component<T: Component>() -> Option<Instance> {
    T::construct().map(|component| Arc::new(component) as Instance)
}

impl PartialEq for ClassRef {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ClassRef {}

impl Hash for ClassRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClassRef").field(&self.name()).finish()
    }
}

/// Explicit owner of an annotation.
///
/// A plain token names a component type. A derived token names a new service
/// built on top of an existing type (see
/// [`ServiceRecord::clone_as_new_service`](crate::record::ServiceRecord::clone_as_new_service)).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerToken {
    class: ClassRef,
    derivation: Option<String>,
}

impl OwnerToken {
    pub fn of<T: Component>() -> Self {
        Self {
            class: ClassRef::of::<T>(),
            derivation: None,
        }
    }

    pub fn derived(base: ClassRef, name: &str) -> Self {
        Self {
            class: base,
            derivation: Some(name.to_string()),
        }
    }

    pub fn class(&self) -> ClassRef {
        self.class
    }
}

/// The thing an annotation is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Instance member scope.
    Prototype(OwnerToken),
    /// Type scope, including static members.
    Class(OwnerToken),
}

impl Target {
    pub fn owner(&self) -> &OwnerToken {
        match self {
            Target::Prototype(owner) | Target::Class(owner) => owner,
        }
    }

    /// Class-form targets carry static members.
    pub fn is_static(&self) -> bool {
        matches!(self, Target::Class(_))
    }
}

/// Issues and remembers gids for annotation targets.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    counter: u64,
    history: Vec<(Target, Gid)>,
    classes: HashMap<Gid, ClassRef>,
    class_form_seen: HashSet<Gid>,
    last_resolved: Option<(Target, Gid)>,
    last_issued: Option<Gid>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the gid for `target`, minting one the first time its owner is seen.
    pub fn get_or_make_id(&mut self, target: &Target) -> Gid {
        let gid = self
            .class_hand_off(target)
            .or_else(|| self.lookup(target))
            .unwrap_or_else(|| self.mint(target));
        if !self.history.iter().any(|(seen, _)| seen == target) {
            self.history.push((target.clone(), gid.clone()));
        }
        self.last_resolved = Some((target.clone(), gid.clone()));
        gid
    }

    // Member annotations of a type arrive right before the type's own annotation.
    fn class_hand_off(&mut self, target: &Target) -> Option<Gid> {
        let (Some((Target::Prototype(last_owner), gid)), Target::Class(owner)) =
            (&self.last_resolved, target)
        else {
            return None;
        };
        if last_owner != owner {
            return None;
        }
        let gid = gid.clone();
        self.class_form_seen.insert(gid.clone());
        Some(gid)
    }

    fn lookup(&mut self, target: &Target) -> Option<Gid> {
        let gid = self
            .history
            .iter()
            .find(|(seen, _)| seen.owner() == target.owner())
            .map(|(_, gid)| gid.clone())?;
        if target.is_static() {
            self.class_form_seen.insert(gid.clone());
        }
        Some(gid)
    }

    fn mint(&mut self, target: &Target) -> Gid {
        self.counter += 1;
        let gid = Gid(self.counter.to_string());
        self.classes.insert(gid.clone(), target.owner().class());
        if target.is_static() {
            self.class_form_seen.insert(gid.clone());
        }
        self.last_issued = Some(gid.clone());
        gid
    }

    /// Re-points the most recently issued gid at another implementation type.
    pub fn swap_identity(&mut self, class: ClassRef) {
        if let Some(gid) = &self.last_issued {
            self.classes.insert(gid.clone(), class);
        }
    }

    pub fn class_ref(&self, gid: &Gid) -> Option<ClassRef> {
        self.classes.get(gid).copied()
    }

    pub fn last_issued(&self) -> Option<&Gid> {
        self.last_issued.as_ref()
    }

    /// Whether the class form of this gid has been observed.
    pub fn class_form_seen(&self, gid: &Gid) -> bool {
        self.class_form_seen.contains(gid)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Convenience for `Any` based downcasts in the rest of the crate.
pub(crate) fn short_type_name<T: Any>() -> &'static str {
    let name = type_name::<T>();
    name.rsplit("::").next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declare::Declarer;

    struct Alpha;
    struct Beta;

    impl Component for Alpha {
        fn declare(_: &mut Declarer<'_, Self>) {}
    }

    impl Component for Beta {
        fn construct() -> Option<Self> {
            Some(Beta)
        }

        fn declare(_: &mut Declarer<'_, Self>) {}
    }

    #[test]
    fn member_then_class_shares_one_gid() {
        let mut registry = IdentityRegistry::new();
        let member = registry.get_or_make_id(&Target::Prototype(OwnerToken::of::<Alpha>()));
        assert!(!registry.class_form_seen(&member));

        let class = registry.get_or_make_id(&Target::Class(OwnerToken::of::<Alpha>()));
        assert_eq!(member, class);
        assert!(registry.class_form_seen(&class));
    }

    #[test]
    fn distinct_owners_get_monotonic_ids() {
        let mut registry = IdentityRegistry::new();
        let alpha = registry.get_or_make_id(&Target::Class(OwnerToken::of::<Alpha>()));
        let beta = registry.get_or_make_id(&Target::Class(OwnerToken::of::<Beta>()));
        assert_eq!(alpha.as_str(), "1");
        assert_eq!(beta.as_str(), "2");

        // Coming back to Alpha after Beta reuses the recorded id.
        let again = registry.get_or_make_id(&Target::Prototype(OwnerToken::of::<Alpha>()));
        assert_eq!(again, alpha);
    }

    #[test]
    fn swap_identity_repoints_last_issued() {
        let mut registry = IdentityRegistry::new();
        let base = ClassRef::of::<Beta>();
        let derived = OwnerToken::derived(ClassRef::of::<Alpha>(), "copy");
        let gid = registry.get_or_make_id(&Target::Class(derived));
        assert_eq!(registry.class_ref(&gid).map(|c| c.name()), Some("Alpha"));

        registry.swap_identity(base);
        assert_eq!(registry.class_ref(&gid), Some(base));
        assert!(registry.class_ref(&gid).and_then(|c| c.construct()).is_some());
    }

    #[test]
    fn reset_starts_counting_again() {
        let mut registry = IdentityRegistry::new();
        registry.get_or_make_id(&Target::Class(OwnerToken::of::<Alpha>()));
        registry.reset();
        let gid = registry.get_or_make_id(&Target::Class(OwnerToken::of::<Beta>()));
        assert_eq!(gid.as_str(), "1");
        assert!(registry.last_issued().is_some());
    }
}
