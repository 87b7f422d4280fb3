//! Parameter identity and immutable definitions

use core::any::type_name;

use hashbrown::HashMap;

/// Stable identity of a parameter, unique across normalized and typed parameters
pub type ParamId = u32;

/// Which side's logic is authoritative for mutating a parameter
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Owner {
    /// The real-time audio thread
    Rt,
    /// The user-interface thread
    Gui,
}

/// Tag describing how a parameter's value is represented
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ValueKind {
    /// A continuous value in `[0.0, 1.0]`
    Normalized,
    /// An arbitrary value exchanged as serialized messages
    Typed(&'static str),
}

/// Descriptor for a single parameter
///
/// Created once while the plugin registers its parameters and never mutated
/// afterwards.
///
/// ```
/// # use paramlink::{ParamDef, Owner};
/// let label = ParamDef::typed::<String>(12).with_owner(Owner::Gui).shared();
/// assert!(label.is_shared());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ParamDef {
    id: ParamId,
    owner: Owner,
    shared: bool,
    transient: bool,
    value_kind: ValueKind,
}

impl ParamDef {
    /// Definition for a normalized (host-visible) parameter, RT owned by default
    pub fn normalized(id: ParamId) -> Self {
        Self {
            id,
            owner: Owner::Rt,
            shared: false,
            transient: false,
            value_kind: ValueKind::Normalized,
        }
    }

    /// Definition for a typed messaging parameter carrying values of `T`
    pub fn typed<T: ?Sized>(id: ParamId) -> Self {
        Self {
            id,
            owner: Owner::Rt,
            shared: false,
            transient: false,
            value_kind: ValueKind::Typed(type_name::<T>()),
        }
    }

    pub fn with_owner(mut self, owner: Owner) -> Self {
        self.owner = owner;
        self
    }

    /// Mark the parameter as eligible for cross-thread messaging
    pub fn shared(mut self) -> Self {
        self.shared = true;
        self
    }

    /// Exclude the parameter from the persisted state
    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    #[inline]
    pub fn id(&self) -> ParamId {
        self.id
    }

    #[inline]
    pub fn owner(&self) -> Owner {
        self.owner
    }

    #[inline]
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    #[inline]
    pub fn is_transient(&self) -> bool {
        self.transient
    }

    #[inline]
    pub fn value_kind(&self) -> ValueKind {
        self.value_kind
    }
}

/// The role a registered parameter plays in the RT store
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ParamRole {
    Plain,
    Outbound,
    Inbound,
}

/// Read-only view of every registered definition
///
/// Shared behind an `Arc` by the RT state, the host-thread handle and the GUI
/// state once the registry has been built.
#[derive(Debug, Default)]
pub struct ParamDefs {
    defs: HashMap<ParamId, (ParamDef, ParamRole)>,
    registration_order: Vec<ParamId>,
}

impl ParamDefs {
    pub(crate) fn insert(&mut self, def: ParamDef, role: ParamRole) {
        self.defs.insert(def.id(), (def, role));
        self.registration_order.push(def.id());
    }

    /// Look up a definition by id
    pub fn definition(&self, id: ParamId) -> Option<&ParamDef> {
        self.defs.get(&id).map(|(def, _)| def)
    }

    /// Which store a parameter was registered into
    pub fn role(&self, id: ParamId) -> Option<ParamRole> {
        self.defs.get(&id).map(|(_, role)| *role)
    }

    pub fn contains(&self, id: ParamId) -> bool {
        self.defs.contains_key(&id)
    }

    /// Ids in the order they were registered (enumeration only, not the save layout)
    pub fn registration_order(&self) -> &[ParamId] {
        &self.registration_order
    }

    pub fn len(&self) -> usize {
        self.registration_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registration_order.is_empty()
    }

    /// Iterate definitions in registration order
    pub fn iter(&self) -> impl Iterator<Item = &ParamDef> + '_ {
        self.registration_order
            .iter()
            .filter_map(move |id| self.definition(*id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let def = ParamDef::normalized(3);
        assert_eq!(def.owner(), Owner::Rt);
        assert!(!def.is_shared());
        assert!(!def.is_transient());
        assert_eq!(def.value_kind(), ValueKind::Normalized);

        let def = ParamDef::typed::<String>(4).with_owner(Owner::Gui).shared().transient();
        assert_eq!(def.owner(), Owner::Gui);
        assert!(def.is_shared() && def.is_transient());
        assert_eq!(def.value_kind(), ValueKind::Typed(type_name::<String>()));
    }

    #[test]
    fn defs_keep_registration_order() {
        let mut defs = ParamDefs::default();
        defs.insert(ParamDef::normalized(9), ParamRole::Plain);
        defs.insert(ParamDef::typed::<bool>(2).shared(), ParamRole::Outbound);

        assert_eq!(defs.registration_order(), &[9, 2]);
        assert_eq!(defs.role(2), Some(ParamRole::Outbound));
        assert_eq!(defs.iter().map(ParamDef::id).collect::<Vec<_>>(), vec![9, 2]);
        assert!(defs.definition(5).is_none());
    }
}
