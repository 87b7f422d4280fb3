//! Parameter registration and construction of the synchronized state

use core::any::type_name;
use std::sync::Arc;

use hashbrown::HashMap;
use itertools::Itertools;
use tracing::{debug, error};

use crate::codec::ParamSerializer;
use crate::error::{LayoutError, RegistrationError};
use crate::gui::{ErasedGuiParam, GuiParameter, GuiState};
use crate::normalized::{NormalizedState, SaveOrder};
use crate::param::{Owner, ParamDef, ParamDefs, ParamId, ParamRole, ValueKind};
use crate::params::{
    ErasedInboundSender, Inbound, Outbound, RtInboundParameter, RtOutboundParameter, RtParam,
    RtPlainParameter,
};
use crate::rt_state::{RtState, RtStateHandle};

/// The three halves produced by [`ParameterRegistry::build`]
pub struct SyncState {
    /// Owned by the audio thread
    pub rt: RtState,
    /// Owned by the host's main thread: state persistence and inbound messages
    pub handle: RtStateHandle,
    /// Owned by the GUI: mirrors of the messaging parameters
    pub gui: GuiState,
}

/// Collects every parameter of a plugin before processing starts
///
/// Each id can be registered once, into exactly one of the plain, outbound or
/// inbound stores. A failed registration leaves the registry unchanged.
///
/// ```
/// # use paramlink::{ParameterRegistry, ParamDef, Owner, Utf8StringSerializer};
/// let mut registry = ParameterRegistry::new();
/// registry.register_plain(ParamDef::normalized(1), 0.5).unwrap();
/// let status = registry
///     .register_outbound(
///         ParamDef::typed::<String>(2).shared(),
///         Utf8StringSerializer::new(),
///         String::new(),
///     )
///     .unwrap();
///
/// let sync = registry.with_save_order([1]).build().unwrap();
/// assert_eq!(sync.rt.normalized(1), Some(0.5));
/// # let _ = status;
/// ```
#[derive(Default)]
pub struct ParameterRegistry {
    defs: ParamDefs,
    rt_params: HashMap<ParamId, RtParam>,
    senders: HashMap<ParamId, Box<dyn ErasedInboundSender>>,
    gui_params: HashMap<ParamId, Box<dyn ErasedGuiParam>>,
    save_order: Option<Vec<ParamId>>,
}

impl ParameterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix the persisted/snapshot layout
    ///
    /// Without one, every non-transient plain parameter is saved in
    /// registration order.
    pub fn with_save_order<I: IntoIterator<Item = ParamId>>(mut self, ids: I) -> Self {
        self.set_save_order(ids);
        self
    }

    pub fn set_save_order<I: IntoIterator<Item = ParamId>>(&mut self, ids: I) {
        self.save_order = Some(ids.into_iter().collect());
    }

    /// Definitions registered so far
    pub fn defs(&self) -> &ParamDefs {
        &self.defs
    }

    /// Register a host-visible normalized parameter (must be RT owned)
    pub fn register_plain(
        &mut self,
        def: ParamDef,
        default_normalized: f64,
    ) -> Result<(), RegistrationError> {
        self.check(&def, Owner::Rt, ValueKind::Normalized, false)?;
        if !default_normalized.is_finite() {
            let err = RegistrationError::NonFiniteDefault {
                id: def.id(),
                default: default_normalized,
            };
            error!(id = def.id(), "parameter registration rejected: {}", err);
            return Err(err);
        }

        self.rt_params
            .insert(def.id(), RtParam::Plain(RtPlainParameter::new(def, default_normalized)));
        self.defs.insert(def, ParamRole::Plain);
        debug!(id = def.id(), default_normalized, "registered plain parameter");
        Ok(())
    }

    /// Register a typed parameter RT mutates and sends to the GUI (RT owned, shared)
    pub fn register_outbound<S: ParamSerializer>(
        &mut self,
        def: ParamDef,
        serializer: S,
        default: S::Value,
    ) -> Result<Outbound<S>, RegistrationError> {
        self.check(&def, Owner::Rt, ValueKind::Typed(type_name::<S::Value>()), true)?;

        let gui = GuiParameter::new(def, serializer.clone(), default.clone());
        let rt = RtOutboundParameter::new(def, serializer, default);
        self.rt_params.insert(def.id(), RtParam::Outbound(Box::new(rt)));
        self.gui_params.insert(def.id(), Box::new(gui));
        self.defs.insert(def, ParamRole::Outbound);
        debug!(id = def.id(), value = type_name::<S::Value>(), "registered outbound parameter");
        Ok(Outbound::new(def.id()))
    }

    /// Register a typed parameter the GUI sends to RT (GUI owned, shared)
    pub fn register_inbound<S: ParamSerializer>(
        &mut self,
        def: ParamDef,
        serializer: S,
        default: S::Value,
    ) -> Result<Inbound<S>, RegistrationError> {
        self.check(&def, Owner::Gui, ValueKind::Typed(type_name::<S::Value>()), true)?;

        let gui = GuiParameter::new(def, serializer.clone(), default.clone());
        let (rt, sender) = RtInboundParameter::pair(def, serializer, default);
        self.rt_params.insert(def.id(), RtParam::Inbound(Box::new(rt)));
        self.senders.insert(def.id(), Box::new(sender));
        self.gui_params.insert(def.id(), Box::new(gui));
        self.defs.insert(def, ParamRole::Inbound);
        debug!(id = def.id(), value = type_name::<S::Value>(), "registered inbound parameter");
        Ok(Inbound::new(def.id()))
    }

    fn check(
        &self,
        def: &ParamDef,
        owner: Owner,
        value_kind: ValueKind,
        messaging: bool,
    ) -> Result<(), RegistrationError> {
        let id = def.id();
        let result = if self.defs.contains(id) {
            Err(RegistrationError::DuplicateId(id))
        } else if def.owner() != owner {
            Err(RegistrationError::WrongOwner {
                id,
                expected: owner,
                actual: def.owner(),
            })
        } else if messaging && !def.is_shared() {
            Err(RegistrationError::NotShared(id))
        } else if def.value_kind() != value_kind {
            Err(RegistrationError::WrongValueKind {
                id,
                expected: value_kind,
                actual: def.value_kind(),
            })
        } else {
            Ok(())
        };

        if let Err(e) = &result {
            error!(id, "parameter registration rejected: {}", e);
        }
        result
    }

    fn validate_save_order(&self, ids: &[ParamId]) -> Result<(), LayoutError> {
        let mut problems = Vec::new();

        for &id in ids {
            let problem = match (self.defs.definition(id), self.defs.role(id)) {
                (None, _) | (_, None) => Some(LayoutError::Unregistered(id)),
                (Some(_), Some(role)) if role != ParamRole::Plain => {
                    Some(LayoutError::NotPlain(id))
                }
                (Some(def), _) if def.is_transient() => Some(LayoutError::Transient(id)),
                _ => None,
            };
            problems.extend(problem);
        }
        problems.extend(ids.iter().duplicates().map(|id| LayoutError::Duplicate(*id)));

        for problem in &problems {
            error!("invalid save order: {}", problem);
        }
        match problems.into_iter().next() {
            Some(first) => Err(first),
            None => Ok(()),
        }
    }

    /// Validate the save order and split the registry into its RT, host and GUI halves
    ///
    /// An invalid save order is always fatal.
    pub fn build(self) -> Result<SyncState, LayoutError> {
        let ids = match &self.save_order {
            Some(ids) => ids.clone(),
            None => self
                .defs
                .iter()
                .filter(
                    |def| self.defs.role(def.id()) == Some(ParamRole::Plain) && !def.is_transient(),
                )
                .map(ParamDef::id)
                .collect(),
        };
        self.validate_save_order(&ids)?;

        let defaults: Vec<f64> = ids
            .iter()
            .map(|id| match self.rt_params.get(id) {
                Some(RtParam::Plain(p)) => p.default_normalized(),
                _ => 0.0,
            })
            .collect();
        let save_order = Arc::new(SaveOrder::new(ids));
        let initial = NormalizedState::from_values(save_order.clone(), &defaults);

        debug!(
            parameters = self.defs.len(),
            saved = save_order.len(),
            "parameter registry built"
        );

        let defs = Arc::new(self.defs);
        let (rt, handle) =
            RtState::new(defs.clone(), self.rt_params, self.senders, initial, defaults);
        let gui = GuiState::new(defs, self.gui_params);

        Ok(SyncState { rt, handle, gui })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BooleanSerializer, DoubleSerializer, Utf8StringSerializer};

    fn registry() -> ParameterRegistry {
        let mut registry = ParameterRegistry::new();
        registry.register_plain(ParamDef::normalized(1), 0.0).unwrap();
        registry
            .register_outbound(
                ParamDef::typed::<String>(2).shared(),
                Utf8StringSerializer::new(),
                String::new(),
            )
            .unwrap();
        registry
            .register_inbound(
                ParamDef::typed::<bool>(3).with_owner(Owner::Gui).shared(),
                BooleanSerializer,
                false,
            )
            .unwrap();
        registry
    }

    #[test]
    fn duplicate_ids_are_rejected_across_kinds() {
        let mut registry = registry();

        assert_eq!(
            registry.register_plain(ParamDef::normalized(2), 0.0),
            Err(RegistrationError::DuplicateId(2))
        );
        assert_eq!(
            registry
                .register_outbound(ParamDef::typed::<f64>(3).shared(), DoubleSerializer, 0.0)
                .unwrap_err(),
            RegistrationError::DuplicateId(3)
        );
        assert_eq!(
            registry
                .register_inbound(
                    ParamDef::typed::<f64>(1).with_owner(Owner::Gui).shared(),
                    DoubleSerializer,
                    0.0
                )
                .unwrap_err(),
            RegistrationError::DuplicateId(1)
        );
        assert_eq!(registry.defs().registration_order(), &[1, 2, 3]);
    }

    #[test]
    fn ownership_is_enforced() {
        let mut registry = ParameterRegistry::new();

        let err = registry
            .register_outbound(
                ParamDef::typed::<f64>(5).with_owner(Owner::Gui).shared(),
                DoubleSerializer,
                0.0,
            )
            .unwrap_err();
        assert!(matches!(err, RegistrationError::WrongOwner { id: 5, expected: Owner::Rt, .. }));

        let err = registry
            .register_inbound(ParamDef::typed::<f64>(6).shared(), DoubleSerializer, 0.0)
            .unwrap_err();
        assert!(matches!(err, RegistrationError::WrongOwner { id: 6, expected: Owner::Gui, .. }));

        let err = registry
            .register_plain(ParamDef::normalized(7).with_owner(Owner::Gui), 0.0)
            .unwrap_err();
        assert!(matches!(err, RegistrationError::WrongOwner { id: 7, .. }));

        assert!(registry.defs().is_empty());
    }

    #[test]
    fn plain_defaults_must_be_finite() {
        let mut registry = ParameterRegistry::new();
        let err = registry
            .register_plain(ParamDef::normalized(1), f64::NAN)
            .unwrap_err();
        assert!(matches!(err, RegistrationError::NonFiniteDefault { id: 1, .. }));
        assert!(!registry.defs().contains(1));

        registry.register_plain(ParamDef::normalized(1), 4.0).unwrap();
        let sync = registry.build().unwrap();
        assert_eq!(sync.rt.normalized(1), Some(1.0));
    }

    #[test]
    fn messaging_parameters_must_be_shared() {
        let mut registry = ParameterRegistry::new();
        let err = registry
            .register_outbound(ParamDef::typed::<f64>(1), DoubleSerializer, 0.0)
            .unwrap_err();
        assert_eq!(err, RegistrationError::NotShared(1));
        assert!(!registry.defs().contains(1));
    }

    #[test]
    fn value_kind_must_match_serializer() {
        let mut registry = ParameterRegistry::new();
        let err = registry
            .register_outbound(ParamDef::typed::<String>(1).shared(), DoubleSerializer, 0.0)
            .unwrap_err();
        assert!(matches!(err, RegistrationError::WrongValueKind { id: 1, .. }));

        let err = registry
            .register_plain(ParamDef::typed::<f64>(2), 0.0)
            .unwrap_err();
        assert!(matches!(err, RegistrationError::WrongValueKind { id: 2, .. }));
    }

    #[test]
    fn invalid_save_orders_are_fatal() {
        assert!(matches!(
            registry().with_save_order([1, 9]).build(),
            Err(LayoutError::Unregistered(9))
        ));
        assert!(matches!(
            registry().with_save_order([2]).build(),
            Err(LayoutError::NotPlain(2))
        ));
        // GUI-owned ids can only be inbound
        assert!(matches!(
            registry().with_save_order([3]).build(),
            Err(LayoutError::NotPlain(3))
        ));
        assert!(matches!(
            registry().with_save_order([1, 1]).build(),
            Err(LayoutError::Duplicate(1))
        ));

        let mut transient = registry();
        transient.register_plain(ParamDef::normalized(4).transient(), 0.0).unwrap();
        assert!(matches!(
            transient.with_save_order([1, 4]).build(),
            Err(LayoutError::Transient(4))
        ));
    }

    #[test]
    fn default_save_order_skips_transient_and_messaging() {
        let mut registry = registry();
        registry.register_plain(ParamDef::normalized(4).transient(), 0.0).unwrap();
        registry.register_plain(ParamDef::normalized(5), 0.25).unwrap();

        let sync = registry.build().unwrap();
        assert_eq!(sync.handle.latest_state().save_order().ids(), &[1, 5]);
        assert_eq!(sync.handle.latest_state().values(), &[0.0, 0.25]);
    }
}
