//! RT-owned messaging parameter sent to the GUI

use core::any::Any;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::codec::ParamSerializer;
use crate::error::CodecError;
use crate::message::Message;
use crate::param::ParamDef;
use crate::params::ErasedOutbound;

/// A typed value mutated by RT and delivered to the GUI when dirty
pub struct RtOutboundParameter<S: ParamSerializer> {
    def: ParamDef,
    serializer: S,
    value: S::Value,
    dirty: AtomicBool,
}

impl<S: ParamSerializer> RtOutboundParameter<S> {
    pub(crate) fn new(def: ParamDef, serializer: S, value: S::Value) -> Self {
        Self {
            def,
            serializer,
            value,
            dirty: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn def(&self) -> &ParamDef {
        &self.def
    }

    #[inline]
    pub fn value(&self) -> &S::Value {
        &self.value
    }

    /// Replace the value and mark it for sending when it differs
    pub fn update(&mut self, value: S::Value) -> bool {
        if self.value != value {
            self.set(value);
            true
        } else {
            false
        }
    }

    /// Replace the value and mark it for sending unconditionally
    pub fn set(&mut self, value: S::Value) {
        self.value = value;
        self.broadcast();
    }

    /// Mutate the value in place and mark it for sending
    pub fn modify<F: FnOnce(&mut S::Value)>(&mut self, f: F) {
        f(&mut self.value);
        self.broadcast();
    }

    /// Send the current value again on the next drain
    pub fn broadcast(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Whether the value is waiting to be sent
    #[inline]
    pub fn has_update(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }
}

impl<S: ParamSerializer> ErasedOutbound for RtOutboundParameter<S> {
    fn def(&self) -> &ParamDef {
        &self.def
    }

    fn has_update(&self) -> bool {
        RtOutboundParameter::has_update(self)
    }

    fn clear_update(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    fn write_to_message(&self, message: &mut Message) -> Result<(), CodecError> {
        self.serializer.write_to_message(&self.value, message)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Int32Serializer;

    #[test]
    fn dirty_only_on_real_update() {
        let def = ParamDef::typed::<i32>(2).shared();
        let mut param = RtOutboundParameter::new(def, Int32Serializer, 5);
        assert!(!param.update(5));
        assert!(!param.has_update());

        assert!(param.update(6));
        assert!(param.has_update());

        param.clear_update();
        param.modify(|v| *v += 1);
        assert!(param.has_update());
        assert_eq!(*param.value(), 7);
    }
}
