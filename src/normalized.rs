//! Normalized state snapshots and their persisted layout

use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::StateError;
use crate::param::ParamId;

/// The fixed sequence of parameter ids defining snapshot and save layout
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SaveOrder {
    ids: Vec<ParamId>,
}

impl SaveOrder {
    pub fn new(ids: Vec<ParamId>) -> Self {
        Self { ids }
    }

    #[inline]
    pub fn ids(&self) -> &[ParamId] {
        &self.ids
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Position of `id` in the layout
    pub fn position(&self, id: ParamId) -> Option<usize> {
        self.ids.iter().position(|i| *i == id)
    }
}

impl From<Vec<ParamId>> for SaveOrder {
    fn from(ids: Vec<ParamId>) -> Self {
        Self::new(ids)
    }
}

/// Normalized values of the saved RT parameters, laid out by a [`SaveOrder`]
///
/// `values().len() == save_order().len()` always holds.
#[derive(Debug, PartialEq)]
pub struct NormalizedState {
    save_order: Arc<SaveOrder>,
    values: Vec<f64>,
}

impl Clone for NormalizedState {
    fn clone(&self) -> Self {
        Self {
            save_order: self.save_order.clone(),
            values: self.values.clone(),
        }
    }

    // States exchanged between threads share a layout; copying must reuse the
    // value buffer so the RT side never allocates.
    fn clone_from(&mut self, source: &Self) {
        if !Arc::ptr_eq(&self.save_order, &source.save_order) {
            self.save_order = source.save_order.clone();
        }
        self.values.clone_from(&source.values);
    }
}

impl NormalizedState {
    /// A state with every value at `0.0`
    pub fn new(save_order: Arc<SaveOrder>) -> Self {
        let values = vec![0.0; save_order.len()];
        Self { save_order, values }
    }

    /// A state from explicit values, clamped to `[0, 1]`
    ///
    /// Missing trailing values and non-finite values are `0.0`, extra values
    /// are dropped.
    pub fn from_values(save_order: Arc<SaveOrder>, values: &[f64]) -> Self {
        let mut state = Self::new(save_order);
        for (index, value) in values.iter().enumerate() {
            state.set(index, *value);
        }
        state
    }

    #[inline]
    pub fn save_order(&self) -> &Arc<SaveOrder> {
        &self.save_order
    }

    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }

    /// Set the value at a layout position, clamped to `[0, 1]`
    ///
    /// Out-of-range positions and non-finite values are ignored.
    #[inline]
    pub fn set(&mut self, index: usize, value: f64) {
        if !value.is_finite() {
            return;
        }
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value.clamp(0.0, 1.0);
        }
    }

    /// Value of a parameter by id
    pub fn value_of(&self, id: ParamId) -> Option<f64> {
        self.save_order.position(id).and_then(|i| self.get(i))
    }

    /// Iterate `(id, value)` pairs in layout order
    pub fn iter(&self) -> impl Iterator<Item = (ParamId, f64)> + '_ {
        self.save_order.ids().iter().copied().zip(self.values.iter().copied())
    }

    /// Serialize as one little-endian `f64` per layout entry
    pub fn write_to<W: Write + ?Sized>(&self, stream: &mut W) -> Result<(), StateError> {
        for value in &self.values {
            stream.write_all(&value.to_le_bytes())?;
        }
        Ok(())
    }

    /// Overwrite this state from a stream written by [`write_to`](Self::write_to)
    ///
    /// `defaults` supplies the value for every entry the stream does not
    /// contain: streams saved with fewer parameters end early, and non-finite
    /// values are replaced. Returns the number of entries actually read.
    pub fn read_from<R: Read + ?Sized>(
        &mut self,
        stream: &mut R,
        defaults: &[f64],
    ) -> Result<usize, StateError> {
        let mut read = 0;
        let mut exhausted = false;

        for (i, slot) in self.values.iter_mut().enumerate() {
            let default = defaults.get(i).copied().unwrap_or(0.0);
            if exhausted {
                *slot = default;
                continue;
            }

            let mut bytes = [0u8; 8];
            match stream.read_exact(&mut bytes) {
                Ok(()) => {
                    let value = f64::from_le_bytes(bytes);
                    *slot = if value.is_finite() {
                        value.clamp(0.0, 1.0)
                    } else {
                        warn!(
                            index = i,
                            id = self.save_order.ids()[i],
                            "non-finite saved value, using default"
                        );
                        default
                    };
                    read += 1;
                }
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    exhausted = true;
                    *slot = default;
                }
                Err(e) => return Err(e.into()),
            }
        }

        if exhausted {
            debug!(
                read,
                expected = self.values.len(),
                "state stream ended early, remaining values use defaults"
            );
        }
        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> Arc<SaveOrder> {
        Arc::new(SaveOrder::new(vec![10, 20, 30]))
    }

    #[test]
    fn stream_layout_follows_save_order() {
        let state = NormalizedState::from_values(order(), &[0.25, 0.5, 1.0]);
        let mut bytes = Vec::new();
        state.write_to(&mut bytes).unwrap();

        assert_eq!(bytes.len(), 24);
        assert_eq!(&bytes[8..16], &0.5f64.to_le_bytes());

        let mut decoded = NormalizedState::new(order());
        assert_eq!(decoded.read_from(&mut bytes.as_slice(), &[0.0; 3]).unwrap(), 3);
        assert_eq!(decoded, state);
        assert_eq!(decoded.value_of(30), Some(1.0));
    }

    #[test]
    fn short_stream_falls_back_to_defaults() {
        let bytes = 0.75f64.to_le_bytes();
        let mut state = NormalizedState::new(order());

        assert_eq!(state.read_from(&mut bytes.as_slice(), &[0.1, 0.2, 0.3]).unwrap(), 1);
        assert_eq!(state.values(), &[0.75, 0.2, 0.3]);
    }

    #[test]
    fn out_of_range_values_are_sanitized() {
        let mut bytes = Vec::new();
        for value in [1.5f64, f64::NAN, -2.0] {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        let mut state = NormalizedState::new(order());
        state.read_from(&mut bytes.as_slice(), &[0.0, 0.4, 0.0]).unwrap();
        assert_eq!(state.values(), &[1.0, 0.4, 0.0]);
    }

    #[test]
    fn explicit_values_stay_in_range() {
        let mut state = NormalizedState::from_values(order(), &[f64::NAN, 2.0, f64::NEG_INFINITY]);
        assert_eq!(state.values(), &[0.0, 1.0, 0.0]);

        state.set(0, 0.5);
        state.set(0, f64::INFINITY);
        assert_eq!(state.get(0), Some(0.5));
    }

    #[test]
    fn clone_from_keeps_buffer() {
        let source = NormalizedState::from_values(order(), &[0.1, 0.2, 0.3]);
        let mut target = NormalizedState::new(source.save_order().clone());
        let before = target.values().as_ptr();

        target.clone_from(&source);
        assert_eq!(target, source);
        assert_eq!(target.values().as_ptr(), before);
    }
}
