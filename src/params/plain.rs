//! Plain normalized parameter

use crate::param::ParamDef;

/// A host-visible normalized value with previous-cycle bookkeeping
///
/// Touched only by the RT thread.
#[derive(Clone, Debug)]
pub struct RtPlainParameter {
    def: ParamDef,
    default: f64,
    value: f64,
    previous: f64,
}

impl RtPlainParameter {
    /// `default` must be finite; it is clamped to `[0, 1]`
    pub(crate) fn new(def: ParamDef, default: f64) -> Self {
        debug_assert!(default.is_finite());
        let default = default.clamp(0.0, 1.0);
        Self {
            def,
            default,
            value: default,
            previous: default,
        }
    }

    #[inline]
    pub fn def(&self) -> &ParamDef {
        &self.def
    }

    #[inline]
    pub fn default_normalized(&self) -> f64 {
        self.default
    }

    #[inline]
    pub fn normalized(&self) -> f64 {
        self.value
    }

    /// Value at the end of the previous cycle
    #[inline]
    pub fn previous_normalized(&self) -> f64 {
        self.previous
    }

    /// Whether the value moved since the previous cycle
    #[inline]
    pub fn has_changed(&self) -> bool {
        self.value != self.previous
    }

    /// Store a new value, clamped to `[0, 1]`; returns whether it differs
    ///
    /// Non-finite values are rejected and leave the current value in place.
    pub fn update(&mut self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        let value = value.clamp(0.0, 1.0);
        if value != self.value {
            self.value = value;
            true
        } else {
            false
        }
    }

    /// Roll the current value into the previous slot; returns whether it had changed
    pub(crate) fn reset_previous(&mut self) -> bool {
        let changed = self.has_changed();
        self.previous = self.value;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_reports_real_changes_only() {
        let mut param = RtPlainParameter::new(ParamDef::normalized(1), 0.5);
        assert!(!param.update(0.5));
        assert!(param.update(0.75));
        assert!(param.update(3.0));
        assert_eq!(param.normalized(), 1.0);
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let mut param = RtPlainParameter::new(ParamDef::normalized(1), 0.25);
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(!param.update(value));
            assert_eq!(param.normalized(), 0.25);
        }
        assert!(!param.has_changed());
        assert!(!param.reset_previous());
    }

    #[test]
    fn reset_previous_tracks_edges() {
        let mut param = RtPlainParameter::new(ParamDef::normalized(1), 0.0);
        assert!(!param.reset_previous());

        param.update(0.2);
        assert!(param.has_changed());
        assert!(param.reset_previous());
        assert_eq!(param.previous_normalized(), 0.2);
        assert!(!param.reset_previous());
    }
}
