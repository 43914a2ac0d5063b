//! Host automation slots.
//!
//! A plugin host sees a fixed array of automatable slots. Each slot is a
//! [`ParameterBridge`] that can be bound to any [`Parameter`] at runtime and
//! re-pointed when the user rearranges modules. The host-facing surface (value,
//! default, name, unit, text conversion, step count) keeps its shape whether or
//! not a parameter is bound.
//!
//! # Binding
//!
//! ```text
//!  bridge.reset_parameter_link(Some(&p), pull)
//!    ├─ lock bridge slot
//!    │   ├─ swap stored link
//!    │   ├─ old parameter: release_bridge(self)
//!    │   ├─ new parameter: change_bridge(self) -> displaced bridge
//!    │   └─ compose display name
//!    └─ after unlock: displaced.on_displaced(p), sync value, notify listeners
//! ```
//!
//! A parameter and a bridge always agree: after any rebind, the old
//! parameter has no host control and the new one names this bridge.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::parameter::Parameter;
use crate::sync::SpinLock;
use crate::value::unit_value;

/// Value reported by an unbound slot.
pub const UNBOUND_DEFAULT_VALUE: f32 = 0.0;

/// Receives bridge events. All methods default to no-ops.
///
/// Listeners are invoked on a snapshot of the listener list and may remove
/// themselves from inside a callback.
pub trait BridgeListener: Send + Sync {
    /// The bound parameter changed. `old` is `None` when the previous
    /// parameter was destroyed.
    fn parameter_link_changed(
        &self,
        _bridge: &ParameterBridge,
        _old: Option<&Arc<Parameter>>,
        _new: Option<&Arc<Parameter>>,
    ) {
    }

    /// The bridge value changed from the parameter side.
    fn parameter_value_changed(&self, _bridge: &ParameterBridge, _value: f32) {}

    /// A change gesture started (`true`) or ended (`false`).
    fn parameter_gesture_changed(&self, _bridge: &ParameterBridge, _active: bool) {}
}

struct BridgeSlot {
    link: Option<Weak<Parameter>>,
    display_name: String,
}

/// One host automation slot.
pub struct ParameterBridge {
    index: usize,
    me: Weak<ParameterBridge>,
    slot: SpinLock<BridgeSlot>,
    value: AtomicU32,
    dirty: AtomicBool,
    listeners: Mutex<Vec<Arc<dyn BridgeListener>>>,
}

fn placeholder_name(index: usize) -> String {
    format!("{}", index + 1)
}

impl ParameterBridge {
    /// Creates an unbound slot.
    pub fn new(index: usize) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            index,
            me: me.clone(),
            slot: SpinLock::new(BridgeSlot {
                link: None,
                display_name: placeholder_name(index),
            }),
            value: AtomicU32::new(UNBOUND_DEFAULT_VALUE.to_bits()),
            dirty: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// Slot index as seen by the host.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Binds this slot to `parameter`, or unbinds it with `None`.
    ///
    /// With `pull_value_from_parameter`, the slot adopts the parameter's
    /// value and notifies listeners; otherwise the slot's value is pushed to
    /// the parameter's UI control.
    pub fn reset_parameter_link(&self, parameter: Option<&Arc<Parameter>>, pull_value_from_parameter: bool) {
        let name = match parameter {
            Some(p) => format!("{} > {}", self.index + 1, p.display_name()),
            None => placeholder_name(self.index),
        };

        let old: Option<Arc<Parameter>>;
        let displaced: Option<Arc<ParameterBridge>>;
        let retired_name: String;
        {
            let mut slot = self.slot.lock();
            let current = slot.link.as_ref().map(Weak::as_ptr);
            if current == parameter.map(Arc::as_ptr) {
                return;
            }
            let old_link = std::mem::replace(&mut slot.link, parameter.map(Arc::downgrade));
            old = old_link.as_ref().and_then(Weak::upgrade);
            if let Some(old) = &old {
                old.release_bridge(self);
            }
            displaced = parameter.and_then(|p| {
                p.change_bridge(Some(self.me.clone()))
                    .and_then(|w| w.upgrade())
                    .filter(|b| !std::ptr::eq(Arc::as_ptr(b), self))
            });
            if pull_value_from_parameter && let Some(p) = parameter {
                self.value.store(p.normalized_value().to_bits(), Ordering::Release);
            }
            retired_name = std::mem::replace(&mut slot.display_name, name);
        }
        drop(retired_name);

        if let (Some(displaced), Some(p)) = (&displaced, parameter) {
            displaced.on_displaced(p);
        }
        if let Some(p) = parameter {
            if pull_value_from_parameter {
                self.notify(|l, b| l.parameter_value_changed(b, b.value()));
            } else if let Some(control) = p.ui_control() {
                control.set_value_raw(self.value());
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            slot = self.index,
            bound = parameter.is_some(),
            "bridge link reset"
        );
        self.notify(|l, b| l.parameter_link_changed(b, old.as_ref(), parameter));
    }

    /// Another bridge took over `parameter`; drop our link to it without
    /// touching the parameter.
    pub fn on_displaced(&self, parameter: &Arc<Parameter>) {
        let retired = {
            let mut slot = self.slot.lock();
            if slot.link.as_ref().map(Weak::as_ptr) != Some(Arc::as_ptr(parameter)) {
                return;
            }
            slot.link = None;
            std::mem::replace(&mut slot.display_name, placeholder_name(self.index))
        };
        drop(retired);
        #[cfg(feature = "tracing")]
        tracing::debug!(slot = self.index, "bridge displaced");
        self.notify(|l, b| l.parameter_link_changed(b, Some(parameter), None));
    }

    /// The bound parameter is being destroyed.
    pub fn forget_parameter(&self, parameter: *const Parameter) {
        let retired = {
            let mut slot = self.slot.lock();
            if slot.link.as_ref().map(Weak::as_ptr) != Some(parameter) {
                return;
            }
            slot.link = None;
            std::mem::replace(&mut slot.display_name, placeholder_name(self.index))
        };
        drop(retired);
        self.notify(|l, b| l.parameter_link_changed(b, None, None));
    }

    /// Recomposes the display name from the bound parameter.
    pub fn refresh_display_name(&self) {
        let Some(parameter) = self.parameter() else {
            return;
        };
        let name = format!("{} > {}", self.index + 1, parameter.display_name());
        let retired = {
            let mut slot = self.slot.lock();
            if slot.link.as_ref().map(Weak::as_ptr) != Some(Arc::as_ptr(&parameter)) {
                return;
            }
            std::mem::replace(&mut slot.display_name, name)
        };
        drop(retired);
    }

    /// The bound parameter, if any.
    pub fn parameter(&self) -> Option<Arc<Parameter>> {
        self.slot.lock().link.as_ref().and_then(Weak::upgrade)
    }

    /// Whether a live parameter is bound.
    pub fn is_bound(&self) -> bool {
        self.parameter().is_some()
    }

    /// Current value in `[0, 1]`.
    pub fn value(&self) -> f32 {
        f32::from_bits(self.value.load(Ordering::Acquire))
    }

    /// Host write. Picked up by the bound parameter on its next update cycle;
    /// also raises the dirty flag for UI polling.
    /// Non-finite values are ignored.
    pub fn set_value(&self, value: f32) {
        let Some(value) = unit_value(value) else {
            #[cfg(feature = "tracing")]
            tracing::warn!(slot = self.index, "non-finite host value ignored");
            return;
        };
        self.value.store(value.to_bits(), Ordering::Release);
        self.dirty.store(true, Ordering::Release);
    }

    /// Parameter-side write, reported to listeners.
    pub fn publish_value(&self, value: f32) {
        let Some(value) = unit_value(value) else {
            return;
        };
        let previous = self.value.swap(value.to_bits(), Ordering::AcqRel);
        if previous != value.to_bits() {
            self.notify(|l, b| l.parameter_value_changed(b, value));
        }
    }

    /// Reads and clears the host-write flag.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Default value: the bound parameter's default, or
    /// [`UNBOUND_DEFAULT_VALUE`].
    pub fn default_value(&self) -> f32 {
        self.parameter().map_or(UNBOUND_DEFAULT_VALUE, |p| {
            p.details().default_normalized.clamp(0.0, 1.0)
        })
    }

    /// Full display name.
    pub fn name(&self) -> String {
        self.slot.lock().display_name.clone()
    }

    /// Display name cut to `max_chars` characters, whitespace trimmed.
    pub fn name_truncated(&self, max_chars: usize) -> String {
        let name = self.name();
        let truncated: String = name.chars().take(max_chars).collect();
        truncated.trim().to_owned()
    }

    /// Unit label of the bound parameter.
    pub fn unit_label(&self) -> &'static str {
        self.parameter().map_or("", |p| p.details().unit.label())
    }

    /// Formats a `[0, 1]` value for display.
    pub fn text_for_value(&self, value: f32) -> String {
        match self.parameter() {
            Some(p) => p.details().format_value(value, p.sample_rate()),
            None => format!("{value:.3}"),
        }
    }

    /// Parses display text into a `[0, 1]` value.
    pub fn value_for_text(&self, text: &str) -> Option<f32> {
        match self.parameter() {
            Some(p) => p.details().parse_value(text, p.sample_rate()),
            None => text
                .trim()
                .parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())
                .map(|v| v.clamp(0.0, 1.0)),
        }
    }

    /// Number of discrete steps; 0 for continuous or unbound.
    pub fn step_count(&self) -> usize {
        self.parameter().map_or(0, |p| p.details().step_count())
    }

    /// Whether the bound parameter is stepped.
    pub fn is_discrete(&self) -> bool {
        self.parameter().is_some_and(|p| p.details().scale.is_discrete())
    }

    /// Whether the bound parameter is a toggle.
    pub fn is_boolean(&self) -> bool {
        self.parameter()
            .is_some_and(|p| matches!(p.details().scale, crate::ParamScale::Toggle))
    }

    /// Reports the start of a change gesture to listeners.
    pub fn begin_change_gesture(&self) {
        self.notify(|l, b| l.parameter_gesture_changed(b, true));
    }

    /// Reports the end of a change gesture to listeners.
    pub fn end_change_gesture(&self) {
        self.notify(|l, b| l.parameter_gesture_changed(b, false));
    }

    /// Registers a listener.
    pub fn add_listener(&self, listener: Arc<dyn BridgeListener>) {
        self.listeners.lock().push(listener);
    }

    /// Removes a listener by identity.
    pub fn remove_listener(&self, listener: &Arc<dyn BridgeListener>) {
        self.listeners.lock().retain(|l| !Arc::ptr_eq(l, listener));
    }

    fn notify(&self, event: impl Fn(&dyn BridgeListener, &Self)) {
        let listeners = self.listeners.lock().clone();
        for listener in &listeners {
            event(listener.as_ref(), self);
        }
    }
}

impl Drop for ParameterBridge {
    fn drop(&mut self) {
        if let Some(parameter) = self.slot.get_mut().link.take().and_then(|w| w.upgrade()) {
            parameter.release_bridge(self);
        }
    }
}

impl std::fmt::Debug for ParameterBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterBridge")
            .field("index", &self.index)
            .field("name", &self.name())
            .field("value", &self.value())
            .finish_non_exhaustive()
    }
}
