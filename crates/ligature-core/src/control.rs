//! UI control capability surface.
//!
//! A parameter holds at most one UI control through a weak relation. The core
//! only needs to read and write the control's raw `[0, 1]` value and to tell
//! it when the parameter goes away; everything else about the widget is
//! outside this crate.
//!
//! [`RawControl`] is a headless control backed by an atomic, usable from tests,
//! the CLI simulation, or as the model behind a real widget.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::details::ParameterDetails;
use crate::parameter::Parameter;
use crate::value::unit_value;

/// What a parameter needs from the UI control bound to it.
pub trait ParameterControl: Send + Sync {
    /// Current raw value in `[0, 1]`.
    fn value_raw(&self) -> f32;

    /// Displays a new raw value. Must not call back into the parameter.
    fn set_value_raw(&self, value: f32);

    /// The parameter this control was bound to has been destroyed or bound
    /// to another control.
    fn parameter_detached(&self) {}
}

/// Receives value changes of a [`RawControl`].
pub trait ControlListener: Send + Sync {
    /// Called after the control's raw value changed.
    fn control_value_changed(&self, control: &RawControl, value: f32);
}

/// Headless UI control.
pub struct RawControl {
    me: Weak<RawControl>,
    value: AtomicU32,
    parameter: Mutex<Weak<Parameter>>,
    listeners: Mutex<Vec<Arc<dyn ControlListener>>>,
}

impl RawControl {
    /// Creates an unattached control showing `value`.
    pub fn new(value: f32) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            value: AtomicU32::new(unit_value(value).unwrap_or(0.0).to_bits()),
            parameter: Mutex::new(Weak::new()),
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// Binds this control to `parameter`, displacing the parameter's previous
    /// control, and shows the parameter's current value.
    pub fn attach(&self, parameter: &Arc<Parameter>) {
        let me: Weak<dyn ParameterControl> = self.me.clone();
        let previous = std::mem::replace(&mut *self.parameter.lock(), Arc::downgrade(parameter));
        if let Some(previous) = previous.upgrade()
            && !Arc::ptr_eq(&previous, parameter)
        {
            previous.release_control(self.identity());
        }

        let displaced = parameter.change_control(Some(me)).and_then(|w| w.upgrade());
        if let Some(displaced) = displaced
            && !std::ptr::addr_eq(Arc::as_ptr(&displaced), self.identity())
        {
            displaced.parameter_detached();
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(parameter = %parameter.display_name(), "control attached");
        self.set_value_raw(parameter.normalized_value());
    }

    /// Unbinds this control from its parameter, if any.
    pub fn detach(&self) {
        let previous = std::mem::take(&mut *self.parameter.lock());
        if let Some(previous) = previous.upgrade() {
            previous.release_control(self.identity());
        }
    }

    /// The bound parameter, if it is still alive.
    pub fn parameter(&self) -> Option<Arc<Parameter>> {
        self.parameter.lock().upgrade()
    }

    /// Details of the bound parameter.
    pub fn details(&self) -> Option<Arc<ParameterDetails>> {
        self.parameter().map(|p| p.details())
    }

    /// User edit: routes through the parameter when bound so that a bound host
    /// bridge sees it, otherwise just updates the display.
    pub fn edit(&self, value: f32) {
        match self.parameter() {
            Some(parameter) => parameter.set_normalized_value(value),
            None => self.set_value_raw(value),
        }
    }

    /// Opens a change gesture on the bound parameter.
    pub fn begin_change_gesture(&self) {
        if let Some(parameter) = self.parameter() {
            parameter.begin_change_gesture();
        }
    }

    /// Closes a change gesture on the bound parameter.
    pub fn end_change_gesture(&self) {
        if let Some(parameter) = self.parameter() {
            parameter.end_change_gesture();
        }
    }

    /// Registers a listener.
    pub fn add_listener(&self, listener: Arc<dyn ControlListener>) {
        self.listeners.lock().push(listener);
    }

    /// Removes a listener by identity.
    pub fn remove_listener(&self, listener: &Arc<dyn ControlListener>) {
        self.listeners.lock().retain(|l| !Arc::ptr_eq(l, listener));
    }

    fn identity(&self) -> *const () {
        std::ptr::from_ref(self).cast()
    }
}

impl ParameterControl for RawControl {
    fn value_raw(&self) -> f32 {
        f32::from_bits(self.value.load(Ordering::Acquire))
    }

    fn set_value_raw(&self, value: f32) {
        let Some(value) = unit_value(value) else {
            return;
        };
        let previous = self.value.swap(value.to_bits(), Ordering::AcqRel);
        if previous == value.to_bits() {
            return;
        }
        // Listeners may remove themselves from inside the callback.
        let listeners = self.listeners.lock().clone();
        for listener in &listeners {
            listener.control_value_changed(self, value);
        }
    }

    fn parameter_detached(&self) {
        *self.parameter.lock() = Weak::new();
    }
}

impl Drop for RawControl {
    fn drop(&mut self) {
        if let Some(parameter) = self.parameter.get_mut().upgrade() {
            parameter.release_control(self.identity());
        }
    }
}

impl std::fmt::Debug for RawControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawControl")
            .field("value", &self.value_raw())
            .finish_non_exhaustive()
    }
}
