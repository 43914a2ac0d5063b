//! The authoritative per-parameter state.
//!
//! A [`Parameter`] merges three inputs into the value DSP code reads:
//!
//! ```text
//!  host bridge value ──┐ (wins when bound)
//!                      ├──► normalized ──┐
//!  UI control value ───┘                 ├─► clamp(n + m, 0, 1) ──► scale ──► internal
//!  modulator deltas ──────► modulations ─┘     normalized_internal
//! ```
//!
//! [`update_value`](Parameter::update_value) runs once per update cycle on the
//! audio thread and recomputes the merged value only when an input changed.
//!
//! # Locking
//!
//! All state lives behind one [`SpinLock`]. Critical sections read and write a
//! handful of fields. Strong references obtained while the lock is held
//! (bound control, bound bridge) are declared before the guard so they are
//! released after it: their `Drop` may call back into this parameter.
//! Modulators upgraded during an update cycle are parked in a preallocated
//! buffer and released once the state lock is gone, for the same reason.
//!
//! Lock order across objects is bridge name lock, then parameter lock.

use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bridge::ParameterBridge;
use crate::control::ParameterControl;
use crate::details::{ParamScale, ParameterDetails};
use crate::modulator::Modulator;
use crate::sync::{SpinGuard, SpinLock};
use crate::value::{ChannelValues, InternalValue, MAX_CHANNELS, unit_value};

/// Sample rate assumed until the first update cycle.
pub const DEFAULT_SAMPLE_RATE: f32 = 48_000.0;

/// Modulation changes smaller than this do not trigger a recompute.
const MODULATION_EPSILON: f32 = 1e-6;

/// Errors reported by [`Parameter`] queries.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParameterError {
    /// The requested representation does not fit the parameter's scale.
    #[error("cannot read a {scale:?} parameter as {requested}")]
    IncompatibleRepresentation {
        /// Representation name.
        requested: &'static str,
        /// Scale of the parameter.
        scale: ParamScale,
    },
}

/// Snapshot sufficient to reconstruct a parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSnapshot {
    /// Normalized value in `[0, 1]`.
    pub normalized_value: f32,
    /// Full description.
    pub details: ParameterDetails,
}

/// Relations from a parameter to the objects driving it.
///
/// None of these are owned. The control and bridge clear themselves through
/// [`Parameter::release_control`] and [`Parameter::release_bridge`] when they
/// are dropped; the parameter tells them when it is dropped first.
#[derive(Default)]
struct ParameterLink {
    ui_control: Option<Weak<dyn ParameterControl>>,
    host_control: Option<Weak<ParameterBridge>>,
    modulators: Vec<Weak<dyn Modulator>>,
}

struct ParameterState {
    details: Arc<ParameterDetails>,
    normalized_value: f32,
    modulations: ChannelValues,
    normalized_internal: ChannelValues,
    internal: ChannelValues,
    sample_rate: f32,
    dirty: bool,
    link: ParameterLink,
}

impl ParameterState {
    fn recompute(&mut self) {
        for ch in 0..MAX_CHANNELS {
            let n = (self.normalized_value + self.modulations[ch]).clamp(0.0, 1.0);
            self.normalized_internal[ch] = n;
            self.internal[ch] = self.details.to_internal(n, self.sample_rate);
        }
    }

    fn linked(&self) -> (Option<Arc<ParameterBridge>>, Option<Arc<dyn ParameterControl>>) {
        (
            self.link.host_control.as_ref().and_then(Weak::upgrade),
            self.link.ui_control.as_ref().and_then(Weak::upgrade),
        )
    }
}

/// One automatable, modulatable parameter.
pub struct Parameter {
    state: SpinLock<ParameterState>,
    /// Strong modulator references held across one update cycle. Capacity
    /// tracks the modulator list so the audio thread never grows it.
    held_modulators: SpinLock<Vec<Arc<dyn Modulator>>>,
}

impl Parameter {
    /// Creates a parameter at its default value.
    pub fn new(details: ParameterDetails) -> Self {
        let normalized_value = details.default_normalized.clamp(0.0, 1.0);
        let mut state = ParameterState {
            details: Arc::new(details),
            normalized_value,
            modulations: [0.0; MAX_CHANNELS],
            normalized_internal: [0.0; MAX_CHANNELS],
            internal: [0.0; MAX_CHANNELS],
            sample_rate: DEFAULT_SAMPLE_RATE,
            dirty: false,
            link: ParameterLink::default(),
        };
        state.recompute();
        Self {
            state: SpinLock::new(state),
            held_modulators: SpinLock::new(Vec::new()),
        }
    }

    /// Creates a shared parameter at its default value.
    pub fn shared(details: ParameterDetails) -> Arc<Self> {
        Arc::new(Self::new(details))
    }

    /// Rebuilds a parameter from a snapshot.
    pub fn from_snapshot(snapshot: ParameterSnapshot) -> Self {
        let parameter = Self::new(snapshot.details);
        parameter.initialise(Some(snapshot.normalized_value));
        parameter
    }

    /// Resets to `value` (or the default), discarding modulation, and shows
    /// the value on the bound control and bridge.
    pub fn initialise(&self, value: Option<f32>) {
        let (value, (bridge, control)) = {
            let mut state = self.state.lock();
            let value = value
                .and_then(unit_value)
                .unwrap_or(state.details.default_normalized)
                .clamp(0.0, 1.0);
            state.normalized_value = value;
            state.modulations = [0.0; MAX_CHANNELS];
            state.recompute();
            state.dirty = false;
            (value, state.linked())
        };
        if let Some(bridge) = &bridge {
            bridge.publish_value(value);
        }
        if let Some(control) = &control {
            control.set_value_raw(value);
        }
    }

    /// Reads the merged value as `R`.
    ///
    /// With `normalized` set, continuous representations return the clamped
    /// normalized position instead of the scaled value; discrete
    /// representations always return the scaled value.
    ///
    /// Requesting a representation that does not fit the scale is a
    /// programmer error: it panics in debug builds and returns a best-effort
    /// projection in release builds.
    pub fn internal_value<R: InternalValue>(&self, sample_rate: f32, normalized: bool) -> R {
        match self.try_internal_value(sample_rate, normalized) {
            Ok(value) => value,
            Err(err) => {
                if cfg!(debug_assertions) {
                    panic!("{err}");
                }
                #[cfg(feature = "tracing")]
                tracing::warn!("{err}");
                let state = self.state.lock();
                let values = Self::source_values(&state, sample_rate, normalized);
                R::project(&values, &state.details)
            }
        }
    }

    /// Reads the merged value as `R`, reporting incompatible representations.
    pub fn try_internal_value<R: InternalValue>(
        &self,
        sample_rate: f32,
        normalized: bool,
    ) -> Result<R, ParameterError> {
        let state = self.state.lock();
        if !R::supports(&state.details) {
            return Err(ParameterError::IncompatibleRepresentation {
                requested: R::NAME,
                scale: state.details.scale,
            });
        }
        let values = Self::source_values(&state, sample_rate, normalized);
        Ok(R::project(&values, &state.details))
    }

    fn source_values(state: &ParameterState, sample_rate: f32, normalized: bool) -> ChannelValues {
        if normalized && !state.details.scale.is_discrete() {
            return state.normalized_internal;
        }
        if state.details.scale.depends_on_sample_rate() && sample_rate != state.sample_rate {
            return state
                .normalized_internal
                .map(|n| state.details.to_internal(n, sample_rate));
        }
        state.internal
    }

    /// Swaps the bound UI control, returning the previous one.
    ///
    /// The caller notifies the returned control that it has been displaced.
    pub fn change_control(
        &self,
        control: Option<Weak<dyn ParameterControl>>,
    ) -> Option<Weak<dyn ParameterControl>> {
        let mut state = self.state.lock();
        state.dirty = true;
        std::mem::replace(&mut state.link.ui_control, control)
    }

    /// Unbinds `control` if it is the bound control. Returns whether it was.
    pub fn release_control(&self, control: *const ()) -> bool {
        let released = {
            let mut state = self.state.lock();
            if state
                .link
                .ui_control
                .as_ref()
                .is_some_and(|w| std::ptr::addr_eq(w.as_ptr(), control))
            {
                state.link.ui_control.take()
            } else {
                None
            }
        };
        released.is_some()
    }

    /// Swaps the bound host bridge, returning the previous one.
    pub fn change_bridge(
        &self,
        bridge: Option<Weak<ParameterBridge>>,
    ) -> Option<Weak<ParameterBridge>> {
        let mut state = self.state.lock();
        state.dirty = true;
        std::mem::replace(&mut state.link.host_control, bridge)
    }

    /// Unbinds `bridge` if it is the bound bridge. Returns whether it was.
    pub fn release_bridge(&self, bridge: &ParameterBridge) -> bool {
        let released = {
            let mut state = self.state.lock();
            if state
                .link
                .host_control
                .as_ref()
                .is_some_and(|w| std::ptr::eq(w.as_ptr(), bridge))
            {
                state.link.host_control.take()
            } else {
                None
            }
        };
        released.is_some()
    }

    /// The bound UI control, if any.
    pub fn ui_control(&self) -> Option<Arc<dyn ParameterControl>> {
        self.state.lock().link.ui_control.as_ref().and_then(Weak::upgrade)
    }

    /// The bound host bridge, if any.
    pub fn host_control(&self) -> Option<Arc<ParameterBridge>> {
        self.state.lock().link.host_control.as_ref().and_then(Weak::upgrade)
    }

    /// Inserts a modulator at `index` (appends when `None` or past the end).
    /// Returns the index it was stored at.
    pub fn add_modulator(&self, modulator: Weak<dyn Modulator>, index: Option<usize>) -> usize {
        let (mut state, retired) = self.lock_with_spare_modulator_slot();
        let len = state.link.modulators.len();
        let at = index.map_or(len, |i| i.min(len));
        state.link.modulators.insert(at, modulator);
        state.dirty = true;
        drop(state);
        drop(retired);
        at
    }

    /// Replaces the modulator at `index`. Returns `false` when out of range.
    pub fn update_modulator(&self, modulator: Weak<dyn Modulator>, index: usize) -> bool {
        let replaced = {
            let mut state = self.state.lock();
            match state.link.modulators.get_mut(index) {
                Some(slot) => {
                    let old = std::mem::replace(slot, modulator);
                    state.dirty = true;
                    Some(old)
                }
                None => None,
            }
        };
        replaced.is_some()
    }

    /// Removes the modulator at `index`. Returns `false` when out of range.
    pub fn delete_modulator(&self, index: usize) -> bool {
        let removed = {
            let mut state = self.state.lock();
            if index < state.link.modulators.len() {
                state.dirty = true;
                Some(state.link.modulators.remove(index))
            } else {
                None
            }
        };
        removed.is_some()
    }

    /// Number of modulator relations, live or expired.
    pub fn modulator_count(&self) -> usize {
        self.state.lock().link.modulators.len()
    }

    /// Locks with room for one more modulator. Growth allocates outside the
    /// lock; the replaced buffer is returned so the caller frees it after
    /// unlocking.
    fn lock_with_spare_modulator_slot(
        &self,
    ) -> (SpinGuard<'_, ParameterState>, Vec<Weak<dyn Modulator>>) {
        loop {
            let state = self.state.lock();
            let modulators = &state.link.modulators;
            if modulators.len() < modulators.capacity() {
                return (state, Vec::new());
            }
            let wanted = (modulators.capacity() * 2).max(4);
            drop(state);

            let mut grown = Vec::with_capacity(wanted);
            self.reserve_held_modulators(grown.capacity());
            let mut state = self.state.lock();
            if state.link.modulators.len() < wanted {
                grown.append(&mut state.link.modulators);
                let retired = std::mem::replace(&mut state.link.modulators, grown);
                return (state, retired);
            }
        }
    }

    fn reserve_held_modulators(&self, capacity: usize) {
        let mut larger = Vec::with_capacity(capacity);
        let mut held = self.held_modulators.lock();
        if held.capacity() < capacity {
            std::mem::swap(&mut *held, &mut larger);
        }
        drop(held);
        drop(larger);
    }

    /// Merges UI, host, and modulation inputs and recomputes the scaled value
    /// if anything changed. Returns whether a recompute happened.
    ///
    /// Runs on the audio thread once per update cycle. Modulators whose
    /// backing object is gone contribute nothing.
    pub fn update_value(&self, sample_rate: f32) -> bool {
        let bridge: Option<Arc<ParameterBridge>>;
        let control: Option<Arc<dyn ParameterControl>>;
        let mut held = self.held_modulators.lock();
        let mut state = self.state.lock();

        bridge = state.link.host_control.as_ref().and_then(Weak::upgrade);
        control = if bridge.is_none() {
            state.link.ui_control.as_ref().and_then(Weak::upgrade)
        } else {
            None
        };
        let incoming = match (&bridge, &control) {
            (Some(bridge), _) => Some(bridge.value()),
            (None, Some(control)) => Some(control.value_raw()),
            (None, None) => None,
        };
        if let Some(value) = incoming.and_then(unit_value)
            && value != state.normalized_value
        {
            state.normalized_value = value;
            state.dirty = true;
        }

        let mut modulations = [0.0; MAX_CHANNELS];
        for modulator in &state.link.modulators {
            if let Some(modulator) = modulator.upgrade() {
                let delta = modulator.delta_value();
                for (sum, d) in modulations.iter_mut().zip(delta) {
                    if d.is_finite() {
                        *sum += d;
                    }
                }
                held.push(modulator);
            }
        }
        if !state.details.is_stereo() {
            modulations[1] = modulations[0];
        }
        let modulation_changed = if state.details.scale.is_discrete() {
            modulations != state.modulations
        } else {
            modulations
                .iter()
                .zip(state.modulations)
                .any(|(new, old)| (new - old).abs() > MODULATION_EPSILON)
        };
        if modulation_changed {
            state.modulations = modulations;
            state.dirty = true;
        }

        if sample_rate != state.sample_rate {
            state.sample_rate = sample_rate;
            if state.details.scale.depends_on_sample_rate() {
                state.dirty = true;
            }
        }

        let recomputed = state.dirty;
        if recomputed {
            state.recompute();
            state.dirty = false;
        }
        drop(state);
        drop(held);
        // Released one at a time with no lock held: a modulator's `Drop` may
        // call back into this parameter.
        loop {
            let next = self.held_modulators.lock().pop();
            let Some(modulator) = next else { break };
            drop(modulator);
        }
        recomputed
    }

    /// Replaces the description, optionally moving to `value`.
    pub fn set_parameter_details(&self, details: ParameterDetails, value: Option<f32>) {
        let details = Arc::new(details);
        let value = value.and_then(unit_value);
        let (retired, (bridge, control)) = {
            let mut state = self.state.lock();
            let retired = std::mem::replace(&mut state.details, details);
            if let Some(value) = value {
                state.normalized_value = value;
            }
            state.dirty = true;
            let linked = if value.is_some() {
                state.linked()
            } else {
                (None, None)
            };
            (retired, linked)
        };
        drop(retired);

        if let Some(value) = value {
            if let Some(bridge) = &bridge {
                bridge.publish_value(value);
            }
            if let Some(control) = &control {
                control.set_value_raw(value);
            }
        }
        if let Some(bridge) = self.host_control() {
            bridge.refresh_display_name();
        }
    }

    /// UI/host write of the normalized value. The bound bridge and control are
    /// updated first so the next update cycle reads the same value from them.
    /// Non-finite values are ignored.
    pub fn set_normalized_value(&self, value: f32) {
        let Some(value) = unit_value(value) else {
            return;
        };
        let (bridge, control) = self.state.lock().linked();
        if let Some(bridge) = &bridge {
            bridge.publish_value(value);
        }
        if let Some(control) = &control {
            control.set_value_raw(value);
        }
        let mut state = self.state.lock();
        if state.normalized_value != value {
            state.normalized_value = value;
            state.dirty = true;
        }
    }

    /// Captures the normalized value and details.
    pub fn serialize(&self) -> ParameterSnapshot {
        let (normalized_value, details) = {
            let state = self.state.lock();
            (state.normalized_value, Arc::clone(&state.details))
        };
        ParameterSnapshot {
            normalized_value,
            details: (*details).clone(),
        }
    }

    /// Restores from a snapshot.
    pub fn deserialize(&self, snapshot: ParameterSnapshot) {
        self.set_parameter_details(snapshot.details, Some(snapshot.normalized_value));
        self.state.lock().recompute();
    }

    /// Forwards the start of a change gesture to the bound bridge.
    pub fn begin_change_gesture(&self) {
        if let Some(bridge) = self.host_control() {
            bridge.begin_change_gesture();
        }
    }

    /// Forwards the end of a change gesture to the bound bridge.
    pub fn end_change_gesture(&self) {
        if let Some(bridge) = self.host_control() {
            bridge.end_change_gesture();
        }
    }

    /// Last value written by UI or host.
    pub fn normalized_value(&self) -> f32 {
        self.state.lock().normalized_value
    }

    /// Accumulated modulation as of the last update cycle.
    pub fn modulations(&self) -> ChannelValues {
        self.state.lock().modulations
    }

    /// Current description.
    pub fn details(&self) -> Arc<ParameterDetails> {
        Arc::clone(&self.state.lock().details)
    }

    /// Display name from the current description.
    pub fn display_name(&self) -> String {
        self.details().name.clone()
    }

    /// Sample rate of the last update cycle.
    pub fn sample_rate(&self) -> f32 {
        self.state.lock().sample_rate
    }

    /// Whether an input changed since the last recompute.
    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }
}

impl Drop for Parameter {
    fn drop(&mut self) {
        let link = std::mem::take(&mut self.state.get_mut().link);
        if let Some(bridge) = link.host_control.and_then(|w| w.upgrade()) {
            bridge.forget_parameter(std::ptr::from_ref(self));
        }
        if let Some(control) = link.ui_control.and_then(|w| w.upgrade()) {
            control.parameter_detached();
        }
    }
}

impl std::fmt::Debug for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Parameter")
            .field("name", &state.details.name)
            .field("normalized_value", &state.normalized_value)
            .field("internal", &state.internal)
            .finish_non_exhaustive()
    }
}
