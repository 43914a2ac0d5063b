//! Modulator capability surface.
//!
//! A modulator produces a per-channel delta that is added to a parameter's
//! normalized value once per update cycle. Parameters hold modulators through
//! weak relations; a modulator that has been dropped contributes nothing.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::value::{ChannelValues, MAX_CHANNELS};

/// Source of a per-block modulation delta.
///
/// Sampled from the audio thread while the target parameter's lock is held,
/// so `delta_value` must be cheap and must not touch the parameter. The last
/// strong reference to a modulator may be released on the audio thread; its
/// `Drop` must not touch the parameter either.
pub trait Modulator: Send + Sync {
    /// Delta in normalized units, one per channel.
    fn delta_value(&self) -> ChannelValues;
}

/// Depth and polarity applied to a modulation signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModulationAmount {
    /// Modulation depth (0.0 to 1.0).
    pub depth: f32,
    /// Whether to invert the modulation signal.
    pub inverted: bool,
}

impl ModulationAmount {
    /// Create a new modulation amount.
    pub fn new(depth: f32) -> Self {
        Self {
            depth: depth.clamp(0.0, 1.0),
            inverted: false,
        }
    }

    /// Create an inverted modulation amount.
    pub fn inverted(depth: f32) -> Self {
        Self {
            depth: depth.clamp(0.0, 1.0),
            inverted: true,
        }
    }

    /// Scales a raw signal into a normalized delta.
    #[inline]
    pub fn apply(&self, signal: f32) -> f32 {
        if self.inverted {
            -signal * self.depth
        } else {
            signal * self.depth
        }
    }
}

impl Default for ModulationAmount {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// Modulator whose signal is written by another thread.
///
/// The producer (an LFO, envelope, or host modulation event) stores the
/// current signal with [`set_signal`](Self::set_signal); parameters read it
/// through [`Modulator::delta_value`]. All fields are atomics.
#[derive(Debug)]
pub struct SharedModulator {
    signal: [AtomicU32; MAX_CHANNELS],
    depth: AtomicU32,
    inverted: AtomicBool,
}

impl SharedModulator {
    /// Creates a modulator with a zero signal.
    pub fn new(amount: ModulationAmount) -> Self {
        Self {
            signal: std::array::from_fn(|_| AtomicU32::new(0f32.to_bits())),
            depth: AtomicU32::new(amount.depth.to_bits()),
            inverted: AtomicBool::new(amount.inverted),
        }
    }

    /// Sets the same signal on every channel.
    pub fn set_signal(&self, signal: f32) {
        self.set_channel_signals([signal; MAX_CHANNELS]);
    }

    /// Sets one signal per channel.
    pub fn set_channel_signals(&self, signals: ChannelValues) {
        for (slot, value) in self.signal.iter().zip(signals) {
            slot.store(value.to_bits(), Ordering::Release);
        }
    }

    /// Current depth and polarity.
    pub fn amount(&self) -> ModulationAmount {
        ModulationAmount {
            depth: f32::from_bits(self.depth.load(Ordering::Acquire)),
            inverted: self.inverted.load(Ordering::Acquire),
        }
    }

    /// Replaces depth and polarity.
    pub fn set_amount(&self, amount: ModulationAmount) {
        self.depth.store(amount.depth.clamp(0.0, 1.0).to_bits(), Ordering::Release);
        self.inverted.store(amount.inverted, Ordering::Release);
    }
}

impl Default for SharedModulator {
    fn default() -> Self {
        Self::new(ModulationAmount::default())
    }
}

impl Modulator for SharedModulator {
    fn delta_value(&self) -> ChannelValues {
        let amount = self.amount();
        std::array::from_fn(|ch| amount.apply(f32::from_bits(self.signal[ch].load(Ordering::Acquire))))
    }
}
