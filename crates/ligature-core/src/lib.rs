//! Ligature Core - real-time parameter state and transactional undo
//!
//! This crate holds the state an audio effect host edits from three sides at
//! once: the UI, the plugin host's automation, and internal modulators. The
//! audio thread reads one merged, scaled value per parameter per update cycle.
//!
//! # Core Abstractions
//!
//! ## Parameters
//!
//! - [`Parameter`] - Authoritative per-parameter state behind a short spin lock
//! - [`ParameterDetails`] - Range, scale, unit, flags, and options
//! - [`InternalValue`] - Typed views (`f32`, `[f32; 2]`, `bool`, `usize`, [`IndexedOption`])
//!
//! ## Links
//!
//! - [`ParameterBridge`] - Host automation slot, rebindable at runtime
//! - [`RawControl`] - Headless UI control with change listeners
//! - [`SharedModulator`] - Atomic modulation source with [`ModulationAmount`]
//!
//! ## Undo
//!
//! - [`TransactionLog`] - Fixed-capacity ring of transactions
//! - [`ReversibleAction`] / [`WaitingAction`] - Edits and the edit-scope protocol
//! - [`Session`] - Graph, log, and host slots wired together
//!
//! # Threads
//!
//! | Caller | Calls |
//! |--------|-------|
//! | audio  | [`Parameter::update_value`], [`Parameter::internal_value`], [`Session::process_block`] |
//! | UI     | [`Session`] edits, [`RawControl::edit`], [`TransactionLog`] |
//! | host   | [`ParameterBridge::set_value`], gesture bracketing |
//!
//! # Example
//!
//! ```rust
//! use ligature_core::{ParamId, ParamUnit, Parameter, ParameterBridge, ParameterDetails};
//!
//! let cutoff = Parameter::shared(
//!     ParameterDetails::frequency(ParamId(1), "Cutoff", 20.0, 20_000.0, 1_000.0)
//!         .with_unit(ParamUnit::Hertz),
//! );
//! let slot = ParameterBridge::new(0);
//! slot.reset_parameter_link(Some(&cutoff), true);
//!
//! slot.set_value(1.0);
//! cutoff.update_value(44_100.0);
//! let hz: f32 = cutoff.internal_value(44_100.0, false);
//! assert!(hz <= 44_100.0 * 0.49 + 0.5);
//! assert_eq!(slot.name(), "1 > Cutoff");
//! ```

pub mod bridge;
pub mod control;
pub mod details;
pub mod graph;
pub mod modulator;
pub mod parameter;
pub mod session;
pub mod sync;
pub mod undo;
pub mod value;

// Re-export main types at crate root
pub use bridge::{BridgeListener, ParameterBridge, UNBOUND_DEFAULT_VALUE};
pub use control::{ControlListener, ParameterControl, RawControl};
pub use details::{NYQUIST_GUARD, OptionGroup, ParamFlags, ParamId, ParamScale, ParamUnit, ParameterDetails};
pub use graph::{GraphError, Module, ModuleGraph, ModuleId, ModuleSubtree};
pub use modulator::{ModulationAmount, Modulator, SharedModulator};
pub use parameter::{DEFAULT_SAMPLE_RATE, Parameter, ParameterError, ParameterSnapshot};
pub use session::{Session, SessionOptions};
pub use sync::{EditGate, EditScope, SpinGuard, SpinLock, WaitFn};
pub use undo::{
    ActionError, ChangeParameterDetails, ChangeParameterValue, Coalesce, InsertModule, MoveModule, RemoveModule,
    ReplayMonitor, ReversibleAction, TransactionLog, UndoError, Waiting, WaitingAction,
};
pub use value::{ChannelValues, IndexedOption, InternalValue, MAX_CHANNELS};
