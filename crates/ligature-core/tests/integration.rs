//! Integration tests for ligature-core.
//!
//! Exercises the parameter, bridge, control, and modulator together the way a
//! host drives them, then the session with an audio thread running alongside
//! UI-thread edits.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use ligature_core::{
    BridgeListener, ModuleId, ModuleSubtree, Modulator, OptionGroup, ParamId, ParamUnit, Parameter,
    ParameterBridge, ParameterControl, ParameterDetails, ParameterSnapshot, RawControl, Session,
    SessionOptions, SharedModulator,
};
use parking_lot::Mutex;

const SAMPLE_RATE: f32 = 48000.0;

fn linear(name: &str) -> Arc<Parameter> {
    Parameter::shared(ParameterDetails::continuous(ParamId(1), name, 0.0, 1.0, 0.5))
}

#[derive(Default)]
struct Recorder {
    links: Mutex<Vec<(bool, bool)>>,
    gestures: Mutex<Vec<bool>>,
    values: Mutex<Vec<f32>>,
}

impl BridgeListener for Recorder {
    fn parameter_link_changed(
        &self,
        _bridge: &ParameterBridge,
        old: Option<&Arc<Parameter>>,
        new: Option<&Arc<Parameter>>,
    ) {
        self.links.lock().push((old.is_some(), new.is_some()));
    }

    fn parameter_value_changed(&self, _bridge: &ParameterBridge, value: f32) {
        self.values.lock().push(value);
    }

    fn parameter_gesture_changed(&self, _bridge: &ParameterBridge, active: bool) {
        self.gestures.lock().push(active);
    }
}

// ============================================================================
// 1. Update cycle
// ============================================================================

#[test]
fn ui_value_then_modulation() {
    let p = linear("Mix");
    let control = RawControl::new(0.0);
    control.attach(&p);
    assert_eq!(control.value_raw(), 0.5);

    control.set_value_raw(0.8);
    assert!(p.update_value(SAMPLE_RATE));
    assert_eq!(p.internal_value::<f32>(SAMPLE_RATE, false), 0.8);

    let lfo = Arc::new(SharedModulator::default());
    lfo.set_signal(0.3);
    let lfo: Arc<dyn Modulator> = lfo;
    p.add_modulator(Arc::downgrade(&lfo), None);
    assert!(p.update_value(SAMPLE_RATE));
    assert_eq!(p.internal_value::<f32>(SAMPLE_RATE, true), 1.0);

    drop(lfo);
    assert!(p.update_value(SAMPLE_RATE));
    assert_eq!(p.internal_value::<f32>(SAMPLE_RATE, true), 0.8);
    assert!(!p.update_value(SAMPLE_RATE));
}

#[test]
fn host_value_wins_over_ui() {
    let p = linear("Drive");
    let control = RawControl::new(0.0);
    control.attach(&p);
    let bridge = ParameterBridge::new(0);
    bridge.reset_parameter_link(Some(&p), true);

    control.set_value_raw(0.9);
    bridge.set_value(0.2);
    p.update_value(SAMPLE_RATE);
    assert_eq!(p.normalized_value(), 0.2);
    assert!(bridge.take_dirty());
    assert!(!bridge.take_dirty());
}

#[test]
fn non_finite_host_value_is_ignored() {
    let p = linear("Drive");
    let bridge = ParameterBridge::new(0);
    bridge.reset_parameter_link(Some(&p), false);
    bridge.set_value(0.3);
    assert!(p.update_value(SAMPLE_RATE));
    assert!(bridge.take_dirty());

    for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
        bridge.set_value(bad);
        assert_eq!(bridge.value(), 0.3);
        assert!(!bridge.take_dirty());
    }
    let recomputed: Vec<bool> = (0..3).map(|_| p.update_value(SAMPLE_RATE)).collect();
    assert_eq!(recomputed, [false, false, false]);
    assert_eq!(p.internal_value::<f32>(SAMPLE_RATE, false), 0.3);
}

#[test]
fn non_finite_ui_and_modulation_are_ignored() {
    let p = linear("Tone");
    let control = RawControl::new(f32::NAN);
    assert_eq!(control.value_raw(), 0.0);
    control.attach(&p);
    control.set_value_raw(f32::NAN);
    assert_eq!(control.value_raw(), 0.5);

    p.set_normalized_value(f32::NAN);
    assert_eq!(p.normalized_value(), 0.5);

    let lfo = Arc::new(SharedModulator::default());
    lfo.set_signal(f32::NAN);
    p.add_modulator(Arc::<SharedModulator>::downgrade(&lfo), None);
    p.update_value(SAMPLE_RATE);
    assert!(!p.update_value(SAMPLE_RATE));
    assert_eq!(p.internal_value::<f32>(SAMPLE_RATE, false), 0.5);

    p.initialise(Some(f32::NAN));
    assert_eq!(p.normalized_value(), 0.5);
}

#[test]
fn ui_edit_reaches_bound_bridge() {
    let p = linear("Tone");
    let control = RawControl::new(0.0);
    control.attach(&p);
    let bridge = ParameterBridge::new(0);
    bridge.reset_parameter_link(Some(&p), true);
    let recorder = Arc::new(Recorder::default());
    bridge.add_listener(recorder.clone());

    control.begin_change_gesture();
    control.edit(0.75);
    control.end_change_gesture();

    assert_eq!(bridge.value(), 0.75);
    assert_eq!(control.value_raw(), 0.75);
    assert_eq!(*recorder.values.lock(), vec![0.75]);
    assert_eq!(*recorder.gestures.lock(), vec![true, false]);
    p.update_value(SAMPLE_RATE);
    assert_eq!(p.internal_value::<f32>(SAMPLE_RATE, false), 0.75);
}

#[test]
fn stereo_modulation_per_channel() {
    let p = Parameter::shared(
        ParameterDetails::continuous(ParamId(2), "Width", 0.0, 1.0, 0.5)
            .with_flags(ligature_core::ParamFlags::AUTOMATABLE.union(ligature_core::ParamFlags::STEREO)),
    );
    let m = Arc::new(SharedModulator::default());
    m.set_channel_signals([0.25, -0.25]);
    let m: Arc<dyn Modulator> = m;
    p.add_modulator(Arc::downgrade(&m), None);
    p.update_value(SAMPLE_RATE);
    assert_eq!(p.internal_value::<[f32; 2]>(SAMPLE_RATE, false), [0.75, 0.25]);
}

#[test]
fn frequency_follows_sample_rate() {
    let p = Parameter::shared(ParameterDetails::frequency(ParamId(3), "Cutoff", 20.0, 20_000.0, 1_000.0));
    p.set_normalized_value(1.0);
    p.update_value(SAMPLE_RATE);
    assert!((p.internal_value::<f32>(SAMPLE_RATE, false) - 20_000.0).abs() < 1.0);

    p.update_value(22_050.0);
    let limited = p.internal_value::<f32>(22_050.0, false);
    assert!(limited <= 22_050.0 * 0.49 + 0.5);
}

#[test]
fn indexed_option_lookup() {
    let p = Parameter::shared(ParameterDetails::indexed(
        ParamId(4),
        "Mode",
        vec![
            OptionGroup::single("Off"),
            OptionGroup::with_entries("Tube", ["Warm", "Hot"]),
        ],
        2,
    ));
    let option: ligature_core::IndexedOption = p.internal_value(SAMPLE_RATE, false);
    assert_eq!((option.option, option.sub_index), (1, 1));
    assert_eq!(p.internal_value::<usize>(SAMPLE_RATE, false), 2);
    assert!(p.try_internal_value::<f32>(SAMPLE_RATE, false).is_err());
}

// ============================================================================
// 2. Bridge binding
// ============================================================================

#[test]
fn bridge_names_follow_binding() {
    let p = linear("Cutoff");
    let bridge = ParameterBridge::new(2);
    assert_eq!(bridge.name(), "3");
    bridge.reset_parameter_link(Some(&p), false);
    assert_eq!(bridge.name(), "3 > Cutoff");
    assert_eq!(bridge.name_truncated(5), "3 > C");
    bridge.reset_parameter_link(None, false);
    assert_eq!(bridge.name(), "3");
}

#[test]
fn rebinding_moves_ownership() {
    let x = linear("X");
    let y = linear("Y");
    let a = ParameterBridge::new(0);
    let b = ParameterBridge::new(1);
    let recorder = Arc::new(Recorder::default());
    a.add_listener(recorder.clone());

    a.reset_parameter_link(Some(&x), true);
    a.reset_parameter_link(Some(&y), true);
    assert!(x.host_control().is_none());
    assert!(Arc::ptr_eq(&y.host_control().unwrap(), &a));

    b.reset_parameter_link(Some(&y), true);
    assert!(Arc::ptr_eq(&y.host_control().unwrap(), &b));
    assert!(a.parameter().is_none());
    assert_eq!(a.name(), "1");
    assert_eq!(
        *recorder.links.lock(),
        vec![(false, true), (true, true), (true, false)]
    );
}

#[test]
fn dropping_either_side_unlinks() {
    let p = linear("Gain");
    let bridge = ParameterBridge::new(0);
    let recorder = Arc::new(Recorder::default());
    bridge.add_listener(recorder.clone());
    bridge.reset_parameter_link(Some(&p), true);
    drop(p);
    assert!(!bridge.is_bound());
    assert_eq!(bridge.name(), "1");
    assert_eq!(recorder.links.lock().last(), Some(&(false, false)));

    let q = linear("Pan");
    let other = ParameterBridge::new(1);
    other.reset_parameter_link(Some(&q), true);
    drop(other);
    assert!(q.host_control().is_none());

    let control = RawControl::new(0.1);
    control.attach(&q);
    drop(control);
    assert!(q.ui_control().is_none());
}

#[test]
fn unbound_bridge_host_surface() {
    let bridge = ParameterBridge::new(0);
    assert_eq!(bridge.default_value(), 0.0);
    assert_eq!(bridge.value_for_text("0.25"), Some(0.25));
    assert_eq!(bridge.unit_label(), "");

    let p = Parameter::shared(
        ParameterDetails::continuous(ParamId(5), "Level", 0.0, 100.0, 25.0).with_unit(ParamUnit::Percent),
    );
    bridge.reset_parameter_link(Some(&p), true);
    assert_eq!(bridge.default_value(), 0.25);
    assert_eq!(bridge.value(), 0.25);
    assert!(!bridge.is_discrete());
}

// ============================================================================
// 3. Snapshots
// ============================================================================

#[test]
fn snapshot_survives_json() {
    let p = Parameter::shared(ParameterDetails::frequency(ParamId(6), "Cutoff", 20.0, 20_000.0, 440.0));
    p.set_normalized_value(0.3);
    let json = serde_json::to_string(&p.serialize()).unwrap();
    let snapshot: ParameterSnapshot = serde_json::from_str(&json).unwrap();
    let restored = Parameter::from_snapshot(snapshot);
    assert_eq!(restored.normalized_value(), 0.3);
    assert_eq!(*restored.details(), *p.details());
    p.update_value(SAMPLE_RATE);
    assert_eq!(
        restored.internal_value::<f32>(SAMPLE_RATE, false),
        p.internal_value::<f32>(SAMPLE_RATE, false)
    );
}

// ============================================================================
// 4. Session
// ============================================================================

fn session() -> Session {
    Session::new(SessionOptions {
        undo_capacity: 16,
        host_slot_count: 8,
        ..SessionOptions::default()
    })
}

#[test]
fn nested_subtree_round_trips_through_undo() {
    let session = session();
    let chain = session.create_module("chain", Vec::new());
    let filter = session.create_module(
        "filter",
        vec![ParameterDetails::frequency(ParamId(1), "Cutoff", 20.0, 20_000.0, 1_000.0)],
    );
    let cutoff = Arc::clone(&filter.parameters[0]);
    let (chain_id, filter_id) = (chain.id, filter.id);
    let subtree = ModuleSubtree {
        module: chain,
        children: vec![ModuleSubtree::leaf(filter)],
    };
    session.insert_module(ModuleId::ROOT, 0, subtree).unwrap();
    session.bind_bridge(0, Some(&cutoff), true);
    session.set_parameter_value(&cutoff, 0.9).unwrap();

    session.remove_module(chain_id).unwrap();
    session.with_graph(|g| assert!(!g.contains(filter_id)));
    session.undo().unwrap();
    session.with_graph(|g| {
        assert_eq!(g.parent(filter_id), Some(chain_id));
        assert!(Arc::ptr_eq(&g.module(filter_id).unwrap().parameters[0], &cutoff));
    });
    assert!(Arc::ptr_eq(&session.bridge(0).unwrap().parameter().unwrap(), &cutoff));

    session.undo().unwrap();
    assert_eq!(cutoff.normalized_value(), cutoff.details().default_normalized);
    session.redo().unwrap();
    assert_eq!(cutoff.normalized_value(), 0.9);
}

#[test]
fn move_between_parents_undoes() {
    let session = session();
    let a = session.create_module("bus", Vec::new());
    let b = session.create_module("bus", Vec::new());
    let leaf = session.create_module("gain", Vec::new());
    let (a_id, b_id, leaf_id) = (a.id, b.id, leaf.id);
    session.insert_module(ModuleId::ROOT, 0, ModuleSubtree::leaf(a)).unwrap();
    session.insert_module(ModuleId::ROOT, 1, ModuleSubtree::leaf(b)).unwrap();
    session.insert_module(a_id, 0, ModuleSubtree::leaf(leaf)).unwrap();

    session.move_module(a_id, 0, b_id, 0).unwrap();
    session.with_graph(|g| assert_eq!(g.parent(leaf_id), Some(b_id)));
    assert!(session.move_module(ModuleId::ROOT, 1, b_id, 0).is_err());

    session.undo().unwrap();
    session.with_graph(|g| assert_eq!(g.parent(leaf_id), Some(a_id)));
}

#[test]
fn audio_thread_runs_during_edits() {
    let session = Arc::new(session());
    let module = session.create_module(
        "gain",
        vec![ParameterDetails::continuous(ParamId(1), "Level", 0.0, 1.0, 0.5)],
    );
    let level = Arc::clone(&module.parameters[0]);
    session.insert_module(ModuleId::ROOT, 0, ModuleSubtree::leaf(module)).unwrap();
    session.bind_bridge(0, Some(&level), true);

    let stop = Arc::new(AtomicBool::new(false));
    let audio = {
        let session = Arc::clone(&session);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut processed = 0usize;
            while !stop.load(Ordering::Acquire) {
                if session.process_block(SAMPLE_RATE).is_some() {
                    processed += 1;
                }
                thread::yield_now();
            }
            processed
        })
    };
    let host = {
        let bridge = Arc::clone(session.bridge(0).unwrap());
        thread::spawn(move || {
            for i in 0..500 {
                bridge.set_value((i % 100) as f32 / 100.0);
            }
        })
    };

    for _ in 0..50 {
        let extra = session.create_module("delay", Vec::new());
        let id = session.insert_module(ModuleId::ROOT, 1, ModuleSubtree::leaf(extra)).unwrap();
        session.remove_module(id).unwrap();
        session.undo().unwrap();
        session.undo().unwrap();
    }

    host.join().unwrap();
    stop.store(true, Ordering::Release);
    let processed = audio.join().unwrap();

    assert!(processed > 0);
    assert!(session.process_block(SAMPLE_RATE).is_some());
    let value = level.internal_value::<f32>(SAMPLE_RATE, false);
    assert!((0.0..=1.0).contains(&value));
    assert_eq!(value, session.bridge(0).unwrap().value());
    session.with_graph(|g| assert_eq!(g.children(ModuleId::ROOT).map(<[ModuleId]>::len), Some(1)));
}
