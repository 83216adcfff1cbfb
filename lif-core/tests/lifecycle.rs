use lif_core::{
    Alif, AlifConfig, LayerError, Lif, LifConfig, Param, SpikingLayer, StatefulLayer,
};
use ndarray::{Array, ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn filled(shape: &[usize], value: f32) -> ArrayD<f32> {
    Array::from_elem(IxDyn(shape), value)
}

#[test]
fn reset_then_zero_input_is_silent() {
    let mut lif = Lif::new(LifConfig::new(10.0)).unwrap();
    let driven = lif.forward(&filled(&[2, 30, 4], 3.0)).unwrap();
    assert!(driven.sum() > 0.0);
    assert!(lif.state().membrane_potential().iter().any(|&v| v != 0.0));

    lif.reset_states(None, false).unwrap();
    let out = lif.forward(&filled(&[2, 12, 4], 0.0)).unwrap();
    assert_eq!(out.shape(), &[2, 12, 4]);
    assert!(out.iter().all(|&s| s == 0.0));
    assert_eq!(lif.state().spikes_number(), 0.0);
}

#[test]
fn batch_change_reinitializes_silently() {
    let mut lif = Lif::new(LifConfig::new(10.0).with_threshold(100.0)).unwrap();
    lif.forward(&filled(&[3, 5, 2], 1.0)).unwrap();
    assert_eq!(lif.state().shape(), &[3, 2]);
    assert!(lif.state().membrane_potential().iter().all(|&v| v > 0.0));

    // Zero input on a fresh state leaves the potential at exactly zero, so any
    // non-zero value would be a leftover from the previous batch.
    lif.forward(&filled(&[5, 1, 2], 0.0)).unwrap();
    assert_eq!(lif.state().shape(), &[5, 2]);
    assert!(lif.state().membrane_potential().iter().all(|&v| v == 0.0));
}

#[test]
fn state_persists_across_calls() {
    let mut split = Lif::new(LifConfig::new(4.0)).unwrap();
    let mut whole = Lif::new(LifConfig::new(4.0)).unwrap();
    let a = split.forward(&filled(&[1, 6, 1], 1.5)).unwrap();
    let b = split.forward(&filled(&[1, 6, 1], 1.5)).unwrap();
    let all = whole.forward(&filled(&[1, 12, 1], 1.5)).unwrap();
    let joined = ndarray::concatenate(ndarray::Axis(1), &[a.view(), b.view()]).unwrap();
    assert_eq!(joined, all);
    assert_eq!(
        split.state().membrane_potential(),
        whole.state().membrane_potential()
    );
    assert_eq!(split.state().activations(), whole.state().activations());
    assert_eq!(split.state().time_window(), 6);
}

#[test]
fn empty_time_axis_leaves_state_alone() {
    let mut alif = Alif::new(AlifConfig::new(5.0, 30.0)).unwrap();
    alif.forward(&filled(&[2, 8, 3], 2.0)).unwrap();
    let before = alif.state().clone();

    let out = alif.forward(&filled(&[2, 0, 3], 2.0)).unwrap();
    assert_eq!(out.shape(), &[2, 0, 3]);
    assert_eq!(alif.state(), &before);

    // Even a different batch size does not trigger reinitialization.
    alif.forward(&filled(&[7, 0, 3], 2.0)).unwrap();
    assert_eq!(alif.state(), &before);
}

#[test]
fn rank_one_input_is_rejected() {
    let mut lif = Lif::new(LifConfig::new(5.0)).unwrap();
    assert_eq!(
        lif.forward(&filled(&[4], 1.0)).unwrap_err(),
        LayerError::InputRank { expected: 2, got: 1 }
    );
}

#[test]
fn randomized_reset_respects_threshold_low() {
    let mut lif = Lif::new(LifConfig::new(5.0).with_threshold(2.0).with_threshold_low(0.5)).unwrap();
    let mut rng = StdRng::seed_from_u64(11);
    lif.reset_states_with_rng(Some(&[16, 8]), true, &mut rng).unwrap();
    let v = lif.state().membrane_potential();
    assert!(v.iter().all(|&x| (0.5..2.0).contains(&x)));
    assert!(lif.state().activations().iter().all(|&s| s == 0.0));

    let mut symmetric = Lif::new(LifConfig::new(5.0).with_threshold(2.0)).unwrap();
    symmetric.reset_states_with_rng(Some(&[16, 8]), true, &mut rng).unwrap();
    let v = symmetric.state().membrane_potential();
    assert!(v.iter().all(|&x| (-2.0..2.0).contains(&x)));
    assert!(v.iter().any(|&x| x < 0.0));
}

#[test]
fn spikes_are_binary_for_both_policies() {
    for reset in [false, true] {
        let mut lif = Lif::new(LifConfig::new(3.0).with_membrane_reset(reset)).unwrap();
        let input = Array::from_shape_fn(IxDyn(&[2, 40, 3]), |idx| (idx[1] % 7) as f32 * 0.8);
        let out = lif.forward(&input).unwrap();
        assert!(out.iter().all(|&s| s == 0.0 || s == 1.0));
        assert_eq!(lif.state().spikes_number(), out.sum());
        assert_eq!(lif.state().time_window(), 40);
    }
}

#[test]
fn param_dict_round_trips_into_config() {
    let config = LifConfig::new(12.5)
        .with_threshold(Param::Tensor(ndarray::arr1(&[1.0_f32, 2.0]).into_dyn()))
        .with_threshold_low(-1.0)
        .with_membrane_subtract(0.5);
    let lif = Lif::new(config.clone()).unwrap();
    let json = serde_json::to_value(lif.param_dict()).unwrap();
    assert_eq!(json["tau_mem"], serde_json::json!(12.5));
    assert_eq!(json["membrane_reset"], serde_json::json!(false));
    let back: LifConfig = serde_json::from_value(json).unwrap();
    assert_eq!(back, config);

    let alif = Alif::new(AlifConfig::new(10.0, 80.0).with_adapt_scale(0.5)).unwrap();
    let json = serde_json::to_value(alif.param_dict()).unwrap();
    let back: AlifConfig = serde_json::from_value(json).unwrap();
    assert_eq!(&back, alif.config());
}

#[test]
fn layers_can_move_between_threads() {
    fn assert_send<T: Send>() {}
    assert_send::<Lif>();
    assert_send::<Alif>();
}
