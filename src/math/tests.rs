use super::interpolate::*;
use super::physics::*;
use crate::config::Constants;

#[test]
fn test_lin_interp() {
    assert_eq!(lin_interp(1.0, 3.0, 0.5), 2.0);
}

#[test]
fn test_linear_interpolation() {
    let result = linear_interpolate(0.0, 0.0, 1.0, 10.0, 0.5);
    assert_eq!(result, 5.0);
}

#[test]
fn test_potential_temperature_round_trip() {
    let constants = Constants::default();
    let theta = potential_temperature(250.0, 500.0, &constants);
    assert!(theta > 250.0);
    let t = temperature_from_potential(theta, 500.0, &constants);
    assert!((t - 250.0).abs() < 1e-9);
}

#[test]
fn test_synthetic_temperature_profile() {
    let constants = Constants::default();
    assert_eq!(synthetic_temperature(0.0, 0.0, &constants), 255.0);
    assert!((synthetic_temperature(1000.0, 0.0, &constants) - 315.0).abs() < 1e-9);
    assert!((synthetic_temperature(1000.0, -90.0, &constants) - 255.0).abs() < 1e-9);
}

#[test]
fn test_arange_stays_below_stop() {
    let lat = arange(-87.5, 90.0, 5.0);
    assert_eq!(lat.len(), 36);
    assert_eq!(lat[0], -87.5);
    assert_eq!(lat[35], 87.5);
    assert!(arange(1.0, 0.0, 1.0).is_empty());
}

#[test]
fn test_bin_midpoints_symmetric() {
    let mids = bin_midpoints(0.0, 1013.25, 4);
    assert_eq!(mids.len(), 4);
    assert!((mids[0] + mids[3] - 1013.25).abs() < 1e-9);
}

#[test]
fn test_monotonic_direction() {
    assert_eq!(strict_monotonic_direction(&[1.0, 2.0, 3.0]), Some(true));
    assert_eq!(strict_monotonic_direction(&[3.0, 2.0, 1.0]), Some(false));
    assert_eq!(strict_monotonic_direction(&[1.0, 1.0, 2.0]), None);
    assert_eq!(strict_monotonic_direction::<f64>(&[1.0]), None);
}

#[test]
fn test_find_bounding_index() {
    let theta = [300.0, 310.0, 320.0, 330.0];
    assert_eq!(find_bounding_index(&theta, 315.0), Some(2));
    assert_eq!(find_bounding_index(&theta, 300.0), Some(1));
    assert_eq!(find_bounding_index(&theta, 340.0), None);
    assert_eq!(find_bounding_index(&theta, 290.0), None);
}

#[test]
fn test_interp_1d_masks_outside_range() {
    let xp = [1.0, 2.0, 4.0];
    let fp = [10.0, 20.0, 40.0];
    assert_eq!(interp_1d(3.0, &xp, &fp), 30.0);
    assert_eq!(interp_1d(1.0, &xp, &fp), 10.0);
    assert_eq!(interp_1d(4.0, &xp, &fp), 40.0);
    assert!(interp_1d(0.5, &xp, &fp).is_nan());
    assert!(interp_1d(4.5, &xp, &fp).is_nan());
}

#[test]
fn test_interp_bracketed_either_direction() {
    let values = [1.0, 2.0, 3.0];
    assert_eq!(interp_bracketed(15.0, &[10.0, 20.0, 30.0], &values), 1.5);
    assert_eq!(interp_bracketed(15.0, &[30.0, 20.0, 10.0], &values), 2.5);
    assert!(interp_bracketed(35.0, &[10.0, 20.0, 30.0], &values).is_nan());
}
