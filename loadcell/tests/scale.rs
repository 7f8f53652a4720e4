use std::sync::Arc;
use std::thread;
use std::time::Duration;

use massa_loadcell::sampler::ReadyWait;
use massa_loadcell::{
    open_scale, Backend, CalibrationProfile, DeviceStatus, LoadCellError, Scale, ScaleConfig,
    SimulatedHx711, WeighingSystem, MAX_SAMPLES, SENTINEL_RAW,
};

fn test_config() -> ScaleConfig {
    let mut config = ScaleConfig {
        backend: Backend::Simulated,
        ready: ReadyWait {
            poll_interval: Duration::ZERO,
            max_polls: 3,
        },
        ..ScaleConfig::default()
    };
    config.acquisition.sample_delay = Duration::ZERO;
    config.acquisition.weight_samples = 3;
    config.acquisition.tare_samples = 3;
    config.acquisition.calibration_samples = 3;
    config
}

fn scale(sim: &SimulatedHx711) -> Scale<SimulatedHx711> {
    Scale::new(sim.clone(), &test_config())
}

#[test]
fn test_timeout_degrades_to_sentinel_and_reinit_recovers() {
    let sim = SimulatedHx711::new(5_000);
    let scale = scale(&sim);
    assert_eq!(scale.status().unwrap(), DeviceStatus::Available);

    sim.set_never_ready(true);
    let reading = scale.read_raw().unwrap();
    assert_eq!(reading.value, f64::from(SENTINEL_RAW));
    assert!(!reading.device_available);
    assert_eq!(scale.status().unwrap(), DeviceStatus::Unavailable);
    assert!(sim.claimed_lines().is_empty());

    // with the claim failing, no line is touched at all
    sim.set_fail_claims(true);
    let pulses = sim.total_pulses();
    let claims = sim.claims();
    let reading = scale.read_raw().unwrap();
    assert!(!reading.device_available);
    assert_eq!(sim.total_pulses(), pulses);
    assert_eq!(sim.claims(), claims);

    sim.set_fail_claims(false);
    sim.set_never_ready(false);
    assert_eq!(scale.reinitialize().unwrap(), DeviceStatus::Available);
    let reading = scale.read_raw().unwrap();
    assert_eq!(reading.value, 5_000.0);
    assert!(reading.device_available);
}

#[test]
fn test_explicit_reinit_reports_failure() {
    let sim = SimulatedHx711::new(0);
    sim.set_fail_claims(true);
    let scale = scale(&sim);
    assert_eq!(scale.status().unwrap(), DeviceStatus::Unavailable);
    assert!(matches!(
        scale.reinitialize(),
        Err(LoadCellError::DeviceInit(_))
    ));
}

#[test]
fn test_first_weight_query_tares_implicitly() {
    let sim = SimulatedHx711::new(91_096);
    let scale = scale(&sim);
    assert!(scale.get_calibration().unwrap().is_placeholder());

    let reading = scale.get_weight().unwrap();
    assert!(reading.device_available);
    assert_eq!(reading.value, 0.0);

    let profile = scale.get_calibration().unwrap();
    assert!(!profile.is_placeholder());
    assert_eq!(profile.zero_offset, 91_096.0);
}

#[test]
fn test_tare_then_same_load_weighs_zero() {
    let sim = SimulatedHx711::new(93_859);
    let scale = scale(&sim);
    assert_eq!(scale.tare(5).unwrap(), 93_859.0);
    assert_eq!(scale.read_units().unwrap().value, 0.0);
}

#[test]
fn test_reference_mass_calibration() {
    let sim = SimulatedHx711::new(2_000);
    let scale = scale(&sim);
    scale.tare(3).unwrap();

    sim.set_idle_raw(54_000);
    let profile = scale.set_reference_from_known_mass(500.0).unwrap();
    assert_eq!(profile.zero_offset, 2_000.0);
    assert_eq!(profile.scale_factor, 104.0);

    let reading = scale.read_units().unwrap();
    assert!((reading.value - 500.0).abs() < 1e-9);
    let reading = scale.get_weight().unwrap();
    assert!((reading.value - 500.0).abs() < 1e-9);
}

#[test]
fn test_calibration_rejects_bad_mass_without_touching_state() {
    let sim = SimulatedHx711::new(2_000);
    let scale = scale(&sim);
    scale.tare(3).unwrap();
    let before = scale.get_calibration().unwrap();
    let pulses = sim.total_pulses();

    for mass in [0.0, -1.0] {
        assert!(matches!(
            scale.calibrate(mass, 3),
            Err(LoadCellError::InvalidCalibrationInput(_))
        ));
    }
    assert_eq!(scale.get_calibration().unwrap(), before);
    assert_eq!(sim.total_pulses(), pulses);
}

#[test]
fn test_calibration_with_nothing_on_the_scale_is_rejected() {
    let sim = SimulatedHx711::new(2_000);
    let scale = scale(&sim);
    scale.tare(3).unwrap();
    assert!(matches!(
        scale.calibrate(500.0, 3),
        Err(LoadCellError::InvalidCalibrationInput(_))
    ));
}

#[test]
fn test_unavailable_scale_reports_demo_weight() {
    let sim = SimulatedHx711::new(0);
    sim.set_fail_claims(true);
    let scale = scale(&sim);

    let reading = scale.get_weight().unwrap();
    assert!(!reading.device_available);
    assert_eq!(
        reading.value,
        CalibrationProfile::default().to_weight(f64::from(SENTINEL_RAW))
    );
    assert!(scale.get_calibration().unwrap().is_placeholder());

    assert_eq!(scale.tare(3), Err(LoadCellError::DeviceUnavailable));
    assert_eq!(
        scale.calibrate(500.0, 3),
        Err(LoadCellError::DeviceUnavailable)
    );
}

#[test]
fn test_zero_sample_count_is_rejected() {
    let sim = SimulatedHx711::new(0);
    let scale = scale(&sim);
    assert_eq!(scale.tare(0), Err(LoadCellError::InvalidSampleCount));
}

#[test]
fn test_oversized_sample_count_leaves_scale_usable() {
    let sim = SimulatedHx711::new(2_000);
    let scale = scale(&sim);
    let pulses = sim.total_pulses();

    assert_eq!(scale.tare(usize::MAX), Err(LoadCellError::InvalidSampleCount));
    assert_eq!(
        scale.calibrate(500.0, MAX_SAMPLES + 1),
        Err(LoadCellError::InvalidSampleCount)
    );
    assert_eq!(sim.total_pulses(), pulses);

    assert_eq!(scale.tare(3).unwrap(), 2_000.0);
    assert!(scale.get_weight().unwrap().device_available);
}

#[test]
fn test_shutdown_releases_lines_and_next_read_reclaims() {
    let sim = SimulatedHx711::new(42);
    let scale = scale(&sim);
    scale.shutdown().unwrap();
    assert!(sim.claimed_lines().is_empty());
    assert_eq!(scale.status().unwrap(), DeviceStatus::Unavailable);

    let reading = scale.read_raw().unwrap();
    assert_eq!(reading.value, 42.0);
    assert_eq!(scale.status().unwrap(), DeviceStatus::Available);
}

#[test]
fn test_concurrent_callers_never_interleave_frames() {
    let config = ScaleConfig {
        simulated_raw: -1_234_567,
        ..test_config()
    };
    let scale: Arc<dyn WeighingSystem> = open_scale(&config);

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let scale = Arc::clone(&scale);
            thread::spawn(move || {
                for _ in 0..10 {
                    if worker == 0 {
                        assert_eq!(scale.tare(2).unwrap(), -1_234_567.0);
                    } else {
                        assert_eq!(scale.read_raw().unwrap().value, -1_234_567.0);
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
}
