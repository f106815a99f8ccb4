use super::*;
use crate::config::GestureConfig;
use crate::error::GestureError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn content() -> ShotContent {
    ShotContent::new("Ana", "Hello wall", "data:image/png;base64,iVBORw0KGgo=")
}

fn classifier() -> GestureClassifier {
    GestureClassifier::new(GestureConfig::default(), content())
}

/// Release sample on the y axis with the requested total magnitude
fn release(y: f64, magnitude: f64, t: u64) -> MotionSample {
    MotionSample::new(0.0, y, (magnitude * magnitude - y * y).sqrt(), t)
}

#[test]
fn test_pull_back_then_release_fires_once() {
    let mut classifier = classifier();

    assert!(classifier.feed(MotionSample::new(0.0, -7.0, 0.0, 0)).is_none());
    assert_eq!(classifier.current_state(), GestureState::Charging { since: 0 });

    let shot = classifier.feed(release(9.0, 12.0, 300)).unwrap();
    assert_eq!(shot.fired_at, 300);
    assert!((shot.force - 1.2).abs() < 1e-9);
    assert_eq!(shot.author_name, "Ana");
    assert_eq!(shot.author_message, "Hello wall");
    assert_eq!(
        classifier.current_state(),
        GestureState::Cooldown { since: 300 }
    );
    assert_eq!(classifier.shots_emitted(), 1);
}

#[test]
fn test_release_after_hold_window_is_ignored() {
    let mut classifier = classifier();

    classifier.feed(MotionSample::new(0.0, -7.0, 0.0, 0));
    assert!(classifier.feed(release(9.0, 12.0, 900)).is_none());
    assert_eq!(classifier.current_state(), GestureState::Idle);
    assert_eq!(classifier.shots_emitted(), 0);
}

#[test]
fn test_release_exactly_at_hold_limit_fires() {
    let mut classifier = classifier();

    classifier.feed(MotionSample::new(0.0, -8.0, 0.0, 0));
    assert!(classifier.feed(release(9.0, 12.0, 800)).is_some());
}

#[test]
fn test_force_is_clamped() {
    let mut classifier = classifier();
    classifier.feed(MotionSample::new(0.0, -9.0, 0.0, 0));
    let weak = classifier.feed(MotionSample::new(0.0, 5.5, 0.0, 100)).unwrap();
    assert_eq!(weak.force, MIN_FORCE);

    let mut classifier = self::classifier();
    classifier.feed(MotionSample::new(0.0, -9.0, 0.0, 0));
    let strong = classifier.feed(release(60.0, 150.0, 100)).unwrap();
    assert_eq!(strong.force, MAX_FORCE);
}

#[test]
fn test_overflowing_magnitude_gives_maximum_force() {
    let mut classifier = classifier();
    classifier.feed(MotionSample::new(0.0, -9.0, 0.0, 0));
    let shot = classifier
        .feed(MotionSample::new(1e200, 9.0, 0.0, 100))
        .unwrap();
    assert_eq!(shot.force, MAX_FORCE);

    assert_eq!(clamp_force(f64::INFINITY), MAX_FORCE);
    assert_eq!(clamp_force(f64::NEG_INFINITY), MIN_FORCE);
    assert_eq!(clamp_force(f64::NAN), MIN_FORCE);
}

#[test]
fn test_random_streams_respect_force_bounds_and_cooldown() {
    let mut rng = StdRng::seed_from_u64(7);

    for config in [GestureConfig::default(), GestureConfig::angular_velocity()] {
        let cooldown = config.cooldown_ms;
        let mut classifier = GestureClassifier::new(config, content());
        let mut t = 0;
        let mut shots = Vec::new();

        for _ in 0..20_000 {
            t += rng.gen_range(5..60);
            let sample = MotionSample::new(
                rng.gen_range(-30.0..30.0),
                rng.gen_range(-30.0..30.0),
                rng.gen_range(-30.0..30.0),
                t,
            );
            if let Some(shot) = classifier.feed(sample) {
                shots.push(shot);
            }
        }

        assert!(!shots.is_empty());
        for shot in &shots {
            assert!((MIN_FORCE..=MAX_FORCE).contains(&shot.force));
        }
        for pair in shots.windows(2) {
            assert!(pair[1].fired_at - pair[0].fired_at >= cooldown);
        }
    }
}

#[test]
fn test_cooldown_exit_sample_is_evaluated() {
    let mut classifier = classifier();

    classifier.feed(MotionSample::new(0.0, -8.0, 0.0, 0));
    assert!(classifier.feed(release(9.0, 12.0, 100)).is_some());

    // Still cooling down: a pull-back is swallowed
    assert!(classifier.feed(MotionSample::new(0.0, -8.0, 0.0, 600)).is_none());
    assert_eq!(
        classifier.current_state(),
        GestureState::Cooldown { since: 100 }
    );

    // The first sample past the cooldown both ends it and starts charging
    classifier.feed(MotionSample::new(0.0, -8.0, 0.0, 1_100));
    assert_eq!(
        classifier.current_state(),
        GestureState::Charging { since: 1_100 }
    );
    assert!(classifier.feed(release(9.0, 12.0, 1_300)).is_some());
}

#[test]
fn test_reset_does_not_shorten_cooldown() {
    let mut classifier = classifier();

    classifier.feed(MotionSample::new(0.0, -8.0, 0.0, 0));
    classifier.feed(release(9.0, 12.0, 100)).unwrap();

    classifier.reset();
    assert_eq!(classifier.current_state(), GestureState::Idle);

    classifier.feed(MotionSample::new(0.0, -8.0, 0.0, 200));
    assert!(classifier.feed(release(9.0, 12.0, 300)).is_none());
    assert!(matches!(
        classifier.current_state(),
        GestureState::Cooldown { since: 100 }
    ));
}

#[test]
fn test_backwards_timestamps_never_break_cooldown() {
    let mut classifier = classifier();

    classifier.feed(MotionSample::new(0.0, -8.0, 0.0, 5_000));
    classifier.feed(release(9.0, 12.0, 5_100)).unwrap();

    // Clock jumps back: treated as no time passing
    classifier.feed(MotionSample::new(0.0, -8.0, 0.0, 10));
    assert!(classifier.feed(release(9.0, 12.0, 20)).is_none());
}

#[test]
fn test_angular_velocity_policy() {
    let mut classifier = GestureClassifier::new(GestureConfig::angular_velocity(), content());

    // Upright phone, then a fast flick: 90 degrees in 100ms = 900 deg/s
    assert!(classifier.feed(MotionSample::new(0.0, 0.0, 9.8, 0)).is_none());
    let shot = classifier
        .feed(MotionSample::new(0.0, 16.0, 0.0, 100))
        .unwrap();

    let expected = (900.0_f64 / 50.0 + 16.0 / 5.0).clamp(1.0, 10.0);
    assert!((shot.force - expected).abs() < 1e-6);
    assert_eq!(
        classifier.current_state(),
        GestureState::Cooldown { since: 100 }
    );
}

#[test]
fn test_angular_policy_ignores_slow_tilt() {
    let mut classifier = GestureClassifier::new(GestureConfig::angular_velocity(), content());

    // 90 degrees over two seconds is 45 deg/s
    classifier.feed(MotionSample::new(0.0, 0.0, 9.8, 0));
    assert!(classifier
        .feed(MotionSample::new(0.0, 16.0, 0.0, 2_000))
        .is_none());
    assert_eq!(classifier.current_state(), GestureState::Idle);
}

#[test]
fn test_angular_policy_needs_magnitude() {
    let mut classifier = GestureClassifier::new(GestureConfig::angular_velocity(), content());

    classifier.feed(MotionSample::new(0.0, 0.0, 9.8, 0));
    assert!(classifier
        .feed(MotionSample::new(0.0, 9.8, 0.0, 100))
        .is_none());
}

#[test]
fn test_unavailable_classifier_reports_once() {
    let mut classifier =
        GestureClassifier::for_source(GestureConfig::default(), content(), &UnavailableSource);

    assert_eq!(classifier.current_state(), GestureState::Unavailable);
    assert_eq!(
        classifier.sensor_condition(),
        Some(GestureError::SensorUnavailable)
    );
    assert_eq!(classifier.sensor_condition(), None);

    classifier.feed(MotionSample::new(0.0, -8.0, 0.0, 0));
    assert!(classifier.feed(release(9.0, 12.0, 100)).is_none());
    classifier.reset();
    assert_eq!(classifier.current_state(), GestureState::Unavailable);
}

#[test]
fn test_json_lines_source() {
    let text = r#"
# pull back then release
{"x": 0.0, "y": -7.5, "z": 1.0, "t": 0}

{"x": 0.0, "y": 9.0, "z": 7.9, "t": 250}
"#;
    let source = ReplaySource::from_json_lines(text).unwrap();
    assert_eq!(source.remaining(), 2);

    let err = ReplaySource::from_json_lines("{\"x\": 1}").err().unwrap();
    assert!(matches!(err, GestureError::Source { .. }));
}

#[tokio::test]
async fn test_drive_forwards_shots() {
    let mut source = ReplaySource::from_samples(vec![
        MotionSample::new(0.0, -7.5, 0.0, 0),
        release(9.0, 12.0, 200),
        MotionSample::new(0.0, -7.5, 0.0, 400),
        release(9.0, 12.0, 600),
        MotionSample::new(0.0, -7.5, 0.0, 1_500),
        release(9.0, 30.0, 1_700),
    ]);
    let mut classifier = GestureClassifier::for_source(GestureConfig::default(), content(), &source);
    let (tx, mut rx) = mpsc::channel(8);

    let forwarded = drive(&mut classifier, &mut source, tx, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(forwarded, 2);

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(first.fired_at, 200);
    assert_eq!(second.fired_at, 1_700);
    assert!((second.force - 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_drive_unavailable_source() {
    let mut source = UnavailableSource;
    let mut classifier = GestureClassifier::for_source(GestureConfig::default(), content(), &source);
    let (tx, _rx) = mpsc::channel(1);

    let result = drive(&mut classifier, &mut source, tx, CancellationToken::new()).await;
    assert_eq!(result, Err(GestureError::SensorUnavailable));
}
