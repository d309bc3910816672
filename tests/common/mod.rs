//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use std::time::{Duration, Instant};

/// Upper bound for anything that waits on the scheduler thread
pub fn test_timeout() -> Duration {
    Duration::from_secs(2)
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Assert two slices are approximately equal element by element
pub fn assert_slice_eq(actual: &[f64], expected: &[f64], epsilon: f64) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "Length mismatch: {:?} vs {:?}",
        actual,
        expected
    );
    for (a, b) in actual.iter().zip(expected) {
        assert_float_eq(*a, *b, epsilon);
    }
}

/// Poll `condition` until it holds or the test timeout elapses
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + test_timeout();
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
