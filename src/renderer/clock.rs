//! Per-frame delta time

/// Measures the time between consecutive rendered frames
#[derive(Debug, Default)]
pub(crate) struct FrameClock {
    last: Option<f64>,
    delta: f32,
}

impl FrameClock {
    /// Start a new frame, returning the seconds elapsed since the previous one
    pub(crate) fn tick(&mut self) -> f32 {
        let now = now_seconds();
        self.delta = match self.last {
            Some(last) => (now - last).max(0.0) as f32,
            None => 0.0,
        };
        self.last = Some(now);
        self.delta
    }

    pub(crate) fn delta(&self) -> f32 {
        self.delta
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn now_seconds() -> f64 {
    use std::sync::OnceLock;
    use std::time::Instant;

    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_secs_f64()
}

#[cfg(target_arch = "wasm32")]
fn now_seconds() -> f64 {
    web_sys::window()
        .and_then(|w| w.performance())
        .map(|p| p.now() / 1000.0)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_tick_is_zero() {
        let mut clock = FrameClock::default();
        assert_eq!(clock.tick(), 0.0);
        let second = clock.tick();
        assert!(second >= 0.0);
        assert_eq!(clock.delta(), second);
    }
}
