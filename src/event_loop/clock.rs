//! Redraw timing
//!
//! Frame pacing between a high rate while the display is busy and an
//! idle rate otherwise, plus the blink phase timer.

use std::time::{Duration, Instant};

/// Shortest wait handed to the poller once a deadline has passed
const MIN_WAIT: Duration = Duration::from_micros(1);

#[derive(Debug, Clone)]
pub struct FrameClock {
    active_fps: u32,
    idle_fps: u32,
    blink: Option<Duration>,
    last_draw: Instant,
    last_blink: Instant,
    /// Frames left at the high rate since display input was last seen
    activity: u32,
}

impl FrameClock {
    pub fn new(active_fps: u32, idle_fps: u32, blink: Option<Duration>, now: Instant) -> Self {
        let idle_fps = idle_fps.max(1);
        Self {
            active_fps: active_fps.max(1),
            idle_fps,
            blink,
            last_draw: now,
            last_blink: now,
            activity: idle_fps,
        }
    }

    pub fn blink_enabled(&self) -> bool {
        self.blink.is_some()
    }

    /// Display connection had input this tick
    pub fn note_input(&mut self) {
        self.activity = self.idle_fps;
    }

    pub fn is_active(&self) -> bool {
        self.activity > 0
    }

    /// Wait used while frames are pending
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.active_fps
    }

    /// True (and restarts the phase) when the blink interval elapsed
    pub fn blink_due(&mut self, now: Instant) -> bool {
        match self.blink {
            Some(interval) if now.saturating_duration_since(self.last_blink) > interval => {
                self.last_blink = now;
                true
            }
            _ => false,
        }
    }

    /// True (and restarts the frame) when the current rate allows a draw
    pub fn frame_due(&mut self, now: Instant) -> bool {
        let fps = if self.is_active() {
            self.active_fps
        } else {
            self.idle_fps
        };
        if now.saturating_duration_since(self.last_draw) > Duration::from_secs(1) / fps {
            self.last_draw = now;
            true
        } else {
            false
        }
    }

    /// Count a drawn frame against the high-rate budget
    pub fn after_draw(&mut self, display_ready: bool) {
        if self.activity > 0 && !display_ready {
            self.activity -= 1;
        }
    }

    /// Wait after a draw with no input: until the next blink toggle when
    /// something on screen blinks, otherwise indefinitely
    pub fn idle_timeout(&self, now: Instant, blinking: bool) -> Option<Duration> {
        let interval = self.blink.filter(|_| blinking)?;
        let elapsed = now.saturating_duration_since(self.last_blink);
        Some(interval.saturating_sub(elapsed).max(MIN_WAIT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_frame_rate_follows_activity() {
        let t0 = Instant::now();
        let mut clock = FrameClock::new(100, 10, None, t0);
        // Active: 10ms frames
        assert!(!clock.frame_due(t0 + ms(5)));
        assert!(clock.frame_due(t0 + ms(11)));

        // Burn the high-rate budget without display input
        for _ in 0..10 {
            clock.after_draw(false);
        }
        assert!(!clock.is_active());
        assert!(!clock.frame_due(t0 + ms(11) + ms(50)));
        assert!(clock.frame_due(t0 + ms(11) + ms(101)));

        clock.note_input();
        assert!(clock.is_active());
    }

    #[test]
    fn test_display_input_keeps_budget() {
        let t0 = Instant::now();
        let mut clock = FrameClock::new(100, 3, None, t0);
        for _ in 0..10 {
            clock.after_draw(true);
        }
        assert!(clock.is_active());
    }

    #[test]
    fn test_blink_phase() {
        let t0 = Instant::now();
        let mut clock = FrameClock::new(120, 30, Some(ms(500)), t0);
        assert!(!clock.blink_due(t0 + ms(400)));
        assert!(clock.blink_due(t0 + ms(501)));
        assert!(!clock.blink_due(t0 + ms(600)));
        assert!(clock.blink_due(t0 + ms(1002)));
    }

    #[test]
    fn test_idle_timeout() {
        let t0 = Instant::now();
        let clock = FrameClock::new(120, 30, Some(ms(500)), t0);
        assert_eq!(clock.idle_timeout(t0 + ms(200), true), Some(ms(300)));
        assert_eq!(clock.idle_timeout(t0 + ms(900), true), Some(MIN_WAIT));
        assert_eq!(clock.idle_timeout(t0 + ms(200), false), None);

        let no_blink = FrameClock::new(120, 30, None, t0);
        assert_eq!(no_blink.idle_timeout(t0, true), None);
    }

    #[test]
    fn test_frame_interval() {
        let clock = FrameClock::new(125, 30, None, Instant::now());
        assert_eq!(clock.frame_interval(), ms(8));
    }
}
