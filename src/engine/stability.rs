use crate::gesture::GestureLabel;

/// Debounces per-frame labels for one hand slot.
///
/// The last `capacity` labels live in a fixed ring buffer. A label is confirmed
/// once the buffer is full and every entry equals it; it is reported once per
/// confirmation, not on every frame the pose stays held.
#[derive(Debug, Clone)]
pub struct StabilityFilter {
    window: Box<[GestureLabel]>,
    /// Index the next observation is written to.
    head: usize,
    filled: usize,
    confirmed: Option<GestureLabel>,
}

impl StabilityFilter {
    /// `capacity` is validated non-zero by `EngineConfig`.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: vec![GestureLabel::NoGesture; capacity].into_boxed_slice(),
            head: 0,
            filled: 0,
            confirmed: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.window.len()
    }

    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn confirmed(&self) -> Option<GestureLabel> {
        self.confirmed
    }

    /// Feed one frame's label; returns the label if it just became stable.
    pub fn observe(&mut self, label: GestureLabel) -> Option<GestureLabel> {
        let capacity = self.capacity();
        self.window[self.head] = label;
        self.head = (self.head + 1) % capacity;
        if self.filled < capacity {
            self.filled += 1;
        }

        if self.filled < capacity {
            return None;
        }
        if !self.window.iter().all(|entry| *entry == label) {
            return None;
        }
        if self.confirmed == Some(label) {
            return None;
        }

        self.confirmed = Some(label);
        Some(label)
    }

    /// Fraction of the window currently agreeing with the newest label.
    pub fn agreement(&self) -> f32 {
        if self.filled == 0 {
            return 0.0;
        }
        let newest = self.window[(self.head + self.capacity() - 1) % self.capacity()];
        let mut run = 0;
        for offset in 1..=self.filled {
            let idx = (self.head + self.capacity() - offset) % self.capacity();
            if self.window[idx] != newest {
                break;
            }
            run += 1;
        }
        run as f32 / self.capacity() as f32
    }

    /// Drop buffered observations but keep the confirmed label, so a pose held
    /// straight through a cooldown is not reported a second time.
    pub fn clear_window(&mut self) {
        self.head = 0;
        self.filled = 0;
    }

    /// Forget the confirmed label once a different one is shown, so the same
    /// pose confirms again after the window refills.
    pub fn disarm(&mut self, shown: GestureLabel) {
        if self.confirmed.is_some_and(|confirmed| confirmed != shown) {
            self.confirmed = None;
        }
    }

    pub fn reset(&mut self) {
        self.clear_window();
        self.confirmed = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use GestureLabel::*;

    fn feed(filter: &mut StabilityFilter, labels: &[GestureLabel]) -> Vec<GestureLabel> {
        labels.iter().filter_map(|l| filter.observe(*l)).collect()
    }

    #[test]
    fn n_minus_one_then_different_never_fires() {
        let mut filter = StabilityFilter::new(5);
        let events = feed(&mut filter, &[ThumbsUp, ThumbsUp, ThumbsUp, ThumbsUp, Pinky]);
        assert!(events.is_empty());
    }

    #[test]
    fn n_identical_fires_exactly_once() {
        let mut filter = StabilityFilter::new(5);
        let events = feed(&mut filter, &[ThumbsUp; 12]);
        assert_eq!(events, vec![ThumbsUp]);
        assert_eq!(filter.confirmed(), Some(ThumbsUp));
    }

    #[test]
    fn fires_on_the_nth_frame() {
        let mut filter = StabilityFilter::new(3);
        assert_eq!(filter.observe(Pinky), None);
        assert_eq!(filter.observe(Pinky), None);
        assert_eq!(filter.observe(Pinky), Some(Pinky));
    }

    #[test]
    fn flicker_delays_confirmation_without_truncating() {
        let mut filter = StabilityFilter::new(3);
        // One deviating frame inside the window.
        let events = feed(&mut filter, &[OneFinger, OneFinger, Unknown, OneFinger, OneFinger]);
        assert!(events.is_empty());
        // Third clean frame pushes the flicker out of the window.
        assert_eq!(filter.observe(OneFinger), Some(OneFinger));
    }

    #[test]
    fn new_label_fires_after_window_refills() {
        let mut filter = StabilityFilter::new(3);
        assert_eq!(feed(&mut filter, &[Pinky; 3]), vec![Pinky]);
        assert_eq!(feed(&mut filter, &[TwoFingers; 3]), vec![TwoFingers]);
        assert_eq!(feed(&mut filter, &[Pinky; 3]), vec![Pinky]);
    }

    #[test]
    fn clear_window_keeps_confirmed_label() {
        let mut filter = StabilityFilter::new(3);
        feed(&mut filter, &[Pinky; 3]);
        filter.clear_window();
        assert_eq!(filter.filled(), 0);
        assert!(feed(&mut filter, &[Pinky; 5]).is_empty());
    }

    #[test]
    fn disarm_only_on_a_different_label() {
        let mut filter = StabilityFilter::new(3);
        feed(&mut filter, &[Pinky; 3]);
        filter.clear_window();
        filter.disarm(Pinky);
        assert_eq!(filter.confirmed(), Some(Pinky));
        filter.disarm(NoGesture);
        assert_eq!(filter.confirmed(), None);
        assert_eq!(feed(&mut filter, &[Pinky; 3]), vec![Pinky]);
    }

    #[test]
    fn reset_forgets_everything() {
        let mut filter = StabilityFilter::new(3);
        feed(&mut filter, &[Pinky; 3]);
        filter.reset();
        assert_eq!(filter.confirmed(), None);
        assert_eq!(feed(&mut filter, &[Pinky; 3]), vec![Pinky]);
    }

    #[test]
    fn agreement_tracks_trailing_run() {
        let mut filter = StabilityFilter::new(4);
        assert_eq!(filter.agreement(), 0.0);
        feed(&mut filter, &[Fist, Pinky, Pinky]);
        assert!((filter.agreement() - 0.5).abs() < f32::EPSILON);
        feed(&mut filter, &[Pinky, Pinky]);
        assert!((filter.agreement() - 1.0).abs() < f32::EPSILON);
    }
}
