//! The bounded gear counter.

use crate::events::ShiftEvent;

/// A gear in `1..=top`. The only transitions are single steps up or down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gears {
    current: u32,
    top: u32,
}

impl Gears {
    /// Creates the counter at `initial`, clamped into `1..=top`.
    ///
    /// `top` is raised to 1 if it is zero.
    pub fn new(initial: u32, top: u32) -> Self {
        let top = top.max(1);
        Self {
            current: initial.clamp(1, top),
            top,
        }
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn top(&self) -> u32 {
        self.top
    }

    /// Steps up one gear, or returns `None` at `top`.
    pub fn up(&mut self) -> Option<ShiftEvent> {
        if self.current >= self.top {
            return None;
        }
        let from = self.current;
        self.current += 1;
        Some(ShiftEvent {
            from,
            to: self.current,
        })
    }

    /// Steps down one gear, or returns `None` at gear 1.
    pub fn down(&mut self) -> Option<ShiftEvent> {
        if self.current <= 1 {
            return None;
        }
        let from = self.current;
        self.current -= 1;
        Some(ShiftEvent {
            from,
            to: self.current,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn climbs_to_top_and_stops() {
        let mut gears = Gears::new(1, 4);
        for expected in 2..=4 {
            assert_eq!(gears.up().map(|shift| shift.to), Some(expected));
        }
        assert_eq!(gears.up(), None);
        assert_eq!(gears.up(), None);
        assert_eq!(gears.current(), 4);
    }

    #[test]
    fn cannot_go_below_one() {
        let mut gears = Gears::new(1, 10);
        assert_eq!(gears.down(), None);
        assert_eq!(gears.current(), 1);
    }

    #[test]
    fn initial_gear_is_clamped() {
        assert_eq!(Gears::new(0, 5).current(), 1);
        assert_eq!(Gears::new(9, 5).current(), 5);
        assert_eq!(Gears::new(3, 0).top(), 1);
    }

    #[test]
    fn single_gear_never_moves() {
        let mut gears = Gears::new(1, 1);
        assert_eq!(gears.up(), None);
        assert_eq!(gears.down(), None);
    }
}
