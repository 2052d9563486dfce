use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Belt {
    White,
    Yellow,
    Orange,
    Green,
    Blue,
    Purple,
    Brown,
    Black,
    Coral,
    Red,
}

/// Promotion policy: cumulative present classes needed for each rank, in
/// ascending order. Thresholds are strictly increasing.
pub const LADDER: [(Belt, u32); 10] = [
    (Belt::White, 10),
    (Belt::Yellow, 30),
    (Belt::Orange, 60),
    (Belt::Green, 90),
    (Belt::Blue, 120),
    (Belt::Purple, 150),
    (Belt::Brown, 200),
    (Belt::Black, 250),
    (Belt::Coral, 300),
    (Belt::Red, 350),
];

impl Belt {
    pub const ORDER: [Belt; 10] = [
        Belt::White,
        Belt::Yellow,
        Belt::Orange,
        Belt::Green,
        Belt::Blue,
        Belt::Purple,
        Belt::Brown,
        Belt::Black,
        Belt::Coral,
        Belt::Red,
    ];

    pub fn position(self) -> usize {
        self as usize
    }

    pub fn threshold(self) -> u32 {
        LADDER[self.position()].1
    }

    pub fn next(self) -> Option<Belt> {
        Self::ORDER.get(self.position() + 1).copied()
    }

    /// Highest rank whose threshold has been met. White is the floor, so a
    /// count below White's own threshold still maps to White.
    pub fn for_classes(classes_present: u32) -> Belt {
        let mut current = Belt::White;
        for (belt, threshold) in LADDER.iter() {
            if classes_present >= *threshold {
                current = *belt;
            } else {
                break;
            }
        }
        current
    }

    pub fn name(self) -> &'static str {
        match self {
            Belt::White => "White",
            Belt::Yellow => "Yellow",
            Belt::Orange => "Orange",
            Belt::Green => "Green",
            Belt::Blue => "Blue",
            Belt::Purple => "Purple",
            Belt::Brown => "Brown",
            Belt::Black => "Black",
            Belt::Coral => "Coral",
            Belt::Red => "Red",
        }
    }
}

impl fmt::Display for Belt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for Belt {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Belt::ORDER
            .iter()
            .copied()
            .find(|belt| belt.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown belt: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_thresholds_strictly_increase() {
        for pair in LADDER.windows(2) {
            assert!(pair[0].1 < pair[1].1);
            assert!(pair[0].0 < pair[1].0);
        }
        for (index, (belt, _)) in LADDER.iter().enumerate() {
            assert_eq!(Belt::ORDER[index], *belt);
        }
    }

    #[test]
    fn white_is_the_floor() {
        assert_eq!(Belt::for_classes(0), Belt::White);
        assert_eq!(Belt::for_classes(9), Belt::White);
        assert_eq!(Belt::for_classes(29), Belt::White);
        assert_eq!(Belt::for_classes(30), Belt::Yellow);
    }

    #[test]
    fn rank_is_highest_threshold_met() {
        assert_eq!(Belt::for_classes(35), Belt::Yellow);
        assert_eq!(Belt::for_classes(60), Belt::Orange);
        assert_eq!(Belt::for_classes(199), Belt::Purple);
        assert_eq!(Belt::for_classes(350), Belt::Red);
        assert_eq!(Belt::for_classes(10_000), Belt::Red);
    }

    #[test]
    fn rank_never_regresses_as_count_grows() {
        let mut previous = Belt::for_classes(0);
        for count in 1..=400 {
            let belt = Belt::for_classes(count);
            assert!(belt >= previous, "regressed at {count}");
            previous = belt;
        }
    }

    #[test]
    fn only_red_has_no_next_belt() {
        for belt in Belt::ORDER {
            assert_eq!(belt.next().is_none(), belt == Belt::Red);
        }
        assert_eq!(Belt::White.next(), Some(Belt::Yellow));
    }

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("purple".parse::<Belt>(), Ok(Belt::Purple));
        assert_eq!(" Coral ".parse::<Belt>(), Ok(Belt::Coral));
        assert!("Grey".parse::<Belt>().is_err());
        assert_eq!(Belt::Brown.to_string(), "Brown");
    }
}
