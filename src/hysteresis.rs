//! Hysteresis state classification
//!
//! Maps a smoothed CAV score to a categorical state. Exit thresholds are
//! offset from entry thresholds so the state does not flap near a boundary.
//! The classifier is a pure function over explicit named thresholds; the
//! engine owns the previous-state memory.

use crate::types::CavState;
use serde::{Deserialize, Serialize};

/// Named band thresholds on the [0, 10000] CAV scale
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HysteresisBands {
    /// Plain threshold: below this is overload
    pub overload_max: u32,
    /// Plain threshold: below this is balanced
    pub balanced_max: u32,
    /// Plain threshold: below this is focus, at or above is restorative
    pub focus_max: u32,
    /// Leaving overload requires at least this score
    pub overload_exit: u32,
    /// Balanced drops to overload below this
    pub balanced_drop: u32,
    /// Balanced rises toward focus/restorative at or above this
    pub balanced_rise: u32,
    /// Focus drops below this
    pub focus_drop: u32,
    /// Focus rises to restorative at or above this
    pub focus_rise: u32,
    /// Restorative drops below this
    pub restorative_drop: u32,
}

impl Default for HysteresisBands {
    fn default() -> Self {
        Self {
            overload_max: 3000,
            balanced_max: 7000,
            focus_max: 9000,
            overload_exit: 3300,
            balanced_drop: 2700,
            balanced_rise: 7300,
            focus_drop: 6700,
            focus_rise: 9300,
            restorative_drop: 8700,
        }
    }
}

impl HysteresisBands {
    /// Classify a smoothed CAV score given the previous state
    pub fn classify(&self, prev: Option<CavState>, cav: u32) -> CavState {
        match prev {
            None => self.plain(cav),
            Some(CavState::Overload) => {
                if cav >= self.overload_exit {
                    // Re-entry uses plain thresholds from balanced upward
                    if cav < self.balanced_max {
                        CavState::Balanced
                    } else if cav < self.focus_max {
                        CavState::Focus
                    } else {
                        CavState::Restorative
                    }
                } else {
                    CavState::Overload
                }
            }
            Some(CavState::Balanced) => {
                if cav < self.balanced_drop {
                    CavState::Overload
                } else if cav >= self.balanced_rise {
                    if cav < self.focus_max {
                        CavState::Focus
                    } else {
                        CavState::Restorative
                    }
                } else {
                    CavState::Balanced
                }
            }
            Some(CavState::Focus) => {
                if cav < self.focus_drop {
                    if cav < self.overload_max {
                        CavState::Overload
                    } else {
                        CavState::Balanced
                    }
                } else if cav >= self.focus_rise {
                    CavState::Restorative
                } else {
                    CavState::Focus
                }
            }
            Some(CavState::Restorative) => {
                if cav < self.restorative_drop {
                    if cav < self.balanced_max {
                        if cav < self.overload_max {
                            CavState::Overload
                        } else {
                            CavState::Balanced
                        }
                    } else {
                        CavState::Focus
                    }
                } else {
                    CavState::Restorative
                }
            }
        }
    }

    /// Plain thresholds, used when no previous state exists
    fn plain(&self, cav: u32) -> CavState {
        if cav < self.overload_max {
            CavState::Overload
        } else if cav < self.balanced_max {
            CavState::Balanced
        } else if cav < self.focus_max {
            CavState::Focus
        } else {
            CavState::Restorative
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use CavState::*;

    fn bands() -> HysteresisBands {
        HysteresisBands::default()
    }

    #[test]
    fn test_plain_thresholds_without_history() {
        let b = bands();
        assert_eq!(b.classify(None, 0), Overload);
        assert_eq!(b.classify(None, 2999), Overload);
        assert_eq!(b.classify(None, 3000), Balanced);
        assert_eq!(b.classify(None, 6999), Balanced);
        assert_eq!(b.classify(None, 7000), Focus);
        assert_eq!(b.classify(None, 8999), Focus);
        assert_eq!(b.classify(None, 9000), Restorative);
        assert_eq!(b.classify(None, 10000), Restorative);
    }

    #[test]
    fn test_leaving_overload_needs_wider_margin() {
        let b = bands();
        // 3000..3300 would be balanced without history but stays overload
        assert_eq!(b.classify(Some(Overload), 3299), Overload);
        assert_eq!(b.classify(Some(Overload), 3300), Balanced);
        assert_eq!(b.classify(Some(Overload), 7500), Focus);
        assert_eq!(b.classify(Some(Overload), 9500), Restorative);
    }

    #[test]
    fn test_balanced_band_is_sticky() {
        let b = bands();
        assert_eq!(b.classify(Some(Balanced), 2700), Balanced);
        assert_eq!(b.classify(Some(Balanced), 2699), Overload);
        assert_eq!(b.classify(Some(Balanced), 7299), Balanced);
        assert_eq!(b.classify(Some(Balanced), 7300), Focus);
        assert_eq!(b.classify(Some(Balanced), 9000), Restorative);
    }

    #[test]
    fn test_focus_band_is_sticky() {
        let b = bands();
        assert_eq!(b.classify(Some(Focus), 6700), Focus);
        assert_eq!(b.classify(Some(Focus), 6699), Balanced);
        assert_eq!(b.classify(Some(Focus), 2999), Overload);
        assert_eq!(b.classify(Some(Focus), 9299), Focus);
        assert_eq!(b.classify(Some(Focus), 9300), Restorative);
    }

    #[test]
    fn test_restorative_band_is_sticky() {
        let b = bands();
        assert_eq!(b.classify(Some(Restorative), 8700), Restorative);
        assert_eq!(b.classify(Some(Restorative), 8699), Focus);
        assert_eq!(b.classify(Some(Restorative), 6999), Balanced);
        assert_eq!(b.classify(Some(Restorative), 2999), Overload);
    }

    #[test]
    fn test_path_dependence_near_boundary() {
        let b = bands();
        // Same score, different history, different outcome
        assert_eq!(b.classify(Some(Overload), 3100), Overload);
        assert_eq!(b.classify(Some(Balanced), 3100), Balanced);
        assert_eq!(b.classify(Some(Focus), 7100), Focus);
        assert_eq!(b.classify(Some(Balanced), 7100), Balanced);
        assert_eq!(b.classify(Some(Restorative), 8900), Restorative);
        assert_eq!(b.classify(Some(Focus), 8900), Focus);
    }
}
