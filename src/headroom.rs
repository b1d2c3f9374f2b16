//! Headroom guard.
//!
//! Pure computation of the clip margin left by a candidate state, evaluated
//! before any side effect. The formula accounts for every active gain stage:
//!
//! ```text
//! hr = -level + lu_offset - |balance|/2 - drcs_offset
//!      - max(0, bass)  (unless tone defeat)
//!      - max(0, treble) (unless tone defeat)
//!      - max(0, target boost)
//! ```
//!
//! rounded to 0.1 dB. A negative result rejects the candidate.

use crate::error::{PreampError, Result};
use crate::state::PreampState;

/// Outcome of clamping a tone control to the configured span.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneClamp {
    pub value: f32,
    pub clamped: bool,
}

/// Clamp a bass/treble request to `[-span, +span]`.
pub fn clamp_tone(db: f32, span: f32) -> ToneClamp {
    if db.abs() > span {
        ToneClamp {
            value: db.clamp(-span, span),
            clamped: true,
        }
    } else {
        ToneClamp { value: db, clamped: false }
    }
}

/// Low-frequency boost encoded in a target id (`+3.0-1.0` -> 3.0).
/// `none` and unparsable ids contribute nothing.
pub fn target_gain(target: &str) -> f32 {
    if target == "none" {
        return 0.0;
    }
    target
        .get(..4)
        .and_then(|prefix| prefix.parse().ok())
        .unwrap_or(0.0)
}

/// Projected headroom of a candidate state, in dB.
pub fn headroom(candidate: &PreampState, drcs_offset: f32) -> f32 {
    let mut hr =
        -candidate.level + candidate.lu_offset - candidate.balance.abs() / 2.0 - drcs_offset;

    if !candidate.tone_defeat {
        if candidate.bass > 0.0 {
            hr -= candidate.bass;
        }
        if candidate.treble > 0.0 {
            hr -= candidate.treble;
        }
    }

    let tgain = target_gain(&candidate.target);
    if tgain > 0.0 {
        hr -= tgain;
    }

    (hr * 10.0).round() / 10.0
}

/// Validate a candidate state, returning its headroom or [`PreampError::NoHeadroom`].
pub fn validate(candidate: &PreampState, drcs_offset: f32) -> Result<f32> {
    let hr = headroom(candidate, drcs_offset);
    if hr >= 0.0 {
        Ok(hr)
    } else {
        Err(PreampError::NoHeadroom { headroom: hr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use test_case::test_case;

    fn base_state() -> PreampState {
        PreampState {
            level: -20.0,
            lu_offset: 0.0,
            balance: 0.0,
            bass: 0.0,
            treble: 0.0,
            target: "none".into(),
            tone_defeat: false,
            ..PreampState::default()
        }
    }

    #[test]
    fn test_reference_headroom() {
        // level=-20, lu_offset=0, balance=0, drcs_offset=-6 -> 26 dB
        let state = base_state();
        assert_relative_eq!(headroom(&state, -6.0), 26.0);
    }

    #[test]
    fn test_level_walk() {
        let mut state = base_state();

        state.level += 5.0; // -15
        assert_relative_eq!(headroom(&state, -6.0), 21.0);
        assert!(validate(&state, -6.0).is_ok());

        state.level += 30.0; // +15 projected
        assert_relative_eq!(headroom(&state, -6.0), -9.0);
        let err = validate(&state, -6.0).unwrap_err();
        assert_eq!(err.to_string(), "no headroom");
    }

    #[test]
    fn test_positive_tones_eat_headroom() {
        let mut state = base_state();
        state.bass = 4.0;
        state.treble = 2.0;
        assert_relative_eq!(headroom(&state, 0.0), 14.0);

        // negative settings do not give headroom back
        state.bass = -4.0;
        state.treble = -2.0;
        assert_relative_eq!(headroom(&state, 0.0), 20.0);
    }

    #[test]
    fn test_tone_defeat_gates_tones() {
        let mut state = base_state();
        state.bass = 6.0;
        state.treble = 6.0;
        state.tone_defeat = true;
        assert_relative_eq!(headroom(&state, 0.0), 20.0);
    }

    #[test]
    fn test_balance_costs_half() {
        let mut state = base_state();
        state.balance = 4.0;
        assert_relative_eq!(headroom(&state, 0.0), 18.0);
        state.balance = -4.0;
        assert_relative_eq!(headroom(&state, 0.0), 18.0);
    }

    #[test_case("none", 0.0)]
    #[test_case("+0.0-0.0", 0.0)]
    #[test_case("+3.0-1.0", 3.0)]
    #[test_case("+6.5-2.0", 6.5)]
    #[test_case("-3.0+0.0", -3.0)]
    fn test_target_gain(id: &str, expected: f32) {
        assert_relative_eq!(target_gain(id), expected);
    }

    #[test]
    fn test_target_boost_counts_cut_does_not() {
        let mut state = base_state();
        state.target = "+3.0-1.0".into();
        assert_relative_eq!(headroom(&state, 0.0), 17.0);

        state.target = "-3.0+0.0".into();
        assert_relative_eq!(headroom(&state, 0.0), 20.0);
    }

    #[test_case(20.0, 6.0, 6.0, true; "clamp_high")]
    #[test_case(-20.0, 6.0, -6.0, true; "clamp_low")]
    #[test_case(4.0, 6.0, 4.0, false; "within_high")]
    #[test_case(-6.0, 6.0, -6.0, false; "within_low")]
    fn test_clamp_tone(db: f32, span: f32, expected: f32, clamped: bool) {
        let result = clamp_tone(db, span);
        assert_relative_eq!(result.value, expected);
        assert_eq!(result.clamped, clamped);
    }

    #[test]
    fn test_result_is_rounded() {
        let mut state = base_state();
        state.level = -20.04;
        assert_relative_eq!(headroom(&state, 0.0), 20.0);
    }
}
