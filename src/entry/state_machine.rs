// =============================================================================
// Entry Signal State Machine
// =============================================================================
//
// Turns per-bar raw entry conditions into at most one order signal per bar.
//
//   Idle ──(raw X on X-candle)──► Confirming X(1) ──► … ──► Confirming X(N)
//     ▲                                 │ failure                  │
//     └─────────────────────────────────┘                          ▼
//     ▲                                          spread gate? ──► SpreadHold X(n)
//     └──────────── submit X / window exhausted ◄──────────────────┘
//
// Rules:
//   - Confirmation is required when `confirmation_candles > 0`. The count
//     is checked on entry and on every increment, so N = 1 submits on the
//     first qualifying candle.
//   - A confirmation starts on the pattern trigger. It continues on a
//     matching candle while the trigger fires again or the setup persists
//     (price stays on the trade side).
//   - Raw long and short on the same bar cancel out.
//   - An opposing signal while confirming is a failure: back to Idle, and
//     the new direction may only start from Idle on a later bar.
//   - With a spread gate, the MA spread is checked on the bar that completes
//     confirmation, and a pass submits straight from Confirming without a
//     SpreadHold(0) bar. A miss waits in SpreadHold for up to `max_candles`
//     bars; `max_candles = 0` gives up at once.
//   - A bar index at or before the last evaluated one is a no-op.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SpreadGateConfig;
use crate::types::{Direction, Signal};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalState {
    #[default]
    Idle,
    ConfirmingLong(u32),
    ConfirmingShort(u32),
    SpreadHoldLong(u32),
    SpreadHoldShort(u32),
}

impl SignalState {
    fn confirming(direction: Direction, n: u32) -> Self {
        match direction {
            Direction::Long => Self::ConfirmingLong(n),
            Direction::Short => Self::ConfirmingShort(n),
        }
    }

    fn spread_hold(direction: Direction, n: u32) -> Self {
        match direction {
            Direction::Long => Self::SpreadHoldLong(n),
            Direction::Short => Self::SpreadHoldShort(n),
        }
    }

    /// Direction of the active state, `None` when idle.
    pub fn direction(self) -> Option<Direction> {
        match self {
            Self::Idle => None,
            Self::ConfirmingLong(_) | Self::SpreadHoldLong(_) => Some(Direction::Long),
            Self::ConfirmingShort(_) | Self::SpreadHoldShort(_) => Some(Direction::Short),
        }
    }

    pub fn is_idle(self) -> bool {
        self == Self::Idle
    }
}

impl std::fmt::Display for SignalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::ConfirmingLong(n) => write!(f, "ConfirmingLong({n})"),
            Self::ConfirmingShort(n) => write!(f, "ConfirmingShort({n})"),
            Self::SpreadHoldLong(n) => write!(f, "SpreadHoldLong({n})"),
            Self::SpreadHoldShort(n) => write!(f, "SpreadHoldShort({n})"),
        }
    }
}

/// What the machine sees on one bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepInputs {
    /// Pattern and filters hold for a long entry.
    pub long: bool,
    /// Pattern and filters hold for a short entry.
    pub short: bool,
    /// Long trigger or long setup still intact, with filters passing.
    pub long_hold: bool,
    pub short_hold: bool,
    pub bullish: bool,
    pub bearish: bool,
    /// MA spread clears the gate in the long direction.
    pub spread_ok_long: bool,
    pub spread_ok_short: bool,
}

impl StepInputs {
    fn raw_direction(&self) -> Option<Direction> {
        match (self.long, self.short) {
            (true, false) => Some(Direction::Long),
            (false, true) => Some(Direction::Short),
            _ => None,
        }
    }

    fn triggered(&self, direction: Direction) -> bool {
        match direction {
            Direction::Long => self.long,
            Direction::Short => self.short,
        }
    }

    fn continues(&self, direction: Direction) -> bool {
        let holding = match direction {
            Direction::Long => self.long_hold,
            Direction::Short => self.short_hold,
        };
        holding && !self.triggered(direction.opposite()) && self.candle_matches(direction)
    }

    fn candle_matches(&self, direction: Direction) -> bool {
        match direction {
            Direction::Long => self.bullish,
            Direction::Short => self.bearish,
        }
    }

    fn spread_ok(&self, direction: Direction) -> bool {
        match direction {
            Direction::Long => self.spread_ok_long,
            Direction::Short => self.spread_ok_short,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EntryStateMachine {
    confirmation_candles: u32,
    spread_gate: Option<SpreadGateConfig>,
    state: SignalState,
    last_evaluated: Option<u64>,
    last_submission: Option<u64>,
}

impl EntryStateMachine {
    pub fn new(confirmation_candles: u32, spread_gate: Option<SpreadGateConfig>) -> Self {
        Self {
            confirmation_candles,
            spread_gate,
            state: SignalState::Idle,
            last_evaluated: None,
            last_submission: None,
        }
    }

    pub fn state(&self) -> SignalState {
        self.state
    }

    /// Bar index of the most recent submission.
    pub fn last_submission(&self) -> Option<u64> {
        self.last_submission
    }

    /// Drop any in-progress confirmation.
    pub fn reset(&mut self) {
        self.state = SignalState::Idle;
    }

    /// Advance one bar. Returns the order signal for `index`, if any.
    pub fn step(&mut self, index: u64, inputs: &StepInputs) -> Signal {
        if self.last_evaluated.is_some_and(|last| index <= last) {
            return Signal::None;
        }
        self.last_evaluated = Some(index);

        let (next, signal) = match self.state {
            SignalState::Idle => self.from_idle(inputs),
            SignalState::ConfirmingLong(n) => self.from_confirming(Direction::Long, n, inputs),
            SignalState::ConfirmingShort(n) => self.from_confirming(Direction::Short, n, inputs),
            SignalState::SpreadHoldLong(n) => self.from_spread_hold(Direction::Long, n, inputs),
            SignalState::SpreadHoldShort(n) => self.from_spread_hold(Direction::Short, n, inputs),
        };

        if next != self.state {
            debug!(index, from = %self.state, to = %next, "entry state transition");
        }
        self.state = next;

        if signal.is_submit() {
            self.last_submission = Some(index);
        }
        signal
    }

    fn from_idle(&self, inputs: &StepInputs) -> (SignalState, Signal) {
        let Some(direction) = inputs.raw_direction() else {
            return (SignalState::Idle, Signal::None);
        };

        if self.confirmation_candles == 0 {
            return self.confirmed(direction, inputs);
        }

        if inputs.candle_matches(direction) {
            self.count(direction, 1, inputs)
        } else {
            (SignalState::Idle, Signal::None)
        }
    }

    fn from_confirming(
        &self,
        direction: Direction,
        n: u32,
        inputs: &StepInputs,
    ) -> (SignalState, Signal) {
        if inputs.continues(direction) {
            self.count(direction, n.saturating_add(1), inputs)
        } else {
            (SignalState::Idle, Signal::None)
        }
    }

    fn count(&self, direction: Direction, n: u32, inputs: &StepInputs) -> (SignalState, Signal) {
        if n >= self.confirmation_candles {
            self.confirmed(direction, inputs)
        } else {
            (SignalState::confirming(direction, n), Signal::None)
        }
    }

    fn confirmed(&self, direction: Direction, inputs: &StepInputs) -> (SignalState, Signal) {
        match &self.spread_gate {
            None => (SignalState::Idle, Signal::submit(direction)),
            Some(_) if inputs.spread_ok(direction) => (SignalState::Idle, Signal::submit(direction)),
            Some(gate) if gate.max_candles == 0 => (SignalState::Idle, Signal::None),
            Some(_) => (SignalState::spread_hold(direction, 0), Signal::None),
        }
    }

    fn from_spread_hold(
        &self,
        direction: Direction,
        n: u32,
        inputs: &StepInputs,
    ) -> (SignalState, Signal) {
        if inputs.spread_ok(direction) {
            return (SignalState::Idle, Signal::submit(direction));
        }
        let waited = n.saturating_add(1);
        let max = self.spread_gate.map_or(0, |g| g.max_candles);
        if waited >= max {
            debug!(%direction, waited, "spread gate window exhausted");
            (SignalState::Idle, Signal::None)
        } else {
            (SignalState::spread_hold(direction, waited), Signal::None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn long_bull() -> StepInputs {
        StepInputs {
            long: true,
            long_hold: true,
            bullish: true,
            ..StepInputs::default()
        }
    }

    fn short_bear() -> StepInputs {
        StepInputs {
            short: true,
            short_hold: true,
            bearish: true,
            ..StepInputs::default()
        }
    }

    fn gate(max_candles: u32) -> Option<SpreadGateConfig> {
        Some(SpreadGateConfig {
            min_spread_pct: 0.05,
            max_candles,
        })
    }

    #[test]
    fn crossover_two_confirmations_submits_on_second_bar() {
        let mut sm = EntryStateMachine::new(2, None);
        assert_eq!(sm.step(1, &long_bull()), Signal::None);
        assert_eq!(sm.state(), SignalState::ConfirmingLong(1));
        assert_eq!(sm.step(2, &long_bull()), Signal::SubmitLong);
        assert_eq!(sm.state(), SignalState::Idle);
        assert_eq!(sm.last_submission(), Some(2));
    }

    #[test]
    fn failed_confirmation_resets() {
        let mut sm = EntryStateMachine::new(2, None);
        sm.step(1, &long_bull());
        assert_eq!(sm.step(2, &StepInputs::default()), Signal::None);
        assert_eq!(sm.state(), SignalState::Idle);
    }

    #[test]
    fn confirmation_continues_while_setup_persists() {
        let mut sm = EntryStateMachine::new(3, None);
        sm.step(1, &long_bull());
        let holding = StepInputs {
            long_hold: true,
            bullish: true,
            ..StepInputs::default()
        };
        assert_eq!(sm.step(2, &holding), Signal::None);
        assert_eq!(sm.state(), SignalState::ConfirmingLong(2));
        assert_eq!(sm.step(3, &holding), Signal::SubmitLong);
    }

    #[test]
    fn opposite_side_setup_does_not_break_confirmation() {
        let mut sm = EntryStateMachine::new(2, None);
        sm.step(1, &long_bull());
        // Long trigger fires again while price sits on the short side of MA1.
        let inputs = StepInputs {
            short_hold: true,
            ..long_bull()
        };
        assert_eq!(sm.step(2, &inputs), Signal::SubmitLong);
    }

    #[test]
    fn persistence_alone_does_not_start_confirmation() {
        let mut sm = EntryStateMachine::new(2, None);
        let holding = StepInputs {
            long_hold: true,
            bullish: true,
            ..StepInputs::default()
        };
        sm.step(1, &holding);
        assert!(sm.state().is_idle());
    }

    #[test]
    fn wrong_candle_colour_does_not_start_confirmation() {
        let mut sm = EntryStateMachine::new(2, None);
        let inputs = StepInputs {
            long: true,
            bearish: true,
            ..StepInputs::default()
        };
        sm.step(1, &inputs);
        assert!(sm.state().is_idle());
    }

    #[test]
    fn no_confirmation_submits_immediately() {
        let mut sm = EntryStateMachine::new(0, None);
        // Candle colour is irrelevant without confirmation.
        let inputs = StepInputs {
            short: true,
            bullish: true,
            ..StepInputs::default()
        };
        assert_eq!(sm.step(1, &inputs), Signal::SubmitShort);
    }

    #[test]
    fn single_confirmation_submits_on_first_candle() {
        let mut sm = EntryStateMachine::new(1, None);
        assert_eq!(sm.step(1, &short_bear()), Signal::SubmitShort);
    }

    #[test]
    fn conflicting_raw_signals_are_dropped() {
        let mut sm = EntryStateMachine::new(0, None);
        let both = StepInputs {
            long: true,
            short: true,
            bullish: true,
            ..StepInputs::default()
        };
        assert_eq!(sm.step(1, &both), Signal::None);
    }

    #[test]
    fn opposing_signal_goes_through_idle() {
        let mut sm = EntryStateMachine::new(3, None);
        sm.step(1, &long_bull());
        assert_eq!(sm.state(), SignalState::ConfirmingLong(1));
        sm.step(2, &short_bear());
        assert_eq!(sm.state(), SignalState::Idle);
        sm.step(3, &short_bear());
        assert_eq!(sm.state(), SignalState::ConfirmingShort(1));
    }

    #[test]
    fn same_bar_is_a_no_op() {
        let mut sm = EntryStateMachine::new(0, None);
        assert_eq!(sm.step(5, &long_bull()), Signal::SubmitLong);
        assert_eq!(sm.step(5, &long_bull()), Signal::None);
        assert_eq!(sm.step(4, &long_bull()), Signal::None);
        assert_eq!(sm.step(6, &long_bull()), Signal::SubmitLong);
    }

    #[test]
    fn spread_gate_passes_immediately() {
        let mut sm = EntryStateMachine::new(1, gate(3));
        let inputs = StepInputs {
            spread_ok_long: true,
            ..long_bull()
        };
        assert_eq!(sm.step(1, &inputs), Signal::SubmitLong);
    }

    #[test]
    fn spread_hold_waits_then_submits() {
        let mut sm = EntryStateMachine::new(1, gate(3));
        assert_eq!(sm.step(1, &long_bull()), Signal::None);
        assert_eq!(sm.state(), SignalState::SpreadHoldLong(0));
        assert_eq!(sm.step(2, &StepInputs::default()), Signal::None);
        assert_eq!(sm.state(), SignalState::SpreadHoldLong(1));
        let ok = StepInputs {
            spread_ok_long: true,
            ..StepInputs::default()
        };
        assert_eq!(sm.step(3, &ok), Signal::SubmitLong);
        assert!(sm.state().is_idle());
    }

    #[test]
    fn spread_hold_window_exhausts() {
        let mut sm = EntryStateMachine::new(1, gate(2));
        sm.step(1, &short_bear());
        assert_eq!(sm.state(), SignalState::SpreadHoldShort(0));
        sm.step(2, &StepInputs::default());
        assert_eq!(sm.state(), SignalState::SpreadHoldShort(1));
        assert_eq!(sm.step(3, &StepInputs::default()), Signal::None);
        assert!(sm.state().is_idle());
    }

    #[test]
    fn zero_hold_window_gives_up_at_once() {
        let mut sm = EntryStateMachine::new(1, gate(0));
        assert_eq!(sm.step(1, &long_bull()), Signal::None);
        assert!(sm.state().is_idle());
    }

    fn arb_inputs() -> impl Strategy<Value = StepInputs> {
        (
            (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()),
            (any::<bool>(), any::<bool>(), any::<bool>()),
        )
            .prop_map(|((long, short, long_hold, short_hold), (bullish, ok_long, ok_short))| {
                StepInputs {
                    long,
                    short,
                    long_hold,
                    short_hold,
                    bullish,
                    bearish: !bullish,
                    spread_ok_long: ok_long,
                    spread_ok_short: ok_short,
                }
            })
    }

    proptest! {
        #[test]
        fn at_most_one_submission_per_bar_and_no_direct_flip(
            confirmations in 0u32..4,
            hold in proptest::option::of(0u32..4),
            steps in proptest::collection::vec((0u64..3, arb_inputs()), 1..80),
        ) {
            let gate = hold.map(|max_candles| SpreadGateConfig { min_spread_pct: 0.05, max_candles });
            let mut sm = EntryStateMachine::new(confirmations, gate);
            let mut index = 0u64;
            let mut submitted = std::collections::HashSet::new();

            for (advance, inputs) in steps {
                // advance == 0 replays the same bar.
                index += advance;
                let before = sm.state();
                let signal = sm.step(index, &inputs);
                let after = sm.state();

                if signal.is_submit() {
                    prop_assert!(submitted.insert(index), "two submissions on bar {}", index);
                }

                let flipped = matches!(
                    (before, after),
                    (SignalState::ConfirmingLong(_), SignalState::ConfirmingShort(_))
                        | (SignalState::ConfirmingShort(_), SignalState::ConfirmingLong(_))
                        | (SignalState::SpreadHoldLong(_), SignalState::ConfirmingShort(_) | SignalState::SpreadHoldShort(_))
                        | (SignalState::SpreadHoldShort(_), SignalState::ConfirmingLong(_) | SignalState::SpreadHoldLong(_))
                );
                prop_assert!(!flipped, "{} -> {}", before, after);
            }
        }
    }
}
