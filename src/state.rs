use std::fmt;

/// Phases a scenario script moves through. Which BDD keyword may legally
/// follow another is entirely determined by `TRANSITION_TABLE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Global,
    Scenario,
    Given,
    When,
    Then,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            State::Global => "GLOBAL",
            State::Scenario => "SCENARIO",
            State::Given => "GIVEN",
            State::When => "WHEN",
            State::Then => "THEN",
        };
        write!(f, "{}", name)
    }
}

/// The single source of truth for permitted transitions. Both the parser's
/// and the interpreter's `ProgramState` read this table, so the two
/// instances cannot drift.
pub const TRANSITION_TABLE: &[(State, State)] = &[
    (State::Global, State::Scenario),
    (State::Global, State::Given),
    (State::Scenario, State::Given),
    (State::Scenario, State::When),
    (State::Given, State::When),
    (State::Given, State::Then),
    (State::Given, State::Scenario),
    (State::When, State::Then),
    (State::Then, State::Global),
    (State::Then, State::Scenario),
    (State::Then, State::When),
];

/// Rejected transition, reported with both endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: State,
    pub to: State,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "invalid state transition from {} to {}",
            self.from, self.to
        )
    }
}

#[derive(Debug, Clone)]
pub struct ProgramState {
    current: State,
}

impl ProgramState {
    pub fn new() -> Self {
        Self {
            current: State::Global,
        }
    }

    /// Starts mid-scenario. The REPL uses this to hand a fresh parser the
    /// state the interpreter is already in.
    pub fn resume(current: State) -> Self {
        Self { current }
    }

    /// Moves to `to` if the table permits it, leaving the current state
    /// unchanged otherwise. A self-transition is a no-op success: repeated
    /// `Given` lines (and block entry into the state already in force) must
    /// not fault.
    pub fn transition(&mut self, to: State) -> Result<State, InvalidTransition> {
        if self.current == to {
            return Ok(self.current);
        }
        if TRANSITION_TABLE.contains(&(self.current, to)) {
            self.current = to;
            Ok(self.current)
        } else {
            Err(InvalidTransition {
                from: self.current,
                to,
            })
        }
    }

    pub fn current(&self) -> State {
        self.current
    }

    pub fn is(&self, state: State) -> bool {
        self.current == state
    }
}

impl Default for ProgramState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_global() {
        let state = ProgramState::new();
        assert!(state.is(State::Global));
    }

    #[test]
    fn walks_a_full_scenario() {
        let mut state = ProgramState::new();
        for target in [State::Scenario, State::Given, State::When, State::Then] {
            assert_eq!(state.transition(target), Ok(target));
        }
        assert_eq!(state.transition(State::Global), Ok(State::Global));
    }

    #[test]
    fn rejects_when_from_global() {
        let mut state = ProgramState::new();
        let err = state.transition(State::When).unwrap_err();
        assert_eq!(
            err,
            InvalidTransition {
                from: State::Global,
                to: State::When
            }
        );
        // Rejection leaves the state untouched.
        assert!(state.is(State::Global));
    }

    #[test]
    fn self_transition_is_a_no_op() {
        let mut state = ProgramState::new();
        state.transition(State::Given).unwrap();
        assert_eq!(state.transition(State::Given), Ok(State::Given));
    }

    #[test]
    fn table_has_no_duplicates() {
        for (i, pair) in TRANSITION_TABLE.iter().enumerate() {
            assert!(!TRANSITION_TABLE[i + 1..].contains(pair));
        }
    }
}
