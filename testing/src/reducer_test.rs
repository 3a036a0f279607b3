//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing reducers with readable Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use turnstile_core::{effect::Effect, reducer::Reducer};

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for effect assertion functions
type EffectAssertion<A> = Box<dyn FnOnce(&[Effect<A>])>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// # Example
///
/// ```ignore
/// use turnstile_testing::ReducerTest;
///
/// ReducerTest::new(ScanSessionReducer::new())
///     .with_env(test_environment())
///     .given_state(ScanSession::default())
///     .when_action(ScanAction::Start)
///     .then_state(|session| assert!(session.state.is_starting()))
///     .then_effects(|effects| assertions::assert_has_future_effect(effects))
///     .run();
/// ```
pub struct ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    reducer: R,
    environment: Option<E>,
    initial_state: Option<S>,
    actions: Vec<A>,
    state_assertions: Vec<StateAssertion<S>>,
    effect_assertions: Vec<EffectAssertion<A>>,
}

impl<R, S, A, E> ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            actions: Vec::new(),
            state_assertions: Vec::new(),
            effect_assertions: Vec::new(),
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: E) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Add an action to reduce (When)
    ///
    /// Actions run in the order they were added. Effect assertions see only
    /// the effects returned for the last action.
    #[must_use]
    pub fn when_action(mut self, action: A) -> Self {
        self.actions.push(action);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&S) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the resulting effects (Then)
    #[must_use]
    pub fn then_effects<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[Effect<A>]) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, action, or environment is not set,
    /// or if any assertions fail.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        assert!(
            !self.actions.is_empty(),
            "At least one action must be set with when_action()"
        );

        let env = self
            .environment
            .expect("Environment must be set with with_env()");

        let mut effects = Vec::new();
        for action in self.actions {
            effects = self.reducer.reduce(&mut state, action, &env).into_vec();
        }

        for assertion in self.state_assertions {
            assertion(&state);
        }

        for assertion in self.effect_assertions {
            assertion(&effects);
        }
    }
}

/// Helper assertions for effects
pub mod assertions {
    use std::time::Duration;
    use turnstile_core::effect::{Effect, EffectId};

    /// Flatten `Parallel` and `Cancellable` wrappers into a list of leaf effects
    fn leaves<A>(effects: &[Effect<A>]) -> Vec<&Effect<A>> {
        let mut out = Vec::new();
        for effect in effects {
            match effect {
                Effect::Parallel(inner) | Effect::Sequential(inner) => out.extend(leaves(inner)),
                Effect::Cancellable { effect, .. } => {
                    out.extend(leaves(std::slice::from_ref(effect.as_ref())));
                },
                other => out.push(other),
            }
        }
        out
    }

    /// Assert that there are no effects
    ///
    /// # Panics
    ///
    /// Panics if any effect other than `Effect::None` is present.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_effects<A: std::fmt::Debug>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().all(Effect::is_none),
            "Expected no effects, but found {}: {:?}",
            effects.len(),
            effects
        );
    }

    /// Assert the number of effects
    ///
    /// # Panics
    ///
    /// Panics if the number of effects doesn't match expected.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_effects_count<A>(effects: &[Effect<A>], expected: usize) {
        assert_eq!(
            effects.len(),
            expected,
            "Expected {} effects, but found {}",
            expected,
            effects.len()
        );
    }

    /// Assert that effects contain at least one Future effect
    ///
    /// # Panics
    ///
    /// Panics if no Future effect is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_future_effect<A>(effects: &[Effect<A>]) {
        assert!(
            leaves(effects).iter().any(|e| matches!(e, Effect::Future(_))),
            "Expected at least one Future effect, but none found"
        );
    }

    /// Assert that effects contain no Future effect
    ///
    /// # Panics
    ///
    /// Panics if a Future effect is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_future_effect<A>(effects: &[Effect<A>]) {
        assert!(
            !leaves(effects).iter().any(|e| matches!(e, Effect::Future(_))),
            "Expected no Future effect, but found one"
        );
    }

    /// Assert that effects contain at least one Stream effect
    ///
    /// # Panics
    ///
    /// Panics if no Stream effect is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_stream_effect<A>(effects: &[Effect<A>]) {
        assert!(
            leaves(effects).iter().any(|e| matches!(e, Effect::Stream(_))),
            "Expected at least one Stream effect, but none found"
        );
    }

    /// Assert that effects schedule a delayed action of exactly `duration`
    ///
    /// # Panics
    ///
    /// Panics if no matching Delay effect is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_delay<A>(effects: &[Effect<A>], duration: Duration) {
        assert!(
            leaves(effects)
                .iter()
                .any(|e| matches!(e, Effect::Delay { duration: d, .. } if *d == duration)),
            "Expected a Delay effect of {duration:?}, but none found"
        );
    }

    /// Assert that effects contain no Delay effect
    ///
    /// # Panics
    ///
    /// Panics if a Delay effect is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_delay<A>(effects: &[Effect<A>]) {
        assert!(
            !leaves(effects).iter().any(|e| matches!(e, Effect::Delay { .. })),
            "Expected no Delay effect, but found one"
        );
    }

    /// Assert that effects cancel the given id
    ///
    /// # Panics
    ///
    /// Panics if no `Effect::Cancel(id)` is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_cancels<A>(effects: &[Effect<A>], id: EffectId) {
        assert!(
            leaves(effects).iter().any(|e| matches!(e, Effect::Cancel(c) if *c == id)),
            "Expected Effect::Cancel({id}), but none found"
        );
    }

    /// Assert that effects start something cancellable under the given id
    ///
    /// # Panics
    ///
    /// Panics if no `Effect::Cancellable` with the id is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_runs_under<A>(effects: &[Effect<A>], id: EffectId) {
        assert!(
            effects.iter().any(|e| e.cancellation_id() == Some(id)),
            "Expected an effect cancellable under {id}, but none found"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use turnstile_core::effect::{Effect, EffectId};
    use turnstile_core::reducer::Reducer;
    use turnstile_core::{SmallVec, smallvec};

    const RESET: EffectId = EffectId::new("test.reset");

    #[derive(Clone, Debug)]
    struct TestState {
        count: i32,
    }

    #[derive(Clone, Debug)]
    enum TestAction {
        Increment,
        Decrement,
        ScheduleReset,
    }

    struct TestReducer;

    struct TestEnv;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = TestEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                TestAction::Increment => {
                    state.count += 1;
                    smallvec![Effect::None]
                },
                TestAction::Decrement => {
                    state.count -= 1;
                    smallvec![Effect::None]
                },
                TestAction::ScheduleReset => smallvec![
                    Effect::Cancel(RESET),
                    Effect::Delay {
                        duration: Duration::from_secs(1),
                        action: Box::new(TestAction::Decrement),
                    }
                    .cancellable(RESET)
                ],
            }
        }
    }

    #[test]
    fn test_reducer_test_increment() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Increment)
            .then_state(|state| {
                assert_eq!(state.count, 1);
            })
            .then_effects(|effects| {
                assertions::assert_no_effects(effects);
            })
            .run();
    }

    #[test]
    fn test_reducer_test_action_sequence() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 5 })
            .when_action(TestAction::Decrement)
            .when_action(TestAction::Decrement)
            .then_state(|state| {
                assert_eq!(state.count, 3);
            })
            .run();
    }

    #[test]
    fn test_cancellable_delay_assertions() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 0 })
            .when_action(TestAction::ScheduleReset)
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 2);
                assertions::assert_cancels(effects, RESET);
                assertions::assert_runs_under(effects, RESET);
                assertions::assert_has_delay(effects, Duration::from_secs(1));
                assertions::assert_no_future_effect(effects);
            })
            .run();
    }
}
