//! # Turnstile Core
//!
//! Core traits and types for the Turnstile reducer architecture.
//!
//! Features are written as pure state machines. Everything that touches the
//! outside world (camera hardware, the network, timers) is described as an
//! [`Effect`](effect::Effect) value and executed by the runtime, which feeds
//! the resulting actions back into the reducer.
//!
//! ## Core Concepts
//!
//! - **State**: Domain state for a feature
//! - **Action**: All possible inputs to a reducer (operator commands, device events, I/O results)
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Side effect descriptions (not execution)
//! - **Environment**: Injected dependencies
//!
//! ## Example
//!
//! ```ignore
//! use turnstile_core::*;
//!
//! #[derive(Clone, Debug, Default)]
//! struct GateState {
//!     open: bool,
//! }
//!
//! #[derive(Clone, Debug)]
//! enum GateAction {
//!     Open,
//!     Close,
//! }
//!
//! impl Reducer for GateReducer {
//!     type State = GateState;
//!     type Action = GateAction;
//!     type Environment = GateEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut GateState,
//!         action: GateAction,
//!         env: &GateEnvironment,
//!     ) -> SmallVec<[Effect<GateAction>; 4]> {
//!         match action {
//!             GateAction::Open => {
//!                 state.open = true;
//!                 smallvec![Effect::Delay {
//!                     duration: Duration::from_secs(5),
//!                     action: Box::new(GateAction::Close),
//!                 }
//!                 .cancellable(EffectId::new("gate.auto_close"))]
//!             }
//!             GateAction::Close => {
//!                 state.open = false;
//!                 smallvec![Effect::Cancel(EffectId::new("gate.auto_close"))]
//!             }
//!         }
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`
///
/// They contain all business logic and are deterministic and testable.
pub mod reducer {
    use super::SmallVec;
    use super::effect::Effect;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action against the current state
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        ///
        /// Most transitions produce at most a handful of effects, so the
        /// return type keeps up to four inline before spilling to the heap.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values (not execution) and are composable and cancellable.
pub mod effect {
    use futures::Stream;
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Identifier for a group of in-flight effects that can be cancelled together.
    ///
    /// Ids are static strings so reducers can declare them as constants:
    ///
    /// ```
    /// use turnstile_core::effect::EffectId;
    ///
    /// const AUTO_CLOSE: EffectId = EffectId::new("gate.auto_close");
    /// assert_eq!(AUTO_CLOSE.as_str(), "gate.auto_close");
    /// ```
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct EffectId(&'static str);

    impl EffectId {
        /// Create a new effect id
        #[must_use]
        pub const fn new(id: &'static str) -> Self {
            Self(id)
        }

        /// The id as a string slice
        #[must_use]
        pub const fn as_str(&self) -> &'static str {
            self.0
        }
    }

    impl std::fmt::Display for EffectId {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.0)
        }
    }

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should happen,
    /// returned from reducers and executed by the Store runtime.
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Run effects sequentially
        Sequential(Vec<Effect<Action>>),

        /// Delayed action (debounce windows, auto-resume timers)
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after delay
            action: Box<Action>,
        },

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),

        /// Long-lived stream of actions
        ///
        /// Every item is fed back into the reducer until the stream ends or
        /// the effect is cancelled.
        Stream(Pin<Box<dyn Stream<Item = Action> + Send>>),

        /// Run the inner effect under a cancellation id
        ///
        /// Every task spawned for the inner effect is registered under `id`
        /// and aborted when an [`Effect::Cancel`] with the same id executes.
        Cancellable {
            /// Cancellation id
            id: EffectId,
            /// Effect to run
            effect: Box<Effect<Action>>,
        },

        /// Abort every in-flight effect registered under the id
        ///
        /// Cancelling an id with nothing in flight is a no-op.
        Cancel(EffectId),
    }

    // Manual Debug implementation since Future and Stream don't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
                Effect::Stream(_) => write!(f, "Effect::Stream(<stream>)"),
                Effect::Cancellable { id, effect } => f
                    .debug_struct("Effect::Cancellable")
                    .field("id", id)
                    .field("effect", effect)
                    .finish(),
                Effect::Cancel(id) => f.debug_tuple("Effect::Cancel").field(id).finish(),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }

        /// Mark this effect as cancellable under `id`
        #[must_use]
        pub fn cancellable(self, id: EffectId) -> Effect<Action> {
            Effect::Cancellable {
                id,
                effect: Box::new(self),
            }
        }

        /// The cancellation id this effect runs under, if any
        #[must_use]
        pub const fn cancellation_id(&self) -> Option<EffectId> {
            match self {
                Effect::Cancellable { id, .. } => Some(*id),
                _ => None,
            }
        }

        /// Returns `true` for the no-op effect
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Effect::None)
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::effect::{Effect, EffectId};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Ping {
        Ping,
    }

    const TIMER: EffectId = EffectId::new("test.timer");

    #[test]
    fn cancellable_wraps_effect_with_id() {
        let effect = Effect::Delay {
            duration: Duration::from_millis(10),
            action: Box::new(Ping::Ping),
        }
        .cancellable(TIMER);

        assert_eq!(effect.cancellation_id(), Some(TIMER));
        assert!(matches!(
            effect,
            Effect::Cancellable { effect, .. } if matches!(*effect, Effect::Delay { .. })
        ));
    }

    #[test]
    fn debug_output_names_variants() {
        let effect: Effect<Ping> = Effect::Cancel(TIMER);
        assert_eq!(format!("{effect:?}"), "Effect::Cancel(EffectId(\"test.timer\"))");

        let stream: Effect<Ping> = Effect::Stream(Box::pin(futures::stream::empty()));
        assert_eq!(format!("{stream:?}"), "Effect::Stream(<stream>)");
    }

    #[test]
    fn plain_effects_have_no_cancellation_id() {
        assert_eq!(Effect::<Ping>::None.cancellation_id(), None);
        assert!(Effect::<Ping>::None.is_none());
        assert_eq!(TIMER.to_string(), "test.timer");
    }
}
