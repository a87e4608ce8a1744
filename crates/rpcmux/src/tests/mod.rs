//! Behavioural suites for the engine.
