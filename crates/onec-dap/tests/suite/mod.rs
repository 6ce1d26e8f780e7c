// Consolidated integration test suite, compiled into the single `tests`
// binary declared in `tests/tests.rs`.
mod breakpoints;
mod evaluate;
mod poller;
mod stepping;
mod targets;
