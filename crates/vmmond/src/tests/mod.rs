//! Test suites for the monitor.

pub(crate) mod support;
