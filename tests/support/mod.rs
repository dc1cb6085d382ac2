#![allow(dead_code, clippy::expect_used, clippy::unwrap_used, clippy::panic)]

pub mod cli_harness;
pub mod scenario_ports;
