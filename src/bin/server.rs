//! Relay server binary.
//! Run with: cargo run --bin giftgpt-relay

use std::process::ExitCode;

use giftgpt_relay::start_relay;

fn main() -> ExitCode {
    start_relay::run()
}
