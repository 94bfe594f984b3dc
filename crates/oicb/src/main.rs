//! `oicb` — a terminal client for the ICB (Internet CB) chat protocol.

mod bootstrap;
mod cli;
mod dial;
mod event_loop;
mod signals;
mod terminal;

fn main() {
    std::process::exit(bootstrap::run());
}
