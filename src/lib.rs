//! Turns a live chat into a timed, numbered vote.
//!
//! [`poller::ChatPoller`] pulls chat pages with a continuation cursor,
//! [`session::VoteSession`] filters them through a [`window::VoteWindow`],
//! parses votes with [`resolver::OptionResolver`] and counts them in a
//! [`tally::Tally`].

pub mod chat;
pub mod config;
pub mod listeners;
pub mod logging;
pub mod poller;
pub mod resolver;
pub mod session;
pub mod tally;
pub mod ui;
pub mod window;
