//! Latest-value handoff between interrupt-side producers and the loop.

pub mod watch;
