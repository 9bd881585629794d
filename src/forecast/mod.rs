//! Lightweight on-demand analytics derived from the history store.

mod weekly;

pub use weekly::*;
