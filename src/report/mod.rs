//! Report renderers for audit scan results.
//!
//! - [`terminal`] — colored, tabular output with summary box; respects
//!   `--verbose` / `--quiet`.

pub mod terminal;
