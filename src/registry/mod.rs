//! npm audit API integration for the classic pipeline.
//!
//! [`payload`] reshapes the audit request extracted from yarn's verbose
//! output into the submission the endpoint expects; [`npm`] submits it and
//! normalizes the advisory response.

pub mod npm;
pub mod payload;
