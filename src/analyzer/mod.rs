//! Yarn audit analysis: protocol selection, subprocess output capture, and
//! the two pipeline implementations.
//!
//! Yarn's two major generations expose incompatible audit surfaces. The
//! classic CLI (v1) only *builds* the audit request — we extract it from the
//! verbose output and submit it to the npm audit endpoint ourselves. The
//! berry CLI (v2+) performs the audit itself and emits newline-delimited
//! JSON we flatten directly.

pub mod berry;
pub mod classic;
pub mod process;
pub mod yarn;

/// Major version of the yarn classic CLI; anything newer speaks berry.
pub const YARN_CLASSIC_MAJOR_VERSION: u64 = 1;

/// The audit command surface selected by the detected yarn major version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditProtocol {
    Classic,
    Berry,
}

impl AuditProtocol {
    pub fn for_major_version(major: u64) -> Self {
        if major > YARN_CLASSIC_MAJOR_VERSION {
            AuditProtocol::Berry
        } else {
            AuditProtocol::Classic
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_selection() {
        assert_eq!(AuditProtocol::for_major_version(0), AuditProtocol::Classic);
        assert_eq!(AuditProtocol::for_major_version(1), AuditProtocol::Classic);
        assert_eq!(AuditProtocol::for_major_version(2), AuditProtocol::Berry);
        assert_eq!(AuditProtocol::for_major_version(4), AuditProtocol::Berry);
    }
}
