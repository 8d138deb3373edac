//! The harness shared by the kernel regression test binaries: driver group
//! and CLI, checkpoint rendezvous, forked-child management, block-device and
//! filesystem provisioning, and result reporting.
//!
//! The harness is deliberately thin. Every test binary assembles a
//! [`group::TestGroup`], registers its scenario functions and calls
//! `execute_from_args`; everything else here exists to serve those
//! scenarios.

pub mod checkpoint;
pub mod child;
pub mod cli;
pub mod device;
pub mod env;
pub mod error;
pub mod group;
pub mod logger;
pub mod report;
