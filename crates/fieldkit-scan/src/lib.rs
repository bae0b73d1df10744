//! fieldkit-scan: Bounded-concurrency IPv4 subnet host scanner.
//!
//! Expands a CIDR block into its usable hosts, pings each one under a
//! caller-supplied concurrency cap, and returns the results ordered by
//! address.

pub mod addr;
pub mod config;
pub mod detect;
pub mod error;
pub mod probe;
pub mod range;
pub mod scanner;
