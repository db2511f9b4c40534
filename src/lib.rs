//! certrun: End-to-End Certificate Issuance Verification
//!
//! Builds and publishes the issuer image, deploys it into a run-scoped namespace,
//! wires up DNS, waits for the service and its issuing job, checks the stored
//! registration and certificate, and always tears the run down again.

pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod exec;
pub mod gateway;
pub mod harness;
pub mod inspect;
pub mod logging;
pub mod manifest;
pub mod poll;
pub mod report;
pub mod sequencer;
pub mod signal;
pub mod stages;
pub mod teardown;
