#![doc = "course-seed-core: CSV-driven seeding pipelines for a remote learning platform."]

//! This crate holds the data models and pipelines of course-seed: reading input CSVs,
//! grouping rows by entity, driving each entity through its remote workflow, and
//! writing status reports. It knows the remote platform only through the traits in
//! [`contract`]; the HTTP client lives in the CLI crate.
//!
//! # Usage
//! Each phase module exposes a `run_*_phase` entry point taking a [`contract::ContentApi`]
//! implementation, an authenticated session and a parsed [`input::InputTable`].

pub mod codes;
pub mod contract;
pub mod enrolment;
pub mod grouping;
pub mod handoff;
pub mod input;
pub mod learner_profile;
pub mod outcome;
pub mod pipeline;
pub mod question;
pub mod quiz;
pub mod report;
