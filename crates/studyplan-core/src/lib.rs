//! `studyplan-core`: configuration and shared error types for the study
//! planner workspace.

pub mod config;
pub mod error;

pub use config::{DatabaseConfig, PlannerConfig, StudyplanConfig, TieBreak};
pub use error::{Result, StudyplanError};
