pub mod achievements;
pub mod analytics;
pub mod backup;
pub mod core;
pub mod exchange;
pub mod marks;
pub mod planner;
pub mod profile;
pub mod setup;
pub mod study;
pub mod subjects;
pub mod tutors;
