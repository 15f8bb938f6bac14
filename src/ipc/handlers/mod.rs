pub mod activity;
pub mod backup;
pub mod core;
pub mod courses;
pub mod enrollments;
pub mod marks;
pub mod programs;
pub mod reports;
pub mod setup;
pub mod students;
