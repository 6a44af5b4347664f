pub mod callback;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod process;
pub mod projects;
pub mod quota;
pub mod regenerate;
