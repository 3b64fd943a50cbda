pub mod assignment;
pub mod mission;
pub mod pricing;
pub mod queue;
pub mod route;
pub mod scoring;
pub mod simulation;
