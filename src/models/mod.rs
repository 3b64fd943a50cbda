pub mod assignment;
pub mod event;
pub mod mission;
pub mod order;
pub mod tracking;
pub mod vehicle;
