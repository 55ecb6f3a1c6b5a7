pub mod alert;
pub mod communication;
pub mod deal;
pub mod employee;
pub mod profile;
pub mod requirement;
