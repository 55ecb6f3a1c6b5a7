pub mod definition;
pub mod run;
pub mod state;
pub mod step;
