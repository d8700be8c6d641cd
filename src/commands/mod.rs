pub mod clean;
pub mod inspect;
pub mod list;
pub mod run;
pub mod set_baseline;
