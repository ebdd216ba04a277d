pub mod action;
pub mod department;
pub mod policy;
pub mod student;
pub mod workflow;
