pub mod branches;
pub mod doctor;
pub mod export;
pub mod import;
pub mod reset;
pub mod search;
pub mod stats;
