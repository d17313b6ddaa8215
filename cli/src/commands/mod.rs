pub mod backup;
pub mod cat;
pub mod catalog;
pub mod pull;
pub mod snapshots;
