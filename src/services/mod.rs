pub mod ledger;
pub mod models;
pub mod queue;
pub mod storage;
