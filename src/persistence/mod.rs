pub mod log_entry;
pub mod medium;
pub mod orphans;
pub mod store;
