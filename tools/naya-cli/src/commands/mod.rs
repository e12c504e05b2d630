pub mod delete;
pub mod export;
pub mod info;
pub mod list;
pub mod record;
pub mod stats;
pub mod update;
