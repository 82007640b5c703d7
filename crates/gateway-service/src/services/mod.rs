pub mod access_policy;
pub mod key_manager;
pub mod route_table;
