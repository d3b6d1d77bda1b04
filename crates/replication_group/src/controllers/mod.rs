pub mod replication_group;
pub mod replication_group_controller;
