pub mod api;
pub mod controllers;
pub mod elasticache;
pub mod util;

#[cfg(test)]
pub mod fixtures;
