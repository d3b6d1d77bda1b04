use crate::api::v1::replicationgroup::ReplicationGroupSpec;
use crate::api::v1::AzMode;
use crate::util::errors::{Result, StdError};

const MAX_ID_LENGTH: usize = 20;
const MAX_SNAPSHOT_RETENTION_DAYS: i32 = 35;

/// ElastiCache stores identifiers in lowercase.
pub fn normalize_group_id(id: &str) -> String {
    id.to_lowercase()
}

/// Returns every rule the normalised identifier breaks.
pub fn validate_group_id(id: &str) -> Vec<String> {
    let id = normalize_group_id(id);
    let mut reasons = Vec::new();

    if id.is_empty() || id.len() > MAX_ID_LENGTH {
        reasons.push(format!("must contain from 1 to {MAX_ID_LENGTH} characters"));
    }
    if !id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        reasons.push("only lowercase alphanumeric characters and hyphens allowed".to_string());
    }
    if !id.chars().next().is_some_and(|c| c.is_ascii_lowercase()) {
        reasons.push("first character must be a letter".to_string());
    }
    if id.contains("--") {
        reasons.push("cannot contain two consecutive hyphens".to_string());
    }
    if id.ends_with('-') {
        reasons.push("cannot end with a hyphen".to_string());
    }
    reasons
}

pub fn validate_spec(spec: &ReplicationGroupSpec) -> Result<()> {
    let mut reasons = validate_group_id(&spec.replication_group_id);

    if spec.num_cache_clusters < 1 {
        reasons.push("num_cache_clusters must be at least 1".to_string());
    }
    if !(1..=65535).contains(&spec.port) {
        reasons.push(format!("port {} is out of range", spec.port));
    }
    if let Some(limit) = spec.snapshot_retention_limit {
        if !(0..=MAX_SNAPSHOT_RETENTION_DAYS).contains(&limit) {
            reasons.push(format!(
                "snapshot_retention_limit cannot be more than {MAX_SNAPSHOT_RETENTION_DAYS} days"
            ));
        }
    }
    if spec.automatic_failover.is_some_and(|f| f.is_enabled()) && spec.num_cache_clusters < 2 {
        reasons.push("automatic failover requires at least 2 cache clusters".to_string());
    }
    if spec.az_mode == Some(AzMode::SingleAz) {
        if let Some(first) = spec.availability_zones.first() {
            if spec.availability_zones.iter().any(|az| az != first) {
                reasons.push("single-az mode requires every availability zone to be the same".to_string());
            }
        }
    }

    if reasons.is_empty() {
        return Ok(());
    }
    Err(StdError::ValidationError {
        id: spec.replication_group_id.clone(),
        reason: reasons.join("; "),
    }
    .into())
}
