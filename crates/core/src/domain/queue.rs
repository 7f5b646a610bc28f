// Queue Domain Model

use super::error::{DomainError, Result};

/// Queue identifier
pub type QueueId = String;

/// Reject empty or whitespace-only queue names
pub fn validate_queue_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(DomainError::EmptyName("queue name"));
    }
    Ok(())
}

/// Physical name of shard `index` of a logical queue (`name` + index)
pub fn shard_name(name: &str, index: usize) -> QueueId {
    format!("{name}{index}")
}

/// Physical queue names consumed for `name` split into `shard_count` shards
///
/// Zero shards means the unsharded queue itself.
pub fn shard_names(name: &str, shard_count: usize) -> Vec<QueueId> {
    if shard_count == 0 {
        return vec![name.to_string()];
    }
    (0..shard_count).map(|i| shard_name(name, i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_queue_name() {
        assert!(validate_queue_name("companies").is_ok());
        assert_eq!(
            validate_queue_name("  "),
            Err(DomainError::EmptyName("queue name"))
        );
    }

    #[test]
    fn test_shard_names() {
        assert_eq!(shard_names("work", 0), vec!["work"]);
        assert_eq!(shard_names("work", 3), vec!["work0", "work1", "work2"]);
    }
}
