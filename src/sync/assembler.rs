//! Assembles collected bucket snapshots into a backend aggregate.

use crate::metadata::model::{BackendAggregate, BackendIdentity, BucketSnapshot};

/// Build the aggregate for `identity`, keeping `buckets` in their given order.
pub fn assemble(identity: &BackendIdentity, buckets: Vec<BucketSnapshot>) -> BackendAggregate {
    BackendAggregate {
        id: identity.id.clone(),
        name: identity.name.clone(),
        backend_type: identity.backend_type.clone(),
        region: identity.region.clone(),
        tenant_id: identity.tenant_id.clone(),
        buckets,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> BackendIdentity {
        BackendIdentity {
            id: "backend-1".to_string(),
            name: "primary".to_string(),
            backend_type: "aws-s3".to_string(),
            region: "us-east-1".to_string(),
            tenant_id: "tenant-a".to_string(),
        }
    }

    fn bucket(name: &str) -> BucketSnapshot {
        BucketSnapshot {
            name: name.to_string(),
            region: "us-east-1".to_string(),
            creation_date: None,
            tags: None,
            object_count: 0,
            total_size: 0,
            objects: Vec::new(),
        }
    }

    #[test]
    fn test_assemble_copies_identity() {
        let aggregate = assemble(&identity(), vec![bucket("b1"), bucket("b2")]);
        assert_eq!(aggregate.id, "backend-1");
        assert_eq!(aggregate.name, "primary");
        assert_eq!(aggregate.backend_type, "aws-s3");
        assert_eq!(aggregate.region, "us-east-1");
        assert_eq!(aggregate.tenant_id, "tenant-a");
        let names: Vec<_> = aggregate.buckets.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["b1", "b2"]);
    }

    #[test]
    fn test_assemble_no_buckets() {
        let aggregate = assemble(&identity(), Vec::new());
        assert!(aggregate.buckets.is_empty());
    }
}
