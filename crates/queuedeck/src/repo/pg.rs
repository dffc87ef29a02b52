use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::{GroupDescriptor, QueueDescriptor};
use crate::error::Result;
use crate::repo::DescriptorRepository;

#[derive(Clone)]
pub struct PgDescriptorRepo {
    pool: PgPool,
}

impl PgDescriptorRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DescriptorRepository for PgDescriptorRepo {
    async fn find_queue(&self, id: &str) -> Result<Option<QueueDescriptor>> {
        let queue = sqlx::query_as::<_, QueueDescriptor>(
            r#"
            SELECT id, name, host, port, description, compliance, group_id
            FROM queues
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(queue)
    }

    async fn find_queues_by_group(&self, group_id: &str) -> Result<Vec<QueueDescriptor>> {
        let queues = sqlx::query_as::<_, QueueDescriptor>(
            r#"
            SELECT id, name, host, port, description, compliance, group_id
            FROM queues
            WHERE group_id = $1 AND deleted_at IS NULL
            ORDER BY id ASC
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(queues)
    }

    async fn find_group(&self, id: &str) -> Result<Option<GroupDescriptor>> {
        let group = sqlx::query_as::<_, GroupDescriptor>(
            r#"
            SELECT id, name, description
            FROM groups
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(group)
    }

    async fn list_groups(&self) -> Result<Vec<GroupDescriptor>> {
        let groups = sqlx::query_as::<_, GroupDescriptor>(
            r#"
            SELECT id, name, description
            FROM groups
            WHERE deleted_at IS NULL
            ORDER BY name ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(groups)
    }
}
