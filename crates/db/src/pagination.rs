use serde::Deserialize;

use crate::types::DbId;

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 50;

#[derive(Deserialize)]
pub struct PaginationQuery {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

/// Cursor pagination over KSUID primary keys. KSUIDs sort by creation time,
/// so paging on `id` walks the feed newest-first without a separate
/// timestamp column in the cursor.
pub struct Pagination {
    pub limit: i64,
    pub cursor: Option<DbId>,
}

impl From<PaginationQuery> for Pagination {
    fn from(query: PaginationQuery) -> Self {
        let limit = match query.limit {
            None => DEFAULT_LIMIT,
            Some(limit) if limit < 1 => DEFAULT_LIMIT,
            Some(limit) if limit <= MAX_LIMIT => limit,
            _ => MAX_LIMIT,
        };

        Pagination {
            limit,
            cursor: query.cursor.map(DbId::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Pagination, PaginationQuery};

    #[test]
    fn limit_clamping() {
        let pagination: Pagination = PaginationQuery {
            limit: None,
            cursor: None,
        }
        .into();
        assert_eq!(pagination.limit, 20);

        let pagination: Pagination = PaginationQuery {
            limit: Some(10),
            cursor: None,
        }
        .into();
        assert_eq!(pagination.limit, 10);

        let pagination: Pagination = PaginationQuery {
            limit: Some(500),
            cursor: None,
        }
        .into();
        assert_eq!(pagination.limit, 50);

        let pagination: Pagination = PaginationQuery {
            limit: Some(0),
            cursor: None,
        }
        .into();
        assert_eq!(pagination.limit, 20);
    }

    #[test]
    fn cursor_passthrough() {
        let pagination: Pagination = PaginationQuery {
            limit: Some(5),
            cursor: Some(String::from("2PmoTJjCvmyabcdefghijklmnop")),
        }
        .into();
        assert_eq!(
            pagination.cursor.map(|id| id.to_string()),
            Some(String::from("2PmoTJjCvmyabcdefghijklmnop"))
        );
    }
}
