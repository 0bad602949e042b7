//! Query description for entity collections

use chrono::{DateTime, Utc};

/// Indexed column to order results by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OrderBy {
    /// The entity's name sort key (e.g. last name for contacts)
    #[default]
    Name,
    CreatedAt,
    UpdatedAt,
}

impl OrderBy {
    pub(crate) const fn column(self) -> &'static str {
        match self {
            Self::Name => "sort_key",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }
}

/// Filters and ordering over indexed columns.
///
/// Queries are hashable so live views can share one watch per distinct query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Query {
    pub owner_id: Option<String>,
    /// Case-insensitive prefix of the name sort key
    pub name_prefix: Option<String>,
    /// Only records updated at or after this instant
    pub updated_since: Option<DateTime<Utc>>,
    pub order_by: OrderBy,
    pub descending: bool,
    pub limit: Option<usize>,
}

impl Query {
    /// Every record, ordered by name
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn owned_by(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    #[must_use]
    pub fn name_starts_with(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub const fn updated_since(mut self, since: DateTime<Utc>) -> Self {
        self.updated_since = Some(since);
        self
    }

    #[must_use]
    pub const fn order_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = order_by;
        self
    }

    #[must_use]
    pub const fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Escape `LIKE` wildcards so user input matches literally
pub(crate) fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_like_escapes_wildcards() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn builder_sets_fields() {
        let query = Query::all()
            .owned_by("u1")
            .order_by(OrderBy::UpdatedAt)
            .descending()
            .limit(5);

        assert_eq!(query.owner_id.as_deref(), Some("u1"));
        assert_eq!(query.order_by, OrderBy::UpdatedAt);
        assert!(query.descending);
        assert_eq!(query.limit, Some(5));
    }
}
