//! Visibility-scoped query builders
//!
//! Every listing of pins or boards goes through [`PinQuery`] or
//! [`BoardQuery`]. Secondary filters are AND-ed together first, then the
//! visibility predicate is appended:
//!
//! ```text
//! <filter> AND <filter> ... AND (owner = viewer OR NOT is_private)
//! ```
//!
//! An anonymous viewer only gets `NOT is_private`. Pin rows also carry an
//! `is_saved` column computed with an `EXISTS` sub-select, and category
//! filters are `EXISTS` sub-selects too, so a pin never appears twice.

use chrono::NaiveDate;
use sqlx::{QueryBuilder, Sqlite};

/// Default cap for search result pages
pub const SEARCH_LIMIT: i64 = 20;

/// Secondary filters for pin listings.
#[derive(Debug, Clone, PartialEq)]
pub enum PinFilter {
    /// Pin has a category with exactly this (normalized) name
    CategoryName(String),
    /// Pin has at least one of these categories
    CategoryIn(Vec<i64>),
    /// Pin belongs to this user
    Owner(i64),
    /// Pin was created on this UTC date
    CreatedOn(NaiveDate),
    /// Pin is on the given board
    OnBoard(i64),
    /// Pin was saved by this user
    SavedBy(i64),
    /// Pins by the user, by anyone they follow, or in their interests
    HomeFeed(i64),
    /// Leave this pin out
    Exclude(i64),
}

/// Builder for a visibility-scoped pin listing.
#[derive(Debug, Clone, Default)]
pub struct PinQuery {
    viewer: Option<i64>,
    filters: Vec<PinFilter>,
    limit: Option<i64>,
}

impl PinQuery {
    /// Listing as seen by `viewer` (`None` for anonymous visitors)
    pub fn new(viewer: Option<i64>) -> Self {
        Self {
            viewer,
            filters: Vec::new(),
            limit: None,
        }
    }

    pub fn filter(mut self, filter: PinFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn viewer(&self) -> Option<i64> {
        self.viewer
    }

    /// Build the SELECT statement.
    pub fn build(&self) -> QueryBuilder<'static, Sqlite> {
        let mut qb = QueryBuilder::new(
            "SELECT p.id, p.user_id, p.title, p.about, p.alter_text, p.destination_link, \
             p.pin_file, p.status, p.is_idea, p.is_private, p.created_at, p.updated_at, \
             u.username AS username, ",
        );

        match self.viewer {
            Some(viewer) => {
                qb.push("EXISTS (SELECT 1 FROM saved_pins sp WHERE sp.pin_id = p.id AND sp.user_id = ");
                qb.push_bind(viewer);
                qb.push(") AS is_saved");
            }
            None => {
                qb.push("0 AS is_saved");
            }
        }

        qb.push(" FROM pins p JOIN users u ON u.id = p.user_id WHERE 1 = 1");

        for filter in &self.filters {
            qb.push(" AND ");
            push_pin_filter(&mut qb, filter);
        }

        qb.push(" AND ");
        push_visibility(&mut qb, "p", self.viewer);

        qb.push(" ORDER BY p.created_at DESC, p.id DESC");

        if let Some(limit) = self.limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit);
        }

        qb
    }
}

fn push_pin_filter(qb: &mut QueryBuilder<'static, Sqlite>, filter: &PinFilter) {
    match filter {
        PinFilter::CategoryName(name) => {
            qb.push(
                "EXISTS (SELECT 1 FROM pin_categories pc JOIN categories c ON c.id = pc.category_id \
                 WHERE pc.pin_id = p.id AND c.name = ",
            );
            qb.push_bind(name.clone());
            qb.push(")");
        }
        PinFilter::CategoryIn(ids) => {
            if ids.is_empty() {
                qb.push("0");
                return;
            }
            qb.push("EXISTS (SELECT 1 FROM pin_categories pc WHERE pc.pin_id = p.id AND pc.category_id IN (");
            let mut separated = qb.separated(", ");
            for id in ids {
                separated.push_bind(*id);
            }
            separated.push_unseparated("))");
        }
        PinFilter::Owner(user_id) => {
            qb.push("p.user_id = ");
            qb.push_bind(*user_id);
        }
        PinFilter::CreatedOn(date) => {
            qb.push("date(p.created_at) = ");
            qb.push_bind(date.format("%Y-%m-%d").to_string());
        }
        PinFilter::OnBoard(board_id) => {
            qb.push("EXISTS (SELECT 1 FROM board_pins bp WHERE bp.pin_id = p.id AND bp.board_id = ");
            qb.push_bind(*board_id);
            qb.push(")");
        }
        PinFilter::SavedBy(user_id) => {
            qb.push("EXISTS (SELECT 1 FROM saved_pins sb WHERE sb.pin_id = p.id AND sb.user_id = ");
            qb.push_bind(*user_id);
            qb.push(")");
        }
        PinFilter::HomeFeed(user_id) => {
            qb.push("(p.user_id = ");
            qb.push_bind(*user_id);
            qb.push(" OR p.user_id IN (SELECT followed_id FROM user_follows WHERE follower_id = ");
            qb.push_bind(*user_id);
            qb.push(
                ") OR EXISTS (SELECT 1 FROM pin_categories pc JOIN user_interests ui \
                 ON ui.category_id = pc.category_id WHERE pc.pin_id = p.id AND ui.user_id = ",
            );
            qb.push_bind(*user_id);
            qb.push("))");
        }
        PinFilter::Exclude(pin_id) => {
            qb.push("p.id <> ");
            qb.push_bind(*pin_id);
        }
    }
}

/// `(alias.user_id = viewer OR alias.is_private = 0)`, or just the privacy
/// check for anonymous viewers.
fn push_visibility(qb: &mut QueryBuilder<'static, Sqlite>, alias: &str, viewer: Option<i64>) {
    match viewer {
        Some(viewer) => {
            qb.push(format!("({}.user_id = ", alias));
            qb.push_bind(viewer);
            qb.push(format!(" OR {}.is_private = 0)", alias));
        }
        None => {
            qb.push(format!("{}.is_private = 0", alias));
        }
    }
}

/// Secondary filters for board listings.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardFilter {
    /// A single board
    Id(i64),
    /// Board belongs to this user
    Owner(i64),
    /// Board contains this pin
    ContainsPin(i64),
}

/// Builder for a visibility-scoped board listing.
#[derive(Debug, Clone, Default)]
pub struct BoardQuery {
    viewer: Option<i64>,
    filters: Vec<BoardFilter>,
}

impl BoardQuery {
    pub fn new(viewer: Option<i64>) -> Self {
        Self {
            viewer,
            filters: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: BoardFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Build the SELECT statement, newest board first.
    pub fn build(&self) -> QueryBuilder<'static, Sqlite> {
        let mut qb = QueryBuilder::new(
            "SELECT b.id, b.user_id, b.name, b.is_private, b.created_at, b.updated_at, \
             u.username AS username, \
             (SELECT COUNT(*) FROM board_pins bp WHERE bp.board_id = b.id) AS pin_count, \
             (SELECT cp.pin_file FROM board_pins bp JOIN pins cp ON cp.id = bp.pin_id \
              WHERE bp.board_id = b.id ORDER BY bp.created_at DESC LIMIT 1) AS cover \
             FROM boards b JOIN users u ON u.id = b.user_id WHERE 1 = 1",
        );

        for filter in &self.filters {
            qb.push(" AND ");
            match filter {
                BoardFilter::Id(board_id) => {
                    qb.push("b.id = ");
                    qb.push_bind(*board_id);
                }
                BoardFilter::Owner(user_id) => {
                    qb.push("b.user_id = ");
                    qb.push_bind(*user_id);
                }
                BoardFilter::ContainsPin(pin_id) => {
                    qb.push("EXISTS (SELECT 1 FROM board_pins bp WHERE bp.board_id = b.id AND bp.pin_id = ");
                    qb.push_bind(*pin_id);
                    qb.push(")");
                }
            }
        }

        qb.push(" AND ");
        push_visibility(&mut qb, "b", self.viewer);

        qb.push(" ORDER BY b.created_at DESC, b.id DESC");
        qb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn where_clause(sql: &str) -> &str {
        let start = sql.find(" WHERE 1 = 1").expect("where clause");
        let end = sql.rfind(" ORDER BY").expect("order by");
        &sql[start..end]
    }

    #[test]
    fn test_anonymous_visibility_only_public() {
        let qb = PinQuery::new(None).build();
        let sql = qb.sql();
        assert!(sql.contains("0 AS is_saved"));
        assert!(where_clause(sql).ends_with("AND p.is_private = 0"));
    }

    #[test]
    fn test_visibility_is_appended_after_filters() {
        let qb = PinQuery::new(Some(7))
            .filter(PinFilter::CategoryName("Art".into()))
            .filter(PinFilter::Owner(3))
            .limit(SEARCH_LIMIT)
            .build();
        let sql = qb.sql();
        let clause = where_clause(sql);

        let category = clause.find("c.name = ").unwrap();
        let owner = clause.find("p.user_id = ?").unwrap();
        let visibility = clause.find("(p.user_id = ? OR p.is_private = 0)").unwrap();
        assert!(category < owner && owner < visibility);
        assert!(sql.ends_with("LIMIT ?"));
    }

    #[test]
    fn test_empty_category_set_matches_nothing() {
        let qb = PinQuery::new(Some(1)).filter(PinFilter::CategoryIn(vec![])).build();
        assert!(where_clause(qb.sql()).contains("AND 0 AND"));

        let qb = PinQuery::new(Some(1))
            .filter(PinFilter::CategoryIn(vec![1, 2, 3]))
            .build();
        assert!(qb.sql().contains("pc.category_id IN (?, ?, ?))"));
    }

    #[test]
    fn test_board_query_visibility() {
        let qb = BoardQuery::new(Some(2)).filter(BoardFilter::Owner(5)).build();
        assert!(where_clause(qb.sql()).ends_with("AND b.user_id = ? AND (b.user_id = ? OR b.is_private = 0)"));

        let qb = BoardQuery::new(None).build();
        assert!(where_clause(qb.sql()).ends_with("AND b.is_private = 0"));
    }
}
