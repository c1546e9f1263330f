use crate::metrics;
use crate::query::prepare::{Prepare, SqlArg, SqlPrepare};
use crate::twoface::{Fallible, TfError};
use anyhow::anyhow;
use indexmap::IndexMap;
use std::collections::BTreeSet;
use tracing::debug;

/// How a table takes part in the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    /// The table in the `FROM` clause. Exactly one per query.
    Base,
    Inner,
    Left,
    Right,
}

impl JoinMode {
    fn keyword(self) -> &'static str {
        match self {
            Self::Base => "FROM",
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Join {
    table: String,
    mode: JoinMode,
    on: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    /// Anything but `ASC` or `DESC` is read as `ASC`.
    pub fn parse(direction: &str) -> Self {
        match direction {
            "DESC" => Self::Desc,
            _ => Self::Asc,
        }
    }

    fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Columns to project from one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSpec {
    Column {
        column: String,
        alias: Option<String>,
    },
    Many(Vec<FieldSpec>),
}

impl From<&str> for FieldSpec {
    fn from(column: &str) -> Self {
        Self::Column {
            column: column.to_owned(),
            alias: None,
        }
    }
}

/// `(column, alias)`
impl From<(&str, &str)> for FieldSpec {
    fn from((column, alias): (&str, &str)) -> Self {
        Self::Column {
            column: column.to_owned(),
            alias: Some(alias.to_owned()),
        }
    }
}

impl<T: Into<FieldSpec>> From<Vec<T>> for FieldSpec {
    fn from(fields: Vec<T>) -> Self {
        Self::Many(fields.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
    column: String,
    aliased: bool,
}

/// Named conditions replace each other, anonymous ones accumulate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConditionKey {
    Named(String),
    Anonymous(usize),
}

/// A rendered query plus what the caller asked to be done with its rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedQuery {
    pub sql: String,
    pub limit: i64,
    /// The rows must have their existence rechecked before they are shown.
    pub recheck_existence: bool,
}

/// Accumulates joins, projections, conditions, grouping and ordering, then renders a single
/// `SELECT`.
#[derive(Debug, Clone)]
pub struct QueryBuilder<P: Prepare = SqlPrepare> {
    prepare: P,
    joins: IndexMap<String, Join>,
    fields: IndexMap<String, IndexMap<String, Field>>,
    conditions: IndexMap<ConditionKey, String>,
    having: IndexMap<ConditionKey, String>,
    /// `(weight, field)`, so independent callers can each add a key.
    group_by: BTreeSet<(i32, String)>,
    orders: Vec<String>,
    limit: i64,
    distinct: bool,
    recheck_existence: bool,
    next_anonymous: usize,
    /// First failure of the preparer. Reported by `render`.
    prepare_error: Option<P::Error>,
}

pub const DEFAULT_LIMIT: i64 = 10;

impl QueryBuilder<SqlPrepare> {
    pub fn new() -> Self {
        Self::with_prepare(SqlPrepare)
    }
}

impl Default for QueryBuilder<SqlPrepare> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Prepare> QueryBuilder<P> {
    pub fn with_prepare(prepare: P) -> Self {
        Self {
            prepare,
            joins: IndexMap::new(),
            fields: IndexMap::new(),
            conditions: IndexMap::new(),
            having: IndexMap::new(),
            group_by: BTreeSet::new(),
            orders: Vec::new(),
            limit: DEFAULT_LIMIT,
            distinct: false,
            recheck_existence: false,
            next_anonymous: 0,
            prepare_error: None,
        }
    }

    /// Register the table `alias`, replacing whatever was registered under it before.
    pub fn add_join(&mut self, alias: &str, table: &str, mode: JoinMode, on: &str) -> &mut Self {
        let join = Join {
            table: table.to_owned(),
            mode,
            on: on.to_owned(),
        };
        self.joins.insert(alias.to_owned(), join);
        self
    }

    pub fn inner_join(&mut self, alias: &str, table: &str, on: &str) -> &mut Self {
        self.add_join(alias, table, JoinMode::Inner, on)
    }

    pub fn left_join(&mut self, alias: &str, table: &str, on: &str) -> &mut Self {
        self.add_join(alias, table, JoinMode::Left, on)
    }

    pub fn right_join(&mut self, alias: &str, table: &str, on: &str) -> &mut Self {
        self.add_join(alias, table, JoinMode::Right, on)
    }

    /// Drop the table `alias` and everything projected from it.
    pub fn remove_join(&mut self, alias: &str) -> &mut Self {
        self.joins.shift_remove(alias);
        self.fields.shift_remove(alias);
        self
    }

    pub fn has_join(&self, alias: &str) -> bool {
        self.joins.contains_key(alias)
    }

    /// Project columns of a registered table. Unknown table aliases are ignored.
    pub fn add_fields(&mut self, table_alias: &str, fields: impl Into<FieldSpec>) -> &mut Self {
        if !self.joins.contains_key(table_alias) {
            return self;
        }
        match fields.into() {
            FieldSpec::Column { column, alias } => {
                let (key, aliased) = match alias {
                    Some(alias) => (alias, true),
                    None => (column.clone(), false),
                };
                self.fields
                    .entry(table_alias.to_owned())
                    .or_default()
                    .insert(key, Field { column, aliased });
            }
            FieldSpec::Many(many) => {
                for field in many {
                    self.add_fields(table_alias, field);
                }
            }
        }
        self
    }

    fn prepared(&mut self, template: &str, args: &[SqlArg]) -> Option<String> {
        match self.prepare.prepare(template, args) {
            Ok(sql) => Some(sql),
            Err(e) => {
                debug!(error = %e, "couldn't prepare condition");
                if self.prepare_error.is_none() {
                    self.prepare_error = Some(e);
                }
                None
            }
        }
    }

    fn condition_key(&mut self, name: Option<&str>) -> ConditionKey {
        match name {
            Some(name) if !name.is_empty() => ConditionKey::Named(name.to_owned()),
            _ => {
                self.next_anonymous += 1;
                ConditionKey::Anonymous(self.next_anonymous)
            }
        }
    }

    /// Add a `WHERE` predicate. A named predicate replaces the one previously added under that name.
    pub fn add_condition(&mut self, template: &str, args: &[SqlArg], name: Option<&str>) -> &mut Self {
        if let Some(sql) = self.prepared(template, args) {
            let key = self.condition_key(name);
            self.conditions.insert(key, sql);
        }
        self
    }

    pub fn remove_condition(&mut self, name: &str) -> &mut Self {
        self.conditions
            .shift_remove(&ConditionKey::Named(name.to_owned()));
        self
    }

    /// Add a `HAVING` predicate. Naming works as in [`QueryBuilder::add_condition`].
    pub fn add_having_condition(
        &mut self,
        template: &str,
        args: &[SqlArg],
        name: Option<&str>,
    ) -> &mut Self {
        if let Some(sql) = self.prepared(template, args) {
            let key = self.condition_key(name);
            self.having.insert(key, sql);
        }
        self
    }

    pub fn remove_having_condition(&mut self, name: &str) -> &mut Self {
        self.having.shift_remove(&ConditionKey::Named(name.to_owned()));
        self
    }

    pub fn add_order(&mut self, field: &str, direction: &str) -> &mut Self {
        self.orders
            .push(format!("{} {}", field, Direction::parse(direction).keyword()));
        self
    }

    /// Clear all previous orderings, then order by `field`.
    pub fn set_order(&mut self, field: &str, direction: &str) -> &mut Self {
        self.orders.clear();
        self.add_order(field, direction)
    }

    pub fn add_group_by(&mut self, field: &str, weight: i32) -> &mut Self {
        self.group_by.insert((weight, field.to_owned()));
        self
    }

    /// Clear all previous group keys, then group by `field`.
    pub fn set_group_by(&mut self, field: &str, weight: i32) -> &mut Self {
        self.group_by.clear();
        self.add_group_by(field, weight)
    }

    pub fn remove_group_by(&mut self, field: &str, weight: i32) -> &mut Self {
        self.group_by.remove(&(weight, field.to_owned()));
        self
    }

    /// Non-positive limits are ignored.
    pub fn set_limit(&mut self, limit: i64) -> &mut Self {
        if limit > 0 {
            self.limit = limit;
        }
        self
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn set_distinct(&mut self, distinct: bool) -> &mut Self {
        self.distinct = distinct;
        self
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn set_recheck_existence(&mut self, recheck: bool) -> &mut Self {
        self.recheck_existence = recheck;
        self
    }

    /// Render the query.
    ///
    /// Fails if there isn't exactly one base table, or if the preparer rejected a condition (that
    /// error is passed through as-is).
    pub fn render(&self) -> Fallible<String> {
        let result = self.render_sql();
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.cause().label(),
        };
        metrics::QUERIES.with_label_values(&[outcome]).inc();
        result
    }

    pub fn build(&self) -> Fallible<RenderedQuery> {
        Ok(RenderedQuery {
            sql: self.render()?,
            limit: self.limit,
            recheck_existence: self.recheck_existence,
        })
    }

    fn render_sql(&self) -> Fallible<String> {
        let bases: Vec<_> = self
            .joins
            .iter()
            .filter(|(_, join)| join.mode == JoinMode::Base)
            .collect();
        guard!(let [(base_alias, base)] = &bases[..] else {
            return Err(TfError::contract(
                anyhow!("query has {} base tables", bases.len()),
                "Query needs exactly one base table",
            ));
        });
        if let Some(e) = &self.prepare_error {
            return Err(TfError::persistence(e.clone()));
        }

        let mut clauses = vec![format!(
            "SELECT {}{}",
            if self.distinct { "DISTINCT " } else { "" },
            self.projection()
        )];
        clauses.push(format!("FROM `{}` AS `{}`", base.table, base_alias));
        for (alias, join) in &self.joins {
            if join.mode != JoinMode::Base {
                clauses.push(format!(
                    "{} `{}` AS `{}` ON {}",
                    join.mode.keyword(),
                    join.table,
                    alias,
                    join.on
                ));
            }
        }
        if !self.conditions.is_empty() {
            clauses.push(format!("WHERE {}", predicates(&self.conditions)));
        }
        if !self.group_by.is_empty() {
            let keys: Vec<&str> = self.group_by.iter().map(|(_, f)| f.as_str()).collect();
            clauses.push(format!("GROUP BY {}", keys.join(", ")));
        }
        if !self.having.is_empty() {
            clauses.push(format!("HAVING {}", predicates(&self.having)));
        }
        if !self.orders.is_empty() {
            clauses.push(format!("ORDER BY {}", self.orders.join(", ")));
        }
        clauses.push(format!("LIMIT {}", self.limit));
        Ok(clauses.join("\n"))
    }

    fn projection(&self) -> String {
        let mut fields = Vec::new();
        for (table_alias, columns) in &self.fields {
            if !self.joins.contains_key(table_alias) {
                continue;
            }
            for (alias, field) in columns {
                if field.column == "*" {
                    fields.push(format!("`{}`.*", table_alias));
                } else if field.aliased {
                    fields.push(format!("`{}`.{} AS `{}`", table_alias, field.column, alias));
                } else {
                    fields.push(format!("`{}`.{}", table_alias, field.column));
                }
            }
        }
        if fields.is_empty() {
            "*".to_owned()
        } else {
            fields.join(", ")
        }
    }
}

fn predicates(conditions: &IndexMap<ConditionKey, String>) -> String {
    conditions
        .values()
        .map(|c| format!("({})", c))
        .collect::<Vec<_>>()
        .join(" AND ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::prepare::PrepareError;
    use crate::twoface::Cause;

    fn base() -> QueryBuilder {
        let mut q = QueryBuilder::new();
        q.add_join("tweets", "wts_tweets", JoinMode::Base, "");
        q
    }

    #[test]
    fn test_minimal_query() {
        assert_eq!(
            base().render().unwrap(),
            "SELECT *\nFROM `wts_tweets` AS `tweets`\nLIMIT 10"
        );
    }

    #[test]
    fn test_clause_order() {
        let mut q = base();
        q.add_fields("tweets", vec!["*"])
            .left_join("ht", "wts_tweet_to_hashtag", "`tweets`.`id` = `ht`.`tid`")
            .add_fields("ht", ("hid", "tag_id"))
            .add_condition("`tweets`.`rt` = %d", &[0.into()], None)
            .add_group_by("`tweets`.`id`", 0)
            .add_having_condition("COUNT(*) > %d", &[1.into()], None)
            .set_order("`tweets`.`time`", "DESC")
            .set_limit(5)
            .set_distinct(true);
        assert_eq!(
            q.render().unwrap(),
            "SELECT DISTINCT `tweets`.*, `ht`.hid AS `tag_id`\n\
             FROM `wts_tweets` AS `tweets`\n\
             LEFT JOIN `wts_tweet_to_hashtag` AS `ht` ON `tweets`.`id` = `ht`.`tid`\n\
             WHERE (`tweets`.`rt` = 0)\n\
             GROUP BY `tweets`.`id`\n\
             HAVING (COUNT(*) > 1)\n\
             ORDER BY `tweets`.`time` DESC\n\
             LIMIT 5"
        );
    }

    #[test]
    fn test_base_table_is_rendered_first() {
        let mut q = QueryBuilder::new();
        q.inner_join("u", "users", "`u`.`id` = `t`.`author_id`")
            .add_join("t", "wts_tweets", JoinMode::Base, "");
        let sql = q.render().unwrap();
        assert!(sql.starts_with("SELECT *\nFROM `wts_tweets` AS `t`\nINNER JOIN `users` AS `u`"));
    }

    #[test]
    fn test_base_table_count() {
        let err = QueryBuilder::new().render().unwrap_err();
        assert_eq!(err.cause(), Cause::ContractViolation);

        let mut q = base();
        q.add_join("other", "wts_hashtags", JoinMode::Base, "");
        assert!(q.render().unwrap_err().is_contract_violation());

        // Re-registering the alias as a regular join leaves one base table again.
        q.left_join("other", "wts_hashtags", "1 = 1");
        assert!(q.render().is_ok());
    }

    #[test]
    fn test_named_conditions_replace() {
        let mut q = base();
        q.add_condition("a = %d", &[1.into()], Some("a"))
            .add_condition("b = 2", &[], None)
            .add_condition("a = %d", &[3.into()], Some("a"))
            .add_condition("c = 4", &[], None);
        let sql = q.render().unwrap();
        assert!(sql.contains("WHERE (a = 3) AND (b = 2) AND (c = 4)"));

        q.remove_condition("a");
        assert!(q.render().unwrap().contains("WHERE (b = 2) AND (c = 4)"));
    }

    #[test]
    fn test_fields() {
        let mut q = base();
        q.add_fields("nope", "id")
            .add_fields("tweets", vec![("twitter_id", "tid"), ("time", "t")])
            .add_fields("tweets", "text")
            .add_fields("tweets", FieldSpec::Many(vec!["author".into(), vec!["rt"].into()]));
        assert!(q.render().unwrap().starts_with(
            "SELECT `tweets`.twitter_id AS `tid`, `tweets`.time AS `t`, `tweets`.text, \
             `tweets`.author, `tweets`.rt\n"
        ));
    }

    #[test]
    fn test_removed_join_drops_its_fields() {
        let mut q = base();
        q.left_join("ht", "wts_tweet_to_hashtag", "1 = 1")
            .add_fields("ht", "hid")
            .remove_join("ht");
        assert_eq!(q.render().unwrap(), base().render().unwrap());
    }

    #[test]
    fn test_order_direction() {
        let mut q = base();
        q.add_order("a", "DESC").add_order("b", "sideways").add_order("c", "ASC");
        assert!(q.render().unwrap().contains("ORDER BY a DESC, b ASC, c ASC"));
        q.set_order("d", "desc");
        assert!(q.render().unwrap().contains("ORDER BY d ASC\n"));
    }

    #[test]
    fn test_group_by_weights() {
        let mut q = base();
        q.add_group_by("`b`", 5)
            .add_group_by("`a`", 5)
            .add_group_by("`z`", -1)
            .add_group_by("`a`", 5);
        assert!(q.render().unwrap().contains("GROUP BY `z`, `a`, `b`\n"));
        q.set_group_by("`only`", 0);
        assert!(q.render().unwrap().contains("GROUP BY `only`\n"));
        q.remove_group_by("`only`", 0);
        assert!(!q.render().unwrap().contains("GROUP BY"));
    }

    #[test]
    fn test_limit() {
        let mut q = base();
        q.set_limit(0).set_limit(-5);
        assert_eq!(q.limit(), 10);
        q.set_limit(3).set_limit(0);
        let sql = q.render().unwrap();
        assert_eq!(sql.matches("LIMIT").count(), 1);
        assert!(sql.ends_with("\nLIMIT 3"));
    }

    #[test]
    fn test_prepare_errors_pass_through() {
        let mut q = base();
        q.add_condition("a = %d AND b = %d", &[1.into()], Some("a"));
        let err = q.render().unwrap_err();
        assert_eq!(err.cause(), Cause::Persistence);
        let original = err.internal.downcast_ref::<PrepareError>().unwrap();
        assert_eq!(original.reason, "not enough arguments");
    }

    #[test]
    fn test_build_carries_row_policy() {
        let mut q = base();
        q.set_limit(4).set_recheck_existence(true);
        let query = q.build().unwrap();
        assert_eq!(query.limit, 4);
        assert!(query.recheck_existence);
        assert_eq!(query.sql, q.render().unwrap());
    }
}
