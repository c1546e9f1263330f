//! Post-stream queries: the base post query plus the tag, media and visibility filters.
//!
//! Every filter installs its joins, predicates and group keys under fixed names, so switching a
//! filter to another mode first retracts exactly what the previous mode installed.
use crate::datastore::postfilters::{FilterMode, MediaFilter, PostFilters, Visibility};
use crate::datastore::tables::{post_tags, posts, Tables};
use crate::query::builder::{JoinMode, QueryBuilder};
use crate::query::prepare::{Prepare, SqlArg, SqlPrepare};
use std::ops::{Deref, DerefMut};

/// Alias of the posts table.
pub const POSTS: &str = "tweets";
/// Alias of the post-to-tag association table.
pub const POST_TAGS: &str = "ht";

const TAGS_INCLUDE: &str = "tags_include";
const TAGS_EXCLUDE: &str = "tags_exclude";
const MEDIA: &str = "media";
const VISIBILITY: &str = "visibility";
/// Group keys added by the tag filter sort before anything callers add with positive weights.
const TAG_GROUP_WEIGHT: i32 = -100;

/// A query over posts, newest first.
#[derive(Debug, Clone)]
pub struct PostQuery<P: Prepare = SqlPrepare> {
    builder: QueryBuilder<P>,
    tables: Tables,
    filter_mode: FilterMode,
    tag_ids: Vec<i64>,
    media: MediaFilter,
    visibility: Visibility,
    /// What `distinct` was before the tag filter turned it on.
    distinct_before_filter: Option<bool>,
}

impl PostQuery<SqlPrepare> {
    pub fn new(tables: &Tables) -> Self {
        Self::with_prepare(tables, SqlPrepare)
    }
}

impl<P: Prepare> PostQuery<P> {
    pub fn with_prepare(tables: &Tables, prepare: P) -> Self {
        let mut builder = QueryBuilder::with_prepare(prepare);
        builder
            .add_join(POSTS, &tables.posts, JoinMode::Base, "")
            .add_fields(POSTS, "*")
            .set_order(&column(POSTS, posts::TIME), "DESC");
        Self {
            builder,
            tables: tables.clone(),
            filter_mode: FilterMode::All,
            tag_ids: Vec::new(),
            media: MediaFilter::DoNotFilter,
            visibility: Visibility::Any,
            distinct_before_filter: None,
        }
    }

    /// Set every filter, the limit and the row policy from `filters`.
    pub fn apply(&mut self, filters: &PostFilters) -> &mut Self {
        self.set_tag_filter(filters.filter_mode, &filters.tag_ids)
            .set_media_filter(filters.media)
            .set_visibility(filters.visibility);
        self.builder
            .set_limit(filters.count)
            .set_recheck_existence(filters.recheck_existence);
        self
    }

    pub fn filter_mode(&self) -> FilterMode {
        self.filter_mode
    }

    /// Constrain the posts by tag ids. An empty id set filters nothing, whatever the mode.
    ///
    /// Setting the filter it already has leaves the query untouched.
    pub fn set_tag_filter(&mut self, mode: FilterMode, tag_ids: &[i64]) -> &mut Self {
        let mut ids: Vec<i64> = Vec::with_capacity(tag_ids.len());
        for id in tag_ids {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        if mode == self.filter_mode && ids == self.tag_ids {
            return self;
        }

        let wanted = installed_mode(mode, &ids);
        if self.installed_tag_mode() != wanted {
            self.retract_tag_filter();
        }
        self.filter_mode = mode;
        self.tag_ids = ids;
        guard!(let Some(mode) = wanted else {
            return self
        });

        let on = format!(
            "{} = {}",
            column(POSTS, posts::ID),
            column(POST_TAGS, post_tags::POST_ID)
        );
        let tag_id = column(POST_TAGS, post_tags::TAG_ID);
        let placeholders = vec!["%d"; self.tag_ids.len()].join(", ");
        let args: Vec<SqlArg> = self.tag_ids.iter().map(|id| SqlArg::Int(*id)).collect();

        // Entries are re-registered under the same names, so a change of ids keeps their position.
        match mode {
            FilterMode::All => {}
            FilterMode::Include => {
                // A post with several matching tags joins once per tag.
                if self.distinct_before_filter.is_none() {
                    self.distinct_before_filter = Some(self.builder.is_distinct());
                }
                self.builder
                    .inner_join(POST_TAGS, &self.tables.post_tags, &on)
                    .add_condition(
                        &format!("{} IN ({})", tag_id, placeholders),
                        &args,
                        Some(TAGS_INCLUDE),
                    )
                    .set_distinct(true);
            }
            FilterMode::Exclude => {
                // Posts without tags must survive the join, and the excluded ids have to be
                // absent from all of a post's rows, so this is decided per group.
                self.builder
                    .left_join(POST_TAGS, &self.tables.post_tags, &on)
                    .add_group_by(&column(POSTS, posts::ID), TAG_GROUP_WEIGHT)
                    .add_having_condition(
                        &format!(
                            "SUM(CASE WHEN {} IN ({}) THEN 1 ELSE 0 END) = 0",
                            tag_id, placeholders
                        ),
                        &args,
                        Some(TAGS_EXCLUDE),
                    );
            }
        }
        self
    }

    /// The mode whose joins and predicates are currently in the query, if any.
    fn installed_tag_mode(&self) -> Option<FilterMode> {
        installed_mode(self.filter_mode, &self.tag_ids)
    }

    /// Remove what the tag filter installed, and nothing else.
    fn retract_tag_filter(&mut self) {
        match self.installed_tag_mode() {
            Some(FilterMode::Include) => {
                self.builder
                    .remove_join(POST_TAGS)
                    .remove_condition(TAGS_INCLUDE);
                if let Some(distinct) = self.distinct_before_filter.take() {
                    self.builder.set_distinct(distinct);
                }
            }
            Some(FilterMode::Exclude) => {
                self.builder
                    .remove_join(POST_TAGS)
                    .remove_having_condition(TAGS_EXCLUDE)
                    .remove_group_by(&column(POSTS, posts::ID), TAG_GROUP_WEIGHT);
            }
            _ => {}
        }
        self.filter_mode = FilterMode::All;
        self.tag_ids.clear();
    }

    pub fn set_media_filter(&mut self, media: MediaFilter) -> &mut Self {
        self.media = media;
        let has_media = column(POSTS, posts::HAS_MEDIA);
        let wanted = match media {
            MediaFilter::DoNotFilter => {
                self.builder.remove_condition(MEDIA);
                return self;
            }
            MediaFilter::OnlyWithMedia => 1,
            MediaFilter::ExcludeWithMedia => 0,
        };
        self.builder.add_condition(
            &format!("{} = %d", has_media),
            &[SqlArg::Int(wanted)],
            Some(MEDIA),
        );
        self
    }

    pub fn set_visibility(&mut self, visibility: Visibility) -> &mut Self {
        self.visibility = visibility;
        let last_checked = column(POSTS, posts::LAST_CHECKED);
        match visibility {
            Visibility::Any => {
                self.builder.remove_condition(VISIBILITY);
            }
            Visibility::Visible => {
                self.builder.add_condition(
                    &format!("{} IS NOT NULL", last_checked),
                    &[],
                    Some(VISIBILITY),
                );
            }
            Visibility::Hidden => {
                self.builder.add_condition(
                    &format!("{} IS NULL", last_checked),
                    &[],
                    Some(VISIBILITY),
                );
            }
        }
        self
    }

    /// Only posts still confirmed to exist.
    pub fn exclude_hidden(&mut self) -> &mut Self {
        self.set_visibility(Visibility::Visible)
    }

    /// Only soft-hidden posts.
    pub fn only_hidden(&mut self) -> &mut Self {
        self.set_visibility(Visibility::Hidden)
    }
}

impl<P: Prepare> Deref for PostQuery<P> {
    type Target = QueryBuilder<P>;

    fn deref(&self) -> &Self::Target {
        &self.builder
    }
}

impl<P: Prepare> DerefMut for PostQuery<P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.builder
    }
}

fn installed_mode(mode: FilterMode, tag_ids: &[i64]) -> Option<FilterMode> {
    match mode {
        FilterMode::All => None,
        _ if tag_ids.is_empty() => None,
        mode => Some(mode),
    }
}

fn column(table_alias: &str, column: &str) -> String {
    format!("`{}`.`{}`", table_alias, column)
}
