//! Ways to filter the posts of a stream. Every filter has a "don't filter" setting, and that is the
//! default.
use serde::Deserialize;

/// How a set of tag ids constrains the posts.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// No tag constraint.
    All,
    /// Only posts with at least one of the tags.
    Include,
    /// Only posts with none of the tags, including posts without any tag.
    Exclude,
}

impl Default for FilterMode {
    fn default() -> Self {
        Self::All
    }
}

/// Constraint on the post's has-media flag.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFilter {
    #[serde(rename = "any")]
    DoNotFilter,
    #[serde(rename = "only")]
    OnlyWithMedia,
    #[serde(rename = "exclude")]
    ExcludeWithMedia,
}

impl Default for MediaFilter {
    fn default() -> Self {
        Self::DoNotFilter
    }
}

/// Constraint on soft-hidden posts.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Both hidden and visible posts.
    Any,
    /// Only posts still confirmed to exist.
    Visible,
    /// Only soft-hidden posts.
    Hidden,
}

impl Default for Visibility {
    fn default() -> Self {
        Self::Any
    }
}

/// Filters that can be applied to a stream's post query.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PostFilters {
    /// How many posts to show.
    #[serde(default = "default_limit")]
    pub count: i64,

    #[serde(default)]
    pub filter_mode: FilterMode,

    /// Tag ids `filter_mode` applies to.
    #[serde(default)]
    pub tag_ids: Vec<i64>,

    #[serde(default)]
    pub media: MediaFilter,

    #[serde(default = "default_visibility")]
    pub visibility: Visibility,

    /// Whether rows returned by the query must have their existence rechecked before display.
    #[serde(default = "default_recheck")]
    pub recheck_existence: bool,
}

impl Default for PostFilters {
    fn default() -> Self {
        Self {
            count: default_limit(),
            filter_mode: FilterMode::default(),
            tag_ids: Vec::new(),
            media: MediaFilter::default(),
            visibility: default_visibility(),
            recheck_existence: default_recheck(),
        }
    }
}

fn default_limit() -> i64 {
    10
}

fn default_visibility() -> Visibility {
    Visibility::Visible
}

fn default_recheck() -> bool {
    true
}
