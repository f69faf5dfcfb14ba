use crate::config::TrackerConfig;
use crate::tracker::WorkItem;

/// Branch for a work item: `<bucket>/<slug(id)>`.
///
/// The bucket comes from the item's type through the configured map; unknown
/// types land in the default type's bucket.
pub fn branch_name(item: &WorkItem, tracker: &TrackerConfig) -> String {
    let buckets = tracker.type_buckets();
    let default_type = tracker.default_type().to_lowercase();
    let bucket = buckets
        .get(&item.issue_type.trim().to_lowercase())
        .or_else(|| buckets.get(&default_type))
        .cloned()
        .unwrap_or(default_type);
    let slug = slug::slugify(&item.id);
    format!("{}/{}", bucket, slug)
}
