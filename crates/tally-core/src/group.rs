//! Applies compiled rules to activities and aggregates their time.
//!
//! A [`GroupSet`] starts with one [`Group`] per category of the [`Rules`].
//! Each categorized activity either lands directly on the group whose name it
//! carries, or on a lazily created leaf group named after the activity and
//! hung under the categories of its first matching association. Durations
//! flow upward along every weighted parent edge, so a category reachable
//! through two paths (a diamond) receives both contributions.

use std::borrow::Borrow;
use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use thiserror::Error;

use crate::activity::Activity;
use crate::category::{CategoryId, TagId, WeightedCategory};
use crate::color::{self, ColorMap};
use crate::progress_percent;
use crate::rules::Rules;
use crate::time::Minute;

/// Index of a group in its [`GroupSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GroupId(usize);

impl GroupId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeightedGroup {
    pub group: GroupId,
    pub weight: f64,
}

/// Runtime node of the classification tree.
#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    /// The category this group mirrors, `None` for activity leaves.
    pub category: Option<CategoryId>,
    /// Parent categories as declared by the rules.
    pub declared_parents: Vec<WeightedCategory>,
    pub parents: Vec<WeightedGroup>,
    pub children: Vec<GroupId>,
    pub activities: Vec<Activity>,
    pub total_minutes: Minute,
    pruned: bool,
}

impl Group {
    fn new(name: String, category: Option<CategoryId>, declared_parents: Vec<WeightedCategory>) -> Self {
        Self {
            name,
            category,
            declared_parents,
            parents: Vec::new(),
            children: Vec::new(),
            activities: Vec::new(),
            total_minutes: 0,
            pruned: false,
        }
    }

    /// Minutes of the activities assigned directly to this group.
    #[must_use]
    pub fn own_minutes(&self) -> Minute {
        self.activities.iter().map(Activity::duration).sum()
    }
}

/// Flat per-tag accumulator. Tag time never flows to parent tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagGroup {
    pub tag: TagId,
    pub name: String,
    #[serde(skip)]
    pub activities: Vec<Activity>,
    pub total_minutes: Minute,
}

impl TagGroup {
    fn add_activity(&mut self, activity: &Activity) {
        self.total_minutes += activity.duration();
        self.activities.push(activity.clone());
    }
}

/// An activity no rule matches.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown category for activity \"{}\" at {}", .activity.name, .activity.start)]
pub struct UncategorizedActivity {
    pub activity: Activity,
}

impl UncategorizedActivity {
    /// A rule line that would match this activity, ready to paste.
    #[must_use]
    pub fn suggestion(&self) -> String {
        // `#` only starts tags or comments in a rule file.
        let pattern = regex::escape(&self.activity.name).replace("\\#", ".");
        format!("{pattern} = Uncategorized")
    }
}

/// Every uncategorized activity of a run, reported at once.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{} uncategorized activities", .errors.len())]
pub struct UncategorizedActivities {
    /// Deduplicated, sorted rule suggestions.
    pub suggestions: Vec<String>,
    /// One entry per occurrence, in input order.
    pub errors: Vec<UncategorizedActivity>,
}

impl UncategorizedActivities {
    #[must_use]
    pub fn new(errors: Vec<UncategorizedActivity>) -> Self {
        let suggestions = errors
            .iter()
            .map(UncategorizedActivity::suggestion)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        Self {
            suggestions,
            errors,
        }
    }

    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

/// Serializable snapshot of a classification subtree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupNode {
    pub name: String,
    pub total_minutes: Minute,
    pub own_minutes: Minute,
    /// Weight of the edge to the parent this node was reached from.
    pub weight: f64,
    pub color: String,
    pub children: Vec<GroupNode>,
}

/// Truncates, so a parent never receives more than the time feeding it.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn weighted_share(minutes: Minute, weight: f64) -> Minute {
    (minutes as f64 * weight) as Minute
}

/// The group graph of one classification run.
#[derive(Debug, Clone)]
pub struct GroupSet<'r> {
    rules: &'r Rules,
    groups: Vec<Group>,
    by_name: HashMap<String, GroupId>,
    tags: Vec<TagGroup>,
}

impl<'r> GroupSet<'r> {
    /// Mirrors the category graph of `rules`; no time is assigned yet.
    #[must_use]
    pub fn new(rules: &'r Rules) -> Self {
        let mut groups: Vec<Group> = rules
            .categories
            .iter()
            .map(|(id, c)| Group::new(c.name.clone(), Some(id), c.parents.clone()))
            .collect();

        // Group ids of category groups are the category indices.
        for child in 0..groups.len() {
            let parents = groups[child].declared_parents.clone();
            for parent in parents {
                let parent_id = GroupId(parent.category.index());
                groups[child].parents.push(WeightedGroup {
                    group: parent_id,
                    weight: parent.weight,
                });
                groups[parent_id.0].children.push(GroupId(child));
            }
        }

        let by_name = groups
            .iter()
            .enumerate()
            .map(|(i, g)| (g.name.to_lowercase(), GroupId(i)))
            .collect();
        let tags = rules
            .tags
            .iter()
            .map(|(id, t)| TagGroup {
                tag: id,
                name: t.name.clone(),
                activities: Vec::new(),
                total_minutes: 0,
            })
            .collect();

        Self {
            rules,
            groups,
            by_name,
            tags,
        }
    }

    /// Assigns one activity and propagates its duration.
    pub fn categorize(&mut self, activity: &Activity) -> Result<(), UncategorizedActivity> {
        let rules = self.rules;
        let folded = activity.name.to_lowercase();
        let (id, tags) = if let Some(&id) = self.by_name.get(&folded) {
            let tags = rules
                .associate(&activity.name)
                .map(|a| a.tags.clone())
                .unwrap_or_default();
            (id, tags)
        } else {
            let assoc = rules
                .associate(&activity.name)
                .ok_or_else(|| UncategorizedActivity {
                    activity: activity.clone(),
                })?;
            let id = self.insert_leaf(&activity.name, assoc.categories.clone());
            self.by_name.insert(folded, id);
            (id, assoc.tags.clone())
        };

        self.groups[id.0].activities.push(activity.clone());
        self.add_time(id, activity.duration());
        for tag in tags {
            self.tags[tag.index()].add_activity(activity);
        }
        Ok(())
    }

    fn insert_leaf(&mut self, name: &str, categories: Vec<WeightedCategory>) -> GroupId {
        let id = GroupId(self.groups.len());
        let mut group = Group::new(name.to_string(), None, categories);
        for parent in &group.declared_parents {
            let parent_id = GroupId(parent.category.index());
            group.parents.push(WeightedGroup {
                group: parent_id,
                weight: parent.weight,
            });
            self.groups[parent_id.0].children.push(id);
        }
        tracing::debug!(activity = name, "created activity group");
        self.groups.push(group);
        id
    }

    fn add_time(&mut self, id: GroupId, minutes: Minute) {
        let mut pending = vec![(id, minutes)];
        while let Some((id, minutes)) = pending.pop() {
            let group = &mut self.groups[id.0];
            group.total_minutes += minutes;
            pending.extend(
                group
                    .parents
                    .iter()
                    .map(|p| (p.group, weighted_share(minutes, p.weight))),
            );
        }
    }

    /// Drops zero-minute groups and sorts children by descending time.
    pub fn prune(&mut self) {
        for group in &mut self.groups {
            if group.total_minutes == 0 && group.category != Some(CategoryId::TOP) {
                group.pruned = true;
            }
        }
        let groups = &self.groups;
        self.by_name.retain(|_, id| !groups[id.0].pruned);

        for root in self.root_ids() {
            self.prune_children(root);
        }
    }

    fn prune_children(&mut self, id: GroupId) {
        let mut children: Vec<GroupId> = self.groups[id.0]
            .children
            .iter()
            .copied()
            .filter(|c| !self.groups[c.0].pruned)
            .collect();
        children.sort_by(|a, b| {
            self.groups[b.0]
                .total_minutes
                .cmp(&self.groups[a.0].total_minutes)
        });
        self.groups[id.0].children.clone_from(&children);
        for child in children {
            self.prune_children(child);
        }
    }

    /// TOP first, then the exclusion roots.
    fn root_ids(&self) -> Vec<GroupId> {
        self.groups
            .iter()
            .enumerate()
            .filter(|(_, g)| g.parents.is_empty() && !g.pruned)
            .map(|(i, _)| GroupId(i))
            .collect()
    }

    #[must_use]
    pub fn top(&self) -> &Group {
        &self.groups[CategoryId::TOP.index()]
    }

    #[must_use]
    pub fn get(&self, id: GroupId) -> &Group {
        &self.groups[id.0]
    }

    /// Looks a group up by name, ignoring case.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&Group> {
        self.by_name
            .get(&name.to_lowercase())
            .map(|id| &self.groups[id.0])
    }

    /// Live groups in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (GroupId, &Group)> {
        self.groups
            .iter()
            .enumerate()
            .filter(|(_, g)| !g.pruned)
            .map(|(i, g)| (GroupId(i), g))
    }

    /// Every live group whose declared parents include `category`.
    #[must_use]
    pub fn find_groups_with_parent(&self, category: CategoryId) -> Vec<&Group> {
        self.iter()
            .map(|(_, g)| g)
            .filter(|g| g.declared_parents.iter().any(|p| p.category == category))
            .collect()
    }

    /// Tag totals with time, largest first.
    #[must_use]
    pub fn tags(&self) -> Vec<&TagGroup> {
        let mut tags: Vec<&TagGroup> = self
            .tags
            .iter()
            .filter(|t| t.tag != TagId::TOP && t.total_minutes > 0)
            .collect();
        tags.sort_by(|a, b| b.total_minutes.cmp(&a.total_minutes));
        tags
    }

    /// Snapshot of the tree under TOP.
    #[must_use]
    pub fn tree(&self, colors: &ColorMap) -> GroupNode {
        self.node(GroupId(CategoryId::TOP.index()), 1.0, colors)
    }

    /// Snapshots of the exclusion roots that received time.
    #[must_use]
    pub fn excluded(&self, colors: &ColorMap) -> Vec<GroupNode> {
        let mut roots: Vec<GroupNode> = self
            .root_ids()
            .into_iter()
            .filter(|id| id.0 != CategoryId::TOP.index() && self.groups[id.0].total_minutes > 0)
            .map(|id| self.node(id, 1.0, colors))
            .collect();
        roots.sort_by(|a, b| b.total_minutes.cmp(&a.total_minutes));
        roots
    }

    fn node(&self, id: GroupId, weight: f64, colors: &ColorMap) -> GroupNode {
        let group = &self.groups[id.0];
        let children = group
            .children
            .iter()
            .filter(|c| !self.groups[c.0].pruned)
            .map(|&c| {
                let edge = self.groups[c.0]
                    .parents
                    .iter()
                    .find(|p| p.group == id)
                    .map_or(1.0, |p| p.weight);
                self.node(c, edge, colors)
            })
            .collect();
        GroupNode {
            name: group.name.clone(),
            total_minutes: group.total_minutes,
            own_minutes: group.own_minutes(),
            weight,
            color: color::to_hex(colors.get(&group.name)),
            children,
        }
    }
}

/// Classifies every activity, then prunes.
///
/// Uncategorized activities do not stop the run: they are all collected and
/// returned together so the rule file can be fixed in one pass.
pub fn classify<'r, I>(
    rules: &'r Rules,
    activities: I,
    mut on_progress: impl FnMut(u8),
) -> Result<GroupSet<'r>, UncategorizedActivities>
where
    I: IntoIterator,
    I::IntoIter: ExactSizeIterator,
    I::Item: Borrow<Activity>,
{
    let activities = activities.into_iter();
    let total = activities.len();
    let mut set = GroupSet::new(rules);
    let mut errors = Vec::new();

    for (index, activity) in activities.enumerate() {
        if let Err(e) = set.categorize(activity.borrow()) {
            errors.push(e);
        }
        on_progress(progress_percent(index + 1, total));
    }
    on_progress(100);

    if !errors.is_empty() {
        tracing::warn!(count = errors.len(), "uncategorized activities");
        return Err(UncategorizedActivities::new(errors));
    }
    set.prune();
    tracing::info!(
        total_minutes = set.top().total_minutes,
        groups = set.iter().count(),
        "classified activities"
    );
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::compile_rules;
    use crate::time::Timestamp;

    fn rules(body: &str) -> Rules {
        compile_rules(&format!("[general]\nname = Test\n{body}")).unwrap()
    }

    fn activity(name: &str, hour: i64, minutes: Minute) -> Activity {
        let start = Timestamp::new(2024, 3, 15, hour, 0).unwrap();
        Activity::new(name, start, start + minutes)
    }

    fn total(set: &GroupSet<'_>, name: &str) -> Minute {
        set.get_by_name(name).map_or(0, |g| g.total_minutes)
    }

    // ========== Propagation ==========

    #[test]
    fn test_single_rule_reaches_top() {
        let rules = rules("[rules]\nWork.* = 100% Job\n");
        let activities = vec![activity("WorkMeeting", 9, 60)];
        let set = classify(&rules, &activities, |_| {}).unwrap();
        assert_eq!(total(&set, "Job"), 60);
        assert_eq!(total(&set, "WorkMeeting"), 60);
        assert_eq!(set.top().total_minutes, 60);
    }

    #[test]
    fn test_weighted_split_and_diamond() {
        let rules = rules("[rules]\nA = 50% X 50% Y\nX = Z\nY = Z\n");
        let activities = vec![activity("A", 9, 100)];
        let set = classify(&rules, &activities, |_| {}).unwrap();
        assert_eq!(total(&set, "X"), 50);
        assert_eq!(total(&set, "Y"), 50);
        assert_eq!(total(&set, "Z"), 100);
        assert_eq!(set.top().total_minutes, 100);
    }

    #[test]
    fn test_odd_minutes_split_never_exceed_logged_time() {
        let rules = rules("[rules]\nA = 50% X 50% Y\nX = Z\nY = Z\n");
        let activities = vec![activity("A", 9, 25)];
        let set = classify(&rules, &activities, |_| {}).unwrap();
        assert_eq!(total(&set, "X"), 12);
        assert_eq!(total(&set, "Y"), 12);
        assert_eq!(total(&set, "Z"), 24);
        assert_eq!(set.top().total_minutes, 24);
        assert!(set.top().total_minutes <= 25);
    }

    #[test]
    fn test_activity_named_after_category() {
        let rules = rules("[rules]\nWork = Job\n");
        let activities = vec![activity("job", 9, 45)];
        let set = classify(&rules, &activities, |_| {}).unwrap();
        let job = set.get_by_name("Job").unwrap();
        assert_eq!(job.total_minutes, 45);
        assert_eq!(job.activities.len(), 1);
        assert_eq!(set.top().total_minutes, 45);
    }

    #[test]
    fn test_repeated_activity_reuses_leaf() {
        let rules = rules("[rules]\nWork = Job\n");
        let activities = vec![activity("Work", 9, 30), activity("Work", 11, 30)];
        let set = classify(&rules, &activities, |_| {}).unwrap();
        let work = set.get_by_name("work").unwrap();
        assert_eq!(work.activities.len(), 2);
        assert_eq!(work.total_minutes, 60);
        assert_eq!(set.get_by_name("Job").unwrap().children.len(), 1);
    }

    // ========== Uncategorized ==========

    #[test]
    fn test_uncategorized_collected_per_occurrence() {
        let rules = rules("[rules]\nWork = Job\n");
        let activities = vec![
            activity("Foo", 8, 10),
            activity("Work", 9, 10),
            activity("Bar+1", 10, 10),
            activity("Foo", 11, 10),
        ];
        let err = classify(&rules, &activities, |_| {}).unwrap_err();
        assert_eq!(err.errors.len(), 3);
        assert_eq!(
            err.suggestions,
            vec![
                "Bar\\+1 = Uncategorized".to_string(),
                "Foo = Uncategorized".to_string()
            ]
        );
        assert_eq!(
            err.messages()[0],
            "unknown category for activity \"Foo\" at 2024-03-15 08:00"
        );
    }

    #[test]
    fn test_suggestions_compile_back() {
        let rules = rules("[rules]\nWork = Job\n");
        let activities = vec![activity("C++ (hobby)", 8, 10)];
        let err = classify(&rules, &activities, |_| {}).unwrap_err();
        let fixed = compile_rules(&format!(
            "[general]\nname = T\n[rules]\n{}\n",
            err.suggestions[0]
        ))
        .unwrap();
        assert!(fixed.associate("C++ (hobby)").is_some());
    }

    #[test]
    fn test_suggestions_with_hash_compile_back() {
        let rules = rules("[rules]\nWork = Job\n");
        let activities = vec![activity("Bug #12", 8, 10), activity("Call # 2", 9, 10)];
        let err = classify(&rules, &activities, |_| {}).unwrap_err();
        assert_eq!(
            err.suggestions,
            vec!["Bug .12 = Uncategorized", "Call . 2 = Uncategorized"]
        );
        let fixed = compile_rules(&format!(
            "[general]\nname = T\n[rules]\n{}\n",
            err.suggestions.join("\n")
        ))
        .unwrap();
        assert!(fixed.associate("Bug #12").is_some());
        assert!(fixed.associate("Call # 2").is_some());
    }

    // ========== Pruning ==========

    #[test]
    fn test_prune_removes_empty_and_sorts() {
        let rules = rules("[rules]\nA = Work\nB = Play\nC = Idle\n");
        let activities = vec![activity("A", 8, 30), activity("B", 9, 90)];
        let set = classify(&rules, &activities, |_| {}).unwrap();

        let names: Vec<&str> = set
            .top()
            .children
            .iter()
            .map(|&c| set.get(c).name.as_str())
            .collect();
        assert_eq!(names, vec!["Play", "Work"]);
        assert!(set.get_by_name("Idle").is_none());
        assert!(set.iter().all(|(_, g)| g.total_minutes >= 0));
        assert!(
            set.iter()
                .filter(|(_, g)| g.category != Some(CategoryId::TOP))
                .all(|(_, g)| g.total_minutes > 0)
        );
    }

    #[test]
    fn test_empty_input_keeps_only_top() {
        let rules = rules("[rules]\nA = Work\n");
        let set = classify(&rules, Vec::<Activity>::new(), |_| {}).unwrap();
        assert_eq!(set.top().total_minutes, 0);
        assert!(set.top().children.is_empty());
        assert_eq!(set.iter().count(), 1);
    }

    // ========== Exclusions and tags ==========

    #[test]
    fn test_excluded_time_does_not_reach_top() {
        let rules = rules("[rules]\nWork = Job\n[exclude]\nCommute = Transit\n");
        let activities = vec![activity("Work", 9, 60), activity("Commute", 8, 30)];
        let set = classify(&rules, &activities, |_| {}).unwrap();
        assert_eq!(set.top().total_minutes, 60);

        let excluded = set.excluded(&rules.colors);
        assert_eq!(excluded.len(), 1);
        assert_eq!(excluded[0].name, "Transit");
        assert_eq!(excluded[0].total_minutes, 30);
        assert_eq!(excluded[0].children[0].name, "Commute");
    }

    #[test]
    fn test_tags_accumulate_flatly() {
        let rules = rules("[rules]\nWork = Job #billable\nCall = Job #billable #phone\n#billable = #money\n");
        let activities = vec![activity("Work", 9, 60), activity("Call", 11, 15)];
        let set = classify(&rules, &activities, |_| {}).unwrap();
        let tags: Vec<(&str, Minute)> = set
            .tags()
            .iter()
            .map(|t| (t.name.as_str(), t.total_minutes))
            .collect();
        assert_eq!(tags, vec![("#billable", 75), ("#phone", 15)]);
    }

    #[test]
    fn test_find_groups_with_parent() {
        let rules = rules("[rules]\nWork = Job\nMail = Job\nGym = Sport\n");
        let activities = vec![
            activity("Work", 9, 60),
            activity("Mail", 10, 5),
            activity("Gym", 11, 30),
        ];
        let set = classify(&rules, &activities, |_| {}).unwrap();
        let job = rules.categories.find("Job").unwrap();
        let mut names: Vec<&str> = set
            .find_groups_with_parent(job)
            .iter()
            .map(|g| g.name.as_str())
            .collect();
        names.sort_unstable();
        assert_eq!(names, vec!["Mail", "Work"]);
    }

    #[test]
    fn test_tree_snapshot() {
        let rules = rules("[colors]\nJob = #336699\n[rules]\nWork = 75% Job 25% Fun\n");
        let activities = vec![activity("Work", 9, 120)];
        let set = classify(&rules, &activities, |_| {}).unwrap();
        let tree = set.tree(&rules.colors);

        assert_eq!(tree.name, "Everything");
        assert_eq!(tree.color, "#ffffff");
        assert_eq!(tree.total_minutes, 120);
        assert_eq!(tree.own_minutes, 0);
        let children: Vec<(&str, Minute, f64)> = tree
            .children
            .iter()
            .map(|c| (c.name.as_str(), c.total_minutes, c.weight))
            .collect();
        assert_eq!(children, vec![("Job", 90, 1.0), ("Fun", 30, 1.0)]);
        assert_eq!(tree.children[0].color, "#336699");
        let leaf = &tree.children[0].children[0];
        assert_eq!((leaf.name.as_str(), leaf.weight, leaf.own_minutes), ("Work", 0.75, 120));
    }

    #[test]
    fn test_tree_serializes() {
        let rules = rules("[rules]\nWork = Job\n");
        let activities = vec![activity("Work", 9, 30)];
        let set = classify(&rules, &activities, |_| {}).unwrap();
        let json = serde_json::to_value(set.tree(&rules.colors)).unwrap();
        assert_eq!(json["name"], "Everything");
        assert_eq!(json["total_minutes"], 30);
        assert_eq!(json["children"][0]["name"], "Job");
        assert_eq!(json["children"][0]["children"][0]["own_minutes"], 30);
    }

    #[test]
    fn test_progress_is_reported() {
        let rules = rules("[rules]\n.* = Any\n");
        let activities: Vec<Activity> = (0..4).map(|h| activity("X", h, 10)).collect();
        let mut seen = Vec::new();
        classify(&rules, &activities, |p| seen.push(p)).unwrap();
        assert_eq!(seen, vec![25, 50, 75, 100, 100]);
    }
}
