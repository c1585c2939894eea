//! Weighted category hierarchy and the flat tag hierarchy.
//!
//! Both are arenas addressed by index. A [`Category`] owns its weighted parent
//! edges; children are never stored and are derived by whoever needs them.
//! Tags mirror the same shape without weights.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use thiserror::Error;

/// Name of the root category.
pub const TOP_CATEGORY: &str = "Everything";

/// First character of every tag name, and the name of the root tag.
pub const TAG_SENTINEL: char = '#';

/// Tolerance on the sum of parent weights.
pub const WEIGHT_TOLERANCE: f64 = 0.001;

/// Errors when registering a node.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Two names differ only by case.
    #[error("ambiguous name: \"{requested}\" and \"{existing}\" only differ by case")]
    Ambiguous { existing: String, requested: String },

    /// A tag name does not start with the sentinel.
    #[error("tag name doesn't start with #: \"{name}\"")]
    NotATag { name: String },
}

/// Index of a category in its [`CategoryGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CategoryId(usize);

impl CategoryId {
    /// The root category.
    pub const TOP: Self = Self(0);

    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// A parent edge and its share of the child's time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeightedCategory {
    pub category: CategoryId,
    pub weight: f64,
}

impl WeightedCategory {
    #[must_use]
    pub const fn new(category: CategoryId, weight: f64) -> Self {
        Self { category, weight }
    }
}

/// A node of the category hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Category {
    pub name: String,
    pub parents: Vec<WeightedCategory>,
}

impl Category {
    /// True when the only parent is the root.
    #[must_use]
    pub fn is_top_level(&self) -> bool {
        matches!(self.parents.as_slice(), [only] if only.category == CategoryId::TOP)
    }

    /// Sum of the parent weights.
    #[must_use]
    pub fn weight_sum(&self) -> f64 {
        self.parents.iter().map(|p| p.weight).sum()
    }
}

/// Arena of categories, rooted at [`CategoryId::TOP`].
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryGraph {
    categories: Vec<Category>,
    by_name: HashMap<String, CategoryId>,
    by_folded: HashMap<String, CategoryId>,
}

impl Default for CategoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl CategoryGraph {
    /// Creates a graph holding only the root.
    #[must_use]
    pub fn new() -> Self {
        let mut graph = Self {
            categories: Vec::new(),
            by_name: HashMap::new(),
            by_folded: HashMap::new(),
        };
        graph.push(TOP_CATEGORY.to_string(), Vec::new());
        graph
    }

    fn push(&mut self, name: String, parents: Vec<WeightedCategory>) -> CategoryId {
        let id = CategoryId(self.categories.len());
        self.by_folded.insert(name.to_lowercase(), id);
        self.by_name.insert(name.clone(), id);
        self.categories.push(Category { name, parents });
        id
    }

    /// Registers a new category.
    ///
    /// Fails when another category already uses the same name up to case.
    pub fn insert(
        &mut self,
        name: &str,
        parents: Vec<WeightedCategory>,
    ) -> Result<CategoryId, GraphError> {
        if let Some(&existing) = self.by_folded.get(&name.to_lowercase()) {
            return Err(GraphError::Ambiguous {
                existing: self.name(existing).to_string(),
                requested: name.to_string(),
            });
        }
        Ok(self.push(name.to_string(), parents))
    }

    /// Looks a category up by its exact name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<CategoryId> {
        self.by_name.get(name).copied()
    }

    /// Looks a category up ignoring case.
    #[must_use]
    pub fn find_folded(&self, name: &str) -> Option<CategoryId> {
        self.by_folded.get(&name.to_lowercase()).copied()
    }

    #[must_use]
    pub fn get(&self, id: CategoryId) -> &Category {
        &self.categories[id.0]
    }

    #[must_use]
    pub fn name(&self, id: CategoryId) -> &str {
        &self.categories[id.0].name
    }

    /// Replaces the parent edges of a category.
    pub fn set_parents(&mut self, id: CategoryId, parents: Vec<WeightedCategory>) {
        self.categories[id.0].parents = parents;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Iterates categories in creation order, root first.
    pub fn iter(&self) -> impl Iterator<Item = (CategoryId, &Category)> {
        self.categories
            .iter()
            .enumerate()
            .map(|(i, c)| (CategoryId(i), c))
    }

    /// Searches the ancestors of `id` for a path leading back to `id`.
    ///
    /// Returns the path from a direct parent to `id` itself, both included.
    #[must_use]
    pub fn find_cycle(&self, id: CategoryId) -> Option<Vec<CategoryId>> {
        cycle_path(id.0, |i| {
            self.categories[i]
                .parents
                .iter()
                .map(|p| p.category.0)
                .collect()
        })
        .map(|path| path.into_iter().map(CategoryId).collect())
    }

    /// Renders a path as `A → B → C`.
    #[must_use]
    pub fn describe_path(&self, path: &[CategoryId]) -> String {
        path.iter()
            .map(|&id| self.name(id))
            .collect::<Vec<_>>()
            .join(" → ")
    }
}

/// Index of a tag in its [`TagGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TagId(usize);

impl TagId {
    /// The root tag.
    pub const TOP: Self = Self(0);

    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// A node of the tag hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub name: String,
    pub parents: Vec<TagId>,
}

impl Tag {
    #[must_use]
    pub fn is_top_level(&self) -> bool {
        self.parents.len() == 1 && self.parents[0] == TagId::TOP
    }
}

/// Arena of tags, rooted at [`TagId::TOP`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagGraph {
    tags: Vec<Tag>,
    by_name: HashMap<String, TagId>,
    by_folded: HashMap<String, TagId>,
}

impl Default for TagGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl TagGraph {
    #[must_use]
    pub fn new() -> Self {
        let mut graph = Self {
            tags: Vec::new(),
            by_name: HashMap::new(),
            by_folded: HashMap::new(),
        };
        graph.push(TAG_SENTINEL.to_string(), Vec::new());
        graph
    }

    fn push(&mut self, name: String, parents: Vec<TagId>) -> TagId {
        let id = TagId(self.tags.len());
        self.by_folded.insert(name.to_lowercase(), id);
        self.by_name.insert(name.clone(), id);
        self.tags.push(Tag { name, parents });
        id
    }

    /// Registers a new tag.
    pub fn insert(&mut self, name: &str, parents: Vec<TagId>) -> Result<TagId, GraphError> {
        if !name.starts_with(TAG_SENTINEL) {
            return Err(GraphError::NotATag {
                name: name.to_string(),
            });
        }
        if let Some(&existing) = self.by_folded.get(&name.to_lowercase()) {
            return Err(GraphError::Ambiguous {
                existing: self.name(existing).to_string(),
                requested: name.to_string(),
            });
        }
        Ok(self.push(name.to_string(), parents))
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<TagId> {
        self.by_name.get(name).copied()
    }

    #[must_use]
    pub fn get(&self, id: TagId) -> &Tag {
        &self.tags[id.0]
    }

    #[must_use]
    pub fn name(&self, id: TagId) -> &str {
        &self.tags[id.0].name
    }

    pub fn set_parents(&mut self, id: TagId, parents: Vec<TagId>) {
        self.tags[id.0].parents = parents;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TagId, &Tag)> {
        self.tags.iter().enumerate().map(|(i, t)| (TagId(i), t))
    }

    #[must_use]
    pub fn find_cycle(&self, id: TagId) -> Option<Vec<TagId>> {
        cycle_path(id.0, |i| self.tags[i].parents.iter().map(|p| p.0).collect())
            .map(|path| path.into_iter().map(TagId).collect())
    }

    #[must_use]
    pub fn describe_path(&self, path: &[TagId]) -> String {
        path.iter()
            .map(|&id| self.name(id))
            .collect::<Vec<_>>()
            .join(" → ")
    }
}

/// Depth-first search from the parents of `needle` back to `needle`.
fn cycle_path(needle: usize, parents_of: impl Fn(usize) -> Vec<usize>) -> Option<Vec<usize>> {
    fn walk(
        node: usize,
        needle: usize,
        parents_of: &impl Fn(usize) -> Vec<usize>,
        visited: &mut HashSet<usize>,
        path: &mut Vec<usize>,
    ) -> bool {
        path.push(node);
        if node == needle {
            return true;
        }
        if visited.insert(node) {
            for parent in parents_of(node) {
                if walk(parent, needle, parents_of, visited, path) {
                    return true;
                }
            }
        }
        path.pop();
        false
    }

    let mut visited = HashSet::new();
    let mut path = Vec::new();
    for parent in parents_of(needle) {
        if walk(parent, needle, &parents_of, &mut visited, &mut path) {
            return Some(path);
        }
    }
    None
}
