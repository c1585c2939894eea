//! Rule file compiler.
//!
//! A rule file is line oriented and split in sections:
//!
//! ```text
//! [general]
//! name = Default
//! include common.grc
//!
//! [colors]
//! Work = #3366CC
//!
//! [rules/i]
//! Meeting.* = Work #billable
//! Reading = 50% Leisure 50% Learning
//! Chores\+Music = 50% 50%
//! #billable = #money
//!
//! [exclude]
//! Commute = Transit
//! ```
//!
//! Every `rules` line is `pattern = ... = pattern = classification`: each
//! pattern becomes its own [`Assoc`] with the same classification. Patterns
//! must match an activity name entirely; the first matching association in
//! file order wins, and exclusions are tried after every regular rule.
//!
//! While compiling, categories named on the right-hand side are created on
//! demand, and any existing top-level category whose name matches a later
//! rule's pattern is re-parented under that rule's categories. This is how
//! `Work = Life` moves a previously created `Work` category under `Life`.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use thiserror::Error;

use crate::category::{
    CategoryGraph, CategoryId, GraphError, TAG_SENTINEL, TOP_CATEGORY, TagGraph, TagId,
    WEIGHT_TOLERANCE, WeightedCategory,
};
use crate::color::{self, ColorMap, Rgb, WHITE};
use crate::progress_percent;

static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*#\s+.*").unwrap());
static SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[([^\]/]+)(/i)?\]$").unwrap());
static GENERAL_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^name\s*=\s*(.+)$").unwrap());
static GENERAL_IGNORED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:mode\s*=|include\s)").unwrap());
static INCLUDE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^include\s+(.+)$").unwrap());
static COLOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^=]+?)\s*=\s*(#[0-9A-Fa-f]{6})$").unwrap());
static EQUALS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+=\s+").unwrap());
static END_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*(#\S+)$").unwrap());
static PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)%$").unwrap());
static PLUS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\\?\+").unwrap());

/// Errors from compiling a rule file.
#[derive(Debug, Error)]
pub enum RuleError {
    /// The rule file does not follow the grammar.
    #[error("illegal rule format: {0}")]
    IllegalRuleFormat(String),

    /// Re-parenting a category or tag would create a cycle.
    #[error("cyclic rules: {0}")]
    CyclicRule(String),

    /// An included file could not be read.
    #[error("failed to include \"{path}\"")]
    Include {
        path: String,
        #[source]
        source: io::Error,
    },
}

fn illegal(line: usize, message: impl std::fmt::Display) -> RuleError {
    RuleError::IllegalRuleFormat(format!("line {line}: {message}"))
}

/// One compiled rule: a pattern and what it classifies into.
#[derive(Debug, Clone)]
pub struct Assoc {
    /// Anchored pattern matched against whole activity names.
    pub pattern: Regex,
    /// The pattern as written in the rule file.
    pub source: String,
    pub categories: Vec<WeightedCategory>,
    pub tags: Vec<TagId>,
}

impl Assoc {
    /// True when the pattern matches the entire name.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.pattern.is_match(name)
    }
}

/// A compiled rule file.
#[derive(Debug, Clone)]
pub struct Rules {
    pub name: String,
    /// Regular rules in file order, then exclusions.
    pub associations: Vec<Assoc>,
    pub categories: CategoryGraph,
    pub tags: TagGraph,
    pub colors: ColorMap,
}

impl Rules {
    /// Returns the first association whose pattern matches `name`.
    #[must_use]
    pub fn associate(&self, name: &str) -> Option<&Assoc> {
        self.associations.iter().find(|a| a.matches(name))
    }
}

/// Compiles a rule file.
pub fn compile_rules(text: &str) -> Result<Rules, RuleError> {
    compile_rules_with_progress(text, |_| {})
}

/// Compiles a rule file, reporting progress as a percentage of lines read.
pub fn compile_rules_with_progress(
    text: &str,
    mut on_progress: impl FnMut(u8),
) -> Result<Rules, RuleError> {
    let lines: Vec<&str> = text.lines().collect();
    let total = lines.len().max(1);
    let mut compiler = Compiler::default();

    for (index, raw) in lines.iter().enumerate() {
        compiler.line(index + 1, raw)?;
        on_progress(progress_percent(index + 1, total));
    }
    on_progress(100);

    compiler.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Section {
    #[default]
    Initial,
    General,
    Colors,
    Rules,
    Counters,
    Markers,
    Exclude,
}

impl Section {
    fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "general" => Some(Self::General),
            "colors" => Some(Self::Colors),
            "collapse" | "rules" => Some(Self::Rules),
            "counters" => Some(Self::Counters),
            "markers" => Some(Self::Markers),
            "exclude" => Some(Self::Exclude),
            _ => None,
        }
    }
}

/// A category name with its share, before resolution.
#[derive(Debug, Clone, PartialEq)]
struct WeightedName {
    name: String,
    weight: f64,
}

#[derive(Debug, Default)]
struct Compiler {
    section: Section,
    case_insensitive: bool,
    name: Option<String>,
    colors: HashMap<String, Rgb>,
    categories: CategoryGraph,
    tags: TagGraph,
    associations: Vec<Assoc>,
    exclusions: Vec<Assoc>,
}

impl Compiler {
    fn line(&mut self, number: usize, raw: &str) -> Result<(), RuleError> {
        let stripped = COMMENT_RE.replace_all(raw, "");
        let entry = stripped.trim();
        if entry.is_empty() {
            return Ok(());
        }

        if let Some(caps) = SECTION_RE.captures(entry) {
            self.section = Section::parse(&caps[1])
                .ok_or_else(|| illegal(number, format!("unknown section {entry}")))?;
            self.case_insensitive = caps.get(2).is_some();
            tracing::debug!(line = number, section = ?self.section, case_insensitive = self.case_insensitive, "entering section");
            return Ok(());
        }

        match self.section {
            Section::Initial => Err(illegal(
                number,
                format!("must start with a section, not \"{raw}\""),
            )),
            Section::General => {
                if let Some(caps) = GENERAL_NAME_RE.captures(entry) {
                    self.name = Some(caps[1].trim().to_string());
                } else if !GENERAL_IGNORED_RE.is_match(entry) {
                    tracing::debug!(line = number, entry, "ignoring unknown general directive");
                }
                Ok(())
            }
            Section::Colors => {
                let caps = COLOR_RE.captures(entry).ok_or_else(|| {
                    illegal(number, format!("malformed color entry in color section: {entry}"))
                })?;
                let rgb = color::parse_hex(&caps[2])
                    .ok_or_else(|| illegal(number, format!("malformed color: {}", &caps[2])))?;
                self.colors.insert(caps[1].trim().to_string(), rgb);
                Ok(())
            }
            // Parsed but inert.
            Section::Counters | Section::Markers => Ok(()),
            Section::Rules => {
                let (patterns, classification) = split_rule(number, entry)?;
                for pattern in patterns {
                    self.associate(number, pattern, classification)?;
                }
                Ok(())
            }
            Section::Exclude => {
                let (patterns, classification) = split_rule(number, entry)?;
                for pattern in patterns {
                    self.exclude(number, pattern, classification)?;
                }
                Ok(())
            }
        }
    }

    fn build_pattern(&self, number: usize, entry: &str) -> Result<Regex, RuleError> {
        RegexBuilder::new(&format!("^(?:{entry})$"))
            .case_insensitive(self.case_insensitive)
            .build()
            .map_err(|e| illegal(number, format!("invalid pattern \"{entry}\": {e}")))
    }

    fn associate(
        &mut self,
        number: usize,
        pattern_src: &str,
        classification: &str,
    ) -> Result<(), RuleError> {
        let pattern = self.build_pattern(number, pattern_src)?;
        let defines_tag = match pattern_src.find(TAG_SENTINEL) {
            None => false,
            Some(0) => true,
            Some(_) => {
                return Err(illegal(
                    number,
                    format!("can't match on # unless defining a tag: {pattern_src}"),
                ));
            }
        };

        let (category_text, tag_names) = split_tags(classification);
        let weighted = if category_text.is_empty() {
            Vec::new()
        } else {
            parse_categories(number, pattern_src, &category_text)?
        };
        if defines_tag && !weighted.is_empty() {
            return Err(illegal(
                number,
                format!("tags can only be classified as other tags: {pattern_src} = {classification}"),
            ));
        }
        if !defines_tag && weighted.is_empty() {
            return Err(illegal(
                number,
                format!("no category for {pattern_src}: \"{classification}\""),
            ));
        }

        let mut parents = Vec::with_capacity(weighted.len());
        for w in &weighted {
            let id = match self.categories.find(&w.name) {
                Some(id) => id,
                None => self.make_category(number, &w.name)?,
            };
            parents.push(WeightedCategory::new(id, w.weight));
        }
        if !parents.is_empty() {
            self.reparent_categories(pattern_src, &pattern, &parents)?;
        }

        let mut tags = Vec::with_capacity(tag_names.len());
        for name in &tag_names {
            let id = match self.tags.find(name) {
                Some(id) => id,
                None => self.make_tag(number, name)?,
            };
            tags.push(id);
        }
        if defines_tag {
            self.reparent_tags(pattern_src, &pattern, &tags)?;
        }

        self.associations.push(Assoc {
            pattern,
            source: pattern_src.to_string(),
            categories: parents,
            tags,
        });
        Ok(())
    }

    fn exclude(
        &mut self,
        number: usize,
        pattern_src: &str,
        classification: &str,
    ) -> Result<(), RuleError> {
        let pattern = self.build_pattern(number, pattern_src)?;
        // A new exclusion category has no parent at all, so its time never
        // reaches the root.
        let id = match self.categories.find(classification) {
            Some(id) => id,
            None => self
                .categories
                .insert(classification, Vec::new())
                .map_err(|e| graph_error(number, &e))?,
        };
        self.exclusions.push(Assoc {
            pattern,
            source: pattern_src.to_string(),
            categories: vec![WeightedCategory::new(id, 1.0)],
            tags: Vec::new(),
        });
        Ok(())
    }

    /// Creates a category under the first earlier rule matching its name, or
    /// under the root.
    fn make_category(&mut self, number: usize, name: &str) -> Result<CategoryId, RuleError> {
        let parents = self
            .associations
            .iter()
            .find(|a| !a.categories.is_empty() && a.matches(name))
            .map_or_else(
                || vec![WeightedCategory::new(CategoryId::TOP, 1.0)],
                |a| a.categories.clone(),
            );
        tracing::debug!(category = name, "creating category");
        self.categories
            .insert(name, parents)
            .map_err(|e| graph_error(number, &e))
    }

    fn make_tag(&mut self, number: usize, name: &str) -> Result<TagId, RuleError> {
        let parents = self
            .associations
            .iter()
            .find(|a| !a.tags.is_empty() && a.matches(name))
            .map_or_else(|| vec![TagId::TOP], |a| a.tags.clone());
        tracing::debug!(tag = name, "creating tag");
        self.tags
            .insert(name, parents)
            .map_err(|e| graph_error(number, &e))
    }

    fn reparent_categories(
        &mut self,
        pattern_src: &str,
        pattern: &Regex,
        parents: &[WeightedCategory],
    ) -> Result<(), RuleError> {
        let targets: HashSet<CategoryId> = parents.iter().map(|p| p.category).collect();
        let candidates: Vec<CategoryId> = self
            .categories
            .iter()
            .filter(|(id, c)| c.is_top_level() && !targets.contains(id) && pattern.is_match(&c.name))
            .map(|(id, _)| id)
            .collect();

        for id in candidates {
            self.categories.set_parents(id, parents.to_vec());
            if let Some(path) = self.categories.find_cycle(id) {
                return Err(RuleError::CyclicRule(format!(
                    "{} matches {} → {}",
                    self.categories.name(id),
                    pattern_src,
                    self.categories.describe_path(&path)
                )));
            }
            tracing::debug!(category = self.categories.name(id), pattern = pattern_src, "re-parented category");
        }
        Ok(())
    }

    fn reparent_tags(
        &mut self,
        pattern_src: &str,
        pattern: &Regex,
        parents: &[TagId],
    ) -> Result<(), RuleError> {
        let candidates: Vec<TagId> = self
            .tags
            .iter()
            .filter(|(id, t)| t.is_top_level() && !parents.contains(id) && pattern.is_match(&t.name))
            .map(|(id, _)| id)
            .collect();

        for id in candidates {
            self.tags.set_parents(id, parents.to_vec());
            if let Some(path) = self.tags.find_cycle(id) {
                return Err(RuleError::CyclicRule(format!(
                    "{} matches {} → {}",
                    self.tags.name(id),
                    pattern_src,
                    self.tags.describe_path(&path)
                )));
            }
            tracing::debug!(tag = self.tags.name(id), pattern = pattern_src, "re-parented tag");
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Rules, RuleError> {
        let name = self.name.ok_or_else(|| {
            RuleError::IllegalRuleFormat(
                "no name for this set of rules, add [general] name = ...".to_string(),
            )
        })?;
        self.colors.insert(TOP_CATEGORY.to_string(), WHITE);
        self.associations.append(&mut self.exclusions);

        tracing::info!(
            name,
            associations = self.associations.len(),
            categories = self.categories.len(),
            tags = self.tags.len(),
            "compiled rules"
        );

        Ok(Rules {
            name,
            associations: self.associations,
            categories: self.categories,
            tags: self.tags,
            colors: ColorMap::new(self.colors),
        })
    }
}

fn graph_error(number: usize, e: &GraphError) -> RuleError {
    illegal(number, e)
}

/// Splits `a = b = classification` into its patterns and classification.
fn split_rule(number: usize, entry: &str) -> Result<(Vec<&str>, &str), RuleError> {
    let mut parts: Vec<&str> = EQUALS_RE.split(entry).collect();
    if parts.len() < 2 {
        return Err(illegal(
            number,
            format!("expected \"pattern = classification\", got \"{entry}\""),
        ));
    }
    let classification = parts.pop().unwrap_or_default();
    Ok((parts, classification))
}

/// Peels trailing `#tag` tokens off a classification.
fn split_tags(classification: &str) -> (String, Vec<String>) {
    let mut rest = classification.trim();
    let mut tags = Vec::new();
    while let Some(caps) = END_TAG_RE.captures(rest) {
        tags.push(caps[1].to_string());
        let start = caps.get(0).map_or(rest.len(), |m| m.start());
        rest = &rest[..start];
    }
    tags.reverse();
    (rest.trim().to_string(), tags)
}

fn parse_percent(token: &str) -> Option<f64> {
    PERCENT_RE
        .captures(token)
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .map(|p| p / 100.0)
}

/// Parses the category half of a classification.
fn parse_categories(
    number: usize,
    pattern_src: &str,
    entry: &str,
) -> Result<Vec<WeightedName>, RuleError> {
    let tokens: Vec<&str> = entry.split_whitespace().collect();
    let weights: Vec<Option<f64>> = tokens.iter().map(|t| parse_percent(t)).collect();

    let parsed = if weights.iter().all(Option::is_some) {
        // `A\+B = 30% 70%`: names come from the pattern itself.
        let names: Vec<&str> = PLUS_RE.split(pattern_src).map(str::trim).collect();
        if names.len() != weights.len() {
            return Err(illegal(
                number,
                format!(
                    "can only omit category names when the pattern is a '+'-separated list of the same size: {pattern_src} <> {entry}"
                ),
            ));
        }
        names
            .into_iter()
            .zip(weights.into_iter().flatten())
            .map(|(name, weight)| WeightedName {
                name: name.to_string(),
                weight,
            })
            .collect()
    } else if weights[0].is_some() {
        let mut parsed: Vec<WeightedName> = Vec::new();
        for (token, weight) in tokens.iter().zip(&weights) {
            match (weight, parsed.last_mut()) {
                (Some(weight), _) => parsed.push(WeightedName {
                    name: String::new(),
                    weight: *weight,
                }),
                (None, Some(last)) => {
                    if !last.name.is_empty() {
                        last.name.push(' ');
                    }
                    last.name.push_str(token);
                }
                (None, None) => unreachable!("first token is a percentage"),
            }
        }
        if parsed.iter().any(|w| w.name.is_empty()) {
            return Err(illegal(
                number,
                format!("percentage without a category name: {entry}"),
            ));
        }
        parsed
    } else if weights.iter().any(Option::is_some) {
        return Err(illegal(
            number,
            format!("expected \"NN% Name\" pairs or a single name: {entry}"),
        ));
    } else {
        vec![WeightedName {
            name: entry.to_string(),
            weight: 1.0,
        }]
    };

    let total: f64 = parsed.iter().map(|w| w.weight).sum();
    if (total - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(illegal(
            number,
            format!("percentages don't add to 100% ({:.1}%): {entry}", total * 100.0),
        ));
    }
    Ok(parsed)
}

/// Inlines `include <path>` directives of `[general]` sections.
///
/// `resolve` receives the path as written and returns the file content.
/// Included text is expanded recursively; the section that was active at the
/// include is re-opened afterwards so the rest of the including file keeps
/// its meaning.
pub fn expand_includes(
    text: &str,
    mut resolve: impl FnMut(&str) -> io::Result<String>,
) -> Result<String, RuleError> {
    let mut stack = Vec::new();
    expand_into(text, &mut resolve, &mut stack)
}

fn expand_into(
    text: &str,
    resolve: &mut impl FnMut(&str) -> io::Result<String>,
    stack: &mut Vec<String>,
) -> Result<String, RuleError> {
    let mut out = String::with_capacity(text.len());
    let mut header: Option<String> = None;
    let mut in_general = false;

    for raw in text.lines() {
        let stripped = COMMENT_RE.replace_all(raw, "");
        let entry = stripped.trim();

        if let Some(caps) = SECTION_RE.captures(entry) {
            in_general = caps[1].eq_ignore_ascii_case("general");
            header = Some(entry.to_string());
        } else if in_general {
            if let Some(caps) = INCLUDE_RE.captures(entry) {
                let path = caps[1].trim().to_string();
                if stack.contains(&path) {
                    return Err(RuleError::IllegalRuleFormat(format!(
                        "include cycle: {} → {path}",
                        stack.join(" → ")
                    )));
                }
                tracing::debug!(path, "including rule file");
                let included = resolve(&path).map_err(|source| RuleError::Include {
                    path: path.clone(),
                    source,
                })?;
                stack.push(path);
                let expanded = expand_into(&included, resolve, stack)?;
                stack.pop();

                out.push_str(&expanded);
                if !expanded.ends_with('\n') {
                    out.push('\n');
                }
                if let Some(header) = &header {
                    out.push_str(header);
                    out.push('\n');
                }
                continue;
            }
        }
        out.push_str(raw);
        out.push('\n');
    }
    Ok(out)
}
