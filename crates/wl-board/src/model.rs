// model.rs — Rows of the wanted board: items, completions and stamps.
//
// These mirror the three tables of a commons database (`wanted`,
// `completions`, `stamps`). Constructors validate input so that a value of
// one of these types is always well-formed; lifecycle changes go through
// `transition::validate_transition`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BoardError, Result};
use crate::ids;

/// Lifecycle status of a wanted item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Open,
    Claimed,
    InReview,
    Completed,
    Withdrawn,
}

impl ItemStatus {
    /// `completed` and `withdrawn` accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Withdrawn)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Open => "open",
            ItemStatus::Claimed => "claimed",
            ItemStatus::InReview => "in_review",
            ItemStatus::Completed => "completed",
            ItemStatus::Withdrawn => "withdrawn",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "open" => Ok(ItemStatus::Open),
            "claimed" => Ok(ItemStatus::Claimed),
            "in_review" => Ok(ItemStatus::InReview),
            "completed" => Ok(ItemStatus::Completed),
            "withdrawn" => Ok(ItemStatus::Withdrawn),
            other => Err(BoardError::Invalid {
                field: "status",
                reason: format!("unknown status '{}'", other),
            }),
        }
    }
}

/// Rough size of a wanted item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EffortLevel {
    Trivial,
    Small,
    Medium,
    Large,
    Epic,
}

impl EffortLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            EffortLevel::Trivial => "trivial",
            EffortLevel::Small => "small",
            EffortLevel::Medium => "medium",
            EffortLevel::Large => "large",
            EffortLevel::Epic => "epic",
        }
    }
}

impl fmt::Display for EffortLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EffortLevel {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "trivial" => Ok(EffortLevel::Trivial),
            "small" => Ok(EffortLevel::Small),
            "medium" => Ok(EffortLevel::Medium),
            "large" => Ok(EffortLevel::Large),
            "epic" => Ok(EffortLevel::Epic),
            other => Err(BoardError::Invalid {
                field: "effort",
                reason: format!(
                    "'{}' (expected trivial, small, medium, large or epic)",
                    other
                ),
            }),
        }
    }
}

/// Classification of a wanted item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Feature,
    Bug,
    Design,
    Rfc,
    Docs,
    Research,
    Community,
}

impl ItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemType::Feature => "feature",
            ItemType::Bug => "bug",
            ItemType::Design => "design",
            ItemType::Rfc => "rfc",
            ItemType::Docs => "docs",
            ItemType::Research => "research",
            ItemType::Community => "community",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "feature" => Ok(ItemType::Feature),
            "bug" => Ok(ItemType::Bug),
            "design" => Ok(ItemType::Design),
            "rfc" => Ok(ItemType::Rfc),
            "docs" => Ok(ItemType::Docs),
            "research" => Ok(ItemType::Research),
            "community" => Ok(ItemType::Community),
            other => Err(BoardError::Invalid {
                field: "type",
                reason: format!("unknown item type '{}'", other),
            }),
        }
    }
}

/// Highest (least urgent) priority value. 0 is most urgent.
pub const MAX_PRIORITY: u8 = 4;

fn check_priority(priority: u8) -> Result<u8> {
    if priority > MAX_PRIORITY {
        return Err(BoardError::Invalid {
            field: "priority",
            reason: format!("{} is out of range 0-{}", priority, MAX_PRIORITY),
        });
    }
    Ok(priority)
}

/// A unit of work posted to the commons.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub item_type: ItemType,
    pub priority: u8,
    pub effort_level: EffortLevel,
    #[serde(default)]
    pub tags: Vec<String>,
    /// The rig that owns the item.
    pub posted_by: String,
    /// The rig currently holding the item, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for posting a new item.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub title: String,
    pub description: String,
    pub project: Option<String>,
    pub item_type: ItemType,
    pub priority: u8,
    pub effort_level: EffortLevel,
    pub tags: Vec<String>,
}

impl NewItem {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            project: None,
            item_type: ItemType::Feature,
            priority: 2,
            effort_level: EffortLevel::Medium,
            tags: Vec::new(),
        }
    }
}

/// Field edits applied by `update`. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ItemUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub project: Option<String>,
    pub item_type: Option<ItemType>,
    pub priority: Option<u8>,
    pub effort_level: Option<EffortLevel>,
    pub tags: Option<Vec<String>>,
}

impl ItemUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.project.is_none()
            && self.item_type.is_none()
            && self.priority.is_none()
            && self.effort_level.is_none()
            && self.tags.is_none()
    }
}

impl WorkItem {
    /// Build a new open item posted by `poster`. The id is derived from the
    /// title, poster and creation time.
    pub fn post(input: NewItem, poster: &str, now: DateTime<Utc>) -> Result<Self> {
        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(BoardError::Missing("title"));
        }
        if poster.trim().is_empty() {
            return Err(BoardError::Missing("rig handle"));
        }
        let priority = check_priority(input.priority)?;
        Ok(Self {
            id: ids::item_id(&title, poster, now),
            title,
            description: input.description,
            project: input.project.filter(|p| !p.trim().is_empty()),
            item_type: input.item_type,
            priority,
            effort_level: input.effort_level,
            tags: normalize_tags(input.tags),
            posted_by: poster.to_string(),
            claimed_by: None,
            status: ItemStatus::Open,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply field edits. Validation happens before any field is touched.
    pub fn apply_update(&mut self, update: ItemUpdate, now: DateTime<Utc>) -> Result<()> {
        if update.is_empty() {
            return Err(BoardError::Invalid {
                field: "update",
                reason: "no fields to change".to_string(),
            });
        }
        let title = match update.title {
            Some(t) if t.trim().is_empty() => return Err(BoardError::Missing("title")),
            Some(t) => Some(t.trim().to_string()),
            None => None,
        };
        let priority = update.priority.map(check_priority).transpose()?;

        if let Some(t) = title {
            self.title = t;
        }
        if let Some(d) = update.description {
            self.description = d;
        }
        if let Some(p) = update.project {
            self.project = Some(p).filter(|p| !p.trim().is_empty());
        }
        if let Some(t) = update.item_type {
            self.item_type = t;
        }
        if let Some(p) = priority {
            self.priority = p;
        }
        if let Some(e) = update.effort_level {
            self.effort_level = e;
        }
        if let Some(tags) = update.tags {
            self.tags = normalize_tags(tags);
        }
        self.updated_at = now;
        Ok(())
    }
}

fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = tags
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Evidence submitted against an item when it moves to `in_review`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionRecord {
    pub id: String,
    pub wanted_id: String,
    pub completed_by: String,
    pub evidence: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stamp_id: Option<String>,
    pub completed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated_at: Option<DateTime<Utc>>,
}

impl CompletionRecord {
    pub fn new(
        wanted_id: &str,
        completed_by: &str,
        evidence: &str,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let evidence = evidence.trim();
        if evidence.is_empty() {
            return Err(BoardError::Missing("evidence"));
        }
        Ok(Self {
            id: ids::completion_id(wanted_id, completed_by, now),
            wanted_id: wanted_id.to_string(),
            completed_by: completed_by.to_string(),
            evidence: evidence.to_string(),
            validated_by: None,
            stamp_id: None,
            completed_at: now,
            validated_at: None,
        })
    }
}

/// How much weight a stamp carries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Leaf,
    Branch,
    Root,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Leaf => "leaf",
            Severity::Branch => "branch",
            Severity::Root => "root",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "leaf" => Ok(Severity::Leaf),
            "branch" => Ok(Severity::Branch),
            "root" => Ok(Severity::Root),
            other => Err(BoardError::Invalid {
                field: "severity",
                reason: format!("'{}' (expected leaf, branch or root)", other),
            }),
        }
    }
}

/// Ratings and annotations given when accepting a completion.
#[derive(Debug, Clone)]
pub struct StampInput {
    pub quality: u8,
    pub reliability: u8,
    pub severity: Severity,
    pub skill_tags: Vec<String>,
    pub message: Option<String>,
}

impl StampInput {
    pub fn new(quality: u8) -> Self {
        Self {
            quality,
            reliability: quality,
            severity: Severity::Leaf,
            skill_tags: Vec::new(),
            message: None,
        }
    }

    /// Check the ratings without building a stamp.
    pub fn validate(&self) -> Result<()> {
        check_rating("quality", self.quality)?;
        check_rating("reliability", self.reliability)?;
        Ok(())
    }
}

/// Valid range for quality and reliability ratings.
pub const RATING_RANGE: std::ops::RangeInclusive<u8> = 1..=5;

fn check_rating(field: &'static str, value: u8) -> Result<u8> {
    if !RATING_RANGE.contains(&value) {
        return Err(BoardError::Invalid {
            field,
            reason: format!("{} is out of range 1-5", value),
        });
    }
    Ok(value)
}

/// A reputation assertion made by one rig about another.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stamp {
    pub id: String,
    pub author: String,
    pub subject: String,
    pub quality: u8,
    pub reliability: u8,
    pub severity: Severity,
    /// The wanted item this stamp was issued for.
    pub context_id: String,
    #[serde(default)]
    pub skill_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Stamp {
    pub fn new(
        author: &str,
        subject: &str,
        context_id: &str,
        input: StampInput,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if author == subject {
            return Err(BoardError::SelfStamp(author.to_string()));
        }
        let quality = check_rating("quality", input.quality)?;
        let reliability = check_rating("reliability", input.reliability)?;
        Ok(Self {
            id: ids::stamp_id(author, subject, context_id, now),
            author: author.to_string(),
            subject: subject.to_string(),
            quality,
            reliability,
            severity: input.severity,
            context_id: context_id.to_string(),
            skill_tags: normalize_tags(input.skill_tags),
            message: input.message.filter(|m| !m.trim().is_empty()),
            created_at: now,
        })
    }
}
