use crate::error::ProviderError;
use crate::time;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Instagram,
    Tiktok,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Youtube => "youtube",
            Platform::Instagram => "instagram",
            Platform::Tiktok => "tiktok",
        };
        f.write_str(name)
    }
}

/// Untyped key-value record as returned by a page script or an LLM extractor.
///
/// Raw records only live at the provider boundary; the orchestrator converts
/// them into [`Post`] and [`Comment`] before doing anything else with them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Map<String, Value>);

impl RawRecord {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Accepts only JSON objects.
    pub fn from_value(value: Value) -> Result<Self, ProviderError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(ProviderError::MalformedRecord {
                details: format!("expected an object, got {}", json_kind(&other)),
            }),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Non-blank string value for `key`. Numbers are rendered as text so that
    /// fields like `views` survive either representation.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Non-negative integer value for `key`, accepting `"1,234"` style strings.
    pub fn count(&self, key: &str) -> Option<u64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().replace(',', "").parse().ok(),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Post {
    pub url: String,
    pub title: Option<String>,
    pub views: Option<String>,
    /// Relative phrase exactly as the platform showed it.
    pub posted: Option<String>,
}

impl Post {
    pub fn from_raw(raw: &RawRecord) -> Result<Self, ProviderError> {
        let url = raw
            .text("url")
            .ok_or_else(|| ProviderError::MissingReference {
                details: match raw.text("title") {
                    Some(title) => format!("post '{}' has no url", title),
                    None => "post has no url".to_string(),
                },
            })?;

        url::Url::parse(&url).map_err(|e| ProviderError::MissingReference {
            details: format!("post url '{}' is not absolute: {}", url, e),
        })?;

        Ok(Self {
            url,
            title: raw.text("title"),
            views: raw.text("views"),
            posted: raw.text("posted"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
    pub id: String,
    pub author: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub reply_count: u64,
    pub platform: Platform,
    pub url: Option<String>,
    /// 1-based position on the page, used to target actions.
    pub position: usize,
    /// True when no stable platform id was available.
    pub synthesized_id: bool,
}

impl Comment {
    pub fn from_raw(
        raw: &RawRecord,
        position: usize,
        platform: Platform,
        reference: DateTime<Utc>,
        post_url: &str,
    ) -> Result<Self, ProviderError> {
        let author = raw.text("author").unwrap_or_else(|| "Unknown".to_string());
        let text = raw.text("text").unwrap_or_default();

        let (id, synthesized_id) = match raw.text("id") {
            Some(id) => (id, false),
            None if text.is_empty() && author == "Unknown" => {
                return Err(ProviderError::MalformedRecord {
                    details: format!("comment #{} has no id, author or text", position),
                });
            }
            None => (synthesize_comment_id(&author, &text, position), true),
        };

        let timestamp = match raw.text("timestamp") {
            Some(phrase) => time::normalize(&phrase, reference),
            None => reference,
        };

        Ok(Self {
            id,
            author,
            text,
            timestamp,
            reply_count: raw.count("reply_count").unwrap_or(0),
            platform,
            url: raw.text("url").or_else(|| Some(post_url.to_string())),
            position,
            synthesized_id,
        })
    }
}

/// Deterministic id for comments the page does not expose an id for.
///
/// Stable only while author, text and position stay the same between scrapes.
pub fn synthesize_comment_id(author: &str, text: &str, position: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(author.as_bytes());
    hasher.update([0x1f]);
    hasher.update(text.as_bytes());
    hasher.update([0x1f]);
    hasher.update(position.to_string().as_bytes());
    let digest = hasher.finalize();

    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("synth-{}", &hex[..16])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Like,
    Heart,
    Reply,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionType::Like => "like",
            ActionType::Heart => "heart",
            ActionType::Reply => "reply",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    #[serde(rename = "type")]
    pub kind: ActionType,
    /// Only meaningful for `reply`, which is accepted but never executed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

/// Where an action lands on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionTarget {
    pub position: usize,
    pub comment_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryKind {
    RecentDays,
    RecentPosts,
    AllPosts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnparsedTimePolicy {
    #[default]
    Exclude,
    Include,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    pub method: DiscoveryKind,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub on_unparsed_time: UnparsedTimePolicy,
}

/// Typed view of a discovery configuration: the limit only exists where the
/// method gives it a meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMethod {
    RecentDays { days: u32, on_unparsed: UnparsedTimePolicy },
    RecentPosts { count: u32 },
    AllPosts,
}

impl DiscoveryConfig {
    pub fn method(&self) -> DiscoveryMethod {
        match self.method {
            DiscoveryKind::RecentDays => DiscoveryMethod::RecentDays {
                days: self.limit,
                on_unparsed: self.on_unparsed_time,
            },
            DiscoveryKind::RecentPosts => DiscoveryMethod::RecentPosts { count: self.limit },
            DiscoveryKind::AllPosts => DiscoveryMethod::AllPosts,
        }
    }
}

fn default_max_comments_per_post() -> u32 {
    10
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
    #[serde(default = "default_max_comments_per_post")]
    pub max_comments_per_post: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    #[default]
    Script,
    Llm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    ListPosts,
    ListComments,
    Like,
    Heart,
}

impl ScriptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptKind::ListPosts => "list_posts",
            ScriptKind::ListComments => "list_comments",
            ScriptKind::Like => "like",
            ScriptKind::Heart => "heart",
        }
    }

    pub fn for_action(action: ActionType) -> Option<Self> {
        match action {
            ActionType::Like => Some(ScriptKind::Like),
            ActionType::Heart => Some(ScriptKind::Heart),
            ActionType::Reply => None,
        }
    }
}

/// Page scripts: inline JavaScript functions, or paths to `.js` files until
/// the configuration resolves them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileScripts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_posts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_comments: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart: Option<String>,
}

impl ProfileScripts {
    pub fn get(&self, kind: ScriptKind) -> Option<&str> {
        match kind {
            ScriptKind::ListPosts => self.list_posts.as_deref(),
            ScriptKind::ListComments => self.list_comments.as_deref(),
            ScriptKind::Like => self.like.as_deref(),
            ScriptKind::Heart => self.heart.as_deref(),
        }
    }

    pub fn get_mut(&mut self, kind: ScriptKind) -> &mut Option<String> {
        match kind {
            ScriptKind::ListPosts => &mut self.list_posts,
            ScriptKind::ListComments => &mut self.list_comments,
            ScriptKind::Like => &mut self.like,
            ScriptKind::Heart => &mut self.heart,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub platform: Platform,
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_profile_path: Option<std::path::PathBuf>,
    #[serde(default)]
    pub extraction: ExtractionMode,
    #[serde(default)]
    pub scripts: ProfileScripts,
}
