//! Run and step status model.
//!
//! A [`Run`] is the client-side copy of one pipeline execution. It is only ever
//! replaced wholesale by a fresher snapshot, never patched field by field.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::identifiers::{ModelId, RunId};

/// File inside a run's artifact listing that holds the serialized [`Run`].
pub const RUN_FILE: &str = "run.json";

/// File the backend writes when the background pipeline task crashed.
pub const ERROR_FILE: &str = "error.txt";

/// Artifact filename to full text content.
pub type RunFiles = BTreeMap<String, String>;

/// One stage of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepName {
    Analyst,
    Manual,
    Autotests,
    Standards,
    Optimize,
}

impl StepName {
    /// Display and terminality order. Execution order is up to the backend.
    pub const ORDER: [StepName; 5] = [
        StepName::Analyst,
        StepName::Manual,
        StepName::Autotests,
        StepName::Standards,
        StepName::Optimize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::Analyst => "analyst",
            StepName::Manual => "manual",
            StepName::Autotests => "autotests",
            StepName::Standards => "standards",
            StepName::Optimize => "optimize",
        }
    }

    /// Capitalized name for headings.
    pub fn title(&self) -> &'static str {
        match self {
            StepName::Analyst => "Analyst",
            StepName::Manual => "Manual",
            StepName::Autotests => "Autotests",
            StepName::Standards => "Standards",
            StepName::Optimize => "Optimize",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepName::ORDER
            .into_iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown step: {s}"))
    }
}

/// Step status as reported by the backend.
///
/// Values outside the known set are kept verbatim in `Unrecognized` so they
/// can still be displayed; they are never terminal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepStatus {
    #[default]
    Queued,
    Running,
    Success,
    Failed,
    Unrecognized(String),
}

impl StepStatus {
    pub fn as_str(&self) -> &str {
        match self {
            StepStatus::Queued => "queued",
            StepStatus::Running => "running",
            StepStatus::Success => "success",
            StepStatus::Failed => "failed",
            StepStatus::Unrecognized(other) => other.as_str(),
        }
    }

    /// `success` and `failed` admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Success | StepStatus::Failed)
    }
}

impl From<&str> for StepStatus {
    fn from(value: &str) -> Self {
        StepStatus::from(value.to_string())
    }
}

impl From<String> for StepStatus {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "queued" => StepStatus::Queued,
            "running" => StepStatus::Running,
            "success" => StepStatus::Success,
            "failed" => StepStatus::Failed,
            _ => StepStatus::Unrecognized(value),
        }
    }
}

impl From<StepStatus> for String {
    fn from(value: StepStatus) -> Self {
        match value {
            StepStatus::Unrecognized(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static QUEUED: StepStatus = StepStatus::Queued;

/// File produced by a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepArtifact {
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<StepArtifact>,
    /// Opaque step payload; never interpreted by the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Step {
    pub fn with_status(status: impl Into<StepStatus>) -> Self {
        Self {
            status: status.into(),
            ..Default::default()
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Submission inputs as echoed back by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openapi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelId>,
}

/// Snapshot of one pipeline execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    #[serde(default)]
    pub steps: BTreeMap<String, Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<RunInput>,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Run {
    /// A run with every step of the fixed sequence queued.
    pub fn queued(id: impl Into<RunId>) -> Self {
        Self {
            id: id.into(),
            steps: StepName::ORDER
                .iter()
                .map(|name| (name.as_str().to_string(), Step::default()))
                .collect(),
            input: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Parse the text of a `run.json` file.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn step(&self, name: StepName) -> Option<&Step> {
        self.steps.get(name.as_str())
    }

    /// Status of `name`, `queued` when the backend has not reported it.
    pub fn status_of(&self, name: StepName) -> &StepStatus {
        self.step(name).map(|step| &step.status).unwrap_or(&QUEUED)
    }

    /// True iff every step of the fixed sequence is `success` or `failed`.
    pub fn is_terminal(&self) -> bool {
        StepName::ORDER
            .iter()
            .all(|name| self.status_of(*name).is_terminal())
    }

    /// Steps of the fixed sequence, in display order.
    pub fn steps_in_order(&self) -> impl Iterator<Item = (StepName, Option<&Step>)> + '_ {
        StepName::ORDER
            .into_iter()
            .map(move |name| (name, self.step(name)))
    }

    pub fn set_step(&mut self, name: StepName, step: Step) {
        self.steps.insert(name.as_str().to_string(), step);
    }
}

/// Reference to a known run, as listed by the backend.
///
/// The listing mixes bare identifiers with records that already carry the
/// run's files; both normalize into this one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunRef {
    Bare(RunId),
    Detailed { id: RunId, files: RunFiles },
}

impl RunRef {
    pub fn id(&self) -> &RunId {
        match self {
            RunRef::Bare(id) => id,
            RunRef::Detailed { id, .. } => id,
        }
    }

    pub fn files(&self) -> Option<&RunFiles> {
        match self {
            RunRef::Bare(_) => None,
            RunRef::Detailed { files, .. } => Some(files),
        }
    }

    /// The bundled `run.json`, when this reference carries one.
    pub fn snapshot(&self) -> Option<serde_json::Result<Run>> {
        self.files()
            .and_then(|files| files.get(RUN_FILE))
            .map(|text| Run::from_json(text))
    }

    pub(crate) fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::String(text) => Ok(Self::from_text(text)),
            Value::Object(mut map) => {
                let id = match map.get("id") {
                    Some(Value::String(id)) if !id.trim().is_empty() => RunId::new(id.as_str()),
                    _ => return Err("run entry is missing an id".to_string()),
                };
                if let Some(Value::Object(raw)) = map.remove("files") {
                    let files = raw
                        .into_iter()
                        .map(|(name, content)| (name, value_text(content)))
                        .collect();
                    return Ok(RunRef::Detailed { id, files });
                }
                if map.contains_key("steps") {
                    let text = Value::Object(map).to_string();
                    return Ok(RunRef::Detailed {
                        id,
                        files: RunFiles::from([(RUN_FILE.to_string(), text)]),
                    });
                }
                Ok(RunRef::Bare(id))
            }
            other => Err(format!("unsupported run entry: {other}")),
        }
    }

    fn from_text(text: String) -> Self {
        if text.trim_start().starts_with('{') {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&text) {
                if let Some(Value::String(id)) = map.get("id") {
                    return RunRef::Detailed {
                        id: RunId::new(id.as_str()),
                        files: RunFiles::from([(RUN_FILE.to_string(), text)]),
                    };
                }
            }
        }
        RunRef::Bare(RunId::new(text))
    }
}

impl From<RunId> for RunRef {
    fn from(id: RunId) -> Self {
        RunRef::Bare(id)
    }
}

impl<'de> Deserialize<'de> for RunRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        RunRef::from_value(value).map_err(de::Error::custom)
    }
}

impl Serialize for RunRef {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        #[derive(Serialize)]
        struct Detailed<'a> {
            id: &'a RunId,
            files: &'a RunFiles,
        }

        match self {
            RunRef::Bare(id) => id.serialize(serializer),
            RunRef::Detailed { id, files } => Detailed { id, files }.serialize(serializer),
        }
    }
}

/// File listing returned by `GET /runs/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunArtifacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    #[serde(default, deserialize_with = "lenient_files")]
    pub files: RunFiles,
}

impl RunArtifacts {
    /// Parsed `run.json`; `None` when the file is absent.
    pub fn run(&self) -> Option<serde_json::Result<Run>> {
        self.files.get(RUN_FILE).map(|text| Run::from_json(text))
    }

    /// Crash report of the background pipeline task, if one was written.
    pub fn background_error(&self) -> Option<&str> {
        self.files
            .get(ERROR_FILE)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }
}

fn value_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn lenient_files<'de, D>(deserializer: D) -> Result<RunFiles, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(name, content)| (name, value_text(content)))
        .collect())
}

/// Accepts RFC 3339 and naive ISO-8601 (read as UTC); anything else reads as absent.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
