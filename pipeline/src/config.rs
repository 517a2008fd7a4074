use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeMap;

/// Steps whose name starts with this marker are skipped
pub const COMMENT_MARKER: char = '#';

/// One record of a pipeline file
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Step {
    Parameters(ParameterStep),
    Loop(LoopStep),
    Job(JobStep),
}

/// Global parameters for `$[key]` substitution, replaces the ones of earlier steps
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ParameterStep {
    pub parameters: Vec<BTreeMap<String, Value>>,
}

impl ParameterStep {
    pub fn mapping(&self) -> BTreeMap<String, String> {
        self.parameters
            .iter()
            .flatten()
            .map(|(key, value)| (key.clone(), render_value(value)))
            .collect()
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(value) => value.clone(),
        Value::Number(value) => value.to_string(),
        Value::Bool(value) => value.to_string(),
        Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .map(|rendered| rendered.trim_end().to_string())
            .unwrap_or_default(),
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobStep {
    pub name: String,
    pub cmd: String,
    #[serde(default)]
    pub dep: Option<DepList>,
    /// Overrides `--ignore-jobid-errors` for this step
    #[serde(default)]
    pub assert_ids: Option<bool>,
}

/// Jobs submitted once per value of `[start, stop)`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoopStep {
    pub name: String,
    #[serde(rename = "loop")]
    pub range: (i64, i64),
    #[serde(default)]
    pub dep: Option<DepList>,
    pub items: Vec<JobStep>,
}

/// A job id or a comma separated list of step names and job ids
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum DepList {
    Id(i64),
    List(String),
}

impl DepList {
    pub fn entries(&self) -> Vec<String> {
        match self {
            Self::Id(id) => vec![id.to_string()],
            Self::List(list) => list
                .replace(' ', "")
                .split(',')
                .filter(|entry| !entry.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

pub fn dependencies(dep: &Option<DepList>) -> Vec<String> {
    dep.as_ref().map(DepList::entries).unwrap_or_default()
}

pub fn is_comment(name: &str) -> bool {
    name.trim_start().starts_with(COMMENT_MARKER)
}
