//! In-memory benchmark content and the policy (benchmark + profile) that
//! answers substitution lookups.

use serde::{Deserialize, Serialize};

use crate::SubstitutionSource;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Benchmark {
    pub id: String,
    #[serde(default)]
    pub values: Vec<XccdfValue>,
    #[serde(default)]
    pub plain_texts: Vec<PlainText>,
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct XccdfValue {
    pub id: String,
    #[serde(default)]
    pub titles: Vec<LocalizedText>,
    /// Selectable instances; the one without a selector is the default.
    #[serde(default)]
    pub instances: Vec<ValueInstance>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalizedText {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValueInstance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlainText {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub set_values: Vec<SetValue>,
    #[serde(default)]
    pub refine_values: Vec<RefineValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SetValue {
    pub idref: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefineValue {
    pub idref: String,
    pub selector: String,
}

impl Benchmark {
    pub fn value(&self, id: &str) -> Option<&XccdfValue> {
        self.values.iter().find(|v| v.id == id)
    }

    pub fn plain_text(&self, id: &str) -> Option<&str> {
        self.plain_texts
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.text.as_str())
    }

    pub fn profile(&self, id: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.id == id)
    }

    /// Policy for `profile`, or the benchmark defaults when `None`.
    /// Returns `None` if the profile does not exist.
    pub fn policy(&self, profile: Option<&str>) -> Option<Policy<'_>> {
        let profile = match profile {
            Some(id) => Some(self.profile(id)?),
            None => None,
        };
        Some(Policy {
            benchmark: self,
            profile,
        })
    }
}

impl XccdfValue {
    /// Title in `lang` when present, otherwise the first title.
    pub fn title(&self, lang: Option<&str>) -> Option<&str> {
        let preferred = lang.and_then(|want| {
            self.titles.iter().find(|t| {
                t.lang
                    .as_deref()
                    .is_some_and(|have| have.eq_ignore_ascii_case(want))
            })
        });
        preferred
            .or_else(|| self.titles.first())
            .map(|t| t.text.as_str())
    }

    pub fn instance(&self, selector: Option<&str>) -> Option<&str> {
        self.instances
            .iter()
            .find(|i| i.selector.as_deref() == selector)
            .map(|i| i.value.as_str())
    }
}

/// A benchmark seen through one (optional) profile.
#[derive(Debug, Clone, Copy)]
pub struct Policy<'a> {
    benchmark: &'a Benchmark,
    profile: Option<&'a Profile>,
}

impl<'a> Policy<'a> {
    pub fn benchmark(&self) -> &'a Benchmark {
        self.benchmark
    }

    pub fn profile(&self) -> Option<&'a Profile> {
        self.profile
    }
}

impl SubstitutionSource for Policy<'_> {
    fn is_value(&self, id: &str) -> bool {
        self.benchmark.value(id).is_some()
    }

    fn value_title(&self, id: &str, lang: Option<&str>) -> Option<&str> {
        self.benchmark.value(id)?.title(lang)
    }

    fn bound_value(&self, id: &str) -> Option<&str> {
        let value = self.benchmark.value(id)?;
        let Some(profile) = self.profile else {
            return value.instance(None);
        };
        if let Some(set) = profile.set_values.iter().rev().find(|s| s.idref == id) {
            return Some(set.value.as_str());
        }
        let selector = profile
            .refine_values
            .iter()
            .rev()
            .find(|r| r.idref == id)
            .map(|r| r.selector.as_str());
        value.instance(selector)
    }

    fn plain_text(&self, id: &str) -> Option<&str> {
        self.benchmark.plain_text(id)
    }
}
