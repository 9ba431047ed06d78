//! Optimization profiles and their resolution into compiler configuration.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Value of a semantic compiler directive (`boundscheck=False`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DirectiveValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl fmt::Display for DirectiveValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectiveValue::Bool(true) => f.write_str("True"),
            DirectiveValue::Bool(false) => f.write_str("False"),
            DirectiveValue::Int(value) => write!(f, "{value}"),
            DirectiveValue::Str(value) => f.write_str(value),
        }
    }
}

impl From<bool> for DirectiveValue {
    fn from(value: bool) -> Self {
        DirectiveValue::Bool(value)
    }
}

impl From<i64> for DirectiveValue {
    fn from(value: i64) -> Self {
        DirectiveValue::Int(value)
    }
}

impl From<&str> for DirectiveValue {
    fn from(value: &str) -> Self {
        DirectiveValue::Str(value.to_string())
    }
}

impl std::str::FromStr for DirectiveValue {
    type Err = std::convert::Infallible;

    /// `True`/`False` and integers keep their type; anything else is a string.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Ok(match text {
            "True" | "true" => DirectiveValue::Bool(true),
            "False" | "false" => DirectiveValue::Bool(false),
            _ => text
                .parse::<i64>()
                .map_or_else(|_| DirectiveValue::Str(text.to_string()), DirectiveValue::Int),
        })
    }
}

/// Directive name to value, ordered by name.
pub type Directives = BTreeMap<String, DirectiveValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Profile {
    #[default]
    Safe,
    Fast,
    /// Caller-supplied directives and flags only.
    Custom,
}

impl Profile {
    /// Unknown names resolve to [`Profile::Safe`]. `safe` and `fast` match
    /// case-insensitively, `custom` only in lowercase.
    pub fn from_name(name: &str) -> Self {
        if name == "custom" {
            return Profile::Custom;
        }
        match name.to_ascii_lowercase().as_str() {
            "fast" => Profile::Fast,
            _ => Profile::Safe,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Profile::Safe => "safe",
            Profile::Fast => "fast",
            Profile::Custom => "custom",
        }
    }

    /// Default directives and flags, `None` for [`Profile::Custom`].
    pub fn defaults(self) -> Option<(Directives, Vec<String>)> {
        match self {
            Profile::Safe => Some((directives([("language_level", DirectiveValue::Int(3))]), Vec::new())),
            Profile::Fast => Some((
                directives([
                    ("language_level", DirectiveValue::Int(3)),
                    ("boundscheck", DirectiveValue::Bool(false)),
                    ("wraparound", DirectiveValue::Bool(false)),
                    ("cdivision", DirectiveValue::Bool(true)),
                    ("nonecheck", DirectiveValue::Bool(false)),
                ]),
                fast_flags(),
            )),
            Profile::Custom => None,
        }
    }
}

impl From<String> for Profile {
    fn from(name: String) -> Self {
        Profile::from_name(&name)
    }
}

impl From<Profile> for String {
    fn from(profile: Profile) -> Self {
        profile.name().to_string()
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn directives<const N: usize>(entries: [(&str, DirectiveValue); N]) -> Directives {
    entries
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// The aggressive set is GCC/Clang specific; MSVC only gets its speed switch.
fn fast_flags() -> Vec<String> {
    let flags: &[&str] = if cfg!(target_os = "windows") {
        &["/O2"]
    } else {
        &["-Ofast", "-march=native", "-flto", "-funroll-loops", "-ffast-math"]
    };
    flags.iter().map(|flag| flag.to_string()).collect()
}

/// Fully resolved configuration handed to the compiler backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerConfig {
    pub profile: Profile,
    pub directives: Directives,
    pub flags: Vec<String>,
}

impl CompilerConfig {
    /// Stable textual form used when deriving cache identifiers.
    ///
    /// Compact JSON with sorted keys, so flag boundaries and directive value
    /// types survive: `["-a b"]` and `["-a", "b"]` differ, as do `"3"` and `3`.
    pub fn fingerprint(&self) -> String {
        serde_json::json!({
            "directives": self.directives,
            "flags": self.flags,
            "profile": self.profile.name(),
        })
        .to_string()
    }
}

/// Merges a profile's defaults with caller overrides.
///
/// Directive overrides replace the profile's value per key; flag overrides are
/// appended to the profile's flags. [`Profile::Custom`] bypasses defaults.
pub fn resolve(profile: Profile, directives: &Directives, flags: &[String]) -> CompilerConfig {
    let Some((mut base_directives, mut base_flags)) = profile.defaults() else {
        return CompilerConfig {
            profile,
            directives: directives.clone(),
            flags: flags.to_vec(),
        };
    };

    base_directives.extend(directives.iter().map(|(k, v)| (k.clone(), v.clone())));
    base_flags.extend(flags.iter().cloned());
    CompilerConfig {
        profile,
        directives: base_directives,
        flags: base_flags,
    }
}

/// Options attached to a compiled function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    pub profile: Profile,
    pub directives: Directives,
    pub flags: Vec<String>,
    pub verbose: bool,
}

impl CompileOptions {
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            ..Self::default()
        }
    }

    pub fn directive(mut self, name: impl Into<String>, value: impl Into<DirectiveValue>) -> Self {
        self.directives.insert(name.into(), value.into());
        self
    }

    pub fn flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(flag.into());
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn resolve(&self) -> CompilerConfig {
        resolve(self.profile, &self.directives, &self.flags)
    }
}
