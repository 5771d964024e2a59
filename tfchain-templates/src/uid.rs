use std::{fmt, str::FromStr, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::InvalidTemplateUid;

static UID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<host>[^/\s]+)/(?P<account>[^/\s]+)/(?P<repo>[^/\s]+)/(?P<name>[^/\s]+)/(?P<version>[^/\s]+)$")
        .unwrap()
});

/// Identifies a template: where it is published, what it is called and which version of it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplateUid {
    pub host: String,
    pub account: String,
    pub repo: String,
    pub name: String,
    pub version: String,
}

impl TemplateUid {
    /// A template published in this repository.
    pub fn tfchain(name: &str, version: &str) -> Self {
        Self {
            host: "github.com".to_owned(),
            account: "threefoldfoundation".to_owned(),
            repo: "tfchain-templates".to_owned(),
            name: name.to_owned(),
            version: version.to_owned(),
        }
    }
}

impl FromStr for TemplateUid {
    type Err = InvalidTemplateUid;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = UID_RE
            .captures(s)
            .ok_or_else(|| InvalidTemplateUid(s.to_owned()))?;
        Ok(Self {
            host: caps["host"].to_owned(),
            account: caps["account"].to_owned(),
            repo: caps["repo"].to_owned(),
            name: caps["name"].to_owned(),
            version: caps["version"].to_owned(),
        })
    }
}

impl fmt::Display for TemplateUid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.host, self.account, self.repo, self.name, self.version
        )
    }
}

impl Serialize for TemplateUid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TemplateUid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}
