//! The flag set that guards every lifecycle operation.
//!
//! A flag is a `(category, tag)` pair mapped to a status string, in practice always [`OK`]. Flags may declare
//! prerequisites: setting a flag whose prerequisite is not `ok` fails, and deleting a flag also deletes every
//! flag that (transitively) depends on it. So uninstalling clears `status.running` and `wallet.init` without
//! the template having to remember them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::StateCheckError;

pub const OK: &str = "ok";

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Category {
    Actions,
    Status,
    Wallet,
    Ethereum,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Flag {
    pub category: Category,
    pub tag: &'static str,
}

impl Flag {
    pub const fn new(category: Category, tag: &'static str) -> Self {
        Self { category, tag }
    }
}

impl std::fmt::Display for Flag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.category, self.tag)
    }
}

pub mod flags {
    use super::{Category, Flag};

    pub const INSTALL: Flag = Flag::new(Category::Actions, "install");
    pub const START: Flag = Flag::new(Category::Actions, "start");
    pub const RUN: Flag = Flag::new(Category::Actions, "run");
    pub const RUNNING: Flag = Flag::new(Category::Status, "running");
    pub const WALLET_INIT: Flag = Flag::new(Category::Wallet, "init");
    pub const SYNCING: Flag = Flag::new(Category::Ethereum, "syncing");
    pub const SYNCED: Flag = Flag::new(Category::Ethereum, "synced");
}

/// `(dependent, prerequisite)` pairs shared by every container-backed template.
pub const LIFECYCLE_EDGES: &[(Flag, Flag)] = &[
    (flags::START, flags::INSTALL),
    (flags::RUNNING, flags::INSTALL),
    (flags::RUN, flags::START),
    (flags::WALLET_INIT, flags::RUNNING),
    (flags::SYNCING, flags::RUNNING),
    (flags::SYNCED, flags::RUNNING),
];

/// Serialized form of a flag set: `category -> tag -> value`.
pub type StateMap = BTreeMap<Category, BTreeMap<String, String>>;

#[derive(Clone, Debug, Default)]
pub struct State {
    values: StateMap,
    edges: &'static [(Flag, Flag)],
}

impl State {
    pub fn new(edges: &'static [(Flag, Flag)]) -> Self {
        Self {
            values: StateMap::new(),
            edges,
        }
    }

    /// A flag set with the standard install/start/run/running edges.
    pub fn lifecycle() -> Self {
        Self::new(LIFECYCLE_EDGES)
    }

    pub fn get(&self, flag: Flag) -> Option<&str> {
        self.values
            .get(&flag.category)
            .and_then(|tags| tags.get(flag.tag))
            .map(String::as_str)
    }

    pub fn is_ok(&self, flag: Flag) -> bool {
        self.get(flag) == Some(OK)
    }

    pub fn check(&self, flag: Flag, expected: &str) -> Result<(), StateCheckError> {
        let actual = self.get(flag);
        if actual == Some(expected) {
            return Ok(());
        }
        Err(StateCheckError {
            category: flag.category,
            tag: flag.tag.to_owned(),
            expected: expected.to_owned(),
            actual: actual.map(str::to_owned),
        })
    }

    pub fn check_ok(&self, flag: Flag) -> Result<(), StateCheckError> {
        self.check(flag, OK)
    }

    /// Sets `flag` to `value`, provided all of its prerequisites are `ok`.
    pub fn set(&mut self, flag: Flag, value: &str) -> Result<(), StateCheckError> {
        for (_, prerequisite) in self.edges.iter().filter(|(dependent, _)| *dependent == flag) {
            self.check_ok(*prerequisite)?;
        }
        self.values
            .entry(flag.category)
            .or_default()
            .insert(flag.tag.to_owned(), value.to_owned());
        Ok(())
    }

    pub fn set_ok(&mut self, flag: Flag) -> Result<(), StateCheckError> {
        self.set(flag, OK)
    }

    /// Removes `flag` and every flag depending on it. Deleting an absent flag is a no-op.
    pub fn delete(&mut self, flag: Flag) {
        if let Some(tags) = self.values.get_mut(&flag.category) {
            tags.remove(flag.tag);
            if tags.is_empty() {
                self.values.remove(&flag.category);
            }
        }
        let edges = self.edges;
        for (dependent, _) in edges.iter().filter(|(_, prerequisite)| *prerequisite == flag) {
            self.delete(*dependent);
        }
    }

    pub fn to_map(&self) -> StateMap {
        self.values.clone()
    }

    /// Replaces the current values with a persisted snapshot. Edges are not checked: the snapshot was valid
    /// when it was taken.
    pub fn restore(&mut self, values: StateMap) {
        self.values = values;
    }
}
