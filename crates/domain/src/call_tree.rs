//! Call trees: who gets notified, and in what order.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::{PersonId, PlaceId};

/// Someone who can be notified about incidents at a place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub place_id: PlaceId,
    pub first_name: String,
    pub last_name: String,
}

impl Person {
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallTreeEntry {
    pub person: PersonId,
    pub enabled: bool,
    pub position: u32,
}

impl CallTreeEntry {
    #[must_use]
    pub fn new(person: PersonId, enabled: bool, position: u32) -> Self {
        Self {
            person,
            enabled,
            position,
        }
    }
}

/// Entries ordered by position. Positions and people are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<CallTreeEntry>", into = "Vec<CallTreeEntry>")]
pub struct CallTree {
    entries: Vec<CallTreeEntry>,
}

impl CallTree {
    /// # Errors
    ///
    /// Returns [`ValidationError::DuplicatePosition`] or
    /// [`ValidationError::DuplicatePerson`] when entries collide.
    pub fn new(mut entries: Vec<CallTreeEntry>) -> Result<Self, ValidationError> {
        entries.sort_by_key(|entry| entry.position);
        let mut people = HashSet::new();
        for pair in entries.windows(2) {
            if pair[0].position == pair[1].position {
                return Err(ValidationError::DuplicatePosition(pair[0].position));
            }
        }
        for entry in &entries {
            if !people.insert(entry.person) {
                return Err(ValidationError::DuplicatePerson(entry.person.to_string()));
            }
        }
        Ok(Self { entries })
    }

    #[must_use]
    pub fn entries(&self) -> &[CallTreeEntry] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn enabled_people(&self) -> impl Iterator<Item = PersonId> + '_ {
        self.entries
            .iter()
            .filter(|entry| entry.enabled)
            .map(|entry| entry.person)
    }

    /// Reconcile with the people currently at the place.
    ///
    /// Existing entries keep their order and enabled flag; newcomers are
    /// appended, enabled only when they are `owner`; people no longer at
    /// the place are dropped. Positions are renumbered from zero.
    #[must_use]
    pub fn sync(&self, people: &[Person], owner: Option<PersonId>) -> Self {
        let present: HashSet<PersonId> = people.iter().map(|person| person.id).collect();
        let mut kept: Vec<(PersonId, bool)> = self
            .entries
            .iter()
            .filter(|entry| present.contains(&entry.person))
            .map(|entry| (entry.person, entry.enabled))
            .collect();
        for person in people {
            if !kept.iter().any(|(id, _)| *id == person.id) {
                kept.push((person.id, Some(person.id) == owner));
            }
        }
        let entries = kept
            .into_iter()
            .zip(0_u32..)
            .map(|((person, enabled), position)| CallTreeEntry::new(person, enabled, position))
            .collect();
        Self { entries }
    }
}

impl TryFrom<Vec<CallTreeEntry>> for CallTree {
    type Error = ValidationError;

    fn try_from(entries: Vec<CallTreeEntry>) -> Result<Self, Self::Error> {
        Self::new(entries)
    }
}

impl From<CallTree> for Vec<CallTreeEntry> {
    fn from(tree: CallTree) -> Self {
        tree.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(place_id: PlaceId, first_name: &str) -> Person {
        Person {
            id: PersonId::new(),
            place_id,
            first_name: first_name.to_string(),
            last_name: "Doe".to_string(),
        }
    }

    #[test]
    fn should_yield_enabled_people_in_position_order() {
        let (a, b, c) = (PersonId::new(), PersonId::new(), PersonId::new());
        let tree = CallTree::new(vec![
            CallTreeEntry::new(c, true, 2),
            CallTreeEntry::new(a, true, 0),
            CallTreeEntry::new(b, false, 1),
        ])
        .unwrap();
        assert_eq!(tree.enabled_people().collect::<Vec<_>>(), vec![a, c]);
        assert_eq!(tree.entries()[1].person, b);
    }

    #[test]
    fn should_reject_duplicate_positions() {
        let err = CallTree::new(vec![
            CallTreeEntry::new(PersonId::new(), true, 1),
            CallTreeEntry::new(PersonId::new(), true, 1),
        ])
        .unwrap_err();
        assert_eq!(err, ValidationError::DuplicatePosition(1));
    }

    #[test]
    fn should_reject_duplicate_people() {
        let id = PersonId::new();
        let err = CallTree::new(vec![
            CallTreeEntry::new(id, true, 0),
            CallTreeEntry::new(id, false, 1),
        ])
        .unwrap_err();
        assert_eq!(err, ValidationError::DuplicatePerson(id.to_string()));
    }

    #[test]
    fn should_sync_with_people_at_place() {
        let place = PlaceId::new();
        let (owner, kept, gone, newcomer) = (
            person(place, "Olive"),
            person(place, "Kim"),
            person(place, "Gus"),
            person(place, "Nia"),
        );
        let tree = CallTree::new(vec![
            CallTreeEntry::new(kept.id, false, 3),
            CallTreeEntry::new(gone.id, true, 5),
        ])
        .unwrap();

        let synced = tree.sync(
            &[owner.clone(), kept.clone(), newcomer.clone()],
            Some(owner.id),
        );
        assert_eq!(
            synced.entries(),
            &[
                CallTreeEntry::new(kept.id, false, 0),
                CallTreeEntry::new(owner.id, true, 1),
                CallTreeEntry::new(newcomer.id, false, 2),
            ]
        );
    }

    #[test]
    fn should_deserialize_and_validate_entry_list() {
        let id = PersonId::new();
        let json = format!(r#"[{{"person":"{id}","enabled":true,"position":0}}]"#);
        let tree: CallTree = serde_json::from_str(&json).unwrap();
        assert_eq!(tree.enabled_people().collect::<Vec<_>>(), vec![id]);

        let dup = format!(
            r#"[{{"person":"{id}","enabled":true,"position":0}},{{"person":"{id}","enabled":true,"position":1}}]"#
        );
        assert!(serde_json::from_str::<CallTree>(&dup).is_err());
    }

    #[test]
    fn should_format_display_name() {
        let p = person(PlaceId::new(), "Ada");
        assert_eq!(p.display_name(), "Ada Doe");
    }
}
