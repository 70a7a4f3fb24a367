//! Call tree service: who to notify for an incident.

use vigil_domain::call_tree::{CallTree, Person};
use vigil_domain::error::{ValidationError, VigilError};
use vigil_domain::id::{PersonId, PlaceId};

use crate::ports::{CallTreeRepository, PersonDirectory};

/// Application service for call trees and recipient resolution.
pub struct CallTreeService<C, P> {
    trees: C,
    people: P,
}

impl<C: CallTreeRepository, P: PersonDirectory> CallTreeService<C, P> {
    /// Create a new service backed by the given repository and directory.
    pub fn new(trees: C, people: P) -> Self {
        Self { trees, people }
    }

    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn get_call_tree(
        &self,
        place_id: PlaceId,
        namespace: &str,
    ) -> Result<CallTree, VigilError> {
        self.trees.load(place_id, namespace).await
    }

    /// Replace a call tree after checking every entry names a person of the
    /// place.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidPersonReference`] for an unknown
    /// person or one from another place, or a storage error.
    #[tracing::instrument(skip(self, tree), fields(entries = tree.entries().len()))]
    pub async fn replace_call_tree(
        &self,
        place_id: PlaceId,
        namespace: &str,
        tree: CallTree,
    ) -> Result<CallTree, VigilError> {
        for entry in tree.entries() {
            let person = self.people.find_by_id(entry.person).await?;
            if person.is_none_or(|person| person.place_id != place_id) {
                return Err(ValidationError::InvalidPersonReference(entry.person.to_string()).into());
            }
        }
        self.trees.save(place_id, namespace, tree).await
    }

    /// Enabled people of the call tree, in order. People the directory does
    /// not know, or fails to look up, are skipped.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the call tree itself cannot be loaded.
    pub async fn resolve_recipients(
        &self,
        place_id: PlaceId,
        namespace: &str,
    ) -> Result<Vec<Person>, VigilError> {
        let tree = self.trees.load(place_id, namespace).await?;
        let mut recipients = Vec::new();
        for person_id in tree.enabled_people() {
            match self.people.find_by_id(person_id).await {
                Ok(Some(person)) => recipients.push(person),
                Ok(None) => {
                    tracing::warn!(%place_id, %person_id, namespace, "call tree references unknown person, skipping");
                }
                Err(err) => {
                    tracing::warn!(%place_id, %person_id, namespace, error = %err, "failed to look up person, skipping");
                }
            }
        }
        Ok(recipients)
    }

    /// Reconcile the stored call tree with the people of the place.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository or directory.
    #[tracing::instrument(skip(self))]
    pub async fn sync_call_tree(
        &self,
        place_id: PlaceId,
        namespace: &str,
        owner: Option<PersonId>,
    ) -> Result<CallTree, VigilError> {
        let tree = self.trees.load(place_id, namespace).await?;
        let people = self.people.list_by_place(place_id).await?;
        let synced = tree.sync(&people, owner);
        if synced == tree {
            return Ok(tree);
        }
        self.trees.save(place_id, namespace, synced).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_domain::call_tree::CallTreeEntry;

    use crate::testing::{InMemoryCallTreeRepo, InMemoryPersonDirectory, person};

    const NS: &str = "alarm";

    #[tokio::test]
    async fn should_resolve_only_enabled_people_in_order() {
        let place = PlaceId::new();
        let (a, b, c) = (person(place, "A"), person(place, "B"), person(place, "C"));
        let tree = CallTree::new(vec![
            CallTreeEntry::new(a.id, true, 0),
            CallTreeEntry::new(b.id, false, 1),
            CallTreeEntry::new(c.id, true, 2),
        ])
        .unwrap();
        let svc = CallTreeService::new(
            InMemoryCallTreeRepo::with(place, NS, tree),
            InMemoryPersonDirectory::with(vec![a.clone(), b, c.clone()]),
        );

        let first = svc.resolve_recipients(place, NS).await.unwrap();
        let second = svc.resolve_recipients(place, NS).await.unwrap();
        assert_eq!(first, vec![a, c]);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn should_skip_unknown_people() {
        let place = PlaceId::new();
        let known = person(place, "Known");
        let tree = CallTree::new(vec![
            CallTreeEntry::new(PersonId::new(), true, 0),
            CallTreeEntry::new(known.id, true, 1),
        ])
        .unwrap();
        let svc = CallTreeService::new(
            InMemoryCallTreeRepo::with(place, NS, tree),
            InMemoryPersonDirectory::with(vec![known.clone()]),
        );

        assert_eq!(svc.resolve_recipients(place, NS).await.unwrap(), vec![known]);
    }

    #[tokio::test]
    async fn should_skip_people_whose_lookup_fails() {
        let place = PlaceId::new();
        let (a, b) = (person(place, "A"), person(place, "B"));
        let tree = CallTree::new(vec![
            CallTreeEntry::new(a.id, true, 0),
            CallTreeEntry::new(b.id, true, 1),
        ])
        .unwrap();
        let people = InMemoryPersonDirectory::with(vec![a.clone(), b.clone()]);
        people.fail_lookup(a.id);
        let svc = CallTreeService::new(InMemoryCallTreeRepo::with(place, NS, tree), people);

        assert_eq!(svc.resolve_recipients(place, NS).await.unwrap(), vec![b]);
    }

    #[tokio::test]
    async fn should_fail_resolution_when_call_tree_cannot_load() {
        let place = PlaceId::new();
        let trees = InMemoryCallTreeRepo::default();
        trees.fail_next_loads(1);
        let svc = CallTreeService::new(trees, InMemoryPersonDirectory::default());

        let result = svc.resolve_recipients(place, NS).await;
        assert!(matches!(result, Err(VigilError::Storage(_))));
        assert!(svc.resolve_recipients(place, NS).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_resolve_nobody_without_call_tree() {
        let svc = CallTreeService::new(
            InMemoryCallTreeRepo::default(),
            InMemoryPersonDirectory::default(),
        );
        assert!(svc.resolve_recipients(PlaceId::new(), NS).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_reject_call_tree_with_person_from_other_place() {
        let place = PlaceId::new();
        let stranger = person(PlaceId::new(), "Stranger");
        let svc = CallTreeService::new(
            InMemoryCallTreeRepo::default(),
            InMemoryPersonDirectory::with(vec![stranger.clone()]),
        );
        let tree = CallTree::new(vec![CallTreeEntry::new(stranger.id, true, 0)]).unwrap();

        let result = svc.replace_call_tree(place, NS, tree).await;
        assert!(matches!(
            result,
            Err(VigilError::Validation(ValidationError::InvalidPersonReference(_)))
        ));
    }

    #[tokio::test]
    async fn should_replace_and_read_back_call_tree() {
        let place = PlaceId::new();
        let a = person(place, "A");
        let svc = CallTreeService::new(
            InMemoryCallTreeRepo::default(),
            InMemoryPersonDirectory::with(vec![a.clone()]),
        );
        let tree = CallTree::new(vec![CallTreeEntry::new(a.id, true, 4)]).unwrap();

        svc.replace_call_tree(place, NS, tree.clone()).await.unwrap();
        assert_eq!(svc.get_call_tree(place, NS).await.unwrap(), tree);
    }

    #[tokio::test]
    async fn should_sync_call_tree_with_people_of_place() {
        let place = PlaceId::new();
        let (owner, other) = (person(place, "Owner"), person(place, "Other"));
        let svc = CallTreeService::new(
            InMemoryCallTreeRepo::default(),
            InMemoryPersonDirectory::with(vec![owner.clone(), other.clone()]),
        );

        let synced = svc.sync_call_tree(place, NS, Some(owner.id)).await.unwrap();
        assert_eq!(
            synced.entries(),
            &[
                CallTreeEntry::new(owner.id, true, 0),
                CallTreeEntry::new(other.id, false, 1),
            ]
        );
        assert_eq!(svc.get_call_tree(place, NS).await.unwrap(), synced);
    }
}
