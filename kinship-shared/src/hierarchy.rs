//! In-memory group tree resolution
//!
//! Groups are stored as parent pointers. A [`GroupForest`] is built once per
//! request from all of a family's groups: an arena indexed by id plus a
//! parent-indexed adjacency map. Every walk tracks visited nodes, so corrupt
//! data containing a cycle produces [`HierarchyError::CyclicHierarchy`]
//! instead of an endless loop.
//!
//! # Example
//!
//! ```no_run
//! use kinship_shared::hierarchy::GroupForest;
//! use kinship_shared::models::group::Group;
//!
//! # async fn example(pool: sqlx::PgPool, family_id: uuid::Uuid, kids: uuid::Uuid) -> Result<(), Box<dyn std::error::Error>> {
//! let forest = GroupForest::new(Group::list_by_family(&pool, family_id).await?);
//! let root = forest.root_of(kids)?;
//! let subtree = forest.descendants(root)?;
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::group::Group;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HierarchyError {
    /// A parent chain revisited a group
    #[error("Cyclic group hierarchy detected at group {0}")]
    CyclicHierarchy(Uuid),

    /// The id is not part of the loaded family
    #[error("Unknown group: {0}")]
    UnknownGroup(Uuid),
}

/// Nested view of the forest, for rendering
#[derive(Debug, Clone, Serialize)]
pub struct GroupNode {
    pub id: Uuid,
    pub nickname: String,
    pub parent_id: Option<Uuid>,
    pub invite_code: Option<String>,
    pub children: Vec<GroupNode>,
}

#[derive(Debug, Clone, Default)]
pub struct GroupForest {
    nodes: HashMap<Uuid, Group>,
    children: HashMap<Uuid, Vec<Uuid>>,
    roots: Vec<Uuid>,
}

impl GroupForest {
    /// Builds the arena. Input order is preserved among siblings.
    pub fn new(groups: impl IntoIterator<Item = Group>) -> Self {
        let mut forest = Self::default();

        for group in groups {
            match group.parent_id {
                Some(parent) => forest.children.entry(parent).or_default().push(group.id),
                None => forest.roots.push(group.id),
            }
            forest.nodes.insert(group.id, group);
        }

        forest
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&Group> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Groups without a parent
    pub fn roots(&self) -> impl Iterator<Item = &Group> {
        self.roots.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Direct children of `parent`
    pub fn children(&self, parent: Uuid) -> impl Iterator<Item = &Group> {
        self.children
            .get(&parent)
            .into_iter()
            .flatten()
            .filter_map(|id| self.nodes.get(id))
    }

    /// Follows parent pointers up to the group with no parent
    ///
    /// # Errors
    ///
    /// - `UnknownGroup` if `id`, or any parent on the way up, is not loaded
    /// - `CyclicHierarchy` if the chain revisits a group
    pub fn root_of(&self, id: Uuid) -> Result<Uuid, HierarchyError> {
        let mut current = self.nodes.get(&id).ok_or(HierarchyError::UnknownGroup(id))?;
        let mut seen = HashSet::new();

        loop {
            if !seen.insert(current.id) {
                return Err(HierarchyError::CyclicHierarchy(current.id));
            }

            match current.parent_id {
                None => return Ok(current.id),
                Some(parent) => {
                    current = self
                        .nodes
                        .get(&parent)
                        .ok_or(HierarchyError::UnknownGroup(parent))?;
                }
            }
        }
    }

    /// The group and every transitive child, breadth-first
    pub fn descendants(&self, id: Uuid) -> Result<Vec<Uuid>, HierarchyError> {
        if !self.nodes.contains_key(&id) {
            return Err(HierarchyError::UnknownGroup(id));
        }

        let mut visited = HashSet::from([id]);
        let mut order = vec![id];
        let mut queue = VecDeque::from([id]);

        while let Some(next) = queue.pop_front() {
            for child in self.children.get(&next).into_iter().flatten() {
                if visited.insert(*child) {
                    order.push(*child);
                    queue.push_back(*child);
                }
            }
        }

        Ok(order)
    }

    /// User ids of every member of `id` and its transitive children
    ///
    /// `members` yields `(user_id, group_id)` pairs.
    pub fn members_in_subtree<I>(&self, id: Uuid, members: I) -> Result<HashSet<Uuid>, HierarchyError>
    where
        I: IntoIterator<Item = (Uuid, Option<Uuid>)>,
    {
        let subtree: HashSet<Uuid> = self.descendants(id)?.into_iter().collect();

        Ok(members
            .into_iter()
            .filter_map(|(user_id, group_id)| {
                group_id
                    .filter(|group| subtree.contains(group))
                    .map(|_| user_id)
            })
            .collect())
    }

    /// Whether moving `group` under `new_parent` would close a loop
    pub fn would_create_cycle(&self, group: Uuid, new_parent: Uuid) -> Result<bool, HierarchyError> {
        if !self.nodes.contains_key(&new_parent) {
            return Err(HierarchyError::UnknownGroup(new_parent));
        }
        Ok(self.descendants(group)?.contains(&new_parent))
    }

    /// Checks that every group resolves to a root
    pub fn validate(&self) -> Result<(), HierarchyError> {
        for id in self.nodes.keys() {
            self.root_of(*id)?;
        }
        Ok(())
    }

    /// Nested rendering starting at every root
    ///
    /// Groups stuck in a cycle have no root and are left out.
    pub fn tree(&self) -> Vec<GroupNode> {
        let mut visited = HashSet::new();
        self.roots
            .iter()
            .filter_map(|id| self.build_node(*id, &mut visited))
            .collect()
    }

    fn build_node(&self, id: Uuid, visited: &mut HashSet<Uuid>) -> Option<GroupNode> {
        if !visited.insert(id) {
            return None;
        }
        let group = self.nodes.get(&id)?;

        let children = self
            .children
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|child| self.build_node(*child, visited))
            .collect();

        Some(GroupNode {
            id,
            nickname: group.nickname.clone(),
            parent_id: group.parent_id,
            invite_code: group.invite_code.clone(),
            children,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn group(nickname: &str, parent: Option<Uuid>) -> Group {
        let now = Utc::now();
        Group {
            id: Uuid::new_v4(),
            family_id: Uuid::nil(),
            nickname: nickname.to_string(),
            parent_id: parent,
            invite_code: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Parents -> Kids -> Teens, plus Cousins under Parents
    fn family_tree() -> (GroupForest, Uuid, Uuid, Uuid, Uuid) {
        let parents = group("Parents", None);
        let kids = group("Kids", Some(parents.id));
        let teens = group("Teens", Some(kids.id));
        let cousins = group("Cousins", Some(parents.id));
        let ids = (parents.id, kids.id, teens.id, cousins.id);
        let forest = GroupForest::new(vec![parents, kids, teens, cousins]);
        (forest, ids.0, ids.1, ids.2, ids.3)
    }

    #[test]
    fn test_root_of_every_group_is_parentless() {
        let (forest, parents, kids, teens, cousins) = family_tree();
        for id in [parents, kids, teens, cousins] {
            let root = forest.root_of(id).unwrap();
            assert_eq!(root, parents);
            assert!(forest.get(root).unwrap().parent_id.is_none());
        }
        assert!(forest.validate().is_ok());
    }

    #[test]
    fn test_root_of_detects_cycle() {
        let mut a = group("A", None);
        let mut b = group("B", None);
        a.parent_id = Some(b.id);
        b.parent_id = Some(a.id);
        let a_id = a.id;
        let forest = GroupForest::new(vec![a, b]);

        assert!(matches!(
            forest.root_of(a_id),
            Err(HierarchyError::CyclicHierarchy(_))
        ));
        assert!(forest.validate().is_err());
        assert!(forest.tree().is_empty());
    }

    #[test]
    fn test_root_of_self_loop() {
        let mut a = group("Loop", None);
        a.parent_id = Some(a.id);
        let id = a.id;
        let forest = GroupForest::new(vec![a]);
        assert_eq!(forest.root_of(id), Err(HierarchyError::CyclicHierarchy(id)));
    }

    #[test]
    fn test_unknown_group() {
        let (forest, ..) = family_tree();
        let stranger = Uuid::new_v4();
        assert_eq!(
            forest.root_of(stranger),
            Err(HierarchyError::UnknownGroup(stranger))
        );
        assert!(forest.descendants(stranger).is_err());
    }

    #[test]
    fn test_parent_outside_family() {
        let outside = Uuid::new_v4();
        let orphan = group("Orphan", Some(outside));
        let id = orphan.id;
        let forest = GroupForest::new(vec![orphan]);
        assert_eq!(forest.root_of(id), Err(HierarchyError::UnknownGroup(outside)));
    }

    #[test]
    fn test_descendants_breadth_first() {
        let (forest, parents, kids, teens, cousins) = family_tree();
        assert_eq!(
            forest.descendants(parents).unwrap(),
            vec![parents, kids, cousins, teens]
        );
        assert_eq!(forest.descendants(kids).unwrap(), vec![kids, teens]);
        assert_eq!(forest.descendants(cousins).unwrap(), vec![cousins]);
    }

    #[test]
    fn test_descendants_terminates_on_cycle() {
        let mut a = group("A", None);
        let mut b = group("B", None);
        a.parent_id = Some(b.id);
        b.parent_id = Some(a.id);
        let (a_id, b_id) = (a.id, b.id);
        let forest = GroupForest::new(vec![a, b]);

        assert_eq!(forest.descendants(a_id).unwrap(), vec![a_id, b_id]);
    }

    #[test]
    fn test_members_in_subtree() {
        let (forest, parents, kids, teens, cousins) = family_tree();
        let (alice, bob, carol, dan, erin) = (
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
        );
        let members = vec![
            (alice, Some(parents)),
            (bob, Some(kids)),
            (carol, Some(teens)),
            (dan, Some(cousins)),
            (erin, None),
        ];

        let kids_subtree = forest.members_in_subtree(kids, members.clone()).unwrap();
        assert_eq!(kids_subtree, HashSet::from([bob, carol]));

        let everyone = forest.members_in_subtree(parents, members).unwrap();
        assert_eq!(everyone.len(), 4);
        assert!(!everyone.contains(&erin));
    }

    #[test]
    fn test_would_create_cycle() {
        let (forest, parents, kids, teens, cousins) = family_tree();
        assert!(forest.would_create_cycle(parents, teens).unwrap());
        assert!(forest.would_create_cycle(kids, kids).unwrap());
        assert!(!forest.would_create_cycle(teens, cousins).unwrap());
        assert!(!forest.would_create_cycle(cousins, kids).unwrap());
        assert!(forest.would_create_cycle(kids, Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_tree_nesting_and_children() {
        let (forest, parents, kids, teens, cousins) = family_tree();
        let tree = forest.tree();
        assert_eq!(tree.len(), 1);

        let root = &tree[0];
        assert_eq!(root.id, parents);
        let child_ids: Vec<Uuid> = root.children.iter().map(|c| c.id).collect();
        assert_eq!(child_ids, vec![kids, cousins]);
        assert_eq!(root.children[0].children[0].id, teens);

        let direct: Vec<&str> = forest.children(parents).map(|g| g.nickname.as_str()).collect();
        assert_eq!(direct, vec!["Kids", "Cousins"]);
        assert_eq!(forest.roots().count(), 1);
        assert_eq!(forest.len(), 4);
    }
}
