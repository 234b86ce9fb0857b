//! The resolved command hierarchy.
//!
//! Nodes are keyed by path segment. A node is either a leaf command or a
//! group; groups are *declared* (contributed through
//! [`CommandSpec::group`](super::CommandSpec::group)) or *synthesized* when a
//! command is mounted below a group nobody declared.
//!
//! ```text
//! insert [settings, ping]        settings*  (synthesized, help-only)
//!                                └── ping
//! insert [settings]  (group)     settings   (adopted as declared)
//!                                └── ping
//! remove ping's extension        settings   (declared, kept)
//! remove settings' extension     <empty>    (nothing left below it)
//! ```
//!
//! All mutations validate first and mutate second, so a rejected insert never
//! leaves a synthesized group behind.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;

use tracing::debug;

use super::Command;
use crate::error::{ConflictReason, RegistryError, RegistryResult};

#[derive(Debug)]
struct Node {
    command: Arc<Command>,
    children: BTreeMap<String, Node>,
    synthesized: bool,
}

impl Node {
    fn declared(command: Arc<Command>) -> Self {
        Self {
            command,
            children: BTreeMap::new(),
            synthesized: false,
        }
    }

    fn synthesized(path: Vec<String>) -> Self {
        Self {
            command: Arc::new(Command::synthesized_group(path)),
            children: BTreeMap::new(),
            synthesized: true,
        }
    }

    fn child_commands(&self) -> Vec<Arc<Command>> {
        self.children
            .values()
            .map(|n| Arc::clone(&n.command))
            .collect()
    }
}

/// Result of resolving the words of a message against the tree.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// The deepest command matched.
    pub command: Arc<Command>,
    /// How many leading words named the command; the rest are arguments.
    pub depth: usize,
    /// Subcommands of `command`, empty for leaves.
    pub children: Vec<Arc<Command>>,
}

/// Hierarchical command table.
#[derive(Debug, Default)]
pub struct CommandTree {
    roots: BTreeMap<String, Node>,
}

impl CommandTree {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Mutation ───────────────────────────────────────────────────────────

    /// Mounts `command` at its path.
    ///
    /// Missing groups on the way are synthesized. Fails without side effects
    /// when a path component is a leaf, or when the final position is taken;
    /// the one exception is a declared group landing on a synthesized group,
    /// which adopts the existing children.
    pub fn insert(&mut self, command: Command) -> RegistryResult<Arc<Command>> {
        self.check_insert(&command)?;

        let command = Arc::new(command);
        let path = command.path().to_vec();
        let Some((last, parents)) = path.split_last() else {
            return Err(RegistryError::invalid_name(
                command.declared_name(),
                "name is empty",
            ));
        };

        let mut level = &mut self.roots;
        for (depth, segment) in parents.iter().enumerate() {
            let node = level.entry(segment.clone()).or_insert_with(|| {
                debug!(group = %path[..=depth].join(" "), "Synthesizing command group");
                Node::synthesized(path[..=depth].to_vec())
            });
            level = &mut node.children;
        }

        match level.entry(last.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(Node::declared(Arc::clone(&command)));
            }
            Entry::Occupied(slot) => {
                // Only reachable for a declared group over a synthesized one.
                let node = slot.into_mut();
                node.command = Arc::clone(&command);
                node.synthesized = false;
            }
        }
        Ok(command)
    }

    fn check_insert(&self, command: &Command) -> RegistryResult<()> {
        let path = command.path();
        let mut level = &self.roots;
        for (depth, segment) in path.iter().enumerate() {
            let Some(node) = level.get(segment) else {
                return Ok(());
            };
            if depth + 1 == path.len() {
                if command.is_group() && node.synthesized {
                    return Ok(());
                }
                return Err(RegistryError::conflict(
                    command.declared_name(),
                    ConflictReason::NameTaken,
                ));
            }
            if !node.command.is_group() {
                return Err(RegistryError::conflict(
                    command.declared_name(),
                    ConflictReason::LeafIsNotGroup {
                        group: node.command.qualified_name(),
                    },
                ));
            }
            level = &node.children;
        }
        Ok(())
    }

    /// Removes the node at `path` together with its subcommands, then prunes
    /// synthesized groups left empty.
    pub fn remove(&mut self, path: &[String]) -> Option<Arc<Command>> {
        fn walk(level: &mut BTreeMap<String, Node>, path: &[String]) -> Option<Arc<Command>> {
            let (first, rest) = path.split_first()?;
            if rest.is_empty() {
                return level.remove(first).map(|n| n.command);
            }
            let node = level.get_mut(first)?;
            let removed = walk(&mut node.children, rest);
            if removed.is_some() && node.synthesized && node.children.is_empty() {
                level.remove(first);
            }
            removed
        }
        walk(&mut self.roots, path)
    }

    /// Removes every command contributed by `extension` and returns them.
    ///
    /// A declared group of `extension` that still holds foreign subcommands
    /// is demoted to a synthesized group instead of being dropped.
    pub fn remove_owned_by(&mut self, extension: &str) -> Vec<Arc<Command>> {
        fn prune(
            level: &mut BTreeMap<String, Node>,
            extension: &str,
            removed: &mut Vec<Arc<Command>>,
        ) {
            level.retain(|_, node| {
                prune(&mut node.children, extension, removed);
                if node.command.is_owned_by(extension) {
                    removed.push(Arc::clone(&node.command));
                    if node.children.is_empty() {
                        return false;
                    }
                    node.command = Arc::new(Command::synthesized_group(node.command.path().to_vec()));
                    node.synthesized = true;
                    return true;
                }
                !(node.synthesized && node.children.is_empty())
            });
        }

        let mut removed = Vec::new();
        prune(&mut self.roots, extension, &mut removed);
        removed
    }

    // ─── Lookup ─────────────────────────────────────────────────────────────

    /// Matches the longest command path that prefixes `words`.
    pub fn resolve(&self, words: &[String]) -> Option<Resolved> {
        let (first, rest) = words.split_first()?;
        let mut node = self.roots.get(first.as_str())?;
        let mut depth = 1;
        for word in rest {
            if !node.command.is_group() {
                break;
            }
            match node.children.get(word.as_str()) {
                Some(child) => {
                    node = child;
                    depth += 1;
                }
                None => break,
            }
        }
        Some(Resolved {
            command: Arc::clone(&node.command),
            depth,
            children: node.child_commands(),
        })
    }

    fn node(&self, path: &[String]) -> Option<&Node> {
        let (first, rest) = path.split_first()?;
        let mut node = self.roots.get(first)?;
        for segment in rest {
            node = node.children.get(segment)?;
        }
        Some(node)
    }

    /// The command at exactly `path`.
    pub fn get(&self, path: &[String]) -> Option<Arc<Command>> {
        self.node(path).map(|n| Arc::clone(&n.command))
    }

    /// Subcommands of the group at `path`; top-level commands for an empty
    /// path.
    pub fn children(&self, path: &[String]) -> Vec<Arc<Command>> {
        if path.is_empty() {
            return self.roots.values().map(|n| Arc::clone(&n.command)).collect();
        }
        self.node(path).map(Node::child_commands).unwrap_or_default()
    }

    /// Returns `true` if the node at `path` was synthesized.
    pub fn is_synthesized(&self, path: &[String]) -> bool {
        self.node(path).is_some_and(|n| n.synthesized)
    }

    /// Every mounted command, depth-first in name order.
    pub fn commands(&self) -> Vec<Arc<Command>> {
        fn collect(level: &BTreeMap<String, Node>, out: &mut Vec<Arc<Command>>) {
            for node in level.values() {
                out.push(Arc::clone(&node.command));
                collect(&node.children, out);
            }
        }
        let mut out = Vec::new();
        collect(&self.roots, &mut out);
        out
    }

    /// Qualified names of every node, depth-first in name order.
    pub fn shape(&self) -> Vec<String> {
        self.commands().iter().map(|c| c.qualified_name()).collect()
    }

    /// Number of mounted nodes, synthesized groups included.
    pub fn len(&self) -> usize {
        self.commands().len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Returns `true` if any command is attributed to `extension`.
    pub fn has_commands_of(&self, extension: &str) -> bool {
        self.commands().iter().any(|c| c.is_owned_by(extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandSpec, GroupingMode, Owner, split_name};

    fn spec_leaf(name: &str) -> CommandSpec {
        CommandSpec::new(name, || async {})
    }

    fn mount(tree: &mut CommandTree, spec: CommandSpec, ext: &str, mode: GroupingMode) -> RegistryResult<Arc<Command>> {
        let path = split_name(spec.name(), mode)
            .map_err(|r| RegistryError::invalid_name(spec.name(), r))?;
        tree.insert(spec.build(path, Some(Owner::extension(ext)), &[]))
    }

    fn leaf(tree: &mut CommandTree, name: &str, ext: &str) -> RegistryResult<Arc<Command>> {
        mount(tree, spec_leaf(name), ext, GroupingMode::Nested)
    }

    fn words(s: &str) -> Vec<String> {
        s.split(' ').map(str::to_string).collect()
    }

    #[test]
    fn settings_ping_resolves_into_a_two_level_tree() {
        let mut tree = CommandTree::new();
        leaf(&mut tree, "settings_ping", "ext").unwrap();

        assert_eq!(tree.shape(), vec!["settings", "settings ping"]);
        assert!(tree.is_synthesized(&words("settings")));
        let group = tree.get(&words("settings")).unwrap();
        assert!(group.is_group());
        assert!(group.callback().is_none());
        assert_eq!(group.help(), Some("settings command group"));
    }

    #[test]
    fn nested_mode_builds_every_level() {
        let mut tree = CommandTree::new();
        leaf(&mut tree, "a_b_c", "ext").unwrap();
        assert_eq!(tree.shape(), vec!["a", "a b", "a b c"]);
        assert!(tree.is_synthesized(&words("a b")));
    }

    #[test]
    fn moderation_tree_in_single_mode() {
        let mut tree = CommandTree::new();
        for name in ["kick", "settings_set_log_channel", "settings_get_log_channel"] {
            mount(&mut tree, spec_leaf(name), "moderation", GroupingMode::Single).unwrap();
        }
        assert_eq!(
            tree.shape(),
            vec![
                "kick",
                "settings",
                "settings get_log_channel",
                "settings set_log_channel"
            ]
        );
    }

    #[test]
    fn second_top_level_command_conflicts_and_first_survives() {
        let mut tree = CommandTree::new();
        let first = leaf(&mut tree, "kick", "a").unwrap();
        let err = leaf(&mut tree, "kick", "b").unwrap_err();
        assert!(matches!(
            err,
            RegistryError::CommandConflict {
                reason: ConflictReason::NameTaken,
                ..
            }
        ));
        let current = tree.get(&words("kick")).unwrap();
        assert!(Arc::ptr_eq(&first, &current));
    }

    #[test]
    fn leaf_cannot_become_a_group() {
        let mut tree = CommandTree::new();
        leaf(&mut tree, "settings", "ext").unwrap();
        let err = leaf(&mut tree, "settings_ping", "ext").unwrap_err();
        assert_eq!(
            err,
            RegistryError::conflict(
                "settings_ping",
                ConflictReason::LeafIsNotGroup {
                    group: "settings".into()
                }
            )
        );
        assert_eq!(tree.shape(), vec!["settings"]);
    }

    #[test]
    fn rejected_insert_leaves_no_synthesized_group() {
        let mut tree = CommandTree::new();
        leaf(&mut tree, "a", "ext").unwrap();
        assert!(leaf(&mut tree, "a_b_c", "ext").is_err());
        assert_eq!(tree.shape(), vec!["a"]);
    }

    #[test]
    fn leaf_onto_group_conflicts() {
        let mut tree = CommandTree::new();
        leaf(&mut tree, "settings_ping", "ext").unwrap();
        assert!(leaf(&mut tree, "settings", "other").is_err());
    }

    #[test]
    fn declared_group_adopts_synthesized_children() {
        let mut tree = CommandTree::new();
        leaf(&mut tree, "settings_ping", "a").unwrap();
        mount(&mut tree, CommandSpec::group("settings").help("Settings."), "b", GroupingMode::Nested).unwrap();

        assert!(!tree.is_synthesized(&words("settings")));
        assert_eq!(tree.get(&words("settings")).unwrap().help(), Some("Settings."));
        assert_eq!(tree.shape(), vec!["settings", "settings ping"]);

        let again = mount(&mut tree, CommandSpec::group("settings"), "c", GroupingMode::Nested);
        assert!(again.is_err());
    }

    #[test]
    fn removing_an_extension_prunes_its_synthesized_groups() {
        let mut tree = CommandTree::new();
        leaf(&mut tree, "kick", "moderation").unwrap();
        leaf(&mut tree, "settings_ping", "moderation").unwrap();
        leaf(&mut tree, "echo", "fun").unwrap();

        let removed = tree.remove_owned_by("moderation");
        assert_eq!(removed.len(), 2);
        assert_eq!(tree.shape(), vec!["echo"]);
        assert!(!tree.has_commands_of("moderation"));
    }

    #[test]
    fn synthesized_group_shared_by_two_extensions_survives_one_removal() {
        let mut tree = CommandTree::new();
        leaf(&mut tree, "settings_ping", "a").unwrap();
        leaf(&mut tree, "settings_pong", "b").unwrap();

        tree.remove_owned_by("a");
        assert_eq!(tree.shape(), vec!["settings", "settings pong"]);
    }

    #[test]
    fn declared_group_with_foreign_children_is_demoted() {
        let mut tree = CommandTree::new();
        mount(&mut tree, CommandSpec::group("settings"), "a", GroupingMode::Nested).unwrap();
        leaf(&mut tree, "settings_ping", "b").unwrap();

        tree.remove_owned_by("a");
        assert!(tree.is_synthesized(&words("settings")));
        assert_eq!(tree.shape(), vec!["settings", "settings ping"]);

        tree.remove_owned_by("b");
        assert!(tree.is_empty());
    }

    #[test]
    fn remove_single_command_prunes_empty_ancestors() {
        let mut tree = CommandTree::new();
        leaf(&mut tree, "a_b_c", "ext").unwrap();
        assert!(tree.remove(&words("a b c")).is_some());
        assert!(tree.is_empty());
        assert!(tree.remove(&words("a")).is_none());
    }

    #[test]
    fn resolve_consumes_the_longest_command_path() {
        let mut tree = CommandTree::new();
        leaf(&mut tree, "settings_set_prefix", "ext").unwrap();

        let hit = tree.resolve(&words("settings set prefix ? extra")).unwrap();
        assert_eq!(hit.command.qualified_name(), "settings set prefix");
        assert_eq!(hit.depth, 3);
        assert!(hit.children.is_empty());

        // `set_prefix` is not a path in nested mode; the walk stops at the group.
        let group = tree.resolve(&words("settings set_prefix ?")).unwrap();
        assert!(group.command.is_group());
        assert_eq!(group.command.qualified_name(), "settings");
        assert_eq!(group.depth, 1);
        assert_eq!(group.children.len(), 1);

        assert!(tree.resolve(&words("unknown")).is_none());
        assert!(tree.resolve(&[]).is_none());
    }

    #[test]
    fn single_mode_resolves_the_joined_leaf() {
        let mut tree = CommandTree::new();
        mount(&mut tree, spec_leaf("settings_set_prefix"), "ext", GroupingMode::Single).unwrap();

        let hit = tree.resolve(&words("settings set_prefix ? extra")).unwrap();
        assert_eq!(hit.command.qualified_name(), "settings set_prefix");
        assert_eq!(hit.depth, 2);
    }

    #[test]
    fn resolution_is_case_sensitive() {
        let mut tree = CommandTree::new();
        leaf(&mut tree, "ping", "ext").unwrap();
        assert!(tree.resolve(&words("Ping")).is_none());
    }
}
