//! Tree Service - materialized path tree over one libsql table
//!
//! `TreeService` owns the tree algorithms: where a new node goes, which
//! siblings must shift to make room, how a branch is relocated and which
//! `numchild` counters change. Row access goes through [`TreeTable`], path
//! arithmetic through [`PathLayout`].
//!
//! # Transactions
//!
//! Every mutation runs on one connection inside `BEGIN IMMEDIATE ... COMMIT`
//! and is rolled back on any error, including a `PathOverflow` found after
//! some rows were already shifted. The `*_in_tx` methods assume a write
//! transaction is open and re-read every referenced row by id, so stale
//! in-memory nodes never produce wrong paths.
//!
//! # Examples
//!
//! ```no_run
//! # use mptree_core::{TreeConfig, TreeService, Position};
//! # use serde_json::json;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let service: TreeService<serde_json::Value> =
//!     TreeService::open("./data/tree.db", &TreeConfig::default()).await?;
//!
//! let mut home = service.add_root(json!({"title": "Home"})).await?;
//! let about = service.add_child(&mut home, json!({"title": "About"})).await?;
//! service
//!     .add_sibling(&about, Some(Position::Left), json!({"title": "News"}))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::TreeConfig;
use crate::db::{DatabaseService, NodeRow, TreeTable};
use crate::models::{DumpedNode, NodeData, Position, TreeNode};
use crate::operations::{plan_shift, track_path, ShiftPlan, TreeError};
use crate::path::PathLayout;
use libsql::Connection;
use std::cmp::Ordering;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Comparator deciding sibling order for sorted placement
pub type NodeOrderBy<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// Materialized path tree service
pub struct TreeService<T> {
    /// Database connection and schema owner
    pub(super) db: Arc<DatabaseService>,

    /// Row access for the configured node table
    pub(super) table: TreeTable,

    /// Sibling ordering applied on insert and move
    pub(super) node_order_by: Option<NodeOrderBy<T>>,

    _payload: PhantomData<fn() -> T>,
}

// Manual Clone implementation because T doesn't need to be Clone here
impl<T> Clone for TreeService<T> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            table: self.table.clone(),
            node_order_by: self.node_order_by.clone(),
            _payload: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for TreeService<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeService")
            .field("db_path", &self.db.db_path)
            .field("table", &self.table.name())
            .field("ordered", &self.node_order_by.is_some())
            .finish()
    }
}

impl<T: NodeData> TreeService<T> {
    /// Create a service over an already opened database
    ///
    /// The configuration must be the one the database was opened with.
    pub fn new(db: Arc<DatabaseService>, config: &TreeConfig) -> Result<Self, TreeError> {
        let layout = config.layout()?;
        Ok(Self {
            db,
            table: TreeTable::new(config, layout),
            node_order_by: None,
            _payload: PhantomData,
        })
    }

    /// Open (or create) the database at `db_path` and build a service on it
    pub async fn open(db_path: impl Into<PathBuf>, config: &TreeConfig) -> Result<Self, TreeError> {
        let db = DatabaseService::new(db_path.into(), config).await?;
        Self::new(Arc::new(db), config)
    }

    /// Keep siblings ordered by `compare` on insert and move
    ///
    /// Once set, only `sorted-sibling` and `sorted-child` positions are
    /// accepted. The order is applied when a node is placed; later payload
    /// changes do not re-sort existing siblings.
    pub fn with_node_order_by<F>(mut self, compare: F) -> Self
    where
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        self.node_order_by = Some(Arc::new(compare));
        self
    }

    pub fn database(&self) -> &Arc<DatabaseService> {
        &self.db
    }

    pub fn layout(&self) -> &PathLayout {
        self.table.layout()
    }

    //
    // ROW CONVERSION
    //

    pub(super) fn decode(&self, row: NodeRow) -> Result<TreeNode<T>, TreeError> {
        let data: T = serde_json::from_str(&row.data)?;
        Ok(TreeNode::new(
            row.id,
            row.path,
            row.depth.max(0) as usize,
            row.numchild.max(0) as usize,
            data,
        ))
    }

    pub(super) fn decode_all(&self, rows: Vec<NodeRow>) -> Result<Vec<TreeNode<T>>, TreeError> {
        rows.into_iter().map(|row| self.decode(row)).collect()
    }

    pub(super) async fn require_row(
        &self,
        conn: &Connection,
        id: &str,
    ) -> Result<NodeRow, TreeError> {
        self.table
            .get_by_id(conn, id)
            .await?
            .ok_or_else(|| TreeError::node_not_found(id))
    }

    fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub(super) fn compare(&self, a: &T, b: &T) -> Ordering {
        match &self.node_order_by {
            Some(compare) => compare(a, b),
            None => Ordering::Equal,
        }
    }

    //
    // POSITIONS
    //

    /// Apply the default position and check it against the ordering mode
    fn resolve_position(
        &self,
        position: Option<Position>,
        allow_child: bool,
    ) -> Result<Position, TreeError> {
        let ordered = self.node_order_by.is_some();
        let position = match position {
            Some(position) => position,
            None if ordered => Position::SortedSibling,
            None => Position::LastSibling,
        };

        if position.is_child() && !allow_child {
            return Err(TreeError::invalid_position(
                position.as_str(),
                "child positions are only valid when moving a node",
            ));
        }
        if ordered && !position.is_sorted() {
            return Err(TreeError::invalid_position(
                position.as_str(),
                "only sorted-sibling and sorted-child are allowed when node ordering is configured",
            ));
        }
        if !ordered && position.is_sorted() {
            return Err(TreeError::missing_node_order_by(position.as_str()));
        }
        Ok(position)
    }

    /// Work out the path a node placed at `position` next to `reference_path`
    /// gets, and which siblings must shift first
    ///
    /// `moving` is the current path of a node being moved inside this
    /// sibling list. It is skipped both when searching for a sorted slot and
    /// when collecting the siblings to shift, since the node leaves its slot
    /// before any shift runs.
    async fn place_among_siblings(
        &self,
        conn: &Connection,
        reference_path: &str,
        position: Position,
        data: &T,
        moving: Option<&str>,
    ) -> Result<ShiftPlan, TreeError> {
        let layout = self.layout();
        let siblings = self
            .table
            .children(conn, layout.parent_path(reference_path))
            .await?;
        let last_path = siblings
            .last()
            .map(|row| row.path.clone())
            .unwrap_or_else(|| reference_path.to_string());
        let append = || -> Result<ShiftPlan, TreeError> {
            Ok(ShiftPlan::direct(layout.increment_last_step(&last_path)?))
        };

        let (new_position, first_candidate) = match position {
            Position::LastSibling => return append(),
            Position::Right if reference_path == last_path => return append(),
            Position::FirstSibling => (1, 0),
            Position::Left => (
                layout.last_position(reference_path)?,
                siblings.partition_point(|row| row.path.as_str() < reference_path),
            ),
            Position::Right => (
                layout.last_position(reference_path)? + 1,
                siblings.partition_point(|row| row.path.as_str() <= reference_path),
            ),
            Position::SortedSibling => {
                let mut found = None;
                for (index, row) in siblings.iter().enumerate() {
                    if Some(row.path.as_str()) == moving {
                        continue;
                    }
                    let sibling: T = serde_json::from_str(&row.data)?;
                    if self.compare(&sibling, data) == Ordering::Greater {
                        found = Some(index);
                        break;
                    }
                }
                match found {
                    Some(index) => (layout.last_position(&siblings[index].path)?, index),
                    None => return append(),
                }
            }
            other => {
                return Err(TreeError::invalid_position(
                    other.as_str(),
                    "expected a sibling position",
                ))
            }
        };

        let depth = layout.depth_of(reference_path);
        let new_path = layout.build_path(reference_path, depth, new_position)?;
        let candidates: Vec<&str> = siblings[first_candidate..]
            .iter()
            .map(|row| row.path.as_str())
            .filter(|path| Some(*path) != moving)
            .collect();

        Ok(plan_shift(layout, new_path, &candidates)?)
    }

    async fn apply_shifts(&self, conn: &Connection, plan: &ShiftPlan) -> Result<(), TreeError> {
        for shift in &plan.shifts {
            let moved = self
                .table
                .rewrite_subtree(conn, &shift.old, &shift.new)
                .await?;
            tracing::debug!(from = %shift.old, to = %shift.new, rows = moved, "Shifted sibling branch");
        }
        Ok(())
    }

    async fn insert_node(
        &self,
        conn: &Connection,
        id: String,
        path: String,
        data: T,
    ) -> Result<TreeNode<T>, TreeError> {
        let row = NodeRow {
            id,
            depth: self.layout().depth_of(&path) as i64,
            path,
            numchild: 0,
            data: serde_json::to_string(&data)?,
        };
        self.table.insert(conn, &row).await?;
        Ok(TreeNode::new(row.id, row.path, row.depth as usize, 0, data))
    }

    //
    // MUTATIONS (inside an open write transaction)
    //

    pub(super) async fn add_root_in_tx(
        &self,
        conn: &Connection,
        data: T,
        id: String,
    ) -> Result<TreeNode<T>, TreeError> {
        let path = match self.table.last_child(conn, "").await? {
            Some(last_root) if self.node_order_by.is_some() => {
                return self
                    .add_sibling_in_tx(conn, &last_root.id, Position::SortedSibling, data, id)
                    .await;
            }
            Some(last_root) => self.layout().increment_last_step(&last_root.path)?,
            None => self.layout().build_path("", 1, 1)?,
        };

        self.insert_node(conn, id, path, data).await
    }

    pub(super) async fn add_child_in_tx(
        &self,
        conn: &Connection,
        parent_id: &str,
        data: T,
        id: String,
    ) -> Result<TreeNode<T>, TreeError> {
        let parent = self.require_row(conn, parent_id).await?;
        let layout = self.layout();

        let path = match self.table.last_child(conn, &parent.path).await? {
            Some(last_child) if self.node_order_by.is_some() => {
                return self
                    .add_sibling_in_tx(conn, &last_child.id, Position::SortedSibling, data, id)
                    .await;
            }
            Some(last_child) => layout.increment_last_step(&last_child.path)?,
            None => layout.build_path(&parent.path, layout.depth_of(&parent.path) + 1, 1)?,
        };

        let child = self.insert_node(conn, id, path, data).await?;
        self.table.adjust_numchild(conn, &parent.path, 1).await?;
        Ok(child)
    }

    pub(super) async fn add_sibling_in_tx(
        &self,
        conn: &Connection,
        reference_id: &str,
        position: Position,
        data: T,
        id: String,
    ) -> Result<TreeNode<T>, TreeError> {
        let reference = self.require_row(conn, reference_id).await?;
        let plan = self
            .place_among_siblings(conn, &reference.path, position, &data, None)
            .await?;

        self.apply_shifts(conn, &plan).await?;
        let node = self.insert_node(conn, id, plan.new_path, data).await?;

        let parent_path = self.layout().parent_path(&node.path);
        if !parent_path.is_empty() {
            self.table.adjust_numchild(conn, parent_path, 1).await?;
        }
        Ok(node)
    }

    /// Relocate the branch of `node_id`; returns false for a no-op
    pub(super) async fn move_in_tx(
        &self,
        conn: &Connection,
        node_id: &str,
        target_id: &str,
        position: Position,
    ) -> Result<bool, TreeError> {
        let layout = self.layout();
        let node = self.require_row(conn, node_id).await?;
        let target = self.require_row(conn, target_id).await?;
        let old_path = node.path.clone();

        if target.path.starts_with(&old_path) && (target.path != old_path || position.is_child())
        {
            return Err(TreeError::invalid_move_to_descendant(node_id, target_id));
        }

        let data: T = serde_json::from_str(&node.data)?;
        let mut reference_path = target.path.clone();
        let mut position = position;

        let plan = if position.is_child() {
            match self.table.last_child(conn, &target.path).await? {
                None => Some(ShiftPlan::direct(layout.build_path(
                    &target.path,
                    layout.depth_of(&target.path) + 1,
                    1,
                )?)),
                Some(last_child) => {
                    reference_path = last_child.path;
                    position = position.as_sibling();
                    None
                }
            }
        } else {
            None
        };

        let plan = match plan {
            Some(plan) => plan,
            None => {
                if self
                    .is_already_placed(conn, &old_path, &reference_path, position, &data)
                    .await?
                {
                    tracing::debug!(node_id, position = %position, "Move is a no-op");
                    return Ok(false);
                }
                self.place_among_siblings(
                    conn,
                    &reference_path,
                    position,
                    &data,
                    Some(&old_path),
                )
                .await?
            }
        };

        let new_path = plan.new_path.clone();
        let longest = self.table.longest_path_under(conn, &old_path).await?;
        if longest - old_path.len() + new_path.len() > layout.max_path_length() {
            return Err(TreeError::path_overflow(new_path));
        }

        // Moving left inside its own list, the freed old slot ends the shifted
        // run, so the shift lands on it. The node waits at position 0, which
        // positions never use, until the run has moved.
        let same_list = layout.parent_path(&old_path) == layout.parent_path(&new_path)
            && old_path.len() == new_path.len();
        let parked = if same_list && !plan.is_direct() && new_path < old_path {
            let temp_path = layout.build_path(&new_path, layout.depth_of(&new_path), 0)?;
            self.table.rewrite_subtree(conn, &old_path, &temp_path).await?;
            Some(temp_path)
        } else {
            None
        };

        self.apply_shifts(conn, &plan).await?;

        // Without parking the node is either outside the shifted run or
        // inside the subtree of a shifted sibling; follow it there.
        let current_path = match parked {
            Some(temp_path) => temp_path,
            None => track_path(layout, &old_path, &plan.shifts),
        };
        self.table
            .rewrite_subtree(conn, &current_path, &new_path)
            .await?;

        let old_parent = layout
            .parent_path(&track_path(layout, &old_path, &plan.shifts))
            .to_string();
        let new_parent = layout.parent_path(&new_path);
        if old_parent != new_parent {
            if !old_parent.is_empty() {
                self.table.adjust_numchild(conn, &old_parent, -1).await?;
            }
            if !new_parent.is_empty() {
                self.table.adjust_numchild(conn, new_parent, 1).await?;
            }
        }

        tracing::debug!(node_id, from = %old_path, to = %new_path, "Moved branch");
        Ok(true)
    }

    /// Whether `old_path` already sits where `position` would put it
    async fn is_already_placed(
        &self,
        conn: &Connection,
        old_path: &str,
        reference_path: &str,
        position: Position,
        data: &T,
    ) -> Result<bool, TreeError> {
        let layout = self.layout();
        let parent = layout.parent_path(reference_path);
        if layout.parent_path(old_path) != parent || old_path.len() != reference_path.len() {
            return Ok(false);
        }

        let placed = match position {
            Position::FirstSibling => self
                .table
                .first_child(conn, parent)
                .await?
                .is_some_and(|first| first.path == old_path),
            Position::LastSibling => self
                .table
                .last_child(conn, parent)
                .await?
                .is_some_and(|last| last.path == old_path),
            Position::Left => {
                old_path == reference_path
                    || self
                        .table
                        .adjacent_sibling(conn, old_path, true)
                        .await?
                        .is_some_and(|next| next.path == reference_path)
            }
            Position::Right => {
                old_path == reference_path
                    || self
                        .table
                        .adjacent_sibling(conn, old_path, false)
                        .await?
                        .is_some_and(|prev| prev.path == reference_path)
            }
            Position::SortedSibling => {
                // In place when the first other sibling sorting after the
                // node is its current right neighbour (or there is none and
                // the node is last).
                let siblings = self.table.children(conn, parent).await?;
                let mut first_greater = None;
                for row in siblings.iter().filter(|row| row.path != old_path) {
                    let sibling: T = serde_json::from_str(&row.data)?;
                    if self.compare(&sibling, data) == Ordering::Greater {
                        first_greater = Some(row.path.clone());
                        break;
                    }
                }
                let next = siblings
                    .iter()
                    .find(|row| row.path.as_str() > old_path)
                    .map(|row| row.path.clone());
                first_greater == next
            }
            _ => false,
        };
        Ok(placed)
    }

    pub(super) async fn delete_in_tx(&self, conn: &Connection, id: &str) -> Result<u64, TreeError> {
        let node = self.require_row(conn, id).await?;
        let removed = self.table.delete_subtree(conn, &node.path).await?;

        let parent_path = self.layout().parent_path(&node.path);
        if !parent_path.is_empty() {
            self.table.adjust_numchild(conn, parent_path, -1).await?;
        }
        Ok(removed)
    }

    /// Insert nested nodes in DFS pre-order, returning the new ids in order
    pub(super) async fn load_in_tx(
        &self,
        conn: &Connection,
        nodes: Vec<DumpedNode<T>>,
        parent_id: Option<String>,
        keep_ids: bool,
    ) -> Result<Vec<String>, TreeError> {
        let mut ids = Vec::new();
        let mut stack: Vec<(Option<String>, DumpedNode<T>)> = nodes
            .into_iter()
            .rev()
            .map(|node| (parent_id.clone(), node))
            .collect();

        while let Some((parent_id, dumped)) = stack.pop() {
            let id = match (keep_ids, dumped.id) {
                (true, Some(id)) => id,
                _ => Self::new_id(),
            };
            let created = match &parent_id {
                Some(parent_id) => self.add_child_in_tx(conn, parent_id, dumped.data, id).await?,
                None => self.add_root_in_tx(conn, dumped.data, id).await?,
            };

            for child in dumped.children.into_iter().rev() {
                stack.push((Some(created.id.clone()), child));
            }
            ids.push(created.id);
        }
        Ok(ids)
    }

    //
    // PUBLIC MUTATIONS
    //

    /// Add a new root node after the existing roots (or in sorted order)
    ///
    /// # Errors
    ///
    /// `PathOverflow` when the root level is full.
    pub async fn add_root(&self, data: T) -> Result<TreeNode<T>, TreeError> {
        let conn = self.db.connect_with_timeout().await?;
        self.db.begin_write(&conn).await?;
        let result = self.add_root_in_tx(&conn, data, Self::new_id()).await;
        let node = self.db.finish(&conn, result).await?;

        tracing::info!(id = %node.id, path = %node.path, "Added root node");
        Ok(node)
    }

    /// Add a new node as the last child of `parent` (or in sorted order)
    ///
    /// `parent` is refreshed from storage afterwards, so its `numchild`
    /// includes the new child; the child caches `parent` as its parent.
    pub async fn add_child(&self, parent: &mut TreeNode<T>, data: T) -> Result<TreeNode<T>, TreeError> {
        let conn = self.db.connect_with_timeout().await?;
        self.db.begin_write(&conn).await?;
        let result = self
            .add_child_in_tx(&conn, &parent.id, data, Self::new_id())
            .await;
        let mut child = self.db.finish(&conn, result).await?;

        self.refresh_with(&conn, parent).await?;
        child.set_cached_parent(Some(parent.clone()));

        tracing::info!(id = %child.id, path = %child.path, parent = %parent.id, "Added child node");
        Ok(child)
    }

    /// Add a new node next to `reference`
    ///
    /// `position` must be a sibling position; `None` means `sorted-sibling`
    /// with ordering configured and `last-sibling` otherwise.
    pub async fn add_sibling(
        &self,
        reference: &TreeNode<T>,
        position: Option<Position>,
        data: T,
    ) -> Result<TreeNode<T>, TreeError> {
        let position = self.resolve_position(position, false)?;

        let conn = self.db.connect_with_timeout().await?;
        self.db.begin_write(&conn).await?;
        let result = self
            .add_sibling_in_tx(&conn, &reference.id, position, data, Self::new_id())
            .await;
        let node = self.db.finish(&conn, result).await?;

        tracing::info!(id = %node.id, path = %node.path, position = %position, "Added sibling node");
        Ok(node)
    }

    /// Move `node` and its subtree relative to `target`
    ///
    /// On success `node` is refreshed from storage and its cached parent
    /// dropped.
    ///
    /// # Errors
    ///
    /// - `InvalidMoveToDescendant` if `target` is inside the subtree of
    ///   `node`, or `node` itself with a child position
    /// - `PathOverflow` if the new position or the relocated subtree does not
    ///   fit; storage is left unchanged
    pub async fn move_node(
        &self,
        node: &mut TreeNode<T>,
        target: &TreeNode<T>,
        position: Option<Position>,
    ) -> Result<(), TreeError> {
        let position = self.resolve_position(position, true)?;

        let conn = self.db.connect_with_timeout().await?;
        self.db.begin_write(&conn).await?;
        let result = self.move_in_tx(&conn, &node.id, &target.id, position).await;
        let moved = self.db.finish(&conn, result).await?;

        self.refresh_with(&conn, node).await?;
        node.invalidate_parent();

        if moved {
            tracing::info!(id = %node.id, path = %node.path, target = %target.id, position = %position, "Moved node");
        }
        Ok(())
    }

    /// Delete `node` and its whole subtree; returns the number of rows removed
    pub async fn delete(&self, node: &TreeNode<T>) -> Result<u64, TreeError> {
        let conn = self.db.connect_with_timeout().await?;
        self.db.begin_write(&conn).await?;
        let result = self.delete_in_tx(&conn, &node.id).await;
        let removed = self.db.finish(&conn, result).await?;

        tracing::info!(id = %node.id, removed, "Deleted subtree");
        Ok(removed)
    }

    /// Delete several nodes and their subtrees in one transaction
    ///
    /// Ids inside another deleted subtree, or already gone, are skipped.
    pub async fn delete_many(&self, ids: &[String]) -> Result<u64, TreeError> {
        let conn = self.db.connect_with_timeout().await?;
        self.db.begin_write(&conn).await?;
        let result = self.delete_many_in_tx(&conn, ids).await;
        let removed = self.db.finish(&conn, result).await?;

        tracing::info!(requested = ids.len(), removed, "Deleted subtrees");
        Ok(removed)
    }

    async fn delete_many_in_tx(&self, conn: &Connection, ids: &[String]) -> Result<u64, TreeError> {
        let rows = self.table.rows_by_ids(conn, ids).await?;
        let mut removed_prefixes: Vec<String> = Vec::new();
        let mut removed = 0;

        for row in rows {
            if removed_prefixes
                .iter()
                .any(|prefix| row.path.starts_with(prefix.as_str()))
            {
                continue;
            }
            removed += self.table.delete_subtree(conn, &row.path).await?;

            let parent_path = self.layout().parent_path(&row.path);
            if !parent_path.is_empty() {
                self.table.adjust_numchild(conn, parent_path, -1).await?;
            }
            removed_prefixes.push(row.path);
        }
        Ok(removed)
    }

    /// Write `node.data` back to storage; the tree position is untouched
    pub async fn save_data(&self, node: &TreeNode<T>) -> Result<(), TreeError> {
        let conn = self.db.connect_with_timeout().await?;
        let data = serde_json::to_string(&node.data)?;
        let updated = self.table.update_data(&conn, &node.id, &data).await?;
        if updated == 0 {
            return Err(TreeError::node_not_found(node.id.clone()));
        }
        Ok(())
    }

    /// Insert nested nodes under `parent` (or as roots)
    ///
    /// With `keep_ids`, ids present in the dump are reused. Returns the ids
    /// of all inserted nodes in DFS pre-order.
    pub async fn load_tree(
        &self,
        nodes: Vec<DumpedNode<T>>,
        parent: Option<&TreeNode<T>>,
        keep_ids: bool,
    ) -> Result<Vec<String>, TreeError> {
        let conn = self.db.connect_with_timeout().await?;
        self.db.begin_write(&conn).await?;
        let result = self
            .load_in_tx(&conn, nodes, parent.map(|p| p.id.clone()), keep_ids)
            .await;
        let ids = self.db.finish(&conn, result).await?;

        tracing::info!(loaded = ids.len(), "Loaded tree");
        Ok(ids)
    }

    //
    // READS
    //

    async fn read_conn(&self) -> Result<Connection, TreeError> {
        Ok(self.db.connect_with_timeout().await?)
    }

    fn decode_opt(&self, row: Option<NodeRow>) -> Result<Option<TreeNode<T>>, TreeError> {
        row.map(|row| self.decode(row)).transpose()
    }

    /// Re-read position fields and payload of `node` from storage
    async fn refresh_with(&self, conn: &Connection, node: &mut TreeNode<T>) -> Result<(), TreeError> {
        let fresh = self.decode(self.require_row(conn, &node.id).await?)?;
        node.path = fresh.path;
        node.depth = fresh.depth;
        node.numchild = fresh.numchild;
        node.data = fresh.data;
        Ok(())
    }

    pub async fn refresh(&self, node: &mut TreeNode<T>) -> Result<(), TreeError> {
        let conn = self.read_conn().await?;
        self.refresh_with(&conn, node).await?;
        node.invalidate_parent();
        Ok(())
    }

    pub async fn get_node(&self, id: &str) -> Result<TreeNode<T>, TreeError> {
        let conn = self.read_conn().await?;
        self.decode(self.require_row(&conn, id).await?)
    }

    pub async fn get_root_nodes(&self) -> Result<Vec<TreeNode<T>>, TreeError> {
        let conn = self.read_conn().await?;
        self.decode_all(self.table.children(&conn, "").await?)
    }

    pub async fn get_first_root_node(&self) -> Result<Option<TreeNode<T>>, TreeError> {
        let conn = self.read_conn().await?;
        self.decode_opt(self.table.first_child(&conn, "").await?)
    }

    pub async fn get_last_root_node(&self) -> Result<Option<TreeNode<T>>, TreeError> {
        let conn = self.read_conn().await?;
        self.decode_opt(self.table.last_child(&conn, "").await?)
    }

    /// Direct children in sibling order
    pub async fn get_children(&self, node: &TreeNode<T>) -> Result<Vec<TreeNode<T>>, TreeError> {
        if node.is_leaf() {
            return Ok(Vec::new());
        }
        let conn = self.read_conn().await?;
        self.decode_all(self.table.children(&conn, &node.path).await?)
    }

    pub async fn get_first_child(&self, node: &TreeNode<T>) -> Result<Option<TreeNode<T>>, TreeError> {
        let conn = self.read_conn().await?;
        self.decode_opt(self.table.first_child(&conn, &node.path).await?)
    }

    pub async fn get_last_child(&self, node: &TreeNode<T>) -> Result<Option<TreeNode<T>>, TreeError> {
        let conn = self.read_conn().await?;
        self.decode_opt(self.table.last_child(&conn, &node.path).await?)
    }

    /// All nodes sharing the parent of `node`, `node` included
    pub async fn get_siblings(&self, node: &TreeNode<T>) -> Result<Vec<TreeNode<T>>, TreeError> {
        let conn = self.read_conn().await?;
        self.decode_all(self.table.children(&conn, node.parent_path()).await?)
    }

    pub async fn get_first_sibling(&self, node: &TreeNode<T>) -> Result<Option<TreeNode<T>>, TreeError> {
        let conn = self.read_conn().await?;
        self.decode_opt(self.table.first_child(&conn, node.parent_path()).await?)
    }

    pub async fn get_last_sibling(&self, node: &TreeNode<T>) -> Result<Option<TreeNode<T>>, TreeError> {
        let conn = self.read_conn().await?;
        self.decode_opt(self.table.last_child(&conn, node.parent_path()).await?)
    }

    pub async fn get_next_sibling(&self, node: &TreeNode<T>) -> Result<Option<TreeNode<T>>, TreeError> {
        let conn = self.read_conn().await?;
        self.decode_opt(self.table.adjacent_sibling(&conn, &node.path, true).await?)
    }

    pub async fn get_prev_sibling(&self, node: &TreeNode<T>) -> Result<Option<TreeNode<T>>, TreeError> {
        let conn = self.read_conn().await?;
        self.decode_opt(self.table.adjacent_sibling(&conn, &node.path, false).await?)
    }

    /// Ancestors from the root down to the parent
    pub async fn get_ancestors(&self, node: &TreeNode<T>) -> Result<Vec<TreeNode<T>>, TreeError> {
        if node.is_root() {
            return Ok(Vec::new());
        }
        let conn = self.read_conn().await?;
        self.decode_all(self.table.ancestors(&conn, &node.path).await?)
    }

    /// All nodes below `node` in DFS pre-order
    pub async fn get_descendants(&self, node: &TreeNode<T>) -> Result<Vec<TreeNode<T>>, TreeError> {
        if node.is_leaf() {
            return Ok(Vec::new());
        }
        let conn = self.read_conn().await?;
        self.decode_all(self.table.descendants(&conn, &node.path).await?)
    }

    pub async fn get_descendant_count(&self, node: &TreeNode<T>) -> Result<u64, TreeError> {
        let conn = self.read_conn().await?;
        Ok(self.table.count_descendants(&conn, &node.path).await?)
    }

    /// Parent of `node`, cached on the node after the first lookup
    ///
    /// `force_reload` ignores and replaces the cached value.
    pub async fn get_parent(
        &self,
        node: &mut TreeNode<T>,
        force_reload: bool,
    ) -> Result<Option<TreeNode<T>>, TreeError> {
        if node.is_root() {
            return Ok(None);
        }
        if !force_reload {
            if let Some(parent) = node.cached_parent() {
                return Ok(Some(parent.clone()));
            }
        }

        let conn = self.read_conn().await?;
        let parent = self.decode_opt(self.table.get_by_path(&conn, node.parent_path()).await?)?;
        node.set_cached_parent(parent.clone());
        Ok(parent)
    }

    /// The root of the tree `node` belongs to
    pub async fn get_root(&self, node: &TreeNode<T>) -> Result<TreeNode<T>, TreeError> {
        if node.is_root() {
            return Ok(node.clone());
        }
        let conn = self.read_conn().await?;
        let root_path = self.layout().basepath(&node.path, 1);
        self.table
            .get_by_path(&conn, root_path)
            .await?
            .ok_or_else(|| TreeError::node_not_found(root_path))
            .and_then(|row| self.decode(row))
    }

    /// `parent` followed by its descendants, or the whole forest
    pub async fn get_tree(&self, parent: Option<&TreeNode<T>>) -> Result<Vec<TreeNode<T>>, TreeError> {
        let conn = self.read_conn().await?;
        let rows = match parent {
            Some(parent) => self.table.subtree(&conn, &parent.path).await?,
            None => self.table.all(&conn).await?,
        };
        self.decode_all(rows)
    }

    /// Nested export of the subtree of `parent`, or of the whole forest
    ///
    /// Rows whose parent row is missing are attached to their nearest
    /// existing ancestor, or exported at the top level.
    pub async fn dump_tree(
        &self,
        parent: Option<&TreeNode<T>>,
        keep_ids: bool,
    ) -> Result<Vec<DumpedNode<T>>, TreeError> {
        let conn = self.read_conn().await?;
        self.dump_with(&conn, parent.map(|p| p.path.as_str()), keep_ids)
            .await
    }

    pub(super) async fn dump_with(
        &self,
        conn: &Connection,
        parent_path: Option<&str>,
        keep_ids: bool,
    ) -> Result<Vec<DumpedNode<T>>, TreeError> {
        let rows = match parent_path {
            Some(path) => self.table.subtree(conn, path).await?,
            None => self.table.all(conn).await?,
        };
        nest_rows(rows, keep_ids)
    }
}

/// Fold rows in path order into nested dump nodes
fn nest_rows<T: NodeData>(rows: Vec<NodeRow>, keep_ids: bool) -> Result<Vec<DumpedNode<T>>, TreeError> {
    let mut top = Vec::new();
    let mut stack: Vec<(String, DumpedNode<T>)> = Vec::new();

    fn close<T>(stack: &mut Vec<(String, DumpedNode<T>)>, top: &mut Vec<DumpedNode<T>>) {
        if let Some((_, done)) = stack.pop() {
            match stack.last_mut() {
                Some((_, parent)) => parent.children.push(done),
                None => top.push(done),
            }
        }
    }

    for row in rows {
        while let Some((open_path, _)) = stack.last() {
            if row.path.len() > open_path.len() && row.path.starts_with(open_path.as_str()) {
                break;
            }
            close(&mut stack, &mut top);
        }

        let mut dumped = DumpedNode::new(serde_json::from_str(&row.data)?);
        if keep_ids {
            dumped.id = Some(row.id);
        }
        stack.push((row.path, dumped));
    }
    while !stack.is_empty() {
        close(&mut stack, &mut top);
    }
    Ok(top)
}

// Comprehensive tests in separate module
#[cfg(test)]
#[path = "tree_service_test.rs"]
mod tree_service_test;
