//! Consistency checks and repair
//!
//! `find_problems` is a read-only scan; `fix_tree` repairs what the scan
//! reports. The non-destructive repair only rewrites the cached `depth` and
//! `numchild` columns with two set-based statements. `fix_paths` also closes
//! gaps in every sibling list, and the destructive repair rebuilds all paths
//! from a dump.

use crate::models::{FixTreeOptions, FixTreeReport, NodeData, TreeProblems};
use crate::operations::TreeError;
use crate::services::TreeService;
use libsql::Connection;
use std::collections::{HashSet, VecDeque};

impl<T: NodeData> TreeService<T> {
    /// Classify every row that breaks a tree invariant
    pub async fn find_problems(&self) -> Result<TreeProblems, TreeError> {
        let conn = self.db.connect_with_timeout().await?;
        let rows = self.table.scan_with_child_counts(&conn).await?;
        let layout = self.layout();

        let paths: HashSet<&str> = rows.iter().map(|row| row.path.as_str()).collect();
        let mut problems = TreeProblems::default();

        for row in &rows {
            if !layout.has_valid_chars(&row.path) {
                problems.evil_chars.push(row.id.clone());
                continue;
            }
            if !layout.has_valid_length(&row.path) {
                problems.bad_steplen.push(row.id.clone());
                continue;
            }

            let depth = layout.depth_of(&row.path);
            if depth > 1 && !paths.contains(layout.parent_path(&row.path)) {
                problems.orphans.push(row.id.clone());
            }
            if row.depth != depth as i64 {
                problems.wrong_depth.push(row.id.clone());
            }
            if row.numchild != row.real_numchild {
                problems.wrong_numchild.push(row.id.clone());
            }
        }

        if !problems.is_empty() {
            tracing::warn!(
                evil_chars = problems.evil_chars.len(),
                bad_steplen = problems.bad_steplen.len(),
                orphans = problems.orphans.len(),
                wrong_depth = problems.wrong_depth.len(),
                wrong_numchild = problems.wrong_numchild.len(),
                "Tree consistency problems found"
            );
        }
        Ok(problems)
    }

    /// Repair cached columns, or rebuild every path when `destructive`
    pub async fn fix_tree(&self, destructive: bool) -> Result<FixTreeReport, TreeError> {
        self.fix_tree_with(FixTreeOptions {
            destructive,
            fix_paths: false,
        })
        .await
    }

    /// Repair the tree in one write transaction
    ///
    /// The destructive rebuild keeps node ids but assigns fresh paths, and
    /// must not run concurrently with other writers.
    pub async fn fix_tree_with(&self, options: FixTreeOptions) -> Result<FixTreeReport, TreeError> {
        let conn = self.db.connect_with_timeout().await?;
        self.db.begin_write(&conn).await?;
        let result = self.fix_tree_in_tx(&conn, options).await;
        let report = self.db.finish(&conn, result).await?;

        tracing::info!(
            destructive = options.destructive,
            fix_paths = options.fix_paths,
            depths_fixed = report.depths_fixed,
            numchild_fixed = report.numchild_fixed,
            paths_rewritten = report.paths_rewritten,
            nodes_rebuilt = report.nodes_rebuilt,
            "Tree repaired"
        );
        Ok(report)
    }

    async fn fix_tree_in_tx(
        &self,
        conn: &Connection,
        options: FixTreeOptions,
    ) -> Result<FixTreeReport, TreeError> {
        let mut report = FixTreeReport::default();

        if options.destructive {
            let dump = self.dump_with(conn, None, true).await?;
            self.table.delete_all(conn).await?;
            report.nodes_rebuilt = self.load_in_tx(conn, dump, None, true).await?.len() as u64;
            return Ok(report);
        }

        report.depths_fixed = self.table.fix_depths(conn).await?;
        if options.fix_paths {
            report.paths_rewritten = self.compact_paths(conn).await?;
        }
        report.numchild_fixed = self.table.fix_numchild(conn).await?;
        Ok(report)
    }

    /// Renumber every sibling list to positions 1..n, parents first
    ///
    /// Siblings keep their current order, or follow the configured node
    /// ordering. A row occupying a slot that is still needed is parked after
    /// the last sibling until its own turn comes.
    async fn compact_paths(&self, conn: &Connection) -> Result<u64, TreeError> {
        let layout = self.layout();
        let mut rewritten = 0;
        let mut parents = VecDeque::from([String::new()]);

        while let Some(parent_path) = parents.pop_front() {
            let mut siblings = self.table.children(conn, &parent_path).await?;
            if siblings.is_empty() {
                continue;
            }

            if self.node_order_by.is_some() {
                let mut keyed = Vec::with_capacity(siblings.len());
                for row in siblings {
                    let data: T = serde_json::from_str(&row.data)?;
                    keyed.push((data, row));
                }
                keyed.sort_by(|(a, _), (b, _)| self.compare(a, b));
                siblings = keyed.into_iter().map(|(_, row)| row).collect();
            }

            let depth = layout.depth_of(&parent_path) + 1;
            let mut current: Vec<String> = siblings.into_iter().map(|row| row.path).collect();
            let mut max_path = current.iter().max().cloned().unwrap_or_default();

            for index in 0..current.len() {
                let wanted = layout.build_path(&parent_path, depth, index as u64 + 1)?;
                if current[index] == wanted {
                    continue;
                }

                if let Some(occupant) = current.iter().position(|path| *path == wanted) {
                    let parked = layout.increment_last_step(&max_path)?;
                    rewritten += self
                        .table
                        .rewrite_subtree(conn, &current[occupant], &parked)
                        .await?;
                    current[occupant] = parked.clone();
                    max_path = parked;
                }

                rewritten += self
                    .table
                    .rewrite_subtree(conn, &current[index], &wanted)
                    .await?;
                current[index] = wanted;
            }

            parents.extend(current);
        }
        Ok(rewritten)
    }
}

#[cfg(test)]
#[path = "consistency_test.rs"]
mod consistency_test;
