//! Tests for consistency checks and tree repair
//!
//! Rows are corrupted with raw SQL, then `find_problems` must classify them
//! and `fix_tree` must restore a consistent tree.

#[cfg(test)]
mod tests {
    use crate::config::TreeConfig;
    use crate::models::{FixTreeOptions, TreeNode};
    use crate::services::TreeService;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn test_config() -> TreeConfig {
        TreeConfig::default()
            .with_layout(3, "0123456789")
            .with_table("tree_nodes")
    }

    /// Helper to create a test service
    async fn create_test_service() -> (TreeService<Value>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let service = TreeService::open(temp_dir.path().join("test.db"), &test_config())
            .await
            .unwrap();
        (service, temp_dir)
    }

    fn item(title: &str) -> Value {
        json!({ "title": title })
    }

    fn title(node: &TreeNode<Value>) -> String {
        node.data["title"].as_str().unwrap().to_string()
    }

    async fn raw_sql(service: &TreeService<Value>, sql: &str) {
        let conn = service.database().connect().unwrap();
        conn.execute(sql, ()).await.unwrap();
    }

    async fn insert_raw(service: &TreeService<Value>, id: &str, path: &str, depth: i64) {
        raw_sql(
            service,
            &format!(
                "INSERT INTO tree_nodes (id, path, depth, numchild, data) \
                 VALUES ('{}', '{}', {}, 0, '{{\"title\": \"{}\"}}')",
                id, path, depth, id
            ),
        )
        .await;
    }

    #[tokio::test]
    async fn test_clean_tree_has_no_problems() {
        let (service, _temp) = create_test_service().await;

        let mut home = service.add_root(item("Home")).await.unwrap();
        let mut a = service.add_child(&mut home, item("A")).await.unwrap();
        service.add_child(&mut a, item("A1")).await.unwrap();

        assert!(service.find_problems().await.unwrap().is_empty());
        assert!(service.fix_tree(false).await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_find_problems_classifies_rows() {
        let (service, _temp) = create_test_service().await;

        let mut home = service.add_root(item("Home")).await.unwrap();
        let mut a = service.add_child(&mut home, item("A")).await.unwrap();
        service.add_child(&mut a, item("A1")).await.unwrap();

        raw_sql(&service, "UPDATE tree_nodes SET depth = 7 WHERE path = '001001'").await;
        raw_sql(&service, "UPDATE tree_nodes SET numchild = 0 WHERE path = '001'").await;
        insert_raw(&service, "evil", "00a", 1).await;
        insert_raw(&service, "bad", "0010", 1).await;
        insert_raw(&service, "orphan", "009001", 2).await;

        let problems = service.find_problems().await.unwrap();

        assert_eq!(problems.evil_chars, ["evil"]);
        assert_eq!(problems.bad_steplen, ["bad"]);
        assert_eq!(problems.orphans, ["orphan"]);
        assert_eq!(problems.wrong_depth, [a.id.clone()]);
        assert_eq!(problems.wrong_numchild, [home.id.clone()]);
        assert_eq!(problems.total(), 5);
    }

    #[tokio::test]
    async fn test_fix_tree_repairs_counters_and_is_idempotent() {
        let (service, _temp) = create_test_service().await;

        let mut home = service.add_root(item("Home")).await.unwrap();
        let mut a = service.add_child(&mut home, item("A")).await.unwrap();
        service.add_child(&mut a, item("A1")).await.unwrap();
        service.add_child(&mut home, item("B")).await.unwrap();

        raw_sql(&service, "UPDATE tree_nodes SET depth = 9 WHERE path = '001001001'").await;
        raw_sql(&service, "UPDATE tree_nodes SET numchild = 5 WHERE path = '001'").await;
        raw_sql(&service, "UPDATE tree_nodes SET numchild = 0 WHERE path = '001001'").await;
        insert_raw(&service, "orphan", "009001", 2).await;

        let report = service.fix_tree(false).await.unwrap();
        assert_eq!(report.depths_fixed, 1);
        assert_eq!(report.numchild_fixed, 2);
        assert_eq!(report.paths_rewritten, 0);

        let problems = service.find_problems().await.unwrap();
        assert!(problems.wrong_depth.is_empty());
        assert!(problems.wrong_numchild.is_empty());
        // Orphans are reported, not repaired, by the non-destructive fix
        assert_eq!(problems.orphans, ["orphan"]);

        assert_eq!(service.get_node(&home.id).await.unwrap().numchild, 2);
        assert!(service.fix_tree(false).await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_fix_paths_closes_gaps() {
        let (service, _temp) = create_test_service().await;

        let mut home = service.add_root(item("Home")).await.unwrap();
        let a = service.add_child(&mut home, item("A")).await.unwrap();
        let b = service.add_child(&mut home, item("B")).await.unwrap();
        let c = service.add_child(&mut home, item("C")).await.unwrap();
        let mut d = service.add_child(&mut home, item("D")).await.unwrap();
        let d1 = service.add_child(&mut d, item("D1")).await.unwrap();
        service.delete(&a).await.unwrap();
        service.delete(&c).await.unwrap();

        let report = service
            .fix_tree_with(FixTreeOptions::default().with_fix_paths())
            .await
            .unwrap();

        assert_eq!(report.paths_rewritten, 3);
        assert_eq!(service.get_node(&b.id).await.unwrap().path, "001001");
        assert_eq!(service.get_node(&d.id).await.unwrap().path, "001002");
        assert_eq!(service.get_node(&d1.id).await.unwrap().path, "001002001");
        assert!(service.find_problems().await.unwrap().is_empty());

        let again = service
            .fix_tree_with(FixTreeOptions::default().with_fix_paths())
            .await
            .unwrap();
        assert!(again.is_clean());
    }

    #[tokio::test]
    async fn test_fix_paths_applies_node_ordering() {
        let (service, _temp) = create_test_service().await;

        let mut root = service.add_root(item("root")).await.unwrap();
        let z = service.add_child(&mut root, item("z")).await.unwrap();
        let a = service.add_child(&mut root, item("a")).await.unwrap();

        let sorted = TreeService::<Value>::new(Arc::clone(service.database()), &test_config())
            .unwrap()
            .with_node_order_by(|x: &Value, y: &Value| x["title"].as_str().cmp(&y["title"].as_str()));

        let report = sorted
            .fix_tree_with(FixTreeOptions::default().with_fix_paths())
            .await
            .unwrap();

        // z is parked out of the way before a takes its slot
        assert_eq!(report.paths_rewritten, 3);
        assert_eq!(sorted.get_node(&a.id).await.unwrap().path, "001001");
        assert_eq!(sorted.get_node(&z.id).await.unwrap().path, "001002");
        let root = sorted.get_node(&root.id).await.unwrap();
        let titles: Vec<String> = sorted
            .get_children(&root)
            .await
            .unwrap()
            .iter()
            .map(title)
            .collect();
        assert_eq!(titles, ["a", "z"]);
    }

    #[tokio::test]
    async fn test_destructive_rebuild_keeps_ids() {
        let (service, _temp) = create_test_service().await;

        let mut home = service.add_root(item("Home")).await.unwrap();
        let a = service.add_child(&mut home, item("A")).await.unwrap();
        let b = service.add_child(&mut home, item("B")).await.unwrap();
        service.delete(&a).await.unwrap();

        raw_sql(&service, "UPDATE tree_nodes SET numchild = 9 WHERE path = '001'").await;
        insert_raw(&service, "orphan", "009001", 2).await;
        insert_raw(&service, "evil", "00a", 1).await;

        let report = service.fix_tree(true).await.unwrap();

        assert_eq!(report.nodes_rebuilt, 4);
        assert!(service.find_problems().await.unwrap().is_empty());

        let home = service.get_node(&home.id).await.unwrap();
        assert_eq!(home.path, "001");
        assert_eq!(home.numchild, 1);
        assert_eq!(service.get_node(&b.id).await.unwrap().path, "001001");
        // Rows without a surviving ancestor become roots, in path order
        assert_eq!(service.get_node("orphan").await.unwrap().path, "002");
        assert_eq!(service.get_node("evil").await.unwrap().path, "003");
        assert_eq!(service.get_root_nodes().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_fix_rolls_back() {
        let (service, _temp) = create_test_service().await;

        let mut home = service.add_root(item("Home")).await.unwrap();
        service.add_child(&mut home, item("A")).await.unwrap();
        raw_sql(&service, "UPDATE tree_nodes SET numchild = 4 WHERE path = '001'").await;
        // Payload that does not decode blocks the destructive dump
        insert_raw(&service, "broken", "002", 1).await;
        raw_sql(&service, "UPDATE tree_nodes SET data = 'not json' WHERE id = 'broken'").await;

        assert!(service.fix_tree(true).await.is_err());

        let problems = service.find_problems().await.unwrap();
        assert_eq!(problems.wrong_numchild, [home.id.clone()]);
        assert_eq!(service.get_node(&home.id).await.unwrap().numchild, 4);
    }
}
