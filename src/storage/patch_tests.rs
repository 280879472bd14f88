#[cfg(test)]
mod tests {
    use crate::models::{DeviceType, NewVisit};
    use crate::storage::{SqliteStorage, Storage};
    use std::sync::Arc;

    async fn setup_sqlite() -> Arc<dyn Storage> {
        let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
        storage.init().await.unwrap();
        Arc::new(storage)
    }

    fn visit(ip: &str, visit_time: i64) -> NewVisit {
        NewVisit {
            user_id: None,
            ip_address: ip.to_string(),
            url: "/index.html".to_string(),
            http_method: Some("GET".to_string()),
            user_agent: None,
            referer: None,
            traffic_source: None,
            page_stay_time_sec: None,
            session_id: format!("{}_{}", ip, visit_time),
            device_type: DeviceType::Unknown,
            operating_system: None,
            browser: None,
            is_new_visitor: true,
            visit_time,
        }
    }

    #[tokio::test]
    async fn test_patch_response_fills_both_fields() {
        let storage = setup_sqlite().await;
        let id = storage.insert_visit(&visit("10.0.0.1", 1_000)).await.unwrap();

        let before = storage.get_visit(id).await.unwrap().unwrap();
        assert_eq!(before.status_code, None);
        assert_eq!(before.response_time_ms, None);

        let patched = storage.patch_response(id, 200, 17).await.unwrap();
        assert!(patched, "Should have patched the visit");

        let after = storage.get_visit(id).await.unwrap().unwrap();
        assert_eq!(after.status_code, Some(200));
        assert_eq!(after.response_time_ms, Some(17));

        // Nothing else moves
        assert_eq!(after.visit_time, before.visit_time);
        assert_eq!(after.session_id, before.session_id);
        assert_eq!(after.is_new_visitor, before.is_new_visitor);
    }

    #[tokio::test]
    async fn test_patch_response_nonexistent_visit() {
        let storage = setup_sqlite().await;

        let patched = storage.patch_response(9999, 500, 3).await.unwrap();
        assert!(!patched, "Should not have patched a missing visit");
    }

    #[tokio::test]
    async fn test_patch_response_applies_only_once() {
        let storage = setup_sqlite().await;
        let id = storage.insert_visit(&visit("10.0.0.2", 2_000)).await.unwrap();

        assert!(storage.patch_response(id, 404, 5).await.unwrap());
        assert!(!storage.patch_response(id, 200, 99).await.unwrap());

        let stored = storage.get_visit(id).await.unwrap().unwrap();
        assert_eq!(stored.status_code, Some(404));
        assert_eq!(stored.response_time_ms, Some(5));
    }

    #[tokio::test]
    async fn test_patch_leaves_other_visits_untouched() {
        let storage = setup_sqlite().await;
        let first = storage.insert_visit(&visit("10.0.0.3", 3_000)).await.unwrap();
        let second = storage.insert_visit(&visit("10.0.0.3", 3_001)).await.unwrap();

        storage.patch_response(first, 201, 8).await.unwrap();

        let untouched = storage.get_visit(second).await.unwrap().unwrap();
        assert_eq!(untouched.status_code, None);
        assert_eq!(untouched.response_time_ms, None);
    }
}
