//! Import/export behavior against a real local store.

use idealog::project::export::{export_project, import_project};
use idealog::project::{Edit, Project};
use idealog::storage::LocalStore;
use tempfile::TempDir;

#[tokio::test]
async fn exported_project_imports_into_an_equivalent_one() {
    let dir = TempDir::new().unwrap();
    let store = LocalStore::open(dir.path()).await.unwrap();

    let mut original = Project::new("Side project log");
    original
        .apply(Edit::AddObservation {
            text: "no time after dinner".into(),
            category: "Personal Time".into(),
        })
        .unwrap();
    store.try_put(&original).await.unwrap();

    let json = export_project(&original).unwrap();
    let imported = import_project(&json).unwrap();
    store.try_put(&imported).await.unwrap();

    let all = store.try_get_all().await.unwrap();
    assert_eq!(all.len(), 2);
    let restored = all.iter().find(|p| p.id == imported.id).unwrap();
    assert_eq!(restored.name, original.name);
    assert_eq!(restored.data, original.data);
    assert_ne!(restored.id, original.id);
}

#[tokio::test]
async fn malformed_import_leaves_existing_projects_untouched() {
    let dir = TempDir::new().unwrap();
    let store = LocalStore::open(dir.path()).await.unwrap();

    let existing = Project::new("precious");
    store.try_put(&existing).await.unwrap();

    assert!(import_project("{\"projectName\": [1,2,3]}").is_err());
    assert!(import_project("truncated {").is_err());

    let all = store.try_get_all().await.unwrap();
    assert_eq!(all, vec![existing]);
}
