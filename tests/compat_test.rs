//! End-to-end tests of the legacy facade on a SQLite file database

use once_cell::sync::Lazy;
use rustf_compat::compat::{Dialect, RelationshipKind, TableRef};
use rustf_compat::prelude::*;
use tempfile::TempDir;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct TestModel {
    id: i64,
    name: String,
    category: String,
    #[serde(default)]
    related_models: Vec<RelatedModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct RelatedModel {
    id: i64,
    test_model_id: i64,
    description: String,
}

static TEST_MODEL: Lazy<ModelSchema> = Lazy::new(|| {
    ModelSchema::builder("TestModel")
        .id()
        .field(FieldSchema::new("Name", DataType::String).size(100))
        .field(FieldSchema::new("Category", DataType::String))
        .has_many("RelatedModels", RelatedModel::schema)
        .build()
});

static RELATED_MODEL: Lazy<ModelSchema> = Lazy::new(|| {
    ModelSchema::builder("RelatedModel")
        .id()
        .field(FieldSchema::new("TestModelID", DataType::BigInt))
        .field(FieldSchema::new("Description", DataType::String))
        .build()
});

impl Model for TestModel {
    fn schema() -> &'static ModelSchema {
        &TEST_MODEL
    }
}

impl Model for RelatedModel {
    fn schema() -> &'static ModelSchema {
        &RELATED_MODEL
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Owner {
    id: i64,
    name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Pet {
    id: i64,
    owner_id: i64,
    name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Toy {
    id: i64,
    label: String,
}

static OWNER: Lazy<ModelSchema> = Lazy::new(|| {
    ModelSchema::builder("Owner")
        .id()
        .field(FieldSchema::new("Name", DataType::String))
        .has_many("Toys", Toy::schema)
        .build()
});

static PET: Lazy<ModelSchema> = Lazy::new(|| {
    ModelSchema::builder("Pet")
        .id()
        .field(FieldSchema::new("OwnerID", DataType::BigInt))
        .field(FieldSchema::new("Name", DataType::String))
        .belongs_to("Owner", Owner::schema)
        .build()
});

// No OwnerID column, so Owner's "Toys" cannot be resolved
static TOY: Lazy<ModelSchema> = Lazy::new(|| {
    ModelSchema::builder("Toy")
        .id()
        .field(FieldSchema::new("Label", DataType::String))
        .build()
});

impl Model for Owner {
    fn schema() -> &'static ModelSchema {
        &OWNER
    }
}

impl Model for Pet {
    fn schema() -> &'static ModelSchema {
        &PET
    }
}

impl Model for Toy {
    fn schema() -> &'static ModelSchema {
        &TOY
    }
}

#[derive(Debug, Deserialize)]
struct CategoryCount {
    category: String,
    count: i64,
}

fn named(name: &str, category: &str) -> TestModel {
    TestModel {
        name: name.to_string(),
        category: category.to_string(),
        ..Default::default()
    }
}

async fn setup() -> (TempDir, DB) {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("compat.db");
    let db = open("sqlite3", &[path.to_str().unwrap()]).await.unwrap();
    let migrated = db
        .auto_migrate(&[TestModel::schema(), RelatedModel::schema()])
        .await;
    assert!(migrated.error.is_none(), "{:?}", migrated.error);
    (dir, db)
}

#[tokio::test]
async fn test_create_and_find() {
    let (_dir, db) = setup().await;

    let mut record = named("Test Record", "A");
    let created = db.create(&mut record).await;
    assert!(created.error.is_none(), "{:?}", created.error);
    assert_eq!(created.rows_affected, 1);
    assert!(record.id > 0);

    let mut found = TestModel::default();
    let result = db.find(&mut found, args!["name = ?", "Test Record"]).await;
    assert!(result.error.is_none());
    assert_eq!(found.name, "Test Record");

    let mut all: Vec<TestModel> = Vec::new();
    let result = db.find(&mut all, args![]).await;
    assert_eq!(result.rows_affected, 1);
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn test_delete_then_first_is_not_found() {
    let (_dir, db) = setup().await;

    let mut record = named("Doomed", "A");
    db.create(&mut record).await;

    let deleted = db.delete(&record, args![]).await;
    assert!(deleted.error.is_none());
    assert_eq!(deleted.rows_affected, 1);

    let mut found = TestModel::default();
    let result = db.first(&mut found, args![record.id]).await;
    assert!(result.record_not_found());
    assert_eq!(found, TestModel::default());
}

#[tokio::test]
async fn test_updates_and_update_column() {
    let (_dir, db) = setup().await;

    let mut record = named("Before", "A");
    db.create(&mut record).await;

    let updated = db
        .model(&record)
        .updates(Values::new().set("name", "After"))
        .await;
    assert!(updated.error.is_none(), "{:?}", updated.error);
    assert_eq!(updated.rows_affected, 1);

    let updated = db.model(&record).update_column("category", "B").await;
    assert_eq!(updated.rows_affected, 1);

    let mut found = TestModel::default();
    db.first(&mut found, args![record.id]).await;
    assert_eq!(found.name, "After");
    assert_eq!(found.category, "B");
}

#[tokio::test]
async fn test_where_not_or_order_limit() {
    let (_dir, db) = setup().await;
    for (name, category) in [("Not Test 1", "A"), ("Not Test 2", "A"), ("Another Test", "B")] {
        db.create(&mut named(name, category)).await;
    }

    let mut models: Vec<TestModel> = Vec::new();
    db.not("name", args!["Another Test"]).find(&mut models, args![]).await;
    assert_eq!(models.len(), 2);

    let mut models: Vec<TestModel> = Vec::new();
    db.where_("name = ?", args!["Not Test 1"])
        .or("category = ?", args!["B"])
        .order("id desc")
        .find(&mut models, args![])
        .await;
    let names: Vec<_> = models.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["Another Test", "Not Test 1"]);

    let mut models: Vec<TestModel> = Vec::new();
    db.order("id").limit(1).offset(1).find(&mut models, args![]).await;
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].name, "Not Test 2");
}

#[tokio::test]
async fn test_limit_rejects_fractions() {
    let (_dir, db) = setup().await;
    db.create(&mut named("One", "A")).await;

    let limited = db.limit(1.5f64);
    assert_eq!(
        limited.error.as_ref().map(ToString::to_string),
        Some("float64 value cannot be converted to int".to_string())
    );

    let mut models: Vec<TestModel> = Vec::new();
    let result = limited.find(&mut models, args![]).await;
    assert!(result.error.is_some());
    assert!(models.is_empty());
}

#[tokio::test]
async fn test_count_into_integers() {
    let (_dir, db) = setup().await;
    for i in 0..3 {
        db.create(&mut named(&format!("Count {}", i), "A")).await;
    }

    let mut total = 0i64;
    let result = db.model(&TestModel::default()).count(&mut total).await;
    assert!(result.error.is_none());
    assert_eq!(total, 3);

    let mut small = 0i32;
    db.table("test_models")
        .where_("name <> ?", args!["Count 0"])
        .count(&mut small)
        .await;
    assert_eq!(small, 2);

    let mut wrong = 0u8;
    let result = db.model(&TestModel::default()).count(&mut wrong).await;
    assert_eq!(
        result.error.map(|e| e.to_string()),
        Some("value must be a pointer to int or int64".to_string())
    );
    assert_eq!(result.rows_affected, 1);
    assert_eq!(wrong, 0);
}

#[tokio::test]
async fn test_group_having_scan() {
    let (_dir, db) = setup().await;
    for (name, category) in [("Test 1", "A"), ("Test 2", "A"), ("Test 3", "B")] {
        db.create(&mut named(name, category)).await;
    }

    let mut results: Vec<CategoryCount> = Vec::new();
    let result = db
        .model(&TestModel::default())
        .select("category, COUNT(*) as count", args![])
        .group("category")
        .having("COUNT(*) > ?", args![1])
        .scan(&mut results)
        .await;
    assert!(result.error.is_none(), "{:?}", result.error);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].category, "A");
    assert_eq!(results[0].count, 2);
}

#[tokio::test]
async fn test_joins_and_pluck() {
    let (_dir, db) = setup().await;
    let mut owner = named("Join Test", "A");
    db.create(&mut owner).await;
    let mut related = RelatedModel {
        test_model_id: owner.id,
        description: "Related Description".into(),
        ..Default::default()
    };
    db.create(&mut related).await;

    #[derive(Debug, Deserialize)]
    struct Joined {
        name: String,
        description: String,
    }
    let mut results: Vec<Joined> = Vec::new();
    let result = db
        .table("test_models")
        .select("test_models.name, related_models.description", args![])
        .joins(
            "left join related_models on related_models.test_model_id = test_models.id",
            args![],
        )
        .scan(&mut results)
        .await;
    assert!(result.error.is_none(), "{:?}", result.error);
    assert_eq!(results[0].name, "Join Test");
    assert_eq!(results[0].description, "Related Description");

    let mut descriptions: Vec<String> = Vec::new();
    let result = db
        .model(&RelatedModel::default())
        .pluck("description", &mut descriptions)
        .await;
    assert_eq!(result.rows_affected, 1);
    assert_eq!(descriptions, vec!["Related Description".to_string()]);
}

#[tokio::test]
async fn test_transaction_commit_and_rollback() {
    let (_dir, db) = setup().await;

    let tx = db.begin().await;
    assert!(tx.error.is_none());
    tx.create(&mut named("Rolled back", "A")).await;
    let rolled = tx.rollback().await;
    assert!(rolled.error.is_none());

    let tx = db.begin().await;
    tx.create(&mut named("Committed", "A")).await;
    let committed = tx.commit().await;
    assert!(committed.committed);
    assert!(committed.rollback_unless_committed().await.error.is_none());

    let mut names: Vec<String> = Vec::new();
    db.model(&TestModel::default()).pluck("name", &mut names).await;
    assert_eq!(names, vec!["Committed".to_string()]);
}

#[tokio::test]
async fn test_rollback_unless_committed_discards_work() {
    let (_dir, db) = setup().await;

    let tx = db.begin().await;
    tx.create(&mut named("Pending", "A")).await;
    let after = tx.rollback_unless_committed().await;
    assert!(after.error.is_none());
    assert!(!after.committed);

    let mut total = 0i64;
    db.model(&TestModel::default()).count(&mut total).await;
    assert_eq!(total, 0);

    // Outside a transaction there is nothing to undo
    assert!(db.rollback_unless_committed().await.error.is_none());
}

#[tokio::test]
async fn test_transaction_closure() {
    let (_dir, db) = setup().await;

    let result: rustf_compat::Result<()> = db
        .transaction(|tx| async move {
            tx.create(&mut named("Inside", "A")).await;
            Err(Error::invalid_input("abort"))
        })
        .await;
    assert!(result.is_err());

    let id = db
        .transaction(|tx| async move {
            let mut record = named("Kept", "A");
            match tx.create(&mut record).await.error {
                Some(err) => Err(err),
                None => Ok(record.id),
            }
        })
        .await
        .unwrap();
    assert!(id > 0);

    let mut total = 0i64;
    db.model(&TestModel::default()).count(&mut total).await;
    assert_eq!(total, 1);
}

#[tokio::test]
async fn test_associations_preload_and_related() {
    let (_dir, db) = setup().await;
    let mut owner = named("Owner", "A");
    db.create(&mut owner).await;

    let association = db.model(&owner).association("RelatedModels");
    assert!(association.error().is_none());
    let mut children = vec![
        RelatedModel {
            description: "first".into(),
            ..Default::default()
        },
        RelatedModel {
            description: "second".into(),
            ..Default::default()
        },
    ];
    association.append(&mut children).await.unwrap();
    assert!(children.iter().all(|c| c.test_model_id == owner.id && c.id > 0));
    assert_eq!(association.count().await, 2);

    let mut related: Vec<RelatedModel> = Vec::new();
    let result = db.model(&owner).related(&mut related, &["RelatedModels"]).await;
    assert!(result.error.is_none(), "{:?}", result.error);
    assert_eq!(result.rows_affected, 0);
    assert_eq!(related.len(), 2);

    let mut owners: Vec<TestModel> = Vec::new();
    db.preload("RelatedModels").find(&mut owners, args![]).await;
    assert_eq!(owners[0].related_models.len(), 2);

    let missing = db.model(&owner).association("Nope");
    assert!(missing.error().is_some());
    assert_eq!(missing.count().await, 0);

    let none = db.related(&mut related, &[]).await;
    assert!(none.error.is_some());
}

#[tokio::test]
async fn test_first_or_create() {
    let (_dir, db) = setup().await;

    let mut created = TestModel::default();
    let result = db
        .where_(columns([("name", "Fresh")]), args![])
        .first_or_create(&mut created, args![])
        .await;
    assert!(result.error.is_none(), "{:?}", result.error);
    assert_eq!(created.name, "Fresh");
    assert!(created.id > 0);

    let mut found = TestModel::default();
    db.where_(columns([("name", "Fresh")]), args![])
        .first_or_create(&mut found, args![])
        .await;
    assert_eq!(found.id, created.id);
}

#[tokio::test]
async fn test_exec_and_raw_rows() {
    let (_dir, db) = setup().await;
    db.create(&mut named("Raw", "A")).await;

    let result = db
        .exec("UPDATE test_models SET category = ? WHERE name = ?", args!["Z", "Raw"])
        .await;
    assert_eq!(result.rows_affected, 1);

    let row = db
        .raw("SELECT name, category FROM test_models WHERE name = ?", args!["Raw"])
        .row()
        .await;
    #[derive(Debug, Deserialize)]
    struct Pair {
        name: String,
        category: String,
    }
    let pair: Pair = row.scan().unwrap();
    assert_eq!((pair.name.as_str(), pair.category.as_str()), ("Raw", "Z"));

    let missing = db
        .raw("SELECT name FROM test_models WHERE name = ?", args!["nobody"])
        .row()
        .await;
    assert!(missing.scan::<Pair>().unwrap_err().is_record_not_found());
}

#[tokio::test]
async fn test_scan_rows_by_position() {
    let (_dir, db) = setup().await;
    db.create(&mut named("Row 1", "A")).await;
    db.create(&mut named("Row 2", "B")).await;

    let mut rows = db
        .table("test_models")
        .select("id, name, category", args![])
        .order("id")
        .rows()
        .await
        .unwrap();
    assert_eq!(rows.columns(), ["id", "name", "category"]);

    let mut seen = Vec::new();
    while rows.next() {
        let mut record = TestModel::default();
        db.scan_rows(&mut rows, &mut record).unwrap();
        seen.push(record.name);
    }
    assert_eq!(seen, vec!["Row 1", "Row 2"]);

    // Wrong column count
    let mut rows = db
        .table("test_models")
        .select("id, name", args![])
        .rows()
        .await
        .unwrap();
    assert!(rows.next());
    let err = db.scan_rows(&mut rows, &mut TestModel::default()).unwrap_err();
    assert!(err.to_string().contains("destination arguments"), "{}", err);

    let rows = db.table("test_models").rows().await.unwrap();
    db.drain_rows(rows).unwrap();

    let mut empty = db
        .table("test_models")
        .select("id, name", args![])
        .where_("name = ?", args!["Nobody"])
        .rows()
        .await
        .unwrap();
    assert_eq!(empty.columns(), ["id", "name"]);
    assert!(!empty.next());
}

#[tokio::test]
async fn test_new_scope_reflection() {
    let (_dir, db) = setup().await;
    let scope = db.new_scope(&TestModel::default());
    assert_eq!(scope.table_name(), "test_models");

    let fields = scope.get_struct_fields();
    let names: Vec<_> = fields.iter().map(|f| f.name()).collect();
    assert_eq!(names, vec!["ID", "Name", "Category", "RelatedModels"]);

    let id = scope.field_by_name("ID").unwrap();
    assert!(id.struct_field.is_primary_key);

    let name = scope.field_by_name("Name").unwrap();
    assert_eq!(name.struct_field.tag_settings.get("SIZE").map(String::as_str), Some("100"));

    let related = scope.field_by_name("RelatedModels").unwrap();
    let relationship = related.relationship.unwrap();
    assert_eq!(relationship.kind, RelationshipKind::HasMany);
    assert_eq!(relationship.foreign_field_names, vec!["test_model_id"]);
    assert_eq!(relationship.association_foreign_field_names, vec!["id"]);
    assert!(!related.struct_field.is_normal);

    assert!(scope.field_by_name("Missing").is_none());
    assert_eq!(db.dialect().get_name(), "sqlite");
    assert_eq!(scope.dialect().quote("name"), "\"name\"");
}

#[tokio::test]
async fn test_belongs_to_marks_foreign_key() {
    let (_dir, db) = setup().await;
    let scope = db.new_scope(&Pet::default());

    let owner_id = scope.field_by_name("OwnerID").unwrap();
    assert!(owner_id.is_foreign_key);
    for name in ["ID", "Name", "Owner"] {
        assert!(!scope.field_by_name(name).unwrap().is_foreign_key, "{}", name);
    }

    let relationship = scope.field_by_name("Owner").unwrap().relationship.unwrap();
    assert_eq!(relationship.kind, RelationshipKind::BelongsTo);
    assert_eq!(relationship.foreign_field_names, vec!["owner_id"]);
    assert_eq!(relationship.association_foreign_field_names, vec!["id"]);
}

#[tokio::test]
async fn test_unresolved_relationship_is_unknown() {
    let (_dir, db) = setup().await;
    let scope = db.new_scope(&Owner::default());

    let relationship = scope.field_by_name("Toys").unwrap().relationship.unwrap();
    assert_eq!(relationship.kind, RelationshipKind::Unknown);
    assert!(relationship.foreign_field_names.is_empty());
    assert!(relationship.association_foreign_field_names.is_empty());
    assert!(scope.get_struct_fields().iter().all(|f| !f.is_foreign_key));
}

#[tokio::test]
async fn test_migrator_wrappers() {
    let (_dir, db) = setup().await;
    assert!(db.has_table("test_models").await);
    assert!(db.has_table(TestModel::schema()).await);
    assert!(!db.has_table("nothing_here").await);

    let table = db.table("test_models");
    assert!(table.add_index("idx_test_models_name", &["name"]).await.error.is_none());
    assert!(db
        .engine
        .migrator()
        .has_index("test_models", "idx_test_models_name")
        .await
        .unwrap());
    assert!(table.remove_index("idx_test_models_name").await.error.is_none());
    assert!(table
        .add_unique_index("uix_test_models_name", &["name"])
        .await
        .error
        .is_none());

    assert!(table.rename_column("category", "kind").await.error.is_none());
    let migrator = db.engine.migrator();
    assert!(migrator.has_column("test_models", "kind").await.unwrap());
    assert!(table.drop_column("kind").await.error.is_none());
    assert!(!migrator.has_column("test_models", "kind").await.unwrap());

    // Needs a current table
    assert!(db.drop_column("name").await.error.is_some());

    let dropped = db.drop_table_if_exists(&[TableRef::model::<RelatedModel>()]).await;
    assert!(dropped.error.is_none());
    assert!(!db.has_table("related_models").await);

    let created = db.create_table(&[TableRef::model::<RelatedModel>()]).await;
    assert!(created.error.is_none());
    assert!(db.create_table(&["plain_name".into()]).await.error.is_some());
    assert!(db
        .create_table_if_not_exists(&[TableRef::model::<RelatedModel>()])
        .await
        .error
        .is_none());
}

#[tokio::test]
async fn test_query_expr_subquery() {
    let (_dir, db) = setup().await;
    db.create(&mut named("Sub", "A")).await;
    db.create(&mut named("Other", "B")).await;

    let sub = db
        .table("test_models")
        .select("id", args![])
        .where_("category = ?", args!["A"])
        .query_expr();
    assert!(!sub.is_empty());

    let mut models: Vec<TestModel> = Vec::new();
    db.where_("id IN (?)", args![sub]).find(&mut models, args![]).await;
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].name, "Sub");
}

#[tokio::test]
async fn test_settings_and_fresh_chains() {
    let (_dir, db) = setup().await;
    let tagged = db.set("tenant", 7u32).table("test_models");
    let value = tagged.get("tenant").unwrap();
    assert_eq!(value.downcast_ref::<u32>(), Some(&7));

    let fresh = tagged.new();
    assert!(fresh.engine.statement().table().is_none());
    let cloned = tagged.clone_db();
    assert!(cloned.engine.statement().table().is_none());
    assert_eq!(cloned.get("tenant").and_then(|v| v.downcast_ref::<u32>().copied()), Some(7));
    assert!(db.engine.ping().await.unwrap());
    db.set_max_idle_conns(-3);
    db.close().await.unwrap();
}
