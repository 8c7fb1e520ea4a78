//! CartRepository 集成测试
//!
//! 使用真实 PostgreSQL 验证 SQL 语义：ID 分配、source_ref 去重、删除幂等。
//!
//! ## 运行方式
//!
//! ```bash
//! DATABASE_URL=postgres://... cargo test --test cart_repository_test -- --ignored
//! ```

use std::sync::Arc;

use cart_service::CartUpdateService;
use cart_service::{NewCartRecord, SaveOutcome};
use cart_service::repository::{CartRepository, CartRepositoryTrait};
use cart_shared::config::DatabaseConfig;
use cart_shared::database::Database;
use uuid::Uuid;

// ==================== 辅助函数 ====================

/// 从环境变量读取数据库 URL，未设置则 panic
fn database_url() -> String {
    std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests")
}

async fn setup_repository() -> CartRepository {
    let config = DatabaseConfig {
        url: database_url(),
        max_connections: 2,
        min_connections: 1,
        connect_retries: 0,
        ..Default::default()
    };
    let db = Database::connect(&config).await.expect("数据库连接失败");
    db.run_migrations().await.expect("执行迁移失败");
    CartRepository::new(db.pool().clone())
}

/// 每个测试使用独立的用户 ID，避免并行测试互相干扰
fn unique_user() -> String {
    format!("test-user-{}", Uuid::new_v4())
}

fn new_record(user_id: &str, source_ref: Option<String>) -> NewCartRecord {
    NewCartRecord {
        user_id: user_id.to_string(),
        product_id: "p1".to_string(),
        product_name: "Widget".to_string(),
        made_by: "Acme".to_string(),
        image: "img.png".to_string(),
        quantity: 1,
        unit_price: 1999,
        source_ref,
    }
}

// ==================== 测试 ====================

#[tokio::test]
#[ignore]
async fn test_save_assigns_cart_id() {
    let repo = setup_repository().await;
    let user_id = unique_user();

    let first = repo.save(&new_record(&user_id, None)).await.unwrap();
    let second = repo.save(&new_record(&user_id, None)).await.unwrap();

    assert!(second.cart_id() > first.cart_id());
    assert_eq!(first.inserted().unwrap().unit_price, 1999);
    assert_eq!(repo.list_by_user(&user_id).await.unwrap().len(), 2);
}

#[tokio::test]
#[ignore]
async fn test_save_with_same_source_ref_returns_existing_row() {
    let repo = setup_repository().await;
    let user_id = unique_user();
    let source_ref = format!("cart-product-info/0/{}", Uuid::new_v4());

    let first = repo
        .save(&new_record(&user_id, Some(source_ref.clone())))
        .await
        .unwrap();
    let again = repo
        .save(&new_record(&user_id, Some(source_ref)))
        .await
        .unwrap();

    assert!(first.inserted().is_some());
    assert_eq!(
        again,
        SaveOutcome::Duplicate {
            cart_id: first.cart_id()
        }
    );
    assert_eq!(repo.list_by_user(&user_id).await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore]
async fn test_deleted_row_is_not_restored_by_same_source_ref() {
    let repo = setup_repository().await;
    let user_id = unique_user();
    let source_ref = format!("cart-product-info/0/{}", Uuid::new_v4());

    let first = repo
        .save(&new_record(&user_id, Some(source_ref.clone())))
        .await
        .unwrap();
    assert_eq!(repo.delete_by_id(first.cart_id()).await.unwrap(), 1);

    let again = repo
        .save(&new_record(&user_id, Some(source_ref)))
        .await
        .unwrap();

    assert_eq!(
        again,
        SaveOutcome::Duplicate {
            cart_id: first.cart_id()
        }
    );
    assert!(repo.list_by_user(&user_id).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore]
async fn test_delete_by_id_is_idempotent() {
    let repo = setup_repository().await;
    let cart_id = repo
        .save(&new_record(&unique_user(), None))
        .await
        .unwrap()
        .cart_id();

    assert_eq!(repo.delete_by_id(cart_id).await.unwrap(), 1);
    assert_eq!(repo.delete_by_id(cart_id).await.unwrap(), 0);
    assert!(repo.find_by_id(cart_id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn test_service_round_trip_against_postgres() {
    let repo = Arc::new(setup_repository().await);
    let service = CartUpdateService::new(repo.clone());
    let user_id = unique_user();

    let text = format!(
        r#"{{"userId":"{user_id}","productId":"p9","productName":"Lamp","productMadeBy":"Acme","productImage":"lamp.png","productPrice":2500}}"#
    );
    let outcome = service.add_to_cart(&text, None).await.unwrap();
    assert_eq!(outcome.inserted().unwrap().product_name, "Lamp");

    let summary = service
        .remove_from_cart(&format!(r#"[{{"cartId":"{}"}}]"#, outcome.cart_id()))
        .await
        .unwrap();
    assert_eq!(summary.removed, 1);
    assert!(repo.list_by_user(&user_id).await.unwrap().is_empty());
}
